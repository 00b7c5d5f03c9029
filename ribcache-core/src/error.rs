use std::path::PathBuf;
use thiserror::Error;

/**
 * All possible errors in the application
 */
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Refresh state not found: {}", .0.display())]
    ConfigMissing(PathBuf),

    #[error("Refresh state is corrupt ({}): {reason}", .path.display())]
    ConfigCorrupt { path: PathBuf, reason: String },

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Snapshot parse error: {0}")]
    Parse(String),

    #[error("Failed to persist {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings: {0}")]
    Settings(String),

    #[error("Resource '{0}' is locked by another run")]
    Busy(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid IP address: {0}")]
    InvalidIp(String),

    #[error("Prefix database not loaded")]
    DatabaseNotLoaded,
}

impl AppError {
    pub(crate) fn persist(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::Persist {
            path: path.into(),
            source,
        }
    }
}

/**
 * Result type alias
 */
pub type Result<T> = std::result::Result<T, AppError>;
