use crate::error::{AppError, Result};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, warn};

pub const RIB_LOCK: &str = "rib";
pub const AS_DIRECTORY_LOCK: &str = "as-directory";

/**
 * Advisory lock on a named resource, backed by an exclusively created file
 * holding the owner's pid and acquisition time.
 *
 * Works across processes sharing the base directory. The file is removed
 * when the guard is dropped. A file older than `stale_after` is taken over,
 * but only by the run holding `<name>.lock.takeover`; plain acquirers never
 * delete a lock file.
 */
#[derive(Debug)]
pub struct ResourceLock {
    name: String,
    path: PathBuf,
}

impl ResourceLock {
    pub fn acquire(dir: &Path, name: &str, stale_after: Duration) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.lock", name));

        match Self::create(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if !Self::is_stale(&path, stale_after) {
                    return Err(AppError::Busy(name.to_string()));
                }
                Self::take_over(dir, &path, name, stale_after)?;
            }
            Err(e) => return Err(AppError::Io(e)),
        }

        debug!("Acquired lock {}", name);
        Ok(Self {
            name: name.to_string(),
            path,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // Replace a stale lock file; at most one run can be inside this at a time
    fn take_over(dir: &Path, path: &Path, name: &str, stale_after: Duration) -> Result<()> {
        let takeover = dir.join(format!("{}.lock.takeover", name));

        if let Err(e) = Self::create(&takeover) {
            if e.kind() != ErrorKind::AlreadyExists {
                return Err(AppError::Io(e));
            }
            // Left behind by a run that died mid-takeover; the next attempt may proceed
            if Self::is_stale(&takeover, stale_after) {
                warn!("Removing abandoned takeover marker {}", takeover.display());
                let _ = std::fs::remove_file(&takeover);
            }
            return Err(AppError::Busy(name.to_string()));
        }

        let result = Self::replace_stale(path, name, stale_after);
        let _ = std::fs::remove_file(&takeover);
        result
    }

    fn replace_stale(path: &Path, name: &str, stale_after: Duration) -> Result<()> {
        // Another run may have finished its takeover before we got here
        if !Self::is_stale(path, stale_after) {
            return Err(AppError::Busy(name.to_string()));
        }
        warn!("Taking over stale lock {}", path.display());
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(AppError::Io(e)),
        }
        Self::create(path).map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => AppError::Busy(name.to_string()),
            _ => AppError::Io(e),
        })
    }

    fn create(path: &Path) -> std::io::Result<()> {
        let acquired = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        writeln!(file, "pid={}", std::process::id())?;
        writeln!(file, "acquired={}", acquired)
    }

    // A lock that vanished counts as not stale, so the caller reports Busy and retries later
    fn is_stale(path: &Path, stale_after: Duration) -> bool {
        std::fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age > stale_after)
    }
}

impl Drop for ResourceLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to release lock {}: {}", self.path.display(), e);
        } else {
            debug!("Released lock {}", self.name);
        }
    }
}
