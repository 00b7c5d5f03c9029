use crate::database::{Origin, PrefixDatabase};
use crate::error::{AppError, Result};
use ipnet::IpNet;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

// Longest-prefix-match view over the prefix database
#[derive(Debug, Clone, Default)]
pub struct PrefixStore {
    prefixes: Arc<HashMap<IpNet, Origin>>,
}

impl PrefixStore {
    // Create a new store from a parsed database
    pub fn new(database: PrefixDatabase) -> Self {
        let prefixes = database
            .iter()
            .map(|(prefix, origin)| (*prefix, origin.clone()))
            .collect();
        Self {
            prefixes: Arc::new(prefixes),
        }
    }

    // Read the database file written by the ingestor
    pub async fn load(path: &Path) -> Result<Self> {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::DatabaseNotLoaded);
            }
            Err(e) => return Err(AppError::Io(e)),
        };

        let store = Self::new(PrefixDatabase::parse(&text));
        if store.is_empty() {
            warn!("Prefix database {} holds no prefixes", path.display());
        }
        info!("Prefix database loaded from {} ({} prefixes)", path.display(), store.len());
        Ok(store)
    }

    // Most specific prefix covering `ip`
    pub fn lookup(&self, ip: IpAddr) -> Option<(IpNet, &Origin)> {
        let max_len = match ip {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };

        for len in (0..=max_len).rev() {
            let Ok(net) = IpNet::new(ip, len) else {
                continue;
            };
            let net = net.trunc();
            if let Some(origin) = self.prefixes.get(&net) {
                debug!("Found {} in {}", ip, net);
                return Some((net, origin));
            }
        }

        debug!("IP {} not found in database", ip);
        None
    }

    // Get the number of prefixes in the store
    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    // Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> PrefixStore {
        PrefixStore::new(PrefixDatabase::parse(
            "8.0.0.0/8\t3356\n8.8.8.0/24\t15169\n2001:4860::/32\t15169\n",
        ))
    }

    #[test]
    fn test_lookup_longest_match() {
        let store = store();

        let (net, origin) = store.lookup("8.8.8.8".parse().unwrap()).unwrap();
        assert_eq!(net, "8.8.8.0/24".parse::<IpNet>().unwrap());
        assert_eq!(origin, &Origin::Asn(15169));

        let (net, origin) = store.lookup("8.8.4.4".parse().unwrap()).unwrap();
        assert_eq!(net, "8.0.0.0/8".parse::<IpNet>().unwrap());
        assert_eq!(origin, &Origin::Asn(3356));
    }

    #[test]
    fn test_lookup_ipv6() {
        let store = store();
        let (_, origin) = store.lookup("2001:4860:4860::8888".parse().unwrap()).unwrap();
        assert_eq!(origin.asns(), vec![15169]);
    }

    #[test]
    fn test_lookup_not_found() {
        assert!(store().lookup("9.9.9.9".parse().unwrap()).is_none());
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = PrefixStore::load(Path::new("/nonexistent/current")).await.unwrap_err();
        assert!(matches!(err, AppError::DatabaseNotLoaded));
    }
}
