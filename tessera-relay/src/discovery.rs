use std::collections::BTreeSet;
use std::net::SocketAddr;

/// Bootstrap and remembered peer endpoints to dial.
pub struct Discovery {
    boot_nodes: Vec<SocketAddr>,
}

fn parse_endpoint(endpoint: &str) -> Option<SocketAddr> {
    endpoint
        .parse::<SocketAddr>()
        .map_err(|e| {
            tracing::warn!(endpoint, error = %e, "invalid peer endpoint");
            e
        })
        .ok()
}

impl Discovery {
    /// Create a new Discovery from `ip:port` strings.
    /// Invalid entries are logged and skipped.
    pub fn new(boot_nodes: &[String]) -> Self {
        let boot_nodes = boot_nodes.iter().filter_map(|s| parse_endpoint(s)).collect();
        Self { boot_nodes }
    }

    /// Return the parsed bootstrap addresses.
    pub fn boot_addrs(&self) -> &[SocketAddr] {
        &self.boot_nodes
    }

    /// Up to `limit` endpoints to dial: boot nodes first, then remembered
    /// peers, skipping duplicates and anything `skip` rejects.
    pub fn dial_candidates<F>(&self, remembered: &[String], limit: usize, skip: F) -> Vec<SocketAddr>
    where
        F: Fn(&SocketAddr) -> bool,
    {
        let mut seen = BTreeSet::new();
        self.boot_nodes
            .iter()
            .copied()
            .chain(remembered.iter().filter_map(|s| parse_endpoint(s)))
            .filter(|addr| !skip(addr) && seen.insert(*addr))
            .take(limit)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_endpoint() {
        let disc = Discovery::new(&["127.0.0.1:1000".to_string()]);
        assert_eq!(disc.boot_addrs().len(), 1);
    }

    #[test]
    fn test_parse_invalid_endpoint() {
        let disc = Discovery::new(&["not-an-endpoint".to_string(), "10.0.0.1".to_string()]);
        assert!(disc.boot_addrs().is_empty());
    }

    #[test]
    fn test_dial_candidates_dedup_and_skip() {
        let disc = Discovery::new(&["127.0.0.1:1000".to_string(), "127.0.0.1:1001".to_string()]);
        let remembered = vec![
            "127.0.0.1:1001".to_string(),
            "127.0.0.1:1002".to_string(),
            "garbage".to_string(),
        ];
        let connected: SocketAddr = "127.0.0.1:1000".parse().unwrap();
        let picks = disc.dial_candidates(&remembered, 10, |addr| *addr == connected);
        let expected: Vec<SocketAddr> = vec![
            "127.0.0.1:1001".parse().unwrap(),
            "127.0.0.1:1002".parse().unwrap(),
        ];
        assert_eq!(picks, expected);
        assert_eq!(disc.dial_candidates(&remembered, 1, |_| false).len(), 1);
    }
}
