//! Engine configuration

use std::env;

/// Default bound on node hops within one pass
pub const DEFAULT_MAX_HOPS: usize = 100;

/// Tunables for the flow execution engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of nodes visited in a single pass before the flow is failed as cyclic
    pub max_hops: usize,
}

impl EngineConfig {
    /// Build from `ISSUEFLOW_MAX_HOPS`, falling back to defaults
    pub fn from_env() -> Self {
        let max_hops = match env::var("ISSUEFLOW_MAX_HOPS") {
            Ok(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    log::warn!(
                        "Ignoring invalid ISSUEFLOW_MAX_HOPS '{}', using {}",
                        raw,
                        DEFAULT_MAX_HOPS
                    );
                    DEFAULT_MAX_HOPS
                }
            },
            Err(_) => DEFAULT_MAX_HOPS,
        };
        Self { max_hops }
    }

    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_hops: DEFAULT_MAX_HOPS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_max_hops() {
        assert_eq!(EngineConfig::default().max_hops, 100);
    }

    #[test]
    fn test_with_max_hops() {
        let config = EngineConfig::default().with_max_hops(5);
        assert_eq!(config.max_hops, 5);
    }
}
