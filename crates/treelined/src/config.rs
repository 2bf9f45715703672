//! TOML configuration for the Treeline daemon.

use std::path::Path;

use serde::Deserialize;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Node identity and addresses.
    pub node: NodeSection,
    /// Cluster-wide serving quorum.
    pub cluster: ClusterSection,
    /// Cluster simulation tuning.
    pub simulate: SimulateSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[node]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Node identifier, also the node's key in the store.
    pub id: String,
    /// Hostname clients reach the log frontend on.
    pub hostname: String,
    /// Port of the log frontend.
    pub log_port: u16,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            id: "node-0".to_string(),
            hostname: "localhost".to_string(),
            log_port: 6962,
        }
    }
}

/// `[cluster]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ClusterSection {
    /// Minimum number of nodes that must hold an STH at a size before
    /// the cluster serves it.
    pub minimum_serving_nodes: u64,
    /// Minimum fraction of all nodes, in `[0.0, 1.0]`.
    pub minimum_serving_fraction: f64,
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            minimum_serving_nodes: 1,
            minimum_serving_fraction: 0.5,
        }
    }
}

/// `[simulate]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimulateSection {
    /// Number of simulated nodes.
    pub nodes: usize,
    /// Milliseconds between signing rounds.
    pub round_interval_ms: u64,
    /// Log entries appended per round.
    pub entries_per_round: u64,
    /// Number of rounds to run before exiting. `0` runs until Ctrl-C.
    pub rounds: u64,
}

impl Default for SimulateSection {
    fn default() -> Self {
        Self {
            nodes: 3,
            round_interval_ms: 1_000,
            entries_per_round: 5,
            rounds: 0,
        }
    }
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file, or defaults if no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)?;
                let config: CliConfig = toml::from_str(&content)?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string (used in tests).
    #[cfg(test)]
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }
}
