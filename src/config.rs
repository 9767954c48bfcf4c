//! Configuration for the registry.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default inactivity timeout before an online node is considered dead
pub const DEFAULT_NODE_TIMEOUT: Duration = Duration::from_secs(60);

/// Registry configuration: where state lives and how liveness is judged.
///
/// Loading this from files or the environment is the embedding process's
/// concern; the registry only consumes the constructed value.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    data_dir: PathBuf,
    node_timeout: Duration,
}

impl RegistryConfig {
    /// Create a configuration rooted at the given data directory
    pub fn new<P: Into<PathBuf>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.into(),
            node_timeout: DEFAULT_NODE_TIMEOUT,
        }
    }

    /// Set the inactivity timeout for the dead-node sweep
    pub fn node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = timeout;
        self
    }

    /// Get the data directory
    pub fn get_data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Get the inactivity timeout
    pub fn get_node_timeout(&self) -> Duration {
        self.node_timeout
    }
}
