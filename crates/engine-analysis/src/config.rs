//! Analysis configuration from environment variables.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use crate::tablebase::DEFAULT_TABLEBASE_URL;
use crate::transport::{Connector, LocalConnector, RemoteConnector};

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Path to a co-located UCI engine binary.
    pub engine_path: String,

    /// Engine host URL. When set, the remote transport is used instead of
    /// spawning the engine locally.
    pub remote_url: Option<String>,

    /// Ceiling on the wait for a remote engine's first output line.
    pub start_timeout: Duration,

    pub tablebase_url: String,

    pub tablebase_timeout: Duration,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            engine_path: env::var("ENGINE_PATH").unwrap_or_else(|_| "stockfish".to_string()),
            remote_url: env::var("ENGINE_REMOTE_URL").ok().filter(|v| !v.is_empty()),
            start_timeout: Duration::from_secs(
                env::var("ENGINE_START_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
            tablebase_url: env::var("TABLEBASE_URL")
                .unwrap_or_else(|_| DEFAULT_TABLEBASE_URL.to_string()),
            tablebase_timeout: Duration::from_secs(
                env::var("TABLEBASE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            ),
        }
    }

    /// Build the connector selected by this config.
    pub fn connector(&self) -> Arc<dyn Connector> {
        match &self.remote_url {
            Some(url) => Arc::new(RemoteConnector::new(url.clone(), self.start_timeout)),
            None => Arc::new(LocalConnector::new(self.engine_path.clone())),
        }
    }
}
