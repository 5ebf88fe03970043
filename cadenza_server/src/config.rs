// Server configuration.
//
// Loaded from a JSON file (all fields optional, missing ones take the
// defaults below) and then overridden by command-line flags in `main.rs`.
// The embedded `CadenzaConfig` is the baseline for every request. Query
// parameters on `/generate` may override steps, temperature, and window per
// request, bounded by `max_steps`.

use std::path::Path;

use cadenza_core::config::CadenzaConfig;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    /// Port 0 lets the OS pick a free port.
    pub port: u16,
    /// Number of threads pulling requests off the listener.
    pub workers: usize,
    /// Wall-clock budget for one generation run.
    pub request_deadline_ms: u64,
    pub max_upload_bytes: usize,
    /// Upper bound on the `steps` query parameter.
    pub max_steps: usize,
    pub cadenza: CadenzaConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5000,
            workers: 4,
            request_deadline_ms: 30_000,
            max_upload_bytes: 1 << 20,
            max_steps: 2000,
            cadenza: CadenzaConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: ServerConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(ServerError::InvalidConfig("workers must be at least 1".into()));
        }
        if self.request_deadline_ms == 0 {
            return Err(ServerError::InvalidConfig(
                "request_deadline_ms must be at least 1".into(),
            ));
        }
        if self.max_upload_bytes == 0 {
            return Err(ServerError::InvalidConfig(
                "max_upload_bytes must be at least 1".into(),
            ));
        }
        if self.max_steps < self.cadenza.generation.steps {
            return Err(ServerError::InvalidConfig(format!(
                "max_steps ({}) is below the default steps ({})",
                self.max_steps, self.cadenza.generation.steps
            )));
        }
        self.cadenza.validate()?;
        Ok(())
    }
}
