//! Configuration management for the multisig relayer
//!
//! The only file input is the keystore JSON naming the Mixin session used to
//! authenticate. Everything else is a fixed runtime constant.

use crate::error::{RelayerError, RelayerResult};

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Default Mixin API endpoint
pub const DEFAULT_API_BASE: &str = "https://api.mixin.one";

/// Session credentials for a Mixin bot or user
#[derive(Clone, Deserialize)]
pub struct Keystore {
    pub client_id: String,
    pub session_id: String,
    /// Base64 Ed25519 key, either the 32-byte seed or seed followed by public key
    pub private_key: String,
    #[serde(default = "default_scope")]
    pub scope: String,
}

fn default_scope() -> String {
    "FULL".to_string()
}

// Hand-written so the session key never lands in a log line.
impl std::fmt::Debug for Keystore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keystore")
            .field("client_id", &self.client_id)
            .field("session_id", &self.session_id)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl Keystore {
    /// Load a keystore from a JSON file
    pub fn load(path: impl AsRef<Path>) -> RelayerResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RelayerError::Keystore(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::from_json(&contents)
    }

    /// Parse and validate keystore JSON
    pub fn from_json(contents: &str) -> RelayerResult<Self> {
        let keystore: Keystore = serde_json::from_str(contents)
            .map_err(|e| RelayerError::Keystore(format!("Malformed keystore: {}", e)))?;

        keystore.validate()?;
        Ok(keystore)
    }

    fn validate(&self) -> RelayerResult<()> {
        if self.client_id.is_empty() {
            return Err(RelayerError::Keystore("client_id is empty".to_string()));
        }
        if self.session_id.is_empty() {
            return Err(RelayerError::Keystore("session_id is empty".to_string()));
        }
        if self.private_key.is_empty() {
            return Err(RelayerError::Keystore("private_key is empty".to_string()));
        }
        Ok(())
    }
}

/// Runtime constants for the polling loop and API client
#[derive(Debug, Clone)]
pub struct RelayerConfig {
    pub api_base: String,
    pub poll_interval: Duration,
    pub page_limit: usize,
    pub request_timeout: Duration,
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            poll_interval: Duration::from_secs(1),
            page_limit: 500,
            request_timeout: Duration::from_secs(30),
        }
    }
}
