use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub search: SearchConfig,
    #[serde(default)]
    pub federation: FederationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    pub index_path: String,
    pub calendar_cache_enabled: bool,
    /// Limit applied by the CLI when a request leaves it unset
    pub default_limit: usize,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FederationConfig {
    /// Account id that owns this mailbox
    pub local_account: String,
    /// Account id -> base URL of the mailbox server hosting it
    #[serde(default)]
    pub endpoints: HashMap<String, String>,
    /// Bearer token forwarded on remote sub-requests
    pub auth_token: Option<String>,
    #[serde(default)]
    pub mountpoints: Vec<MountpointConfig>,
}

/// A local folder that points at a folder in another account
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MountpointConfig {
    pub folder_id: u32,
    pub owner_account: String,
    pub remote_folder_id: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::SearchError::Config(e.to_string()))?;

        toml::from_str(&content)
            .map_err(|e| crate::error::SearchError::Config(e.to_string()))
    }

    pub fn default() -> Self {
        Self {
            search: SearchConfig {
                index_path: "/var/lib/mail-search/index".to_string(),
                calendar_cache_enabled: true,
                default_limit: 100,
            },
            federation: FederationConfig {
                local_account: "local".to_string(),
                ..Default::default()
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}
