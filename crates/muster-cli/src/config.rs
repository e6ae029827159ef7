//! CLI configuration: a TOML file plus per-invocation overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use muster_core::EngineConfig;
use serde::{Deserialize, Serialize};

/// Configuration for one muster client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the backend query service.
    pub endpoint_url: String,
    /// Team whose assignments this client mirrors.
    pub team_id: Option<String>,
    /// Signed-in responder id, used for field-report relevance.
    pub actor_id: Option<String>,
    /// Environment variable holding the bearer token, if the endpoint
    /// needs one. The token itself never lives in the config file.
    pub token_env: String,
    /// Durable cache location. Defaults to the platform data directory.
    pub cache_path: Option<PathBuf>,
    /// Engine tuning knobs.
    pub engine: EngineConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "http://localhost:8787".to_string(),
            team_id: None,
            actor_id: None,
            token_env: "MUSTER_TOKEN".to_string(),
            cache_path: None,
            engine: EngineConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Resolve the cache path, falling back to the platform default.
    #[must_use]
    pub fn resolved_cache_path(&self) -> Option<PathBuf> {
        self.cache_path.clone().or_else(default_cache_path)
    }

    /// Read the bearer token from the configured environment variable.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env).ok().filter(|t| !t.is_empty())
    }
}

/// Platform-default durable cache location.
#[must_use]
pub fn default_cache_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("muster/cache.db"))
}

/// Platform-default config file location.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("muster/config.toml"))
}

/// Load configuration.
///
/// An explicitly-passed path must exist; the default path is optional and
/// its absence yields defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<ClientConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(ClientConfig::default()),
        },
    };

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ClientConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}
