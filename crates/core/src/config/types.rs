//! Configuration types.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::engine::EngineConfig;

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub engine: EngineConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Upper bound on a single multipart upload, in megabytes.
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: u64,
}

fn default_host() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}

fn default_port() -> u16 {
    8080
}

fn default_max_upload_mb() -> u64 {
    512
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

/// Config as exposed over the API: paths flattened to display strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizedConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_mb: u64,
    pub external_binary: Option<String>,
    pub bundled_binary: Option<String>,
    pub temp_dir: String,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            host: config.server.host.to_string(),
            port: config.server.port,
            max_upload_mb: config.server.max_upload_mb,
            external_binary: config
                .engine
                .external_binary
                .as_ref()
                .map(|p| p.display().to_string()),
            bundled_binary: config
                .engine
                .bundled_binary
                .as_ref()
                .map(|p| p.display().to_string()),
            temp_dir: config.engine.temp_dir.display().to_string(),
        }
    }
}
