use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "mindful-policy";

/// Main engine configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EngineConfig {
    /// Policy store JSON document (defaults to the platform data directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,

    /// Persisted enforcement state (defaults next to the store)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_path: Option<PathBuf>,

    /// How often the liveness check runs (seconds)
    #[serde(default = "default_liveness_interval")]
    pub liveness_interval_secs: u64,

    /// Network tunnel settings
    #[serde(default)]
    pub tunnel: TunnelSettings,
}

fn default_liveness_interval() -> u64 {
    30
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            state_path: None,
            liveness_interval_secs: default_liveness_interval(),
            tunnel: TunnelSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Resolved policy store path
    pub fn resolved_store_path(&self) -> Result<PathBuf> {
        match &self.store_path {
            Some(path) => Ok(path.clone()),
            None => Ok(get_data_dir()?.join("policy-store.json")),
        }
    }

    /// Resolved enforcement state path
    pub fn resolved_state_path(&self) -> Result<PathBuf> {
        match &self.state_path {
            Some(path) => Ok(path.clone()),
            None => Ok(get_data_dir()?.join("enforcement-state.json")),
        }
    }
}

/// Private address block and default route used by the blocking tunnel
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct TunnelSettings {
    #[serde(default = "default_tunnel_address")]
    pub address: Ipv4Addr,

    #[serde(default = "default_tunnel_prefix")]
    pub prefix: u8,

    #[serde(default = "default_route")]
    pub route: Ipv4Addr,

    #[serde(default)]
    pub route_prefix: u8,
}

fn default_tunnel_address() -> Ipv4Addr {
    Ipv4Addr::new(192, 168, 0, 0)
}

fn default_tunnel_prefix() -> u8 {
    24
}

fn default_route() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            address: default_tunnel_address(),
            prefix: default_tunnel_prefix(),
            route: default_route(),
            route_prefix: 0,
        }
    }
}

/// Per-user data directory for the store and state files
pub fn get_data_dir() -> Result<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.data_local_dir().to_path_buf())
        .context("Could not determine data directory location")
}

/// Default configuration file path
pub fn get_config_path() -> Result<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.config_dir().join("config.yaml"))
        .context("Could not determine config file location")
}

/// Load configuration from YAML file
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: EngineConfig = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse YAML config file: {}", path.display()))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load configuration, falling back to defaults when the file does not exist
pub fn load_config_or_default(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        tracing::info!(
            "No config file at {}, using defaults",
            path.display()
        );
        return Ok(EngineConfig::default());
    }

    load_config(path)
}

/// Validate configuration
pub fn validate_config(config: &EngineConfig) -> Result<()> {
    if config.liveness_interval_secs == 0 {
        anyhow::bail!("liveness_interval_secs must be greater than zero");
    }

    if config.tunnel.prefix > 32 {
        anyhow::bail!("Tunnel address prefix must be at most 32, got {}", config.tunnel.prefix);
    }

    if config.tunnel.route_prefix > 32 {
        anyhow::bail!(
            "Tunnel route prefix must be at most 32, got {}",
            config.tunnel.route_prefix
        );
    }

    if let (Some(store), Some(state)) = (&config.store_path, &config.state_path) {
        if store == state {
            anyhow::bail!(
                "store_path and state_path must differ (both are {})",
                store.display()
            );
        }
    }

    Ok(())
}

/// Example configuration file with documentation
///
/// The content is loaded from example-config.yaml at compile time
pub const EXAMPLE_CONFIG: &str = include_str!("../example-config.yaml");
