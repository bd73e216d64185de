// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 SSH Proxy Manager Contributors

//! Client configuration file helpers

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use ssh_proxy_common::BackendClientConfig;

use crate::session::{CONTROL_POLL_INTERVAL, INDICATOR_POLL_INTERVAL};

/// Directory name under the platform config dir
pub const APP_DIR_NAME: &str = "ssh-proxy-manager";

fn default_control_poll_ms() -> u64 {
    CONTROL_POLL_INTERVAL.as_millis() as u64
}

fn default_indicator_poll_ms() -> u64 {
    INDICATOR_POLL_INTERVAL.as_millis() as u64
}

/// Contents of `client.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(flatten)]
    pub backend: BackendClientConfig,

    #[serde(default = "default_control_poll_ms")]
    pub control_poll_interval_ms: u64,

    #[serde(default = "default_indicator_poll_ms")]
    pub indicator_poll_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend: BackendClientConfig::default(),
            control_poll_interval_ms: default_control_poll_ms(),
            indicator_poll_interval_ms: default_indicator_poll_ms(),
        }
    }
}

impl ClientConfig {
    pub fn control_poll_interval(&self) -> Duration {
        Duration::from_millis(self.control_poll_interval_ms.max(1))
    }

    pub fn indicator_poll_interval(&self) -> Duration {
        Duration::from_millis(self.indicator_poll_interval_ms.max(1))
    }
}

/// Platform config directory for this application
pub fn get_config_dir() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join(APP_DIR_NAME);
    Ok(dir)
}

/// Get client config file path
pub fn get_client_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("client.toml"))
}

/// Load client configuration, falling back to defaults if the file is absent
pub fn load_client_config(path: Option<&Path>) -> Result<ClientConfig> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => get_client_config_path()?,
    };

    if !config_path.exists() {
        tracing::debug!("No client config at {}, using defaults", config_path.display());
        return Ok(ClientConfig::default());
    }

    let contents = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read client config {}", config_path.display()))?;

    let config: ClientConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse client config {}", config_path.display()))?;

    Ok(config)
}

/// Save client configuration with owner-only permissions
pub fn save_client_config(config: &ClientConfig, path: Option<&Path>) -> Result<PathBuf> {
    ssh_proxy_common::validate_client_config(&config.backend)?;

    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => get_client_config_path()?,
    };

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    let toml_content = toml::to_string_pretty(config).context("Failed to serialize configuration")?;
    fs::write(&config_path, toml_content).context("Failed to write configuration file")?;

    // auth_token lives in here
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = fs::Permissions::from_mode(0o600);
        fs::set_permissions(&config_path, permissions)
            .context("Failed to set config file permissions")?;
    }

    Ok(config_path)
}
