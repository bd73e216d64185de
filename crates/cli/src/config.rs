// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 SSH Proxy Manager Contributors

// SSH Proxy Manager - CLI Config Module
// Resolves client.toml and wires the core to the HTTP backend

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use ssh_proxy_common::{BackendClient, ConnectionMode};
use ssh_proxy_gui_core::{
    get_client_config_path, load_client_config, save_client_config, AppCore, ClientConfig,
    LocalState,
};

/// Load client configuration from `--config` or the default location
pub fn load(config_path: Option<&Path>) -> Result<ClientConfig> {
    load_client_config(config_path)
}

/// Where client.toml lives for this invocation
pub fn resolve_path(config_path: Option<&Path>) -> Result<PathBuf> {
    match config_path {
        Some(path) => Ok(path.to_path_buf()),
        None => get_client_config_path(),
    }
}

/// Default selection state file; without a config dir selection stays in memory
pub fn default_state_path() -> Option<PathBuf> {
    match LocalState::default_path() {
        Ok(path) => Some(path),
        Err(e) => {
            tracing::warn!("Profile selection will not be remembered: {:#}", e);
            None
        }
    }
}

/// Build the application core against the configured backend
pub fn build_core(config: &ClientConfig, state_path: Option<PathBuf>) -> Result<AppCore> {
    let client = BackendClient::with_config(config.backend.clone())
        .context("Invalid backend connection settings")?;

    tracing::debug!("Using backend at {}", config.backend.backend_base_url());
    Ok(AppCore::new(Arc::new(client), state_path))
}

/// Changes requested by `config set`
#[derive(Debug, Default)]
pub struct ConnectionUpdate {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub token: Option<String>,
    pub https: Option<bool>,
    pub timeout_secs: Option<u64>,
}

impl ConnectionUpdate {
    pub fn is_empty(&self) -> bool {
        self.host.is_none()
            && self.port.is_none()
            && self.token.is_none()
            && self.https.is_none()
            && self.timeout_secs.is_none()
    }

    pub fn apply(self, config: &mut ClientConfig) {
        let backend = &mut config.backend;
        if let Some(host) = self.host {
            backend.backend_host = host;
        }
        if let Some(port) = self.port {
            backend.backend_port = port;
        }
        if let Some(token) = self.token {
            backend.auth_token = token;
        }
        if let Some(https) = self.https {
            backend.connection_mode = if https {
                ConnectionMode::Https
            } else {
                ConnectionMode::Http
            };
        }
        if let Some(timeout) = self.timeout_secs {
            backend.request_timeout_secs = timeout;
        }
    }
}

/// Apply `changes` to the stored configuration and write it back
pub fn update(config_path: Option<&Path>, changes: ConnectionUpdate) -> Result<PathBuf> {
    let mut config = load(config_path)?;
    changes.apply(&mut config);
    save_client_config(&config, config_path)
}
