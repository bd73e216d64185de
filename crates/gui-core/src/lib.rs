// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 SSH Proxy Manager Contributors

//! Framework-agnostic core for SSH Proxy Manager
//!
//! This crate contains the profile store, the session status reconciler, the
//! bounded log stream and the settings cache shared by every front end. Each
//! service is handed its backend explicitly.

pub mod config;
pub mod events;
pub mod local_state;
pub mod logs;
pub mod profiles;
pub mod session;
pub mod settings;
pub mod state;
pub mod view_models;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::{get_client_config_path, load_client_config, save_client_config, ClientConfig};
pub use events::{LogHandler, NoopHandler};
pub use local_state::{resolve_selection, LocalState};
pub use logs::{LevelFilter, LogBuffer, LogStream, LOG_BUFFER_CAPACITY};
pub use profiles::{ProfileDraft, ProfileStore};
pub use session::{PollerHandle, SessionReconciler, CONTROL_POLL_INTERVAL, INDICATOR_POLL_INTERVAL};
pub use settings::{SettingsCache, SettingsPatch};
pub use state::AppCore;
pub use view_models::{ProfileViewModel, SessionViewModel, StatusColor};

// Re-export types from common crate for convenience
pub use ssh_proxy_common::{
    BackendClient, Error, JumpHost, LogEntry, LogLevel, Profile, ProxyBackend, ProxySession,
    ProxyStatus, Settings, Theme,
};
