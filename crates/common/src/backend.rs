// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 SSH Proxy Manager Contributors

//! Command surface of the proxy backend
//!
//! The backend owns the SSH transport, the proxy listeners and all
//! persistence. Front ends only reach it through this trait, so the
//! transport (HTTP, in-process, test double) is interchangeable.

use std::path::Path;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{LogEntry, Profile, ProxySession, Result, Settings};

#[async_trait]
pub trait ProxyBackend: Send + Sync {
    /// All saved profiles
    async fn list_profiles(&self) -> Result<Vec<Profile>>;

    /// A single profile, `None` when the backend does not know the id
    async fn get_profile(&self, id: &str) -> Result<Option<Profile>>;

    async fn add_profile(&self, profile: &Profile) -> Result<Profile>;

    async fn update_profile(&self, profile: &Profile) -> Result<Profile>;

    async fn delete_profile(&self, id: &str) -> Result<()>;

    async fn get_settings(&self) -> Result<Settings>;

    async fn update_settings(&self, settings: &Settings) -> Result<()>;

    async fn get_proxy_status(&self) -> Result<ProxySession>;

    async fn start_proxy(&self, profile_id: &str) -> Result<()>;

    async fn stop_proxy(&self) -> Result<()>;

    async fn test_connection(&self, profile_id: &str) -> Result<()>;

    /// Full retained log history
    async fn get_logs(&self) -> Result<Vec<LogEntry>>;

    async fn clear_logs(&self) -> Result<()>;

    /// Write the backend's retained history to `path`
    async fn save_logs_to_file(&self, path: &Path) -> Result<()>;

    /// Open a push channel of newly emitted log lines
    ///
    /// Each call is an independent subscription that only yields entries
    /// emitted after it was opened. Dropping the receiver ends it.
    async fn subscribe_logs(&self) -> Result<mpsc::Receiver<LogEntry>>;
}
