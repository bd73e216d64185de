// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 SSH Proxy Manager Contributors

//! Framework-agnostic application state

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ssh_proxy_common::{Error, Profile, ProxyBackend, Result};

use crate::local_state::{resolve_selection, LocalState};
use crate::logs::LogStream;
use crate::profiles::ProfileStore;
use crate::session::SessionReconciler;
use crate::settings::SettingsCache;

/// Core application state (framework-agnostic)
///
/// Owns the four services, all talking to the same injected backend. Front
/// ends hold one of these and read the services directly; nothing is looked
/// up ambiently.
pub struct AppCore {
    pub profiles: ProfileStore,
    pub session: Arc<SessionReconciler>,
    pub logs: LogStream,
    pub settings: SettingsCache,

    /// Where the last selection is persisted; `None` keeps it in memory
    state_path: Option<PathBuf>,
    local: Mutex<LocalState>,
}

impl AppCore {
    pub fn new(backend: Arc<dyn ProxyBackend>, state_path: Option<PathBuf>) -> Self {
        let local = match &state_path {
            Some(path) => LocalState::load(path).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable local state: {:#}", e);
                LocalState::default()
            }),
            None => LocalState::default(),
        };

        Self {
            profiles: ProfileStore::new(Arc::clone(&backend)),
            session: Arc::new(SessionReconciler::new(Arc::clone(&backend))),
            logs: LogStream::new(Arc::clone(&backend)),
            settings: SettingsCache::new(backend),
            state_path,
            local: Mutex::new(local),
        }
    }

    fn local(&self) -> MutexGuard<'_, LocalState> {
        self.local.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stored selection id, which may point at a deleted profile
    pub fn last_profile_id(&self) -> Option<String> {
        self.local().last_profile_id.clone()
    }

    /// Selected profile among the cached list
    pub fn selected_profile(&self) -> Option<Profile> {
        let profiles = self.profiles.cached();
        let stored = self.last_profile_id();
        resolve_selection(&profiles, stored.as_deref()).cloned()
    }

    /// Reload profiles and resolve the selection against them
    pub async fn refresh_selection(&self) -> Result<Option<Profile>> {
        self.profiles.list().await?;
        Ok(self.selected_profile())
    }

    /// Remember `profile_id` as the selection
    ///
    /// Persisting is best effort: a write failure is logged, the in-memory
    /// selection still changes.
    pub fn select_profile(&self, profile_id: &str) -> Result<()> {
        if !self.profiles.cached().iter().any(|p| p.id == profile_id) {
            return Err(Error::ProfileNotFound(profile_id.to_string()));
        }

        let mut local = self.local();
        local.last_profile_id = Some(profile_id.to_string());
        if let Some(path) = &self.state_path {
            if let Err(e) = local.save(path) {
                tracing::warn!("Failed to persist profile selection: {:#}", e);
            }
        }
        Ok(())
    }

    async fn resolve_for_command(&self) -> Result<String> {
        let selected = self.refresh_selection().await?;
        let id = selected.map(|p| p.id).unwrap_or_default();
        if !id.is_empty() {
            self.select_profile(&id)?;
        }
        Ok(id)
    }

    /// Start the selected profile; with no profiles this fails validation
    pub async fn start_selected(&self) -> Result<String> {
        let id = self.resolve_for_command().await?;
        self.session.start(&id).await?;
        Ok(id)
    }

    pub async fn test_selected(&self) -> Result<String> {
        let id = self.resolve_for_command().await?;
        self.session.test(&id).await?;
        Ok(id)
    }
}
