// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 SSH Proxy Manager Contributors

//! Read/merge/write wrapper around the backend settings

use std::sync::{Arc, Mutex, PoisonError};

use ssh_proxy_common::{ProxyBackend, Result, Settings, Theme};

/// Fields to change; `None` leaves the current value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub theme: Option<Theme>,
    pub language: Option<String>,
    pub verbose: Option<bool>,
    pub log_file: Option<String>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.theme.is_none()
            && self.language.is_none()
            && self.verbose.is_none()
            && self.log_file.is_none()
    }

    pub fn apply(&self, settings: &mut Settings) {
        if let Some(theme) = self.theme {
            settings.theme = theme;
        }
        if let Some(language) = &self.language {
            settings.language = language.clone();
        }
        if let Some(verbose) = self.verbose {
            settings.verbose = verbose;
        }
        if let Some(log_file) = &self.log_file {
            settings.log_file = log_file.clone();
        }
    }
}

pub struct SettingsCache {
    backend: Arc<dyn ProxyBackend>,
    current: Mutex<Option<Settings>>,
}

impl SettingsCache {
    pub fn new(backend: Arc<dyn ProxyBackend>) -> Self {
        Self {
            backend,
            current: Mutex::new(None),
        }
    }

    /// Fetch settings from the backend and cache them
    pub async fn load(&self) -> Result<Settings> {
        let settings = self.backend.get_settings().await?;
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(settings.clone());
        Ok(settings)
    }

    /// Cached settings, if loaded
    pub fn get(&self) -> Option<Settings> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Merge `patch` into the current settings and write the result back
    ///
    /// Loads first if nothing is cached. The cache only changes once the
    /// backend has accepted the write.
    pub async fn update(&self, patch: &SettingsPatch) -> Result<Settings> {
        let mut settings = match self.get() {
            Some(settings) => settings,
            None => self.load().await?,
        };
        patch.apply(&mut settings);

        self.backend.update_settings(&settings).await?;
        tracing::info!("Settings saved");

        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(settings.clone());
        Ok(settings)
    }
}
