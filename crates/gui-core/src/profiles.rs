// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 SSH Proxy Manager Contributors

//! Profile operations and validation

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ssh_proxy_common::{
    project_legacy, validate_jump_hosts, Field, JumpHost, Profile, ProxyBackend, Result,
    ValidationErrors, DEFAULT_HTTP_ADDR, DEFAULT_SSH_PORT,
};
use uuid::Uuid;

fn optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Editable form state for creating or changing a profile
///
/// Optional fields are plain strings here; blank means absent. The jump-host
/// rows survive toggling `jump_hosts_enabled` off, but a draft saved while
/// disabled writes an empty chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileDraft {
    pub name: String,
    pub host: String,
    pub port: String,
    pub user: String,
    pub password: String,
    pub key_file: String,
    pub http_addr: String,
    pub socks_addr: String,
    pub system_proxy: bool,
    pub rule_file: String,
    pub(crate) jump_hosts_enabled: bool,
    pub(crate) jump_hosts: Vec<JumpHost>,
}

impl Default for ProfileDraft {
    fn default() -> Self {
        Self {
            name: String::new(),
            host: String::new(),
            port: DEFAULT_SSH_PORT.to_string(),
            user: String::new(),
            password: String::new(),
            key_file: String::new(),
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            socks_addr: String::new(),
            system_proxy: true,
            rule_file: String::new(),
            jump_hosts_enabled: false,
            jump_hosts: Vec::new(),
        }
    }
}

impl ProfileDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start editing an existing profile
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            name: profile.name.clone(),
            host: profile.host.clone(),
            port: profile.port.clone(),
            user: profile.user.clone(),
            password: profile.password.clone().unwrap_or_default(),
            key_file: profile.key_file.clone().unwrap_or_default(),
            http_addr: profile.http_addr.clone(),
            socks_addr: profile.socks_addr.clone().unwrap_or_default(),
            system_proxy: profile.system_proxy,
            rule_file: profile.rule_file.clone().unwrap_or_default(),
            jump_hosts_enabled: !profile.jump_hosts.is_empty(),
            jump_hosts: profile.jump_hosts.clone(),
        }
    }

    pub fn jump_hosts_enabled(&self) -> bool {
        self.jump_hosts_enabled
    }

    /// Toggle the jump-host chain
    ///
    /// Enabling an empty chain seeds one blank hop. Disabling keeps the rows.
    pub fn set_jump_hosts_enabled(&mut self, enabled: bool) {
        self.jump_hosts_enabled = enabled;
        if enabled && self.jump_hosts.is_empty() {
            self.jump_hosts.push(JumpHost::default());
        }
    }

    /// Editor rows, including ones hidden while the chain is disabled
    pub fn jump_hosts(&self) -> &[JumpHost] {
        &self.jump_hosts
    }

    pub fn add_jump_host(&mut self, hop: JumpHost) {
        self.jump_hosts.push(hop);
    }

    pub fn remove_jump_host(&mut self, index: usize) -> Option<JumpHost> {
        if index < self.jump_hosts.len() {
            Some(self.jump_hosts.remove(index))
        } else {
            None
        }
    }

    pub fn jump_host_mut(&mut self, index: usize) -> Option<&mut JumpHost> {
        self.jump_hosts.get_mut(index)
    }

    /// The chain that would be saved right now
    pub fn effective_jump_hosts(&self) -> Vec<JumpHost> {
        if self.jump_hosts_enabled {
            self.jump_hosts.clone()
        } else {
            Vec::new()
        }
    }

    /// Legacy strings the saved profile will carry
    pub fn legacy_preview(&self) -> Vec<String> {
        project_legacy(&self.effective_jump_hosts())
    }

    /// Check required fields and, if enabled, every hop
    pub fn validate(&self) -> Result<()> {
        let mut errors = ValidationErrors::new();

        if self.name.trim().is_empty() {
            errors.push(Field::Name, "Profile name cannot be empty");
        }
        if self.host.trim().is_empty() {
            errors.push(Field::Host, "Host cannot be empty");
        }
        if self.user.trim().is_empty() {
            errors.push(Field::User, "User cannot be empty");
        }
        if self.jump_hosts_enabled {
            validate_jump_hosts(&self.jump_hosts, &mut errors);
        }

        errors.into_result()
    }

    /// Build a new profile with the given id
    pub fn to_profile(&self, id: impl Into<String>) -> Profile {
        let port = if self.port.trim().is_empty() {
            DEFAULT_SSH_PORT.to_string()
        } else {
            self.port.trim().to_string()
        };
        let http_addr = if self.http_addr.trim().is_empty() {
            DEFAULT_HTTP_ADDR.to_string()
        } else {
            self.http_addr.trim().to_string()
        };

        Profile {
            id: id.into(),
            name: self.name.trim().to_string(),
            host: self.host.trim().to_string(),
            port,
            user: self.user.trim().to_string(),
            password: optional(&self.password),
            key_file: optional(&self.key_file),
            http_addr,
            socks_addr: optional(&self.socks_addr),
            system_proxy: self.system_proxy,
            rule_file: optional(&self.rule_file),
            jump_hosts: self.effective_jump_hosts(),
            created_at: None,
            updated_at: None,
            last_used_at: None,
        }
    }

    /// Apply the draft on top of an existing profile, keeping its identity
    pub fn apply_to(&self, existing: &Profile) -> Profile {
        Profile {
            created_at: existing.created_at,
            updated_at: existing.updated_at,
            last_used_at: existing.last_used_at,
            ..self.to_profile(existing.id.clone())
        }
    }
}

/// Backend-backed profile CRUD with a cached copy of the list
pub struct ProfileStore {
    backend: Arc<dyn ProxyBackend>,
    cache: Mutex<Vec<Profile>>,
}

impl ProfileStore {
    pub fn new(backend: Arc<dyn ProxyBackend>) -> Self {
        Self {
            backend,
            cache: Mutex::new(Vec::new()),
        }
    }

    fn cache(&self) -> MutexGuard<'_, Vec<Profile>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch all profiles and refresh the cache
    pub async fn list(&self) -> Result<Vec<Profile>> {
        let profiles = self.backend.list_profiles().await?;
        tracing::debug!("Loaded {} profiles", profiles.len());
        *self.cache() = profiles.clone();
        Ok(profiles)
    }

    /// Profiles as of the last successful list or mutation
    pub fn cached(&self) -> Vec<Profile> {
        self.cache().clone()
    }

    pub async fn get(&self, id: &str) -> Result<Option<Profile>> {
        self.backend.get_profile(id).await
    }

    /// Validate the draft and save it under a fresh id
    pub async fn create(&self, draft: &ProfileDraft) -> Result<Profile> {
        draft.validate()?;

        let profile = draft.to_profile(Uuid::new_v4().to_string());
        let saved = self.backend.add_profile(&profile).await?;
        tracing::info!("Created profile '{}' ({})", saved.name, saved.id);

        self.cache().push(saved.clone());
        Ok(saved)
    }

    /// Validate and write back an existing profile
    pub async fn update(&self, profile: &Profile) -> Result<Profile> {
        if profile.id.trim().is_empty() {
            return Err(ValidationErrors::single(Field::ProfileId, "Profile id is required").into());
        }
        profile.validate()?;

        let saved = self.backend.update_profile(profile).await?;
        tracing::info!("Updated profile '{}' ({})", saved.name, saved.id);

        let mut cache = self.cache();
        match cache.iter_mut().find(|p| p.id == saved.id) {
            Some(slot) => *slot = saved.clone(),
            None => cache.push(saved.clone()),
        }
        Ok(saved)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.backend.delete_profile(id).await?;
        tracing::info!("Deleted profile {}", id);
        self.cache().retain(|p| p.id != id);
        Ok(())
    }

    /// Check if a profile name is already taken (excluding given id)
    pub fn name_exists(&self, name: &str, exclude_id: Option<&str>) -> bool {
        let name = name.trim();
        self.cache().iter().any(|p| {
            p.name.trim().eq_ignore_ascii_case(name) && exclude_id.map_or(true, |id| p.id != id)
        })
    }
}
