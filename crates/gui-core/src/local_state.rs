// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 SSH Proxy Manager Contributors

//! Client-side state that survives restarts (not stored by the backend)

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use ssh_proxy_common::Profile;

use crate::config::get_config_dir;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalState {
    /// Profile last chosen on the control view
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_profile_id: Option<String>,
}

impl LocalState {
    pub fn default_path() -> Result<PathBuf> {
        Ok(get_config_dir()?.join("state.toml"))
    }

    /// Read state from `path`; a missing file is an empty state
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse state file {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create state directory")?;
        }
        let contents = toml::to_string_pretty(self).context("Failed to serialize state")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write state file {}", path.display()))?;
        Ok(())
    }
}

/// Pick the profile to preselect
///
/// The stored id wins if that profile still exists, otherwise the first
/// profile, otherwise nothing.
pub fn resolve_selection<'a>(profiles: &'a [Profile], stored: Option<&str>) -> Option<&'a Profile> {
    stored
        .and_then(|id| profiles.iter().find(|p| p.id == id))
        .or_else(|| profiles.first())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::ProfileDraft;

    fn profile(id: &str) -> Profile {
        ProfileDraft {
            name: id.to_string(),
            host: "h".to_string(),
            user: "u".to_string(),
            ..Default::default()
        }
        .to_profile(id)
    }

    #[test]
    fn test_resolve_selection() {
        let profiles = vec![profile("a"), profile("b")];

        assert_eq!(resolve_selection(&profiles, Some("b")).unwrap().id, "b");
        assert_eq!(resolve_selection(&profiles, Some("deleted")).unwrap().id, "a");
        assert_eq!(resolve_selection(&profiles, None).unwrap().id, "a");
        assert!(resolve_selection(&[], Some("a")).is_none());
    }

    #[test]
    fn test_state_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");

        assert_eq!(LocalState::load(&path).unwrap(), LocalState::default());

        let state = LocalState {
            last_profile_id: Some("b".to_string()),
        };
        state.save(&path).unwrap();
        assert_eq!(LocalState::load(&path).unwrap(), state);
    }
}
