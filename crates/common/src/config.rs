// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 SSH Proxy Manager Contributors

// Profile configuration structures for SSH Proxy Manager

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Field, Result, ValidationErrors};

pub const DEFAULT_SSH_PORT: &str = "22";
pub const DEFAULT_HTTP_ADDR: &str = ":8080";

fn default_ssh_port() -> String {
    DEFAULT_SSH_PORT.to_string()
}

fn default_http_addr() -> String {
    DEFAULT_HTTP_ADDR.to_string()
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// How the proxy authenticates against the target host
///
/// Never stored; always derived from which credential fields are filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Password,
    KeyFile,
    /// Neither password nor key: the backend prompts interactively
    Interactive,
}

/// One intermediate SSH hop on the way to the target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JumpHost {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: String,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Default for JumpHost {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_ssh_port(),
            user: String::new(),
            password: None,
        }
    }
}

impl JumpHost {
    pub fn new(host: impl Into<String>, port: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: port.into(),
            user: user.into(),
            password: None,
        }
    }

    /// Legacy `user@host[:port]` form consumed by the backend
    ///
    /// The port segment is left out when it is empty or the SSH default.
    pub fn to_legacy(&self) -> String {
        let mut out = String::new();
        if !self.user.is_empty() {
            out.push_str(&self.user);
            out.push('@');
        }
        out.push_str(&self.host);
        if !self.port.is_empty() && self.port != DEFAULT_SSH_PORT {
            out.push(':');
            out.push_str(&self.port);
        }
        out
    }

    /// Password-less hops fall back to key-based auth
    pub fn auth_mode(&self) -> AuthMode {
        if is_blank(&self.password) {
            AuthMode::KeyFile
        } else {
            AuthMode::Password
        }
    }
}

impl fmt::Display for JumpHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_legacy())
    }
}

/// Parses `user@host:port`, `user@host`, `host:port` or `host`
impl FromStr for JumpHost {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (user, host_part) = match s.split_once('@') {
            Some((user, rest)) if !rest.contains('@') => (user, rest),
            Some(_) => return Err(Error::Config(format!("Invalid jump host: {s}"))),
            None => ("", s),
        };

        let (host, port) = match host_part.split_once(':') {
            Some((host, port)) if !port.contains(':') => (host, port),
            Some(_) => return Err(Error::Config(format!("Invalid host:port: {host_part}"))),
            None => (host_part, DEFAULT_SSH_PORT),
        };

        if host.is_empty() {
            return Err(Error::Config(format!("Jump host has no host name: {s}")));
        }

        Ok(JumpHost::new(host, port, user))
    }
}

/// Legacy string projection of a structured jump-host chain
pub fn project_legacy(hops: &[JumpHost]) -> Vec<String> {
    hops.iter().map(JumpHost::to_legacy).collect()
}

/// Validate a jump-host chain, reporting each offending hop by 1-based index
pub fn validate_jump_hosts(hops: &[JumpHost], errors: &mut ValidationErrors) {
    for (i, hop) in hops.iter().enumerate() {
        let n = i + 1;
        if hop.host.trim().is_empty() {
            errors.push(Field::JumpHostHost(n), format!("Jump host {n} is missing a host"));
        }
        if hop.user.trim().is_empty() {
            errors.push(Field::JumpHostUser(n), format!("Jump host {n} is missing a user"));
        }
    }
}

/// Saved SSH connection and local proxy parameters
///
/// Only the structured jump-host chain is held here. The legacy string list
/// exists solely in [`ProfileRecord`], which is what goes over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "ProfileRecord", from = "ProfileRecord")]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: String,
    pub user: String,
    pub password: Option<String>,
    pub key_file: Option<String>,
    pub http_addr: String,
    pub socks_addr: Option<String>,
    pub system_proxy: bool,
    pub rule_file: Option<String>,
    /// Hops from client to target, target-closest last
    pub jump_hosts: Vec<JumpHost>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// Password wins over key file, key file over interactive
    pub fn auth_mode(&self) -> AuthMode {
        if !is_blank(&self.password) {
            AuthMode::Password
        } else if !is_blank(&self.key_file) {
            AuthMode::KeyFile
        } else {
            AuthMode::Interactive
        }
    }

    /// Legacy jump-host strings, always regenerated from the structured chain
    pub fn legacy_jump_hosts(&self) -> Vec<String> {
        project_legacy(&self.jump_hosts)
    }

    pub fn ssh_server(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate the profile configuration
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
        validate_jump_hosts(&self.jump_hosts, &mut errors);

        errors.into_result()
    }
}

/// Wire form of a profile, carrying both jump-host representations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: String,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<String>,
    #[serde(default)]
    pub jump_hosts: Vec<String>,
    #[serde(default)]
    pub jump_hosts_list: Vec<JumpHost>,
    #[serde(default = "default_http_addr")]
    pub http_addr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socks_addr: Option<String>,
    #[serde(default)]
    pub system_proxy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl From<Profile> for ProfileRecord {
    fn from(profile: Profile) -> Self {
        let jump_hosts = project_legacy(&profile.jump_hosts);
        Self {
            id: profile.id,
            name: profile.name,
            host: profile.host,
            port: profile.port,
            user: profile.user,
            password: non_blank(profile.password),
            key_file: non_blank(profile.key_file),
            jump_hosts,
            jump_hosts_list: profile.jump_hosts,
            http_addr: profile.http_addr,
            socks_addr: non_blank(profile.socks_addr),
            system_proxy: profile.system_proxy,
            rule_file: non_blank(profile.rule_file),
            created_at: profile.created_at,
            updated_at: profile.updated_at,
            last_used_at: profile.last_used_at,
        }
    }
}

impl From<ProfileRecord> for Profile {
    fn from(record: ProfileRecord) -> Self {
        // Older writers only filled the legacy list
        let jump_hosts = if record.jump_hosts_list.is_empty() {
            record
                .jump_hosts
                .iter()
                .filter_map(|s| match s.parse::<JumpHost>() {
                    Ok(hop) => Some(hop),
                    Err(e) => {
                        tracing::warn!("Skipping unreadable jump host in profile {}: {}", record.id, e);
                        None
                    }
                })
                .collect()
        } else {
            record.jump_hosts_list
        };

        let port = if record.port.is_empty() {
            default_ssh_port()
        } else {
            record.port
        };
        let http_addr = if record.http_addr.is_empty() {
            default_http_addr()
        } else {
            record.http_addr
        };

        Self {
            id: record.id,
            name: record.name,
            host: record.host,
            port,
            user: record.user,
            password: non_blank(record.password),
            key_file: non_blank(record.key_file),
            http_addr,
            socks_addr: non_blank(record.socks_addr),
            system_proxy: record.system_proxy,
            rule_file: non_blank(record.rule_file),
            jump_hosts,
            created_at: record.created_at,
            updated_at: record.updated_at,
            last_used_at: record.last_used_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_profile() -> Profile {
        Profile {
            id: "p1".to_string(),
            name: "office".to_string(),
            host: "example.com".to_string(),
            port: "22".to_string(),
            user: "alice".to_string(),
            password: None,
            key_file: None,
            http_addr: ":8080".to_string(),
            socks_addr: None,
            system_proxy: true,
            rule_file: None,
            jump_hosts: Vec::new(),
            created_at: None,
            updated_at: None,
            last_used_at: None,
        }
    }

    #[test]
    fn test_legacy_projection_omits_default_port() {
        let hops = vec![JumpHost::new("a", "22", "u")];
        assert_eq!(project_legacy(&hops), vec!["u@a".to_string()]);

        let hops = vec![JumpHost::new("b", "2200", "v")];
        assert_eq!(project_legacy(&hops), vec!["v@b:2200".to_string()]);
    }

    #[test]
    fn test_legacy_projection_keeps_order() {
        let hops = vec![
            JumpHost::new("bastion", "22", "ops"),
            JumpHost::new("inner", "2022", "svc"),
        ];
        assert_eq!(project_legacy(&hops), vec!["ops@bastion", "svc@inner:2022"]);
    }

    #[test]
    fn test_parse_legacy_jump_host() {
        assert_eq!("u@a".parse::<JumpHost>().unwrap(), JumpHost::new("a", "22", "u"));
        assert_eq!("v@b:2200".parse::<JumpHost>().unwrap(), JumpHost::new("b", "2200", "v"));
        assert_eq!("c:23".parse::<JumpHost>().unwrap(), JumpHost::new("c", "23", ""));
        assert!("a@b@c".parse::<JumpHost>().is_err());
        assert!("u@:22".parse::<JumpHost>().is_err());
        assert!("u@h:1:2".parse::<JumpHost>().is_err());
    }

    #[test]
    fn test_auth_mode_precedence() {
        let mut profile = test_profile();
        assert_eq!(profile.auth_mode(), AuthMode::Interactive);

        profile.key_file = Some("/home/alice/.ssh/id_ed25519".to_string());
        assert_eq!(profile.auth_mode(), AuthMode::KeyFile);

        profile.password = Some("secret".to_string());
        assert_eq!(profile.auth_mode(), AuthMode::Password);

        profile.password = Some("  ".to_string());
        assert_eq!(profile.auth_mode(), AuthMode::KeyFile);
    }

    #[test]
    fn test_profile_validation() {
        assert!(test_profile().validate().is_ok());

        let mut profile = test_profile();
        profile.name.clear();
        profile.host = " ".to_string();
        let err = profile.validate().unwrap_err();
        let errors = err.validation().unwrap();
        assert!(errors.get(Field::Name).is_some());
        assert!(errors.get(Field::Host).is_some());
        assert!(errors.get(Field::User).is_none());
    }

    #[test]
    fn test_jump_host_validation_uses_one_based_index() {
        let mut profile = test_profile();
        profile.jump_hosts = vec![
            JumpHost::new("ok", "22", "u"),
            JumpHost::new("", "22", "u"),
            JumpHost::new("h", "22", ""),
        ];

        let err = profile.validate().unwrap_err();
        let errors = err.validation().unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.get(Field::JumpHostHost(2)), Some("Jump host 2 is missing a host"));
        assert_eq!(errors.get(Field::JumpHostUser(3)), Some("Jump host 3 is missing a user"));
    }

    #[test]
    fn test_serialized_profile_carries_both_forms() {
        let mut profile = test_profile();
        profile.jump_hosts = vec![JumpHost::new("b", "2200", "v")];

        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["jumpHosts"], serde_json::json!(["v@b:2200"]));
        assert_eq!(json["jumpHostsList"][0]["host"], "b");
        assert_eq!(json["keyFile"], serde_json::Value::Null);
    }

    #[test]
    fn test_empty_chain_serializes_as_empty_arrays() {
        let json = serde_json::to_value(test_profile()).unwrap();
        assert_eq!(json["jumpHosts"], serde_json::json!([]));
        assert_eq!(json["jumpHostsList"], serde_json::json!([]));
    }

    #[test]
    fn test_legacy_only_record_is_upgraded() {
        let json = r#"{
            "id": "old",
            "name": "legacy",
            "host": "target",
            "port": "22",
            "user": "root",
            "jumpHosts": ["ops@bastion", "svc@inner:2022"],
            "httpAddr": ":8080",
            "systemProxy": false
        }"#;

        let profile: Profile = serde_json::from_str(json).unwrap();
        assert_eq!(
            profile.jump_hosts,
            vec![JumpHost::new("bastion", "22", "ops"), JumpHost::new("inner", "2022", "svc")]
        );
        assert_eq!(profile.legacy_jump_hosts(), vec!["ops@bastion", "svc@inner:2022"]);
    }

    #[test]
    fn test_structured_list_wins_over_stale_legacy() {
        let json = r#"{
            "id": "drift",
            "name": "drift",
            "host": "target",
            "user": "root",
            "jumpHosts": ["stale@old"],
            "jumpHostsList": [{"host": "new", "port": "2200", "user": "fresh"}]
        }"#;

        let profile: Profile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.legacy_jump_hosts(), vec!["fresh@new:2200"]);
        assert_eq!(profile.http_addr, ":8080");
    }
}
