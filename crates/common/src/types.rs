// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 SSH Proxy Manager Contributors

// Common types for SSH Proxy Manager

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Proxy session status as reported by the backend
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProxyStatus {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
}

impl ProxyStatus {
    /// Check if the status represents a running proxy
    pub fn is_running(&self) -> bool {
        matches!(self, ProxyStatus::Running)
    }

    /// Check if the status represents a transitional state
    pub fn is_in_progress(&self) -> bool {
        matches!(self, ProxyStatus::Starting | ProxyStatus::Stopping)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyStatus::Stopped => "stopped",
            ProxyStatus::Starting => "starting",
            ProxyStatus::Running => "running",
            ProxyStatus::Stopping => "stopping",
            ProxyStatus::Error => "error",
        }
    }
}

impl fmt::Display for ProxyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the proxy session, replaced wholesale on every poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxySession {
    pub status: ProxyStatus,
    #[serde(default)]
    pub http_addr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socks_addr: Option<String>,
    #[serde(default)]
    pub ssh_server: String,
    #[serde(default)]
    pub ssh_user: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jump_hosts: Vec<String>,
    #[serde(default)]
    pub system_proxy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// Only present while running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<String>,
    /// Only present in the error state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub total_requests: u64,
}

impl Default for ProxySession {
    fn default() -> Self {
        Self {
            status: ProxyStatus::Stopped,
            http_addr: ":8080".to_string(),
            socks_addr: None,
            ssh_server: String::new(),
            ssh_user: String::new(),
            jump_hosts: Vec::new(),
            system_proxy: false,
            start_time: None,
            uptime: None,
            error_message: None,
            total_requests: 0,
        }
    }
}

impl ProxySession {
    /// Backend-reported session failure, if the session is in the error state
    pub fn session_error(&self) -> Option<&str> {
        if self.status == ProxyStatus::Error {
            Some(self.error_message.as_deref().unwrap_or("Unknown error"))
        } else {
            None
        }
    }

    /// Uptime is only meaningful while running
    pub fn running_uptime(&self) -> Option<&str> {
        if self.status.is_running() {
            self.uptime.as_deref()
        } else {
            None
        }
    }
}

/// Severity of a backend log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            other => Err(Error::Config(format!("Unknown log level: {other}"))),
        }
    }
}

/// One diagnostic line emitted by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Issuance order, strictly increasing
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// UI theme preference
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

impl FromStr for Theme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            "system" => Ok(Theme::System),
            other => Err(Error::Config(format!("Unknown theme: {other}"))),
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Light => f.write_str("light"),
            Theme::Dark => f.write_str("dark"),
            Theme::System => f.write_str("system"),
        }
    }
}

/// Application settings persisted by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub theme: Theme,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub verbose: bool,
    /// Backend log file path (empty = file logging disabled)
    #[serde(default)]
    pub log_file: String,
    #[serde(default)]
    pub auto_start: bool,
    #[serde(default = "default_minimize_to_tray")]
    pub minimize_to_tray: bool,
    #[serde(default)]
    pub auto_connect: bool,
    #[serde(default)]
    pub default_profile: String,
    /// Fields this client does not know about, kept so a write never drops them
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_language() -> String {
    "zh-CN".to_string()
}

fn default_minimize_to_tray() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            language: default_language(),
            verbose: false,
            log_file: String::new(),
            auto_start: false,
            minimize_to_tray: default_minimize_to_tray(),
            auto_connect: false,
            default_profile: String::new(),
            extra: serde_json::Map::new(),
        }
    }
}
