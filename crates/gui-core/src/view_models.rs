// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 SSH Proxy Manager Contributors

//! View models - Data structures prepared for UI display

use ssh_proxy_common::{AuthMode, Profile, ProxySession, ProxyStatus};

/// Status color for UI indicators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusColor {
    Green,  // Running
    Orange, // Starting, Stopping
    Red,    // Error
    Gray,   // Stopped
}

/// Proxy session prepared for the control view and status indicator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionViewModel {
    pub status: ProxyStatus,
    pub status_color: StatusColor,
    pub status_text: String,
    pub connection_summary: String,
    pub http_addr: String,
    pub socks_addr: Option<String>,
    pub uptime: Option<String>,
    pub total_requests: u64,
    pub error_message: Option<String>,
    pub can_start: bool,
    pub can_stop: bool,
    pub can_test: bool,
}

impl SessionViewModel {
    /// Derive display state from a snapshot and the local in-flight flags
    pub fn from_session(session: &ProxySession, action_loading: bool, test_loading: bool) -> Self {
        let status = session.status;
        let can_start =
            matches!(status, ProxyStatus::Stopped | ProxyStatus::Error) && !action_loading;
        let can_stop =
            matches!(status, ProxyStatus::Running | ProxyStatus::Starting) && !action_loading;
        let can_test = !status.is_running() && !test_loading;

        let connection_summary = if session.ssh_server.is_empty() {
            String::new()
        } else if session.ssh_user.is_empty() {
            session.ssh_server.clone()
        } else {
            format!("{}@{}", session.ssh_user, session.ssh_server)
        };

        Self {
            status,
            status_color: Self::status_color_for(status),
            status_text: Self::status_text_for(status).to_string(),
            connection_summary,
            http_addr: session.http_addr.clone(),
            socks_addr: session.socks_addr.clone(),
            uptime: session.running_uptime().map(str::to_string),
            total_requests: session.total_requests,
            error_message: session.session_error().map(str::to_string),
            can_start,
            can_stop,
            can_test,
        }
    }

    pub fn status_color_for(status: ProxyStatus) -> StatusColor {
        match status {
            ProxyStatus::Running => StatusColor::Green,
            ProxyStatus::Error => StatusColor::Red,
            status if status.is_in_progress() => StatusColor::Orange,
            _ => StatusColor::Gray,
        }
    }

    /// Get human-readable status text
    pub fn status_text_for(status: ProxyStatus) -> &'static str {
        match status {
            ProxyStatus::Stopped => "Stopped",
            ProxyStatus::Starting => "Starting...",
            ProxyStatus::Running => "Running",
            ProxyStatus::Stopping => "Stopping...",
            ProxyStatus::Error => "Error",
        }
    }
}

/// Profile data prepared for UI display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileViewModel {
    pub id: String,
    pub name: String,
    pub connection_summary: String,
    pub auth_type_display: String,
    pub jump_chain: String,
    pub http_addr: String,
    pub system_proxy: bool,
}

impl ProfileViewModel {
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            id: profile.id.clone(),
            name: profile.name.clone(),
            connection_summary: format!("{}@{}", profile.user, profile.ssh_server()),
            auth_type_display: Self::format_auth_type(profile),
            jump_chain: Self::format_jump_chain(profile),
            http_addr: profile.http_addr.clone(),
            system_proxy: profile.system_proxy,
        }
    }

    fn format_auth_type(profile: &Profile) -> String {
        match profile.auth_mode() {
            AuthMode::Password => "Password".to_string(),
            AuthMode::KeyFile => match &profile.key_file {
                Some(path) => format!("SSH Key: {}", path),
                None => "SSH Key".to_string(),
            },
            AuthMode::Interactive => "Interactive".to_string(),
        }
    }

    /// `hop → hop → target`, or empty for a direct connection
    fn format_jump_chain(profile: &Profile) -> String {
        if profile.jump_hosts.is_empty() {
            return String::new();
        }
        profile
            .jump_hosts
            .iter()
            .map(|hop| hop.host.as_str())
            .chain(std::iter::once(profile.host.as_str()))
            .collect::<Vec<_>>()
            .join(" → ")
    }
}

/// Create view models for all profiles
pub fn create_profile_view_models(profiles: &[Profile]) -> Vec<ProfileViewModel> {
    profiles.iter().map(ProfileViewModel::from_profile).collect()
}
