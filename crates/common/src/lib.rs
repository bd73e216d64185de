// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 SSH Proxy Manager Contributors

// SSH Proxy Manager - Common Library
// Shared types, backend command surface and HTTP transport

pub mod backend;
pub mod backend_client;
pub mod config;
pub mod error;
pub mod network;
pub mod sse;
pub mod types;

pub use backend::ProxyBackend;
pub use backend_client::{
    add_auth_header, create_backend_client, create_stream_client, validate_client_config,
    BackendClient, BackendClientConfig, ConnectionMode,
};
pub use config::{
    project_legacy, validate_jump_hosts, AuthMode, JumpHost, Profile, ProfileRecord,
    DEFAULT_HTTP_ADDR, DEFAULT_SSH_PORT,
};
pub use error::{Error, Field, FieldError, Result, ValidationErrors};
pub use network::{format_host_port, is_loopback_address};
pub use sse::LogEventListener;
pub use types::{LogEntry, LogLevel, ProxySession, ProxyStatus, Settings, Theme};

// Re-export commonly used external types
pub use chrono::{DateTime, Utc};
