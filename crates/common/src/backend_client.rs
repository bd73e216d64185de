// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 SSH Proxy Manager Contributors

// SSH Proxy Manager - Backend Client Module
// HTTP/JSON transport for the ProxyBackend command surface

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::backend::ProxyBackend;
use crate::network::{format_host_port, is_loopback_address};
use crate::sse::LogEventListener;
use crate::{Error, LogEntry, Profile, ProxySession, Result, Settings};

/// Connection mode for client to backend communication
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionMode {
    /// HTTP (localhost only, no TLS)
    #[default]
    Http,
    /// HTTPS with TLS
    Https,
}

/// Client configuration for connecting to the backend
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BackendClientConfig {
    #[serde(default)]
    pub connection_mode: ConnectionMode,

    /// Backend host (e.g., "127.0.0.1")
    #[serde(default = "default_backend_host")]
    pub backend_host: String,

    #[serde(default = "default_backend_port")]
    pub backend_port: u16,

    /// Authentication token (if the backend requires auth)
    #[serde(default)]
    pub auth_token: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_backend_host() -> String {
    "127.0.0.1".to_string()
}

fn default_backend_port() -> u16 {
    8765
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for BackendClientConfig {
    fn default() -> Self {
        Self {
            connection_mode: ConnectionMode::default(),
            backend_host: default_backend_host(),
            backend_port: default_backend_port(),
            auth_token: String::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl BackendClientConfig {
    /// Get the backend base URL based on connection mode
    pub fn backend_base_url(&self) -> String {
        let host_port = format_host_port(&self.backend_host, self.backend_port);
        match self.connection_mode {
            ConnectionMode::Http => format!("http://{}", host_port),
            ConnectionMode::Https => format!("https://{}", host_port),
        }
    }
}

/// Validate backend client configuration completeness
pub fn validate_client_config(config: &BackendClientConfig) -> Result<()> {
    if config.backend_host.trim().is_empty() {
        return Err(Error::Config("backend_host cannot be empty".to_string()));
    }

    if config.backend_port == 0 {
        return Err(Error::Config("backend_port must be greater than 0".to_string()));
    }

    if config.connection_mode == ConnectionMode::Http && !is_loopback_address(&config.backend_host) {
        tracing::warn!(
            "Plain HTTP to non-local backend {} sends credentials unencrypted; consider https",
            config.backend_host
        );
    }

    Ok(())
}

/// Create an HTTP client configured to connect to the backend
pub fn create_backend_client(config: &BackendClientConfig) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
        .map_err(|e| Error::Config(format!("Failed to build backend client: {e}")))
}

/// Create an HTTP client for long-lived streams
///
/// reqwest's `timeout` covers the whole body, so streams get a connect
/// timeout and TCP keepalive instead.
pub fn create_stream_client(config: &BackendClientConfig) -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(config.request_timeout_secs))
        .tcp_keepalive(Duration::from_secs(30))
        .build()
        .map_err(|e| Error::Config(format!("Failed to build backend stream client: {e}")))
}

/// Add authentication header to request if configured
pub fn add_auth_header(request: RequestBuilder, config: &BackendClientConfig) -> RequestBuilder {
    if !config.auth_token.is_empty() {
        request.header("X-Proxy-Token", &config.auth_token)
    } else {
        request
    }
}

/// Error response from backend API
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileIdRequest<'a> {
    profile_id: &'a str,
}

#[derive(Debug, Serialize)]
struct ExportRequest<'a> {
    path: &'a str,
}

/// Backend client speaking the HTTP/JSON API
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    pub config: BackendClientConfig,
}

impl BackendClient {
    /// Create a backend client with custom configuration
    pub fn with_config(config: BackendClientConfig) -> Result<Self> {
        validate_client_config(&config)?;
        let client = create_backend_client(&config)?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.backend_base_url(), path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = add_auth_header(request, &self.config).send().await?;
        Ok(response)
    }

    /// Turn a non-success response into a backend error
    async fn rejection(response: Response, action: &str) -> Error {
        let status = response.status();
        let message = response
            .json::<ErrorResponse>()
            .await
            .map(|e| e.error)
            .unwrap_or_else(|_| format!("HTTP {}", status));
        Error::Backend(format!("{}: {}", action, message))
    }

    async fn expect_json<T: DeserializeOwned>(response: Response, action: &str) -> Result<T> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            Err(Self::rejection(response, action).await)
        }
    }

    async fn expect_ok(response: Response, action: &str) -> Result<()> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::rejection(response, action).await)
        }
    }

}

#[async_trait]
impl ProxyBackend for BackendClient {
    async fn list_profiles(&self) -> Result<Vec<Profile>> {
        let response = self.send(self.client.get(self.url("/api/profiles"))).await?;
        Self::expect_json(response, "Failed to list profiles").await
    }

    async fn get_profile(&self, id: &str) -> Result<Option<Profile>> {
        let url = self.url(&format!("/api/profiles/{}", id));
        let response = self.send(self.client.get(url)).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::expect_json(response, "Failed to get profile").await.map(Some)
    }

    async fn add_profile(&self, profile: &Profile) -> Result<Profile> {
        let response = self
            .send(self.client.post(self.url("/api/profiles")).json(profile))
            .await?;
        Self::expect_json(response, "Failed to add profile").await
    }

    async fn update_profile(&self, profile: &Profile) -> Result<Profile> {
        let url = self.url(&format!("/api/profiles/{}", profile.id));
        let response = self.send(self.client.put(url).json(profile)).await?;
        Self::expect_json(response, "Failed to update profile").await
    }

    async fn delete_profile(&self, id: &str) -> Result<()> {
        let url = self.url(&format!("/api/profiles/{}", id));
        let response = self.send(self.client.delete(url)).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::ProfileNotFound(id.to_string()));
        }
        Self::expect_ok(response, "Failed to delete profile").await
    }

    async fn get_settings(&self) -> Result<Settings> {
        let response = self.send(self.client.get(self.url("/api/settings"))).await?;
        Self::expect_json(response, "Failed to get settings").await
    }

    async fn update_settings(&self, settings: &Settings) -> Result<()> {
        let response = self
            .send(self.client.put(self.url("/api/settings")).json(settings))
            .await?;
        Self::expect_ok(response, "Failed to update settings").await
    }

    async fn get_proxy_status(&self) -> Result<ProxySession> {
        let response = self.send(self.client.get(self.url("/api/proxy/status"))).await?;
        Self::expect_json(response, "Failed to get proxy status").await
    }

    async fn start_proxy(&self, profile_id: &str) -> Result<()> {
        let body = ProfileIdRequest { profile_id };
        let response = self
            .send(self.client.post(self.url("/api/proxy/start")).json(&body))
            .await?;
        Self::expect_ok(response, "Failed to start proxy").await
    }

    async fn stop_proxy(&self) -> Result<()> {
        let response = self.send(self.client.post(self.url("/api/proxy/stop"))).await?;
        Self::expect_ok(response, "Failed to stop proxy").await
    }

    async fn test_connection(&self, profile_id: &str) -> Result<()> {
        let body = ProfileIdRequest { profile_id };
        let response = self
            .send(self.client.post(self.url("/api/proxy/test")).json(&body))
            .await?;
        Self::expect_ok(response, "Connection test failed").await
    }

    async fn get_logs(&self) -> Result<Vec<LogEntry>> {
        let response = self.send(self.client.get(self.url("/api/logs"))).await?;
        Self::expect_json(response, "Failed to get logs").await
    }

    async fn clear_logs(&self) -> Result<()> {
        let response = self.send(self.client.delete(self.url("/api/logs"))).await?;
        Self::expect_ok(response, "Failed to clear logs").await
    }

    async fn save_logs_to_file(&self, path: &Path) -> Result<()> {
        let path = path
            .to_str()
            .ok_or_else(|| Error::Config(format!("Export path is not valid UTF-8: {}", path.display())))?;
        let body = ExportRequest { path };
        let response = self
            .send(self.client.post(self.url("/api/logs/export")).json(&body))
            .await?;
        Self::expect_ok(response, "Failed to save logs").await
    }

    async fn subscribe_logs(&self) -> Result<mpsc::Receiver<LogEntry>> {
        LogEventListener::new(self.config.clone()).listen().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::JumpHost;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    #[derive(Debug, Clone)]
    struct Recorded {
        method: String,
        path: String,
        headers: Vec<(String, String)>,
        body: String,
    }

    impl Recorded {
        fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str())
        }

        fn json(&self) -> serde_json::Value {
            serde_json::from_str(&self.body).unwrap()
        }
    }

    type Responder = fn(&str, &str) -> (u16, String);

    async fn read_request(socket: &mut TcpStream) -> Option<Recorded> {
        let mut raw = Vec::new();
        let mut buf = [0u8; 1024];
        let head_end = loop {
            if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos;
            }
            let n = socket.read(&mut buf).await.ok()?;
            if n == 0 {
                return None;
            }
            raw.extend_from_slice(&buf[..n]);
        };

        let head = String::from_utf8_lossy(&raw[..head_end]).into_owned();
        let mut lines = head.split("\r\n");
        let mut request_line = lines.next()?.split(' ');
        let method = request_line.next()?.to_string();
        let path = request_line.next()?.to_string();
        let headers: Vec<(String, String)> = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .collect();

        let length = headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.parse::<usize>().ok())
            .unwrap_or(0);
        let mut body = raw[head_end + 4..].to_vec();
        while body.len() < length {
            let n = socket.read(&mut buf).await.ok()?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&buf[..n]);
        }

        Some(Recorded {
            method,
            path,
            headers,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }

    /// One-request-per-connection HTTP stub that records what it receives
    async fn stub_backend(respond: Responder) -> (BackendClientConfig, Arc<Mutex<Vec<Recorded>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let recorded = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&recorded);
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    let Some(request) = read_request(&mut socket).await else {
                        return;
                    };
                    let (status, body) = respond(&request.method, &request.path);
                    log.lock().unwrap().push(request);
                    let response = format!(
                        "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        let config = BackendClientConfig {
            backend_port: port,
            request_timeout_secs: 5,
            ..Default::default()
        };
        (config, recorded)
    }

    fn last(recorded: &Arc<Mutex<Vec<Recorded>>>) -> Recorded {
        recorded.lock().unwrap().last().cloned().unwrap()
    }

    const PROFILE_JSON: &str = r#"{"id":"p1","name":"office","host":"10.0.0.5","port":"22","user":"deploy","jumpHosts":["ops@bastion"],"jumpHostsList":[{"host":"bastion","port":"22","user":"ops"}],"httpAddr":":8080","systemProxy":true}"#;

    fn profile_routes(method: &str, path: &str) -> (u16, String) {
        match (method, path) {
            ("GET", "/api/profiles/p1") => (200, PROFILE_JSON.to_string()),
            ("POST", "/api/profiles") => (200, PROFILE_JSON.to_string()),
            ("DELETE", "/api/profiles/p1") => (204, String::new()),
            (_, "/api/proxy/start") => (200, "{}".to_string()),
            _ => (404, r#"{"error":"not found"}"#.to_string()),
        }
    }

    #[test]
    fn test_default_config() {
        let config = BackendClientConfig::default();
        assert_eq!(config.connection_mode, ConnectionMode::Http);
        assert_eq!(config.backend_host, "127.0.0.1");
        assert_eq!(config.backend_port, 8765);
        assert!(validate_client_config(&config).is_ok());
    }

    #[test]
    fn test_backend_base_url() {
        let mut config = BackendClientConfig::default();
        assert_eq!(config.backend_base_url(), "http://127.0.0.1:8765");

        config.connection_mode = ConnectionMode::Https;
        config.backend_host = "::1".to_string();
        config.backend_port = 443;
        assert_eq!(config.backend_base_url(), "https://[::1]:443");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = BackendClientConfig {
            backend_host: " ".to_string(),
            ..Default::default()
        };
        assert!(matches!(validate_client_config(&config), Err(Error::Config(_))));

        let config = BackendClientConfig {
            backend_port: 0,
            ..Default::default()
        };
        assert!(BackendClient::with_config(config).is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let config: BackendClientConfig = toml::from_str(
            r#"
            connection_mode = "https"
            backend_host = "proxy.lan"
            auth_token = "abc"
            "#,
        )
        .unwrap();
        assert_eq!(config.connection_mode, ConnectionMode::Https);
        assert_eq!(config.backend_port, 8765);
        assert_eq!(config.auth_token, "abc");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_unavailable() {
        // Port 9 (discard) on loopback is closed in test environments
        let client = BackendClient::with_config(BackendClientConfig {
            backend_port: 9,
            request_timeout_secs: 2,
            ..Default::default()
        })
        .unwrap();

        let err = client.get_proxy_status().await.unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn test_get_profile_found_and_missing() {
        let (config, _) = stub_backend(profile_routes).await;
        let client = BackendClient::with_config(config).unwrap();

        let profile = client.get_profile("p1").await.unwrap().unwrap();
        assert_eq!(profile.name, "office");
        assert_eq!(profile.jump_hosts, vec![JumpHost::new("bastion", "22", "ops")]);

        assert!(client.get_profile("gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_profile_is_not_found() {
        let (config, recorded) = stub_backend(profile_routes).await;
        let client = BackendClient::with_config(config).unwrap();

        client.delete_profile("p1").await.unwrap();
        assert_eq!(last(&recorded).method, "DELETE");

        let err = client.delete_profile("gone").await.unwrap_err();
        assert!(matches!(err, Error::ProfileNotFound(id) if id == "gone"));
    }

    #[tokio::test]
    async fn test_error_body_becomes_backend_error() {
        let (config, _) = stub_backend(|_, _| (500, r#"{"error":"ssh handshake failed"}"#.to_string())).await;
        let client = BackendClient::with_config(config).unwrap();

        let err = client.test_connection("p1").await.unwrap_err();
        match &err {
            Error::Backend(message) => assert!(message.contains("ssh handshake failed")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_token_header_sent_only_when_configured() {
        let (config, recorded) = stub_backend(profile_routes).await;

        let client = BackendClient::with_config(config.clone()).unwrap();
        client.get_profile("p1").await.unwrap();
        assert!(last(&recorded).header("x-proxy-token").is_none());

        let client = BackendClient::with_config(BackendClientConfig {
            auth_token: "s3cret".to_string(),
            ..config
        })
        .unwrap();
        client.get_profile("p1").await.unwrap();
        assert_eq!(last(&recorded).header("x-proxy-token"), Some("s3cret"));
    }

    #[tokio::test]
    async fn test_add_profile_sends_both_jump_host_forms() {
        let (config, recorded) = stub_backend(profile_routes).await;
        let client = BackendClient::with_config(config).unwrap();

        let mut profile: Profile = serde_json::from_str(PROFILE_JSON).unwrap();
        profile.jump_hosts = vec![JumpHost::new("a", "22", "u"), JumpHost::new("b", "2200", "v")];
        client.add_profile(&profile).await.unwrap();

        let request = last(&recorded);
        assert_eq!((request.method.as_str(), request.path.as_str()), ("POST", "/api/profiles"));
        let body = request.json();
        assert_eq!(body["jumpHosts"], serde_json::json!(["u@a", "v@b:2200"]));
        assert_eq!(body["jumpHostsList"][1]["port"], "2200");
        assert_eq!(body["httpAddr"], ":8080");
        assert_eq!(body["systemProxy"], true);
        assert!(body.get("jump_hosts").is_none());
    }

    #[tokio::test]
    async fn test_start_sends_profile_id() {
        let (config, recorded) = stub_backend(profile_routes).await;
        let client = BackendClient::with_config(config).unwrap();

        client.start_proxy("p1").await.unwrap();
        let request = last(&recorded);
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/api/proxy/start");
        assert_eq!(request.json(), serde_json::json!({ "profileId": "p1" }));
    }
}
