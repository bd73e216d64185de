// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 SSH Proxy Manager Contributors

//! Server-Sent Events listener for the backend's live log stream
//!
//! Framework-agnostic SSE client that works with any async runtime (tokio).

use anyhow::Context;
use futures_util::StreamExt;
use reqwest::{Client, Response};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

use crate::backend_client::{add_auth_header, create_stream_client, BackendClientConfig};
use crate::LogEntry;

/// Capacity of the per-subscription channel
const CHANNEL_CAPACITY: usize = 256;

/// Reconnect delay, doubled per failed attempt and reset once connected
struct Backoff {
    current: Duration,
}

impl Backoff {
    const INITIAL: Duration = Duration::from_secs(1);
    const MAX: Duration = Duration::from_secs(30);

    fn new() -> Self {
        Self { current: Self::INITIAL }
    }

    fn reset(&mut self) {
        self.current = Self::INITIAL;
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(Self::MAX);
        delay
    }
}

/// Listener for the backend's `/api/logs/events` stream
pub struct LogEventListener {
    config: BackendClientConfig,
}

impl LogEventListener {
    /// Create a new event listener
    pub fn new(config: BackendClientConfig) -> Self {
        Self { config }
    }

    /// Start listening to log events
    /// Returns a channel receiver that yields LogEntry items in arrival order.
    /// Reconnects with exponential backoff if the stream drops; lines emitted
    /// while disconnected are not replayed. Dropping the receiver stops it.
    pub async fn listen(&self) -> crate::Result<mpsc::Receiver<LogEntry>> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        // No total deadline: the stream stays open for as long as we are subscribed
        let client = create_stream_client(&self.config)?;
        let config = self.config.clone();
        tokio::spawn(async move {
            let mut backoff = Backoff::new();

            loop {
                tokio::select! {
                    _ = Self::run_once(&client, &config, &tx, &mut backoff) => {}
                    _ = tx.closed() => {
                        tracing::debug!("Log subscriber dropped, stopping event listener");
                        break;
                    }
                }

                if tx.is_closed() {
                    break;
                }

                sleep(backoff.next_delay()).await;
            }
        });

        Ok(rx)
    }

    async fn run_once(
        client: &Client,
        config: &BackendClientConfig,
        tx: &mpsc::Sender<LogEntry>,
        backoff: &mut Backoff,
    ) {
        let response = match Self::connect(client, config).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Log event stream error: {:#}", e);
                return;
            }
        };

        tracing::debug!("Connected to backend log event stream");
        backoff.reset();
        Self::forward_events(response, tx).await;
        tracing::debug!("Log event stream closed by backend");
    }

    async fn connect(client: &Client, config: &BackendClientConfig) -> anyhow::Result<Response> {
        let url = format!("{}/api/logs/events", config.backend_base_url());
        let request = add_auth_header(client.get(&url), config);

        let response = request
            .send()
            .await
            .context("Failed to connect to log event stream")?;

        if !response.status().is_success() {
            anyhow::bail!("Log event stream request failed: {}", response.status());
        }

        Ok(response)
    }

    async fn forward_events(response: Response, tx: &mpsc::Sender<LogEntry>) {
        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::error!("Error reading log event stream: {}", e);
                    return;
                }
            };

            buffer.extend_from_slice(&bytes);

            while let Some(message) = take_message(&mut buffer) {
                if let Some(entry) = parse_sse_message(&message) {
                    if tx.send(entry).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

/// Split the next complete event off the front of `buffer`
///
/// Events end at a blank line, `\n\n` or `\r\n\r\n`. Bytes are decoded one
/// whole event at a time so a character split across reads stays intact.
fn take_message(buffer: &mut Vec<u8>) -> Option<String> {
    let lf = find_bytes(buffer, b"\n\n").map(|pos| (pos, 2));
    let crlf = find_bytes(buffer, b"\r\n\r\n").map(|pos| (pos, 4));
    let (pos, len) = match (lf, crlf) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (a, b) => a.or(b)?,
    };

    let message = String::from_utf8_lossy(&buffer[..pos]).into_owned();
    buffer.drain(..pos + len);
    Some(message)
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Parse an SSE message into a LogEntry
///
/// Comment lines and non-data fields are ignored; multiple `data:` lines are
/// joined with newlines as the SSE format requires.
pub fn parse_sse_message(message: &str) -> Option<LogEntry> {
    let mut data = String::new();
    for line in message.lines() {
        let line = line.trim_end_matches('\r');
        if line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }

    if data.trim().is_empty() {
        return None;
    }

    match serde_json::from_str::<LogEntry>(&data) {
        Ok(entry) => Some(entry),
        Err(e) => {
            tracing::warn!("Failed to parse log event: {} (error: {})", data, e);
            None
        }
    }
}
