// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 SSH Proxy Manager Contributors

//! Bounded live log stream
//!
//! [`LogBuffer`] is the capped, ordered presentation cache. [`LogStream`]
//! feeds it from the backend's push channel and owns the subscription.

use std::collections::VecDeque;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{NaiveDate, SecondsFormat};
use ssh_proxy_common::{Error, LogEntry, LogLevel, ProxyBackend, Result};
use tokio::task::JoinHandle;

use crate::events::{LogHandler, NoopHandler};

/// Maximum number of entries kept for display
pub const LOG_BUFFER_CAPACITY: usize = 1000;

/// Level predicate for [`LogBuffer::filter`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LevelFilter {
    #[default]
    All,
    Only(LogLevel),
}

impl LevelFilter {
    pub fn matches(&self, level: LogLevel) -> bool {
        match self {
            LevelFilter::All => true,
            LevelFilter::Only(wanted) => *wanted == level,
        }
    }
}

impl FromStr for LevelFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(LevelFilter::All);
        }
        s.parse::<LogLevel>().map(LevelFilter::Only)
    }
}

impl fmt::Display for LevelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelFilter::All => f.write_str("all"),
            LevelFilter::Only(level) => f.write_str(level.as_str()),
        }
    }
}

/// Case-insensitive substring match; an empty search matches everything
pub fn matches_search(message: &str, search: &str) -> bool {
    search.is_empty() || message.to_lowercase().contains(&search.to_lowercase())
}

/// Ring of the most recent log entries in arrival order
#[derive(Debug, Clone, Default)]
pub struct LogBuffer {
    entries: VecDeque<LogEntry>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail, evicting from the head past capacity
    pub fn append(&mut self, entry: LogEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > LOG_BUFFER_CAPACITY {
            self.entries.pop_front();
        }
    }

    /// Replace the contents, keeping only the newest entries that fit
    pub fn replace(&mut self, entries: Vec<LogEntry>) {
        let skip = entries.len().saturating_sub(LOG_BUFFER_CAPACITY);
        self.entries = entries.into_iter().skip(skip).collect();
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Entries passing both the level and the text predicate
    pub fn filter(&self, level: LevelFilter, search: &str) -> Vec<LogEntry> {
        self.entries
            .iter()
            .filter(|e| level.matches(e.level) && matches_search(&e.message, search))
            .cloned()
            .collect()
    }
}

/// One export line, in the same layout the backend writes
pub fn format_entry(entry: &LogEntry) -> String {
    format!(
        "[{}] [{}] {}",
        entry.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        entry.level,
        entry.message
    )
}

/// Suggested file name for an export started on `date`
pub fn default_export_file_name(date: NaiveDate) -> String {
    format!("ssh-proxy-logs-{}.txt", date.format("%Y-%m-%d"))
}

struct Subscription {
    /// Bumped on every subscribe/unsubscribe; stale deliveries compare against it
    generation: u64,
    task: Option<JoinHandle<()>>,
    handler: Option<Arc<dyn LogHandler>>,
}

struct Shared {
    buffer: Mutex<LogBuffer>,
    subscription: Mutex<Subscription>,
}

impl Shared {
    fn buffer(&self) -> std::sync::MutexGuard<'_, LogBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscription(&self) -> std::sync::MutexGuard<'_, Subscription> {
        self.subscription.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a pushed entry unless its subscription has been superseded
    fn deliver(&self, generation: u64, entry: &LogEntry) -> bool {
        let subscription = self.subscription();
        if subscription.generation != generation {
            return false;
        }
        self.buffer().append(entry.clone());
        true
    }
}

/// Log buffer fed by the backend's push channel
pub struct LogStream {
    backend: Arc<dyn ProxyBackend>,
    shared: Arc<Shared>,
}

impl LogStream {
    pub fn new(backend: Arc<dyn ProxyBackend>) -> Self {
        Self {
            backend,
            shared: Arc::new(Shared {
                buffer: Mutex::new(LogBuffer::new()),
                subscription: Mutex::new(Subscription {
                    generation: 0,
                    task: None,
                    handler: None,
                }),
            }),
        }
    }

    /// Pull the backend's retained history into the buffer
    ///
    /// On failure the buffer is left as it was.
    pub async fn load_initial(&self) -> Result<Vec<LogEntry>> {
        let history = self.backend.get_logs().await?;
        tracing::debug!("Loaded {} log entries from backend", history.len());

        let mut buffer = self.shared.buffer();
        buffer.replace(history);
        Ok(buffer.entries())
    }

    /// Start receiving pushed entries
    ///
    /// Only entries emitted after this call are appended. An existing
    /// subscription is replaced.
    pub async fn subscribe(&self, handler: Arc<dyn LogHandler>) -> Result<()> {
        let mut rx = self.backend.subscribe_logs().await?;

        let mut subscription = self.shared.subscription();
        subscription.generation += 1;
        if let Some(previous) = subscription.task.take() {
            previous.abort();
        }

        let generation = subscription.generation;
        let shared = Arc::clone(&self.shared);
        let task_handler = Arc::clone(&handler);
        subscription.task = Some(tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                if !shared.deliver(generation, &entry) {
                    break;
                }
                task_handler.on_log(&entry);
            }
            tracing::debug!("Log subscription {} ended", generation);
        }));
        subscription.handler = Some(handler);

        tracing::debug!("Subscribed to log stream (generation {})", generation);
        Ok(())
    }

    /// Stop appending pushed entries; what is already buffered stays
    pub fn unsubscribe(&self) {
        let mut subscription = self.shared.subscription();
        subscription.generation += 1;
        if let Some(task) = subscription.task.take() {
            task.abort();
            tracing::debug!("Unsubscribed from log stream");
        }
    }

    pub fn pause(&self) {
        self.unsubscribe();
    }

    /// Subscribe again with the last handler
    pub async fn resume(&self) -> Result<()> {
        let handler = self
            .shared
            .subscription()
            .handler
            .clone()
            .unwrap_or_else(|| Arc::new(NoopHandler));
        self.subscribe(handler).await
    }

    pub fn is_paused(&self) -> bool {
        self.shared.subscription().task.is_none()
    }

    pub fn append(&self, entry: LogEntry) {
        self.shared.buffer().append(entry);
    }

    /// Empty the local buffer, then ask the backend to clear its history
    ///
    /// The local clear stands even if the backend call fails.
    pub async fn clear(&self) -> Result<()> {
        self.shared.buffer().clear();
        self.backend.clear_logs().await.map_err(|e| {
            tracing::warn!("Backend failed to clear logs: {}", e);
            e
        })
    }

    pub fn filter(&self, level: LevelFilter, search: &str) -> Vec<LogEntry> {
        self.shared.buffer().filter(level, search)
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.shared.buffer().entries()
    }

    pub fn len(&self) -> usize {
        self.shared.buffer().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.buffer().is_empty()
    }

    /// Have the backend write its full history to `path`
    ///
    /// A missing or empty path means the picker was cancelled: returns
    /// `Ok(false)` without calling the backend.
    pub async fn export(&self, path: Option<&Path>) -> Result<bool> {
        let Some(path) = path.filter(|p| !p.as_os_str().is_empty()) else {
            tracing::debug!("Log export cancelled");
            return Ok(false);
        };

        self.backend.save_logs_to_file(path).await?;
        tracing::info!("Exported logs to {}", path.display());
        Ok(true)
    }
}

impl Drop for LogStream {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
