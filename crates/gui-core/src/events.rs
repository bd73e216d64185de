// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 SSH Proxy Manager Contributors

//! Event handling traits and types

use ssh_proxy_common::LogEntry;

/// Framework-agnostic log event handler
///
/// Front ends implement this to be told about each log line the
/// [`LogStream`](crate::logs::LogStream) appends from the live push channel.
/// Called after the entry is already in the buffer.
pub trait LogHandler: Send + Sync {
    /// Called once per pushed log line, in arrival order
    fn on_log(&self, entry: &LogEntry);
}

impl<F> LogHandler for F
where
    F: Fn(&LogEntry) + Send + Sync,
{
    fn on_log(&self, entry: &LogEntry) {
        self(entry)
    }
}

/// Handler for consumers that only read the buffer
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl LogHandler for NoopHandler {
    fn on_log(&self, _entry: &LogEntry) {}
}
