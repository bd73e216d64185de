// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 SSH Proxy Manager Contributors

//! In-memory backend for unit tests

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use ssh_proxy_common::{
    Error, LogEntry, LogLevel, Profile, ProxyBackend, ProxySession, Result, Settings,
};
use tokio::sync::{broadcast, mpsc, Semaphore};

/// Scripted, call-counting `ProxyBackend`
pub struct MockBackend {
    profiles: Mutex<Vec<Profile>>,
    settings: Mutex<Settings>,
    status: Mutex<ProxySession>,
    scripted: Mutex<VecDeque<(ProxySession, Duration)>>,
    history: Mutex<Vec<LogEntry>>,
    next_log_id: AtomicU64,
    log_tx: broadcast::Sender<LogEntry>,
    calls: Mutex<HashMap<&'static str, usize>>,
    failing: Mutex<HashSet<&'static str>>,
    held: AtomicBool,
    gate: Semaphore,
    last_written: Mutex<Option<serde_json::Value>>,
    exported: Mutex<Vec<PathBuf>>,
}

impl MockBackend {
    pub fn new() -> Self {
        let (log_tx, _) = broadcast::channel(4096);
        Self {
            profiles: Mutex::new(Vec::new()),
            settings: Mutex::new(Settings::default()),
            status: Mutex::new(ProxySession::default()),
            scripted: Mutex::new(VecDeque::new()),
            history: Mutex::new(Vec::new()),
            next_log_id: AtomicU64::new(1),
            log_tx,
            calls: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            held: AtomicBool::new(false),
            gate: Semaphore::new(0),
            last_written: Mutex::new(None),
            exported: Mutex::new(Vec::new()),
        }
    }

    /// Number of times a command reached the backend
    pub fn calls(&self, command: &str) -> usize {
        self.calls.lock().unwrap().get(command).copied().unwrap_or(0)
    }

    /// Make a command fail as if the backend were unreachable
    pub fn fail(&self, command: &'static str) {
        self.failing.lock().unwrap().insert(command);
    }

    pub fn recover(&self, command: &'static str) {
        self.failing.lock().unwrap().remove(command);
    }

    /// Hold start/stop/test inside the backend until `release` is called
    pub fn hold_commands(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn release_commands(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.gate.add_permits(1024);
    }

    /// Queue the snapshot returned by the next status call
    pub fn push_status(&self, session: ProxySession) {
        self.push_status_delayed(session, Duration::ZERO);
    }

    /// Queue a snapshot that is only returned after `delay`
    pub fn push_status_delayed(&self, session: ProxySession, delay: Duration) {
        self.scripted.lock().unwrap().push_back((session, delay));
    }

    pub fn set_status(&self, session: ProxySession) {
        *self.status.lock().unwrap() = session;
    }

    pub fn insert_profile(&self, profile: Profile) {
        self.profiles.lock().unwrap().push(profile);
    }

    /// JSON body of the last profile written through add/update
    pub fn last_written(&self) -> Option<serde_json::Value> {
        self.last_written.lock().unwrap().clone()
    }

    pub fn exported(&self) -> Vec<PathBuf> {
        self.exported.lock().unwrap().clone()
    }

    pub fn settings(&self) -> Settings {
        self.settings.lock().unwrap().clone()
    }

    /// Emit a log line to history and to every live subscription
    pub fn emit(&self, level: LogLevel, message: &str) -> LogEntry {
        let entry = LogEntry {
            id: self.next_log_id.fetch_add(1, Ordering::SeqCst),
            timestamp: Utc::now(),
            level,
            message: message.to_string(),
        };
        self.history.lock().unwrap().push(entry.clone());
        let _ = self.log_tx.send(entry.clone());
        entry
    }

    /// Live push subscriptions currently open
    pub fn log_subscribers(&self) -> usize {
        self.log_tx.receiver_count()
    }

    fn enter(&self, command: &'static str) -> Result<()> {
        *self.calls.lock().unwrap().entry(command).or_insert(0) += 1;
        if self.failing.lock().unwrap().contains(command) {
            return Err(Error::BackendUnavailable(format!("{command}: connection refused")));
        }
        Ok(())
    }

    async fn wait_gate(&self) {
        if self.held.load(Ordering::SeqCst) {
            let _permit = self.gate.acquire().await;
        }
    }

    fn record_write(&self, profile: &Profile) {
        *self.last_written.lock().unwrap() = Some(serde_json::to_value(profile).unwrap());
    }
}

#[async_trait]
impl ProxyBackend for MockBackend {
    async fn list_profiles(&self) -> Result<Vec<Profile>> {
        self.enter("list_profiles")?;
        Ok(self.profiles.lock().unwrap().clone())
    }

    async fn get_profile(&self, id: &str) -> Result<Option<Profile>> {
        self.enter("get_profile")?;
        Ok(self.profiles.lock().unwrap().iter().find(|p| p.id == id).cloned())
    }

    async fn add_profile(&self, profile: &Profile) -> Result<Profile> {
        self.enter("add_profile")?;
        self.record_write(profile);
        let mut profiles = self.profiles.lock().unwrap();
        if profiles.iter().any(|p| p.id == profile.id) {
            return Err(Error::Backend(format!("Profile id already exists: {}", profile.id)));
        }
        let mut saved = profile.clone();
        saved.created_at = Some(Utc::now());
        saved.updated_at = saved.created_at;
        profiles.push(saved.clone());
        Ok(saved)
    }

    async fn update_profile(&self, profile: &Profile) -> Result<Profile> {
        self.enter("update_profile")?;
        self.record_write(profile);
        let mut profiles = self.profiles.lock().unwrap();
        let existing = profiles
            .iter_mut()
            .find(|p| p.id == profile.id)
            .ok_or_else(|| Error::Backend(format!("Profile does not exist: {}", profile.id)))?;
        let mut saved = profile.clone();
        saved.created_at = existing.created_at;
        saved.updated_at = Some(Utc::now());
        *existing = saved.clone();
        Ok(saved)
    }

    async fn delete_profile(&self, id: &str) -> Result<()> {
        self.enter("delete_profile")?;
        let mut profiles = self.profiles.lock().unwrap();
        let before = profiles.len();
        profiles.retain(|p| p.id != id);
        if profiles.len() == before {
            return Err(Error::ProfileNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn get_settings(&self) -> Result<Settings> {
        self.enter("get_settings")?;
        Ok(self.settings.lock().unwrap().clone())
    }

    async fn update_settings(&self, settings: &Settings) -> Result<()> {
        self.enter("update_settings")?;
        *self.settings.lock().unwrap() = settings.clone();
        Ok(())
    }

    async fn get_proxy_status(&self) -> Result<ProxySession> {
        self.enter("get_proxy_status")?;
        let next = self.scripted.lock().unwrap().pop_front();
        match next {
            Some((session, delay)) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(session)
            }
            None => Ok(self.status.lock().unwrap().clone()),
        }
    }

    async fn start_proxy(&self, _profile_id: &str) -> Result<()> {
        self.enter("start_proxy")?;
        self.wait_gate().await;
        Ok(())
    }

    async fn stop_proxy(&self) -> Result<()> {
        self.enter("stop_proxy")?;
        self.wait_gate().await;
        Ok(())
    }

    async fn test_connection(&self, _profile_id: &str) -> Result<()> {
        self.enter("test_connection")?;
        self.wait_gate().await;
        Ok(())
    }

    async fn get_logs(&self) -> Result<Vec<LogEntry>> {
        self.enter("get_logs")?;
        Ok(self.history.lock().unwrap().clone())
    }

    async fn clear_logs(&self) -> Result<()> {
        self.enter("clear_logs")?;
        self.history.lock().unwrap().clear();
        Ok(())
    }

    async fn save_logs_to_file(&self, path: &Path) -> Result<()> {
        self.enter("save_logs_to_file")?;
        self.exported.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    async fn subscribe_logs(&self) -> Result<mpsc::Receiver<LogEntry>> {
        self.enter("subscribe_logs")?;
        let mut source = self.log_tx.subscribe();
        let (tx, rx) = mpsc::channel(1024);
        tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(entry) => {
                        if tx.send(entry).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(rx)
    }
}

/// Poll `check` until it holds or a second has passed
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
