// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 SSH Proxy Manager Contributors

//! Proxy session status reconciliation
//!
//! The backend owns the session state machine. [`SessionReconciler`] only
//! mirrors it: every snapshot comes from a poll and replaces the previous one
//! wholesale. Start/stop never move the status locally.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ssh_proxy_common::{Error, Field, ProxyBackend, ProxySession, Result, ValidationErrors};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Poll period while a session-control view is open
pub const CONTROL_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Poll period for a passive status indicator
pub const INDICATOR_POLL_INTERVAL: Duration = Duration::from_millis(2000);

struct PollState {
    session: ProxySession,
    /// Sequence number handed to the most recently issued poll
    issued: u64,
    /// Highest sequence number whose snapshot has been applied
    applied: u64,
    last_error: Option<String>,
}

/// Clears the start/stop in-flight flag when dropped
struct ActionGuard<'a>(&'a AtomicBool);

impl Drop for ActionGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Removes a profile from the running-test set when dropped
struct TestGuard<'a> {
    testing: &'a Mutex<HashSet<String>>,
    profile_id: String,
}

impl Drop for TestGuard<'_> {
    fn drop(&mut self) {
        self.testing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.profile_id);
    }
}

fn require_profile_id(profile_id: &str) -> Result<()> {
    if profile_id.trim().is_empty() {
        return Err(ValidationErrors::single(Field::ProfileId, "Please select a profile first").into());
    }
    Ok(())
}

/// Mirrors the backend's proxy session and serializes commands against it
pub struct SessionReconciler {
    backend: Arc<dyn ProxyBackend>,
    state: Mutex<PollState>,
    action_loading: AtomicBool,
    testing: Mutex<HashSet<String>>,
    snapshots: watch::Sender<ProxySession>,
}

impl SessionReconciler {
    pub fn new(backend: Arc<dyn ProxyBackend>) -> Self {
        let (snapshots, _) = watch::channel(ProxySession::default());
        Self {
            backend,
            state: Mutex::new(PollState {
                session: ProxySession::default(),
                issued: 0,
                applied: 0,
                last_error: None,
            }),
            action_loading: AtomicBool::new(false),
            testing: Mutex::new(HashSet::new()),
            snapshots,
        }
    }

    fn state(&self) -> MutexGuard<'_, PollState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch the backend status and apply it if no newer poll has completed
    ///
    /// A failed call keeps the previous snapshot and records a transient
    /// error; it never puts the session into the error state.
    pub async fn poll(&self) -> Result<ProxySession> {
        self.poll_gated(None).await
    }

    async fn poll_gated(&self, gate: Option<&AtomicBool>) -> Result<ProxySession> {
        let seq = {
            let mut state = self.state();
            state.issued += 1;
            state.issued
        };

        let result = self.backend.get_proxy_status().await;

        let mut state = self.state();
        if gate.is_some_and(|active| !active.load(Ordering::SeqCst)) {
            return Ok(state.session.clone());
        }

        match result {
            Ok(session) => {
                if seq <= state.applied {
                    tracing::warn!(
                        "Discarding stale status poll #{} (already applied #{})",
                        seq,
                        state.applied
                    );
                    return Ok(state.session.clone());
                }

                tracing::debug!("Applied status poll #{}: {}", seq, session.status);
                state.applied = seq;
                state.session = session.clone();
                state.last_error = None;
                self.snapshots.send_replace(session.clone());
                Ok(session)
            }
            Err(e) => {
                let err = match e {
                    Error::BackendUnavailable(message) => Error::BackendUnavailable(message),
                    other => Error::BackendUnavailable(other.to_string()),
                };
                tracing::warn!("Status poll #{} failed: {}", seq, err);
                if seq > state.applied {
                    state.last_error = Some(err.to_string());
                }
                Err(err)
            }
        }
    }

    fn begin_action(&self) -> Result<ActionGuard<'_>> {
        self.action_loading
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| Error::ActionInProgress)?;
        Ok(ActionGuard(&self.action_loading))
    }

    fn begin_test(&self, profile_id: &str) -> Result<TestGuard<'_>> {
        let mut testing = self.testing.lock().unwrap_or_else(PoisonError::into_inner);
        if !testing.insert(profile_id.to_string()) {
            return Err(Error::TestInProgress(profile_id.to_string()));
        }
        Ok(TestGuard {
            testing: &self.testing,
            profile_id: profile_id.to_string(),
        })
    }

    /// One status refresh after a command; failures only land in `last_error`
    async fn refresh_after_action(&self) {
        if let Err(e) = self.poll().await {
            tracing::debug!("Status refresh after command failed: {}", e);
        }
    }

    /// Ask the backend to start a session for `profile_id`
    pub async fn start(&self, profile_id: &str) -> Result<()> {
        require_profile_id(profile_id)?;
        {
            let _guard = self.begin_action()?;
            tracing::info!("Starting proxy with profile {}", profile_id);
            self.backend.start_proxy(profile_id).await?;
        }
        self.refresh_after_action().await;
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        {
            let _guard = self.begin_action()?;
            tracing::info!("Stopping proxy");
            self.backend.stop_proxy().await?;
        }
        self.refresh_after_action().await;
        Ok(())
    }

    /// Test connectivity of a profile without starting a session
    ///
    /// Runs alongside start/stop, but only one test per profile at a time and
    /// never while the last known snapshot is running.
    pub async fn test(&self, profile_id: &str) -> Result<()> {
        require_profile_id(profile_id)?;
        if self.status().status.is_running() {
            return Err(Error::SessionRunning);
        }

        let _guard = self.begin_test(profile_id)?;
        tracing::info!("Testing connection for profile {}", profile_id);
        self.backend.test_connection(profile_id).await
    }

    /// Last applied snapshot; may be stale between polls
    pub fn status(&self) -> ProxySession {
        self.state().session.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state().last_error.clone()
    }

    pub fn dismiss_error(&self) {
        self.state().last_error = None;
    }

    pub fn is_action_loading(&self) -> bool {
        self.action_loading.load(Ordering::SeqCst)
    }

    pub fn is_test_loading(&self, profile_id: &str) -> bool {
        self.testing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(profile_id)
    }

    /// Receiver notified with every applied snapshot
    pub fn watch(&self) -> watch::Receiver<ProxySession> {
        self.snapshots.subscribe()
    }

    /// Poll on a fixed period until the returned handle is cancelled or dropped
    pub fn spawn_poller(self: &Arc<Self>, period: Duration) -> PollerHandle {
        let active = Arc::new(AtomicBool::new(true));
        let reconciler = Arc::clone(self);
        let gate = Arc::clone(&active);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !gate.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(e) = reconciler.poll_gated(Some(&gate)).await {
                    tracing::debug!("Periodic status poll failed: {}", e);
                }
            }
        });

        tracing::debug!("Status poller started ({:?})", period);
        PollerHandle {
            reconciler: Arc::clone(self),
            active,
            task: Some(task),
        }
    }
}

/// Owner of a periodic status poller
///
/// Once `cancel` returns (or the handle is dropped) no further snapshot from
/// this poller is applied.
pub struct PollerHandle {
    reconciler: Arc<SessionReconciler>,
    active: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn cancel(&mut self) {
        {
            // Taking the state lock orders this against an in-progress apply
            let _state = self.reconciler.state();
            self.active.store(false, Ordering::SeqCst);
        }
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!("Status poller cancelled");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
