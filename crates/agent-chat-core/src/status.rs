//! Background health/status poller.
//!
//! Keeps the latest `/health` and `/status` snapshots. Refreshes run on a
//! timer, on demand, and whenever the session reports a sent message. Timer
//! and manual refreshes are not deduplicated; each one takes a sequence
//! number and a response is dropped if a newer refresh already stored the
//! same field.

use crate::client::AgentBackend;
use crate::error::ApiError;
use crate::session::SessionEvent;
use crate::types::{AgentStatus, HealthStatus};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusSnapshot {
    pub health: Option<HealthStatus>,
    pub status: Option<AgentStatus>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl StatusSnapshot {
    pub fn is_connected(&self) -> bool {
        self.health.as_ref().is_some_and(HealthStatus::is_healthy)
    }
}

pub struct StatusPoller {
    backend: Arc<dyn AgentBackend>,
    interval: Option<Duration>,
    state: watch::Sender<StatusSnapshot>,
    next_seq: AtomicU64,
    health_seq: AtomicU64,
    status_seq: AtomicU64,
    refreshing: AtomicUsize,
    trigger: Notify,
    shutdown: watch::Sender<bool>,
}

impl StatusPoller {
    /// `interval = None` disables the timer; manual refreshes still work.
    pub fn new(backend: Arc<dyn AgentBackend>, interval: Option<Duration>) -> Self {
        let (state, _) = watch::channel(StatusSnapshot::default());
        let (shutdown, _) = watch::channel(false);
        Self {
            backend,
            interval,
            state,
            next_seq: AtomicU64::new(0),
            health_seq: AtomicU64::new(0),
            status_seq: AtomicU64::new(0),
            refreshing: AtomicUsize::new(0),
            trigger: Notify::new(),
            shutdown,
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_connected()
    }

    /// Stops the background loop; responses still in flight are discarded.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_disposed(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Requests an immediate refresh from the background loop.
    pub fn trigger_refresh(&self) {
        self.trigger.notify_one();
    }

    /// Runs an initial refresh, then refreshes on every tick or trigger until
    /// [`shutdown`](Self::shutdown).
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let poller = Arc::clone(self);
        tokio::spawn(async move { poller.run().await })
    }

    async fn run(&self) {
        let mut stop = self.shutdown.subscribe();
        let mut ticker = self.interval.map(|period| {
            let mut t = tokio::time::interval_at(Instant::now() + period, period);
            t.set_missed_tick_behavior(MissedTickBehavior::Delay);
            t
        });
        tracing::info!(interval = ?self.interval, "status poller started");

        self.refresh().await;
        loop {
            if *stop.borrow_and_update() {
                break;
            }
            tokio::select! {
                res = stop.changed() => {
                    if res.is_err() {
                        break;
                    }
                }
                _ = self.trigger.notified() => self.refresh().await,
                _ = next_tick(&mut ticker) => self.refresh().await,
            }
        }
        tracing::info!("status poller stopped");
    }

    /// Forwards every `MessageSent` from the session to
    /// [`trigger_refresh`](Self::trigger_refresh).
    pub fn follow(self: &Arc<Self>, mut events: broadcast::Receiver<SessionEvent>) -> JoinHandle<()> {
        let poller = Arc::clone(self);
        tokio::spawn(async move {
            let mut stop = poller.shutdown.subscribe();
            loop {
                if *stop.borrow_and_update() {
                    break;
                }
                tokio::select! {
                    res = stop.changed() => {
                        if res.is_err() {
                            break;
                        }
                    }
                    event = events.recv() => match event {
                        Ok(SessionEvent::MessageSent) | Err(RecvError::Lagged(_)) => {
                            poller.trigger_refresh()
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        })
    }

    /// Fetches health and status concurrently under one sequence number.
    pub async fn refresh(&self) {
        let seq = self.next_seq();
        self.begin_loading();
        tokio::join!(self.fetch_health_at(seq), self.fetch_status_at(seq));
        self.end_loading();
    }

    pub async fn fetch_health(&self) -> Option<HealthStatus> {
        let seq = self.next_seq();
        self.fetch_health_at(seq).await
    }

    pub async fn fetch_status(&self) -> Option<AgentStatus> {
        let seq = self.next_seq();
        self.fetch_status_at(seq).await
    }

    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    async fn fetch_health_at(&self, seq: u64) -> Option<HealthStatus> {
        let result = self.backend.check_health().await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, seq, "health fetch failed");
        }
        let health = result.as_ref().ok().cloned();
        self.apply(&self.health_seq, seq, move |snap| match result {
            Ok(h) => {
                snap.health = Some(h);
                snap.error = None;
            }
            Err(e) => record_failure(snap, |s| s.health = None, e),
        });
        health
    }

    async fn fetch_status_at(&self, seq: u64) -> Option<AgentStatus> {
        let result = self.backend.get_status().await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, seq, "status fetch failed");
        }
        let status = result.as_ref().ok().cloned();
        self.apply(&self.status_seq, seq, move |snap| match result {
            Ok(s) => snap.status = Some(s),
            Err(e) => record_failure(snap, |s| s.status = None, e),
        });
        status
    }

    /// Stores a response unless the poller is shut down or `applied` already
    /// holds a newer sequence number.
    fn apply(&self, applied: &AtomicU64, seq: u64, update: impl FnOnce(&mut StatusSnapshot)) {
        if self.is_disposed() {
            tracing::debug!(seq, "status poller disposed; dropping response");
            return;
        }
        let stored = self.state.send_if_modified(|snap| {
            if applied.load(Ordering::Acquire) > seq {
                return false;
            }
            applied.store(seq, Ordering::Release);
            update(snap);
            true
        });
        if !stored {
            tracing::debug!(seq, "stale status response discarded");
        }
    }

    fn begin_loading(&self) {
        let disposed = self.is_disposed();
        self.state.send_if_modified(|snap| {
            self.refreshing.fetch_add(1, Ordering::AcqRel);
            if disposed || snap.is_loading {
                return false;
            }
            snap.is_loading = true;
            true
        });
    }

    fn end_loading(&self) {
        let disposed = self.is_disposed();
        self.state.send_if_modified(|snap| {
            let remaining = self.refreshing.fetch_sub(1, Ordering::AcqRel) - 1;
            if disposed || remaining > 0 {
                return false;
            }
            snap.is_loading = false;
            true
        });
    }
}

fn record_failure(
    snap: &mut StatusSnapshot,
    reset: impl FnOnce(&mut StatusSnapshot),
    err: ApiError,
) {
    reset(snap);
    snap.error = Some(err.message);
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
