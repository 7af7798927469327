use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};
use crate::config::config::StoreConfig;
use crate::modules::event::{clamp_limit, clamp_offset, Event, HealthReport, StoredEvent};
use crate::modules::event_backend::{EventBackend, GrpcBackend};
use crate::utils::utils::{is_object_id, now_iso8601, offline_placeholder_id};

pub const SERVICE_NAME: &str = "Gesture AI Communication Backend";

/// Why the store stopped talking to its backend. Once offline it stays offline.
#[derive(Debug, Clone, PartialEq)]
pub enum OfflineReason {
    Disabled,
    Unreachable(String),
    Timeout(Duration),
    ProbeFailed(String),
    Closed,
}

impl fmt::Display for OfflineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OfflineReason::Disabled => write!(f, "disabled by configuration"),
            OfflineReason::Unreachable(msg) => write!(f, "unreachable: {}", msg),
            OfflineReason::Timeout(d) => write!(f, "no answer within {}ms", d.as_millis()),
            OfflineReason::ProbeFailed(msg) => write!(f, "probe failed: {}", msg),
            OfflineReason::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug)]
pub enum StoreState<B> {
    Connected(B),
    Offline(OfflineReason),
}

/// EventStore persists events when its backend answered the startup probe and
/// otherwise accepts them as no-ops. No operation ever returns an error.
#[derive(Debug)]
pub struct EventStore<B: EventBackend = GrpcBackend> {
    state: StoreState<B>,
    database: String,
    op_timeout: Duration,
}

impl EventStore<GrpcBackend> {
    /// connect dials the configured gRPC event store and probes it once. Dialing
    /// and probing share one `connect_timeout` deadline.
    ///
    /// # Arguments
    /// * `config` - &StoreConfig
    ///
    /// # Returns
    /// * `EventStore<GrpcBackend>`, offline if the store could not be reached
    pub async fn connect(config: &StoreConfig) -> Self {
        if !config.enabled {
            return EventStore::offline_with(config, OfflineReason::Disabled)
        }
        let deadline = Instant::now() + config.connect_timeout();
        let backend = match timeout_at(deadline, GrpcBackend::connect(config)).await {
            Ok(Ok(backend)) => backend,
            Ok(Err(e)) => {
                let reason = OfflineReason::Unreachable(format!("{:#}", e));
                warn!(uri = %config.uri, %reason, "event store offline, events will not be persisted");
                return EventStore::offline_with(config, reason)
            }
            Err(_) => {
                let reason = OfflineReason::Timeout(config.connect_timeout());
                warn!(uri = %config.uri, %reason, "event store offline, events will not be persisted");
                return EventStore::offline_with(config, reason)
            }
        };
        EventStore::probe(config, backend, deadline).await
    }
}

impl<B: EventBackend> EventStore<B> {
    /// with_backend probes `backend` once within the connect timeout and keeps it
    /// only if the probe succeeds.
    pub async fn with_backend(config: &StoreConfig, backend: B) -> Self {
        EventStore::probe(config, backend, Instant::now() + config.connect_timeout()).await
    }

    async fn probe(config: &StoreConfig, backend: B, deadline: Instant) -> Self {
        if !config.enabled {
            return EventStore::offline_with(config, OfflineReason::Disabled)
        }
        let probe = timeout_at(deadline, backend.ping()).await;
        let state = match probe {
            Ok(Ok(())) => {
                info!(uri = %config.uri, database = %config.database, "connected to event store");
                StoreState::Connected(backend)
            }
            Ok(Err(e)) => {
                let reason = OfflineReason::ProbeFailed(format!("{:#}", e));
                warn!(uri = %config.uri, %reason, "event store offline, events will not be persisted");
                StoreState::Offline(reason)
            }
            Err(_) => {
                let reason = OfflineReason::Timeout(config.connect_timeout());
                warn!(uri = %config.uri, %reason, "event store offline, events will not be persisted");
                StoreState::Offline(reason)
            }
        };
        EventStore {
            state,
            database: config.database.clone(),
            op_timeout: config.op_timeout(),
        }
    }

    /// offline builds a store that never touches a backend.
    pub fn offline(reason: OfflineReason) -> Self {
        EventStore::offline_with(&StoreConfig::default(), reason)
    }

    fn offline_with(config: &StoreConfig, reason: OfflineReason) -> Self {
        EventStore {
            state: StoreState::Offline(reason),
            database: config.database.clone(),
            op_timeout: config.op_timeout(),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, StoreState::Connected(_))
    }

    pub fn state(&self) -> &StoreState<B> {
        &self.state
    }

    pub fn offline_reason(&self) -> Option<&OfflineReason> {
        match &self.state {
            StoreState::Offline(reason) => Some(reason),
            StoreState::Connected(_) => None,
        }
    }

    /// bounded runs one backend call under the per-operation timeout. Failures
    /// are logged and turned into `None`; the store stays connected.
    async fn bounded<T, F>(&self, op: &'static str, call: F) -> Option<T>
    where
        F: Future<Output = Result<T, anyhow::Error>>,
    {
        match timeout(self.op_timeout, call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(op, database = %self.database, error = %format!("{:#}", e), "event store call failed");
                None
            }
            Err(_) => {
                warn!(op, database = %self.database, timeout_ms = self.op_timeout.as_millis() as u64, "event store call timed out");
                None
            }
        }
    }

    /// insert validates and persists `event`, stamping it with the current UTC
    /// time when it has no timestamp.
    ///
    /// # Returns
    /// * the stored id, an `offline-<millis>` placeholder when offline, or
    ///   `None` when the event is invalid or the call failed
    pub async fn insert(&self, event: Event) -> Option<String> {
        if let Err(e) = event.validate() {
            warn!(error = %e, "rejecting invalid event");
            return None
        }
        match &self.state {
            StoreState::Offline(_) => {
                debug!(gesture = %event.gesture, "event store offline, dropping event");
                Some(offline_placeholder_id())
            }
            StoreState::Connected(backend) => self.bounded("insert", backend.insert(event.stamped())).await,
        }
    }

    /// list returns up to `limit` events (clamped to [1, 1000]) after skipping
    /// `offset`, newest first.
    pub async fn list(&self, limit: i64, offset: i64) -> Vec<StoredEvent> {
        match &self.state {
            StoreState::Offline(_) => Vec::new(),
            StoreState::Connected(backend) => self
                .bounded("list", backend.list(clamp_limit(limit), clamp_offset(offset)))
                .await
                .unwrap_or_default(),
        }
    }

    /// list_by_gesture returns up to `limit` events for one gesture, newest
    /// first. A blank gesture matches nothing.
    pub async fn list_by_gesture(&self, gesture: &str, limit: i64) -> Vec<StoredEvent> {
        if gesture.trim().is_empty() {
            return Vec::new()
        }
        match &self.state {
            StoreState::Offline(_) => Vec::new(),
            StoreState::Connected(backend) => self
                .bounded("list_by_gesture", backend.list_by_gesture(gesture, clamp_limit(limit)))
                .await
                .unwrap_or_default(),
        }
    }

    pub async fn get(&self, id: &str) -> Option<StoredEvent> {
        if !is_object_id(id) {
            debug!(id, "not an event id");
            return None
        }
        match &self.state {
            StoreState::Offline(_) => None,
            StoreState::Connected(backend) => self.bounded("get", backend.get(id)).await.flatten(),
        }
    }

    /// clear deletes every stored event. Returns `false` when offline or when
    /// the backend call failed.
    pub async fn clear(&self) -> bool {
        match &self.state {
            StoreState::Offline(_) => false,
            StoreState::Connected(backend) => match self.bounded("clear", backend.clear()).await {
                Some(deleted) => {
                    info!(deleted, "cleared event store");
                    true
                }
                None => false,
            },
        }
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "healthy".to_string(),
            service: SERVICE_NAME.to_string(),
            store: match &self.state {
                StoreState::Connected(_) => "connected".to_string(),
                StoreState::Offline(reason) => format!("offline ({})", reason),
            },
            timestamp: now_iso8601(),
        }
    }

    /// close drops the backend. Later calls behave as offline.
    pub fn close(&mut self) {
        if self.is_connected() {
            info!(database = %self.database, "closing event store");
        }
        self.state = StoreState::Offline(OfflineReason::Closed);
    }
}
