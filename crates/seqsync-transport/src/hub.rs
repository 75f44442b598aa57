//! Synchronization hub - owns the replica and the session registry

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use seqsync_core::{Applied, Document, Operation, Replica, SiteId};
use seqsync_protocol::{parse_operation, DocumentPush};
use seqsync_storage::{Snapshot, Storage};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use crate::error::HubError;
use crate::session::{Outbox, SessionHandle, SessionId};

/// Hub configuration
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Site used for ids the hub generates itself (snapshot rehydration)
    pub site: SiteId,
}

impl HubConfig {
    pub fn new(site: SiteId) -> Self {
        Self { site }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            site: SiteId::generate(),
        }
    }
}

/// Replica plus the version of the last state it produced
struct ReplicaState {
    replica: Replica,
    version: u64,
}

struct SessionEntry {
    peer: String,
    sender: watch::Sender<Arc<DocumentPush>>,
}

#[derive(Default)]
struct Registry {
    sessions: HashMap<SessionId, SessionEntry>,
    /// Last push fanned out; older pushes are never delivered after it
    latest: Option<Arc<DocumentPush>>,
}

/// Result of one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub evicted: usize,
    /// Push was older than one already fanned out and was dropped
    pub stale: bool,
}

/// Hub statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubStats {
    pub sessions: usize,
    pub visible: usize,
    pub elements: usize,
    pub tombstones: usize,
    pub version: u64,
}

/// Applies operations to the shared replica, persists the result and pushes
/// the full document to every connected session.
///
/// The replica lock is held across apply and save, so nothing reaches a
/// session before it has been handed to storage. The registry lock is only
/// taken after the replica lock is released.
pub struct SyncHub {
    state: AsyncMutex<ReplicaState>,
    registry: Mutex<Registry>,
    storage: Arc<dyn Storage>,
    next_session: AtomicU64,
    config: HubConfig,
}

impl SyncHub {
    /// Create a hub with an empty document
    pub fn new(config: HubConfig, storage: Arc<dyn Storage>) -> Self {
        let replica = Replica::new(config.site.clone());
        Self::with_replica(config, storage, replica)
    }

    /// Create a hub and rehydrate the document from `storage`.
    ///
    /// A missing snapshot starts an empty document; an unreadable one is
    /// logged and also starts empty.
    pub async fn open(config: HubConfig, storage: Arc<dyn Storage>) -> Self {
        let replica = match storage.load().await {
            Ok(Some(snapshot)) => {
                info!(values = snapshot.len(), "Loaded document snapshot");
                Replica::from_values(config.site.clone(), snapshot.values)
            }
            Ok(None) => {
                info!("No snapshot found, starting with an empty document");
                Replica::new(config.site.clone())
            }
            Err(e) => {
                warn!(error = %e, "Failed to load snapshot, starting with an empty document");
                Replica::new(config.site.clone())
            }
        };

        Self::with_replica(config, storage, replica)
    }

    fn with_replica(config: HubConfig, storage: Arc<dyn Storage>, replica: Replica) -> Self {
        Self {
            state: AsyncMutex::new(ReplicaState { replica, version: 0 }),
            registry: Mutex::new(Registry::default()),
            storage,
            next_session: AtomicU64::new(1),
            config,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Register a session. Its outbox starts with the current document.
    pub async fn connect(&self, peer: impl Into<String>) -> Result<(SessionHandle, Outbox), HubError> {
        let current = {
            let state = self.state.lock().await;
            Arc::new(DocumentPush::encode(state.version, &state.replica.document())?)
        };

        let id = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed));
        let peer = peer.into();

        let mut registry = self.registry.lock();
        // A fan-out may have happened between the capture and here
        let initial = match &registry.latest {
            Some(latest) if latest.version > current.version => latest.clone(),
            _ => current,
        };
        let (sender, rx) = watch::channel(initial);
        registry.sessions.insert(id, SessionEntry { peer: peer.clone(), sender });
        let sessions = registry.sessions.len();
        drop(registry);

        info!(session = %id, peer = %peer, sessions, "Session connected");
        Ok((SessionHandle::new(id), Outbox::new(rx)))
    }

    /// Deregister a session; returns whether it was still registered
    pub fn disconnect(&self, handle: SessionHandle) -> bool {
        let removed = self.registry.lock().sessions.remove(&handle.id());
        match removed {
            Some(entry) => {
                info!(session = %handle.id(), peer = %entry.peer, "Session disconnected");
                true
            }
            None => false,
        }
    }

    pub fn is_connected(&self, handle: SessionHandle) -> bool {
        self.registry.lock().sessions.contains_key(&handle.id())
    }

    pub fn session_count(&self) -> usize {
        self.registry.lock().sessions.len()
    }

    /// Handle one raw inbound message from a session.
    ///
    /// Malformed messages are logged and returned as errors; the session
    /// stays registered.
    pub async fn receive(&self, handle: SessionHandle, raw: &[u8]) -> Result<Applied, HubError> {
        if !self.is_connected(handle) {
            return Err(HubError::UnknownSession(handle.id()));
        }

        let op = match parse_operation(raw) {
            Ok(op) => op,
            Err(e) => {
                warn!(session = %handle.id(), error = %e, "Dropping malformed message");
                return Err(e.into());
            }
        };

        debug!(session = %handle.id(), op = ?op, "Received operation");
        self.apply(op).await
    }

    /// Apply an operation, then persist and broadcast if anything changed
    pub async fn apply(&self, op: Operation) -> Result<Applied, HubError> {
        let (applied, push) = {
            let mut state = self.state.lock().await;
            let applied = state.replica.apply_remote(op);
            if !applied.changed() {
                debug!(outcome = ?applied, "Operation left the document unchanged");
                return Ok(applied);
            }

            let document = state.replica.document();
            if let Err(e) = self.storage.save(&Snapshot::from(&document)).await {
                warn!(error = %e, "Failed to persist document, in-memory state stays authoritative");
            }

            state.version += 1;
            (applied, DocumentPush::encode(state.version, &document)?)
        };

        self.fan_out(Arc::new(push));
        Ok(applied)
    }

    /// Push the full current document to every registered session
    pub async fn broadcast(&self) -> Result<BroadcastReport, HubError> {
        let push = {
            let state = self.state.lock().await;
            DocumentPush::encode(state.version, &state.replica.document())?
        };
        Ok(self.fan_out(Arc::new(push)))
    }

    fn fan_out(&self, push: Arc<DocumentPush>) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut registry = self.registry.lock();

        if let Some(latest) = &registry.latest {
            if latest.version > push.version {
                debug!(version = push.version, latest = latest.version, "Skipping stale broadcast");
                report.stale = true;
                return report;
            }
        }
        registry.latest = Some(push.clone());

        let mut closed = Vec::new();
        for (id, entry) in registry.sessions.iter() {
            if entry.sender.is_closed() {
                closed.push(*id);
                continue;
            }
            entry.sender.send_if_modified(|current| {
                if current.version > push.version {
                    return false;
                }
                *current = push.clone();
                true
            });
            report.delivered += 1;
        }

        for id in closed {
            if let Some(entry) = registry.sessions.remove(&id) {
                warn!(session = %id, peer = %entry.peer, "Evicting session with closed channel");
                report.evicted += 1;
            }
        }

        debug!(
            version = push.version,
            elements = push.len,
            delivered = report.delivered,
            evicted = report.evicted,
            "Broadcast document"
        );
        report
    }

    /// Current visible document
    pub async fn document(&self) -> Document {
        self.state.lock().await.replica.document()
    }

    pub async fn stats(&self) -> HubStats {
        let (visible, elements, tombstones, version) = {
            let state = self.state.lock().await;
            (
                state.replica.len(),
                state.replica.element_count(),
                state.replica.tombstone_count(),
                state.version,
            )
        };

        HubStats {
            sessions: self.session_count(),
            visible,
            elements,
            tombstones,
            version,
        }
    }
}
