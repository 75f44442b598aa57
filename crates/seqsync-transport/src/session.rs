//! Session handles and per-session outboxes

use seqsync_protocol::DocumentPush;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Identifier of a connected session, unique for the lifetime of a hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle returned by [`SyncHub::connect`](crate::SyncHub::connect)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    id: SessionId,
}

impl SessionHandle {
    pub(crate) fn new(id: SessionId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.id)
    }
}

/// Receiving side of a session's document pushes.
///
/// Only the newest push is retained: a session that falls behind skips
/// straight to the latest document instead of queueing stale ones. The
/// outbox yields `None` once the hub has dropped the session.
pub struct Outbox {
    rx: watch::Receiver<Arc<DocumentPush>>,
    primed: bool,
}

impl Outbox {
    pub(crate) fn new(rx: watch::Receiver<Arc<DocumentPush>>) -> Self {
        Self { rx, primed: false }
    }

    /// Wait for the next document to send.
    ///
    /// The first call returns the connect-time document immediately.
    pub async fn recv(&mut self) -> Option<Arc<DocumentPush>> {
        if !self.primed {
            self.primed = true;
            return Some(self.rx.borrow_and_update().clone());
        }

        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Latest push without waiting
    pub fn latest(&self) -> Arc<DocumentPush> {
        self.rx.borrow().clone()
    }
}
