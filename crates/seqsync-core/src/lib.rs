//! seqsync core - replicated sequence engine
//!
//! This crate provides the data structures shared by every replica:
//! - Element identifiers, site identifiers and Lamport timestamps
//! - The RGA-style sequence CRDT with deterministic sibling ordering
//! - The immutable visible-document projection handed to readers

pub mod crdt;
pub mod document;
pub mod error;
pub mod id;

pub use crdt::{Applied, Element, Operation, Replica};
pub use document::{Document, VisibleElement};
pub use error::{Error, Result};
pub use id::{ElementId, LamportClock, SiteId, Timestamp};
