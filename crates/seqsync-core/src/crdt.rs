//! Replicated ordered sequence (RGA style)
//!
//! Elements are kept in an id-keyed map together with a children-by-anchor
//! index. The visible order is derived on read: starting at `head`, children
//! of every anchor are visited in descending `(timestamp, site, seq)` order,
//! depth first. Because the key is total and identical on every replica, the
//! derived order only depends on the set of applied operations, never on the
//! order they arrived in.

use crate::document::{Document, VisibleElement};
use crate::error::{Error, Result};
use crate::id::{ElementId, LamportClock, SiteId, Timestamp};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, trace};

/// A single sequence mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Insert {
        after: ElementId,
        id: ElementId,
        value: String,
        timestamp: Timestamp,
    },
    Delete {
        id: ElementId,
        timestamp: Option<Timestamp>,
    },
}

impl Operation {
    pub fn insert(after: ElementId, id: ElementId, value: impl Into<String>, timestamp: Timestamp) -> Self {
        Operation::Insert {
            after,
            id,
            value: value.into(),
            timestamp,
        }
    }

    pub fn delete(id: ElementId) -> Self {
        Operation::Delete { id, timestamp: None }
    }

    /// Target element of the operation
    pub fn id(&self) -> &ElementId {
        match self {
            Operation::Insert { id, .. } | Operation::Delete { id, .. } => id,
        }
    }

    pub fn timestamp(&self) -> Option<Timestamp> {
        match self {
            Operation::Insert { timestamp, .. } => Some(*timestamp),
            Operation::Delete { timestamp, .. } => *timestamp,
        }
    }
}

/// Outcome of applying an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// New element added
    Inserted,
    /// Element tombstoned
    Deleted,
    /// Insert of an id that already exists
    Duplicate,
    /// Delete of an unknown, sentinel or already tombstoned id
    Ignored,
}

impl Applied {
    /// Whether the visible document may have changed
    pub fn changed(self) -> bool {
        matches!(self, Applied::Inserted | Applied::Deleted)
    }
}

/// One logical unit of content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub id: ElementId,
    pub value: String,
    pub timestamp: Timestamp,
    /// Resolved anchor; `None` only for the sentinels
    pub anchor: Option<ElementId>,
    pub tombstoned: bool,
}

impl Element {
    fn sentinel(id: ElementId) -> Self {
        Self {
            id,
            value: String::new(),
            timestamp: Timestamp::default(),
            anchor: None,
            tombstoned: false,
        }
    }

    fn tie_key(&self) -> TieKey<'_> {
        TieKey {
            timestamp: self.timestamp,
            site: self.id.site(),
            seq: self.id.seq().unwrap_or_default(),
        }
    }
}

/// Sibling ordering key, compared field by field
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct TieKey<'a> {
    timestamp: Timestamp,
    site: Option<&'a SiteId>,
    seq: u64,
}

/// A replica of the shared sequence
#[derive(Debug)]
pub struct Replica {
    site: SiteId,
    clock: LamportClock,
    next_seq: u64,
    elements: HashMap<ElementId, Element>,
    /// Children of each anchor, sorted by descending tie key
    children: HashMap<ElementId, Vec<ElementId>>,
}

impl Replica {
    /// Create an empty replica holding only the sentinels
    pub fn new(site: SiteId) -> Self {
        let mut elements = HashMap::new();
        elements.insert(ElementId::Head, Element::sentinel(ElementId::Head));
        elements.insert(ElementId::Tail, Element::sentinel(ElementId::Tail));

        Self {
            site,
            clock: LamportClock::new(),
            next_seq: 0,
            elements,
            children: HashMap::new(),
        }
    }

    /// Rebuild a replica from a value-only snapshot.
    ///
    /// Values are chained `head -> v0 -> v1 -> ... -> tail` under fresh ids
    /// owned by `site`.
    pub fn from_values<I, S>(site: SiteId, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut replica = Self::new(site);
        let mut prev = ElementId::Head;
        for value in values {
            // A fresh replica cannot exhaust its clock or sequence here
            if let Ok(Operation::Insert { id, .. }) = replica.local_insert(prev.clone(), value) {
                prev = id;
            }
        }
        debug!(site = %replica.site, elements = replica.len(), "Rehydrated replica from snapshot");
        replica
    }

    pub fn site(&self) -> &SiteId {
        &self.site
    }

    /// Current Lamport clock value
    pub fn clock(&self) -> Timestamp {
        self.clock.now()
    }

    /// Insert `value` immediately after `after`.
    ///
    /// Existing `id` makes this a no-op. An anchor that is unknown (or the
    /// tail sentinel) is replaced by `head`.
    pub fn insert(&mut self, after: ElementId, id: ElementId, value: impl Into<String>, timestamp: Timestamp) -> Applied {
        self.clock.observe(timestamp);

        if self.elements.contains_key(&id) {
            trace!(id = %id, "Duplicate insert ignored");
            return Applied::Duplicate;
        }

        let anchor = if after != ElementId::Tail && self.elements.contains_key(&after) {
            after
        } else {
            debug!(id = %id, anchor = %after, "Anchor not resolvable, inserting after head");
            ElementId::Head
        };

        if let ElementId::Node { site, seq } = &id {
            if *site == self.site {
                self.next_seq = self.next_seq.max(*seq);
            }
        }

        let element = Element {
            id: id.clone(),
            value: value.into(),
            timestamp,
            anchor: Some(anchor.clone()),
            tombstoned: false,
        };

        let elements = &self.elements;
        let siblings = self.children.entry(anchor).or_default();
        let key = element.tie_key();
        let pos = siblings.partition_point(|sibling| {
            elements
                .get(sibling)
                .map(|s| s.tie_key().cmp(&key) == Ordering::Greater)
                .unwrap_or(false)
        });
        siblings.insert(pos, id.clone());
        self.elements.insert(id, element);

        Applied::Inserted
    }

    /// Tombstone `id`. Unknown ids, sentinels and repeated deletes are no-ops.
    pub fn delete(&mut self, id: &ElementId) -> Applied {
        if id.is_sentinel() {
            return Applied::Ignored;
        }

        match self.elements.get_mut(id) {
            Some(element) if !element.tombstoned => {
                element.tombstoned = true;
                Applied::Deleted
            }
            Some(_) => Applied::Ignored,
            None => {
                trace!(id = %id, "Delete of unknown element ignored");
                Applied::Ignored
            }
        }
    }

    /// Apply an operation received from another session or replica
    pub fn apply_remote(&mut self, op: Operation) -> Applied {
        match op {
            Operation::Insert { after, id, value, timestamp } => {
                self.insert(after, id, value, timestamp)
            }
            Operation::Delete { id, timestamp } => {
                if let Some(ts) = timestamp {
                    self.clock.observe(ts);
                }
                self.delete(&id)
            }
        }
    }

    /// Insert a value originating at this replica and return the operation
    /// to forward to others.
    ///
    /// Fails without touching the replica when the clock or this site's
    /// sequence has been pushed to `u64::MAX` by a remote operation.
    pub fn local_insert(&mut self, after: ElementId, value: impl Into<String>) -> Result<Operation> {
        let seq = self.peek_seq()?;
        let timestamp = self.clock.tick()?;
        let id = ElementId::new(self.site.clone(), seq);
        let value = value.into();
        self.insert(after.clone(), id.clone(), value.clone(), timestamp);
        Ok(Operation::insert(after, id, value, timestamp))
    }

    /// Delete an element locally and return the operation to forward
    pub fn local_delete(&mut self, id: ElementId) -> Result<Operation> {
        let timestamp = self.clock.tick()?;
        self.delete(&id);
        Ok(Operation::Delete {
            id,
            timestamp: Some(timestamp),
        })
    }

    /// Ordered view of all non-tombstoned elements
    pub fn document(&self) -> Document {
        let mut visible = Vec::with_capacity(self.elements.len());
        let mut stack = vec![&ElementId::Head];

        while let Some(id) = stack.pop() {
            if let Some(element) = self.elements.get(id) {
                if !element.tombstoned && !id.is_sentinel() {
                    visible.push(VisibleElement {
                        id: id.clone(),
                        value: element.value.clone(),
                    });
                }
            }
            if let Some(children) = self.children.get(id) {
                stack.extend(children.iter().rev());
            }
        }

        Document::new(visible)
    }

    /// Concatenated visible text
    pub fn text(&self) -> String {
        self.document().text()
    }

    pub fn get(&self, id: &ElementId) -> Option<&Element> {
        self.elements.get(id)
    }

    pub fn contains(&self, id: &ElementId) -> bool {
        self.elements.contains_key(id)
    }

    /// Number of visible elements
    pub fn len(&self) -> usize {
        self.elements
            .values()
            .filter(|e| !e.tombstoned && !e.id.is_sentinel())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of non-sentinel elements, tombstones included
    pub fn element_count(&self) -> usize {
        self.elements.len() - 2
    }

    pub fn tombstone_count(&self) -> usize {
        self.elements.values().filter(|e| e.tombstoned).count()
    }

    /// Next unused sequence number for this site. `insert` records it.
    fn peek_seq(&self) -> Result<u64> {
        let mut seq = self.next_seq;
        loop {
            seq = seq
                .checked_add(1)
                .ok_or_else(|| Error::SequenceExhausted(self.site.to_string()))?;
            if !self.elements.contains_key(&ElementId::new(self.site.clone(), seq)) {
                return Ok(seq);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(s: &str) -> SiteId {
        SiteId::new(s).unwrap()
    }

    fn id(s: &str) -> ElementId {
        s.parse().unwrap()
    }

    fn ins(after: &str, new: &str, value: &str, ts: u64) -> Operation {
        Operation::insert(id(after), id(new), value, Timestamp(ts))
    }

    fn del(target: &str) -> Operation {
        Operation::delete(id(target))
    }

    fn values(replica: &Replica) -> Vec<String> {
        replica.document().values()
    }

    fn apply_all(ops: &[Operation]) -> Replica {
        let mut replica = Replica::new(site("hub"));
        for op in ops {
            replica.apply_remote(op.clone());
        }
        replica
    }

    /// All permutations of `ops`, used for small convergence checks
    fn permutations(ops: &[Operation]) -> Vec<Vec<Operation>> {
        if ops.len() <= 1 {
            return vec![ops.to_vec()];
        }
        let mut out = Vec::new();
        for i in 0..ops.len() {
            let mut rest = ops.to_vec();
            let first = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, first.clone());
                out.push(tail);
            }
        }
        out
    }

    #[test]
    fn test_empty_replica() {
        let replica = Replica::new(site("a"));
        assert!(replica.document().is_empty());
        assert_eq!(replica.element_count(), 0);
        assert!(replica.contains(&ElementId::Head));
        assert!(replica.contains(&ElementId::Tail));
    }

    #[test]
    fn test_example_scenario() {
        let mut replica = Replica::new(site("hub"));
        replica.apply_remote(ins("head", "a:1", "H", 1));
        replica.apply_remote(ins("a:1", "a:2", "i", 2));
        assert_eq!(values(&replica), vec!["H", "i"]);

        replica.apply_remote(del("a:1"));
        assert_eq!(values(&replica), vec!["i"]);

        // The tombstone still resolves as an anchor; the newer sibling wins
        // the spot right after it.
        replica.apply_remote(ins("a:1", "b:1", "!", 3));
        assert_eq!(values(&replica), vec!["!", "i"]);
    }

    #[test]
    fn test_example_scenario_converges_in_any_order() {
        let ops = vec![
            ins("head", "a:1", "H", 1),
            ins("a:1", "a:2", "i", 2),
            del("a:1"),
            ins("a:1", "b:1", "!", 3),
        ];
        let expected = values(&apply_all(&ops));

        // The first insert is the only anchor dependency; everything after
        // it may arrive in any order.
        for rest in permutations(&ops[1..]) {
            let mut order = vec![ops[0].clone()];
            order.extend(rest);
            assert_eq!(values(&apply_all(&order)), expected, "order: {:?}", order);
        }
    }

    #[test]
    fn test_typing_sequence() {
        let mut replica = Replica::new(site("a"));
        let mut prev = ElementId::Head;
        for c in ["h", "e", "l", "l", "o"] {
            let op = replica.local_insert(prev, c).unwrap();
            prev = op.id().clone();
        }
        assert_eq!(replica.text(), "hello");
    }

    #[test]
    fn test_concurrent_inserts_at_same_anchor_converge() {
        let ops = vec![
            ins("head", "alice:1", "A", 5),
            ins("head", "bob:1", "B", 7),
            ins("head", "carol:1", "C", 6),
        ];

        let results: Vec<_> = permutations(&ops)
            .iter()
            .map(|order| values(&apply_all(order)))
            .collect();

        for r in &results {
            assert_eq!(r, &vec!["B", "C", "A"]);
        }
    }

    #[test]
    fn test_tie_break_on_site_when_timestamps_equal() {
        let a_first = apply_all(&[ins("head", "alice:1", "A", 3), ins("head", "bob:1", "B", 3)]);
        let b_first = apply_all(&[ins("head", "bob:1", "B", 3), ins("head", "alice:1", "A", 3)]);

        assert_eq!(values(&a_first), values(&b_first));
        // "bob" > "alice", descending order puts bob first
        assert_eq!(values(&a_first), vec!["B", "A"]);
    }

    #[test]
    fn test_tie_break_determinism_distinct_timestamps() {
        let ab = apply_all(&[ins("head", "x:1", "A", 1), ins("head", "y:1", "B", 2)]);
        let ba = apply_all(&[ins("head", "y:1", "B", 2), ins("head", "x:1", "A", 1)]);
        assert_eq!(values(&ab), values(&ba));
        assert_eq!(values(&ab), vec!["B", "A"]);
    }

    #[test]
    fn test_subtrees_stay_attached_to_their_anchor() {
        // Two sites type concurrently after "X"; each word stays contiguous.
        let ops = vec![
            ins("head", "s:1", "X", 1),
            ins("s:1", "a:1", "a", 2),
            ins("a:1", "a:2", "b", 3),
            ins("s:1", "b:1", "c", 2),
            ins("b:1", "b:2", "d", 3),
        ];
        let expected = values(&apply_all(&ops));
        assert_eq!(expected, vec!["X", "c", "d", "a", "b"]);

        let reordered = vec![
            ops[0].clone(),
            ops[3].clone(),
            ops[1].clone(),
            ops[4].clone(),
            ops[2].clone(),
        ];
        assert_eq!(values(&apply_all(&reordered)), expected);
    }

    #[test]
    fn test_insert_is_idempotent() {
        let once = apply_all(&[ins("head", "a:1", "x", 1)]);
        let mut twice = apply_all(&[ins("head", "a:1", "x", 1)]);
        assert_eq!(twice.apply_remote(ins("head", "a:1", "x", 1)), Applied::Duplicate);
        // a retransmission with different payload changes nothing either
        assert_eq!(twice.apply_remote(ins("head", "a:1", "y", 9)), Applied::Duplicate);
        assert_eq!(values(&once), values(&twice));
        assert_eq!(twice.element_count(), 1);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let mut replica = apply_all(&[ins("head", "a:1", "x", 1), ins("a:1", "a:2", "y", 2)]);
        assert_eq!(replica.delete(&id("a:1")), Applied::Deleted);
        assert_eq!(replica.delete(&id("a:1")), Applied::Ignored);
        assert_eq!(values(&replica), vec!["y"]);
        assert_eq!(replica.tombstone_count(), 1);
    }

    #[test]
    fn test_delete_unknown_and_sentinels_ignored() {
        let mut replica = apply_all(&[ins("head", "a:1", "x", 1)]);
        assert_eq!(replica.delete(&id("zz:9")), Applied::Ignored);
        assert_eq!(replica.delete(&ElementId::Head), Applied::Ignored);
        assert_eq!(replica.delete(&ElementId::Tail), Applied::Ignored);
        assert_eq!(values(&replica), vec!["x"]);
    }

    #[test]
    fn test_tombstone_is_permanent() {
        let mut replica = apply_all(&[ins("head", "a:1", "x", 1)]);
        replica.apply_remote(del("a:1"));
        replica.apply_remote(ins("head", "a:1", "x", 50));
        replica.apply_remote(ins("a:1", "a:2", "y", 51));
        assert!(replica.get(&id("a:1")).unwrap().tombstoned);
        assert_eq!(values(&replica), vec!["y"]);
    }

    #[test]
    fn test_unknown_anchor_falls_back_to_head() {
        let mut replica = apply_all(&[ins("head", "a:1", "x", 1)]);
        replica.apply_remote(ins("nobody:4", "b:1", "y", 2));
        assert_eq!(values(&replica), vec!["y", "x"]);
        assert_eq!(replica.get(&id("b:1")).unwrap().anchor, Some(ElementId::Head));
    }

    #[test]
    fn test_tail_anchor_falls_back_to_head() {
        let mut replica = Replica::new(site("a"));
        replica.apply_remote(ins("tail", "b:1", "y", 2));
        assert_eq!(values(&replica), vec!["y"]);
    }

    #[test]
    fn test_sentinel_ids_cannot_be_inserted() {
        let mut replica = Replica::new(site("a"));
        assert_eq!(
            replica.insert(ElementId::Head, ElementId::Tail, "x", Timestamp(1)),
            Applied::Duplicate
        );
        assert!(replica.document().is_empty());
    }

    #[test]
    fn test_remote_timestamps_advance_clock() {
        let mut replica = Replica::new(site("a"));
        replica.apply_remote(ins("head", "b:1", "x", 40));
        let op = replica.local_insert(ElementId::Head, "y").unwrap();
        assert_eq!(op.timestamp(), Some(Timestamp(41)));
        // Causally later local insert lands before the older sibling
        assert_eq!(values(&replica), vec!["y", "x"]);
    }

    #[test]
    fn test_local_ids_skip_existing() {
        let mut replica = Replica::new(site("a"));
        replica.apply_remote(ins("head", "a:1", "x", 1));
        let op = replica.local_insert(ElementId::Head, "y").unwrap();
        assert_eq!(op.id(), &id("a:2"));
    }

    #[test]
    fn test_exhausted_clock_rejects_local_ops() {
        let mut replica = Replica::new(site("a"));
        replica.apply_remote(ins("head", "b:1", "x", u64::MAX));

        assert_eq!(
            replica.local_insert(ElementId::Head, "y"),
            Err(Error::ClockExhausted)
        );
        assert_eq!(
            replica.local_delete(id("b:1")),
            Err(Error::ClockExhausted)
        );

        // Nothing was applied by the failed calls
        assert_eq!(values(&replica), vec!["x"]);
        assert_eq!(replica.element_count(), 1);
    }

    #[test]
    fn test_exhausted_sequence_rejects_local_insert() {
        let mut replica = Replica::new(site("a"));
        replica.apply_remote(ins("head", "a:18446744073709551615", "x", 1));

        assert_eq!(
            replica.local_insert(ElementId::Head, "y"),
            Err(Error::SequenceExhausted("a".into()))
        );
        assert_eq!(replica.clock(), Timestamp(1));
        assert_eq!(values(&replica), vec!["x"]);

        // Deletes need no new id
        assert!(replica.local_delete(id("a:18446744073709551615")).is_ok());
        assert!(replica.is_empty());
    }

    #[test]
    fn test_local_ops_replay_on_peer() {
        let mut alice = Replica::new(site("alice"));
        let mut bob = Replica::new(site("bob"));

        let h = alice.local_insert(ElementId::Head, "H").unwrap();
        let i = alice.local_insert(h.id().clone(), "i").unwrap();
        let bang = bob.local_insert(ElementId::Head, "!").unwrap();

        bob.apply_remote(h.clone());
        bob.apply_remote(i.clone());
        alice.apply_remote(bang.clone());

        assert_eq!(alice.text(), bob.text());

        let d = bob.local_delete(h.id().clone()).unwrap();
        alice.apply_remote(d);
        assert_eq!(alice.text(), bob.text());
        assert!(!alice.text().contains('H'));
    }

    #[test]
    fn test_from_values_chains_in_order() {
        let replica = Replica::from_values(site("init"), ["a", "b", "c"]);
        assert_eq!(replica.text(), "abc");
        assert_eq!(replica.element_count(), 3);
        assert!(replica.contains(&id("init:1")));
    }

    #[test]
    fn test_long_chain_does_not_overflow() {
        let values: Vec<String> = (0..50_000).map(|i| (i % 10).to_string()).collect();
        let replica = Replica::from_values(site("init"), values.clone());
        assert_eq!(replica.document().values(), values);
    }
}
