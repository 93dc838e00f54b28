//! [`BufferStore`] – per-node accumulators awaiting their flush.
//!
//! Lives inside the relay consumer and is only ever touched from it, so it
//! carries no synchronisation of its own.

use std::collections::HashMap;

use meshrelay_types::{NodeId, PartialFields};

use crate::debounce::FlushHandle;

// ─────────────────────────────────────────────────────────────────────────────
// NodeBufferEntry
// ─────────────────────────────────────────────────────────────────────────────

/// Accumulated fields for one node plus its pending flush timer.
///
/// An entry exists only while at least one update is unflushed.
#[derive(Debug)]
pub struct NodeBufferEntry {
    node: NodeId,
    accumulated: PartialFields,
    pub(crate) pending: Option<FlushHandle>,
}

impl NodeBufferEntry {
    fn new(node: NodeId) -> Self {
        Self {
            node,
            accumulated: PartialFields::default(),
            pending: None,
        }
    }

    /// Node this entry accumulates for.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Fields merged so far in the current window.
    pub fn accumulated(&self) -> &PartialFields {
        &self.accumulated
    }

    /// Generation of the timer currently armed for this entry.
    pub fn pending_generation(&self) -> Option<u64> {
        self.pending.as_ref().map(FlushHandle::generation)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BufferStore
// ─────────────────────────────────────────────────────────────────────────────

/// Open accumulators keyed by node.
///
/// Flushing a node removes its entry, so the next update after a flush
/// starts from empty fields.
#[derive(Debug, Default)]
pub struct BufferStore {
    entries: HashMap<NodeId, NodeBufferEntry>,
}

impl BufferStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `fields` into `node`'s accumulator, creating it on the first
    /// update since the last flush.
    pub fn merge_update(&mut self, node: NodeId, fields: PartialFields) -> &mut NodeBufferEntry {
        let entry = self
            .entries
            .entry(node)
            .or_insert_with(|| NodeBufferEntry::new(node));
        entry.accumulated.apply(fields);
        entry
    }

    /// Remove `node`'s entry and return what it accumulated.
    pub fn take_and_clear(&mut self, node: NodeId) -> Option<PartialFields> {
        self.entries.remove(&node).map(|entry| entry.accumulated)
    }

    /// Entry for `node`, if it has unflushed updates.
    pub fn get(&self, node: NodeId) -> Option<&NodeBufferEntry> {
        self.entries.get(&node)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.entries.contains_key(&node)
    }

    /// Number of nodes with an open window.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Discard every entry, cancelling their timers.  Returns how many
    /// unflushed entries were dropped.
    pub fn clear(&mut self) -> usize {
        let discarded = self.entries.len();
        self.entries.clear();
        discarded
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
