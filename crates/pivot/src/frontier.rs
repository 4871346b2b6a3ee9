//! BFS work queue plus visited set.
//!
//! Names are the identity key. A name is processed at most once; the chain
//! that sticks is the one from whichever discovery was enqueued first.

use common::Identity;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// Pending identities and the names already processed in this run.
///
/// Owned by the run and touched only by the traversal, so no locking.
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<Arc<Identity>>,
    queued: HashSet<String>,
    visited: HashSet<String>,
    visit_order: Vec<String>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues the seed identities. Seeds sharing a name collapse to the first.
    pub fn seed(&mut self, identities: impl IntoIterator<Item = Identity>) {
        for identity in identities {
            self.enqueue(identity);
        }
    }

    /// Dequeues the next pending identity, or `None` once the queue is empty.
    pub fn next(&mut self) -> Option<Arc<Identity>> {
        let identity = self.queue.pop_front()?;
        self.queued.remove(identity.name());
        Some(identity)
    }

    /// Marks `name` as processed.
    ///
    /// Returns `true` the first time (caller proceeds) and `false` afterwards
    /// (caller skips).
    pub fn mark_visited(&mut self, name: &str) -> bool {
        if self.visited.contains(name) {
            return false;
        }
        self.visited.insert(name.to_string());
        self.visit_order.push(name.to_string());
        true
    }

    /// Adds a newly discovered identity unless its name is already visited or
    /// already waiting in the queue. Returns `true` if it was added.
    pub fn enqueue(&mut self, identity: Identity) -> bool {
        if self.is_known(identity.name()) {
            return false;
        }
        self.queued.insert(identity.name().to_string());
        self.queue.push_back(Arc::new(identity));
        true
    }

    /// `true` if `name` is visited or queued.
    pub fn is_known(&self, name: &str) -> bool {
        self.visited.contains(name) || self.queued.contains(name)
    }

    pub fn is_visited(&self, name: &str) -> bool {
        self.visited.contains(name)
    }

    /// Processed names in visit order.
    pub fn visited(&self) -> &[String] {
        &self.visit_order
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
