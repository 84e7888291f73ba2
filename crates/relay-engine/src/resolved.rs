//! Bounded memory of ids that already got a final response.

use std::collections::{HashSet, VecDeque};

/// How many resolved ids are remembered before the oldest is forgotten.
pub const RESOLVED_HISTORY: usize = 256;

#[derive(Debug)]
pub(crate) struct ResolvedIds {
    order: VecDeque<u64>,
    ids: HashSet<u64>,
    capacity: usize,
}

impl Default for ResolvedIds {
    fn default() -> Self {
        Self::with_capacity(RESOLVED_HISTORY)
    }
}

impl ResolvedIds {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn contains(&self, id: u64) -> bool {
        self.ids.contains(&id)
    }

    pub(crate) fn insert(&mut self, id: u64) {
        if !self.ids.insert(id) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }
}
