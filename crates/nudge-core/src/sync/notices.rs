//! Deduplication of "something changed" notices

use std::collections::{HashSet, VecDeque};

use crate::models::ChangeEvent;

const DEFAULT_CAPACITY: usize = 1024;

/// Remembers recently delivered `(entity_id, event_id)` pairs.
///
/// The oldest pairs are forgotten once `capacity` is reached.
#[derive(Debug, Clone)]
pub struct ChangeNotices {
    seen: HashSet<(String, String)>,
    order: VecDeque<(String, String)>,
    capacity: usize,
}

impl Default for ChangeNotices {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl ChangeNotices {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// `true` the first time an event is seen
    pub fn accept(&mut self, event: &ChangeEvent) -> bool {
        let key = (event.entity_id.clone(), event.event_id.clone());
        if !self.seen.insert(key.clone()) {
            return false;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        true
    }

    /// Keep only events not delivered before, preserving order
    pub fn filter_new(&mut self, events: Vec<ChangeEvent>) -> Vec<ChangeEvent> {
        events
            .into_iter()
            .filter(|event| self.accept(event))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
