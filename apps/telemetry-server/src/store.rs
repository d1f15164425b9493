use std::collections::{BTreeSet, HashSet, VecDeque};

use crate::events::{Event, NewEvent};
use crate::models::FilterOptions;

/// Session ids beyond this count are left out of the filter options.
const MAX_FILTER_SESSIONS: usize = 100;

/// Bounded, append-only event history.
///
/// The store numbers events as they arrive; ids keep increasing across
/// evictions. Only the head is ever trimmed.
pub struct EventStore {
    events: VecDeque<Event>,
    capacity: usize,
    next_id: u64,
}

impl EventStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            next_id: 1,
        }
    }

    /// Number and append events, evicting the oldest ones past capacity.
    pub fn append(&mut self, batch: Vec<NewEvent>) -> Vec<Event> {
        let mut appended = Vec::with_capacity(batch.len());
        for new in batch {
            let event = Event::from_new(self.next_id, new);
            self.next_id += 1;
            self.events.push_back(event.clone());
            appended.push(event);
        }

        while self.events.len() > self.capacity {
            self.events.pop_front();
        }

        appended
    }

    /// The last `limit` events, newest first or in arrival order.
    pub fn recent(&self, limit: usize, newest_first: bool) -> Vec<Event> {
        let skip = self.events.len().saturating_sub(limit);
        let mut out: Vec<Event> = self.events.iter().skip(skip).cloned().collect();
        if newest_first {
            out.reverse();
        }
        out
    }

    /// Newest-first events for one agent, scanning the last `limit` events.
    pub fn by_agent(&self, agent_name: &str, limit: usize) -> Vec<Event> {
        self.recent(limit, true)
            .into_iter()
            .filter(|e| e.agent_name == agent_name)
            .collect()
    }

    pub fn filter_options(&self) -> FilterOptions {
        let mut source_apps = BTreeSet::new();
        let mut event_types = BTreeSet::new();
        let mut seen_sessions = HashSet::new();
        let mut session_ids = Vec::new();

        for event in &self.events {
            source_apps.insert(event.source_app.clone());
            event_types.insert(event.event_type.as_str().to_string());
            if session_ids.len() < MAX_FILTER_SESSIONS && seen_sessions.insert(event.session_id.as_str()) {
                session_ids.push(event.session_id.clone());
            }
        }

        FilterOptions {
            source_apps: source_apps.into_iter().collect(),
            session_ids,
            hook_event_types: event_types.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}
