// [[RARO]]/apps/telemetry-server/src/hub.rs
// Purpose: Event store plus live subscriber fan-out behind a single lock.
// Architecture: Streaming Layer
// Dependencies: parking_lot, tokio mpsc

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::events::{Event, NewEvent, StreamMessage};
use crate::models::{BackgroundTask, FilterOptions};
use crate::observability::IngestStats;
use crate::store::EventStore;

pub type SubscriberId = u64;

/// A freshly registered subscriber: the backlog it must render first, and
/// the channel that carries everything appended afterwards.
pub struct Subscription {
    pub id: SubscriberId,
    pub snapshot: Vec<Event>,
    pub receiver: mpsc::Receiver<StreamMessage>,
}

struct HubInner {
    store: EventStore,
    subscribers: HashMap<SubscriberId, mpsc::Sender<StreamMessage>>,
    next_subscriber: SubscriberId,
}

pub struct EventHub {
    inner: Mutex<HubInner>,
    snapshot_size: usize,
    subscriber_buffer: usize,
    stats: Arc<IngestStats>,
}

impl EventHub {
    pub fn new(
        capacity: usize,
        snapshot_size: usize,
        subscriber_buffer: usize,
        stats: Arc<IngestStats>,
    ) -> Self {
        Self {
            inner: Mutex::new(HubInner {
                store: EventStore::new(capacity),
                subscribers: HashMap::new(),
                next_subscriber: 1,
            }),
            snapshot_size,
            subscriber_buffer: subscriber_buffer.max(1),
            stats,
        }
    }

    /// Register a subscriber.
    ///
    /// Snapshot and registration happen under the same lock as appends, so
    /// the subscriber sees every event exactly once.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.subscriber_buffer);
        let mut inner = self.inner.lock();

        let id = inner.next_subscriber;
        inner.next_subscriber += 1;
        let snapshot = inner.store.recent(self.snapshot_size, false);
        inner.subscribers.insert(id, tx);

        tracing::info!("Stream subscriber {} connected ({} total)", id, inner.subscribers.len());
        Subscription {
            id,
            snapshot,
            receiver: rx,
        }
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        let mut inner = self.inner.lock();
        if inner.subscribers.remove(&id).is_some() {
            tracing::info!("Stream subscriber {} disconnected ({} left)", id, inner.subscribers.len());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Append a batch from one producer and push each event to subscribers,
    /// preserving batch order.
    pub fn publish_events(&self, batch: Vec<NewEvent>) -> Vec<Event> {
        if batch.is_empty() {
            return Vec::new();
        }

        let mut inner = self.inner.lock();
        let appended = inner.store.append(batch);
        for event in &appended {
            self.broadcast(&mut inner, StreamMessage::Event(event.clone()));
        }

        self.stats.record_events(appended.len());
        tracing::debug!("Stored {} event(s) ({} in memory)", appended.len(), inner.store.len());
        appended
    }

    pub fn publish_task(&self, task: &BackgroundTask) {
        let mut inner = self.inner.lock();
        self.broadcast(&mut inner, StreamMessage::TaskUpdate(task.clone()));
    }

    /// Non-blocking delivery. A subscriber whose queue is full or closed is
    /// dropped; the others are unaffected.
    fn broadcast(&self, inner: &mut HubInner, message: StreamMessage) {
        let mut dropped = Vec::new();
        for (id, tx) in &inner.subscribers {
            match tx.try_send(message.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!("Subscriber {} is not keeping up, dropping it", id);
                    dropped.push(*id);
                }
                Err(TrySendError::Closed(_)) => dropped.push(*id),
            }
        }

        for id in dropped {
            inner.subscribers.remove(&id);
            self.stats.record_subscriber_dropped();
        }
    }

    pub fn recent(&self, limit: usize) -> Vec<Event> {
        self.inner.lock().store.recent(limit, true)
    }

    pub fn by_agent(&self, agent_name: &str, limit: usize) -> Vec<Event> {
        self.inner.lock().store.by_agent(agent_name, limit)
    }

    pub fn filter_options(&self) -> FilterOptions {
        self.inner.lock().store.filter_options()
    }

    pub fn stored_events(&self) -> usize {
        self.inner.lock().store.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;
    use crate::models::{TaskStatus, TaskType};
    use serde_json::json;

    fn hub(capacity: usize, snapshot: usize, buffer: usize) -> EventHub {
        EventHub::new(capacity, snapshot, buffer, Arc::new(IngestStats::default()))
    }

    fn new_event(n: usize) -> NewEvent {
        NewEvent {
            source_app: "claude-code".to_string(),
            session_id: "s1".to_string(),
            timestamp: n as i64,
            event_type: EventType::ToolInvoked,
            payload: json!({ "n": n }),
            summary: None,
            agent_name: "PAI".to_string(),
        }
    }

    fn event_id(message: StreamMessage) -> u64 {
        match message {
            StreamMessage::Event(e) => e.id,
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn snapshot_then_live_without_gap_or_duplicate() {
        let hub = hub(1000, 50, 16);
        for n in 0..10 {
            hub.publish_events(vec![new_event(n)]);
        }

        let mut sub = hub.subscribe();
        assert_eq!(
            sub.snapshot.iter().map(|e| e.id).collect::<Vec<_>>(),
            (1..=10).collect::<Vec<_>>()
        );

        hub.publish_events(vec![new_event(10)]);
        assert_eq!(event_id(sub.receiver.recv().await.unwrap()), 11);
        assert!(sub.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn snapshot_is_bounded() {
        let hub = hub(1000, 5, 16);
        hub.publish_events((0..20).map(new_event).collect());
        let sub = hub.subscribe();
        assert_eq!(
            sub.snapshot.iter().map(|e| e.id).collect::<Vec<_>>(),
            vec![16, 17, 18, 19, 20]
        );
    }

    #[tokio::test]
    async fn failing_subscriber_is_isolated() {
        let hub = hub(1000, 50, 16);
        let mut healthy_a = hub.subscribe();
        let dead = hub.subscribe();
        let mut healthy_b = hub.subscribe();
        drop(dead.receiver);

        hub.publish_events(vec![new_event(0)]);

        assert_eq!(event_id(healthy_a.receiver.recv().await.unwrap()), 1);
        assert_eq!(event_id(healthy_b.receiver.recv().await.unwrap()), 1);
        assert_eq!(hub.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn slow_subscriber_is_dropped_not_buffered() {
        let hub = hub(1000, 50, 2);
        let _slow = hub.subscribe();
        let mut fast = hub.subscribe();

        for n in 0..3 {
            hub.publish_events(vec![new_event(n)]);
            assert_eq!(event_id(fast.receiver.recv().await.unwrap()), n as u64 + 1);
        }

        assert_eq!(hub.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn task_updates_reach_subscribers() {
        let hub = hub(10, 10, 4);
        let mut sub = hub.subscribe();
        let task = BackgroundTask {
            task_id: "abc".into(),
            session_id: String::new(),
            agent_id: "abc".into(),
            status: TaskStatus::Running,
            started_at: 0,
            completed_at: None,
            last_activity: 0,
            description: "Running Tests".into(),
            prompt: None,
            result: None,
            error: None,
            event_count: 1,
            output_file: "/tmp/abc.output".into(),
            output_preview: String::new(),
            task_type: TaskType::Plain,
        };
        hub.publish_task(&task);

        match sub.receiver.recv().await.unwrap() {
            StreamMessage::TaskUpdate(t) => assert_eq!(t.task_id, "abc"),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn unsubscribe_removes_registration() {
        let hub = hub(10, 10, 4);
        let sub = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);
        hub.unsubscribe(sub.id);
        assert_eq!(hub.subscriber_count(), 0);
    }
}
