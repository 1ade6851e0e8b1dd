//! Fan-out of live updates to dashboard subscribers.
//!
//! Every subscriber owns a bounded outbox. Publishing never waits: when an
//! outbox is full its oldest message is dropped, so a stalled dashboard only
//! loses its own backlog.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::model::attendance::AttendanceRecord;
use crate::model::employee::Employee;
use crate::model::location::Location;
use crate::model::scan::ScanEvent;

use super::stats::TodayStats;

/// Everything a dashboard needs to render from scratch.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct LiveSnapshot {
    pub connected: bool,
    pub recent_events: Vec<ScanEvent>,
    pub active_employees: Vec<AttendanceRecord>,
    pub locations: Vec<Location>,
    pub stats: TodayStats,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum HubMessage {
    Init(LiveSnapshot),
    ScanEvent(ScanEvent),
    ActiveEmployees(Vec<AttendanceRecord>),
    Stats(TodayStats),
    Locations(Vec<Location>),
    AttendanceLogs(Vec<AttendanceRecord>),
    Employees(Vec<Employee>),
    Events(Vec<ScanEvent>),
    Error { message: String },
}

impl HubMessage {
    pub fn encode(&self) -> Arc<str> {
        match serde_json::to_string(self) {
            Ok(json) => json.into(),
            Err(e) => {
                error!(error = %e, "Failed to encode hub message");
                Arc::from(r#"{"type":"error","data":{"message":"encoding failed"}}"#)
            }
        }
    }
}

struct Outbox {
    queue: Mutex<VecDeque<Arc<str>>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl Outbox {
    fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    fn push(&self, message: Arc<str>) {
        {
            let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
            if queue.len() >= self.capacity {
                queue.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            queue.push_back(message);
        }
        self.notify.notify_one();
    }

    fn push_front(&self, message: Arc<str>) {
        {
            let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
            if queue.len() >= self.capacity {
                queue.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            queue.push_front(message);
        }
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<Arc<str>> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

#[derive(Default)]
struct HubInner {
    subscribers: RwLock<HashMap<Uuid, Arc<Outbox>>>,
}

impl HubInner {
    fn remove(&self, id: &Uuid) -> Option<Arc<Outbox>> {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }
}

#[derive(Clone)]
pub struct EventHub {
    inner: Arc<HubInner>,
    queue_capacity: usize,
}

impl EventHub {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner::default()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Register a subscriber, then build its first message.
    ///
    /// Broadcasts published while `snapshot` is being computed are queued
    /// behind it instead of being lost.
    pub async fn subscribe<F>(&self, snapshot: F) -> Subscription
    where
        F: Future<Output = HubMessage>,
    {
        let id = Uuid::new_v4();
        let outbox = Arc::new(Outbox::new(self.queue_capacity));

        let total = {
            let mut subscribers = self
                .inner
                .subscribers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            subscribers.insert(id, outbox.clone());
            subscribers.len()
        };
        info!(subscriber = %id, total, "Dashboard subscribed");

        // dropping this future mid-snapshot unsubscribes
        let subscription = Subscription {
            id,
            outbox,
            hub: Arc::downgrade(&self.inner),
        };
        subscription.outbox.push_front(snapshot.await.encode());
        subscription
    }

    /// Deliver to every subscriber without waiting on any of them.
    pub fn publish(&self, message: &HubMessage) {
        let encoded = message.encode();
        let subscribers = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for (id, outbox) in subscribers.iter() {
            let before = outbox.dropped.load(Ordering::Relaxed);
            outbox.push(encoded.clone());
            if outbox.dropped.load(Ordering::Relaxed) > before {
                debug!(subscriber = %id, "Subscriber outbox full, dropped oldest message");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Close every subscription. Pending messages are discarded.
    pub fn shutdown(&self) {
        let drained: Vec<_> = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        for (_, outbox) in &drained {
            outbox.close();
        }
        info!(closed = drained.len(), "Event hub shut down");
    }
}

/// A subscriber's receiving end. Dropping it unsubscribes.
pub struct Subscription {
    id: Uuid,
    outbox: Arc<Outbox>,
    hub: Weak<HubInner>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next message, or `None` once closed.
    pub async fn recv(&self) -> Option<Arc<str>> {
        loop {
            if self.outbox.closed.load(Ordering::Acquire) {
                return None;
            }
            if let Some(message) = self.outbox.pop() {
                return Some(message);
            }
            self.outbox.notify.notified().await;
        }
    }

    pub fn dropped(&self) -> u64 {
        self.outbox.dropped.load(Ordering::Relaxed)
    }

    /// Idempotent.
    pub fn close(&self) {
        if let Some(hub) = self.hub.upgrade() {
            if hub.remove(&self.id).is_some() {
                info!(subscriber = %self.id, dropped = self.dropped(), "Dashboard unsubscribed");
            }
        }
        self.outbox.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn stats_message(total: u64) -> HubMessage {
        HubMessage::Stats(TodayStats {
            total_entries: total,
            active_now: 0,
            completed: 0,
        })
    }

    async fn next(sub: &Subscription) -> serde_json::Value {
        let raw = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("message expected")
            .expect("subscription open");
        serde_json::from_str(&raw).unwrap()
    }

    #[tokio::test]
    async fn snapshot_arrives_before_broadcasts() {
        let hub = EventHub::new(8);
        let sub = hub.subscribe(async { stats_message(0) }).await;
        hub.publish(&stats_message(1));

        assert_eq!(next(&sub).await["data"]["total_entries"], 0);
        assert_eq!(next(&sub).await["data"]["total_entries"], 1);
    }

    #[tokio::test]
    async fn every_subscriber_gets_every_broadcast() {
        let hub = EventHub::new(8);
        let a = hub.subscribe(async { stats_message(0) }).await;
        let b = hub.subscribe(async { stats_message(0) }).await;
        hub.publish(&HubMessage::Locations(vec![]));

        for sub in [&a, &b] {
            assert_eq!(next(sub).await["type"], "stats");
            assert_eq!(next(sub).await["type"], "locations");
        }
    }

    #[tokio::test]
    async fn slow_subscriber_loses_oldest_without_blocking_others() {
        let hub = EventHub::new(2);
        let slow = hub.subscribe(async { stats_message(0) }).await;
        let fast = hub.subscribe(async { stats_message(0) }).await;
        assert_eq!(next(&fast).await["data"]["total_entries"], 0);

        for total in 1..=5 {
            hub.publish(&stats_message(total));
            assert_eq!(next(&fast).await["data"]["total_entries"], total);
        }

        assert_eq!(next(&slow).await["data"]["total_entries"], 4);
        assert_eq!(next(&slow).await["data"]["total_entries"], 5);
        assert_eq!(slow.dropped(), 4);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_only_removes_itself() {
        let hub = EventHub::new(4);
        let a = hub.subscribe(async { stats_message(0) }).await;
        let b = hub.subscribe(async { stats_message(0) }).await;
        assert_eq!(hub.subscriber_count(), 2);

        a.close();
        a.close();
        assert_eq!(hub.subscriber_count(), 1);
        assert!(a.recv().await.is_none());

        drop(b);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn shutdown_wakes_waiting_subscribers() {
        let hub = EventHub::new(4);
        let sub = hub.subscribe(async { stats_message(0) }).await;
        next(&sub).await;

        let waiter = tokio::spawn(async move { sub.recv().await });
        tokio::task::yield_now().await;
        hub.shutdown();

        let received = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(received.is_none());
    }

    #[tokio::test]
    async fn broadcasts_during_snapshot_follow_the_snapshot() {
        let hub = EventHub::new(8);
        let publisher = hub.clone();
        let sub = hub
            .subscribe(async move {
                publisher.publish(&HubMessage::Locations(vec![]));
                stats_message(3)
            })
            .await;

        let first = next(&sub).await;
        assert_eq!(first["type"], "stats");
        assert_eq!(first["data"]["total_entries"], 3);
        assert_eq!(next(&sub).await["type"], "locations");
    }

    #[test]
    fn messages_are_type_tagged() {
        let json: serde_json::Value =
            serde_json::from_str(&HubMessage::Error { message: "bad".into() }.encode()).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["data"]["message"], "bad");
    }
}
