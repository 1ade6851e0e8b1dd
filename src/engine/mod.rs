//! Scan-to-attendance engine.
//!
//! reader feed -> debounce -> identity -> presence -> {store, recent events, hub}

pub mod debounce;
pub mod gateway;
pub mod hub;
pub mod identity;
pub mod presence;
pub mod reader;
pub mod recent;
pub mod stats;

use std::future::Future;
use std::sync::Arc;

use chrono::{Duration, Local};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::model::attendance::SessionKey;
use crate::model::employee::EmployeeSummary;
use crate::model::scan::{ScanAction, ScanEvent, TagRead};
use crate::store::{AttendanceStore, StoreError};

use debounce::Debouncer;
use hub::{EventHub, HubMessage, LiveSnapshot};
use identity::IdentityResolver;
use presence::{PresenceMachine, RetryPolicy, Transition};
use recent::RecentEvents;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub dwell_window: Duration,
    pub recent_capacity: usize,
    pub subscriber_queue: usize,
    pub retry: RetryPolicy,
    /// Shown on the status endpoint.
    pub reader_address: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            dwell_window: Duration::seconds(5),
            recent_capacity: 50,
            subscriber_queue: 64,
            retry: RetryPolicy::default(),
            reader_address: String::new(),
        }
    }
}

/// What happened to one tag read.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingested {
    Forwarded(ScanEvent),
    /// Inside the dwell window of an earlier read.
    Suppressed,
    /// Store trouble outlasted the retry budget; already logged.
    Dropped,
}

pub struct Engine {
    store: Arc<dyn AttendanceStore>,
    debouncer: Debouncer,
    identity: IdentityResolver,
    presence: PresenceMachine,
    hub: EventHub,
    recent: RecentEvents,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(store: Arc<dyn AttendanceStore>, settings: EngineSettings) -> Self {
        Self {
            debouncer: Debouncer::new(settings.dwell_window),
            identity: IdentityResolver::new(store.clone()),
            presence: PresenceMachine::new(store.clone(), settings.retry),
            hub: EventHub::new(settings.subscriber_queue),
            recent: RecentEvents::new(settings.recent_capacity),
            store,
            settings,
        }
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    pub fn identity(&self) -> &IdentityResolver {
        &self.identity
    }

    pub fn reader_address(&self) -> &str {
        &self.settings.reader_address
    }

    /// Debounce, resolve and apply one read.
    pub async fn ingest(&self, read: TagRead) -> Ingested {
        if !self.debouncer.admit(&read) {
            return Ingested::Suppressed;
        }
        self.process(read).await
    }

    /// Load badge lookups, then reload them every `period` so employees added
    /// to the store by other tools stop resolving as unknown. `None` loads once.
    pub async fn keep_identity_warm(
        self: Arc<Self>,
        batch_size: usize,
        period: Option<std::time::Duration>,
        cancel: CancellationToken,
    ) {
        loop {
            if let Err(e) = self.identity.warmup(batch_size).await {
                error!(error = %e, "Failed to warm up employee lookups");
            }
            let Some(period) = period else { break };
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(period) => {}
            }
        }
    }

    /// Drain the reader feed. Reads are applied one at a time in arrival order.
    pub async fn run_feed(self: Arc<Self>, mut rx: mpsc::Receiver<TagRead>, cancel: CancellationToken) {
        loop {
            let read = tokio::select! {
                _ = cancel.cancelled() => break,
                read = rx.recv() => match read {
                    Some(read) => read,
                    None => break,
                },
            };
            self.ingest(read).await;
        }
        info!("Feed consumer stopped");
    }

    async fn process(&self, read: TagRead) -> Ingested {
        let employee = match self
            .with_retries("employee lookup", || self.identity.resolve(&read.epc))
            .await
        {
            Ok(Some(employee)) => employee,
            Ok(None) => {
                info!(epc = %read.epc, antenna = read.antenna_port, "UNKNOWN badge");
                let message = format!("Unknown EPC: {}", read.epc);
                return Ingested::Forwarded(self.emit(ScanEvent::unknown(&read, message), false).await);
            }
            Err(e) => {
                error!(error = %e, epc = %read.epc, "Scan dropped: employee lookup failed");
                return Ingested::Dropped;
            }
        };

        let location = match self
            .with_retries("location lookup", || self.identity.location_for(read.antenna_port))
            .await
        {
            Ok(Some(location)) => location,
            Ok(None) => {
                info!(epc = %read.epc, antenna = read.antenna_port, "UNKNOWN antenna");
                let message = format!("Unknown antenna port: {}", read.antenna_port);
                return Ingested::Forwarded(self.emit(ScanEvent::unknown(&read, message), false).await);
            }
            Err(e) => {
                error!(error = %e, antenna = read.antenna_port, "Scan dropped: location lookup failed");
                return Ingested::Dropped;
            }
        };

        let key = SessionKey::new(employee.id, location.id);
        // held until the event is published so same-key events keep arrival order
        let (transition, _key_guard) = match self.presence.toggle(key, read.observed_at).await {
            Ok(toggled) => toggled,
            Err(e) => {
                error!(error = %e, epc = %read.epc, "Scan dropped");
                return Ingested::Dropped;
            }
        };

        let (action, message) = match &transition {
            Transition::Opened(_) => (
                ScanAction::In,
                format!("{} checked IN to {}", employee.full_name, location.area_name),
            ),
            Transition::Closed(_) => (
                ScanAction::Out,
                format!("{} checked OUT from {}", employee.full_name, location.area_name),
            ),
        };
        info!(
            employee_id = employee.id,
            location_id = location.id,
            session_id = transition.session().id,
            %action,
            "{message}"
        );

        let event = ScanEvent {
            id: Uuid::new_v4(),
            timestamp: read.observed_at,
            action,
            epc: read.epc,
            antenna: read.antenna_port,
            employee: Some(EmployeeSummary::from(&employee)),
            location: Some(location),
            session_id: Some(transition.session().id),
            message,
        };
        Ingested::Forwarded(self.emit(event, true).await)
    }

    async fn emit(&self, event: ScanEvent, state_changed: bool) -> ScanEvent {
        self.recent.push(event.clone());
        self.hub.publish(&HubMessage::ScanEvent(event.clone()));
        if state_changed {
            self.publish_aggregates().await;
        }
        event
    }

    /// Recompute the derived views and push them; skipped views stay stale.
    async fn publish_aggregates(&self) {
        match self.store.active_sessions(None).await {
            Ok(active) => self.hub.publish(&HubMessage::ActiveEmployees(active)),
            Err(e) => warn!(error = %e, "Active list not refreshed"),
        }
        match stats::today_stats(self.store.as_ref(), now()).await {
            Ok(stats) => self.hub.publish(&HubMessage::Stats(stats)),
            Err(e) => warn!(error = %e, "Stats not refreshed"),
        }
    }

    /// Current state for a new subscriber. Parts the store cannot serve are left empty.
    pub async fn snapshot(&self) -> LiveSnapshot {
        let active_employees = self.store.active_sessions(None).await.unwrap_or_else(|e| {
            warn!(error = %e, "Snapshot without active list");
            Vec::new()
        });
        let locations = self.store.list_locations().await.unwrap_or_else(|e| {
            warn!(error = %e, "Snapshot without locations");
            Vec::new()
        });
        let stats = stats::today_stats(self.store.as_ref(), now())
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Snapshot without stats");
                Default::default()
            });

        LiveSnapshot {
            connected: true,
            recent_events: self.recent.snapshot(),
            active_employees,
            locations,
            stats,
        }
    }

    async fn with_retries<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Err(e) if e.is_transient() && attempt < self.settings.retry.max_attempts => {
                    warn!(error = %e, attempt, "{what} failed, retrying");
                    tokio::time::sleep(self.settings.retry.backoff * attempt).await;
                }
                result => return result,
            }
        }
    }
}

/// Local wall-clock time; attendance is kept in local time.
pub fn now() -> chrono::NaiveDateTime {
    Local::now().naive_local()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::attendance::SessionStatus;
    use crate::model::employee::NewEmployee;
    use crate::store::MemoryStore;
    use chrono::{NaiveDate, NaiveDateTime};

    pub(crate) fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 16)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    pub(crate) async fn engine_with(dwell_secs: i64) -> (Arc<MemoryStore>, Engine) {
        let store =
            Arc::new(MemoryStore::with_locations([(1, "Production"), (2, "Warehouse")]).unwrap());
        store
            .create_employee(&NewEmployee {
                epc_code: "AAA".into(),
                full_name: "E1".into(),
                office: None,
                position: None,
                address: None,
            })
            .await
            .unwrap();
        let settings = EngineSettings {
            dwell_window: Duration::seconds(dwell_secs),
            retry: RetryPolicy {
                max_attempts: 3,
                backoff: std::time::Duration::from_millis(1),
            },
            ..EngineSettings::default()
        };
        (store.clone(), Engine::new(store, settings))
    }

    fn forwarded(outcome: Ingested) -> ScanEvent {
        match outcome {
            Ingested::Forwarded(event) => event,
            other => panic!("expected a forwarded event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn badge_scanned_twice_opens_then_closes_with_exact_duration() {
        let (store, engine) = engine_with(3).await;

        let entry = forwarded(engine.ingest(TagRead::new("AAA", 1, at(9, 0))).await);
        assert_eq!(entry.action, ScanAction::In);
        assert_eq!(entry.message, "E1 checked IN to Production");

        let exit = forwarded(engine.ingest(TagRead::new("aaa", 1, at(10, 30))).await);
        assert_eq!(exit.action, ScanAction::Out);
        assert_eq!(exit.session_id, entry.session_id);

        let sessions = store.sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].status, SessionStatus::Completed);
        assert_eq!(sessions[0].time_in, at(9, 0));
        assert_eq!(sessions[0].time_out, Some(at(10, 30)));
        assert_eq!(sessions[0].duration(), Some(Duration::minutes(90)));
    }

    #[tokio::test]
    async fn redetection_inside_dwell_window_emits_one_event() {
        let (store, engine) = engine_with(3).await;
        let sub = engine.hub().subscribe(async { HubMessage::Events(vec![]) }).await;

        forwarded(engine.ingest(TagRead::new("AAA", 1, at(9, 0))).await);
        let again = TagRead::new("AAA", 1, at(9, 0) + Duration::milliseconds(500));
        assert_eq!(engine.ingest(again).await, Ingested::Suppressed);

        assert_eq!(engine.recent.snapshot().len(), 1);
        assert_eq!(store.sessions().len(), 1);

        // snapshot, scan_event, active_employees, stats
        let mut kinds = Vec::new();
        for _ in 0..4 {
            let raw = sub.recv().await.unwrap();
            let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
            kinds.push(json["type"].as_str().unwrap().to_string());
        }
        assert_eq!(kinds, ["events", "scan_event", "active_employees", "stats"]);
    }

    #[tokio::test]
    async fn unknown_badge_is_broadcast_but_never_touches_sessions() {
        let (store, engine) = engine_with(3).await;
        let a = engine.hub().subscribe(async { HubMessage::Events(vec![]) }).await;
        let b = engine.hub().subscribe(async { HubMessage::Events(vec![]) }).await;

        let event = forwarded(engine.ingest(TagRead::new("ZZZ", 2, at(9, 0))).await);
        assert_eq!(event.action, ScanAction::Unknown);
        assert_eq!(event.message, "Unknown EPC: ZZZ");
        assert!(event.employee.is_none());
        assert!(store.sessions().is_empty());

        for sub in [&a, &b] {
            sub.recv().await.unwrap();
            let raw = sub.recv().await.unwrap();
            let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
            assert_eq!(json["type"], "scan_event");
            assert_eq!(json["data"]["action"], "UNKNOWN");
        }
    }

    #[tokio::test]
    async fn open_session_elsewhere_is_untouched() {
        let (store, engine) = engine_with(3).await;

        forwarded(engine.ingest(TagRead::new("AAA", 1, at(9, 0))).await);
        forwarded(engine.ingest(TagRead::new("AAA", 2, at(9, 0))).await);
        let out = forwarded(engine.ingest(TagRead::new("AAA", 2, at(9, 20))).await);
        assert_eq!(out.action, ScanAction::Out);

        let production = store.open_session(SessionKey::new(1, 1)).await.unwrap();
        assert_eq!(production.map(|s| s.time_in), Some(at(9, 0)));
    }

    #[tokio::test]
    async fn unmapped_antenna_is_reported_unknown() {
        let (store, engine) = engine_with(3).await;
        let event = forwarded(engine.ingest(TagRead::new("AAA", 9, at(9, 0))).await);
        assert_eq!(event.action, ScanAction::Unknown);
        assert_eq!(event.message, "Unknown antenna port: 9");
        assert!(store.sessions().is_empty());
    }

    #[tokio::test]
    async fn persistent_store_failure_drops_the_scan() {
        let (store, engine) = engine_with(3).await;
        store.fail_next_writes(10);

        let outcome = engine.ingest(TagRead::new("AAA", 1, at(9, 0))).await;
        assert_eq!(outcome, Ingested::Dropped);
        assert!(engine.recent.snapshot().is_empty());
    }

    #[tokio::test]
    async fn feed_consumer_applies_reads_until_cancelled() {
        let (store, engine) = engine_with(3).await;
        let engine = Arc::new(engine);
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let consumer = tokio::spawn(engine.clone().run_feed(rx, cancel.clone()));

        tx.send(TagRead::new("AAA", 1, at(9, 0))).await.unwrap();
        tx.send(TagRead::new("AAA", 1, at(9, 0) + Duration::seconds(1)))
            .await
            .unwrap();
        tx.send(TagRead::new("AAA", 1, at(9, 10))).await.unwrap();
        drop(tx);
        consumer.await.unwrap();

        let sessions = store.sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].duration(), Some(Duration::minutes(10)));
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn identity_refresh_picks_up_employees_added_elsewhere() {
        let (store, engine) = engine_with(0).await;
        let engine = Arc::new(engine);
        engine.identity().warmup(100).await.unwrap();

        store
            .create_employee(&NewEmployee {
                epc_code: "BBB".into(),
                full_name: "E2".into(),
                office: None,
                position: None,
                address: None,
            })
            .await
            .unwrap();
        assert!(engine.identity().resolve("BBB").await.unwrap().is_none());

        let cancel = CancellationToken::new();
        let refresher = tokio::spawn(engine.clone().keep_identity_warm(
            100,
            Some(std::time::Duration::from_millis(10)),
            cancel.clone(),
        ));

        let mut resolved = None;
        for _ in 0..100 {
            resolved = engine.identity().resolve("BBB").await.unwrap();
            if resolved.is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(resolved.map(|e| e.full_name), Some("E2".to_string()));

        cancel.cancel();
        refresher.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_scans_for_one_key_publish_in_state_order() {
        let (_store, engine) = engine_with(0).await;
        let engine = Arc::new(engine);
        let sub = engine
            .hub()
            .subscribe(async { HubMessage::Events(vec![]) })
            .await;

        let mut handles = Vec::new();
        for minute in 0..6 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine.ingest(TagRead::new("AAA", 1, at(9, minute))).await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut actions = Vec::new();
        while actions.len() < 6 {
            let raw = tokio::time::timeout(std::time::Duration::from_secs(1), sub.recv())
                .await
                .unwrap()
                .unwrap();
            let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
            if json["type"] == "scan_event" {
                actions.push(json["data"]["action"].as_str().unwrap().to_string());
            }
        }
        assert_eq!(actions, ["IN", "OUT", "IN", "OUT", "IN", "OUT"]);
    }
}
