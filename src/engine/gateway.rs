//! Synchronous query and inject surface shared by the REST routes and the
//! dashboard socket.

use crate::model::attendance::AttendanceRecord;
use crate::model::employee::{Employee, NewEmployee};
use crate::model::location::Location;
use crate::model::scan::{ScanEvent, TagRead};
use crate::store::StoreError;

use super::stats::{self, TodayStats};
use super::{Engine, Ingested, now};

pub const DEFAULT_LOG_LIMIT: u32 = 100;
pub const MAX_LOG_LIMIT: u32 = 1_000;

impl Engine {
    pub fn recent_events(&self) -> Vec<ScanEvent> {
        self.recent.snapshot()
    }

    pub fn clear_recent_events(&self) {
        self.recent.clear();
    }

    pub async fn active_sessions(
        &self,
        location_id: Option<u64>,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        self.store.active_sessions(location_id).await
    }

    pub async fn attendance_history(
        &self,
        limit: Option<u32>,
        employee_id: Option<u64>,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let limit = limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);
        self.store.attendance_logs(limit, employee_id).await
    }

    pub async fn employees(&self) -> Result<Vec<Employee>, StoreError> {
        self.store.list_employees().await
    }

    pub async fn locations(&self) -> Result<Vec<Location>, StoreError> {
        self.store.list_locations().await
    }

    pub async fn today_stats(&self) -> Result<TodayStats, StoreError> {
        stats::today_stats(self.store.as_ref(), now()).await
    }

    pub async fn register_employee(&self, new: NewEmployee) -> Result<Employee, StoreError> {
        self.identity.register(new).await
    }

    /// Feed a hardware-free read into the debounce filter, as if the reader saw it now.
    pub async fn simulate_scan(&self, epc: &str, antenna_port: u16) -> Ingested {
        self.ingest(TagRead::new(epc, antenna_port, now())).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::engine_with;
    use super::*;
    use crate::model::scan::ScanAction;

    #[tokio::test]
    async fn simulated_scans_share_the_debounce_window() {
        let (_store, engine) = engine_with(60).await;

        let first = engine.simulate_scan("aaa", 1).await;
        assert!(matches!(first, Ingested::Forwarded(ref e) if e.action == ScanAction::In));
        assert_eq!(engine.simulate_scan("AAA", 1).await, Ingested::Suppressed);

        let active = engine.active_sessions(None).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(engine.today_stats().await.unwrap().active_now, 1);
        assert_eq!(engine.recent_events().len(), 1);

        engine.clear_recent_events();
        assert!(engine.recent_events().is_empty());
    }

    #[tokio::test]
    async fn history_limit_is_clamped() {
        let (_store, engine) = engine_with(0).await;
        engine.simulate_scan("AAA", 1).await;
        engine.simulate_scan("AAA", 2).await;

        assert_eq!(engine.attendance_history(Some(0), None).await.unwrap().len(), 1);
        assert_eq!(engine.attendance_history(None, Some(1)).await.unwrap().len(), 2);
        assert!(engine.attendance_history(None, Some(99)).await.unwrap().is_empty());
    }
}
