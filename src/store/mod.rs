//! The authoritative store of employees, locations and attendance sessions.
//!
//! Writes to sessions only ever come from `engine::presence`; everything else reads.

pub mod memory;
pub mod mysql;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use thiserror::Error;

use crate::model::attendance::{AttendanceRecord, AttendanceSession, SessionKey};
use crate::model::employee::{Employee, NewEmployee};
use crate::model::location::Location;

pub use memory::MemoryStore;
pub use mysql::MySqlStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Store unreachable or failed mid-query. Worth retrying.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A uniqueness rule rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound(err.to_string()),
            // MySQL integrity constraint violation
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23000") => {
                StoreError::Conflict(db_err.message().to_string())
            }
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// `epc` must already be normalized.
    async fn employee_by_epc(&self, epc: &str) -> Result<Option<Employee>, StoreError>;

    async fn employee_epcs(&self) -> Result<Vec<String>, StoreError>;

    /// Ordered by full name.
    async fn list_employees(&self) -> Result<Vec<Employee>, StoreError>;

    /// Fails with `Conflict` when the epc code is already registered.
    async fn create_employee(&self, new: &NewEmployee) -> Result<Employee, StoreError>;

    /// Ordered by antenna port.
    async fn list_locations(&self) -> Result<Vec<Location>, StoreError>;

    async fn location_by_antenna(&self, antenna_port: u16) -> Result<Option<Location>, StoreError>;

    async fn open_session(&self, key: SessionKey) -> Result<Option<AttendanceSession>, StoreError>;

    async fn session(&self, session_id: u64) -> Result<Option<AttendanceSession>, StoreError>;

    /// Fails with `Conflict` when the key already has an open session.
    async fn create_session(
        &self,
        key: SessionKey,
        time_in: NaiveDateTime,
    ) -> Result<AttendanceSession, StoreError>;

    /// Close `open` and return it completed. Fails with `Conflict` when the
    /// session is not open anymore.
    async fn close_session(
        &self,
        open: &AttendanceSession,
        time_out: NaiveDateTime,
    ) -> Result<AttendanceSession, StoreError>;

    /// Open sessions, newest first.
    async fn active_sessions(
        &self,
        location_id: Option<u64>,
    ) -> Result<Vec<AttendanceRecord>, StoreError>;

    /// All sessions, newest first.
    async fn attendance_logs(
        &self,
        limit: u32,
        employee_id: Option<u64>,
    ) -> Result<Vec<AttendanceRecord>, StoreError>;

    /// Sessions with `start <= time_in < end`.
    async fn sessions_started_between(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<AttendanceSession>, StoreError>;
}
