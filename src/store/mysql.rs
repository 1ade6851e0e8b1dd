//! MySQL-backed store.
//!
//! Expected schema (managed outside this service):
//!
//! ```sql
//! CREATE TABLE employees (
//!     id BIGINT UNSIGNED AUTO_INCREMENT PRIMARY KEY,
//!     epc_code VARCHAR(64) NOT NULL UNIQUE,
//!     full_name VARCHAR(255) NOT NULL,
//!     office VARCHAR(255) NULL,
//!     position VARCHAR(255) NULL,
//!     address VARCHAR(512) NULL
//! );
//! CREATE TABLE locations (
//!     id BIGINT UNSIGNED AUTO_INCREMENT PRIMARY KEY,
//!     antenna_port SMALLINT UNSIGNED NOT NULL UNIQUE,
//!     area_name VARCHAR(255) NOT NULL
//! );
//! CREATE TABLE attendance_logs (
//!     id BIGINT UNSIGNED AUTO_INCREMENT PRIMARY KEY,
//!     employee_id BIGINT UNSIGNED NOT NULL,
//!     location_id BIGINT UNSIGNED NOT NULL,
//!     time_in DATETIME(3) NOT NULL,
//!     time_out DATETIME(3) NULL,
//!     status VARCHAR(16) NOT NULL,
//!     open_marker TINYINT AS (IF(status = 'IN', 1, NULL)) STORED,
//!     UNIQUE KEY one_open_session (employee_id, location_id, open_marker),
//!     KEY by_time_in (time_in)
//! );
//! ```

use std::str::FromStr;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use futures_util::TryStreamExt;
use sqlx::MySqlPool;
use tracing::debug;

use super::{AttendanceStore, StoreError};
use crate::model::attendance::{AttendanceRecord, AttendanceSession, SessionKey, SessionStatus};
use crate::model::employee::{Employee, NewEmployee};
use crate::model::location::Location;

const SESSION_COLUMNS: &str = "id, employee_id, location_id, time_in, time_out, status";

const RECORD_SELECT: &str = r#"
    SELECT
        a.id, a.employee_id, a.location_id, a.time_in, a.time_out, a.status,
        e.full_name, e.epc_code, e.office, e.position,
        l.area_name
    FROM attendance_logs a
    JOIN employees e ON e.id = a.employee_id
    JOIN locations l ON l.id = a.location_id
"#;

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: u64,
    employee_id: u64,
    location_id: u64,
    time_in: NaiveDateTime,
    time_out: Option<NaiveDateTime>,
    status: String,
}

impl TryFrom<SessionRow> for AttendanceSession {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            employee_id: row.employee_id,
            location_id: row.location_id,
            time_in: row.time_in,
            time_out: row.time_out,
            status: parse_status(&row.status)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    id: u64,
    employee_id: u64,
    location_id: u64,
    time_in: NaiveDateTime,
    time_out: Option<NaiveDateTime>,
    status: String,
    full_name: String,
    epc_code: String,
    office: Option<String>,
    position: Option<String>,
    area_name: String,
}

impl TryFrom<RecordRow> for AttendanceRecord {
    type Error = StoreError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let status = parse_status(&row.status)?;
        let duration_seconds = match (status, row.time_out) {
            (SessionStatus::Completed, Some(out)) => Some((out - row.time_in).num_seconds()),
            _ => None,
        };
        Ok(Self {
            id: row.id,
            employee_id: row.employee_id,
            location_id: row.location_id,
            time_in: row.time_in,
            time_out: row.time_out,
            status,
            duration_seconds,
            full_name: row.full_name,
            epc_code: row.epc_code,
            office: row.office,
            position: row.position,
            area_name: row.area_name,
        })
    }
}

fn parse_status(raw: &str) -> Result<SessionStatus, StoreError> {
    SessionStatus::from_str(raw)
        .map_err(|_| StoreError::Unavailable(format!("unexpected session status {raw:?}")))
}

fn into_records(rows: Vec<RecordRow>) -> Result<Vec<AttendanceRecord>, StoreError> {
    rows.into_iter().map(AttendanceRecord::try_from).collect()
}

pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttendanceStore for MySqlStore {
    async fn employee_by_epc(&self, epc: &str) -> Result<Option<Employee>, StoreError> {
        let employee = sqlx::query_as::<_, Employee>(
            "SELECT id, epc_code, full_name, office, position, address FROM employees WHERE epc_code = ?",
        )
        .bind(epc)
        .fetch_optional(&self.pool)
        .await?;
        Ok(employee)
    }

    async fn employee_epcs(&self) -> Result<Vec<String>, StoreError> {
        let mut stream =
            sqlx::query_scalar::<_, String>("SELECT epc_code FROM employees").fetch(&self.pool);

        let mut epcs = Vec::new();
        while let Some(epc) = stream.try_next().await? {
            epcs.push(epc);
        }
        Ok(epcs)
    }

    async fn list_employees(&self) -> Result<Vec<Employee>, StoreError> {
        let employees = sqlx::query_as::<_, Employee>(
            "SELECT id, epc_code, full_name, office, position, address FROM employees ORDER BY full_name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(employees)
    }

    async fn create_employee(&self, new: &NewEmployee) -> Result<Employee, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO employees (epc_code, full_name, office, position, address)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new.epc_code)
        .bind(&new.full_name)
        .bind(&new.office)
        .bind(&new.position)
        .bind(&new.address)
        .execute(&self.pool)
        .await?;

        Ok(Employee {
            id: result.last_insert_id(),
            epc_code: new.epc_code.clone(),
            full_name: new.full_name.clone(),
            office: new.office.clone(),
            position: new.position.clone(),
            address: new.address.clone(),
        })
    }

    async fn list_locations(&self) -> Result<Vec<Location>, StoreError> {
        let locations = sqlx::query_as::<_, Location>(
            "SELECT id, antenna_port, area_name FROM locations ORDER BY antenna_port",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(locations)
    }

    async fn location_by_antenna(&self, antenna_port: u16) -> Result<Option<Location>, StoreError> {
        let location = sqlx::query_as::<_, Location>(
            "SELECT id, antenna_port, area_name FROM locations WHERE antenna_port = ?",
        )
        .bind(antenna_port)
        .fetch_optional(&self.pool)
        .await?;
        Ok(location)
    }

    async fn open_session(&self, key: SessionKey) -> Result<Option<AttendanceSession>, StoreError> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM attendance_logs \
             WHERE employee_id = ? AND location_id = ? AND status = 'IN' LIMIT 1"
        );
        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(key.employee_id)
            .bind(key.location_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(AttendanceSession::try_from).transpose()
    }

    async fn session(&self, session_id: u64) -> Result<Option<AttendanceSession>, StoreError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM attendance_logs WHERE id = ?");
        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(AttendanceSession::try_from).transpose()
    }

    async fn create_session(
        &self,
        key: SessionKey,
        time_in: NaiveDateTime,
    ) -> Result<AttendanceSession, StoreError> {
        // the one_open_session index turns a racing second insert into a 23000 Conflict
        let result = sqlx::query(
            r#"
            INSERT INTO attendance_logs (employee_id, location_id, time_in, status)
            VALUES (?, ?, ?, 'IN')
            "#,
        )
        .bind(key.employee_id)
        .bind(key.location_id)
        .bind(time_in)
        .execute(&self.pool)
        .await?;

        debug!(session_id = result.last_insert_id(), %key, "Session row inserted");

        Ok(AttendanceSession {
            id: result.last_insert_id(),
            employee_id: key.employee_id,
            location_id: key.location_id,
            time_in,
            time_out: None,
            status: SessionStatus::In,
        })
    }

    async fn close_session(
        &self,
        open: &AttendanceSession,
        time_out: NaiveDateTime,
    ) -> Result<AttendanceSession, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE attendance_logs
            SET time_out = ?, status = 'COMPLETED'
            WHERE id = ?
            AND status = 'IN'
            "#,
        )
        .bind(time_out)
        .bind(open.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("session {} is not open", open.id)));
        }

        Ok(AttendanceSession {
            time_out: Some(time_out),
            status: SessionStatus::Completed,
            ..open.clone()
        })
    }

    async fn active_sessions(
        &self,
        location_id: Option<u64>,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let rows = match location_id {
            Some(location_id) => {
                let sql = format!(
                    "{RECORD_SELECT} WHERE a.status = 'IN' AND a.location_id = ? \
                     ORDER BY a.time_in DESC, a.id DESC"
                );
                sqlx::query_as::<_, RecordRow>(&sql)
                    .bind(location_id)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "{RECORD_SELECT} WHERE a.status = 'IN' ORDER BY a.time_in DESC, a.id DESC"
                );
                sqlx::query_as::<_, RecordRow>(&sql)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        into_records(rows)
    }

    async fn attendance_logs(
        &self,
        limit: u32,
        employee_id: Option<u64>,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let rows = match employee_id {
            Some(employee_id) => {
                let sql = format!(
                    "{RECORD_SELECT} WHERE a.employee_id = ? \
                     ORDER BY a.time_in DESC, a.id DESC LIMIT ?"
                );
                sqlx::query_as::<_, RecordRow>(&sql)
                    .bind(employee_id)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!("{RECORD_SELECT} ORDER BY a.time_in DESC, a.id DESC LIMIT ?");
                sqlx::query_as::<_, RecordRow>(&sql)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        into_records(rows)
    }

    async fn sessions_started_between(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<AttendanceSession>, StoreError> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM attendance_logs WHERE time_in >= ? AND time_in < ?"
        );
        let rows = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(AttendanceSession::try_from).collect()
    }
}
