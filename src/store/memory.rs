use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::NaiveDateTime;

use super::{AttendanceStore, StoreError};
use crate::model::attendance::{AttendanceRecord, AttendanceSession, SessionKey, SessionStatus};
use crate::model::employee::{Employee, NewEmployee};
use crate::model::location::Location;

/// Process-local store with the same uniqueness rules as the MySQL schema.
/// Used when no `DATABASE_URL` is configured.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    employees: Vec<Employee>,
    locations: Vec<Location>,
    sessions: Vec<AttendanceSession>,
    open: HashMap<SessionKey, u64>,
    #[cfg(test)]
    failing_writes: u32,
}

impl State {
    fn record(&self, session: &AttendanceSession) -> Option<AttendanceRecord> {
        let employee = self.employees.iter().find(|e| e.id == session.employee_id)?;
        let location = self.locations.iter().find(|l| l.id == session.location_id)?;
        Some(AttendanceRecord::from_session(
            session,
            employee,
            &location.area_name,
        ))
    }

    #[cfg(test)]
    fn take_failure(&mut self) -> Result<(), StoreError> {
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn take_failure(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the antenna -> area mapping. Ports must be unique.
    pub fn with_locations<I, S>(locations: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = (u16, S)>,
        S: Into<String>,
    {
        let store = Self::new();
        {
            let mut state = store.lock();
            for (antenna_port, area_name) in locations {
                if state.locations.iter().any(|l| l.antenna_port == antenna_port) {
                    return Err(StoreError::Conflict(format!(
                        "antenna port {antenna_port} mapped twice"
                    )));
                }
                let id = state.locations.len() as u64 + 1;
                state.locations.push(Location {
                    id,
                    antenna_port,
                    area_name: area_name.into(),
                });
            }
        }
        Ok(store)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `count` session writes fail as if the store were unreachable.
    #[cfg(test)]
    pub fn fail_next_writes(&self, count: u32) {
        self.lock().failing_writes = count;
    }

    #[cfg(test)]
    pub fn sessions(&self) -> Vec<AttendanceSession> {
        self.lock().sessions.clone()
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn employee_by_epc(&self, epc: &str) -> Result<Option<Employee>, StoreError> {
        Ok(self
            .lock()
            .employees
            .iter()
            .find(|e| e.epc_code == epc)
            .cloned())
    }

    async fn employee_epcs(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .lock()
            .employees
            .iter()
            .map(|e| e.epc_code.clone())
            .collect())
    }

    async fn list_employees(&self) -> Result<Vec<Employee>, StoreError> {
        let mut employees = self.lock().employees.clone();
        employees.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(employees)
    }

    async fn create_employee(&self, new: &NewEmployee) -> Result<Employee, StoreError> {
        let mut state = self.lock();
        if state.employees.iter().any(|e| e.epc_code == new.epc_code) {
            return Err(StoreError::Conflict(format!(
                "epc code {} already registered",
                new.epc_code
            )));
        }
        let employee = Employee {
            id: state.employees.len() as u64 + 1,
            epc_code: new.epc_code.clone(),
            full_name: new.full_name.clone(),
            office: new.office.clone(),
            position: new.position.clone(),
            address: new.address.clone(),
        };
        state.employees.push(employee.clone());
        Ok(employee)
    }

    async fn list_locations(&self) -> Result<Vec<Location>, StoreError> {
        let mut locations = self.lock().locations.clone();
        locations.sort_by_key(|l| l.antenna_port);
        Ok(locations)
    }

    async fn location_by_antenna(&self, antenna_port: u16) -> Result<Option<Location>, StoreError> {
        Ok(self
            .lock()
            .locations
            .iter()
            .find(|l| l.antenna_port == antenna_port)
            .cloned())
    }

    async fn open_session(&self, key: SessionKey) -> Result<Option<AttendanceSession>, StoreError> {
        let state = self.lock();
        Ok(state
            .open
            .get(&key)
            .and_then(|id| state.sessions.iter().find(|s| s.id == *id))
            .cloned())
    }

    async fn session(&self, session_id: u64) -> Result<Option<AttendanceSession>, StoreError> {
        Ok(self
            .lock()
            .sessions
            .iter()
            .find(|s| s.id == session_id)
            .cloned())
    }

    async fn create_session(
        &self,
        key: SessionKey,
        time_in: NaiveDateTime,
    ) -> Result<AttendanceSession, StoreError> {
        let mut state = self.lock();
        state.take_failure()?;
        if state.open.contains_key(&key) {
            return Err(StoreError::Conflict(format!("{key} already has an open session")));
        }
        let session = AttendanceSession {
            id: state.sessions.len() as u64 + 1,
            employee_id: key.employee_id,
            location_id: key.location_id,
            time_in,
            time_out: None,
            status: SessionStatus::In,
        };
        state.open.insert(key, session.id);
        state.sessions.push(session.clone());
        Ok(session)
    }

    async fn close_session(
        &self,
        open: &AttendanceSession,
        time_out: NaiveDateTime,
    ) -> Result<AttendanceSession, StoreError> {
        let session_id = open.id;
        let mut state = self.lock();
        state.take_failure()?;
        let session = state
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| StoreError::NotFound(format!("session {session_id}")))?;
        if !session.is_open() {
            return Err(StoreError::Conflict(format!(
                "session {session_id} already completed"
            )));
        }
        session.time_out = Some(time_out);
        session.status = SessionStatus::Completed;
        let closed = session.clone();
        state.open.remove(&closed.key());
        Ok(closed)
    }

    async fn active_sessions(
        &self,
        location_id: Option<u64>,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let state = self.lock();
        let mut records: Vec<_> = state
            .sessions
            .iter()
            .filter(|s| s.is_open())
            .filter(|s| location_id.is_none_or(|id| s.location_id == id))
            .filter_map(|s| state.record(s))
            .collect();
        records.sort_by(|a, b| b.time_in.cmp(&a.time_in).then(b.id.cmp(&a.id)));
        Ok(records)
    }

    async fn attendance_logs(
        &self,
        limit: u32,
        employee_id: Option<u64>,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let state = self.lock();
        let mut records: Vec<_> = state
            .sessions
            .iter()
            .filter(|s| employee_id.is_none_or(|id| s.employee_id == id))
            .filter_map(|s| state.record(s))
            .collect();
        records.sort_by(|a, b| b.time_in.cmp(&a.time_in).then(b.id.cmp(&a.id)));
        records.truncate(limit as usize);
        Ok(records)
    }

    async fn sessions_started_between(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<AttendanceSession>, StoreError> {
        Ok(self
            .lock()
            .sessions
            .iter()
            .filter(|s| s.time_in >= start && s.time_in < end)
            .cloned()
            .collect())
    }
}
