//! IN/OUT toggling per (employee, location).
//!
//! The check-then-write for one key runs under that key's async mutex, so two
//! scans for the same key never both open or both close a session. Waiters on
//! a tokio mutex are served FIFO, which keeps same-key scans in arrival order.
//! The caller keeps the key locked until it drops the returned [`KeyGuard`],
//! so whatever it publishes about the transition stays in that order too.
//! Keys are independent of each other.
//!
//! Each store step is retried on its own. A write whose reply was lost may
//! still have committed, so a `Conflict` on retry is settled by re-reading.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::NaiveDateTime;
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};

use crate::model::attendance::{AttendanceSession, SessionKey};
use crate::store::{AttendanceStore, StoreError};

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Opened(AttendanceSession),
    Closed(AttendanceSession),
}

impl Transition {
    pub fn session(&self) -> &AttendanceSession {
        match self {
            Transition::Opened(s) | Transition::Closed(s) => s,
        }
    }
}

#[derive(Debug, Error)]
pub enum PresenceError {
    #[error("{key}: store {step} failed after {attempts} attempts: {source}")]
    Exhausted {
        key: SessionKey,
        step: &'static str,
        attempts: u32,
        source: StoreError,
    },

    #[error("{key}: session changed under a toggle: {source}")]
    Conflict { key: SessionKey, source: StoreError },
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts per store step for transient failures, first try included.
    pub max_attempts: u32,
    pub backoff: std::time::Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: std::time::Duration::from_millis(200),
        }
    }
}

/// Per-key async mutexes. Entries are dropped once nobody holds or awaits them.
#[derive(Default)]
struct KeyLocks {
    locks: Mutex<HashMap<SessionKey, Arc<tokio::sync::Mutex<()>>>>,
}

/// Holds one key's lock. Released on drop.
pub struct KeyGuard<'a> {
    key: SessionKey,
    owner: &'a KeyLocks,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyLocks {
    async fn acquire(&self, key: SessionKey) -> KeyGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(key).or_default().clone()
        };
        KeyGuard {
            key,
            owner: self,
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        // release the key before deciding whether the entry is still wanted
        self.guard.take();
        let mut locks = self
            .owner
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.key);
        }
    }
}

/// Sole mutator of session state.
pub struct PresenceMachine {
    store: Arc<dyn AttendanceStore>,
    locks: KeyLocks,
    retry: RetryPolicy,
}

impl PresenceMachine {
    pub fn new(store: Arc<dyn AttendanceStore>, retry: RetryPolicy) -> Self {
        Self {
            store,
            locks: KeyLocks::default(),
            retry,
        }
    }

    /// Open a session for `key` if none is open, otherwise close the open one.
    ///
    /// The key stays locked until the returned guard is dropped.
    pub async fn toggle(
        &self,
        key: SessionKey,
        at: NaiveDateTime,
    ) -> Result<(Transition, KeyGuard<'_>), PresenceError> {
        let guard = self.locks.acquire(key).await;

        let transition = match self
            .retrying(key, "read", || self.store.open_session(key))
            .await?
        {
            None => self.open(key, at).await?,
            Some(open) => self.close(key, open, at).await?,
        };
        Ok((transition, guard))
    }

    async fn open(&self, key: SessionKey, at: NaiveDateTime) -> Result<Transition, PresenceError> {
        let source = match self
            .retrying(key, "open", || self.store.create_session(key, at))
            .await
        {
            Ok(session) => {
                debug!(%key, session_id = session.id, "Session opened");
                return Ok(Transition::Opened(session));
            }
            Err(PresenceError::Conflict { source, .. }) => source,
            Err(e) => return Err(e),
        };

        match self
            .retrying(key, "read", || self.store.open_session(key))
            .await?
        {
            // an earlier attempt committed before its reply was lost
            Some(session) if session.time_in == at => {
                debug!(%key, session_id = session.id, "Session open confirmed by re-read");
                Ok(Transition::Opened(session))
            }
            Some(other) => {
                warn!(%key, session_id = other.id, "Session opened by another writer, closing it");
                self.close(key, other, at).await
            }
            None => Err(PresenceError::Conflict { key, source }),
        }
    }

    async fn close(
        &self,
        key: SessionKey,
        open: AttendanceSession,
        at: NaiveDateTime,
    ) -> Result<Transition, PresenceError> {
        let source = match self
            .retrying(key, "close", || self.store.close_session(&open, at))
            .await
        {
            Ok(session) => {
                debug!(%key, session_id = session.id, "Session closed");
                return Ok(Transition::Closed(session));
            }
            Err(PresenceError::Conflict { source, .. }) => source,
            Err(e) => return Err(e),
        };

        match self
            .retrying(key, "read", || self.store.session(open.id))
            .await?
        {
            Some(session) if !session.is_open() && session.time_out == Some(at) => {
                debug!(%key, session_id = session.id, "Session close confirmed by re-read");
                Ok(Transition::Closed(session))
            }
            _ => Err(PresenceError::Conflict { key, source }),
        }
    }

    /// Run one store step, retrying transient failures with linear backoff.
    async fn retrying<T, F, Fut>(
        &self,
        key: SessionKey,
        step: &'static str,
        mut op: F,
    ) -> Result<T, PresenceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(source @ StoreError::Conflict(_)) => {
                    return Err(PresenceError::Conflict { key, source });
                }
                Err(source) if attempt >= self.retry.max_attempts || !source.is_transient() => {
                    return Err(PresenceError::Exhausted {
                        key,
                        step,
                        attempts: attempt,
                        source,
                    });
                }
                Err(e) => {
                    warn!(%key, step, attempt, error = %e, "Presence step failed, retrying");
                    tokio::time::sleep(self.retry.backoff * attempt).await;
                }
            }
        }
    }
}
