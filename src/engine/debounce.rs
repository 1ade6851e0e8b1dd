use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{Duration, NaiveDateTime};
use tracing::debug;

use crate::model::scan::TagRead;

/// Entries idle for this many dwell windows are forgotten.
const EVICT_AFTER_WINDOWS: i32 = 4;

/// Suppresses repeat reads of the same (epc, antenna) inside the dwell window.
///
/// Fixed antennas re-detect a stationary badge many times per second; only the
/// first sighting per window is forwarded. Reads of the same badge at two
/// different antennas are independent.
pub struct Debouncer {
    window: Duration,
    evict_after: Duration,
    state: Mutex<DebounceState>,
}

#[derive(Default)]
struct DebounceState {
    last_forwarded: HashMap<(String, u16), NaiveDateTime>,
    last_sweep: Option<NaiveDateTime>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            evict_after: window
                .checked_mul(EVICT_AFTER_WINDOWS)
                .unwrap_or(Duration::MAX),
            state: Mutex::new(DebounceState::default()),
        }
    }

    /// `true` when the read should go downstream.
    pub fn admit(&self, read: &TagRead) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.sweep(&mut state, read.observed_at);

        let key = (read.epc.clone(), read.antenna_port);
        if let Some(last) = state.last_forwarded.get(&key) {
            let elapsed = read.observed_at - *last;
            // a clock stepping backwards must not pin a badge forever
            if elapsed >= Duration::zero() && elapsed < self.window {
                debug!(
                    epc = %read.epc,
                    antenna = read.antenna_port,
                    elapsed_ms = elapsed.num_milliseconds(),
                    "Read suppressed inside dwell window"
                );
                return false;
            }
        }

        state.last_forwarded.insert(key, read.observed_at);
        true
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_forwarded
            .len()
    }

    fn sweep(&self, state: &mut DebounceState, now: NaiveDateTime) {
        let due = state
            .last_sweep
            .is_none_or(|last| now - last >= self.window || now < last);
        if !due {
            return;
        }
        let horizon = self.evict_after;
        state
            .last_forwarded
            .retain(|_, last| now - *last < horizon && *last <= now);
        state.last_sweep = Some(now);
    }
}
