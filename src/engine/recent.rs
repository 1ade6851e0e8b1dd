use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use crate::model::scan::ScanEvent;

/// Bounded history of broadcast scan events, newest first. Never persisted.
pub struct RecentEvents {
    events: Mutex<VecDeque<ScanEvent>>,
    capacity: usize,
}

impl RecentEvents {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, event: ScanEvent) {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        events.push_front(event);
        events.truncate(self.capacity);
    }

    pub fn snapshot(&self) -> Vec<ScanEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::scan::TagRead;
    use chrono::NaiveDate;

    fn event(epc: &str) -> ScanEvent {
        let at = NaiveDate::from_ymd_opt(2026, 10, 16)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        ScanEvent::unknown(&TagRead::new(epc, 1, at), format!("Unknown EPC: {epc}"))
    }

    #[test]
    fn keeps_newest_first_up_to_capacity() {
        let recent = RecentEvents::new(2);
        recent.push(event("A"));
        recent.push(event("B"));
        recent.push(event("C"));

        let epcs: Vec<_> = recent.snapshot().into_iter().map(|e| e.epc).collect();
        assert_eq!(epcs, ["C", "B"]);

        recent.clear();
        assert!(recent.snapshot().is_empty());
    }
}
