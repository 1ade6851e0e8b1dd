use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::attendance::{AttendanceSession, SessionStatus};
use crate::store::{AttendanceStore, StoreError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TodayStats {
    /// Sessions whose time_in falls on the current local day.
    pub total_entries: u64,
    pub active_now: u64,
    pub completed: u64,
}

/// `[local midnight, next local midnight)` around `now`.
pub fn day_bounds(now: NaiveDateTime) -> (NaiveDateTime, NaiveDateTime) {
    let start = now.date().and_time(chrono::NaiveTime::MIN);
    (start, start + Duration::days(1))
}

pub fn summarize<'a>(sessions: impl IntoIterator<Item = &'a AttendanceSession>) -> TodayStats {
    sessions
        .into_iter()
        .fold(TodayStats::default(), |mut stats, session| {
            stats.total_entries += 1;
            match session.status {
                SessionStatus::In => stats.active_now += 1,
                SessionStatus::Completed => stats.completed += 1,
            }
            stats
        })
}

/// Totals for the local calendar day containing `now`. Pure read.
pub async fn today_stats(
    store: &dyn AttendanceStore,
    now: NaiveDateTime,
) -> Result<TodayStats, StoreError> {
    let (start, end) = day_bounds(now);
    let sessions = store.sessions_started_between(start, end).await?;
    Ok(summarize(&sessions))
}
