use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Running totals of removals. Counters only ever grow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Stats {
    pub videos_removed: u64,
    pub last_clean_date: Option<DateTime<Utc>>,
    /// Seconds of unwatched video that no longer sit in the queue.
    pub total_watch_time_saved: u64,
}

impl Stats {
    /// Fold confirmed removals into the totals.
    ///
    /// `last_clean_date` moves only when something was actually removed.
    pub fn record_removals(&mut self, removed: u64, time_saved_secs: u64, now: DateTime<Utc>) {
        if removed > 0 {
            self.videos_removed = self.videos_removed.saturating_add(removed);
            self.last_clean_date = Some(now);
        }
        self.total_watch_time_saved = self.total_watch_time_saved.saturating_add(time_saved_secs);
    }

    pub fn minutes_saved(&self) -> u64 {
        whole_minutes(self.total_watch_time_saved)
    }
}

pub fn whole_minutes(secs: u64) -> u64 {
    secs / 60
}

/// Unwatched remainder of a video, in whole seconds.
pub fn time_saved_secs(duration_secs: f64, percentage: u8) -> u64 {
    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return 0;
    }
    let remaining = 100u8.saturating_sub(percentage.min(100));
    (duration_secs * f64::from(remaining) / 100.0).floor() as u64
}
