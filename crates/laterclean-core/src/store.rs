//! Ports the tracker and the bulk cleaner read and write through.
//!
//! Settings and stats are always reached via these traits, never through
//! process-wide state, so every component can be handed its own backend.

use std::future::Future;

use crate::error::CleanerError;
use crate::models::{ProgressRecord, Settings, Stats};

/// Per-video watch progress.
pub trait ProgressStore: Send + Sync {
    /// Overwrite the record for `video_id`. Last write wins; a lower reading
    /// replaces a higher one.
    fn record_progress(
        &self,
        video_id: &str,
        percentage: u8,
    ) -> impl Future<Output = Result<ProgressRecord, CleanerError>> + Send;

    /// The stored record, or [`ProgressRecord::unwatched`] if none exists.
    fn read_progress(
        &self,
        video_id: &str,
    ) -> impl Future<Output = Result<ProgressRecord, CleanerError>> + Send;
}

/// The user's removal policy.
pub trait SettingsProvider: Send + Sync {
    /// Current settings, or defaults if none were ever saved.
    fn get_settings(&self) -> impl Future<Output = Result<Settings, CleanerError>> + Send;

    /// Replace the settings wholesale. Out-of-range values are rejected.
    fn set_settings(
        &self,
        settings: Settings,
    ) -> impl Future<Output = Result<(), CleanerError>> + Send;
}

/// Append-only removal statistics.
pub trait StatsStore: Send + Sync {
    fn get_stats(&self) -> impl Future<Output = Result<Stats, CleanerError>> + Send;

    /// Add `removed` videos and `time_saved_secs` to the totals in one write
    /// and return the updated stats.
    fn record_removals(
        &self,
        removed: u64,
        time_saved_secs: u64,
    ) -> impl Future<Output = Result<Stats, CleanerError>> + Send;
}
