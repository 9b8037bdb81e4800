//! Bulk reconciliation of the remote queue against cached progress.

use laterclean_api::{QueueItem, QueueService};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::CleanerError;
use crate::models::{time_saved_secs, whole_minutes, ProgressRecord, Stats};
use crate::store::{ProgressStore, SettingsProvider, StatsStore};

/// A queue item paired with its cached progress for the length of one pass.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub item: QueueItem,
    pub progress: ProgressRecord,
}

impl QueueEntry {
    pub fn percentage(&self) -> u8 {
        self.progress.percentage
    }

    fn summary(&self) -> EntrySummary {
        EntrySummary {
            video_id: self.item.video_id.clone(),
            title: self.item.title.clone(),
            percentage: self.percentage(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntrySummary {
    pub video_id: String,
    pub title: String,
    pub percentage: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedRemoval {
    #[serde(flatten)]
    pub entry: EntrySummary,
    pub error: String,
}

/// Result of a completed pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanReport {
    pub removed_count: u64,
    pub total_videos: usize,
    /// Estimated seconds saved across removed items.
    pub time_saved: u64,
    pub threshold: u8,
    pub removed: Vec<EntrySummary>,
    pub kept: Vec<EntrySummary>,
    pub failed: Vec<FailedRemoval>,
    /// Stats after the aggregate write, if one happened.
    pub stats: Option<Stats>,
}

/// Run one reconciliation pass.
///
/// Authentication, listing, and reading settings or progress must succeed
/// before anything is removed; their failures are returned as errors. After
/// that, a failed removal is recorded in the report and the pass moves on to
/// the next item. Stats are written once, only if something was removed.
pub async fn clean_queue<S, Q>(
    store: &S,
    queue: &Q,
    estimated_duration_secs: f64,
) -> Result<CleanReport, CleanerError>
where
    S: ProgressStore + SettingsProvider + StatsStore,
    Q: QueueService,
{
    info!("Manual clean started");

    let credential = queue.authenticate().await?;
    let items = queue.list_queue_items(&credential).await?;
    info!(count = items.len(), "Fetched watch-later queue");

    let settings = store.get_settings().await?;
    debug!(threshold = settings.threshold, "Current threshold");

    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        let progress = store.read_progress(&item.video_id).await?;
        entries.push(QueueEntry { item, progress });
    }

    let mut report = CleanReport {
        total_videos: entries.len(),
        threshold: settings.threshold,
        ..Default::default()
    };

    for entry in &entries {
        let meets = settings.meets_threshold(entry.percentage());
        debug!(
            video_id = %entry.item.video_id,
            title = %entry.item.title,
            percentage = entry.percentage(),
            meets,
            "Analyzed queue item"
        );

        if !meets {
            report.kept.push(entry.summary());
            continue;
        }

        match queue.remove_item(&credential, &entry.item.item_id).await {
            Ok(()) => {
                debug!(video_id = %entry.item.video_id, "Removed from queue");
                report.time_saved += time_saved_secs(estimated_duration_secs, entry.percentage());
                report.removed_count += 1;
                report.removed.push(entry.summary());
            }
            Err(e) => {
                warn!(
                    video_id = %entry.item.video_id,
                    item_id = %entry.item.item_id,
                    error = %e,
                    "Removal failed, continuing"
                );
                report.failed.push(FailedRemoval {
                    entry: entry.summary(),
                    error: CleanerError::from(e).to_string(),
                });
            }
        }
    }

    if report.removed_count > 0 {
        match store
            .record_removals(report.removed_count, report.time_saved)
            .await
        {
            Ok(stats) => report.stats = Some(stats),
            Err(e) => {
                // The remote removals already happened; keep the count visible.
                error!(
                    removed = report.removed_count,
                    time_saved = report.time_saved,
                    error = %e,
                    "Failed to record clean stats"
                );
                return Err(CleanerError::Persistence(format!(
                    "removed {} videos but failed to record stats: {e}",
                    report.removed_count
                )));
            }
        }
    }

    log_summary(&report);
    Ok(report)
}

fn log_summary(report: &CleanReport) {
    info!(
        total = report.total_videos,
        removed = report.removed_count,
        kept = report.kept.len(),
        failed = report.failed.len(),
        minutes_saved = whole_minutes(report.time_saved),
        "Manual clean finished"
    );
    if let Some(stats) = &report.stats {
        info!(
            videos_removed = stats.videos_removed,
            total_minutes_saved = stats.minutes_saved(),
            "Lifetime totals"
        );
    }
    for v in &report.removed {
        info!(title = %v.title, percentage = v.percentage, "Removed");
    }
    for v in &report.kept {
        debug!(title = %v.title, percentage = v.percentage, "Kept (below threshold)");
    }
}
