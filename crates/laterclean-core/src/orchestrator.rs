use laterclean_api::QueueService;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::CleanerError;
use crate::models::{time_saved_secs, Settings};
use crate::store::{ProgressStore, SettingsProvider, StatsStore};

/// One playback sample for a tracked video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub video_id: String,
    #[serde(rename = "watchPercentage")]
    pub percentage: u8,
    /// Total length of the video in seconds, as reported by the player.
    pub duration: f64,
    /// Queue-item handle needed to remove the video, if the caller knows it.
    #[serde(rename = "playlistItemId")]
    pub queue_item_id: Option<String>,
}

/// Outcome of evaluating a progress event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RemovalOutcome {
    /// The video was removed from the queue and stats were updated.
    Removed {
        video_id: String,
        percentage: u8,
        threshold: u8,
        time_saved_secs: u64,
    },
    /// The extension or auto-removal is switched off.
    SkippedAutoRemoveDisabled,
    /// Not watched far enough yet.
    SkippedBelowThreshold { percentage: u8, threshold: u8 },
    /// Removal was due but authentication or the remote call failed.
    Failed { video_id: String, error: String },
}

impl RemovalOutcome {
    pub fn is_removed(&self) -> bool {
        matches!(self, Self::Removed { .. })
    }

    /// Short human-readable explanation.
    pub fn reason(&self) -> String {
        match self {
            Self::Removed { threshold, .. } => format!("Reached {threshold}% threshold"),
            Self::SkippedAutoRemoveDisabled => "Auto-remove disabled".into(),
            Self::SkippedBelowThreshold { .. } => "Below threshold".into(),
            Self::Failed { error, .. } => error.clone(),
        }
    }
}

/// What the policy says to do with a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Disabled,
    BelowThreshold,
    Remove,
}

/// Removal is due iff tracking and auto-removal are on and `percentage >= threshold`.
pub fn decide(settings: &Settings, percentage: u8) -> Decision {
    if !settings.auto_remove_active() {
        Decision::Disabled
    } else if !settings.meets_threshold(percentage) {
        Decision::BelowThreshold
    } else {
        Decision::Remove
    }
}

/// Process a progress event: persist it, then remove the video if the
/// policy says so.
///
/// Authentication and remote failures become [`RemovalOutcome::Failed`];
/// only storage failures are returned as errors.
pub async fn process_progress<S, Q>(
    event: &ProgressEvent,
    store: &S,
    queue: &Q,
) -> Result<RemovalOutcome, CleanerError>
where
    S: ProgressStore + SettingsProvider + StatsStore,
    Q: QueueService,
{
    // Players can overshoot near the end; everything below sees 0..=100.
    let percentage = event.percentage.min(100);
    debug!(video_id = %event.video_id, percentage, "Watch progress");

    store.record_progress(&event.video_id, percentage).await?;

    let settings = store.get_settings().await?;

    match decide(&settings, percentage) {
        Decision::Disabled => {
            debug!(
                enabled = settings.enabled,
                auto_remove = settings.auto_remove,
                "Auto-remove disabled, skipping removal check"
            );
            Ok(RemovalOutcome::SkippedAutoRemoveDisabled)
        }
        Decision::BelowThreshold => {
            debug!(
                video_id = %event.video_id,
                percentage,
                threshold = settings.threshold,
                "Below threshold"
            );
            Ok(RemovalOutcome::SkippedBelowThreshold {
                percentage,
                threshold: settings.threshold,
            })
        }
        Decision::Remove => {
            info!(
                video_id = %event.video_id,
                percentage,
                threshold = settings.threshold,
                "Threshold reached, removing from queue"
            );

            if let Err(e) = remove_from_queue(event, queue).await {
                warn!(video_id = %event.video_id, error = %e, "Removal failed");
                return Ok(RemovalOutcome::Failed {
                    video_id: event.video_id.clone(),
                    error: e.to_string(),
                });
            }

            let time_saved = time_saved_secs(event.duration, percentage);
            store.record_removals(1, time_saved).await?;

            info!(
                video_id = %event.video_id,
                percentage,
                time_saved,
                "Auto-removed video"
            );
            Ok(RemovalOutcome::Removed {
                video_id: event.video_id.clone(),
                percentage,
                threshold: settings.threshold,
                time_saved_secs: time_saved,
            })
        }
    }
}

async fn remove_from_queue<Q: QueueService>(
    event: &ProgressEvent,
    queue: &Q,
) -> Result<(), CleanerError> {
    let item_id = event
        .queue_item_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| CleanerError::RemoteApi {
            status: None,
            message: format!("no queue-item handle for video {}", event.video_id),
        })?;

    let credential = queue.authenticate().await?;
    queue.remove_item(&credential, item_id).await?;
    Ok(())
}
