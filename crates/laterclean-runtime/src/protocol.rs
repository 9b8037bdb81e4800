//! Typed messages between a tracking front end and the runtime.

use serde::{Deserialize, Serialize};

use laterclean_core::error::CleanerError;
use laterclean_core::models::{ProgressRecord, Settings, Stats};
use laterclean_core::orchestrator::{ProgressEvent, RemovalOutcome};
use laterclean_core::reconcile::{CleanReport, FailedRemoval};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    WatchProgress {
        data: ProgressEvent,
    },
    GetWatchData {
        #[serde(rename = "videoId")]
        video_id: String,
    },
    GetSettings,
    UpdateSettings {
        settings: Settings,
    },
    ManualClean,
    GetStats,
}

/// One reply per [`Request`] variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Progress(ProgressReply),
    WatchData(ProgressRecord),
    Settings(Settings),
    Ack(Ack),
    Clean(CleanResponse),
    Stats(Stats),
}

/// Pushed to subscribers without a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Notification {
    StatsUpdated { stats: Stats },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReply {
    pub removed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watch_percentage: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&RemovalOutcome> for ProgressReply {
    fn from(outcome: &RemovalOutcome) -> Self {
        match outcome {
            RemovalOutcome::Removed {
                video_id,
                percentage,
                ..
            } => Self {
                removed: true,
                video_id: Some(video_id.clone()),
                watch_percentage: Some(*percentage),
                reason: Some(outcome.reason()),
                error: None,
            },
            RemovalOutcome::Failed { error, .. } => Self {
                removed: false,
                video_id: None,
                watch_percentage: None,
                reason: None,
                error: Some(error.clone()),
            },
            RemovalOutcome::SkippedAutoRemoveDisabled
            | RemovalOutcome::SkippedBelowThreshold { .. } => Self {
                removed: false,
                video_id: None,
                watch_percentage: None,
                reason: Some(outcome.reason()),
                error: None,
            },
        }
    }
}

impl ProgressReply {
    pub fn error(err: &CleanerError) -> Self {
        Self {
            removed: false,
            video_id: None,
            watch_percentage: None,
            reason: None,
            error: Some(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(err: &CleanerError) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
        }
    }
}

/// Summary of a manual clean: counts on success, a message on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_videos: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_saved: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<FailedRemoval>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CleanResponse {
    pub fn failed(err: &CleanerError) -> Self {
        Self {
            success: false,
            removed_count: None,
            total_videos: None,
            time_saved: None,
            failed: Vec::new(),
            error: Some(err.to_string()),
        }
    }
}

impl From<CleanReport> for CleanResponse {
    fn from(report: CleanReport) -> Self {
        Self {
            success: true,
            removed_count: Some(report.removed_count),
            total_videos: Some(report.total_videos),
            time_saved: Some(report.time_saved),
            failed: report.failed,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_requests() {
        let req: Request = serde_json::from_value(json!({
            "type": "WATCH_PROGRESS",
            "data": {
                "videoId": "abc",
                "watchPercentage": 80,
                "duration": 600.0,
                "playlistItemId": "item-abc"
            }
        }))
        .unwrap();
        assert!(matches!(req, Request::WatchProgress { ref data } if data.percentage == 80));

        let req: Request =
            serde_json::from_value(json!({"type": "GET_WATCH_DATA", "videoId": "abc"})).unwrap();
        assert_eq!(
            req,
            Request::GetWatchData {
                video_id: "abc".into()
            }
        );

        for (ty, expected) in [
            ("GET_SETTINGS", Request::GetSettings),
            ("MANUAL_CLEAN", Request::ManualClean),
            ("GET_STATS", Request::GetStats),
        ] {
            let req: Request = serde_json::from_value(json!({ "type": ty })).unwrap();
            assert_eq!(req, expected);
        }
    }

    #[test]
    fn test_unknown_request_type_rejected() {
        assert!(serde_json::from_value::<Request>(json!({"type": "REMOVE_ALL"})).is_err());
    }

    #[test]
    fn test_clean_failure_shape() {
        let resp = CleanResponse::failed(&CleanerError::CleanInProgress);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(
            json,
            json!({"success": false, "error": "a clean pass is already running"})
        );
    }

    #[test]
    fn test_progress_reply_shapes() {
        let removed = RemovalOutcome::Removed {
            video_id: "abc".into(),
            percentage: 80,
            threshold: 75,
            time_saved_secs: 120,
        };
        let json = serde_json::to_value(ProgressReply::from(&removed)).unwrap();
        assert_eq!(
            json,
            json!({
                "removed": true,
                "videoId": "abc",
                "watchPercentage": 80,
                "reason": "Reached 75% threshold"
            })
        );

        let below = RemovalOutcome::SkippedBelowThreshold {
            percentage: 10,
            threshold: 75,
        };
        let json = serde_json::to_value(ProgressReply::from(&below)).unwrap();
        assert_eq!(json, json!({"removed": false, "reason": "Below threshold"}));
    }

    #[test]
    fn test_notification_shape() {
        let n = Notification::StatsUpdated {
            stats: Stats::default(),
        };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "STATS_UPDATED");
        assert_eq!(json["stats"]["videosRemoved"], 0);
    }
}
