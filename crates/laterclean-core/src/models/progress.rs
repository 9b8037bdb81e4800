use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Settings;

/// Last observed watch progress for one video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub video_id: String,
    /// Whole percent watched, 0–100.
    pub percentage: u8,
    pub last_updated: Option<DateTime<Utc>>,
}

impl ProgressRecord {
    /// The record reported for a video that was never sampled.
    pub fn unwatched(video_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            percentage: 0,
            last_updated: None,
        }
    }

    pub fn band(&self) -> ProgressBand {
        ProgressBand::for_percentage(self.percentage)
    }

    /// The badge to show for this record, if any. Nothing is shown when
    /// indicators are off or the video has no progress yet.
    pub fn indicator(&self, settings: &Settings) -> Option<ProgressBand> {
        (settings.show_visual_indicators && self.percentage > 0).then(|| self.band())
    }
}

/// Colour band for the progress badge shown on queue thumbnails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressBand {
    Low,
    Medium,
    High,
}

impl ProgressBand {
    pub fn for_percentage(percentage: u8) -> Self {
        match percentage {
            0..=24 => Self::Low,
            25..=74 => Self::Medium,
            _ => Self::High,
        }
    }
}

/// Whole percent of `duration_secs` covered by `position_secs`, truncated.
///
/// Returns `None` while the duration is unknown (zero, negative, NaN or
/// infinite, as players report before metadata loads). Positions past the
/// end clamp to 100.
pub fn watch_percentage(position_secs: f64, duration_secs: f64) -> Option<u8> {
    if !duration_secs.is_finite() || duration_secs <= 0.0 || !position_secs.is_finite() {
        return None;
    }
    let pct = (position_secs.max(0.0) / duration_secs * 100.0).floor();
    Some(pct.min(100.0) as u8)
}
