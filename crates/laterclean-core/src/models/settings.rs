use serde::{Deserialize, Serialize};

use crate::error::CleanerError;

/// The user's removal policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub enabled: bool,
    /// Watch percentage at or above which a video is removed, 0–100.
    pub threshold: u8,
    pub auto_remove: bool,
    pub show_visual_indicators: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 75,
            auto_remove: true,
            show_visual_indicators: true,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), CleanerError> {
        if self.threshold > 100 {
            return Err(CleanerError::InvalidSettings(format!(
                "threshold must be between 0 and 100, got {}",
                self.threshold
            )));
        }
        Ok(())
    }

    /// Whether progress events may trigger removals at all.
    pub fn auto_remove_active(&self) -> bool {
        self.enabled && self.auto_remove
    }

    pub fn meets_threshold(&self, percentage: u8) -> bool {
        percentage >= self.threshold
    }
}
