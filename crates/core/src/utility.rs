use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Fixed id of the single `utility` row.
pub const UTILITY_ID: i64 = 0;
/// Fixed id of the single `field_properties` row.
pub const FIELD_PROPERTIES_ID: i64 = 1;
/// Fixed id of the single `workspace_settings` row.
pub const WORKSPACE_SETTINGS_ID: i64 = 1;

pub const DEFAULT_LAST_PAGE_COUNTS: i64 = 8;
pub const DEFAULT_BEAT_DURATION: f64 = 0.5;

/// Show-wide values kept in the `utility` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utility {
    pub last_page_counts: i64,
    pub default_beat_duration: f64,
    pub show_title: String,
}

impl Default for Utility {
    fn default() -> Self {
        Self {
            last_page_counts: DEFAULT_LAST_PAGE_COUNTS,
            default_beat_duration: DEFAULT_BEAT_DURATION,
            show_title: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModifiedUtility {
    pub last_page_counts: Option<i64>,
    pub default_beat_duration: Option<f64>,
    pub show_title: Option<String>,
}

impl ModifiedUtility {
    pub fn validate(&self) -> Result<(), CoreError> {
        if let Some(counts) = self.last_page_counts {
            if counts < 1 {
                return Err(CoreError::InvalidData(format!(
                    "last page counts must be at least 1, got {counts}"
                )));
            }
        }
        if let Some(duration) = self.default_beat_duration {
            if !duration.is_finite() || duration <= 0.0 {
                return Err(CoreError::InvalidData(format!(
                    "default beat duration must be positive, got {duration}"
                )));
            }
        }
        Ok(())
    }
}

/// Field layout written into a brand-new show.
pub fn default_field_properties() -> serde_json::Value {
    serde_json::json!({
        "name": "High school football field (no end zones)",
        "width": 1600,
        "height": 840,
        "pixelsPerStep": 12,
        "stepsBetweenYardLines": 8,
        "isCustom": false
    })
}
