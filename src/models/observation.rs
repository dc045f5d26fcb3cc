use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One capture of the target application's visible text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub raw_text: String,
    pub captured_at: DateTime<Utc>,
    /// Opaque identifier of the captured window, as reported by the capture source.
    pub window_id: String,
    /// Path or URI of the screenshot the text was extracted from, when the capture source keeps one.
    pub screenshot_ref: Option<String>,
}

impl Observation {
    pub fn new(raw_text: impl Into<String>, window_id: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            captured_at: Utc::now(),
            window_id: window_id.into(),
            screenshot_ref: None,
        }
    }

    pub fn with_screenshot(mut self, screenshot_ref: impl Into<String>) -> Self {
        self.screenshot_ref = Some(screenshot_ref.into());
        self
    }
}
