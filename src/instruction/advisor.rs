//! The external advisor capability.
//!
//! An [`Advisor`] turns a structured prompt into free-form instruction text.
//! The generator treats it as optional and unreliable: every call runs under a
//! timeout and any failure falls back to local templates.

use async_trait::async_trait;
use serde::Serialize;

use crate::errors::AdvisorError;
use crate::models::{Category, DecisionContext, HistoryEntry, InterventionType};

use super::templates::DevStage;

/// History entries included in a prompt.
pub const PROMPT_HISTORY_LEN: usize = 5;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvisorPrompt {
    pub screenshot_ref: Option<String>,
    pub raw_text: String,
    pub project_context: String,
    pub recent_history: Vec<HistoryEntry>,
    pub intervention_type: InterventionType,
    pub category: Category,
    pub matched_signals: Vec<String>,
    pub stage: DevStage,
}

impl AdvisorPrompt {
    pub fn build(intervention_type: InterventionType, context: &DecisionContext) -> Self {
        let skip = context.recent.len().saturating_sub(PROMPT_HISTORY_LEN);
        Self {
            screenshot_ref: context.screenshot_ref.clone(),
            raw_text: context.raw_text.clone(),
            project_context: context.project_context.clone(),
            recent_history: context.recent.iter().skip(skip).cloned().collect(),
            intervention_type,
            category: context.classification.category,
            matched_signals: context.classification.matched_signals.iter().cloned().collect(),
            stage: DevStage::detect(&context.raw_text),
        }
    }

    /// Plain-text rendering used as the user message of chat-style advisors.
    pub fn to_user_message(&self) -> String {
        let history = self
            .recent_history
            .iter()
            .map(|entry| {
                format!(
                    "- {} {} -> {}",
                    entry.timestamp.format("%H:%M:%S"),
                    entry.category.as_str(),
                    entry.action.kind.as_str()
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let mut message = format!(
            "Project: {}\nStage: {}\nDetected state: {} ({})\nRequested intervention: {}\n",
            if self.project_context.is_empty() { "unspecified" } else { self.project_context.as_str() },
            self.stage.describe(),
            self.category.as_str(),
            self.matched_signals.join(", "),
            self.intervention_type.as_str(),
        );
        if let Some(screenshot) = &self.screenshot_ref {
            message.push_str(&format!("Screenshot: {screenshot}\n"));
        }
        if !history.is_empty() {
            message.push_str(&format!("Recent decisions:\n{history}\n"));
        }
        message.push_str(&format!("Latest IDE output:\n{}", self.raw_text));
        message
    }
}

#[async_trait]
pub trait Advisor: Send + Sync {
    async fn complete(&self, prompt: &AdvisorPrompt) -> Result<String, AdvisorError>;
}
