//! Long-lived supervisor state.
//!
//! `SupervisorState` is the only value that outlives a cycle. The loop owns it,
//! mutates it once per cycle in the Updating phase and checkpoints it to the
//! database, so a restart resumes without re-triggering handled interventions.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Action, ActionKind, Category};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub category: Category,
    pub action: Action,
    pub fingerprint: Option<String>,
    /// Whether an instruction actually reached the target application.
    pub delivered: bool,
}

impl HistoryEntry {
    pub fn intervened(&self) -> bool {
        self.action.kind == ActionKind::Intervene
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "status", content = "reason")]
pub enum SupervisorStatus {
    Running,
    Stopped,
    Halted(String),
}

impl SupervisorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupervisorStatus::Running => "Running",
            SupervisorStatus::Stopped => "Stopped",
            SupervisorStatus::Halted(_) => "Halted",
        }
    }

    pub fn is_halted(&self) -> bool {
        matches!(self, SupervisorStatus::Halted(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorState {
    /// Identifies the supervising process that last wrote this state.
    pub run_id: String,
    pub project_context: String,
    /// Oldest first, capped by `decision_history_cap`.
    pub decision_history: VecDeque<HistoryEntry>,
    /// Fingerprints of content an instruction was already delivered for. Oldest first.
    pub completed_task_markers: VecDeque<String>,
    /// Never moves backwards.
    pub last_instruction_at: Option<DateTime<Utc>>,
    pub last_instruction: Option<String>,
    pub status: SupervisorStatus,
    pub updated_at: DateTime<Utc>,
}

impl SupervisorState {
    pub fn new(project_context: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            project_context: project_context.into(),
            decision_history: VecDeque::new(),
            completed_task_markers: VecDeque::new(),
            last_instruction_at: None,
            last_instruction: None,
            status: SupervisorStatus::Running,
            updated_at: Utc::now(),
        }
    }

    /// Append a decision, evicting the oldest entries beyond `cap`.
    pub fn record_decision(&mut self, entry: HistoryEntry, cap: usize) {
        self.updated_at = entry.timestamp.max(self.updated_at);
        self.decision_history.push_back(entry);
        while self.decision_history.len() > cap {
            self.decision_history.pop_front();
        }
    }

    pub fn mark_completed(&mut self, fingerprint: &str, cap: usize) {
        if self.is_completed(fingerprint) {
            return;
        }
        self.completed_task_markers.push_back(fingerprint.to_string());
        while self.completed_task_markers.len() > cap {
            self.completed_task_markers.pop_front();
        }
    }

    pub fn is_completed(&self, fingerprint: &str) -> bool {
        self.completed_task_markers.iter().any(|f| f == fingerprint)
    }

    /// Record a delivered instruction. `last_instruction_at` only ever advances.
    pub fn note_instruction(&mut self, at: DateTime<Utc>, instruction: &str) {
        self.last_instruction_at = Some(match self.last_instruction_at {
            Some(previous) => previous.max(at),
            None => at,
        });
        self.last_instruction = Some(instruction.to_string());
    }

    pub fn halt(&mut self, reason: impl Into<String>) {
        self.status = SupervisorStatus::Halted(reason.into());
        self.updated_at = Utc::now();
    }

    /// Last `n` decisions, oldest first.
    pub fn recent_history(&self, n: usize) -> Vec<HistoryEntry> {
        let skip = self.decision_history.len().saturating_sub(n);
        self.decision_history.iter().skip(skip).cloned().collect()
    }

    /// Number of trailing decisions that did not intervene.
    pub fn cycles_since_last_action(&self) -> u32 {
        self.decision_history
            .iter()
            .rev()
            .take_while(|entry| !entry.intervened())
            .count() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InterventionType, Priority};
    use chrono::Duration;

    fn entry(category: Category, kind: ActionKind) -> HistoryEntry {
        HistoryEntry {
            timestamp: Utc::now(),
            category,
            action: Action {
                kind,
                priority: Priority::Low,
                wait_seconds: 5.0,
                intervention_type: InterventionType::Generic,
            },
            fingerprint: None,
            delivered: false,
        }
    }

    #[test]
    fn history_is_capped_fifo() {
        let mut state = SupervisorState::new("web shop");
        for i in 0..7 {
            let category = if i == 0 { Category::Error } else { Category::Routine };
            state.record_decision(entry(category, ActionKind::Wait), 5);
        }
        assert_eq!(state.decision_history.len(), 5);
        assert!(state
            .decision_history
            .iter()
            .all(|e| e.category == Category::Routine));
    }

    #[test]
    fn last_instruction_at_never_moves_backwards() {
        let mut state = SupervisorState::new("");
        let now = Utc::now();
        state.note_instruction(now, "first");
        state.note_instruction(now - Duration::seconds(30), "second");
        assert_eq!(state.last_instruction_at, Some(now));
        assert_eq!(state.last_instruction.as_deref(), Some("second"));
    }

    #[test]
    fn completed_markers_deduplicate_and_cap() {
        let mut state = SupervisorState::new("");
        state.mark_completed("a", 2);
        state.mark_completed("a", 2);
        state.mark_completed("b", 2);
        state.mark_completed("c", 2);
        assert_eq!(state.completed_task_markers, VecDeque::from(vec!["b".to_string(), "c".to_string()]));
        assert!(!state.is_completed("a"));
    }

    #[test]
    fn cycles_since_last_action_counts_trailing_non_interventions() {
        let mut state = SupervisorState::new("");
        state.record_decision(entry(Category::Error, ActionKind::Intervene), 10);
        state.record_decision(entry(Category::Processing, ActionKind::Wait), 10);
        state.record_decision(entry(Category::Processing, ActionKind::Skip), 10);
        assert_eq!(state.cycles_since_last_action(), 2);
    }
}
