use super::{Classification, HistoryEntry};

/// Everything the decision engine and the instruction generator see for one cycle.
///
/// Assembled fresh by the loop from the current observation and a read-only
/// view of `SupervisorState`; never stored.
#[derive(Debug, Clone)]
pub struct DecisionContext {
    pub classification: Classification,
    pub project_context: String,
    pub raw_text: String,
    pub screenshot_ref: Option<String>,
    pub cycles_since_last_action: u32,
    /// Last N decisions, oldest first. Recent categories are read from here.
    pub recent: Vec<HistoryEntry>,
    /// The text contains the supervisor's own last instruction.
    pub echo_of_last_instruction: bool,
    /// An instruction was already delivered for this exact content.
    pub already_handled: bool,
    pub seconds_since_last_instruction: Option<f64>,
}

impl DecisionContext {
    pub fn new(classification: Classification, project_context: impl Into<String>) -> Self {
        Self {
            classification,
            project_context: project_context.into(),
            raw_text: String::new(),
            screenshot_ref: None,
            cycles_since_last_action: 0,
            recent: Vec::new(),
            echo_of_last_instruction: false,
            already_handled: false,
            seconds_since_last_instruction: None,
        }
    }

    /// Length of the trailing run of non-intervening decisions with the current category.
    pub fn stalled_repeats(&self) -> usize {
        let current = self.classification.category;
        self.recent
            .iter()
            .rev()
            .take_while(|entry| entry.category == current && !entry.intervened())
            .count()
    }
}
