use crate::guard::DuplicateVerdict;
use crate::models::{Action, DecisionContext};
use crate::settings::{SupervisorSettings, Thresholds};

use super::rules::{default_rules, DecisionInput, Rule, FALLBACK_ACTION};

const ENABLE_LOGS: bool = true;

use crate::log_debug;

/// Numbers the rule table reads. Derived from settings once per loop.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionConfig {
    pub thresholds: Thresholds,
    /// Same-category stalls tolerated before priority is raised one level.
    pub repeat_limit: usize,
    pub monitoring_interval_secs: f64,
    pub stall_timeout_secs: Option<f64>,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self::from(&SupervisorSettings::default())
    }
}

impl From<&SupervisorSettings> for DecisionConfig {
    fn from(settings: &SupervisorSettings) -> Self {
        Self {
            thresholds: settings.thresholds,
            repeat_limit: settings.repeat_limit,
            monitoring_interval_secs: settings.monitoring_interval_secs,
            stall_timeout_secs: settings.stall_timeout_secs,
        }
    }
}

/// Maps a classified observation and the guard's verdict to exactly one action.
///
/// `decide` is pure: identical inputs always produce the identical action.
pub struct DecisionEngine {
    config: DecisionConfig,
    rules: Vec<Rule>,
}

impl DecisionEngine {
    pub fn new(config: DecisionConfig) -> Self {
        Self::with_rules(config, default_rules())
    }

    pub fn with_rules(config: DecisionConfig, rules: Vec<Rule>) -> Self {
        Self { config, rules }
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    pub fn decide(&self, context: &DecisionContext, verdict: DuplicateVerdict) -> Action {
        let input = DecisionInput {
            context,
            verdict,
            config: &self.config,
        };

        let Some(rule) = self.rules.iter().find(|rule| (rule.matches)(&input)) else {
            return FALLBACK_ACTION.resolve(&input);
        };

        let mut action = rule.action.resolve(&input);
        if rule.escalates && context.stalled_repeats() >= self.config.repeat_limit {
            let raised = action.priority.escalate();
            log_debug!(
                "rule '{}' escalated {} -> {} after {} stalled cycles",
                rule.name,
                action.priority.as_str(),
                raised.as_str(),
                context.stalled_repeats()
            );
            action.priority = raised;
        }
        action
    }
}
