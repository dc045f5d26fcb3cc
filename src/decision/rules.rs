//! The decision rule table.
//!
//! Each rule pairs a predicate over the cycle's inputs with an action template.
//! The engine walks the table in order and the first matching rule wins, so
//! adding or reordering rules never touches the engine's control flow.

use crate::guard::DuplicateVerdict;
use crate::models::{Action, ActionKind, Category, DecisionContext, InterventionType, Priority};

use super::DecisionConfig;

/// Inputs every predicate sees.
pub struct DecisionInput<'a> {
    pub context: &'a DecisionContext,
    pub verdict: DuplicateVerdict,
    pub config: &'a DecisionConfig,
}

impl DecisionInput<'_> {
    fn category(&self) -> Category {
        self.context.classification.category
    }

    fn confidence(&self) -> f64 {
        self.context.classification.confidence
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WaitSpec {
    Fixed(f64),
    /// Whatever is left of the duplicate guard's cooldown.
    RemainingCooldown,
    MonitoringInterval,
}

#[derive(Debug, Clone, Copy)]
pub struct ActionTemplate {
    pub kind: ActionKind,
    pub priority: Priority,
    pub wait: WaitSpec,
    pub intervention_type: InterventionType,
}

impl ActionTemplate {
    const fn new(
        kind: ActionKind,
        priority: Priority,
        wait: WaitSpec,
        intervention_type: InterventionType,
    ) -> Self {
        Self {
            kind,
            priority,
            wait,
            intervention_type,
        }
    }

    pub fn resolve(&self, input: &DecisionInput<'_>) -> Action {
        let wait_seconds = match self.wait {
            WaitSpec::Fixed(secs) => secs,
            WaitSpec::RemainingCooldown => match input.verdict {
                DuplicateVerdict::Suppressed(remaining) => remaining.as_secs_f64(),
                DuplicateVerdict::Allowed => input.config.monitoring_interval_secs,
            },
            WaitSpec::MonitoringInterval => input.config.monitoring_interval_secs,
        };

        Action {
            kind: self.kind,
            priority: self.priority,
            wait_seconds,
            intervention_type: self.intervention_type,
        }
    }
}

pub struct Rule {
    pub name: &'static str,
    pub matches: fn(&DecisionInput<'_>) -> bool,
    pub action: ActionTemplate,
    /// Whether repeated stalls on the same category may raise this rule's priority.
    pub escalates: bool,
}

pub const FALLBACK_ACTION: ActionTemplate = ActionTemplate::new(
    ActionKind::Wait,
    Priority::Medium,
    WaitSpec::Fixed(5.0),
    InterventionType::Generic,
);

fn invalid_content(input: &DecisionInput<'_>) -> bool {
    input.context.classification.is_invalid()
}

fn duplicate(input: &DecisionInput<'_>) -> bool {
    input.verdict.is_suppressed()
}

fn own_echo(input: &DecisionInput<'_>) -> bool {
    input.context.echo_of_last_instruction
}

fn already_handled(input: &DecisionInput<'_>) -> bool {
    input.context.already_handled
}

fn confident_error(input: &DecisionInput<'_>) -> bool {
    input.category() == Category::Error && input.confidence() >= input.config.thresholds.error
}

fn confident_completion(input: &DecisionInput<'_>) -> bool {
    input.category() == Category::Complete
        && input.confidence() >= input.config.thresholds.complete
}

fn still_processing(input: &DecisionInput<'_>) -> bool {
    input.category() == Category::Processing
}

fn confident_question(input: &DecisionInput<'_>) -> bool {
    input.category() == Category::Question
        && input.confidence() >= input.config.thresholds.question
}

fn stalled(input: &DecisionInput<'_>) -> bool {
    let (Some(limit), Some(elapsed)) = (
        input.config.stall_timeout_secs,
        input.context.seconds_since_last_instruction,
    ) else {
        return false;
    };
    input.category() != Category::Processing && elapsed >= limit
}

/// Content the skip rules would hold back, with nothing delivered for too long.
/// A confident error is left to the error rule, which resolves it anyway.
fn stalled_on_skipped_content(input: &DecisionInput<'_>) -> bool {
    stalled(input)
        && !confident_error(input)
        && (duplicate(input) || own_echo(input) || already_handled(input))
}

fn always(_: &DecisionInput<'_>) -> bool {
    true
}

pub fn default_rules() -> Vec<Rule> {
    use ActionKind::{Intervene, Skip, Wait};
    use InterventionType::{Continue, Generic, Question, Resolve};
    use Priority::{High, Low, Medium, Urgent};

    vec![
        Rule {
            name: "invalid-content",
            matches: invalid_content,
            action: ActionTemplate::new(Skip, Low, WaitSpec::MonitoringInterval, Generic),
            escalates: false,
        },
        Rule {
            name: "forced-progress",
            matches: stalled_on_skipped_content,
            action: ActionTemplate::new(Intervene, Medium, WaitSpec::Fixed(5.0), Generic),
            escalates: true,
        },
        Rule {
            name: "duplicate",
            matches: duplicate,
            action: ActionTemplate::new(Skip, Low, WaitSpec::RemainingCooldown, Generic),
            escalates: true,
        },
        Rule {
            name: "error",
            matches: confident_error,
            action: ActionTemplate::new(Intervene, Urgent, WaitSpec::Fixed(1.0), Resolve),
            escalates: true,
        },
        Rule {
            name: "own-echo",
            matches: own_echo,
            action: ActionTemplate::new(Skip, Low, WaitSpec::MonitoringInterval, Generic),
            escalates: true,
        },
        Rule {
            name: "already-handled",
            matches: already_handled,
            action: ActionTemplate::new(Skip, Low, WaitSpec::MonitoringInterval, Generic),
            escalates: true,
        },
        Rule {
            name: "complete",
            matches: confident_completion,
            action: ActionTemplate::new(Intervene, High, WaitSpec::Fixed(2.0), Continue),
            escalates: true,
        },
        Rule {
            name: "processing",
            matches: still_processing,
            action: ActionTemplate::new(Wait, Low, WaitSpec::Fixed(10.0), Generic),
            escalates: true,
        },
        Rule {
            name: "question",
            matches: confident_question,
            action: ActionTemplate::new(Intervene, Medium, WaitSpec::Fixed(5.0), Question),
            escalates: true,
        },
        Rule {
            name: "stall",
            matches: stalled,
            action: ActionTemplate::new(Intervene, Medium, WaitSpec::Fixed(5.0), Generic),
            escalates: true,
        },
        Rule {
            name: "routine",
            matches: always,
            action: FALLBACK_ACTION,
            escalates: true,
        },
    ]
}
