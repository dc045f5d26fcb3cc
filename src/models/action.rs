use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    Intervene,
    Wait,
    Skip,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Intervene => "Intervene",
            ActionKind::Wait => "Wait",
            ActionKind::Skip => "Skip",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "Intervene" => Ok(ActionKind::Intervene),
            "Wait" => Ok(ActionKind::Wait),
            "Skip" => Ok(ActionKind::Skip),
            other => Err(anyhow!("unknown action kind '{other}'")),
        }
    }
}

/// Declaration order is significant: `Low < Medium < High < Urgent`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    /// One level up; `Urgent` is the ceiling.
    pub fn escalate(self) -> Self {
        match self {
            Priority::Low => Priority::Medium,
            Priority::Medium => Priority::High,
            Priority::High | Priority::Urgent => Priority::Urgent,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
            Priority::Urgent => "Urgent",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "Low" => Ok(Priority::Low),
            "Medium" => Ok(Priority::Medium),
            "High" => Ok(Priority::High),
            "Urgent" => Ok(Priority::Urgent),
            other => Err(anyhow!("unknown priority '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum InterventionType {
    Continue,
    Resolve,
    Question,
    Generic,
}

impl InterventionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterventionType::Continue => "Continue",
            InterventionType::Resolve => "Resolve",
            InterventionType::Question => "Question",
            InterventionType::Generic => "Generic",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "Continue" => Ok(InterventionType::Continue),
            "Resolve" => Ok(InterventionType::Resolve),
            "Question" => Ok(InterventionType::Question),
            "Generic" => Ok(InterventionType::Generic),
            other => Err(anyhow!("unknown intervention type '{other}'")),
        }
    }
}

/// Output of the decision engine for one cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub kind: ActionKind,
    pub priority: Priority,
    pub wait_seconds: f64,
    pub intervention_type: InterventionType,
}

impl Action {
    pub fn skip(wait_seconds: f64) -> Self {
        Self {
            kind: ActionKind::Skip,
            priority: Priority::Low,
            wait_seconds,
            intervention_type: InterventionType::Generic,
        }
    }

    pub fn is_intervention(&self) -> bool {
        self.kind == ActionKind::Intervene
    }
}
