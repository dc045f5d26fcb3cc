use std::collections::BTreeSet;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Complete,
    Error,
    Processing,
    Question,
    Routine,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Complete => "Complete",
            Category::Error => "Error",
            Category::Processing => "Processing",
            Category::Question => "Question",
            Category::Routine => "Routine",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "Complete" => Ok(Category::Complete),
            "Error" => Ok(Category::Error),
            "Processing" => Ok(Category::Processing),
            "Question" => Ok(Category::Question),
            "Routine" => Ok(Category::Routine),
            other => Err(anyhow!("unknown category '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub category: Category,
    /// Always within [0, 1].
    pub confidence: f64,
    pub matched_signals: BTreeSet<String>,
    /// False for empty or OCR-garbage input. Such results must never lead to an action.
    pub valid: bool,
}

impl Classification {
    /// The designated result for empty or low-value text.
    pub fn invalid() -> Self {
        Self {
            category: Category::Routine,
            confidence: 0.0,
            matched_signals: BTreeSet::new(),
            valid: false,
        }
    }

    pub fn is_invalid(&self) -> bool {
        !self.valid
    }

    /// Up to `limit` matched signals, for interpolation into instructions.
    pub fn top_signals(&self, limit: usize) -> Vec<&str> {
        self.matched_signals
            .iter()
            .take(limit)
            .map(String::as_str)
            .collect()
    }
}
