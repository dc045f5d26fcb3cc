pub mod engine;
pub mod rules;

pub use engine::{DecisionConfig, DecisionEngine};
pub use rules::{default_rules, ActionTemplate, DecisionInput, Rule, WaitSpec};
