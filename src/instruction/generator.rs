use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::errors::{AdvisorError, GenerationError};
use crate::models::{Action, DecisionContext};

use super::advisor::{Advisor, AdvisorPrompt};
use super::templates::{pool, render, DevStage, ProjectKind};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

pub const MIN_INSTRUCTION_CHARS: usize = 50;
pub const MAX_INSTRUCTION_CHARS: usize = 300;

/// Signals interpolated into templates.
const TEMPLATE_SIGNAL_LIMIT: usize = 3;

/// Turns an action into the text delivered to the IDE.
///
/// Tries the advisor first when one is given, bounded by `advisor_timeout`;
/// any advisor failure or unusable answer falls back to a local template once.
pub struct InstructionGenerator {
    rng: StdRng,
    advisor_timeout: Duration,
}

impl InstructionGenerator {
    pub fn new(advisor_timeout: Duration) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            advisor_timeout,
        }
    }

    /// Deterministic variant selection, for tests.
    pub fn with_seed(advisor_timeout: Duration, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            advisor_timeout,
        }
    }

    pub async fn generate(
        &mut self,
        action: &Action,
        context: &DecisionContext,
        advisor: Option<&dyn Advisor>,
    ) -> Result<String, GenerationError> {
        if let Some(advisor) = advisor {
            match self.ask_advisor(advisor, action, context).await {
                Ok(text) => return Ok(text),
                Err(err) => log_warn!("advisor unavailable, using template: {}", err),
            }
        }
        self.from_template(action, context)
    }

    async fn ask_advisor(
        &self,
        advisor: &dyn Advisor,
        action: &Action,
        context: &DecisionContext,
    ) -> Result<String, AdvisorError> {
        let prompt = AdvisorPrompt::build(action.intervention_type, context);
        let text = tokio::time::timeout(self.advisor_timeout, advisor.complete(&prompt))
            .await
            .map_err(|_| AdvisorError::Timeout(self.advisor_timeout.as_secs_f64()))??;

        validate(&text).map_err(|err| AdvisorError::Malformed(err.to_string()))
    }

    fn from_template(
        &mut self,
        action: &Action,
        context: &DecisionContext,
    ) -> Result<String, GenerationError> {
        let kind = ProjectKind::detect(&context.project_context);
        let stage = DevStage::detect(&context.raw_text);
        let template = pool(action.intervention_type, kind)
            .choose(&mut self.rng)
            .ok_or_else(|| GenerationError::InvalidOutput("empty template pool".into()))?;

        let signals = context.classification.top_signals(TEMPLATE_SIGNAL_LIMIT);
        let rendered = render(template, &signals, stage);
        log_debug!(
            "rendered {} template for {} project",
            action.intervention_type.as_str(),
            kind.as_str()
        );

        validate(&truncate_on_word(rendered.trim(), MAX_INSTRUCTION_CHARS))
    }
}

/// Accepts text whose trimmed length is within the deliverable bounds.
pub fn validate(text: &str) -> Result<String, GenerationError> {
    let trimmed = text.trim();
    let len = trimmed.chars().count();
    if trimmed.is_empty() {
        return Err(GenerationError::InvalidOutput("empty instruction".into()));
    }
    if !(MIN_INSTRUCTION_CHARS..=MAX_INSTRUCTION_CHARS).contains(&len) {
        return Err(GenerationError::InvalidOutput(format!(
            "instruction length {len} outside {MIN_INSTRUCTION_CHARS}..={MAX_INSTRUCTION_CHARS}"
        )));
    }
    Ok(trimmed.to_string())
}

fn truncate_on_word(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    match cut.rfind(char::is_whitespace) {
        Some(idx) if idx > 0 => cut[..idx].trim_end().to_string(),
        _ => cut,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::models::{ActionKind, Category, Classification, InterventionType, Priority};

    fn resolve_action() -> Action {
        Action {
            kind: ActionKind::Intervene,
            priority: Priority::Urgent,
            wait_seconds: 1.0,
            intervention_type: InterventionType::Resolve,
        }
    }

    fn error_context() -> DecisionContext {
        let classification = Classification {
            category: Category::Error,
            confidence: 0.67,
            matched_signals: BTreeSet::from(["failed".to_string(), "unable to".to_string()]),
            valid: true,
        };
        let mut context = DecisionContext::new(classification, "REST API backend");
        context.raw_text = "Database connection failed, unable to connect to MySQL".into();
        context
    }

    struct Scripted {
        reply: Result<String, fn() -> AdvisorError>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(err: fn() -> AdvisorError) -> Self {
            Self {
                reply: Err(err),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Advisor for Scripted {
        async fn complete(&self, _prompt: &AdvisorPrompt) -> Result<String, AdvisorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    struct Hanging;

    #[async_trait]
    impl Advisor for Hanging {
        async fn complete(&self, _prompt: &AdvisorPrompt) -> Result<String, AdvisorError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("too late to matter, this answer never arrives in time at all".into())
        }
    }

    fn assert_deliverable(text: &str) {
        let len = text.chars().count();
        assert!((MIN_INSTRUCTION_CHARS..=MAX_INSTRUCTION_CHARS).contains(&len), "{len}: {text}");
        assert_eq!(text, text.trim());
    }

    #[tokio::test]
    async fn template_path_mentions_signals() {
        let mut generator = InstructionGenerator::with_seed(Duration::from_secs(5), 7);
        let text = generator
            .generate(&resolve_action(), &error_context(), None)
            .await
            .unwrap();
        assert_deliverable(&text);
        assert!(text.contains("failed"));
    }

    #[tokio::test]
    async fn same_seed_picks_same_variant() {
        let mut a = InstructionGenerator::with_seed(Duration::from_secs(5), 42);
        let mut b = InstructionGenerator::with_seed(Duration::from_secs(5), 42);
        for _ in 0..5 {
            assert_eq!(
                a.generate(&resolve_action(), &error_context(), None).await.unwrap(),
                b.generate(&resolve_action(), &error_context(), None).await.unwrap()
            );
        }
    }

    #[tokio::test]
    async fn advisor_answer_is_used_when_valid() {
        let advisor = Scripted::replying(
            "  Check the MySQL host and port in the config, then retry the connection from the app.  ",
        );
        let mut generator = InstructionGenerator::with_seed(Duration::from_secs(5), 1);
        let text = generator
            .generate(&resolve_action(), &error_context(), Some(&advisor))
            .await
            .unwrap();
        assert_eq!(
            text,
            "Check the MySQL host and port in the config, then retry the connection from the app."
        );
        assert_eq!(advisor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn out_of_range_advisor_answer_falls_back() {
        for reply in ["ok".to_string(), "x ".repeat(400)] {
            let advisor = Scripted::replying(&reply);
            let mut generator = InstructionGenerator::with_seed(Duration::from_secs(5), 3);
            let text = generator
                .generate(&resolve_action(), &error_context(), Some(&advisor))
                .await
                .unwrap();
            assert_deliverable(&text);
            assert_ne!(text, reply.trim());
            assert_eq!(advisor.calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn advisor_errors_fall_back_to_templates() {
        let failures: [fn() -> AdvisorError; 4] = [
            || AdvisorError::Quota,
            || AdvisorError::Auth(401),
            || AdvisorError::Empty,
            || AdvisorError::Malformed("no choices".into()),
        ];
        for failure in failures {
            let advisor = Scripted::failing(failure);
            let mut generator = InstructionGenerator::with_seed(Duration::from_secs(5), 9);
            let text = generator
                .generate(&resolve_action(), &error_context(), Some(&advisor))
                .await
                .unwrap();
            assert_deliverable(&text);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn advisor_timeout_falls_back_to_template() {
        let mut generator = InstructionGenerator::with_seed(Duration::from_secs(5), 11);
        let started = tokio::time::Instant::now();
        let text = generator
            .generate(&resolve_action(), &error_context(), Some(&Hanging))
            .await
            .unwrap();
        assert_deliverable(&text);
        assert!(started.elapsed() < Duration::from_secs(6));
    }

    #[test]
    fn truncation_cuts_on_a_word_boundary() {
        let long = "word ".repeat(100);
        let cut = truncate_on_word(long.trim(), MAX_INSTRUCTION_CHARS);
        assert!(cut.chars().count() <= MAX_INSTRUCTION_CHARS);
        assert!(cut.ends_with("word"));
    }

    #[test]
    fn validation_rejects_blank_and_short_text() {
        assert!(validate("   ").is_err());
        assert!(validate("too short").is_err());
        assert!(validate(&"a".repeat(301)).is_err());
        assert!(validate(&"a".repeat(300)).is_ok());
    }
}
