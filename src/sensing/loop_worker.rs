use std::panic::{self, AssertUnwindSafe};

use chrono::{DateTime, Utc};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::analysis::{fingerprint, normalize, ContentAnalyzer};
use crate::db::Database;
use crate::decision::{DecisionConfig, DecisionEngine};
use crate::errors::CycleError;
use crate::guard::{DuplicateGuard, DuplicateVerdict};
use crate::instruction::{Advisor, InstructionGenerator};
use crate::models::{
    Action, Category, Classification, DecisionContext, HistoryEntry, Observation, SupervisorState,
    SupervisorStatus,
};
use crate::settings::SupervisorSettings;

use super::capture::CaptureSource;
use super::delivery::DeliverySink;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Leading characters of the last instruction looked for in new screen text.
const ECHO_PREFIX_CHARS: usize = 40;
/// Instructions shorter than this are too generic to detect as echoes.
const ECHO_MIN_CHARS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Idle,
    Observing,
    Classifying,
    Deciding,
    Generating,
    Delivering,
    Updating,
    Halted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    Cancelled,
    Halted(String),
}

/// What one successful cycle did.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub classification: Classification,
    pub verdict: DuplicateVerdict,
    pub action: Action,
    pub instruction: Option<String>,
}

/// The single supervision worker.
///
/// Owns `SupervisorState` and mutates it only in the Updating phase. Cycles
/// run strictly one after another; cancellation is honoured between cycles so
/// the persisted checkpoint always reflects a completed cycle.
pub struct SupervisorLoop {
    settings: SupervisorSettings,
    analyzer: ContentAnalyzer,
    guard: DuplicateGuard,
    engine: DecisionEngine,
    generator: InstructionGenerator,
    capture: Box<dyn CaptureSource>,
    delivery: Box<dyn DeliverySink>,
    advisor: Option<Box<dyn Advisor>>,
    db: Database,
    state: SupervisorState,
    phase: LoopPhase,
    consecutive_failures: u32,
    started_at: DateTime<Utc>,
}

impl SupervisorLoop {
    pub fn new(
        settings: SupervisorSettings,
        state: SupervisorState,
        db: Database,
        capture: Box<dyn CaptureSource>,
        delivery: Box<dyn DeliverySink>,
    ) -> Self {
        Self {
            analyzer: ContentAnalyzer::new(settings.min_confidence),
            guard: DuplicateGuard::new(
                settings.instruction_cooldown(),
                settings.max_same_content_processing,
                settings.duplicate_retention(),
            ),
            engine: DecisionEngine::new(DecisionConfig::from(&settings)),
            generator: InstructionGenerator::new(settings.advisor_timeout()),
            capture,
            delivery,
            advisor: None,
            db,
            state,
            phase: LoopPhase::Idle,
            consecutive_failures: 0,
            started_at: Utc::now(),
            settings,
        }
    }

    pub fn with_advisor(mut self, advisor: Box<dyn Advisor>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    pub fn with_generator(mut self, generator: InstructionGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn state(&self) -> &SupervisorState {
        &self.state
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub async fn run(mut self, cancel_token: CancellationToken) -> LoopExit {
        self.started_at = Utc::now();
        self.state.status = SupervisorStatus::Running;
        if let Err(err) = self.db.save_state(&self.state).await {
            log_warn!("initial checkpoint failed: {err:#}");
        }
        log_info!(
            "supervision started (run {}, interval {:.1}s)",
            self.state.run_id,
            self.settings.monitoring_interval_secs
        );

        loop {
            if cancel_token.is_cancelled() {
                break;
            }

            let wait_seconds = match self.cycle().await {
                Ok(outcome) => {
                    self.consecutive_failures = 0;
                    outcome.action.wait_seconds
                }
                Err(err) if err.is_fatal() => {
                    return self.halt(err.to_string()).await;
                }
                Err(err) => {
                    self.consecutive_failures += 1;
                    log_warn!(
                        "cycle failed ({}/{}): {}",
                        self.consecutive_failures,
                        self.settings.max_consecutive_failures,
                        err
                    );
                    if self.consecutive_failures >= self.settings.max_consecutive_failures {
                        let reason = format!(
                            "{} consecutive cycle failures, last: {}",
                            self.consecutive_failures, err
                        );
                        return self.halt(reason).await;
                    }
                    self.settings.monitoring_interval_secs
                }
            };

            self.enter(LoopPhase::Idle);
            let pause = Duration::from_secs_f64(wait_seconds.max(0.0));
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = cancel_token.cancelled() => break,
            }
        }

        log_info!("supervision loop shutting down");
        self.state.status = SupervisorStatus::Stopped;
        if let Err(err) = self.db.save_state(&self.state).await {
            log_error!("final checkpoint failed: {err:#}");
        }
        LoopExit::Cancelled
    }

    /// Run exactly one observe-to-update cycle.
    pub async fn cycle(&mut self) -> Result<CycleOutcome, CycleError> {
        self.enter(LoopPhase::Observing);
        let observation = self.capture.capture().await?;

        self.enter(LoopPhase::Classifying);
        // Our own last instruction, if still on screen, is cut out before classifying.
        let residual = self
            .state
            .last_instruction
            .as_deref()
            .and_then(|last| strip_echo(&observation.raw_text, last));
        let classification = classify_guarded(
            &self.analyzer,
            residual.as_deref().unwrap_or(observation.raw_text.as_str()),
        )?;
        let echo_only = residual.is_some() && classification.category == Category::Routine;
        let content_fp = classification
            .valid
            .then(|| fingerprint(&observation.raw_text));
        let verdict = match content_fp.as_deref() {
            Some(fp) => self
                .guard
                .check_and_register(fp, tokio::time::Instant::now().into_std()),
            None => DuplicateVerdict::Allowed,
        };

        self.enter(LoopPhase::Deciding);
        let context =
            self.build_context(&observation, classification, content_fp.as_deref(), echo_only);
        let mut action = self.engine.decide(&context, verdict);

        let mut instruction = None;
        if action.is_intervention() {
            self.enter(LoopPhase::Generating);
            match self
                .generator
                .generate(&action, &context, self.advisor.as_deref())
                .await
            {
                Ok(text) => {
                    self.enter(LoopPhase::Delivering);
                    self.delivery.deliver(&text).await?;
                    instruction = Some(text);
                }
                Err(err) => {
                    log_warn!("no deliverable instruction, skipping: {}", err);
                    action = Action::skip(self.settings.monitoring_interval_secs);
                }
            }
        }

        self.enter(LoopPhase::Updating);
        let now = Utc::now();
        self.state.record_decision(
            HistoryEntry {
                timestamp: now,
                category: context.classification.category,
                action,
                fingerprint: content_fp.clone(),
                delivered: instruction.is_some(),
            },
            self.settings.decision_history_cap,
        );
        if let Some(text) = &instruction {
            if let Some(fp) = &content_fp {
                self.state.mark_completed(fp, self.settings.completed_marker_cap);
            }
            self.state.note_instruction(now, text);
        }
        self.db
            .save_state(&self.state)
            .await
            .map_err(CycleError::Persistence)?;

        log_info!(
            "{} ({:.2}) -> {} {} {} wait {:.1}s{}",
            context.classification.category.as_str(),
            context.classification.confidence,
            action.kind.as_str(),
            action.priority.as_str(),
            action.intervention_type.as_str(),
            action.wait_seconds,
            if instruction.is_some() { ", delivered" } else { "" }
        );

        Ok(CycleOutcome {
            classification: context.classification,
            verdict,
            action,
            instruction,
        })
    }

    fn build_context(
        &self,
        observation: &Observation,
        classification: Classification,
        content_fp: Option<&str>,
        echo_only: bool,
    ) -> DecisionContext {
        let mut context = DecisionContext::new(classification, self.state.project_context.clone());
        context.raw_text = observation.raw_text.clone();
        context.screenshot_ref = observation.screenshot_ref.clone();
        context.cycles_since_last_action = self.state.cycles_since_last_action();
        context.recent = self.state.recent_history(self.settings.decision_history_cap);
        context.echo_of_last_instruction = echo_only;
        context.already_handled = content_fp.is_some_and(|fp| self.state.is_completed(fp));

        let stall_origin = match self.state.last_instruction_at {
            Some(at) => at.max(self.started_at),
            None => self.started_at,
        };
        let elapsed_ms = (Utc::now() - stall_origin).num_milliseconds().max(0);
        context.seconds_since_last_instruction = Some(elapsed_ms as f64 / 1000.0);
        context
    }

    async fn halt(&mut self, reason: String) -> LoopExit {
        self.enter(LoopPhase::Halted);
        log_error!("supervision halted: {}", reason);
        self.state.halt(reason.clone());
        if let Err(err) = self.db.save_state(&self.state).await {
            log_error!("failed to persist halted state: {err:#}");
        }
        LoopExit::Halted(reason)
    }

    fn enter(&mut self, phase: LoopPhase) {
        if self.phase != phase {
            log_debug!("{:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }
}

fn classify_guarded(analyzer: &ContentAnalyzer, raw_text: &str) -> Result<Classification, CycleError> {
    panic::catch_unwind(AssertUnwindSafe(|| analyzer.classify(raw_text))).map_err(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        CycleError::Classification(message)
    })
}

/// The normalized screen text with the supervisor's last instruction cut out,
/// or `None` when the instruction is not on screen.
///
/// The instruction is located by its leading characters and removed for as
/// long as the screen keeps matching it, so an OCR slip late in the text only
/// leaves the unmatched tail behind.
fn strip_echo(raw_text: &str, last_instruction: &str) -> Option<String> {
    let needle = normalize(last_instruction);
    if needle.chars().count() < ECHO_MIN_CHARS {
        return None;
    }
    let prefix: String = needle.chars().take(ECHO_PREFIX_CHARS).collect();

    let screen = normalize(raw_text);
    let start = screen.find(&prefix)?;
    let matched: usize = screen[start..]
        .chars()
        .zip(needle.chars())
        .take_while(|(seen, expected)| seen == expected)
        .map(|(seen, _)| seen.len_utf8())
        .sum();

    let before = screen[..start].trim_end();
    let after = screen[start + matched..].trim_start();
    Some(format!("{before} {after}").trim().to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::errors::{CaptureError, DeliveryError};
    use crate::models::{ActionKind, Category, InterventionType, Priority};

    struct ScriptedCapture {
        frames: VecDeque<Result<String, fn() -> CaptureError>>,
    }

    impl ScriptedCapture {
        fn texts(texts: &[&str]) -> Box<Self> {
            Box::new(Self {
                frames: texts.iter().map(|t| Ok(t.to_string())).collect(),
            })
        }

        fn frames(frames: Vec<Result<String, fn() -> CaptureError>>) -> Box<Self> {
            Box::new(Self {
                frames: frames.into(),
            })
        }
    }

    #[async_trait]
    impl CaptureSource for ScriptedCapture {
        async fn capture(&mut self) -> Result<Observation, CaptureError> {
            match self.frames.pop_front() {
                Some(Ok(text)) => Ok(Observation::new(text, "test-window")),
                Some(Err(make)) => Err(make()),
                None => Err(CaptureError::TargetLost("script exhausted".into())),
            }
        }
    }

    #[derive(Clone, Default)]
    struct Outbox {
        sent: Arc<Mutex<Vec<String>>>,
        failures_left: Arc<Mutex<u32>>,
    }

    impl Outbox {
        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DeliverySink for Outbox {
        async fn deliver(&mut self, instruction: &str) -> Result<(), DeliveryError> {
            {
                let mut failures = self.failures_left.lock().unwrap();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(DeliveryError::Unreachable("input box hidden".into()));
                }
            }
            self.sent.lock().unwrap().push(instruction.to_string());
            Ok(())
        }
    }

    fn settings() -> SupervisorSettings {
        SupervisorSettings {
            max_consecutive_failures: 3,
            ..SupervisorSettings::default()
        }
    }

    fn open_db(dir: &tempfile::TempDir) -> Database {
        Database::new(dir.path().join("state.sqlite3")).unwrap()
    }

    fn supervisor(
        dir: &tempfile::TempDir,
        capture: Box<dyn CaptureSource>,
        outbox: &Outbox,
    ) -> SupervisorLoop {
        SupervisorLoop::new(
            settings(),
            SupervisorState::new("REST API backend"),
            open_db(dir),
            capture,
            Box::new(outbox.clone()),
        )
        .with_generator(InstructionGenerator::with_seed(Duration::from_secs(5), 5))
    }

    #[tokio::test]
    async fn error_cycle_delivers_and_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = Outbox::default();
        let mut worker = supervisor(
            &dir,
            ScriptedCapture::texts(&["Database connection failed, unable to connect to MySQL"]),
            &outbox,
        );

        let outcome = worker.cycle().await.unwrap();
        assert_eq!(outcome.classification.category, Category::Error);
        assert_eq!(outcome.action.priority, Priority::Urgent);
        assert_eq!(outcome.action.intervention_type, InterventionType::Resolve);
        assert_eq!(outbox.sent().len(), 1);
        assert_eq!(outcome.instruction.as_deref(), Some(outbox.sent()[0].as_str()));

        let state = worker.state();
        assert_eq!(state.decision_history.len(), 1);
        assert!(state.decision_history[0].delivered);
        assert_eq!(state.completed_task_markers.len(), 1);
        assert!(state.last_instruction_at.is_some());
        assert_eq!(worker.phase(), LoopPhase::Updating);

        let persisted = open_db(&dir).load_state().await.unwrap().unwrap();
        assert_eq!(persisted.decision_history, state.decision_history);
    }

    #[tokio::test]
    async fn repeated_content_is_suppressed() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = Outbox::default();
        let text = "Review the changes please";
        let mut worker = supervisor(&dir, ScriptedCapture::texts(&[text, text]), &outbox);

        assert_eq!(worker.cycle().await.unwrap().action.kind, ActionKind::Intervene);
        let second = worker.cycle().await.unwrap();
        assert!(second.verdict.is_suppressed());
        assert_eq!(second.action.kind, ActionKind::Skip);
        assert_eq!(outbox.sent().len(), 1);
    }

    #[tokio::test]
    async fn invalid_content_is_skipped_without_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = Outbox::default();
        let mut worker = supervisor(&dir, ScriptedCapture::texts(&["   "]), &outbox);

        let outcome = worker.cycle().await.unwrap();
        assert_eq!(outcome.action.kind, ActionKind::Skip);
        assert!(worker.state().decision_history[0].fingerprint.is_none());
    }

    #[tokio::test]
    async fn own_instruction_alone_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = Outbox::default();
        let mut worker = supervisor(
            &dir,
            ScriptedCapture::texts(&[
                "You: Fix the failed migration by checking the schema version first.\nAssistant is idle",
            ]),
            &outbox,
        );
        worker.state.note_instruction(
            Utc::now(),
            "Fix the failed migration by checking the schema version first.",
        );

        let outcome = worker.cycle().await.unwrap();
        assert_eq!(outcome.classification.category, Category::Routine);
        assert_eq!(outcome.action.kind, ActionKind::Skip);
        assert!(outbox.sent().is_empty());
    }

    #[tokio::test]
    async fn new_error_below_own_instruction_is_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = Outbox::default();
        let mut worker = supervisor(
            &dir,
            ScriptedCapture::texts(&[
                "Database connection failed, unable to connect to MySQL",
                "> Check the MySQL host and port in the config, then retry the connection.\n\
                 Fatal error: migration crashed, unable to continue",
            ]),
            &outbox,
        );

        assert_eq!(worker.cycle().await.unwrap().action.kind, ActionKind::Intervene);
        worker.state.note_instruction(
            Utc::now(),
            "Check the MySQL host and port in the config, then retry the connection.",
        );

        let outcome = worker.cycle().await.unwrap();
        assert_eq!(outcome.classification.category, Category::Error);
        assert_eq!(outcome.action.kind, ActionKind::Intervene);
        assert_eq!(outcome.action.priority, Priority::Urgent);
        assert_eq!(outbox.sent().len(), 2);
    }

    #[tokio::test]
    async fn handled_content_is_forced_forward_after_a_stall() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = Outbox::default();
        let text = "Review the changes please";
        let mut state = SupervisorState::new("REST API backend");
        state.mark_completed(&fingerprint(text), 10);
        state.note_instruction(Utc::now() - chrono::Duration::seconds(600), "earlier nudge");
        let mut worker = SupervisorLoop::new(
            settings(),
            state,
            open_db(&dir),
            ScriptedCapture::texts(&[text]),
            Box::new(outbox.clone()),
        )
        .with_generator(InstructionGenerator::with_seed(Duration::from_secs(5), 5));
        worker.started_at = Utc::now() - chrono::Duration::seconds(600);

        let outcome = worker.cycle().await.unwrap();
        assert_eq!(outcome.action.kind, ActionKind::Intervene);
        assert_eq!(outcome.action.intervention_type, InterventionType::Generic);
        assert_eq!(outbox.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_failures_halt_and_persist() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = Outbox::default();
        let unavailable: fn() -> CaptureError = || CaptureError::WindowUnavailable("minimised".into());
        let worker = supervisor(
            &dir,
            ScriptedCapture::frames(vec![Err(unavailable), Err(unavailable), Err(unavailable)]),
            &outbox,
        );

        match worker.run(CancellationToken::new()).await {
            LoopExit::Halted(reason) => {
                assert!(reason.starts_with("3 consecutive cycle failures"), "{reason}")
            }
            other => panic!("expected halt, got {other:?}"),
        }

        let persisted = open_db(&dir).load_state().await.unwrap().unwrap();
        assert!(persisted.status.is_halted());
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_the_failure_counter() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = Outbox::default();
        let unavailable: fn() -> CaptureError = || CaptureError::WindowUnavailable("minimised".into());
        let worker = supervisor(
            &dir,
            ScriptedCapture::frames(vec![
                Err(unavailable),
                Err(unavailable),
                Ok("Generating response...".into()),
                Err(unavailable),
                Err(unavailable),
            ]),
            &outbox,
        );

        // The script runs dry with TargetLost, which halts immediately.
        let exit = worker.run(CancellationToken::new()).await;
        assert_eq!(exit, LoopExit::Halted("target application lost: script exhausted".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn delivery_failure_counts_as_cycle_failure() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = Outbox::default();
        *outbox.failures_left.lock().unwrap() = 3;
        let worker = supervisor(
            &dir,
            ScriptedCapture::texts(&[
                "Build failed: cannot find crate serde",
                "Fatal error: unable to open the lock file",
                "Traceback: exception raised while failing to import",
            ]),
            &outbox,
        );

        let exit = worker.run(CancellationToken::new()).await;
        assert!(matches!(exit, LoopExit::Halted(reason) if reason.contains("input box hidden")));
    }

    #[tokio::test(start_paused = true)]
    async fn pacing_follows_the_action_wait() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = Outbox::default();
        let worker = supervisor(&dir, ScriptedCapture::texts(&["Generating response..."]), &outbox);

        let started = tokio::time::Instant::now();
        worker.run(CancellationToken::new()).await;
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(10), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(11), "{elapsed:?}");
    }

    #[tokio::test]
    async fn cancellation_stops_between_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = Outbox::default();
        let worker = supervisor(&dir, ScriptedCapture::texts(&["Generating response..."]), &outbox);

        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(worker.run(token).await, LoopExit::Cancelled);

        let persisted = open_db(&dir).load_state().await.unwrap().unwrap();
        assert_eq!(persisted.status, SupervisorStatus::Stopped);
    }

    #[test]
    fn echo_needs_a_substantial_instruction() {
        assert_eq!(strip_echo("ok continue", "ok"), None);
        assert_eq!(strip_echo("nothing of ours here", "Please continue with the current task."), None);
    }

    #[test]
    fn echo_is_cut_out_up_to_the_first_mismatch() {
        let residual = strip_echo(
            "USER: Please continue with the current task. Focus on it\nASSISTANT: sure",
            "Please continue with the current task. Focus on getting the core functionality working",
        );
        assert_eq!(residual.as_deref(), Some("user: it assistant: sure"));

        let residual = strip_echo(
            "Run the migrations again and check the schema version.",
            "Run the migrations again and check the schema version.",
        );
        assert_eq!(residual.as_deref(), Some(""));
    }
}
