pub mod analysis;
pub mod cli;
pub mod db;
pub mod decision;
pub mod errors;
pub mod guard;
pub mod instruction;
pub mod models;
pub mod sensing;
pub mod settings;
mod utils;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use analysis::{fingerprint, ContentAnalyzer};
use cli::{Cli, Commands};
use db::Database;
use instruction::{ChatCompletionsAdvisor, DevStage};
use models::{Classification, SupervisorState, SupervisorStatus};
use sensing::{
    FileCapture, FileDelivery, LoopExit, SupervisorController, SupervisorLoop, TargetProbe,
};
use settings::SettingsStore;

const ENABLE_LOGS: bool = true;

/// Process exit code when supervision halted, now or in an earlier run.
const EXIT_HALTED: u8 = 2;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClassifyReport {
    #[serde(flatten)]
    classification: Classification,
    fingerprint: Option<String>,
    stage: DevStage,
}

pub fn run() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            log_error!("failed to start async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(execute(cli)) {
        Ok(code) => code,
        Err(err) => {
            log_error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Run {
            capture_file,
            outbox,
            project,
        } => supervise(cli.config, cli.db, capture_file, outbox, project).await,
        Commands::Classify { text } => {
            let settings = SettingsStore::new(cli.config)?.settings();
            let classification = ContentAnalyzer::new(settings.min_confidence).classify(&text);
            let report = ClassifyReport {
                fingerprint: classification.valid.then(|| fingerprint(&text)),
                stage: DevStage::detect(&text),
                classification,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::State => {
            let db = Database::new(cli.db)?;
            let state = db.load_state().await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::ResetHalt => {
            let db = Database::new(cli.db)?;
            if db.clear_halt().await? {
                log_info!("halt cleared; supervision may be started again");
            } else {
                log_info!("no halt recorded in {}", db.path().display());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn supervise(
    config: std::path::PathBuf,
    db_path: std::path::PathBuf,
    capture_file: std::path::PathBuf,
    outbox: std::path::PathBuf,
    project: Option<String>,
) -> Result<ExitCode> {
    let store = SettingsStore::new(config)?;
    if let Some(project) = project {
        store.update_project_context(project)?;
    }
    let settings = store.settings();

    let db = Database::new(db_path)?;
    let mut state = match db.load_state().await.context("failed to load checkpoint")? {
        Some(state) => state,
        None => SupervisorState::new(settings.project_context.clone()),
    };

    if let SupervisorStatus::Halted(reason) = &state.status {
        log_error!(
            "previous run halted ({}); run `ide-supervisor reset-halt` before starting again",
            reason
        );
        return Ok(ExitCode::from(EXIT_HALTED));
    }
    if !settings.project_context.is_empty() {
        state.project_context = settings.project_context.clone();
    }
    log_info!(
        "resuming with {} past decisions and {} handled tasks",
        state.decision_history.len(),
        state.completed_task_markers.len()
    );

    let mut capture = FileCapture::new(capture_file);
    if let Some(fragments) = settings.target_process.clone() {
        capture = capture.with_probe(TargetProbe::new(fragments));
    }

    let mut worker = SupervisorLoop::new(
        settings.clone(),
        state,
        db,
        Box::new(capture),
        Box::new(FileDelivery::new(outbox)),
    );
    if let Some(advisor) = &settings.advisor {
        log_info!("advisor enabled: {} ({})", advisor.endpoint, advisor.model);
        worker = worker.with_advisor(Box::new(ChatCompletionsAdvisor::from_settings(advisor)));
    }

    let mut controller = SupervisorController::new();
    let cancel_token = controller.start(worker)?;
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log_info!("interrupt received, finishing the current cycle");
            cancel_token.cancel();
        }
    });

    match controller.join().await? {
        LoopExit::Cancelled => Ok(ExitCode::SUCCESS),
        LoopExit::Halted(reason) => {
            log_error!("supervision halted: {}", reason);
            Ok(ExitCode::from(EXIT_HALTED))
        }
    }
}
