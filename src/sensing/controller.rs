use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::loop_worker::{LoopExit, SupervisorLoop};

/// Starts and stops the background supervision task.
pub struct SupervisorController {
    handle: Option<JoinHandle<LoopExit>>,
    cancel_token: Option<CancellationToken>,
}

impl Default for SupervisorController {
    fn default() -> Self {
        Self::new()
    }
}

impl SupervisorController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn start(&mut self, worker: SupervisorLoop) -> Result<CancellationToken> {
        if self.handle.is_some() {
            bail!("supervision already active");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(worker.run(cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token.clone());
        Ok(cancel_token)
    }

    /// Wait for the loop to exit on its own (halt) or through its token.
    pub async fn join(&mut self) -> Result<LoopExit> {
        let Some(handle) = self.handle.take() else {
            bail!("supervision is not running");
        };
        self.cancel_token = None;
        handle.await.context("supervision task failed to join")
    }

    /// Cancel at the next cycle boundary and wait for the final checkpoint.
    pub async fn stop(&mut self) -> Result<LoopExit> {
        if let Some(token) = self.cancel_token.take() {
            info!("Stopping supervision after the current cycle");
            token.cancel();
        }
        match self.handle.take() {
            Some(handle) => handle.await.context("supervision task failed to join"),
            None => Ok(LoopExit::Cancelled),
        }
    }
}
