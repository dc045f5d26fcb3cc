use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::io::AsyncWriteExt;

use crate::errors::DeliveryError;

/// Where generated instructions go.
#[async_trait]
pub trait DeliverySink: Send {
    async fn deliver(&mut self, instruction: &str) -> Result<(), DeliveryError>;
}

/// Appends each instruction as one JSON line to an outbox file.
///
/// An external injector tails the outbox and types the instruction into the IDE.
pub struct FileDelivery {
    outbox: PathBuf,
}

impl FileDelivery {
    pub fn new(outbox: PathBuf) -> Self {
        Self { outbox }
    }
}

#[async_trait]
impl DeliverySink for FileDelivery {
    async fn deliver(&mut self, instruction: &str) -> Result<(), DeliveryError> {
        let mut line = json!({
            "delivered_at": Utc::now().to_rfc3339(),
            "instruction": instruction,
        })
        .to_string();
        line.push('\n');

        let unreachable = |err: std::io::Error| {
            DeliveryError::Unreachable(format!("{}: {err}", self.outbox.display()))
        };

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.outbox)
            .await
            .map_err(unreachable)?;
        file.write_all(line.as_bytes()).await.map_err(unreachable)?;
        file.flush().await?;
        Ok(())
    }
}
