use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::errors::CaptureError;
use crate::models::Observation;

use super::target_probe::TargetProbe;

/// Source of observations of the target application.
#[async_trait]
pub trait CaptureSource: Send {
    async fn capture(&mut self) -> Result<Observation, CaptureError>;
}

/// Reads the text an external OCR process keeps writing to a file.
///
/// A sibling `.png` next to the text file is reported as the screenshot reference.
pub struct FileCapture {
    path: PathBuf,
    probe: Option<TargetProbe>,
}

impl FileCapture {
    pub fn new(path: PathBuf) -> Self {
        Self { path, probe: None }
    }

    pub fn with_probe(mut self, probe: TargetProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    fn window_id(&self) -> String {
        match &self.probe {
            Some(probe) => probe.describe(),
            None => self.path.display().to_string(),
        }
    }
}

#[async_trait]
impl CaptureSource for FileCapture {
    async fn capture(&mut self) -> Result<Observation, CaptureError> {
        if let Some(probe) = self.probe.as_mut() {
            if !probe.is_alive() {
                return Err(CaptureError::TargetLost(format!(
                    "no process matching '{}'",
                    probe.describe()
                )));
            }
        }

        let raw_text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(CaptureError::WindowUnavailable(format!(
                    "{} does not exist yet",
                    self.path.display()
                )));
            }
            Err(err) => return Err(CaptureError::Io(err)),
        };

        let observation = Observation::new(raw_text, self.window_id());
        let screenshot = self.path.with_extension("png");
        if tokio::fs::try_exists(&screenshot).await.unwrap_or(false) {
            return Ok(observation.with_screenshot(screenshot.display().to_string()));
        }
        Ok(observation)
    }
}
