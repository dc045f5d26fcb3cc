use thiserror::Error;

/// Failure to obtain an observation from the target application.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The window or its text source is temporarily unavailable.
    #[error("target window unavailable: {0}")]
    WindowUnavailable(String),

    /// The target application is no longer running. Supervision cannot continue.
    #[error("target application lost: {0}")]
    TargetLost(String),

    #[error("capture io failed: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, CaptureError::TargetLost(_))
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("input surface unreachable: {0}")]
    Unreachable(String),

    #[error("delivery io failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("advisor timed out after {0:.1}s")]
    Timeout(f64),

    #[error("advisor rejected credentials (status {0})")]
    Auth(u16),

    #[error("advisor quota exhausted")]
    Quota,

    #[error("advisor request failed: {0}")]
    Http(String),

    #[error("advisor response malformed: {0}")]
    Malformed(String),

    #[error("advisor returned an empty response")]
    Empty,
}

impl From<reqwest::Error> for AdvisorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AdvisorError::Malformed(err.to_string())
        } else {
            AdvisorError::Http(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generated instruction rejected: {0}")]
    InvalidOutput(String),
}

/// Everything that can go wrong inside one supervision cycle.
///
/// All variants are recoverable at the loop boundary; only a run of
/// consecutive failures (or a fatal capture) halts the loop.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// Classification is infallible by contract; this only carries a caught panic.
    #[error("classification failed (internal bug): {0}")]
    Classification(String),

    #[error("state persistence failed: {0:#}")]
    Persistence(anyhow::Error),
}

impl CycleError {
    pub fn is_fatal(&self) -> bool {
        match self {
            CycleError::Capture(err) => err.is_fatal(),
            _ => false,
        }
    }
}
