use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
    time::Duration,
};

/// Minimum confidence each intervening category needs before the engine acts on it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Thresholds {
    pub error: f64,
    pub complete: f64,
    pub question: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            error: 0.3,
            complete: 0.3,
            question: 0.5,
        }
    }
}

/// Connection details for an OpenAI-style chat completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdvisorSettings {
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key. The key itself never lands on disk.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_api_key_env() -> String {
    "IDE_SUPERVISOR_ADVISOR_API_KEY".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SupervisorSettings {
    pub monitoring_interval_secs: f64,
    /// Cooldown window of the duplicate guard.
    pub instruction_cooldown_secs: f64,
    pub max_same_content_processing: u32,
    pub duplicate_retention_secs: f64,
    pub thresholds: Thresholds,
    pub min_confidence: f64,
    pub repeat_limit: usize,
    pub decision_history_cap: usize,
    pub completed_marker_cap: usize,
    /// `None` disables forced-progress interventions.
    pub stall_timeout_secs: Option<f64>,
    pub advisor_timeout_secs: f64,
    pub max_consecutive_failures: u32,
    pub project_context: String,
    pub advisor: Option<AdvisorSettings>,
    /// Process-name fragments identifying the supervised application.
    pub target_process: Option<Vec<String>>,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            monitoring_interval_secs: 5.0,
            instruction_cooldown_secs: 10.0,
            max_same_content_processing: 1,
            duplicate_retention_secs: 600.0,
            thresholds: Thresholds::default(),
            min_confidence: 0.25,
            repeat_limit: 3,
            decision_history_cap: 50,
            completed_marker_cap: 200,
            stall_timeout_secs: Some(120.0),
            advisor_timeout_secs: 5.0,
            max_consecutive_failures: 5,
            project_context: String::new(),
            advisor: None,
            target_process: None,
        }
    }
}

impl SupervisorSettings {
    pub fn instruction_cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.instruction_cooldown_secs)
    }

    pub fn duplicate_retention(&self) -> Duration {
        Duration::from_secs_f64(self.duplicate_retention_secs)
    }

    pub fn advisor_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.advisor_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        let unit = [
            ("thresholds.error", self.thresholds.error),
            ("thresholds.complete", self.thresholds.complete),
            ("thresholds.question", self.thresholds.question),
            ("min_confidence", self.min_confidence),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                bail!("{name} must be within [0, 1], got {value}");
            }
        }

        let positive = [
            ("monitoring_interval_secs", self.monitoring_interval_secs),
            ("instruction_cooldown_secs", self.instruction_cooldown_secs),
            ("duplicate_retention_secs", self.duplicate_retention_secs),
            ("advisor_timeout_secs", self.advisor_timeout_secs),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                bail!("{name} must be a positive number of seconds, got {value}");
            }
        }

        if let Some(stall) = self.stall_timeout_secs {
            if !(stall.is_finite() && stall > 0.0) {
                bail!("stall_timeout_secs must be positive when set, got {stall}");
            }
        }

        if self.max_same_content_processing == 0 {
            bail!("max_same_content_processing must be at least 1");
        }
        if self.decision_history_cap == 0 || self.completed_marker_cap == 0 {
            bail!("history and marker caps must be at least 1");
        }
        if self.repeat_limit == 0 {
            bail!("repeat_limit must be at least 1");
        }
        if self.max_consecutive_failures == 0 {
            bail!("max_consecutive_failures must be at least 1");
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(context) = std::env::var("IDE_SUPERVISOR_PROJECT_CONTEXT") {
            self.project_context = context;
        }
        if let Ok(interval) = std::env::var("IDE_SUPERVISOR_MONITORING_INTERVAL") {
            self.monitoring_interval_secs = interval
                .trim()
                .parse()
                .with_context(|| format!("invalid IDE_SUPERVISOR_MONITORING_INTERVAL '{interval}'"))?;
        }

        let endpoint = std::env::var("IDE_SUPERVISOR_ADVISOR_ENDPOINT").ok();
        let model = std::env::var("IDE_SUPERVISOR_ADVISOR_MODEL").ok();
        match self.advisor {
            Some(ref mut advisor) => {
                if let Some(endpoint) = endpoint {
                    advisor.endpoint = endpoint;
                }
                if let Some(model) = model {
                    advisor.model = model;
                }
            }
            None => {
                if let Some(endpoint) = endpoint {
                    self.advisor = Some(AdvisorSettings {
                        endpoint,
                        model: model.unwrap_or_else(|| "gpt-4o".into()),
                        api_key_env: default_api_key_env(),
                    });
                }
            }
        }
        Ok(())
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<SupervisorSettings>,
}

impl SettingsStore {
    /// Load settings from `path`, falling back to defaults when the file does not exist.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = load_settings(&path)?;
        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn settings(&self) -> SupervisorSettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update_project_context(&self, project_context: String) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.project_context = project_context;
        self.persist(&guard)
    }

    fn persist(&self, data: &SupervisorSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

fn load_settings(path: &Path) -> Result<SupervisorSettings> {
    let mut data = if path.exists() {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings in {}", path.display()))?
    } else {
        SupervisorSettings::default()
    };
    data.apply_env_overrides()?;
    data.validate()
        .with_context(|| format!("Invalid settings in {}", path.display()))?;
    Ok(data)
}
