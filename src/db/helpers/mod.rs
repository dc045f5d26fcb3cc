use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use crate::models::SupervisorStatus;

pub fn to_i64(value: usize) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn parse_status(value: &str, reason: Option<String>) -> Result<SupervisorStatus> {
    match value {
        "Running" => Ok(SupervisorStatus::Running),
        "Stopped" => Ok(SupervisorStatus::Stopped),
        "Halted" => Ok(SupervisorStatus::Halted(reason.unwrap_or_default())),
        other => Err(anyhow!("unknown supervisor status {other}")),
    }
}

pub fn status_reason(status: &SupervisorStatus) -> Option<&str> {
    match status {
        SupervisorStatus::Halted(reason) => Some(reason.as_str()),
        _ => None,
    }
}
