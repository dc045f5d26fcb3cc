//! Module-gated logging macros for the supervisor's per-cycle output.
//!
//! The monitoring loop logs every phase of every cycle, which is useful while
//! tuning signal tables and noisy otherwise. Each module that uses these macros
//! declares its own switch:
//!
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{log_debug, log_info};
//!
//! log_info!("cycle {} finished", cycle);
//! ```
//!
//! Messages are prefixed with the emitting module path so interleaved output
//! from the loop, the guard and the generator stays attributable.

/// Debug-level log gated on the caller's `ENABLE_LOGS`.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!("[{}] {}", module_path!(), format_args!($($arg)*));
        }
    };
}

/// Info-level log gated on the caller's `ENABLE_LOGS`.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!("[{}] {}", module_path!(), format_args!($($arg)*));
        }
    };
}

/// Warn-level log gated on the caller's `ENABLE_LOGS`.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!("[{}] {}", module_path!(), format_args!($($arg)*));
        }
    };
}

/// Error-level log. Not gated: failures that halt supervision are always reported.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        log::error!("[{}] {}", module_path!(), format_args!($($arg)*));
    };
}
