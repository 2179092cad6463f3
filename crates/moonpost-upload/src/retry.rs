// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Readiness polling policy.
//
// Fixed-interval retry bounded by attempt count. Errors are classified into
// Transient (poll again), UserAction and Permanent (give up); only transient
// errors keep the poll loop going.

use std::time::Duration;

use moonpost_core::config::PrinterConfig;
use moonpost_core::error::MoonpostError;
use moonpost_core::types::ErrorClass;
use tracing::{debug, info, warn};

use crate::protocol::{ERROR_STATE, READY_STATE};

/// Failed polls tolerated before giving up; the next failure times out.
pub const MAX_POLL_RETRIES: u32 = 20;

/// Frames cycled through by the "Connecting" notice.
pub const SPINNER: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

/// Retry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Failures allowed before the poll loop times out.
    pub max_retries: u32,
    /// Wait between polls.
    pub interval: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: MAX_POLL_RETRIES,
            interval: moonpost_core::config::DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl RetryConfig {
    pub fn for_printer(config: &PrinterConfig) -> Self {
        Self {
            interval: config.retry_interval(),
            ..Self::default()
        }
    }
}

/// Result of evaluating whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Poll again after this delay.
    RetryAfter(Duration),
    /// Do not retry; the error is not something polling can fix.
    GiveUp(ErrorClass),
    /// Maximum retries exhausted.
    Exhausted,
}

/// Classify a `MoonpostError` into an `ErrorClass` for retry decisions.
pub fn classify_error(err: &MoonpostError) -> ErrorClass {
    match err {
        // Printer booting, host unreachable, half-started web server
        MoonpostError::PrinterNotReady { .. } => ErrorClass::Transient,
        MoonpostError::Transport { .. } => ErrorClass::Transient,
        MoonpostError::MalformedResponse { .. } => ErrorClass::Transient,

        // User action needed
        MoonpostError::DeviceBusy => ErrorClass::UserAction,
        MoonpostError::NotConfigured => ErrorClass::UserAction,
        MoonpostError::Validation { .. } => ErrorClass::UserAction,

        // Permanent
        MoonpostError::ConnectionTimeout { .. } => ErrorClass::Permanent,
        MoonpostError::Serialize(_) => ErrorClass::Permanent,
        MoonpostError::Preferences(_) => ErrorClass::Permanent,
        MoonpostError::Serialization(_) => ErrorClass::Permanent,

        MoonpostError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                ErrorClass::UserAction
            }
            _ => ErrorClass::Transient,
        },
    }
}

/// Whether a reported firmware state lets the upload proceed.
///
/// Starting a print needs `ready`; a plain upload only needs the firmware
/// not to be in `error`.
pub fn is_ready(state: &str, start_print: bool) -> bool {
    if start_print {
        state == READY_STATE
    } else {
        state != ERROR_STATE
    }
}

/// Decide whether to poll again. `failures` counts this failure too.
pub fn should_retry(err: &MoonpostError, failures: u32, config: &RetryConfig) -> RetryDecision {
    match classify_error(err) {
        ErrorClass::Permanent => {
            info!("permanent error, not polling again");
            RetryDecision::GiveUp(ErrorClass::Permanent)
        }
        ErrorClass::UserAction => {
            info!("user action required, not polling again");
            RetryDecision::GiveUp(ErrorClass::UserAction)
        }
        ErrorClass::Transient => {
            if failures > config.max_retries {
                warn!(failures, max = config.max_retries, "readiness poll exhausted");
                RetryDecision::Exhausted
            } else {
                debug!(
                    failures,
                    delay_ms = config.interval.as_millis() as u64,
                    "scheduling poll"
                );
                RetryDecision::RetryAfter(config.interval)
            }
        }
    }
}

pub fn spinner_frame(failures: u32) -> char {
    SPINNER[failures as usize % SPINNER.len()]
}

/// Text of the "Connecting" notice for the given failure count.
pub fn connecting_text(url: &str, failures: u32) -> String {
    format!("Connecting to Moonraker at {url}     {}", spinner_frame(failures))
}
