// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Moonpost.

use thiserror::Error;

/// Top-level error type for all Moonpost operations.
#[derive(Debug, Error)]
pub enum MoonpostError {
    // -- Session gate --
    #[error("device is busy with another upload")]
    DeviceBusy,

    #[error("no valid Moonraker connection is configured for this printer")]
    NotConfigured,

    // -- Network --
    #[error("malformed response from {endpoint}: {detail}")]
    MalformedResponse { endpoint: String, detail: String },

    #[error("the status of the printer is '{state}'")]
    PrinterNotReady { state: String },

    #[error("connection timed out after {attempts} attempts: {last_error}")]
    ConnectionTimeout { attempts: u32, last_error: String },

    #[error("{operation} failed: {message}")]
    Transport {
        operation: String,
        /// HTTP status code, when the server answered at all.
        status: Option<u16>,
        message: String,
    },

    // -- Input validation --
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    // -- Host collaborators --
    #[error("document writer failed: {0}")]
    Serialize(String),

    #[error("preference store error: {0}")]
    Preferences(String),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MoonpostError {
    /// Shorthand for a validation failure on a named field.
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Shorthand for a transport failure without an HTTP status.
    pub fn transport(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            status: None,
            message: message.into(),
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MoonpostError>;
