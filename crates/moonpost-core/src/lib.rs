// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Moonpost Core: types, printer configuration and error definitions shared
// across all crates.

pub mod config;
pub mod error;
pub mod human_errors;
pub mod prefs;
pub mod store;
pub mod types;

pub use config::PrinterConfig;
pub use error::MoonpostError;
pub use store::ConfigStore;
pub use types::*;
