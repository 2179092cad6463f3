// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Moonpost Bridge: the host application seen through traits.
//
// `traits` defines what the upload flow needs from the slicer; `desktop`
// provides standalone implementations for running without one.

pub mod desktop;
pub mod traits;

pub use traits::{BrowserOpener, DialogOutcome, DocumentWriter, UploadDialog, UploadProposal};
