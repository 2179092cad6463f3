// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Host application capabilities the upload flow depends on.
//
// The slicer supplies these; Moonpost never reaches for a global
// application instance.

use async_trait::async_trait;

use moonpost_core::error::Result;
use moonpost_core::types::OutputFormat;

/// Renders the current print job into bytes.
pub trait DocumentWriter: Send + Sync {
    /// Render the job in `format`. `pre_sliced` is passed through so writers
    /// that hold an already-sliced file can skip regeneration.
    ///
    /// An error aborts the write request before any network activity.
    fn render(&self, format: OutputFormat, pre_sliced: bool) -> Result<Vec<u8>>;
}

/// Fields presented to the user before uploading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadProposal {
    pub file_name: String,
    /// Target directory below `gcodes`, empty for the root.
    pub path: String,
    pub start_print: bool,
    /// Previously used paths offered for selection.
    pub known_paths: Vec<String>,
    /// Whether the host accepts a target directory at all.
    pub path_editable: bool,
}

/// What the user decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogOutcome {
    /// Upload with the (possibly edited) fields.
    Accepted(UploadProposal),
    Cancelled,
}

/// Upload confirmation dialog.
#[async_trait]
pub trait UploadDialog: Send + Sync {
    /// Show the dialog and wait until the user accepts or cancels.
    async fn confirm(&self, proposal: UploadProposal) -> DialogOutcome;
}

/// Opens a URL in the user's browser.
pub trait BrowserOpener: Send + Sync {
    fn open(&self, url: &str) -> Result<()>;
}
