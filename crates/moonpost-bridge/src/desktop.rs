// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Standalone implementations used when Moonpost runs outside a slicer: the
// print file already exists on disk, the dialog is a terminal prompt, and
// the browser is whatever the desktop opens by default.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use moonpost_core::error::{MoonpostError, Result};
use moonpost_core::types::OutputFormat;

use crate::traits::{BrowserOpener, DialogOutcome, DocumentWriter, UploadDialog, UploadProposal};

/// Serves a file that was sliced ahead of time.
#[derive(Debug, Clone)]
pub struct FileDocumentWriter {
    path: PathBuf,
}

impl FileDocumentWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Format implied by the file extension.
    pub fn detected_format(&self) -> OutputFormat {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(OutputFormat::normalize)
            .unwrap_or_default()
    }
}

impl DocumentWriter for FileDocumentWriter {
    fn render(&self, format: OutputFormat, _pre_sliced: bool) -> Result<Vec<u8>> {
        if format != self.detected_format() {
            return Err(MoonpostError::Serialize(format!(
                "{} is not a {format} file",
                self.path.display()
            )));
        }
        let bytes = std::fs::read(&self.path).map_err(|e| {
            MoonpostError::Serialize(format!("cannot read {}: {e}", self.path.display()))
        })?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "print file loaded");
        Ok(bytes)
    }
}

/// Accepts every proposal unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptDialog;

#[async_trait]
impl UploadDialog for AcceptDialog {
    async fn confirm(&self, proposal: UploadProposal) -> DialogOutcome {
        DialogOutcome::Accepted(proposal)
    }
}

/// Asks on the terminal before uploading.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalDialog;

#[async_trait]
impl UploadDialog for TerminalDialog {
    async fn confirm(&self, proposal: UploadProposal) -> DialogOutcome {
        let prompt = format!(
            "Upload '{}' to '/{}'{}? [Y/n/new file name] ",
            proposal.file_name,
            proposal.path,
            if proposal.start_print { " and start printing" } else { "" },
        );
        let answer = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
            let mut stdout = std::io::stdout();
            stdout.write_all(prompt.as_bytes())?;
            stdout.flush()?;
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            Ok(line)
        })
        .await;

        match answer {
            Ok(Ok(line)) => interpret_answer(proposal, &line),
            Ok(Err(e)) => {
                warn!(error = %e, "cannot read answer from terminal");
                DialogOutcome::Cancelled
            }
            Err(e) => {
                warn!(error = %e, "terminal prompt task failed");
                DialogOutcome::Cancelled
            }
        }
    }
}

/// Map a typed answer onto the proposal: blank or `y` accepts, `n` cancels,
/// anything else is taken as a new file name.
pub fn interpret_answer(mut proposal: UploadProposal, answer: &str) -> DialogOutcome {
    let answer = answer.trim();
    match answer.to_ascii_lowercase().as_str() {
        "" | "y" | "yes" => DialogOutcome::Accepted(proposal),
        "n" | "no" => DialogOutcome::Cancelled,
        _ => {
            proposal.file_name = answer.to_string();
            DialogOutcome::Accepted(proposal)
        }
    }
}

/// Opens URLs with the desktop's default handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl BrowserOpener for SystemBrowser {
    fn open(&self, url: &str) -> Result<()> {
        let mut command = if cfg!(target_os = "macos") {
            Command::new("open")
        } else if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", "start", ""]);
            c
        } else {
            Command::new("xdg-open")
        };
        command.arg(url).spawn()?;
        info!(url, "opened browser");
        Ok(())
    }
}
