// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer. Opens the preference file and builds output
// devices for the commands to drive.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use moonpost_bridge::desktop::{AcceptDialog, FileDocumentWriter, SystemBrowser, TerminalDialog};
use moonpost_bridge::traits::UploadDialog;
use moonpost_core::error::Result;
use moonpost_core::prefs::{JsonFilePreferences, MemoryPreferences};
use moonpost_core::store::ConfigStore;
use moonpost_upload::device::{DeviceServices, MoonrakerOutputDevice};
use moonpost_upload::http::{HttpTransport, ReqwestTransport};
use tracing::{error, info};

use super::data_dir;

/// File inside the data directory holding all preferences.
pub const PREFERENCES_FILE: &str = "preferences.json";

#[derive(Clone)]
pub struct AppServices {
    store: ConfigStore,
    preferences_path: Option<PathBuf>,
}

impl AppServices {
    /// Open the preference file in the data directory.
    pub fn init() -> Result<Self> {
        Self::open(&data_dir::data_dir())
    }

    pub fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(PREFERENCES_FILE);
        let prefs = JsonFilePreferences::open(&path)?;
        info!(path = %path.display(), "preferences opened");
        Ok(Self {
            store: ConfigStore::new(Arc::new(prefs)),
            preferences_path: Some(path),
        })
    }

    /// In-memory preferences, used when the file cannot be opened.
    pub fn fallback() -> Self {
        error!("persistent preferences unavailable, changes will not be saved");
        Self {
            store: ConfigStore::new(Arc::new(MemoryPreferences::new())),
            preferences_path: None,
        }
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn preferences_path(&self) -> Option<&Path> {
        self.preferences_path.as_deref()
    }

    /// Output device uploading `file` to `printer_id`.
    ///
    /// `confirm` asks on the terminal before uploading when the printer has
    /// the upload dialog enabled.
    pub fn device_for_file(
        &self,
        printer_id: &str,
        file: &Path,
        confirm: bool,
    ) -> Result<MoonrakerOutputDevice> {
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new()?);
        let dialog: Arc<dyn UploadDialog> = if confirm {
            Arc::new(TerminalDialog)
        } else {
            Arc::new(AcceptDialog)
        };
        Ok(MoonrakerOutputDevice::new(
            printer_id,
            printer_id,
            DeviceServices {
                store: self.store.clone(),
                transport,
                writer: Arc::new(FileDocumentWriter::new(file)),
                dialog: Some(dialog),
                browser: Some(Arc::new(SystemBrowser)),
            },
        ))
    }
}
