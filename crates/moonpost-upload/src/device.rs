// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Output device facade: what the host sees of one Moonraker printer.
//
// Holds the loaded config, exposes identity and camera metadata, accepts
// write requests and config reloads, and forwards everything the
// orchestrator reports through one event subscription.

use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use moonpost_bridge::traits::{BrowserOpener, DocumentWriter, UploadDialog};
use moonpost_core::config::PrinterConfig;
use moonpost_core::error::{MoonpostError, Result};
use moonpost_core::store::ConfigStore;
use moonpost_core::types::{NoticeAction, Stage, WriteRequest};

use crate::events::{DeviceEvent, EventBus, Property};
use crate::http::HttpTransport;
use crate::orchestrator::{UploadOrchestrator, UploadOutcome, UploadSession};

/// Collaborators supplied by the host.
#[derive(Clone)]
pub struct DeviceServices {
    pub store: ConfigStore,
    pub transport: Arc<dyn HttpTransport>,
    pub writer: Arc<dyn DocumentWriter>,
    pub dialog: Option<Arc<dyn UploadDialog>>,
    pub browser: Option<Arc<dyn BrowserOpener>>,
}

/// A Moonraker printer as an output device.
pub struct MoonrakerOutputDevice {
    printer_id: String,
    name: String,
    store: ConfigStore,
    orchestrator: UploadOrchestrator,
    browser: Option<Arc<dyn BrowserOpener>>,
    events: EventBus,
    config: RwLock<Arc<PrinterConfig>>,
}

impl MoonrakerOutputDevice {
    pub fn new(
        printer_id: impl Into<String>,
        name: impl Into<String>,
        services: DeviceServices,
    ) -> Self {
        let printer_id = printer_id.into();
        let name = name.into();
        let events = EventBus::default();
        let mut orchestrator = UploadOrchestrator::new(
            printer_id.clone(),
            name.clone(),
            services.store.clone(),
            services.transport,
            services.writer,
            events.clone(),
        );
        if let Some(dialog) = services.dialog {
            orchestrator = orchestrator.with_dialog(dialog);
        }
        let config = services.store.get(&printer_id);
        debug!(printer = %printer_id, config = ?config, "output device created");

        Self {
            printer_id,
            name,
            store: services.store,
            orchestrator,
            browser: services.browser,
            events,
            config: RwLock::new(Arc::new(config)),
        }
    }

    pub fn printer_id(&self) -> &str {
        &self.printer_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> String {
        format!("Upload to {}", self.name)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    pub fn stage(&self) -> Stage {
        self.orchestrator.gate().stage()
    }

    pub fn is_busy(&self) -> bool {
        self.orchestrator.gate().is_busy()
    }

    /// Snapshot of the loaded config.
    pub fn config(&self) -> Arc<PrinterConfig> {
        Arc::clone(&self.config.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn can_connect(&self) -> bool {
        self.config().can_connect()
    }

    pub fn url(&self) -> String {
        self.config().url.trim().to_string()
    }

    pub fn api_key(&self) -> String {
        self.config().api_key.clone()
    }

    /// Absolute camera stream URL, `None` when no camera is configured.
    pub fn camera_url(&self) -> Option<String> {
        let config = self.config();
        resolve_camera_url(&config.url, &config.camera_url)
    }

    /// Clockwise rotation in degrees: 0, 90, 180 or 270.
    pub fn camera_rotation(&self) -> u16 {
        self.config().camera_image_rotation.degrees()
    }

    pub fn camera_mirror(&self) -> bool {
        self.config().camera_image_mirror
    }

    /// Reload the config from the store.
    ///
    /// Returns whether anything changed; changed properties are announced
    /// individually. Rejected with `DeviceBusy` while an upload runs.
    #[instrument(skip(self), fields(printer = %self.printer_id))]
    pub fn update_config(&self) -> Result<bool> {
        if self.is_busy() {
            warn!("config reload rejected while uploading");
            return Err(MoonpostError::DeviceBusy);
        }

        let fresh = self.store.get(&self.printer_id);
        let changed = {
            let mut current = self.config.write().unwrap_or_else(PoisonError::into_inner);
            if **current == fresh {
                return Ok(false);
            }
            let changed = changed_properties(&current, &fresh);
            *current = Arc::new(fresh);
            changed
        };

        info!(properties = ?changed, "printer config reloaded");
        for property in changed {
            self.events.publish(DeviceEvent::PropertyChanged(property));
        }
        self.events.publish(DeviceEvent::StageChanged(Stage::Ready));
        Ok(true)
    }

    /// Start a write request: checks and rendering happen now, the network
    /// part runs when the returned `PendingWrite` is driven.
    pub fn begin_write(&self, request: WriteRequest) -> Result<PendingWrite> {
        let session = self.orchestrator.begin(self.config(), request)?;
        Ok(PendingWrite {
            orchestrator: self.orchestrator.clone(),
            session,
        })
    }

    /// Run a write request to completion.
    pub async fn write(&self, request: WriteRequest) -> Result<UploadOutcome> {
        self.orchestrator.write(self.config(), request).await
    }

    /// Carry out a notice action the user clicked.
    pub fn trigger_action(&self, action: &NoticeAction) -> Result<()> {
        match action {
            NoticeAction::OpenBrowser { url } => match &self.browser {
                Some(browser) => browser.open(url),
                None => {
                    warn!(url = %url, "no browser available");
                    Ok(())
                }
            },
        }
    }
}

/// A started write whose network part has not run yet.
///
/// Owns everything it needs, so it can be moved into `tokio::spawn`.
#[derive(Debug)]
pub struct PendingWrite {
    orchestrator: UploadOrchestrator,
    session: UploadSession,
}

impl PendingWrite {
    pub fn session(&self) -> &UploadSession {
        &self.session
    }

    pub async fn run(self) -> Result<UploadOutcome> {
        self.orchestrator.run(self.session).await
    }
}

/// Make a camera URL absolute. Relative URLs are joined onto the Moonraker
/// base URL.
pub fn resolve_camera_url(base_url: &str, camera_url: &str) -> Option<String> {
    let camera_url = camera_url.trim();
    if camera_url.is_empty() {
        return None;
    }
    if camera_url.starts_with("http://") || camera_url.starts_with("https://") {
        return Some(camera_url.to_string());
    }
    let base = reqwest::Url::parse(base_url.trim()).ok()?;
    base.join(camera_url).ok().map(String::from)
}

fn changed_properties(old: &PrinterConfig, new: &PrinterConfig) -> Vec<Property> {
    let mut changed = Vec::new();
    if old.url != new.url {
        changed.push(Property::Url);
    }
    if old.api_key != new.api_key {
        changed.push(Property::ApiKey);
    }
    if old.power_device != new.power_device {
        changed.push(Property::PowerDevice);
    }
    if old.output_format != new.output_format {
        changed.push(Property::OutputFormat);
    }
    if old.camera_url != new.camera_url {
        changed.push(Property::CameraUrl);
    }
    if old.camera_image_rotation != new.camera_image_rotation {
        changed.push(Property::CameraRotation);
    }
    if old.camera_image_mirror != new.camera_image_mirror {
        changed.push(Property::CameraMirror);
    }
    changed
}
