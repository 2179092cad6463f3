// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Upload orchestrator: serialize → confirm → power on → poll → upload.
//
// At most one session is in flight per printer. `begin` runs the cheap,
// synchronous part (busy gate, document rendering, file name resolution) so
// a rejected request never touches the network; `run` drives the session to
// a terminal state and always returns the device to `Ready`.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, instrument, warn};

use moonpost_bridge::traits::{DialogOutcome, DocumentWriter, UploadDialog, UploadProposal};
use moonpost_core::config::{PrinterConfig, strip_path, validate_file_name, validate_upload_path};
use moonpost_core::error::{MoonpostError, Result};
use moonpost_core::human_errors::{
    AUTOHIDE_LIFETIME, NoticeContext, configure_notice, humanize_error,
};
use moonpost_core::store::ConfigStore;
use moonpost_core::types::{
    Notice, NoticeAction, NoticeKind, OutputFormat, SessionId, Stage, WriteRequest,
};

use crate::client::{MoonrakerClient, UploadFile};
use crate::events::{DeviceEvent, EventBus};
use crate::filename::{ensure_extension, resolve_file_name};
use crate::http::{HttpTransport, ProgressFn};
use crate::protocol::PowerState;
use crate::retry::{self, RetryConfig, RetryDecision};

/// How a write request ended, short of an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded {
        file_name: String,
        /// Directory below `gcodes`, empty for the root.
        path: String,
        print_started: bool,
    },
    /// The user dismissed the upload dialog.
    Cancelled,
    /// The printer has no usable URL; a configure notice was shown.
    NotConfigured,
}

// -- Stage gate --

/// Shared `Ready`/`Writing` flag with an atomic test-and-set.
#[derive(Debug, Clone)]
pub struct StageGate {
    stage: Arc<Mutex<Stage>>,
    events: EventBus,
}

impl StageGate {
    pub fn new(events: EventBus) -> Self {
        Self {
            stage: Arc::new(Mutex::new(Stage::Ready)),
            events,
        }
    }

    pub fn stage(&self) -> Stage {
        *self.stage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_busy(&self) -> bool {
        self.stage() == Stage::Writing
    }

    /// Move to `Writing`, or fail with `DeviceBusy` if already there.
    pub fn try_begin(&self) -> Result<WritingGuard> {
        {
            let mut stage = self.stage.lock().unwrap_or_else(PoisonError::into_inner);
            if *stage == Stage::Writing {
                return Err(MoonpostError::DeviceBusy);
            }
            *stage = Stage::Writing;
        }
        self.events.publish(DeviceEvent::StageChanged(Stage::Writing));
        Ok(WritingGuard { gate: self.clone() })
    }
}

/// Holds the gate in `Writing`; dropping it returns to `Ready`.
#[derive(Debug)]
pub struct WritingGuard {
    gate: StageGate,
}

impl Drop for WritingGuard {
    fn drop(&mut self) {
        *self
            .gate
            .stage
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Stage::Ready;
        self.gate
            .events
            .publish(DeviceEvent::StageChanged(Stage::Ready));
    }
}

// -- Session --

/// One in-flight write request.
///
/// Owns the rendered payload and a snapshot of the printer config taken at
/// `begin`; later config edits do not affect it.
#[derive(Debug)]
pub struct UploadSession {
    id: SessionId,
    config: Arc<PrinterConfig>,
    format: OutputFormat,
    file_name: String,
    path: String,
    start_print: bool,
    payload: Vec<u8>,
    /// Failed readiness polls so far.
    failures: u32,
    /// `WriteStarted` went out; the dialog step is behind us.
    started: bool,
    started_at: DateTime<Utc>,
    _guard: WritingGuard,
}

impl UploadSession {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn start_print(&self) -> bool {
        self.start_print
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    fn notice_context(&self) -> NoticeContext<'_> {
        NoticeContext {
            url: self.config.url.trim(),
            browser_url: self.config.browser_url(),
            power_device: &self.config.power_device,
        }
    }
}

// -- Orchestrator --

/// Runs write requests for one printer.
#[derive(Clone)]
pub struct UploadOrchestrator {
    printer_id: String,
    printer_name: String,
    store: ConfigStore,
    transport: Arc<dyn HttpTransport>,
    writer: Arc<dyn DocumentWriter>,
    dialog: Option<Arc<dyn UploadDialog>>,
    events: EventBus,
    gate: StageGate,
}

impl std::fmt::Debug for UploadOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadOrchestrator")
            .field("printer_id", &self.printer_id)
            .field("printer_name", &self.printer_name)
            .field("stage", &self.gate.stage())
            .field("dialog", &self.dialog.is_some())
            .finish_non_exhaustive()
    }
}

impl UploadOrchestrator {
    pub fn new(
        printer_id: impl Into<String>,
        printer_name: impl Into<String>,
        store: ConfigStore,
        transport: Arc<dyn HttpTransport>,
        writer: Arc<dyn DocumentWriter>,
        events: EventBus,
    ) -> Self {
        Self {
            printer_id: printer_id.into(),
            printer_name: printer_name.into(),
            store,
            transport,
            writer,
            dialog: None,
            gate: StageGate::new(events.clone()),
            events,
        }
    }

    /// Ask the user through `dialog` when the printer has the upload dialog
    /// enabled.
    pub fn with_dialog(mut self, dialog: Arc<dyn UploadDialog>) -> Self {
        self.dialog = Some(dialog);
        self
    }

    pub fn gate(&self) -> &StageGate {
        &self.gate
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Validate and prepare a write request without any network activity.
    ///
    /// Fails with `DeviceBusy` while another session runs, with
    /// `NotConfigured` (after showing a configure notice) when the printer
    /// has no usable URL, and with `Serialize` when the document writer
    /// fails. None of these leave the stage changed.
    #[instrument(skip(self, config, request), fields(printer = %self.printer_id))]
    pub fn begin(&self, config: Arc<PrinterConfig>, request: WriteRequest) -> Result<UploadSession> {
        if self.gate.is_busy() {
            warn!("write requested while another upload is running");
            return Err(MoonpostError::DeviceBusy);
        }
        if !config.can_connect() {
            info!("write requested but Moonraker is not configured");
            self.events.notice(configure_notice());
            return Err(MoonpostError::NotConfigured);
        }

        let format = if request.pre_sliced {
            OutputFormat::Gcode
        } else {
            request.format.unwrap_or(config.output_format)
        };
        let payload = self
            .writer
            .render(format, request.pre_sliced)
            .inspect_err(|e| error!(error = %e, "document could not be serialized"))?;

        let guard = self.gate.try_begin()?;
        let session = UploadSession {
            id: SessionId::new(),
            file_name: resolve_file_name(&request, &config, format),
            path: config.upload_path().to_string(),
            start_print: config.start_print_job(),
            format,
            payload,
            failures: 0,
            started: false,
            started_at: Utc::now(),
            config,
            _guard: guard,
        };

        info!(
            session = %session.id,
            file_name = %session.file_name,
            format = %format,
            bytes = session.payload.len(),
            sha256 = %hex::encode(Sha256::digest(&session.payload)),
            "write prepared"
        );
        Ok(session)
    }

    /// Drive `session` to a terminal state, publishing notices and the
    /// matching terminal event. The stage is `Ready` again before the
    /// terminal event goes out.
    ///
    /// A name or path the dialog hands back that fails validation ends the
    /// request before `WriteStarted`; only the notice is shown.
    #[instrument(skip_all, fields(printer = %self.printer_id, session = %session.id))]
    pub async fn run(&self, mut session: UploadSession) -> Result<UploadOutcome> {
        let result = self.drive(&mut session).await;

        let id = session.id;
        let started = session.started;
        let elapsed_ms = (Utc::now() - session.started_at).num_milliseconds();
        let config = Arc::clone(&session.config);
        let failure_notice = result
            .as_ref()
            .err()
            .map(|e| humanize_error(e, session.notice_context()));
        drop(session);

        match &result {
            Ok(UploadOutcome::Uploaded {
                file_name,
                print_started,
                ..
            }) => {
                info!(elapsed_ms, file_name = %file_name, "upload completed");
                self.events
                    .notice(self.success_notice(&config, file_name, *print_started));
                self.events.publish(DeviceEvent::WriteSuccess {
                    session: id,
                    file_name: file_name.clone(),
                });
            }
            Ok(UploadOutcome::Cancelled) => {
                info!("upload cancelled in dialog");
                self.events
                    .publish(DeviceEvent::WriteCancelled { session: id });
            }
            Ok(UploadOutcome::NotConfigured) => {}
            Err(e) => {
                error!(elapsed_ms, error = %e, "upload failed");
                if let Some(notice) = failure_notice {
                    self.events.notice(notice);
                }
                if started {
                    self.events.publish(DeviceEvent::WriteError {
                        session: id,
                        error: e.to_string(),
                    });
                }
            }
        }
        result
    }

    /// `begin` followed by `run`.
    pub async fn write(
        &self,
        config: Arc<PrinterConfig>,
        request: WriteRequest,
    ) -> Result<UploadOutcome> {
        let session = match self.begin(config, request) {
            Ok(session) => session,
            Err(MoonpostError::NotConfigured) => return Ok(UploadOutcome::NotConfigured),
            Err(e) => return Err(e),
        };
        self.run(session).await
    }

    async fn drive(&self, session: &mut UploadSession) -> Result<UploadOutcome> {
        if session.config.upload_dialog {
            if let Some(dialog) = &self.dialog {
                let proposal = UploadProposal {
                    file_name: session.file_name.clone(),
                    path: session.path.clone(),
                    start_print: session.start_print,
                    known_paths: session.config.upload_pathes.clone(),
                    path_editable: session.config.path_uploads,
                };
                match dialog.confirm(proposal.clone()).await {
                    DialogOutcome::Cancelled => return Ok(UploadOutcome::Cancelled),
                    DialogOutcome::Accepted(accepted) => {
                        self.apply_proposal(session, &proposal, accepted)?;
                    }
                }
            }
        }

        session.started = true;
        self.events
            .publish(DeviceEvent::WriteStarted { session: session.id });

        let client = MoonrakerClient::new(Arc::clone(&self.transport), &session.config);
        self.events.notice(self.connecting_notice(session));

        self.power_gate(&client, session).await?;
        self.wait_until_ready(&client, session).await?;

        self.events.notice(
            Notice::new(
                NoticeKind::Uploading,
                "Moonraker",
                format!("Uploading to {}...", self.printer_name),
            )
            .with_progress(0),
        );
        let file = UploadFile {
            file_name: session.file_name.clone(),
            path: session.config.path_uploads.then(|| session.path.clone()),
            start_print: session.start_print,
            data: std::mem::take(&mut session.payload),
        };
        client
            .upload(file, Some(self.progress_reporter(session.id)))
            .await?;

        Ok(UploadOutcome::Uploaded {
            file_name: session.file_name.clone(),
            path: session.path.clone(),
            print_started: session.start_print,
        })
    }

    /// Take over the dialog's fields and persist what should be remembered.
    fn apply_proposal(
        &self,
        session: &mut UploadSession,
        proposed: &UploadProposal,
        accepted: UploadProposal,
    ) -> Result<()> {
        let name = accepted.file_name.trim();
        validate_file_name(name)?;
        let path = strip_path(&accepted.path);
        validate_upload_path(path)?;

        session.file_name = ensure_extension(name, session.format);
        session.path = path.to_string();
        session.start_print = accepted.start_print;

        let remember = session.config.upload_remember_state;
        let history_changed = accepted.known_paths != proposed.known_paths;
        if remember || history_changed {
            let path = session.path.clone();
            let start_print = session.start_print;
            let known_paths = accepted.known_paths;
            let saved = self.store.update(&self.printer_id, |config| {
                if remember {
                    config.upload_path = path;
                    config.upload_start_print_job = Some(start_print);
                }
                if history_changed {
                    config.upload_pathes = known_paths;
                }
            });
            if let Err(e) = saved {
                warn!(error = %e, "cannot remember upload settings");
            }
        }
        debug!(file_name = %session.file_name, path = %session.path, "upload dialog accepted");
        Ok(())
    }

    /// Power the printer on, or restart its firmware, when a power device is
    /// configured and reports `off`. Only the first device is queried.
    async fn power_gate(&self, client: &MoonrakerClient, session: &UploadSession) -> Result<()> {
        let devices = session.config.power_devices();
        let Some(&first) = devices.first() else {
            return Ok(());
        };

        match client.power_device_status(first).await? {
            PowerState::Off if session.start_print => {
                let targets = if session.config.power_on_each_device {
                    devices.clone()
                } else {
                    vec![first]
                };
                info!(devices = ?targets, "switching printer power on");
                let mut results = join_all(targets.iter().map(|d| client.power_on(d)))
                    .await
                    .into_iter();
                if let Some(result) = results.next() {
                    result?;
                }
                for (device, result) in targets.iter().skip(1).zip(results) {
                    if let Err(e) = result {
                        warn!(device, error = %e, "power device did not switch on");
                    }
                }
            }
            PowerState::Off => {
                info!(device = first, "power device is off, restarting firmware");
                client.firmware_restart().await?;
            }
            state => debug!(device = first, state = %state, "power device needs no action"),
        }
        Ok(())
    }

    /// Poll the firmware state until it allows the upload, or time out.
    async fn wait_until_ready(
        &self,
        client: &MoonrakerClient,
        session: &mut UploadSession,
    ) -> Result<()> {
        let policy = RetryConfig::for_printer(&session.config);
        loop {
            let err = match client.printer_state().await {
                Ok(state) if retry::is_ready(&state, session.start_print) => {
                    info!(state = %state, attempt = session.failures + 1, "printer ready");
                    return Ok(());
                }
                Ok(state) => MoonpostError::PrinterNotReady { state },
                Err(e) => e,
            };

            session.failures += 1;
            match retry::should_retry(&err, session.failures, &policy) {
                RetryDecision::RetryAfter(delay) => {
                    debug!(attempt = session.failures, error = %err, "printer not ready yet");
                    self.events.notice(self.connecting_notice(session));
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::Exhausted => {
                    return Err(MoonpostError::ConnectionTimeout {
                        attempts: session.failures,
                        last_error: err.to_string(),
                    });
                }
                RetryDecision::GiveUp(_) => return Err(err),
            }
        }
    }

    fn connecting_notice(&self, session: &UploadSession) -> Notice {
        Notice::new(
            NoticeKind::Connecting,
            "Moonraker",
            retry::connecting_text(session.config.url.trim(), session.failures),
        )
    }

    fn success_notice(&self, config: &PrinterConfig, file_name: &str, print_started: bool) -> Notice {
        let text = format!(
            "Upload of '{file_name}' to {} successfully completed{}",
            self.printer_name,
            if print_started {
                " and print job initialized."
            } else {
                "."
            }
        );
        let notice = Notice::new(NoticeKind::Success, "Moonraker - Success", text).with_action(
            NoticeAction::OpenBrowser {
                url: config.browser_url().to_string(),
            },
        );
        if config.upload_autohide_messagebox {
            notice.with_lifetime(AUTOHIDE_LIFETIME)
        } else {
            notice
        }
    }

    /// Relay byte progress as whole percent, once per distinct value.
    fn progress_reporter(&self, session: SessionId) -> ProgressFn {
        let events = self.events.clone();
        let last = Arc::new(AtomicU16::new(u16::MAX));
        Arc::new(move |sent: u64, total: u64| {
            if total == 0 {
                return;
            }
            let percent = (sent.saturating_mul(100) / total).min(100) as u8;
            if last.swap(u16::from(percent), Ordering::Relaxed) != u16::from(percent) {
                events.publish(DeviceEvent::WriteProgress { session, percent });
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use async_trait::async_trait;
    use moonpost_core::prefs::MemoryPreferences;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::broadcast::Receiver;

    const STATUS: &str = "server/info";
    const POWER: &str = "machine/device_power/device";
    const RESTART: &str = "printer/firmware_restart";
    const UPLOAD: &str = "server/files/upload";

    struct StaticWriter {
        payload: Vec<u8>,
        fail: bool,
        formats: Mutex<Vec<OutputFormat>>,
    }

    impl StaticWriter {
        fn new(payload: &[u8]) -> Self {
            Self {
                payload: payload.to_vec(),
                fail: false,
                formats: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(b"")
            }
        }
    }

    impl DocumentWriter for StaticWriter {
        fn render(&self, format: OutputFormat, _pre_sliced: bool) -> Result<Vec<u8>> {
            self.formats.lock().unwrap().push(format);
            if self.fail {
                return Err(MoonpostError::Serialize("writer failed".into()));
            }
            Ok(self.payload.clone())
        }
    }

    /// Answers every proposal with a fixed outcome built from it.
    struct ScriptedDialog<F>(F);

    #[async_trait]
    impl<F> UploadDialog for ScriptedDialog<F>
    where
        F: Fn(UploadProposal) -> DialogOutcome + Send + Sync,
    {
        async fn confirm(&self, proposal: UploadProposal) -> DialogOutcome {
            (self.0)(proposal)
        }
    }

    struct Harness {
        transport: Arc<ScriptedTransport>,
        writer: Arc<StaticWriter>,
        store: ConfigStore,
        orchestrator: UploadOrchestrator,
        events: Receiver<DeviceEvent>,
    }

    fn harness_with(writer: StaticWriter) -> Harness {
        let transport = Arc::new(ScriptedTransport::new());
        let writer = Arc::new(writer);
        let store = ConfigStore::new(Arc::new(MemoryPreferences::new()));
        let bus = EventBus::new(256);
        let events = bus.subscribe();
        let orchestrator = UploadOrchestrator::new(
            "voron",
            "Voron 2.4",
            store.clone(),
            transport.clone(),
            writer.clone(),
            bus,
        );
        Harness {
            transport,
            writer,
            store,
            orchestrator,
            events,
        }
    }

    fn harness() -> Harness {
        harness_with(StaticWriter::new(b"G28\nG1 X10\n"))
    }

    fn config(start_print: bool) -> Arc<PrinterConfig> {
        Arc::new(PrinterConfig {
            url: "http://voron.local/".into(),
            upload_dialog: false,
            upload_start_print_job: Some(start_print),
            ..Default::default()
        })
    }

    fn status(state: &str) -> serde_json::Value {
        json!({ "result": { "klippy_state": state } })
    }

    fn drain(rx: &mut Receiver<DeviceEvent>) -> Vec<DeviceEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn upload_body(transport: &ScriptedTransport) -> String {
        let uploads = transport.requests_to(UPLOAD);
        assert_eq!(uploads.len(), 1, "expected exactly one upload");
        match &uploads[0].body {
            crate::http::RequestBody::Multipart(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            other => panic!("expected multipart body, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_twenty_one_non_ready_replies() {
        let mut h = harness();
        h.transport.reply_json(STATUS, status("startup"));

        let started = tokio::time::Instant::now();
        let result = h
            .orchestrator
            .write(config(true), WriteRequest::new("cube"))
            .await;

        match result {
            Err(MoonpostError::ConnectionTimeout { attempts, .. }) => assert_eq!(attempts, 21),
            other => panic!("expected timeout, got {other:?}"),
        }
        // One default interval between each of the 21 queries.
        assert_eq!(started.elapsed(), Duration::from_millis(500) * 20);
        assert_eq!(h.transport.requests_to(STATUS).len(), 21);
        assert!(h.transport.requests_to(UPLOAD).is_empty());
        assert_eq!(h.orchestrator.gate().stage(), Stage::Ready);

        let events = drain(&mut h.events);
        assert!(
            events
                .iter()
                .any(|e| matches!(e, DeviceEvent::WriteError { .. }))
        );
        assert!(events.iter().any(|e| matches!(
            e,
            DeviceEvent::Notice(n) if n.kind == NoticeKind::Error && n.text.contains("timed out")
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn polls_at_the_configured_interval() {
        let h = harness();
        h.transport.reply_json(STATUS, status("startup"));
        let config = Arc::new(PrinterConfig {
            retry_interval: "2".into(),
            ..(*config(true)).clone()
        });

        let started = tokio::time::Instant::now();
        let result = h.orchestrator.write(config, WriteRequest::new("cube")).await;

        assert!(matches!(result, Err(MoonpostError::ConnectionTimeout { .. })));
        assert_eq!(started.elapsed(), Duration::from_secs(2) * 20);
    }

    #[tokio::test(start_paused = true)]
    async fn ready_after_two_polls_waits_two_intervals() {
        let h = harness();
        h.transport.reply_json(STATUS, status("startup"));
        h.transport.reply_json(STATUS, status("startup"));
        h.transport.reply_json(STATUS, status("ready"));
        h.transport.reply(UPLOAD, 200, "{}");

        let started = tokio::time::Instant::now();
        h.orchestrator
            .write(config(true), WriteRequest::new("cube"))
            .await
            .expect("upload");
        assert_eq!(started.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn upload_only_accepts_startup() {
        let h = harness();
        h.transport.reply_json(STATUS, status("startup"));
        h.transport.reply_json(STATUS, status("ready"));
        h.transport.reply(UPLOAD, 201, r#"{"result":{}}"#);

        let outcome = h
            .orchestrator
            .write(config(false), WriteRequest::new("cube"))
            .await
            .expect("upload");

        assert!(matches!(outcome, UploadOutcome::Uploaded { print_started: false, .. }));
        assert_eq!(h.transport.requests_to(STATUS).len(), 1);
        assert!(!upload_body(&h.transport).contains("name=\"print\""));
    }

    #[tokio::test(start_paused = true)]
    async fn start_print_waits_for_ready() {
        let h = harness();
        h.transport.reply_json(STATUS, status("startup"));
        h.transport.reply_json(STATUS, status("startup"));
        h.transport.reply_json(STATUS, status("ready"));
        h.transport.reply(UPLOAD, 200, "{}");

        h.orchestrator
            .write(config(true), WriteRequest::new("cube"))
            .await
            .expect("upload");
        assert_eq!(h.transport.requests_to(STATUS).len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_while_polling_are_retried() {
        let h = harness();
        h.transport.fail(STATUS, "connection refused");
        h.transport.reply(STATUS, 200, "<html>booting</html>");
        h.transport.reply_json(STATUS, status("ready"));
        h.transport.reply(UPLOAD, 200, "{}");

        h.orchestrator
            .write(config(true), WriteRequest::new("cube"))
            .await
            .expect("upload");
        assert_eq!(h.transport.requests_to(STATUS).len(), 3);
    }

    #[tokio::test]
    async fn end_to_end_success_with_legacy_status_reply() {
        let mut h = harness();
        h.transport
            .reply_json(STATUS, json!({ "result": { "state": "ready" } }));
        h.transport.reply(UPLOAD, 200, "{}");

        let outcome = h
            .orchestrator
            .write(config(true), WriteRequest::new("cube"))
            .await
            .expect("upload");

        assert_eq!(
            outcome,
            UploadOutcome::Uploaded {
                file_name: "cube.gcode".into(),
                path: String::new(),
                print_started: true,
            }
        );
        assert!(h.transport.requests_to(POWER).is_empty());
        assert!(upload_body(&h.transport).contains("name=\"print\"\r\n\r\ntrue"));
        assert_eq!(h.orchestrator.gate().stage(), Stage::Ready);

        let events = drain(&mut h.events);
        assert!(matches!(events.first(), Some(DeviceEvent::StageChanged(Stage::Writing))));
        assert!(matches!(
            events.last(),
            Some(DeviceEvent::WriteSuccess { file_name, .. }) if file_name == "cube.gcode"
        ));
        let ready_at = events
            .iter()
            .position(|e| *e == DeviceEvent::StageChanged(Stage::Ready))
            .expect("ready event");
        assert!(ready_at < events.len() - 1, "stage resets before success is emitted");
        assert!(events.iter().any(|e| matches!(
            e,
            DeviceEvent::Notice(n) if n.kind == NoticeKind::Success
                && n.action == Some(NoticeAction::OpenBrowser { url: "http://voron.local/".into() })
                && n.lifetime.is_none()
        )));
    }

    #[tokio::test]
    async fn write_while_writing_is_busy() {
        let h = harness();
        h.transport.reply_json(STATUS, status("ready"));
        h.transport.reply(UPLOAD, 200, "{}");

        let session = h
            .orchestrator
            .begin(config(true), WriteRequest::new("first"))
            .expect("first session");
        assert!(h.orchestrator.gate().is_busy());

        let second = h
            .orchestrator
            .begin(config(true), WriteRequest::new("second"));
        assert!(matches!(second, Err(MoonpostError::DeviceBusy)));
        assert_eq!(h.writer.formats.lock().unwrap().len(), 1);

        let outcome = h.orchestrator.run(session).await.expect("first upload");
        assert!(matches!(outcome, UploadOutcome::Uploaded { file_name, .. } if file_name == "first.gcode"));
        assert!(!h.orchestrator.gate().is_busy());
    }

    #[tokio::test]
    async fn serialize_failure_never_reaches_network() {
        let mut h = harness_with(StaticWriter::failing());
        let result = h
            .orchestrator
            .write(config(true), WriteRequest::new("cube"))
            .await;

        assert!(matches!(result, Err(MoonpostError::Serialize(_))));
        assert!(h.transport.requests().is_empty());
        assert!(drain(&mut h.events).is_empty());
    }

    #[tokio::test]
    async fn pre_sliced_jobs_force_gcode() {
        let h = harness();
        let config = Arc::new(PrinterConfig {
            output_format: OutputFormat::Ufp,
            ..(*config(false)).clone()
        });
        let session = h
            .orchestrator
            .begin(config, WriteRequest::new("cube").pre_sliced(true))
            .expect("session");
        assert_eq!(session.format(), OutputFormat::Gcode);
        assert_eq!(session.file_name(), "cube.gcode");
        assert_eq!(*h.writer.formats.lock().unwrap(), vec![OutputFormat::Gcode]);
    }

    #[tokio::test]
    async fn source_format_overrides_printer_setting() {
        let h = harness();
        let session = h
            .orchestrator
            .begin(config(false), WriteRequest::new("cube").with_format(OutputFormat::Ufp))
            .expect("session");
        assert_eq!(session.format(), OutputFormat::Ufp);
        assert_eq!(session.file_name(), "cube.ufp");
        assert_eq!(*h.writer.formats.lock().unwrap(), vec![OutputFormat::Ufp]);
    }

    #[tokio::test]
    async fn unconfigured_printer_shows_configure_notice() {
        let mut h = harness();
        let outcome = h
            .orchestrator
            .write(Arc::new(PrinterConfig::default()), WriteRequest::new("cube"))
            .await
            .expect("outcome");

        assert_eq!(outcome, UploadOutcome::NotConfigured);
        assert!(h.transport.requests().is_empty());
        assert!(matches!(
            drain(&mut h.events).as_slice(),
            [DeviceEvent::Notice(n)] if n.kind == NoticeKind::Configure
        ));
    }

    #[tokio::test]
    async fn power_off_with_start_print_switches_every_device_on() {
        let h = harness();
        h.transport
            .reply_json(POWER, json!({ "result": { "printer": "off" } }));
        h.transport.reply_json(STATUS, status("ready"));
        h.transport.reply(UPLOAD, 200, "{}");
        let config = Arc::new(PrinterConfig {
            power_device: "printer, lights".into(),
            ..(*config(true)).clone()
        });

        h.orchestrator
            .write(config, WriteRequest::new("cube"))
            .await
            .expect("upload");

        let power = h.transport.requests_to(POWER);
        let urls: Vec<_> = power.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "http://voron.local/machine/device_power/device?device=printer",
                "http://voron.local/machine/device_power/device?device=printer&action=on",
                "http://voron.local/machine/device_power/device?device=lights&action=on",
            ]
        );
        assert!(h.transport.requests_to(RESTART).is_empty());
    }

    #[tokio::test]
    async fn failed_secondary_power_on_only_warns() {
        let h = harness();
        h.transport
            .reply_json(POWER, json!({ "result": { "printer": "off" } }));
        h.transport
            .reply_json(POWER, json!({ "result": { "printer": "on" } }));
        h.transport.reply(POWER, 500, "no such device");
        h.transport.reply_json(STATUS, status("ready"));
        h.transport.reply(UPLOAD, 200, "{}");
        let config = Arc::new(PrinterConfig {
            power_device: "printer,ghost".into(),
            ..(*config(true)).clone()
        });

        let outcome = h.orchestrator.write(config, WriteRequest::new("cube")).await;
        assert!(matches!(outcome, Ok(UploadOutcome::Uploaded { .. })));
    }

    #[tokio::test]
    async fn power_off_upload_only_restarts_firmware() {
        let h = harness();
        h.transport
            .reply_json(POWER, json!({ "result": { "printer": "off" } }));
        h.transport.reply(RESTART, 200, r#"{"result":"ok"}"#);
        h.transport.reply_json(STATUS, status("startup"));
        h.transport.reply(UPLOAD, 200, "{}");
        let config = Arc::new(PrinterConfig {
            power_device: "printer".into(),
            ..(*config(false)).clone()
        });

        h.orchestrator
            .write(config, WriteRequest::new("cube"))
            .await
            .expect("upload");

        assert_eq!(h.transport.requests_to(POWER).len(), 1);
        assert_eq!(h.transport.requests_to(RESTART).len(), 1);
    }

    #[tokio::test]
    async fn power_on_needs_no_action() {
        let h = harness();
        h.transport
            .reply_json(POWER, json!({ "result": { "printer": "on" } }));
        h.transport.reply_json(STATUS, status("ready"));
        h.transport.reply(UPLOAD, 200, "{}");
        let config = Arc::new(PrinterConfig {
            power_device: "printer".into(),
            ..(*config(true)).clone()
        });

        h.orchestrator
            .write(config, WriteRequest::new("cube"))
            .await
            .expect("upload");
        assert_eq!(h.transport.requests_to(POWER).len(), 1);
    }

    #[tokio::test]
    async fn power_status_failure_is_terminal() {
        let h = harness();
        h.transport.reply(POWER, 404, "device not found");
        let config = Arc::new(PrinterConfig {
            power_device: "printer".into(),
            ..(*config(true)).clone()
        });

        let result = h.orchestrator.write(config, WriteRequest::new("cube")).await;
        assert!(matches!(
            result,
            Err(MoonpostError::Transport { status: Some(404), .. })
        ));
        assert!(h.transport.requests_to(STATUS).is_empty());
        assert!(!h.orchestrator.gate().is_busy());
    }

    #[tokio::test]
    async fn upload_rejection_surfaces_raw_message() {
        let mut h = harness();
        h.transport.reply_json(STATUS, status("ready"));
        h.transport.reply(UPLOAD, 413, "Request Entity Too Large");

        let result = h
            .orchestrator
            .write(config(true), WriteRequest::new("cube"))
            .await;
        assert!(matches!(
            result,
            Err(MoonpostError::Transport { status: Some(413), .. })
        ));
        assert!(drain(&mut h.events).iter().any(|e| matches!(
            e,
            DeviceEvent::Notice(n) if n.text.contains("Request Entity Too Large")
        )));
    }

    #[tokio::test]
    async fn progress_is_reported_in_whole_percent() {
        let mut h = harness();
        h.transport.reply_json(STATUS, status("ready"));
        h.transport.reply(UPLOAD, 200, "{}");

        h.orchestrator
            .write(config(false), WriteRequest::new("cube"))
            .await
            .expect("upload");

        let percents: Vec<u8> = drain(&mut h.events)
            .into_iter()
            .filter_map(|e| match e {
                DeviceEvent::WriteProgress { percent, .. } => Some(percent),
                _ => None,
            })
            .collect();
        assert!(
            matches!(percents.as_slice(), [half, 100] if (49..=50).contains(half)),
            "unexpected progress {percents:?}"
        );
    }

    #[tokio::test]
    async fn translated_name_and_path_reach_the_form() {
        let h = harness();
        h.transport.reply_json(STATUS, status("ready"));
        h.transport.reply(UPLOAD, 200, "{}");
        let config = Arc::new(PrinterConfig {
            trans_input: " .".into(),
            trans_output: "_-".into(),
            upload_path: " /parts/v2/ ".into(),
            ..(*config(false)).clone()
        });

        h.orchestrator
            .write(config, WriteRequest::new("job").with_file_name("My Model.gcode"))
            .await
            .expect("upload");

        let body = upload_body(&h.transport);
        assert!(body.contains("filename=\"My_Model-gcode.gcode\""));
        assert!(body.contains("name=\"path\"\r\n\r\nparts/v2\r\n"));
        assert!(body.contains("name=\"root\"\r\n\r\ngcodes\r\n"));
    }

    #[tokio::test]
    async fn dialog_cancel_ends_without_network() {
        let mut h = harness();
        h.orchestrator = h
            .orchestrator
            .clone()
            .with_dialog(Arc::new(ScriptedDialog(|_: UploadProposal| DialogOutcome::Cancelled)));
        let config = Arc::new(PrinterConfig {
            upload_dialog: true,
            ..(*config(true)).clone()
        });

        let outcome = h
            .orchestrator
            .write(config, WriteRequest::new("cube"))
            .await
            .expect("outcome");

        assert_eq!(outcome, UploadOutcome::Cancelled);
        assert!(h.transport.requests().is_empty());
        assert!(
            drain(&mut h.events)
                .iter()
                .any(|e| matches!(e, DeviceEvent::WriteCancelled { .. }))
        );
        assert!(!h.orchestrator.gate().is_busy());
    }

    #[tokio::test]
    async fn dialog_edits_are_used_and_remembered() {
        let mut h = harness();
        h.transport.reply_json(STATUS, status("ready"));
        h.transport.reply(UPLOAD, 200, "{}");
        h.orchestrator = h
            .orchestrator
            .clone()
            .with_dialog(Arc::new(ScriptedDialog(|mut p: UploadProposal| {
                p.file_name = " renamed ".into();
                p.path = "/bench/".into();
                p.start_print = false;
                p.known_paths.push("bench".into());
                DialogOutcome::Accepted(p)
            })));
        let config = Arc::new(PrinterConfig {
            upload_dialog: true,
            upload_remember_state: true,
            ..(*config(true)).clone()
        });

        let outcome = h
            .orchestrator
            .write(config, WriteRequest::new("cube"))
            .await
            .expect("upload");

        assert_eq!(
            outcome,
            UploadOutcome::Uploaded {
                file_name: "renamed.gcode".into(),
                path: "bench".into(),
                print_started: false,
            }
        );
        let stored = h.store.get("voron");
        assert_eq!(stored.upload_path, "bench");
        assert_eq!(stored.upload_start_print_job, Some(false));
        assert_eq!(stored.upload_pathes, vec!["bench".to_string()]);
    }

    #[tokio::test]
    async fn dialog_name_with_forbidden_characters_is_rejected() {
        let mut h = harness();
        h.orchestrator = h
            .orchestrator
            .clone()
            .with_dialog(Arc::new(ScriptedDialog(|mut p: UploadProposal| {
                p.file_name = "what?.gcode".into();
                DialogOutcome::Accepted(p)
            })));
        let config = Arc::new(PrinterConfig {
            upload_dialog: true,
            ..(*config(true)).clone()
        });

        let result = h.orchestrator.write(config, WriteRequest::new("cube")).await;
        assert!(matches!(result, Err(MoonpostError::Validation { .. })));
        assert!(h.transport.requests().is_empty());
        assert!(!h.orchestrator.gate().is_busy());

        let events = drain(&mut h.events);
        assert!(!events.iter().any(|e| matches!(
            e,
            DeviceEvent::WriteStarted { .. } | DeviceEvent::WriteError { .. }
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            DeviceEvent::Notice(n) if n.title == "Moonraker - Invalid Input"
        )));
    }
}
