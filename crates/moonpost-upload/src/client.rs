// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Async Moonraker client.
//
// Builds authenticated requests for the handful of endpoints the upload flow
// needs:
//   - firmware status          (server/info or printer/info)
//   - power device status/on   (machine/device_power/device)
//   - firmware restart         (printer/firmware_restart)
//   - file upload              (server/files/upload)

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, error, info, instrument};

use moonpost_core::config::PrinterConfig;
use moonpost_core::error::{MoonpostError, Result};
use moonpost_core::types::StatusApi;

use crate::http::{HttpRequest, HttpResponse, HttpTransport, Method, ProgressFn, RequestBody};
use crate::multipart::MultipartForm;
use crate::protocol::{self, PowerState};

/// Sent with every request.
pub const USER_AGENT: &str = concat!("Moonpost/", env!("CARGO_PKG_VERSION"));

const ACCEPT: &str = "application/json, text/plain";

/// A print file ready to be sent.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    /// Directory below `gcodes`; `None` uploads to the root.
    pub path: Option<String>,
    /// Ask Moonraker to start printing once the upload completes.
    pub start_print: bool,
    pub data: Vec<u8>,
}

/// Client bound to one Moonraker instance.
///
/// Credentials are taken from the config once, at construction.
pub struct MoonrakerClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    api_key: String,
    /// Pre-encoded `Authorization` header value.
    basic_auth: Option<String>,
    status_api: StatusApi,
}

impl std::fmt::Debug for MoonrakerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MoonrakerClient")
            .field("base_url", &self.base_url)
            .field("api_key", &moonpost_core::config::redact(&self.api_key))
            .field("basic_auth", &self.basic_auth.is_some())
            .field("status_api", &self.status_api)
            .finish()
    }
}

impl MoonrakerClient {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &PrinterConfig) -> Self {
        let mut base_url = config.url.trim().to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        let user = config.http_user.trim();
        let password = config.http_password.trim();
        let basic_auth = (!user.is_empty() && !password.is_empty())
            .then(|| format!("Basic {}", STANDARD.encode(format!("{user}:{password}"))));

        Self {
            transport,
            base_url,
            api_key: config.api_key.trim().to_string(),
            basic_auth,
            status_api: config.status_api,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            ("User-Agent".to_string(), USER_AGENT.to_string()),
            ("Accept".to_string(), ACCEPT.to_string()),
            ("Connection".to_string(), "keep-alive".to_string()),
        ];
        if !self.api_key.is_empty() {
            headers.push(("X-API-Key".to_string(), self.api_key.clone()));
        }
        if let Some(auth) = &self.basic_auth {
            headers.push(("Authorization".to_string(), auth.clone()));
        }
        headers
    }

    fn request(
        &self,
        operation: &'static str,
        method: Method,
        path_and_query: &str,
        body: RequestBody,
    ) -> HttpRequest {
        HttpRequest {
            operation,
            method,
            url: format!("{}{path_and_query}", self.base_url),
            headers: self.headers(),
            body,
        }
    }

    fn json_request(
        &self,
        operation: &'static str,
        path_and_query: &str,
        body: &serde_json::Value,
    ) -> Result<HttpRequest> {
        let mut request = self.request(
            operation,
            Method::Post,
            path_and_query,
            RequestBody::Json(serde_json::to_vec(body)?),
        );
        request
            .headers
            .push(("Content-Type".to_string(), "application/json".to_string()));
        Ok(request)
    }

    pub fn status_request(&self) -> HttpRequest {
        self.request(
            "status",
            Method::Get,
            self.status_api.endpoint(),
            RequestBody::Empty,
        )
    }

    pub fn power_status_request(&self, device: &str) -> HttpRequest {
        self.request(
            "power status",
            Method::Get,
            &protocol::power_device_query(device),
            RequestBody::Empty,
        )
    }

    pub fn power_on_request(&self, device: &str) -> Result<HttpRequest> {
        self.json_request(
            "power on",
            &protocol::power_on_query(device),
            &serde_json::json!({}),
        )
    }

    pub fn firmware_restart_request(&self) -> HttpRequest {
        self.request(
            "firmware restart",
            Method::Post,
            protocol::FIRMWARE_RESTART_ENDPOINT,
            RequestBody::Empty,
        )
    }

    /// Multipart upload request. Consumes the file to avoid copying the payload.
    pub fn upload_request(&self, file: UploadFile) -> HttpRequest {
        let mut form = MultipartForm::new().file(
            "file",
            file.file_name,
            "application/octet-stream",
            file.data,
        );
        form = form.text("root", "gcodes");
        if let Some(path) = file.path.filter(|p| !p.is_empty()) {
            form = form.text("path", path);
        }
        if file.start_print {
            form = form.text("print", "true");
        }

        let content_type = form.content_type();
        let mut request = self.request(
            "upload",
            Method::Post,
            protocol::UPLOAD_ENDPOINT,
            RequestBody::Multipart(form.encode()),
        );
        request
            .headers
            .push(("Content-Type".to_string(), content_type));
        request
    }

    /// Send and require a 2xx answer.
    async fn execute(
        &self,
        request: HttpRequest,
        progress: Option<ProgressFn>,
    ) -> Result<HttpResponse> {
        let operation = request.operation;
        let response = self.transport.send(request, progress).await?;
        if !response.is_success() {
            error!(operation, status = response.status, "Moonraker rejected request");
            return Err(MoonpostError::Transport {
                operation: operation.to_string(),
                status: Some(response.status),
                message: response.text().trim().to_string(),
            });
        }
        Ok(response)
    }

    /// Current firmware state, e.g. `ready`, `startup`, `shutdown`, `error`.
    #[instrument(skip(self), fields(url = %self.base_url))]
    pub async fn printer_state(&self) -> Result<String> {
        let response = self.execute(self.status_request(), None).await?;
        let state = protocol::parse_printer_state(self.status_api, &response.body)?;
        debug!(state = %state, "printer status");
        Ok(state)
    }

    #[instrument(skip(self), fields(url = %self.base_url))]
    pub async fn power_device_status(&self, device: &str) -> Result<PowerState> {
        let response = self.execute(self.power_status_request(device), None).await?;
        let state = protocol::parse_power_state(device, &response.body)?;
        debug!(state = %state, "power device status");
        Ok(state)
    }

    #[instrument(skip(self), fields(url = %self.base_url))]
    pub async fn power_on(&self, device: &str) -> Result<()> {
        let response = self.execute(self.power_on_request(device)?, None).await?;
        protocol::parse_result(protocol::POWER_DEVICE_ENDPOINT, &response.body)?;
        info!("power device switched on");
        Ok(())
    }

    #[instrument(skip(self), fields(url = %self.base_url))]
    pub async fn firmware_restart(&self) -> Result<()> {
        self.execute(self.firmware_restart_request(), None).await?;
        info!("firmware restart requested");
        Ok(())
    }

    /// Upload `file`, reporting `(sent, total)` bytes through `progress`.
    #[instrument(
        skip(self, file, progress),
        fields(url = %self.base_url, file = %file.file_name, bytes = file.data.len())
    )]
    pub async fn upload(&self, file: UploadFile, progress: Option<ProgressFn>) -> Result<()> {
        let start_print = file.start_print;
        let response = self.execute(self.upload_request(file), progress).await?;
        debug!(reply = %response.text(), "upload reply");
        info!(start_print, "upload accepted");
        Ok(())
    }
}
