// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-printer connection settings and the validators behind the settings
// form. Field names match the keys of the stored preference blob so that
// configs written by earlier plugin releases load unchanged.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MoonpostError, Result};
use crate::types::{CameraRotation, OutputFormat, StatusApi};

/// Wait between readiness polls when no valid interval is configured.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Characters that may not appear in an upload file name or path.
pub const FORBIDDEN_CHARACTERS: &str = ":*?\"<>|";

/// Connection and upload settings for one printer.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterConfig {
    /// Base URL of the Moonraker instance, always ending in `/` once saved.
    pub url: String,
    pub api_key: String,
    pub http_user: String,
    pub http_password: String,
    /// Comma-separated `[power ...]` device names from moonraker.conf.
    pub power_device: String,
    /// Seconds between readiness polls, as typed by the user.
    pub retry_interval: String,
    /// Web frontend (Mainsail, Fluidd) opened from the success notice.
    pub frontend_url: String,
    pub output_format: OutputFormat,
    pub upload_dialog: bool,
    pub upload_path: String,
    /// Paths offered by the upload dialog.
    pub upload_pathes: Vec<String>,
    /// `None` means "keep whatever is stored" when saving.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_start_print_job: Option<bool>,
    pub upload_remember_state: bool,
    pub upload_autohide_messagebox: bool,
    pub trans_input: String,
    pub trans_output: String,
    pub trans_remove: String,
    pub camera_url: String,
    pub camera_image_rotation: CameraRotation,
    pub camera_image_mirror: bool,
    pub status_api: StatusApi,
    /// The host accepts a `path` form field to upload into subdirectories.
    pub path_uploads: bool,
    /// Send one power-on request per device instead of only the first.
    pub power_on_each_device: bool,
    /// Keys written by other plugin versions, carried through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            http_user: String::new(),
            http_password: String::new(),
            power_device: String::new(),
            retry_interval: String::new(),
            frontend_url: String::new(),
            output_format: OutputFormat::Gcode,
            upload_dialog: true,
            upload_path: String::new(),
            upload_pathes: Vec::new(),
            upload_start_print_job: None,
            upload_remember_state: false,
            upload_autohide_messagebox: false,
            trans_input: String::new(),
            trans_output: String::new(),
            trans_remove: String::new(),
            camera_url: String::new(),
            camera_image_rotation: CameraRotation::None,
            camera_image_mirror: false,
            status_api: StatusApi::ServerInfo,
            path_uploads: true,
            power_on_each_device: true,
            extra: serde_json::Map::new(),
        }
    }
}

impl std::fmt::Debug for PrinterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrinterConfig")
            .field("url", &self.url)
            .field("api_key", &redact(&self.api_key))
            .field("http_user", &self.http_user)
            .field("http_password", &redact(&self.http_password))
            .field("power_device", &self.power_device)
            .field("retry_interval", &self.retry_interval)
            .field("frontend_url", &self.frontend_url)
            .field("output_format", &self.output_format)
            .field("upload_dialog", &self.upload_dialog)
            .field("upload_path", &self.upload_path)
            .field("upload_pathes", &self.upload_pathes)
            .field("upload_start_print_job", &self.upload_start_print_job)
            .field("upload_remember_state", &self.upload_remember_state)
            .field("upload_autohide_messagebox", &self.upload_autohide_messagebox)
            .field("trans_input", &self.trans_input)
            .field("trans_output", &self.trans_output)
            .field("trans_remove", &self.trans_remove)
            .field("camera_url", &self.camera_url)
            .field("camera_image_rotation", &self.camera_image_rotation)
            .field("camera_image_mirror", &self.camera_image_mirror)
            .field("status_api", &self.status_api)
            .field("path_uploads", &self.path_uploads)
            .field("power_on_each_device", &self.power_on_each_device)
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Log-safe rendering of a secret: only whether it is set.
pub fn redact(secret: &str) -> &'static str {
    if secret.is_empty() { "<empty>" } else { "set" }
}

impl PrinterConfig {
    /// Whether the URL is good enough to attempt a connection.
    pub fn can_connect(&self) -> bool {
        validate_url(self.url.trim())
    }

    /// Configured power devices in order, blanks dropped.
    pub fn power_devices(&self) -> Vec<&str> {
        self.power_device
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect()
    }

    /// Poll interval, falling back to [`DEFAULT_RETRY_INTERVAL`] when the
    /// stored text is empty or not a usable number.
    pub fn retry_interval(&self) -> Duration {
        parse_retry_interval(&self.retry_interval).unwrap_or(DEFAULT_RETRY_INTERVAL)
    }

    pub fn start_print_job(&self) -> bool {
        self.upload_start_print_job.unwrap_or(false)
    }

    /// Where "Open Browser" should point.
    pub fn browser_url(&self) -> &str {
        let frontend = self.frontend_url.trim();
        if frontend.is_empty() {
            self.url.trim()
        } else {
            frontend
        }
    }

    /// Upload path with surrounding whitespace and slashes removed.
    pub fn upload_path(&self) -> &str {
        strip_path(&self.upload_path)
    }

    /// Check every user-editable field; report the first problem.
    pub fn validate(&self) -> Result<()> {
        if !validate_url(self.url.trim()) {
            return Err(MoonpostError::validation(
                "url",
                "must start with http:// or https:// and must not contain credentials",
            ));
        }
        let frontend = self.frontend_url.trim();
        if !frontend.is_empty() && !validate_url(frontend) {
            return Err(MoonpostError::validation(
                "frontend_url",
                "must start with http:// or https://",
            ));
        }
        if !validate_retry_interval(&self.retry_interval) {
            return Err(MoonpostError::validation(
                "retry_interval",
                "must be a non-negative number of seconds",
            ));
        }
        if !validate_translation(&self.trans_input, &self.trans_output) {
            return Err(MoonpostError::validation(
                "trans_output",
                "must have as many characters as the input set",
            ));
        }
        Ok(())
    }
}

/// Accept only plain `http(s)://` URLs.
///
/// UNC paths are refused, and so is `@` because basic-auth credentials
/// belong in the separate user/password fields.
pub fn validate_url(url: &str) -> bool {
    if url.is_empty() || url.starts_with("\\\\") || url.contains('@') {
        return false;
    }
    ["http://", "https://"]
        .iter()
        .any(|scheme| url.len() > scheme.len() && url.starts_with(scheme))
}

/// Empty means "use the default"; otherwise a non-negative number of
/// seconds that fits in a `Duration`.
pub fn validate_retry_interval(value: &str) -> bool {
    value.trim().is_empty() || parse_retry_interval(value).is_some()
}

fn parse_retry_interval(value: &str) -> Option<Duration> {
    let secs = value.trim().parse::<f64>().ok()?;
    if secs < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs).ok()
}

/// Translation input and output form a per-character substitution table.
pub fn validate_translation(input: &str, output: &str) -> bool {
    input.chars().count() == output.chars().count()
}

pub fn strip_path(path: &str) -> &str {
    path.trim_matches(|c: char| c.is_whitespace() || c == '/')
}

/// Check a file name accepted from the upload dialog.
pub fn validate_file_name(name: &str) -> Result<()> {
    if name.chars().any(|c| FORBIDDEN_CHARACTERS.contains(c)) {
        return Err(MoonpostError::validation(
            "file name",
            format!("cannot contain {FORBIDDEN_CHARACTERS}"),
        ));
    }
    if name == "." || name == ".." {
        return Err(MoonpostError::validation(
            "file name",
            "cannot be \".\" or \"..\"",
        ));
    }
    if name.is_empty() {
        return Err(MoonpostError::validation("file name", "too short"));
    }
    Ok(())
}

/// Check an upload path accepted from the upload dialog. Empty is the root.
pub fn validate_upload_path(path: &str) -> Result<()> {
    if path.chars().any(|c| FORBIDDEN_CHARACTERS.contains(c)) {
        return Err(MoonpostError::validation(
            "path",
            format!("cannot contain {FORBIDDEN_CHARACTERS}"),
        ));
    }
    if path == "." || path == ".." {
        return Err(MoonpostError::validation("path", "cannot be \".\" or \"..\""));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_validation() {
        assert!(validate_url("https://host/"));
        assert!(validate_url("http://192.168.1.20:7125/"));
        assert!(!validate_url("ftp://x"));
        assert!(!validate_url("\\\\host\\share"));
        assert!(!validate_url("https://user@host"));
        assert!(!validate_url("https://"));
        assert!(!validate_url(""));
    }

    #[test]
    fn retry_interval_validation() {
        assert!(validate_retry_interval(""));
        assert!(validate_retry_interval("2"));
        assert!(validate_retry_interval("0.25"));
        assert!(!validate_retry_interval("soon"));
        assert!(!validate_retry_interval("-1"));
        assert!(!validate_retry_interval("NaN"));
        assert!(!validate_retry_interval("inf"));
        assert!(!validate_retry_interval("1e300"));
    }

    #[test]
    fn oversized_retry_interval_falls_back_to_default() {
        let config = PrinterConfig {
            url: "http://voron.local/".into(),
            retry_interval: "1e300".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(config.retry_interval(), DEFAULT_RETRY_INTERVAL);

        let config = PrinterConfig {
            retry_interval: "2".into(),
            ..Default::default()
        };
        assert_eq!(config.retry_interval(), Duration::from_secs(2));
    }

    #[test]
    fn translation_validation_counts_characters() {
        assert!(!validate_translation("ab", "a"));
        assert!(validate_translation("ab", "xy"));
        assert!(validate_translation("äö", "ao"));
        assert!(validate_translation("", ""));
    }

    #[test]
    fn retry_interval_falls_back_to_default() {
        let mut config = PrinterConfig::default();
        assert_eq!(config.retry_interval(), DEFAULT_RETRY_INTERVAL);
        config.retry_interval = "2.5".into();
        assert_eq!(config.retry_interval(), Duration::from_millis(2500));
        config.retry_interval = "later".into();
        assert_eq!(config.retry_interval(), DEFAULT_RETRY_INTERVAL);
    }

    #[test]
    fn power_devices_drop_blanks() {
        let config = PrinterConfig {
            power_device: " printer , , lights".into(),
            ..Default::default()
        };
        assert_eq!(config.power_devices(), vec!["printer", "lights"]);
        assert!(PrinterConfig::default().power_devices().is_empty());
    }

    #[test]
    fn browser_url_prefers_frontend() {
        let mut config = PrinterConfig {
            url: "http://voron.local/".into(),
            ..Default::default()
        };
        assert_eq!(config.browser_url(), "http://voron.local/");
        config.frontend_url = "http://voron.local:81/".into();
        assert_eq!(config.browser_url(), "http://voron.local:81/");
    }

    #[test]
    fn file_name_rules() {
        assert!(validate_file_name("benchy.gcode").is_ok());
        assert!(validate_file_name("bench?.gcode").is_err());
        assert!(validate_file_name("..").is_err());
        assert!(validate_file_name("").is_err());
        assert!(validate_upload_path("").is_ok());
        assert!(validate_upload_path("parts/v2").is_ok());
        assert!(validate_upload_path("a|b").is_err());
        assert!(validate_upload_path(".").is_err());
    }

    #[test]
    fn strip_path_removes_slashes_and_whitespace() {
        assert_eq!(strip_path("  /parts/v2/ "), "parts/v2");
        assert_eq!(strip_path("///"), "");
    }

    #[test]
    fn validate_reports_first_bad_field() {
        let config = PrinterConfig {
            url: "http://voron.local/".into(),
            trans_input: "ab".into(),
            trans_output: "a".into(),
            ..Default::default()
        };
        match config.validate() {
            Err(MoonpostError::Validation { field, .. }) => assert_eq!(field, "trans_output"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn legacy_blob_loads_with_defaults() {
        let raw = r#"{"url":"http://voron.local/","output_format":"3mf","camera_image_rotation":"90","theme":"dark"}"#;
        let config: PrinterConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.output_format, OutputFormat::Gcode);
        assert_eq!(config.camera_image_rotation, CameraRotation::Cw90);
        assert!(config.upload_dialog);
        assert_eq!(config.upload_start_print_job, None);
        assert_eq!(config.extra.get("theme"), Some(&serde_json::json!("dark")));
    }

    #[test]
    fn debug_hides_secrets() {
        let config = PrinterConfig {
            api_key: "hunter2".into(),
            ..Default::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("set"));
    }
}
