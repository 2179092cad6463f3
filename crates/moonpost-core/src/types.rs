// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for Moonpost.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Output format of the uploaded print file.
///
/// Anything other than `ufp` normalizes to `gcode`, so a stored config can
/// never hold a third value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OutputFormat {
    #[default]
    Gcode,
    /// Ultimaker Format Package (zip container with G-code and thumbnails).
    Ufp,
}

impl OutputFormat {
    pub fn normalize(raw: &str) -> Self {
        if raw.trim() == "ufp" {
            Self::Ufp
        } else {
            Self::Gcode
        }
    }

    /// File extension without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Gcode => "gcode",
            Self::Ufp => "ufp",
        }
    }
}

impl From<String> for OutputFormat {
    fn from(raw: String) -> Self {
        Self::normalize(&raw)
    }
}

impl From<OutputFormat> for String {
    fn from(format: OutputFormat) -> Self {
        format.extension().to_string()
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Lifecycle stage of an output device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    /// Idle, accepts new write requests.
    #[default]
    Ready,
    /// A session is in flight; further write requests are rejected.
    Writing,
}

/// Camera image rotation in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RotationRepr", into = "String")]
pub enum CameraRotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RotationRepr {
    Text(String),
    Number(i64),
}

impl CameraRotation {
    /// Parse a stored rotation. Anything but 0/90/180/270 is coerced to 0.
    pub fn from_degrees(degrees: i64) -> Self {
        match degrees {
            90 => Self::Cw90,
            180 => Self::Cw180,
            270 => Self::Cw270,
            _ => Self::None,
        }
    }

    pub fn degrees(&self) -> u16 {
        match self {
            Self::None => 0,
            Self::Cw90 => 90,
            Self::Cw180 => 180,
            Self::Cw270 => 270,
        }
    }
}

impl From<RotationRepr> for CameraRotation {
    fn from(repr: RotationRepr) -> Self {
        match repr {
            RotationRepr::Text(text) => text
                .trim()
                .parse::<i64>()
                .map(Self::from_degrees)
                .unwrap_or_default(),
            RotationRepr::Number(n) => Self::from_degrees(n),
        }
    }
}

impl From<CameraRotation> for String {
    fn from(rotation: CameraRotation) -> Self {
        rotation.degrees().to_string()
    }
}

/// Which status endpoint the printer host exposes.
///
/// Older Moonraker releases report the firmware state as `state` on
/// `printer/info`; newer ones report `klippy_state` on `server/info`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusApi {
    #[default]
    ServerInfo,
    PrinterInfo,
}

impl StatusApi {
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::ServerInfo => "server/info",
            Self::PrinterInfo => "printer/info",
        }
    }

    /// Name of the field inside `result` holding the firmware state.
    pub fn state_field(&self) -> &'static str {
        match self {
            Self::ServerInfo => "klippy_state",
            Self::PrinterInfo => "state",
        }
    }
}

/// Classification of errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Network blip, printer still booting, or a garbled reply. Safe to poll again.
    Transient,
    /// User must take action (fix configuration, rename the file).
    UserAction,
    /// Permanent failure; nothing a retry can change.
    Permanent,
}

/// What the host knows about the job being written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    /// File name explicitly chosen by the caller; only its base name is used.
    pub file_name: Option<String>,
    /// Display name of the print job, used when no file name is given.
    pub job_name: String,
    /// The job was already sliced upstream, so only raw G-code can be sent.
    pub pre_sliced: bool,
    /// Format the source already has, overriding the printer's setting.
    pub format: Option<OutputFormat>,
}

impl WriteRequest {
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            file_name: None,
            job_name: job_name.into(),
            pre_sliced: false,
            format: None,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn pre_sliced(mut self, pre_sliced: bool) -> Self {
        self.pre_sliced = pre_sliced;
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = Some(format);
        self
    }
}

/// Kind of notice shown to the user; drives icon and placement in the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Help text for a printer that has no usable connection settings.
    Configure,
    /// Waiting for the printer to come online.
    Connecting,
    /// File transfer in progress.
    Uploading,
    Success,
    Error,
}

/// Action button attached to a notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoticeAction {
    /// Open the printer's web frontend in a browser.
    OpenBrowser { url: String },
}

/// A user-facing message emitted by an output device.
///
/// A new notice from the same device replaces the previous one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub title: String,
    pub text: String,
    /// How long the host should keep it visible; `None` keeps it until dismissed.
    pub lifetime: Option<Duration>,
    /// Percentage for progress notices.
    pub progress: Option<u8>,
    pub action: Option<NoticeAction>,
}

impl Notice {
    pub fn new(kind: NoticeKind, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            text: text.into(),
            lifetime: None,
            progress: None,
            action: None,
        }
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    pub fn with_progress(mut self, percent: u8) -> Self {
        self.progress = Some(percent.min(100));
        self
    }

    pub fn with_action(mut self, action: NoticeAction) -> Self {
        self.action = Some(action);
        self
    }
}
