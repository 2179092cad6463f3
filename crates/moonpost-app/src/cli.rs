// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command-line interface definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use moonpost_bridge::desktop::FileDocumentWriter;
use moonpost_core::config::{PrinterConfig, redact};
use moonpost_core::types::{CameraRotation, OutputFormat, StatusApi, WriteRequest};

/// Upload print files to Moonraker/Klipper printers.
#[derive(Parser, Debug)]
#[command(name = "moonpost", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create or edit a printer's connection settings
    Configure(ConfigureArgs),
    /// Print stored settings with secrets hidden
    Show {
        /// Printer id; all printers when omitted
        printer: Option<String>,
    },
    /// Forget a printer's settings
    Delete { printer: String },
    /// Upload a print file
    Upload(UploadArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StatusApiArg {
    /// `server/info`, `klippy_state` (current Moonraker)
    ServerInfo,
    /// `printer/info`, `state` (older Moonraker)
    PrinterInfo,
}

impl From<StatusApiArg> for StatusApi {
    fn from(arg: StatusApiArg) -> Self {
        match arg {
            StatusApiArg::ServerInfo => Self::ServerInfo,
            StatusApiArg::PrinterInfo => Self::PrinterInfo,
        }
    }
}

/// Settings to change; omitted flags keep their stored value.
#[derive(Args, Debug, Default)]
pub struct ConfigureArgs {
    /// Printer id the settings belong to
    pub printer: String,
    /// Moonraker base URL, e.g. http://voron.local:7125
    #[arg(long)]
    pub url: Option<String>,
    #[arg(long)]
    pub api_key: Option<String>,
    #[arg(long)]
    pub http_user: Option<String>,
    #[arg(long)]
    pub http_password: Option<String>,
    /// Comma-separated [power] device names from moonraker.conf
    #[arg(long)]
    pub power_device: Option<String>,
    /// Seconds between readiness polls
    #[arg(long)]
    pub retry_interval: Option<String>,
    /// Web frontend opened after a successful upload
    #[arg(long)]
    pub frontend_url: Option<String>,
    /// gcode or ufp
    #[arg(long)]
    pub output_format: Option<String>,
    #[arg(long)]
    pub upload_dialog: Option<bool>,
    /// Directory below gcodes to upload into
    #[arg(long)]
    pub upload_path: Option<String>,
    #[arg(long)]
    pub start_print: Option<bool>,
    #[arg(long)]
    pub remember_state: Option<bool>,
    /// Hide the success notice after a while
    #[arg(long)]
    pub autohide: Option<bool>,
    /// Characters to replace in file names
    #[arg(long)]
    pub trans_input: Option<String>,
    /// Replacement characters, same count as --trans-input
    #[arg(long)]
    pub trans_output: Option<String>,
    /// Characters to delete from file names
    #[arg(long)]
    pub trans_remove: Option<String>,
    #[arg(long)]
    pub camera_url: Option<String>,
    /// 0, 90, 180 or 270
    #[arg(long)]
    pub camera_rotation: Option<i64>,
    #[arg(long)]
    pub camera_mirror: Option<bool>,
    #[arg(long, value_enum)]
    pub status_api: Option<StatusApiArg>,
    /// The host accepts uploads into subdirectories
    #[arg(long)]
    pub path_uploads: Option<bool>,
    /// Switch on every power device, not only the first
    #[arg(long)]
    pub power_on_each_device: Option<bool>,
}

impl ConfigureArgs {
    /// Overlay the given flags onto `config`.
    pub fn apply(&self, config: &mut PrinterConfig) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(value) = value {
                *target = value.clone();
            }
        }

        set(&mut config.url, &self.url);
        set(&mut config.api_key, &self.api_key);
        set(&mut config.http_user, &self.http_user);
        set(&mut config.http_password, &self.http_password);
        set(&mut config.power_device, &self.power_device);
        set(&mut config.retry_interval, &self.retry_interval);
        set(&mut config.frontend_url, &self.frontend_url);
        set(&mut config.upload_dialog, &self.upload_dialog);
        set(&mut config.upload_path, &self.upload_path);
        set(&mut config.upload_remember_state, &self.remember_state);
        set(&mut config.upload_autohide_messagebox, &self.autohide);
        set(&mut config.trans_input, &self.trans_input);
        set(&mut config.trans_output, &self.trans_output);
        set(&mut config.trans_remove, &self.trans_remove);
        set(&mut config.camera_url, &self.camera_url);
        set(&mut config.camera_image_mirror, &self.camera_mirror);
        set(&mut config.path_uploads, &self.path_uploads);
        set(&mut config.power_on_each_device, &self.power_on_each_device);

        if let Some(format) = &self.output_format {
            config.output_format = OutputFormat::normalize(format);
        }
        if let Some(start) = self.start_print {
            config.upload_start_print_job = Some(start);
        }
        if let Some(degrees) = self.camera_rotation {
            config.camera_image_rotation = CameraRotation::from_degrees(degrees);
        }
        if let Some(api) = self.status_api {
            config.status_api = api.into();
        }
    }
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Printer id to upload to
    pub printer: String,
    /// Sliced .gcode or .ufp file
    pub file: PathBuf,
    /// Upload name without extension; defaults to the file's stem
    #[arg(long)]
    pub name: Option<String>,
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
    /// Open the printer's web frontend after a successful upload
    #[arg(long)]
    pub open: bool,
}

impl UploadArgs {
    /// Request for the file as it is on disk: its own format, G-code marked
    /// pre-sliced.
    pub fn write_request(&self) -> WriteRequest {
        let stem = self
            .file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "print".to_string());
        let format = FileDocumentWriter::new(&self.file).detected_format();
        WriteRequest::new(self.name.clone().unwrap_or(stem))
            .with_format(format)
            .pre_sliced(format == OutputFormat::Gcode)
    }
}

/// Stored config as JSON with secrets replaced by "set"/"<empty>".
pub fn redacted_json(config: &PrinterConfig) -> serde_json::Value {
    let mut value = serde_json::to_value(config).unwrap_or_default();
    if let Some(object) = value.as_object_mut() {
        object.insert("api_key".into(), redact(&config.api_key).into());
        object.insert("http_password".into(), redact(&config.http_password).into());
    }
    value
}
