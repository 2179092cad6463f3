// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Moonraker wire format: endpoint paths and reply parsing.
//
// Every JSON reply wraps its payload in a top-level `result` member. A reply
// that is not JSON or lacks the expected member is a `MalformedResponse`.

use serde_json::Value;

use moonpost_core::error::{MoonpostError, Result};
use moonpost_core::types::StatusApi;

pub const POWER_DEVICE_ENDPOINT: &str = "machine/device_power/device";
pub const FIRMWARE_RESTART_ENDPOINT: &str = "printer/firmware_restart";
pub const UPLOAD_ENDPOINT: &str = "server/files/upload";

/// Firmware state in which a print can be started.
pub const READY_STATE: &str = "ready";
/// Firmware state reported after a fatal error.
pub const ERROR_STATE: &str = "error";

/// State of a `[power]` device as Moonraker reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowerState {
    On,
    Off,
    /// `init`, `error` or anything else the device plugin reports.
    Other(String),
}

impl PowerState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "on" => Self::On,
            "off" => Self::Off,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::On => f.write_str("on"),
            Self::Off => f.write_str("off"),
            Self::Other(raw) => f.write_str(raw),
        }
    }
}

/// `machine/device_power/device?device=<name>` with the name URL-encoded.
pub fn power_device_query(device: &str) -> String {
    format!(
        "{POWER_DEVICE_ENDPOINT}?device={}",
        urlencoding::encode(device)
    )
}

/// Query string that switches `device` on.
pub fn power_on_query(device: &str) -> String {
    format!("{}&action=on", power_device_query(device))
}

fn malformed(endpoint: &str, detail: impl Into<String>) -> MoonpostError {
    MoonpostError::MalformedResponse {
        endpoint: endpoint.to_string(),
        detail: detail.into(),
    }
}

/// Parse `body` as JSON and return its `result` member.
pub fn parse_result(endpoint: &str, body: &[u8]) -> Result<Value> {
    let mut value: Value =
        serde_json::from_slice(body).map_err(|e| malformed(endpoint, format!("not JSON: {e}")))?;
    match value.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(malformed(endpoint, "missing 'result'")),
    }
}

/// Firmware state from a status reply.
///
/// The field preferred by `api` is read first; the other generation's field
/// is accepted as well so either Moonraker release works without
/// reconfiguration.
pub fn parse_printer_state(api: StatusApi, body: &[u8]) -> Result<String> {
    let result = parse_result(api.endpoint(), body)?;
    let fallback = match api {
        StatusApi::ServerInfo => StatusApi::PrinterInfo,
        StatusApi::PrinterInfo => StatusApi::ServerInfo,
    };
    [api.state_field(), fallback.state_field()]
        .iter()
        .find_map(|field| result.get(*field).and_then(Value::as_str))
        .map(str::to_string)
        .ok_or_else(|| malformed(api.endpoint(), format!("missing '{}'", api.state_field())))
}

/// State of `device` from a power status reply.
pub fn parse_power_state(device: &str, body: &[u8]) -> Result<PowerState> {
    let result = parse_result(POWER_DEVICE_ENDPOINT, body)?;
    let object = result
        .as_object()
        .ok_or_else(|| malformed(POWER_DEVICE_ENDPOINT, "'result' is not an object"))?;
    object
        .get(device)
        .or_else(|| object.values().next())
        .and_then(Value::as_str)
        .map(PowerState::parse)
        .ok_or_else(|| malformed(POWER_DEVICE_ENDPOINT, format!("no state for '{device}'")))
}
