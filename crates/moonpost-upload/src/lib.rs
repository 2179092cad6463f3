// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Moonpost Upload: Moonraker client and the upload state machine.
//
// Request construction lives in `client`, wire parsing in `protocol`, the
// network behind the `HttpTransport` trait in `http`. `orchestrator` drives
// one write request at a time; `device` is the face the host talks to.

pub mod client;
pub mod device;
pub mod events;
pub mod filename;
pub mod http;
pub mod multipart;
pub mod orchestrator;
pub mod protocol;
pub mod retry;

#[cfg(test)]
pub(crate) mod testing;

pub use client::MoonrakerClient;
pub use device::{DeviceServices, MoonrakerOutputDevice, PendingWrite};
pub use events::{DeviceEvent, EventBus, Property};
pub use http::{HttpTransport, ReqwestTransport};
pub use orchestrator::{UploadOrchestrator, UploadOutcome};
