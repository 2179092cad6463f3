// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Event broadcast from an output device to the host.

use tokio::sync::broadcast;
use tracing::trace;

use moonpost_core::types::{Notice, SessionId, Stage};

/// Buffered events per subscriber before the slowest one starts lagging.
pub const EVENT_CAPACITY: usize = 64;

/// Device property whose value changed after a config update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    Url,
    ApiKey,
    PowerDevice,
    OutputFormat,
    CameraUrl,
    CameraRotation,
    CameraMirror,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// The upload was confirmed; network activity follows.
    WriteStarted {
        session: SessionId,
    },
    /// Whole percent of the upload body sent.
    WriteProgress {
        session: SessionId,
        percent: u8,
    },
    WriteSuccess {
        session: SessionId,
        file_name: String,
    },
    WriteError {
        session: SessionId,
        error: String,
    },
    /// The user dismissed the upload dialog.
    WriteCancelled {
        session: SessionId,
    },
    /// Replaces whatever notice the device showed before.
    Notice(Notice),
    PropertyChanged(Property),
    StageChanged(Stage),
}

/// Cloneable sender side; every clone publishes to the same subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DeviceEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.tx.subscribe()
    }

    /// Publish to current subscribers. Having none is not an error.
    pub fn publish(&self, event: DeviceEvent) {
        if self.tx.send(event).is_err() {
            trace!("event dropped, no subscribers");
        }
    }

    pub fn notice(&self, notice: Notice) {
        self.publish(DeviceEvent::Notice(notice));
    }
}
