// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// User-facing notices for upload failures.
//
// Every terminal failure surfaces as a notice; nothing is swallowed. The
// text keeps the raw transport message because users paste it into bug
// reports.

use std::time::Duration;

use crate::error::MoonpostError;
use crate::types::{Notice, NoticeAction, NoticeKind};

/// Lifetime of a success notice when auto-hide is enabled.
pub const AUTOHIDE_LIFETIME: Duration = Duration::from_secs(30);

/// Lifetime of the "configure first" hint.
pub const CONFIGURE_LIFETIME: Duration = Duration::from_secs(30);

/// Printer details woven into notice text.
#[derive(Debug, Clone, Copy)]
pub struct NoticeContext<'a> {
    /// Base URL of the Moonraker instance.
    pub url: &'a str,
    /// URL opened by the "Open Browser" action.
    pub browser_url: &'a str,
    /// Raw power device setting, empty when none is configured.
    pub power_device: &'a str,
}

/// Convert a `MoonpostError` into the notice shown to the user.
pub fn humanize_error(err: &MoonpostError, ctx: NoticeContext<'_>) -> Notice {
    match err {
        MoonpostError::ConnectionTimeout { .. } => {
            let mut text = format!("Connection to Moonraker at {} timed out", ctx.url);
            if !ctx.power_device.trim().is_empty() {
                text.push_str(&format!(
                    ".\nCheck [power {}] stanza in moonraker.conf",
                    ctx.power_device.trim()
                ));
            }
            text.push_str(".\n\nCheck your Moonraker and Klipper settings.");
            Notice::new(NoticeKind::Error, "Moonraker - Error", text).with_action(
                NoticeAction::OpenBrowser {
                    url: ctx.browser_url.to_string(),
                },
            )
        }

        MoonpostError::NotConfigured => configure_notice(),

        MoonpostError::DeviceBusy => Notice::new(
            NoticeKind::Error,
            "Moonraker - Busy",
            "Another upload to this printer is still running. Wait for it to finish and try again.",
        ),

        MoonpostError::Validation { field, reason } => Notice::new(
            NoticeKind::Error,
            "Moonraker - Invalid Input",
            format!("The {field} is not valid: {reason}."),
        ),

        MoonpostError::Serialize(detail) => Notice::new(
            NoticeKind::Error,
            "Moonraker - Error",
            format!("The print file could not be generated.\n\n{detail}"),
        ),

        MoonpostError::Transport {
            operation,
            status,
            message,
        } => {
            let status = status.map(|s| format!(" (HTTP {s})")).unwrap_or_default();
            Notice::new(
                NoticeKind::Error,
                "Moonraker - Error",
                format!(
                    "Uploading to Moonraker at {} was not successful.\n\n{operation} failed{status} - {message}",
                    ctx.url
                ),
            )
        }

        other => Notice::new(
            NoticeKind::Error,
            "Moonraker - Error",
            format!(
                "Uploading to Moonraker at {} was not successful.\n\n{other}",
                ctx.url
            ),
        ),
    }
}

/// Shown when a write is requested on a printer without usable settings.
pub fn configure_notice() -> Notice {
    Notice::new(
        NoticeKind::Configure,
        "Configure Moonraker in Preferences!",
        "To configure your Moonraker printer go to:\n→ Settings\n→ Printer\n→ Manage Printers\n→ select your printer\n→ click on 'Connect Moonraker'",
    )
    .with_lifetime(CONFIGURE_LIFETIME)
}
