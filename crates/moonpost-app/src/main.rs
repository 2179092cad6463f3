// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Moonpost: upload print files to Moonraker/Klipper printers.
//
// Entry point. Initialises logging and services, then runs one subcommand.

mod cli;
mod services;

use std::process::ExitCode;

use clap::Parser;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use moonpost_core::error::{MoonpostError, Result};
use moonpost_core::types::{NoticeAction, NoticeKind};
use moonpost_upload::events::DeviceEvent;
use moonpost_upload::orchestrator::UploadOutcome;

use cli::{Cli, Command, ConfigureArgs, UploadArgs, redacted_json};
use services::app_services::AppServices;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let services = match AppServices::init() {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "cannot open preferences, using in-memory fallback");
            AppServices::fallback()
        }
    };

    match run(cli.command, &services).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, services: &AppServices) -> Result<()> {
    match command {
        Command::Configure(args) => configure(services, &args),
        Command::Show { printer } => show(services, printer.as_deref()),
        Command::Delete { printer } => {
            if services.store().delete(&printer)? {
                println!("deleted {printer}");
            } else {
                println!("no settings stored for {printer}");
            }
            Ok(())
        }
        Command::Upload(args) => upload(services, args).await,
    }
}

fn configure(services: &AppServices, args: &ConfigureArgs) -> Result<()> {
    let store = services.store();
    let mut config = store.get(&args.printer);
    args.apply(&mut config);
    config.validate()?;
    let saved = store.save(&args.printer, config)?;
    println!("{}", serde_json::to_string_pretty(&redacted_json(&saved))?);
    Ok(())
}

fn show(services: &AppServices, printer: Option<&str>) -> Result<()> {
    let store = services.store();
    let value = match printer {
        Some(id) => redacted_json(&store.get(id)),
        None => store
            .printer_ids()
            .into_iter()
            .map(|id| {
                let config = redacted_json(&store.get(&id));
                (id, config)
            })
            .collect::<serde_json::Map<_, _>>()
            .into(),
    };
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

async fn upload(services: &AppServices, args: UploadArgs) -> Result<()> {
    let request = args.write_request();

    let device = services.device_for_file(&args.printer, &args.file, !args.yes)?;
    info!(printer = %args.printer, file = %args.file.display(), "uploading");

    let reporter = tokio::spawn(report_events(device.subscribe()));
    let result = device.write(request).await;

    if args.open && matches!(result, Ok(UploadOutcome::Uploaded { .. })) {
        let url = device.config().browser_url().to_string();
        if let Err(e) = device.trigger_action(&NoticeAction::OpenBrowser { url }) {
            warn!(error = %e, "cannot open browser");
        }
    }

    // Dropping the device closes the event channel and ends the reporter.
    drop(device);
    if let Err(e) = reporter.await {
        warn!(error = %e, "event reporter failed");
    }

    match result? {
        UploadOutcome::Uploaded {
            file_name, path, ..
        } => {
            let target = if path.is_empty() {
                file_name
            } else {
                format!("{path}/{file_name}")
            };
            println!("uploaded {target}");
            Ok(())
        }
        UploadOutcome::Cancelled => {
            println!("upload cancelled");
            Ok(())
        }
        UploadOutcome::NotConfigured => Err(MoonpostError::NotConfigured),
    }
}

/// Print notices and progress to stderr until the device goes away.
async fn report_events(mut events: Receiver<DeviceEvent>) {
    loop {
        match events.recv().await {
            Ok(DeviceEvent::Notice(notice)) => match notice.kind {
                NoticeKind::Connecting => eprint!("\r{}", notice.text),
                _ => eprintln!("\n[{}] {}", notice.title, notice.text),
            },
            Ok(DeviceEvent::WriteProgress { percent, .. }) => {
                eprint!("\r{percent:>3}%");
                if percent == 100 {
                    eprintln!();
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "missed device events"),
            Err(RecvError::Closed) => break,
        }
    }
}
