// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-printer config records inside a single preference entry.
//
// The entry holds a JSON object mapping printer id → config. Entries are
// kept as raw JSON values while loading so that one damaged record does not
// hide the others.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use crate::config::PrinterConfig;
use crate::error::{MoonpostError, Result};
use crate::prefs::PreferenceStore;

/// Preference key holding every printer's config.
pub const MOONRAKER_SETTINGS: &str = "moonraker/instances";

type Instances = BTreeMap<String, serde_json::Value>;

/// Loads, saves and deletes printer configs.
#[derive(Clone)]
pub struct ConfigStore {
    prefs: Arc<dyn PreferenceStore>,
    /// Serializes read-modify-write cycles on the shared entry.
    write_lock: Arc<Mutex<()>>,
}

impl ConfigStore {
    pub fn new(prefs: Arc<dyn PreferenceStore>) -> Self {
        Self {
            prefs,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    fn load_instances(&self) -> Instances {
        let raw = match self.prefs.get(MOONRAKER_SETTINGS) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Instances::new(),
            Err(e) => {
                warn!(error = %e, "cannot read printer settings");
                return Instances::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(error = %e, "printer settings are not a JSON object, ignoring");
            Instances::new()
        })
    }

    fn store_instances(&self, instances: &Instances) -> Result<()> {
        self.prefs
            .set(MOONRAKER_SETTINGS, serde_json::to_string(instances)?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| MoonpostError::Preferences("config store lock poisoned".into()))
    }

    /// Config for `printer_id`, or the default config when none is stored.
    pub fn get(&self, printer_id: &str) -> PrinterConfig {
        config_from(&self.load_instances(), printer_id)
    }

    /// Ids of every printer with a stored config.
    pub fn printer_ids(&self) -> Vec<String> {
        self.load_instances().into_keys().collect()
    }

    /// Store the full config for `printer_id` and persist immediately.
    ///
    /// The URL gains a trailing slash, and an omitted
    /// `upload_start_print_job` keeps the stored value. Returns the config as
    /// written.
    pub fn save(&self, printer_id: &str, config: PrinterConfig) -> Result<PrinterConfig> {
        let _guard = self.lock()?;
        self.save_locked(self.load_instances(), printer_id, config)
    }

    /// Load, modify and save in one step, holding the write lock throughout.
    pub fn update(
        &self,
        printer_id: &str,
        apply: impl FnOnce(&mut PrinterConfig),
    ) -> Result<PrinterConfig> {
        let _guard = self.lock()?;
        let instances = self.load_instances();
        let mut config = config_from(&instances, printer_id);
        apply(&mut config);
        self.save_locked(instances, printer_id, config)
    }

    /// Caller holds `write_lock`; `instances` is the entry as just loaded.
    fn save_locked(
        &self,
        mut instances: Instances,
        printer_id: &str,
        mut config: PrinterConfig,
    ) -> Result<PrinterConfig> {
        config.url = normalize_url(&config.url);
        if config.upload_start_print_job.is_none() {
            config.upload_start_print_job = instances
                .get(printer_id)
                .and_then(|existing| existing.get("upload_start_print_job"))
                .and_then(serde_json::Value::as_bool);
        }

        instances.insert(printer_id.to_string(), serde_json::to_value(&config)?);
        self.store_instances(&instances)?;
        info!(printer = printer_id, url = %config.url, "printer config saved");
        Ok(config)
    }

    /// Remove the config for `printer_id`. Returns whether one existed.
    pub fn delete(&self, printer_id: &str) -> Result<bool> {
        let _guard = self.lock()?;
        let mut instances = self.load_instances();
        if instances.remove(printer_id).is_none() {
            return Ok(false);
        }
        self.store_instances(&instances)?;
        info!(printer = printer_id, "printer config deleted");
        Ok(true)
    }
}

fn config_from(instances: &Instances, printer_id: &str) -> PrinterConfig {
    let Some(value) = instances.get(printer_id) else {
        return PrinterConfig::default();
    };
    serde_json::from_value(value.clone()).unwrap_or_else(|e| {
        warn!(printer = printer_id, error = %e, "stored config is unreadable, using defaults");
        PrinterConfig::default()
    })
}

fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() || url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}
