// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Upload file name resolution.

use std::collections::HashMap;

use moonpost_core::config::PrinterConfig;
use moonpost_core::types::{OutputFormat, WriteRequest};

/// Per-character substitution table with a delete set.
///
/// A character listed in both the substitution input and the delete set is
/// deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Translation {
    table: HashMap<char, Option<char>>,
}

impl Translation {
    /// Build the table from the three config strings. The table stays empty
    /// unless both input and output are set.
    pub fn new(input: &str, output: &str, remove: &str) -> Self {
        let mut table = HashMap::new();
        if input.is_empty() || output.is_empty() {
            return Self { table };
        }
        for (from, to) in input.chars().zip(output.chars()) {
            table.insert(from, Some(to));
        }
        for gone in remove.chars() {
            table.insert(gone, None);
        }
        Self { table }
    }

    pub fn from_config(config: &PrinterConfig) -> Self {
        Self::new(&config.trans_input, &config.trans_output, &config.trans_remove)
    }

    pub fn is_identity(&self) -> bool {
        self.table.is_empty()
    }

    pub fn apply(&self, name: &str) -> String {
        name.chars()
            .filter_map(|c| match self.table.get(&c) {
                Some(mapped) => *mapped,
                None => Some(c),
            })
            .collect()
    }
}

/// Last path component, accepting either separator.
pub fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Name before the extension is appended: the caller's file name (base name
/// only) or the job name, run through the translation table.
pub fn translated_stem(request: &WriteRequest, translation: &Translation) -> String {
    let raw = match request.file_name.as_deref() {
        Some(file_name) if !base_name(file_name).is_empty() => base_name(file_name),
        _ => request.job_name.as_str(),
    };
    translation.apply(raw)
}

/// Full upload name for a write request.
pub fn resolve_file_name(
    request: &WriteRequest,
    config: &PrinterConfig,
    format: OutputFormat,
) -> String {
    let stem = translated_stem(request, &Translation::from_config(config));
    format!("{stem}.{}", format.extension())
}

/// Append the format extension to a dialog-edited name that has none.
pub fn ensure_extension(name: &str, format: OutputFormat) -> String {
    if name.contains('.') {
        name.to_string()
    } else {
        format!("{name}.{}", format.extension())
    }
}
