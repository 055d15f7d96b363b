// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Optional mirror of run configuration and scores to an experiment tracker.

use crate::error::{EvalError, Result};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Sink for run metadata. Nothing computed by the evaluator depends on it.
pub trait ExperimentTracker {
    /// Records static run settings (latent size, probe width, ...).
    fn record_config(&mut self, values: &BTreeMap<String, Value>) -> Result<()>;

    /// Records named scalar scores.
    fn log_metrics(&mut self, metrics: &BTreeMap<String, f64>) -> Result<()>;
}

/// Appends one JSON object per event to a file.
#[derive(Debug)]
pub struct JsonlTracker {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonlTracker {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| EvalError::io(parent, err))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| EvalError::io(&path, err))?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&mut self, event: Value) -> Result<()> {
        serde_json::to_writer(&mut self.writer, &event)?;
        self.writer
            .write_all(b"\n")
            .and_then(|_| self.writer.flush())
            .map_err(|err| EvalError::io(&self.path, err))
    }
}

impl ExperimentTracker for JsonlTracker {
    fn record_config(&mut self, values: &BTreeMap<String, Value>) -> Result<()> {
        self.append(json!({ "event": "config", "values": values }))
    }

    fn log_metrics(&mut self, metrics: &BTreeMap<String, f64>) -> Result<()> {
        self.append(json!({ "event": "metrics", "values": metrics }))
    }
}
