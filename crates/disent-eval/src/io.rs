// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::entropy::EntropyEstimate;
use crate::error::{EvalError, Result};
use crate::mutual_info::ScoreSummary;
use ndarray::{Array1, Array2};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const METRICS_FILENAME: &str = "metrics.log";
pub const TEST_LOSSES_FILENAME: &str = "test_losses.log";
pub const METRIC_HELPERS_FILENAME: &str = "metric_helpers.json";

/// Intermediate tensors of a metrics computation, kept for later analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricHelpers {
    pub marginal_entropies: Array1<f64>,
    pub cond_entropies: Array2<f64>,
    pub component_entropies: Array1<f64>,
    /// Marginal entropy above each pivot's own posterior; finite under collapse.
    pub excess_entropies: Array1<f64>,
    pub mutual_information: Array2<f64>,
    pub mig_k: Vec<f64>,
    pub mig: f64,
    pub aam_k: Vec<f64>,
    pub aam: f64,
}

impl MetricHelpers {
    pub fn new(
        entropies: &EntropyEstimate,
        mutual_information: Array2<f64>,
        mig: &ScoreSummary,
        aam: &ScoreSummary,
    ) -> Self {
        Self {
            marginal_entropies: entropies.marginal.clone(),
            cond_entropies: entropies.conditional.clone(),
            component_entropies: entropies.component.clone(),
            excess_entropies: entropies.excess.clone(),
            mutual_information,
            mig_k: mig.per_factor.clone(),
            mig: mig.score,
            aam_k: aam.per_factor.clone(),
            aam: aam.score,
        }
    }
}

/// Writes `value` as pretty JSON to `dir/filename`, creating `dir` if needed.
pub fn save_metadata<T: Serialize + ?Sized>(
    value: &T,
    dir: &Path,
    filename: &str,
) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(|err| EvalError::io(dir, err))?;
    let path = dir.join(filename);
    let file = File::create(&path).map_err(|err| EvalError::io(&path, err))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush().map_err(|err| EvalError::io(&path, err))?;
    Ok(path)
}

pub fn load_metadata<T: DeserializeOwned>(dir: &Path, filename: &str) -> Result<T> {
    let path = dir.join(filename);
    let file = File::open(&path).map_err(|err| EvalError::io(&path, err))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}
