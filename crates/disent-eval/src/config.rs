// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::{EvalError, Result};
use disent_nn::{NnResult, Optimizer};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Settings of the Monte Carlo entropy estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntropyConfig {
    /// Upper bound on the number of pivot samples; clamped to the dataset size.
    pub n_pivots: usize,
    /// Pivots scored per inner step. Has no influence on the result.
    pub minibatch: usize,
}

impl Default for EntropyConfig {
    fn default() -> Self {
        Self {
            n_pivots: 10_000,
            minibatch: 10,
        }
    }
}

/// Fitting budgets of the PCA and ICA baselines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    pub pca_samples: usize,
    /// Subspace iterations of the randomised PCA solver.
    pub pca_power_iterations: usize,
    pub ica_samples: usize,
    /// FastICA update cap. Running out of updates is an error, not a
    /// partial result.
    pub ica_max_iterations: usize,
    pub ica_tolerance: f64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            pca_samples: 5000,
            pca_power_iterations: 6,
            ica_samples: 1000,
            ica_max_iterations: 200,
            ica_tolerance: 1e-4,
        }
    }
}

/// Update rule used to fit the probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeOptimizer {
    Adam,
    Sgd,
}

impl ProbeOptimizer {
    pub fn build(self, learning_rate: f64) -> NnResult<Optimizer> {
        match self {
            Self::Adam => Optimizer::adam(learning_rate),
            Self::Sgd => Optimizer::sgd(learning_rate),
        }
    }
}

/// Paired-sample dataset and classifier settings of the DM metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Image pairs averaged into one difference vector.
    pub sample_size: usize,
    /// Number of training difference vectors.
    pub dataset_size: usize,
    /// Held-out set size relative to `dataset_size`.
    pub test_fraction: f64,
    pub hidden_dim: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub optimizer: ProbeOptimizer,
    /// Held-out loss is logged every `eval_every` epochs.
    pub eval_every: usize,
    /// Also trains a ReLU probe and reports it as `NLDM`.
    pub nonlinear_probe: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            sample_size: 300,
            dataset_size: 1500,
            test_fraction: 0.2,
            hidden_dim: 512,
            epochs: 150,
            learning_rate: 0.01,
            optimizer: ProbeOptimizer::Adam,
            eval_every: 10,
            nonlinear_probe: false,
        }
    }
}

impl ProbeConfig {
    /// Held-out examples generated next to the training set.
    pub fn test_size(&self) -> usize {
        ((self.dataset_size as f64 * self.test_fraction).ceil() as usize).max(1)
    }
}

/// Mirror of the computed metrics into an experiment tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub enabled: bool,
    /// Relative paths resolve against the evaluator's `save_dir`.
    pub path: PathBuf,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from("tracking.jsonl"),
        }
    }
}

/// Top-level evaluator configuration.
///
/// Every field has a default, so an empty TOML document is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    pub save_dir: PathBuf,
    /// Examples per encoder call while sampling posteriors and scoring losses.
    pub batch_size: usize,
    /// Representations probed by the DM metric, by name.
    pub representations: Vec<String>,
    /// Base seed for every stochastic step. `None` defers to the
    /// process-wide determinism settings.
    pub seed: Option<u64>,
    pub entropy: EntropyConfig,
    pub baseline: BaselineConfig,
    pub probe: ProbeConfig,
    pub tracking: TrackingConfig,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("results"),
            batch_size: 64,
            representations: vec!["VAE".into(), "PCA".into(), "ICA".into()],
            seed: None,
            entropy: EntropyConfig::default(),
            baseline: BaselineConfig::default(),
            probe: ProbeConfig::default(),
            tracking: TrackingConfig::default(),
        }
    }
}

fn positive(value: usize, name: &str) -> Result<()> {
    if value == 0 {
        return Err(EvalError::Config(format!("{name} must be > 0")));
    }
    Ok(())
}

impl EvaluatorConfig {
    pub fn validate(&self) -> Result<()> {
        positive(self.batch_size, "batch_size")?;
        positive(self.entropy.n_pivots, "entropy.n_pivots")?;
        positive(self.entropy.minibatch, "entropy.minibatch")?;
        positive(self.baseline.pca_samples, "baseline.pca_samples")?;
        positive(self.baseline.pca_power_iterations, "baseline.pca_power_iterations")?;
        positive(self.baseline.ica_samples, "baseline.ica_samples")?;
        positive(self.baseline.ica_max_iterations, "baseline.ica_max_iterations")?;
        positive(self.probe.sample_size, "probe.sample_size")?;
        positive(self.probe.dataset_size, "probe.dataset_size")?;
        positive(self.probe.hidden_dim, "probe.hidden_dim")?;
        positive(self.probe.epochs, "probe.epochs")?;
        positive(self.probe.eval_every, "probe.eval_every")?;
        if !self.baseline.ica_tolerance.is_finite() || self.baseline.ica_tolerance <= 0.0 {
            return Err(EvalError::Config(format!(
                "baseline.ica_tolerance must be > 0, got {}",
                self.baseline.ica_tolerance
            )));
        }
        if !self.probe.learning_rate.is_finite() || self.probe.learning_rate <= 0.0 {
            return Err(EvalError::Config(format!(
                "probe.learning_rate must be > 0, got {}",
                self.probe.learning_rate
            )));
        }
        if !(self.probe.test_fraction.is_finite() && self.probe.test_fraction > 0.0) {
            return Err(EvalError::Config(format!(
                "probe.test_fraction must be > 0, got {}",
                self.probe.test_fraction
            )));
        }
        Ok(())
    }

    pub fn from_toml_str(config: &str) -> Result<Self> {
        let parsed: EvaluatorConfig = toml::from_str(config)
            .map_err(|err| EvalError::Config(format!("failed to parse evaluator config: {err}")))?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read_to_string(&path).map_err(|err| EvalError::io(path.as_ref(), err))?;
        Self::from_toml_str(&data)
    }

    /// Where the tracker mirror is written.
    pub fn tracking_path(&self) -> PathBuf {
        if self.tracking.path.is_absolute() {
            self.tracking.path.clone()
        } else {
            self.save_dir.join(&self.tracking.path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = EvaluatorConfig::from_toml_str("").unwrap();
        assert_eq!(config, EvaluatorConfig::default());
        assert_eq!(config.entropy.n_pivots, 10_000);
        assert_eq!(config.probe.test_size(), 300);
    }

    #[test]
    fn nested_sections_override_defaults() {
        let config = EvaluatorConfig::from_toml_str(
            r#"
            save_dir = "out"
            representations = ["vae", "pca"]
            seed = 5

            [probe]
            epochs = 20
            optimizer = "sgd"
            nonlinear_probe = true

            [tracking]
            enabled = true
            "#,
        )
        .unwrap();
        assert_eq!(config.save_dir, PathBuf::from("out"));
        assert_eq!(config.seed, Some(5));
        assert_eq!(config.probe.epochs, 20);
        assert_eq!(config.probe.optimizer, ProbeOptimizer::Sgd);
        assert_eq!(config.probe.hidden_dim, 512);
        assert!(config.tracking.enabled);
        assert_eq!(config.tracking_path(), PathBuf::from("out/tracking.jsonl"));
    }

    #[test]
    fn rejects_zero_sizes_and_bad_rates() {
        assert!(matches!(
            EvaluatorConfig::from_toml_str("[entropy]\nn_pivots = 0"),
            Err(EvalError::Config(_))
        ));
        assert!(matches!(
            EvaluatorConfig::from_toml_str("[probe]\nlearning_rate = -0.1"),
            Err(EvalError::Config(_))
        ));
        assert!(EvaluatorConfig::from_toml_str("batch_size = \"many\"").is_err());
    }

    #[test]
    fn test_size_never_drops_to_zero() {
        let probe = ProbeConfig {
            dataset_size: 3,
            test_fraction: 0.1,
            ..ProbeConfig::default()
        };
        assert_eq!(probe.test_size(), 1);
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eval.toml");
        std::fs::write(&path, "batch_size = 8\n").unwrap();
        assert_eq!(EvaluatorConfig::load(&path).unwrap().batch_size, 8);
        assert!(matches!(
            EvaluatorConfig::load(dir.path().join("missing.toml")),
            Err(EvalError::Io { .. })
        ));
    }
}
