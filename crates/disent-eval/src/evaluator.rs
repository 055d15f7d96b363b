// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Orchestrates a full evaluation run: baselines, classifier probes,
//! entropy estimates and the resulting scores, persisted under `save_dir`.

use crate::baseline::{
    FastIca, IcaSettings, PcaProjector, Representation, RepresentationKind, VaeRepresentation,
};
use crate::config::EvaluatorConfig;
use crate::dataset::FactorDataset;
use crate::entropy::EntropyEstimator;
use crate::error::{EvalError, Result};
use crate::io::{
    save_metadata, MetricHelpers, METRICS_FILENAME, METRIC_HELPERS_FILENAME, TEST_LOSSES_FILENAME,
};
use crate::losses::{LossStorer, VaeLoss};
use crate::model::{Encoder, VaeModel};
use crate::mutual_info::{aam, mig, mutual_information, sort_descending_clamped};
use crate::paired::{PairedSampleBuilder, ProbeSplit};
use crate::posterior::sample_posteriors;
use crate::probe::{DisentanglementProbe, ProbeSettings};
use crate::tracking::{ExperimentTracker, JsonlTracker};
use disent_config::determinism::rng_from_optional;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{info, Span};

/// Average of every stored loss term over the test batches.
pub type LossRecord = BTreeMap<String, f64>;

/// Scores written to `metrics.log`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    /// Held-out accuracy of the linear probe per representation.
    #[serde(rename = "DM")]
    pub dm: BTreeMap<RepresentationKind, f64>,
    /// Same, with a ReLU probe. Present only when `probe.nonlinear_probe` is set.
    #[serde(rename = "NLDM", default, skip_serializing_if = "Option::is_none")]
    pub nldm: Option<BTreeMap<RepresentationKind, f64>>,
    #[serde(rename = "MIG")]
    pub mig: f64,
    #[serde(rename = "AAM")]
    pub aam: f64,
}

impl MetricsRecord {
    /// Flat `name -> value` view used by experiment trackers.
    pub fn flatten(&self) -> BTreeMap<String, f64> {
        let mut flat = BTreeMap::new();
        for (kind, acc) in &self.dm {
            flat.insert(format!("DM_{kind}"), *acc);
        }
        for (kind, acc) in self.nldm.iter().flatten() {
            flat.insert(format!("NLDM_{kind}"), *acc);
        }
        flat.insert("MIG".to_string(), self.mig);
        flat.insert("AAM".to_string(), self.aam);
        flat
    }
}

/// Results of [`Evaluator::evaluate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub metrics: Option<MetricsRecord>,
    pub losses: Option<LossRecord>,
}

/// Computes disentanglement metrics and test losses of a trained VAE.
pub struct Evaluator {
    config: EvaluatorConfig,
    loss: Box<dyn VaeLoss>,
    tracker: Option<Box<dyn ExperimentTracker>>,
    span: Span,
}

impl Evaluator {
    /// Validates `config`. Every event of the run is emitted under `span`.
    pub fn new(config: EvaluatorConfig, loss: Box<dyn VaeLoss>, span: Span) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            loss,
            tracker: None,
            span,
        })
    }

    /// Mirrors run settings and scores into `tracker` instead of the
    /// configured JSONL file.
    pub fn with_tracker(mut self, tracker: Box<dyn ExperimentTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    fn tracker(&mut self) -> Result<Option<&mut Box<dyn ExperimentTracker>>> {
        if self.tracker.is_none() && self.config.tracking.enabled {
            let tracker = JsonlTracker::create(self.config.tracking_path())?;
            self.tracker = Some(Box::new(tracker));
        }
        Ok(self.tracker.as_mut())
    }

    /// Runs the metrics and/or loss passes and writes their records to
    /// `metrics.log` and `test_losses.log` in `save_dir`.
    pub fn evaluate<M, D>(
        &mut self,
        model: &M,
        dataset: &D,
        is_metrics: bool,
        is_losses: bool,
    ) -> Result<Evaluation>
    where
        M: VaeModel,
        D: FactorDataset + ?Sized,
    {
        let start = Instant::now();
        let metrics = if is_metrics {
            let record = self.compute_metrics(model, dataset)?;
            save_metadata(&record, &self.config.save_dir, METRICS_FILENAME)?;
            Some(record)
        } else {
            None
        };
        let losses = if is_losses {
            let record = self.compute_losses(model, dataset)?;
            save_metadata(&record, &self.config.save_dir, TEST_LOSSES_FILENAME)?;
            Some(record)
        } else {
            None
        };
        info!(
            parent: &self.span,
            elapsed_min = start.elapsed().as_secs_f64() / 60.0,
            "finished evaluating"
        );
        Ok(Evaluation { metrics, losses })
    }

    /// DM, MIG and AAM of `model` on `dataset`.
    ///
    /// Fails before any training when the dataset lacks factor metadata or a
    /// requested representation is unknown.
    pub fn compute_metrics<E, D>(&mut self, model: &E, dataset: &D) -> Result<MetricsRecord>
    where
        E: Encoder + ?Sized,
        D: FactorDataset + ?Sized,
    {
        let factors = dataset.factors().ok_or_else(|| EvalError::MissingFactors {
            dataset: dataset.name().to_string(),
        })?;
        factors.validate_len(dataset.len())?;
        let mut kinds = Vec::new();
        for kind in RepresentationKind::parse_all(&self.config.representations)? {
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        let latent_dim = model.latent_dim();
        info!(
            parent: &self.span,
            dataset = dataset.name(),
            examples = dataset.len(),
            factors = factors.len(),
            latent_dim,
            "computing disentanglement metrics"
        );
        self.record_run_config(dataset.name(), latent_dim, &kinds)?;

        let splits = self.build_probe_splits(model, dataset, &kinds)?;
        let dm = self.run_probes(&kinds, &splits, factors.len(), false)?;
        let nldm = if self.config.probe.nonlinear_probe {
            Some(self.run_probes(&kinds, &splits, factors.len(), true)?)
        } else {
            None
        };

        info!(parent: &self.span, "sampling the posterior of every example");
        let seed = self.config.seed;
        let table = sample_posteriors(
            model,
            dataset,
            self.config.batch_size,
            &mut rng_from_optional(seed, "disent-eval/posterior"),
        )?;
        info!(
            parent: &self.span,
            n_pivots = self.config.entropy.n_pivots.min(table.len()),
            "estimating latent entropies"
        );
        let estimator = EntropyEstimator::from_config(&self.config.entropy)?;
        let entropies = estimator.estimate(
            &table,
            factors,
            &mut rng_from_optional(seed, "disent-eval/entropy"),
            &self.span,
        )?;
        let mutual_info = mutual_information(&entropies.marginal, &entropies.conditional)?;
        let sorted = sort_descending_clamped(&mutual_info);
        let mig = mig(&sorted, factors)?;
        let aam = aam(&sorted)?;

        let helpers = MetricHelpers::new(&entropies, mutual_info, &mig, &aam);
        save_metadata(&helpers, &self.config.save_dir, METRIC_HELPERS_FILENAME)?;

        let record = MetricsRecord {
            dm,
            nldm,
            mig: mig.score,
            aam: aam.score,
        };
        info!(parent: &self.span, mig = record.mig, aam = record.aam, "metrics computed");
        if let Some(tracker) = self.tracker()? {
            tracker.log_metrics(&record.flatten())?;
        }
        Ok(record)
    }

    fn record_run_config(
        &mut self,
        dataset: &str,
        latent_dim: usize,
        kinds: &[RepresentationKind],
    ) -> Result<()> {
        let mut values = BTreeMap::new();
        values.insert("dataset".to_string(), json!(dataset));
        values.insert("latent_size".to_string(), json!(latent_dim));
        values.insert(
            "representations".to_string(),
            Value::from(kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>()),
        );
        values.insert("sample_size".to_string(), json!(self.config.probe.sample_size));
        values.insert("dataset_size".to_string(), json!(self.config.probe.dataset_size));
        values.insert("hidden_dim".to_string(), json!(self.config.probe.hidden_dim));
        values.insert("n_pivots".to_string(), json!(self.config.entropy.n_pivots));
        if let Some(tracker) = self.tracker()? {
            tracker.record_config(&values)?;
        }
        Ok(())
    }

    /// Fits the requested baselines and draws one train/test split per
    /// representation, ordered like `kinds`.
    fn build_probe_splits<E, D>(
        &self,
        model: &E,
        dataset: &D,
        kinds: &[RepresentationKind],
    ) -> Result<Vec<ProbeSplit>>
    where
        E: Encoder + ?Sized,
        D: FactorDataset + ?Sized,
    {
        let seed = self.config.seed;
        let baseline = &self.config.baseline;
        let components = model.latent_dim();
        let images = dataset.images();

        let vae = VaeRepresentation::new(model);
        let pca = if kinds.contains(&RepresentationKind::Pca) {
            info!(parent: &self.span, samples = baseline.pca_samples, "fitting PCA");
            Some(PcaProjector::fit_subsample(
                images,
                baseline.pca_samples,
                components,
                baseline.pca_power_iterations,
                &mut rng_from_optional(seed, "disent-eval/pca"),
            )?)
        } else {
            None
        };
        let ica = if kinds.contains(&RepresentationKind::Ica) {
            info!(parent: &self.span, samples = baseline.ica_samples, "fitting ICA");
            let settings = IcaSettings {
                max_iterations: baseline.ica_max_iterations,
                tolerance: baseline.ica_tolerance,
                power_iterations: baseline.pca_power_iterations,
            };
            let fitted = FastIca::fit_subsample(
                images,
                baseline.ica_samples,
                components,
                settings,
                &mut rng_from_optional(seed, "disent-eval/ica"),
            )?;
            info!(parent: &self.span, iterations = fitted.iterations(), "ICA converged");
            Some(fitted)
        } else {
            None
        };

        let mut representations: Vec<&dyn Representation> = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let missing = || EvalError::UnknownRepresentation(kind.to_string());
            let rep: &dyn Representation = match kind {
                RepresentationKind::Vae => &vae,
                RepresentationKind::Pca => pca.as_ref().ok_or_else(missing)?,
                RepresentationKind::Ica => ica.as_ref().ok_or_else(missing)?,
            };
            representations.push(rep);
        }

        let probe = &self.config.probe;
        info!(
            parent: &self.span,
            train = probe.dataset_size,
            test = probe.test_size(),
            sample_size = probe.sample_size,
            "building paired-sample datasets"
        );
        let builder = PairedSampleBuilder::new(dataset, probe.sample_size)?;
        builder.build_splits(
            &representations,
            probe.dataset_size,
            probe.test_size(),
            &mut rng_from_optional(seed, "disent-eval/paired"),
        )
    }

    fn run_probes(
        &self,
        kinds: &[RepresentationKind],
        splits: &[ProbeSplit],
        classes: usize,
        non_linear: bool,
    ) -> Result<BTreeMap<RepresentationKind, f64>> {
        let settings = ProbeSettings::from_config(&self.config.probe, non_linear)?;
        let label = if non_linear {
            "disent-eval/probe-nonlinear"
        } else {
            "disent-eval/probe"
        };
        let probe_seed = rng_from_optional(self.config.seed, label).next_u64();
        let mut probe = DisentanglementProbe::new(settings, classes, probe_seed, self.span.clone());
        let mut scores = BTreeMap::new();
        for (kind, split) in kinds.iter().zip(splits) {
            let report = probe.fit(kind.as_str(), split)?;
            scores.insert(*kind, report.test_accuracy);
        }
        Ok(scores)
    }

    /// Averages every loss term the configured objective records over the
    /// batches of `dataset`.
    pub fn compute_losses<M, D>(&self, model: &M, dataset: &D) -> Result<LossRecord>
    where
        M: VaeModel,
        D: FactorDataset + ?Sized,
    {
        let auxiliary = self.loss.requires_auxiliary_optimizer();
        info!(
            parent: &self.span,
            loss = self.loss.name(),
            auxiliary,
            "computing test losses"
        );
        let mut rng = rng_from_optional(self.config.seed, "disent-eval/losses");
        let mut storer = LossStorer::new();
        let mut batches = 0;
        for (batch, _) in dataset.batches(self.config.batch_size) {
            if auxiliary {
                self.loss
                    .evaluate_with_model(batch, model, &mut rng, &mut storer)?;
            } else {
                let pass = model.forward(batch, &mut rng)?;
                self.loss.evaluate(batch, &pass, &mut storer)?;
            }
            batches += 1;
        }
        if batches == 0 {
            return Err(EvalError::EmptyInput("dataset"));
        }
        Ok(storer.averages(batches))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::InMemoryDataset;
    use crate::factors::FactorSpec;
    use crate::losses::BetaVaeLoss;
    use crate::model::{ForwardPass, LinearGaussianModel};
    use ndarray::{array, ArrayView2};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn small_config(dir: &std::path::Path) -> EvaluatorConfig {
        let mut config = EvaluatorConfig::default();
        config.save_dir = dir.to_path_buf();
        config.seed = Some(11);
        config.batch_size = 4;
        config.representations = vec!["VAE".into()];
        config.entropy.n_pivots = 50;
        config.probe.sample_size = 6;
        config.probe.dataset_size = 40;
        config.probe.hidden_dim = 8;
        config.probe.epochs = 30;
        config.probe.learning_rate = 0.05;
        config
    }

    fn grid() -> InMemoryDataset {
        let spec = FactorSpec::from_sizes(&["a", "b"], &[2, 3]).unwrap();
        InMemoryDataset::from_factor_grid("grid", spec, 2, |v| {
            vec![v[0] as f64 / 2.0, v[1] as f64 / 3.0]
        })
        .unwrap()
    }

    fn model() -> LinearGaussianModel {
        LinearGaussianModel::new(
            array![[4.0, 0.0], [0.0, 6.0]],
            array![0.0, 0.0],
            array![-8.0, -8.0],
        )
        .unwrap()
    }

    #[test]
    fn construction_validates_the_config() {
        let mut config = EvaluatorConfig::default();
        config.batch_size = 0;
        assert!(matches!(
            Evaluator::new(config, Box::<BetaVaeLoss>::default(), Span::none()),
            Err(EvalError::Config(_))
        ));
    }

    #[test]
    fn unknown_representations_fail_before_training() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = small_config(dir.path());
        config.representations = vec!["VAE".into(), "tsne".into()];
        let mut evaluator =
            Evaluator::new(config, Box::<BetaVaeLoss>::default(), Span::none()).unwrap();
        let err = evaluator.compute_metrics(&model(), &grid()).unwrap_err();
        assert!(matches!(err, EvalError::UnknownRepresentation(name) if name == "tsne"));
        assert!(!dir.path().join(METRIC_HELPERS_FILENAME).exists());
    }

    #[test]
    fn losses_average_over_batches() {
        let dir = tempfile::tempdir().unwrap();
        let evaluator =
            Evaluator::new(small_config(dir.path()), Box::<BetaVaeLoss>::default(), Span::none())
                .unwrap();
        let losses = evaluator.compute_losses(&model(), &grid()).unwrap();
        for key in ["loss", "recon_loss", "kl_loss", "kl_loss_0", "kl_loss_1"] {
            assert!(losses[key].is_finite(), "{key}");
        }
        let sum = losses["recon_loss"] + losses["kl_loss"];
        assert!((losses["loss"] - sum).abs() < 1e-9);
    }

    struct CountingAuxiliary(RefCell<usize>);

    impl VaeLoss for CountingAuxiliary {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn requires_auxiliary_optimizer(&self) -> bool {
            true
        }

        fn evaluate(&self, _: ArrayView2<'_, f64>, _: &ForwardPass, _: &mut LossStorer) -> Result<f64> {
            Err(EvalError::AuxiliaryOptimizerRequired(self.name()))
        }

        fn evaluate_with_model(
            &self,
            data: ArrayView2<'_, f64>,
            _: &dyn VaeModel,
            _: &mut dyn RngCore,
            storer: &mut LossStorer,
        ) -> Result<f64> {
            *self.0.borrow_mut() += 1;
            storer.record("loss", data.nrows() as f64);
            Ok(data.nrows() as f64)
        }
    }

    #[test]
    fn auxiliary_losses_take_the_model_path() {
        let dir = tempfile::tempdir().unwrap();
        let loss = CountingAuxiliary(RefCell::new(0));
        let evaluator =
            Evaluator::new(small_config(dir.path()), Box::new(loss), Span::none()).unwrap();
        // 6 examples in batches of 4: 4 + 2.
        let losses = evaluator.compute_losses(&model(), &grid()).unwrap();
        assert_eq!(losses["loss"], 3.0);
    }

    #[derive(Default)]
    struct Recording {
        configs: Rc<RefCell<Vec<BTreeMap<String, Value>>>>,
        metrics: Rc<RefCell<Vec<BTreeMap<String, f64>>>>,
    }

    impl ExperimentTracker for Recording {
        fn record_config(&mut self, values: &BTreeMap<String, Value>) -> Result<()> {
            self.configs.borrow_mut().push(values.clone());
            Ok(())
        }

        fn log_metrics(&mut self, metrics: &BTreeMap<String, f64>) -> Result<()> {
            self.metrics.borrow_mut().push(metrics.clone());
            Ok(())
        }
    }

    #[test]
    fn metrics_are_mirrored_to_the_tracker() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = Recording::default();
        let (configs, metrics) = (tracker.configs.clone(), tracker.metrics.clone());
        let mut evaluator =
            Evaluator::new(small_config(dir.path()), Box::<BetaVaeLoss>::default(), Span::none())
                .unwrap()
                .with_tracker(Box::new(tracker));
        let record = evaluator.compute_metrics(&model(), &grid()).unwrap();

        assert_eq!(configs.borrow()[0]["latent_size"], json!(2));
        let logged = &metrics.borrow()[0];
        assert_eq!(logged["MIG"], record.mig);
        assert_eq!(logged["DM_VAE"], record.dm[&RepresentationKind::Vae]);
        assert!(dir.path().join(METRIC_HELPERS_FILENAME).exists());
    }

    #[test]
    fn metrics_record_uses_upper_case_keys() {
        let mut dm = BTreeMap::new();
        dm.insert(RepresentationKind::Vae, 0.75);
        let record = MetricsRecord {
            dm,
            nldm: None,
            mig: 0.5,
            aam: 0.25,
        };
        let text = serde_json::to_value(&record).unwrap();
        assert_eq!(text, json!({ "DM": { "VAE": 0.75 }, "MIG": 0.5, "AAM": 0.25 }));
        let back: MetricsRecord = serde_json::from_value(text).unwrap();
        assert_eq!(back, record);
    }
}
