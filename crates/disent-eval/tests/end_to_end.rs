// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use approx::assert_abs_diff_eq;
use disent_eval::io::{
    load_metadata, MetricHelpers, METRICS_FILENAME, METRIC_HELPERS_FILENAME, TEST_LOSSES_FILENAME,
};
use disent_eval::{
    BetaVaeLoss, EvalError, Evaluator, EvaluatorConfig, FactorSpec, InMemoryDataset,
    LinearGaussianModel, LossRecord, MetricsRecord, Reconstruction, RepresentationKind,
};
use ndarray::{array, Array2};
use std::path::Path;
use tracing::Span;

/// 4 × 6 grid rendered to three pixels, the third a blend of the first two.
fn grid() -> InMemoryDataset {
    let spec = FactorSpec::from_sizes(&["shape", "position"], &[4, 6]).unwrap();
    InMemoryDataset::from_factor_grid("grid", spec, 3, |v| {
        let (a, b) = (v[0] as f64 / 3.0, v[1] as f64 / 5.0);
        vec![a, b, 0.5 * (a + b)]
    })
    .unwrap()
}

/// Posterior means `z = (3 · v0, 3 · v1)` with a tight variance.
fn disentangled_model() -> LinearGaussianModel {
    LinearGaussianModel::new(
        array![[9.0, 0.0], [0.0, 15.0], [0.0, 0.0]],
        array![0.0, 0.0],
        array![-10.0, -10.0],
    )
    .unwrap()
}

/// Same encoding with two extra latents that ignore the image and keep a
/// unit-variance posterior.
fn model_with_noise_latents() -> LinearGaussianModel {
    LinearGaussianModel::new(
        array![[9.0, 0.0, 0.0, 0.0], [0.0, 15.0, 0.0, 0.0], [0.0, 0.0, 0.0, 0.0]],
        array![0.0, 0.0, 0.0, 0.0],
        array![-10.0, -10.0, 0.0, 0.0],
    )
    .unwrap()
}

fn config(dir: &Path) -> EvaluatorConfig {
    EvaluatorConfig::from_toml_str(&format!(
        r#"
        save_dir = "{}"
        batch_size = 5
        seed = 2024
        representations = ["VAE", "PCA", "ICA"]

        [entropy]
        n_pivots = 1000
        minibatch = 7

        [baseline]
        pca_samples = 400
        ica_samples = 600
        ica_max_iterations = 1000

        [probe]
        sample_size = 12
        dataset_size = 120
        hidden_dim = 16
        epochs = 120
        learning_rate = 0.05
        "#,
        dir.display()
    ))
    .unwrap()
}

#[test]
fn disentangled_grid_scores_near_perfectly() {
    let dir = tempfile::tempdir().unwrap();
    let mut evaluator = Evaluator::new(
        config(dir.path()),
        Box::new(BetaVaeLoss::new(1.0, Reconstruction::Gaussian)),
        Span::none(),
    )
    .unwrap();
    let outcome = evaluator
        .evaluate(&disentangled_model(), &grid(), true, true)
        .unwrap();

    let metrics = outcome.metrics.unwrap();
    assert_abs_diff_eq!(metrics.mig, 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(metrics.aam, 1.0, epsilon = 1e-6);
    assert!(metrics.dm[&RepresentationKind::Vae] >= 0.95);
    for kind in [RepresentationKind::Pca, RepresentationKind::Ica] {
        let acc = metrics.dm[&kind];
        assert!((0.0..=1.0).contains(&acc), "{kind}: {acc}");
    }
    assert!(metrics.nldm.is_none());

    let saved: MetricsRecord = load_metadata(dir.path(), METRICS_FILENAME).unwrap();
    assert_eq!(saved, metrics);
    let losses: LossRecord = load_metadata(dir.path(), TEST_LOSSES_FILENAME).unwrap();
    assert_eq!(Some(losses), outcome.losses);

    let helpers: MetricHelpers = load_metadata(dir.path(), METRIC_HELPERS_FILENAME).unwrap();
    assert_eq!(helpers.mutual_information.dim(), (2, 2));
    assert_abs_diff_eq!(helpers.mutual_information[[0, 0]], 4f64.ln(), epsilon = 1e-6);
    assert_abs_diff_eq!(helpers.mutual_information[[1, 1]], 6f64.ln(), epsilon = 1e-6);
    assert_abs_diff_eq!(helpers.mutual_information[[0, 1]], 0.0, epsilon = 1e-6);
    assert_eq!(helpers.mig_k.len(), 2);
    assert!(helpers.excess_entropies.iter().all(|h| h.is_finite()));
}

#[test]
fn uninformative_latents_leave_mig_and_aam_near_one() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.representations = vec!["VAE".into()];
    let mut evaluator = Evaluator::new(cfg, Box::<BetaVaeLoss>::default(), Span::none()).unwrap();
    let metrics = evaluator
        .compute_metrics(&model_with_noise_latents(), &grid())
        .unwrap();
    assert!(metrics.mig > 0.9, "MIG {}", metrics.mig);
    assert!(metrics.aam > 0.9, "AAM {}", metrics.aam);
    assert_abs_diff_eq!(metrics.mig, 1.0, epsilon = 1e-6);

    let helpers: MetricHelpers = load_metadata(dir.path(), METRIC_HELPERS_FILENAME).unwrap();
    assert_eq!(helpers.mutual_information.dim(), (2, 4));
    for factor in 0..2 {
        for latent in 2..4 {
            assert_abs_diff_eq!(
                helpers.mutual_information[[factor, latent]],
                0.0,
                epsilon = 1e-6
            );
        }
    }
}

#[test]
fn same_seed_reproduces_the_metrics() {
    let run = || {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.representations = vec!["VAE".into(), "PCA".into()];
        let mut evaluator =
            Evaluator::new(cfg, Box::<BetaVaeLoss>::default(), Span::none()).unwrap();
        evaluator
            .compute_metrics(&disentangled_model(), &grid())
            .unwrap()
    };
    assert_eq!(run(), run());
}

#[test]
fn non_linear_probe_is_reported_when_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.representations = vec!["vae".into()];
    cfg.probe.nonlinear_probe = true;
    let mut evaluator = Evaluator::new(cfg, Box::<BetaVaeLoss>::default(), Span::none()).unwrap();
    let metrics = evaluator
        .compute_metrics(&disentangled_model(), &grid())
        .unwrap();
    let nldm = metrics.nldm.unwrap();
    assert_eq!(nldm.len(), 1);
    assert!(nldm[&RepresentationKind::Vae] >= 0.9);

    let text = std::fs::read_to_string(dir.path().join(METRIC_HELPERS_FILENAME)).unwrap();
    assert!(text.contains("\"mig_k\""));
}

#[test]
fn exhausted_ica_budget_aborts_before_saving() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.baseline.ica_max_iterations = 1;
    cfg.baseline.ica_tolerance = 1e-300;
    let mut evaluator = Evaluator::new(cfg, Box::<BetaVaeLoss>::default(), Span::none()).unwrap();
    let err = evaluator
        .evaluate(&disentangled_model(), &grid(), true, false)
        .unwrap_err();
    assert!(matches!(err, EvalError::IcaNotConverged { iterations: 1, .. }));
    assert!(!dir.path().join(METRICS_FILENAME).exists());

    let mut cfg = config(dir.path());
    cfg.baseline.ica_max_iterations = 1;
    cfg.baseline.ica_tolerance = 1e-300;
    cfg.representations = vec!["VAE".into(), "PCA".into()];
    let mut evaluator = Evaluator::new(cfg, Box::<BetaVaeLoss>::default(), Span::none()).unwrap();
    let metrics = evaluator
        .compute_metrics(&disentangled_model(), &grid())
        .unwrap();
    assert_eq!(metrics.dm.len(), 2);
}

#[test]
fn missing_factor_metadata_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let images = Array2::from_shape_fn((24, 3), |(i, j)| (i * 3 + j) as f64 / 72.0);
    let plain = InMemoryDataset::new("celeba", images, None).unwrap();
    let mut evaluator =
        Evaluator::new(config(dir.path()), Box::<BetaVaeLoss>::default(), Span::none()).unwrap();
    let err = evaluator
        .evaluate(&disentangled_model(), &plain, true, false)
        .unwrap_err();
    assert!(matches!(err, EvalError::MissingFactors { dataset } if dataset == "celeba"));
    assert!(!dir.path().join(METRICS_FILENAME).exists());
}

#[test]
fn loss_pass_runs_without_factor_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let images = Array2::from_elem((7, 3), 0.5);
    let plain = InMemoryDataset::new("plain", images, None).unwrap();
    let mut evaluator =
        Evaluator::new(config(dir.path()), Box::<BetaVaeLoss>::default(), Span::none()).unwrap();
    let outcome = evaluator
        .evaluate(&disentangled_model(), &plain, false, true)
        .unwrap();
    assert!(outcome.metrics.is_none());
    let losses = outcome.losses.unwrap();
    assert!(losses["loss"].is_finite());
    assert!(dir.path().join(TEST_LOSSES_FILENAME).exists());
}
