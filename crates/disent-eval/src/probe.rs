// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Classifier probe behind the DM score.

use crate::config::ProbeConfig;
use crate::error::{EvalError, Result};
use crate::paired::ProbeSplit;
use disent_nn::{
    Classifier, ClassifierShape, EpochStats, Module, ModuleTrainer, NllLoss, NnError, Optimizer,
};
use rand::{rngs::StdRng, SeedableRng};
use tracing::{debug, info, Span};

/// Lifecycle of the probe's classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Untrained,
    Training,
    Evaluating,
}

/// Architecture and schedule of one probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeSettings {
    pub hidden_dim: usize,
    pub epochs: usize,
    pub eval_every: usize,
    pub optimizer: Optimizer,
    pub non_linear: bool,
}

impl ProbeSettings {
    pub fn from_config(config: &ProbeConfig, non_linear: bool) -> Result<Self> {
        Ok(Self {
            hidden_dim: config.hidden_dim,
            epochs: config.epochs,
            eval_every: config.eval_every.max(1),
            optimizer: config.optimizer.build(config.learning_rate)?,
            non_linear,
        })
    }
}

/// Outcome of fitting the probe on one representation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub representation: String,
    pub train_accuracy: f64,
    /// The DM score.
    pub test_accuracy: f64,
    /// Scalar weights in the classifier that produced the scores.
    pub parameters: usize,
    pub history: Vec<EpochStats>,
}

/// Re-initialisable classifier probe shared by every representation.
///
/// Every fit starts from the weights drawn by `seed`, so the score of a
/// representation does not depend on which representations came before it.
pub struct DisentanglementProbe {
    settings: ProbeSettings,
    classes: usize,
    seed: u64,
    classifier: Option<Classifier>,
    state: ProbeState,
    span: Span,
}

impl DisentanglementProbe {
    pub fn new(settings: ProbeSettings, classes: usize, seed: u64, span: Span) -> Self {
        Self {
            settings,
            classes,
            seed,
            classifier: None,
            state: ProbeState::Untrained,
            span,
        }
    }

    pub fn state(&self) -> ProbeState {
        self.state
    }

    /// Returns the classifier to its seeded initial weights.
    pub fn reset(&mut self) -> Result<()> {
        if let Some(classifier) = self.classifier.as_mut() {
            classifier.reset_parameters(&mut StdRng::seed_from_u64(self.seed))?;
        }
        self.state = ProbeState::Untrained;
        Ok(())
    }

    fn prepare(&mut self, input_dim: usize) -> Result<()> {
        let reusable = self
            .classifier
            .as_ref()
            .is_some_and(|c| c.shape().input_dim == input_dim);
        if reusable {
            self.reset()?;
        } else {
            let shape = ClassifierShape {
                input_dim,
                hidden_dim: self.settings.hidden_dim,
                classes: self.classes,
                non_linear: self.settings.non_linear,
            };
            self.classifier = Some(Classifier::new(
                shape,
                &mut StdRng::seed_from_u64(self.seed),
            )?);
            self.state = ProbeState::Untrained;
        }
        Ok(())
    }

    /// Trains full-batch on `split.train` and scores `split.test`.
    pub fn fit(&mut self, representation: &str, split: &ProbeSplit) -> Result<ProbeReport> {
        if split.train.is_empty() || split.test.is_empty() {
            return Err(EvalError::EmptyInput("probe dataset"));
        }
        self.prepare(split.train.features.ncols())?;
        let Some(classifier) = self.classifier.as_mut() else {
            return Err(EvalError::EmptyInput("probe classifier"));
        };
        let diverged = |epoch: usize| {
            let representation = representation.to_string();
            move |source: NnError| match source {
                NnError::NonFiniteValue { .. } => EvalError::ClassifierDiverged {
                    representation,
                    epoch,
                    source,
                },
                other => EvalError::Nn(other),
            }
        };

        let parameters = classifier.parameter_count()?;
        let span = &self.span;
        info!(
            parent: span,
            representation,
            parameters,
            learning_rate = self.settings.optimizer.learning_rate(),
            epochs = self.settings.epochs,
            "training the classifier probe"
        );
        self.state = ProbeState::Training;
        let trainer = ModuleTrainer::new(self.settings.optimizer);
        let mut loss = NllLoss::new();
        let mut history = Vec::with_capacity(self.settings.epochs);
        for epoch in 1..=self.settings.epochs {
            let train_loss = trainer
                .train_batch(
                    &mut *classifier,
                    &mut loss,
                    &split.train.features,
                    split.train.labels.as_slice(),
                )
                .map_err(diverged(epoch))?;
            let held_out_loss = if epoch % self.settings.eval_every == 0 {
                let value = trainer
                    .evaluate(
                        &*classifier,
                        &mut loss,
                        &split.test.features,
                        split.test.labels.as_slice(),
                    )
                    .map_err(diverged(epoch))?;
                debug!(
                    parent: span,
                    representation,
                    epoch,
                    epochs = self.settings.epochs,
                    train_loss,
                    held_out_loss = value,
                    "probe epoch"
                );
                Some(value)
            } else {
                None
            };
            history.push(EpochStats {
                epoch,
                train_loss,
                held_out_loss,
            });
        }

        self.state = ProbeState::Evaluating;
        let train_accuracy = classifier.accuracy(&split.train.features, &split.train.labels)?;
        let test_accuracy = classifier.accuracy(&split.test.features, &split.test.labels)?;
        info!(
            parent: &self.span,
            representation,
            train_accuracy,
            test_accuracy,
            "probe accuracy"
        );
        Ok(ProbeReport {
            representation: representation.to_string(),
            train_accuracy,
            test_accuracy,
            parameters,
            history,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paired::ProbeDataset;
    use ndarray::{array, Array2};

    fn settings() -> ProbeSettings {
        ProbeSettings {
            hidden_dim: 16,
            epochs: 60,
            eval_every: 10,
            optimizer: Optimizer::adam(0.05).unwrap(),
            non_linear: false,
        }
    }

    fn split(scale: f64) -> ProbeSplit {
        let features = array![
            [0.0, 1.0, 0.9],
            [1.0, 0.0, 1.1],
            [0.8, 1.2, 0.0],
            [0.1, 0.7, 1.3],
            [1.2, 0.1, 0.8],
            [0.9, 0.9, 0.2],
        ] * scale;
        let labels = vec![0, 1, 2, 0, 1, 2];
        ProbeSplit {
            train: ProbeDataset {
                features: features.clone(),
                labels: labels.clone(),
            },
            test: ProbeDataset { features, labels },
        }
    }

    #[test]
    fn separable_differences_are_classified() {
        let mut probe = DisentanglementProbe::new(settings(), 3, 7, Span::none());
        assert_eq!(probe.state(), ProbeState::Untrained);
        let report = probe.fit("VAE", &split(1.0)).unwrap();
        assert_eq!(probe.state(), ProbeState::Evaluating);
        assert_eq!(report.test_accuracy, 1.0);
        assert_eq!(report.parameters, 3 * 16 + 16 + 16 * 3 + 3);
        assert_eq!(report.history.len(), 60);
        assert!(report.history[9].held_out_loss.is_some());
        assert!(report.history[8].held_out_loss.is_none());
        assert!(report.history[59].train_loss < report.history[0].train_loss);
    }

    #[test]
    fn scores_do_not_depend_on_fit_order() {
        let mut alone = DisentanglementProbe::new(settings(), 3, 7, Span::none());
        let expected = alone.fit("PCA", &split(2.0)).unwrap();

        let mut shared = DisentanglementProbe::new(settings(), 3, 7, Span::none());
        shared.fit("VAE", &split(1.0)).unwrap();
        let after = shared.fit("PCA", &split(2.0)).unwrap();
        assert_eq!(expected, after);
    }

    #[test]
    fn non_finite_loss_reports_divergence() {
        let mut probe = DisentanglementProbe::new(settings(), 3, 7, Span::none());
        let mut bad = split(1.0);
        bad.train.features = Array2::from_elem((6, 3), f64::NAN);
        let err = probe.fit("ICA", &bad).unwrap_err();
        assert!(matches!(
            err,
            EvalError::ClassifierDiverged { ref representation, epoch: 1, .. } if representation == "ICA"
        ));
    }
}
