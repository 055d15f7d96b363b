// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::loss::Loss;
use crate::module::Module;
use crate::optim::Optimizer;
use crate::NnResult;
use ndarray::Array2;

/// Loss summary for a single epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochStats {
    pub epoch: usize,
    pub train_loss: f64,
    /// Only present on epochs where held-out data was scored.
    pub held_out_loss: Option<f64>,
}

/// Keeps gradient clearing, backprop and parameter updates aligned.
#[derive(Debug, Clone, Copy)]
pub struct ModuleTrainer {
    optimizer: Optimizer,
}

impl ModuleTrainer {
    pub fn new(optimizer: Optimizer) -> Self {
        Self { optimizer }
    }

    pub fn optimizer(&self) -> &Optimizer {
        &self.optimizer
    }

    /// Clears accumulated gradients.
    pub fn zero<M: Module + ?Sized>(&self, module: &mut M) -> NnResult<()> {
        module.zero_accumulators()
    }

    /// Applies the parameter updates.
    pub fn step<M: Module + ?Sized>(&self, module: &mut M) -> NnResult<()> {
        module.apply_step(&self.optimizer)
    }

    /// Runs one forward/backward/update cycle on the full batch and returns
    /// the loss measured before the update.
    pub fn train_batch<M, L>(
        &self,
        module: &mut M,
        loss: &mut L,
        input: &Array2<f64>,
        target: &L::Target,
    ) -> NnResult<f64>
    where
        M: Module + ?Sized,
        L: Loss,
    {
        self.zero(module)?;
        let prediction = module.forward(input)?;
        let value = loss.forward(&prediction, target)?;
        let grad = loss.backward(&prediction, target)?;
        module.backward(input, &grad)?;
        self.step(module)?;
        Ok(value)
    }

    /// Scores `input` without touching any parameter.
    pub fn evaluate<M, L>(
        &self,
        module: &M,
        loss: &mut L,
        input: &Array2<f64>,
        target: &L::Target,
    ) -> NnResult<f64>
    where
        M: Module + ?Sized,
        L: Loss,
    {
        let prediction = module.forward(input)?;
        loss.forward(&prediction, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{Linear, LogSoftmax, Sequential};
    use crate::loss::NllLoss;
    use crate::module::snapshot;
    use ndarray::array;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn evaluate_leaves_parameters_untouched() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut net = Sequential::new();
        net.push(Linear::new("fc", 2, 3, &mut rng).unwrap());
        net.push(LogSoftmax::new());
        let trainer = ModuleTrainer::new(Optimizer::sgd(0.1).unwrap());
        let input = array![[1.0, -1.0], [0.5, 0.5]];
        let before = snapshot(&net);
        let held_out = trainer
            .evaluate(&net, &mut NllLoss::new(), &input, &[0, 2])
            .unwrap();
        assert!(held_out.is_finite() && held_out > 0.0);
        assert_eq!(before, snapshot(&net));

        let train = trainer
            .train_batch(&mut net, &mut NllLoss::new(), &input, &[0, 2])
            .unwrap();
        assert_eq!(train, held_out);
        assert_ne!(before, snapshot(&net));
    }
}
