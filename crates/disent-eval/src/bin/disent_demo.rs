// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Evaluates a synthetic, perfectly disentangled linear-Gaussian VAE on a
//! rendered factor grid. Useful for checking a config before pointing it at
//! a real model.

use disent_config::tracing::init_tracing;
use disent_eval::{
    BetaVaeLoss, Evaluator, EvaluatorConfig, FactorSpec, InMemoryDataset, LinearGaussianModel,
    Reconstruction,
};
use ndarray::{Array1, Array2};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info_span;

fn print_help() {
    println!(
        "usage: disent_demo [--config PATH] [--factors 4,6] [--beta 1.0] [--metrics-only]\n\
         \n\
         Renders one pixel per factor plus a blend pixel, encodes factor k\n\
         into latent k and writes metrics.log / test_losses.log to save_dir."
    );
}

fn parse_sizes(raw: &str) -> Option<Vec<usize>> {
    raw.split(',')
        .map(|part| part.trim().parse::<usize>().ok())
        .collect()
}

fn main() -> ExitCode {
    let mut config_path: Option<PathBuf> = None;
    let mut sizes = vec![4usize, 6];
    let mut beta = 1.0;
    let mut losses = true;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let Some(path) = args.next() else {
                    eprintln!("disent_demo: --config requires a path");
                    return ExitCode::from(2);
                };
                config_path = Some(PathBuf::from(path));
            }
            "--factors" => {
                let Some(parsed) = args.next().as_deref().and_then(parse_sizes) else {
                    eprintln!("disent_demo: --factors expects comma-separated sizes");
                    return ExitCode::from(2);
                };
                sizes = parsed;
            }
            "--beta" => {
                let Some(value) = args.next().and_then(|v| v.parse::<f64>().ok()) else {
                    eprintln!("disent_demo: --beta expects a number");
                    return ExitCode::from(2);
                };
                beta = value;
            }
            "--metrics-only" => losses = false,
            "--help" | "-h" => {
                print_help();
                return ExitCode::SUCCESS;
            }
            other => {
                eprintln!("disent_demo: unknown argument '{other}'");
                print_help();
                return ExitCode::from(2);
            }
        }
    }

    if let Err(err) = init_tracing() {
        eprintln!("disent_demo: {err}");
    }
    match run(config_path, &sizes, beta, losses) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("disent_demo: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(
    config_path: Option<PathBuf>,
    sizes: &[usize],
    beta: f64,
    losses: bool,
) -> disent_eval::Result<()> {
    let config = match config_path {
        Some(path) => EvaluatorConfig::load(path)?,
        None => EvaluatorConfig::default(),
    };
    let names: Vec<String> = (0..sizes.len()).map(|k| format!("factor_{k}")).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let spec = FactorSpec::from_sizes(&name_refs, sizes)?;
    let factors = spec.len();

    let dataset = InMemoryDataset::from_factor_grid("synthetic-grid", spec, factors + 1, |values| {
        let mut pixels: Vec<f64> = values
            .iter()
            .zip(sizes)
            .map(|(&v, &size)| v as f64 / size.saturating_sub(1).max(1) as f64)
            .collect();
        let blend = pixels.iter().sum::<f64>() / factors as f64;
        pixels.push(blend);
        pixels
    })?;

    let weights = Array2::from_shape_fn((factors + 1, factors), |(pixel, latent)| {
        if pixel == latent {
            3.0 * sizes[latent].saturating_sub(1).max(1) as f64
        } else {
            0.0
        }
    });
    let model = LinearGaussianModel::new(
        weights,
        Array1::zeros(factors),
        Array1::from_elem(factors, -10.0),
    )?;

    let span = info_span!("disent_demo", dataset = "synthetic-grid");
    let loss = BetaVaeLoss::new(beta, Reconstruction::Gaussian);
    let mut evaluator = Evaluator::new(config, Box::new(loss), span)?;
    let outcome = evaluator.evaluate(&model, &dataset, true, losses)?;
    if let Some(metrics) = outcome.metrics {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
    }
    if let Some(losses) = outcome.losses {
        println!("{}", serde_json::to_string_pretty(&losses)?);
    }
    Ok(())
}
