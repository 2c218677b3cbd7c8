//! Accelerated vs sequential similarity timing on random vectors.

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::semantic::{ComputeError, Embedding, SimilarityEngine};

/// Largest absolute difference tolerated between the two strategies.
pub const AGREEMENT_TOLERANCE: f64 = 1e-4;

#[derive(Debug, Clone, Copy)]
pub struct BenchOptions {
    pub dimensions: usize,
    pub count: usize,
    pub iterations: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Timing {
    pub avg: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl Timing {
    fn from_samples(samples: &[Duration]) -> Self {
        let total: Duration = samples.iter().sum();
        Self {
            avg: total / samples.len().max(1) as u32,
            min: samples.iter().min().copied().unwrap_or_default(),
            max: samples.iter().max().copied().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchReport {
    pub backend: Option<&'static str>,
    pub sequential: Timing,
    pub accelerated: Option<Timing>,
    /// Largest absolute difference seen between the two strategies
    pub max_difference: f64,
}

impl BenchReport {
    pub fn speedup(&self) -> Option<f64> {
        let accelerated = self.accelerated.as_ref()?.avg.as_secs_f64();
        if accelerated == 0.0 {
            return None;
        }
        Some(self.sequential.avg.as_secs_f64() / accelerated)
    }

    pub fn agrees(&self) -> bool {
        self.max_difference < AGREEMENT_TOLERANCE
    }
}

fn random_vector(dimensions: usize) -> Vec<f32> {
    (0..dimensions)
        .map(|_| rand::random::<f32>() * 2.0 - 1.0)
        .collect()
}

async fn time_engine(
    engine: &SimilarityEngine,
    query: &[f32],
    candidates: &[Embedding],
    iterations: usize,
    progress: &ProgressBar,
) -> Result<(Vec<Duration>, Vec<f64>), ComputeError> {
    let mut samples = Vec::with_capacity(iterations);
    let mut last = Vec::new();

    for _ in 0..iterations {
        let started = Instant::now();
        last = engine.cosine_similarities(query, candidates).await?;
        samples.push(started.elapsed());
        progress.inc(1);
    }

    Ok((samples, last))
}

/// Time `accelerated` against the sequential path on the same random data.
pub async fn run(
    accelerated: &SimilarityEngine,
    options: BenchOptions,
) -> Result<BenchReport, ComputeError> {
    let query = random_vector(options.dimensions);
    let candidates: Vec<Embedding> = (0..options.count)
        .map(|_| random_vector(options.dimensions).into())
        .collect();

    let runs = if accelerated.is_accelerated() { 2 } else { 1 };
    let progress = ProgressBar::new((options.iterations * runs) as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );

    progress.set_message("sequential");
    let sequential = SimilarityEngine::sequential();
    let (sequential_samples, reference) =
        time_engine(&sequential, &query, &candidates, options.iterations, &progress).await?;

    let mut report = BenchReport {
        backend: accelerated.status().backend,
        sequential: Timing::from_samples(&sequential_samples),
        accelerated: None,
        max_difference: 0.0,
    };

    if accelerated.is_accelerated() {
        progress.set_message(accelerated.status().backend.unwrap_or("accelerated"));
        let (samples, scores) =
            time_engine(accelerated, &query, &candidates, options.iterations, &progress).await?;

        report.accelerated = Some(Timing::from_samples(&samples));
        report.max_difference = scores
            .iter()
            .zip(reference.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
    }

    progress.finish_and_clear();
    Ok(report)
}
