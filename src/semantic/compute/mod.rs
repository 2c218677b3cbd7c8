//! Cosine similarity between one query vector and many candidates.
//!
//! The engine runs one of two strategies, chosen once at startup:
//!
//! - `Accelerated`: the query and the flattened candidate matrix are handed
//!   to a [`ComputeBackend`] which runs one work-item per candidate. Any
//!   backend failure during a call is logged and that call is answered by
//!   the sequential path instead; the strategy itself is kept.
//! - `Sequential`: plain host computation in f64. Always available and the
//!   reference the accelerated path is checked against.
//!
//! Both return `dot(a, b) / (|a| * |b|)`, or exactly `0.0` when either
//! magnitude is zero.

mod parallel;
mod sequential;

#[cfg(feature = "gpu")]
mod gpu;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::config::{BackendKind, ComputeConfig};

use super::cache::Embedding;

pub use parallel::WorkGroupBackend;
pub use sequential::cosine_similarity;

#[cfg(feature = "gpu")]
pub use gpu::GpuBackend;

/// Failures of the accelerated path. These never reach callers of the engine.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("buffer allocation failed: {0}")]
    Allocation(String),

    #[error("pipeline creation failed: {0}")]
    Pipeline(String),

    #[error("dispatch failed: {0}")]
    Dispatch(String),

    #[error("read-back failed: {0}")]
    Readback(String),
}

/// Errors callers can see: only contract violations.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ComputeError {
    #[error("candidate #{index} has {got} dimensions, query has {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        got: usize,
    },
}

/// A parallel executor for the cosine kernel.
pub trait ComputeBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Work-group width used when dispatching.
    fn preferred_width(&self) -> usize;

    /// Score `count` candidates stored row-major in `matrix`, each
    /// `query.len()` long. Returns one value per candidate.
    fn dispatch(&self, query: &[f32], matrix: &[f32], count: usize)
        -> Result<Vec<f32>, BackendError>;
}

/// Selected execution strategy.
#[derive(Clone)]
pub enum Strategy {
    Accelerated(Arc<dyn ComputeBackend>),
    Sequential,
}

/// Snapshot of the engine state for status output.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub strategy: &'static str,
    pub backend: Option<&'static str>,
    pub fallbacks: u64,
}

pub struct SimilarityEngine {
    strategy: Strategy,
    fallbacks: AtomicU64,
}

impl SimilarityEngine {
    /// Engine that only ever uses the host path.
    pub fn sequential() -> Self {
        Self::with_strategy(Strategy::Sequential)
    }

    pub fn with_backend(backend: Arc<dyn ComputeBackend>) -> Self {
        Self::with_strategy(Strategy::Accelerated(backend))
    }

    fn with_strategy(strategy: Strategy) -> Self {
        Self {
            strategy,
            fallbacks: AtomicU64::new(0),
        }
    }

    /// Probe the configured backend once. Probe failures select the
    /// sequential strategy for the lifetime of the engine.
    pub fn probe(config: &ComputeConfig) -> Self {
        let probed = match config.backend {
            BackendKind::Sequential => return Self::sequential(),
            BackendKind::Parallel => Self::probe_parallel(config),
            BackendKind::Gpu => Self::probe_gpu(config),
            BackendKind::Auto => {
                Self::probe_gpu(config).or_else(|_| Self::probe_parallel(config))
            }
        };

        match probed {
            Ok(backend) => {
                log::info!(
                    "accelerated similarity backend '{}' ready (work-group width {})",
                    backend.name(),
                    backend.preferred_width()
                );
                Self::with_backend(backend)
            }
            Err(err) => {
                log::warn!("accelerated backend disabled, using sequential path: {err}");
                Self::sequential()
            }
        }
    }

    fn probe_parallel(config: &ComputeConfig) -> Result<Arc<dyn ComputeBackend>, BackendError> {
        let backend = WorkGroupBackend::new(config.workgroup_size, config.threads)?;
        log::debug!("rayon compute pool with {} threads", backend.threads());
        Ok(Arc::new(backend))
    }

    #[cfg(feature = "gpu")]
    fn probe_gpu(config: &ComputeConfig) -> Result<Arc<dyn ComputeBackend>, BackendError> {
        let backend = GpuBackend::probe(config.workgroup_size)?;
        Ok(Arc::new(backend))
    }

    #[cfg(not(feature = "gpu"))]
    fn probe_gpu(_config: &ComputeConfig) -> Result<Arc<dyn ComputeBackend>, BackendError> {
        Err(BackendError::Unavailable(
            "built without the 'gpu' feature".to_string(),
        ))
    }

    pub fn status(&self) -> EngineStatus {
        let (strategy, backend) = match &self.strategy {
            Strategy::Accelerated(b) => ("accelerated", Some(b.name())),
            Strategy::Sequential => ("sequential", None),
        };
        EngineStatus {
            strategy,
            backend,
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
        }
    }

    pub fn is_accelerated(&self) -> bool {
        matches!(self.strategy, Strategy::Accelerated(_))
    }

    /// Cosine similarity of `query` against every candidate, index-aligned
    /// with `candidates`.
    pub async fn cosine_similarities(
        &self,
        query: &[f32],
        candidates: &[Embedding],
    ) -> Result<Vec<f64>, ComputeError> {
        check_dimensions(query, candidates)?;

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        match &self.strategy {
            Strategy::Accelerated(backend) if !query.is_empty() => {
                match run_accelerated(backend.clone(), query, candidates).await {
                    Ok(scores) => return Ok(scores),
                    Err(err) => {
                        self.fallbacks.fetch_add(1, Ordering::Relaxed);
                        log::warn!(
                            "backend '{}' failed, falling back to sequential path: {err}",
                            backend.name()
                        );
                    }
                }
            }
            _ => {}
        }

        Ok(sequential::cosine_all(query, candidates))
    }
}

fn check_dimensions(query: &[f32], candidates: &[Embedding]) -> Result<(), ComputeError> {
    match candidates
        .iter()
        .enumerate()
        .find(|(_, c)| c.len() != query.len())
    {
        Some((index, c)) => Err(ComputeError::DimensionMismatch {
            index,
            expected: query.len(),
            got: c.len(),
        }),
        None => Ok(()),
    }
}

/// Upload, dispatch and read back on a blocking thread.
///
/// Rows are scaled to a max-abs of 1 before upload; cosine is scale
/// invariant and device backends accumulate in f32.
async fn run_accelerated(
    backend: Arc<dyn ComputeBackend>,
    query: &[f32],
    candidates: &[Embedding],
) -> Result<Vec<f64>, BackendError> {
    let count = candidates.len();
    let query = unit_scaled(query).collect::<Vec<f32>>();
    let matrix: Vec<f32> = candidates.iter().flat_map(|c| unit_scaled(c)).collect();

    let output = tokio::task::spawn_blocking(move || backend.dispatch(&query, &matrix, count))
        .await
        .map_err(|e| BackendError::Dispatch(format!("compute task failed: {e}")))??;

    if output.len() != count {
        return Err(BackendError::Readback(format!(
            "expected {count} results, got {}",
            output.len()
        )));
    }

    if let Some(index) = output.iter().position(|v| !v.is_finite()) {
        return Err(BackendError::Readback(format!(
            "non-finite similarity {} for candidate #{index}",
            output[index]
        )));
    }

    Ok(output.into_iter().map(f64::from).collect())
}

/// `row / max(|row|)`, or the row unchanged when it is all zeros.
fn unit_scaled(row: &[f32]) -> impl Iterator<Item = f32> + '_ {
    let peak = row.iter().fold(0.0f32, |acc, x| acc.max(x.abs()));
    let scale = if peak > 0.0 && peak.is_finite() { peak } else { 1.0 };
    row.iter().map(move |x| x / scale)
}

/// Single-threaded cosine kernel shared by the host backends. Accumulates
/// in f64 like the sequential path and narrows the result.
pub(crate) fn cosine_kernel(a: &[f32], b: &[f32]) -> f32 {
    cosine_similarity(a, b) as f32
}
