//! Work-group dispatch on a dedicated rayon pool.
//!
//! Mirrors the shape of a compute-shader launch: the output buffer is split
//! into groups of `width` slots, groups are scheduled across the pool and
//! every slot (work-item) runs the full kernel for one candidate row.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use super::{cosine_kernel, BackendError, ComputeBackend};

pub struct WorkGroupBackend {
    pool: ThreadPool,
    width: usize,
}

impl WorkGroupBackend {
    /// Build the pool. `threads == 0` lets rayon pick the thread count.
    pub fn new(width: usize, threads: usize) -> Result<Self, BackendError> {
        if width == 0 {
            return Err(BackendError::Unavailable(
                "work-group width must be positive".to_string(),
            ));
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|idx| format!("semex-compute-{idx}"))
            .build()
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        Ok(Self { pool, width })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl ComputeBackend for WorkGroupBackend {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn preferred_width(&self) -> usize {
        self.width
    }

    fn dispatch(
        &self,
        query: &[f32],
        matrix: &[f32],
        count: usize,
    ) -> Result<Vec<f32>, BackendError> {
        let dims = query.len();
        if matrix.len() != dims * count {
            return Err(BackendError::Allocation(format!(
                "matrix holds {} values, expected {count} rows of {dims}",
                matrix.len()
            )));
        }

        let mut output = vec![0.0f32; count];
        let width = self.width;

        self.pool.install(|| {
            output
                .par_chunks_mut(width)
                .enumerate()
                .for_each(|(group, slots)| {
                    for (lane, slot) in slots.iter_mut().enumerate() {
                        let row = group * width + lane;
                        let offset = row * dims;
                        *slot = cosine_kernel(query, &matrix[offset..offset + dims]);
                    }
                });
        });

        Ok(output)
    }
}
