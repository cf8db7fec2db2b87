//! Software backend.
//!
//! Multiplies through per-coefficient byte tables (see
//! [`galois::mul_region_xor`](crate::galois::mul_region_xor)). Large calls
//! spread output blocks over the rayon pool, one output per task.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use rayon::prelude::*;

use crate::error::Result;
use crate::galois;
use crate::hardware::{
    check_apply_shape, host_capabilities, AcceleratorType, ComputeKind, HardwareAccelerator,
    HardwareCapabilities, HardwareStatistics,
};

/// Below this many bytes per block a call stays on the calling thread.
const PARALLEL_THRESHOLD: usize = 16 * 1024;

/// Portable GF(2^4) matrix backend.
#[derive(Debug)]
pub struct CPUAccelerator {
    /// Statistics for compute operations
    stats: RwLock<HardwareStatistics>,
    parallel_threshold: usize,
}

impl Default for CPUAccelerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CPUAccelerator {
    /// Creates a new software backend.
    pub fn new() -> Self {
        Self {
            stats: RwLock::new(HardwareStatistics::default()),
            parallel_threshold: PARALLEL_THRESHOLD,
        }
    }

    /// Overrides the block length at which outputs are computed in parallel.
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    fn fill_output(column: usize, cols: usize, matrix: &[u8], inputs: &[&[u8]], output: &mut [u8]) {
        output.fill(0);
        for (row, input) in inputs.iter().enumerate() {
            galois::mul_region_xor(matrix[row * cols + column], input, output);
        }
    }
}

impl HardwareAccelerator for CPUAccelerator {
    fn accelerator_type(&self) -> AcceleratorType {
        AcceleratorType::Cpu
    }

    fn is_available(&self) -> bool {
        true
    }

    fn capabilities(&self) -> HardwareCapabilities {
        host_capabilities()
    }

    fn apply_matrix(
        &self,
        kind: ComputeKind,
        matrix: &[u8],
        inputs: &[&[u8]],
        outputs: &mut [&mut [u8]],
    ) -> Result<()> {
        let len = match check_apply_shape(matrix, inputs, outputs) {
            Ok(len) => len,
            Err(e) => {
                self.stats.write().failed_operations += 1;
                return Err(e);
            }
        };

        let start = Instant::now();
        let cols = outputs.len();

        if len >= self.parallel_threshold && cols > 1 {
            outputs
                .par_iter_mut()
                .enumerate()
                .for_each(|(c, output)| Self::fill_output(c, cols, matrix, inputs, output));
        } else {
            for (c, output) in outputs.iter_mut().enumerate() {
                Self::fill_output(c, cols, matrix, inputs, output);
            }
        }

        // Update statistics
        {
            let mut stats = self.stats.write();
            match kind {
                ComputeKind::Encode => stats.encode_operations += 1,
                ComputeKind::Decode => stats.decode_operations += 1,
            }
            stats.bytes_processed += (len * cols) as u64;
            stats.total_time_ms += start.elapsed().as_secs_f64() * 1000.0;
        }

        Ok(())
    }

    fn get_statistics(&self) -> HardwareStatistics {
        self.stats.read().clone()
    }
}

/// Registers the software backend.
pub fn register_cpu_accelerators(accelerators: &mut Vec<Arc<dyn HardwareAccelerator>>) -> Result<()> {
    accelerators.push(Arc::new(CPUAccelerator::new()));
    Ok(())
}
