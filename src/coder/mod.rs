//! Encoder and decoder contexts.
//!
//! A context owns everything a (k, m) code needs across calls: the validated
//! configuration, the generator matrix, the compute backend and the completion
//! barrier used to join split sub-operations. Contexts are used by one caller
//! at a time (`&mut self`); independent contexts may run concurrently.
//!
//! Releasing a context frees its resources. Release is idempotent and every
//! later encode or decode fails with [`Error::Released`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

mod decode_matrix;
mod decoder;
mod encoder;

pub use decode_matrix::DecodeMatrixCache;
pub use decoder::ReedSolomonDecoder;
pub use encoder::ReedSolomonEncoder;

use crate::config::CoderConfig;
use crate::error::{Error, Result};
use crate::hardware::{
    select_accelerator, ComputeKind, HardwareAccelerator, HardwareCapabilities, HardwareStatistics,
};
use crate::matrix::{GeneratorMatrix, MatrixGenerator};
use crate::parallel::{dispatch, CompletionBarrier, SplitPlan};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Alignment unit of the bulk path: the configured one, raised to the
/// backend's preference when that is a larger power of two.
fn split_alignment(configured: usize, capabilities: &HardwareCapabilities) -> usize {
    let preferred = capabilities.preferred_alignment;
    if preferred.is_power_of_two() {
        configured.max(preferred)
    } else {
        configured
    }
}

/// Counters of one encoder or decoder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoderStatistics {
    /// Calls that ran a compute operation
    pub compute_calls: usize,
    /// Calls that returned an error
    pub failed_calls: usize,
    /// Calls that had nothing to reconstruct
    pub skipped_calls: usize,
    /// Calls split into a bulk and a remainder sub-operation
    pub split_calls: usize,
    /// Sub-operations issued to the backend
    pub sub_operations: usize,
    /// Bytes written to output blocks
    pub bytes_processed: u64,
    /// Decode matrix rebuilds
    pub matrix_rebuilds: usize,
    /// Scratch arena allocations
    pub scratch_allocations: usize,
    /// Total compute time in milliseconds
    pub total_time_ms: f64,
}

impl CoderStatistics {
    /// Serializes the counters to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug)]
struct ContextResources {
    generator: Arc<GeneratorMatrix>,
    accelerator: Arc<dyn HardwareAccelerator>,
    capabilities: HardwareCapabilities,
    barrier: CompletionBarrier,
}

/// State shared by encoders and decoders.
#[derive(Debug)]
pub(crate) struct CoderContext {
    id: u64,
    config: CoderConfig,
    resources: Option<ContextResources>,
    stats: CoderStatistics,
}

impl CoderContext {
    /// Validates `config`, picks the backend and builds the generator.
    pub(crate) fn new(
        config: CoderConfig,
        generator: &MatrixGenerator,
        accelerator: Option<Arc<dyn HardwareAccelerator>>,
    ) -> Result<Self> {
        let (k, m) = (config.data_blocks(), config.parity_blocks());
        Self::create(config, generator, accelerator).map_err(|e| {
            error!(k, m, "coder context creation failed: {}", e);
            e
        })
    }

    fn create(
        config: CoderConfig,
        generator: &MatrixGenerator,
        accelerator: Option<Arc<dyn HardwareAccelerator>>,
    ) -> Result<Self> {
        config.validate()?;

        let accelerator = match accelerator {
            Some(accelerator) => accelerator,
            None => select_accelerator(config.hardware_target())?,
        };
        if !accelerator.is_available() {
            return Err(Error::HardwareUnavailable(format!(
                "{} backend is not available",
                accelerator.accelerator_type()
            )));
        }

        let matrix = Arc::new(generator.generate(
            config.data_blocks(),
            config.parity_blocks(),
            config.matrix_type(),
        )?);

        accelerator.initialize(&matrix).map_err(|e| match e {
            Error::HardwareInitialization(_) => e,
            other => Error::HardwareInitialization(other.to_string()),
        })?;

        let capabilities = accelerator.capabilities();
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        info!(
            id,
            k = config.data_blocks(),
            m = config.parity_blocks(),
            matrix = ?config.matrix_type(),
            backend = %accelerator.accelerator_type(),
            alignment = capabilities.preferred_alignment,
            concurrent = capabilities.concurrent_submissions,
            "coder context created"
        );

        Ok(Self {
            id,
            config,
            resources: Some(ContextResources {
                generator: matrix,
                accelerator,
                capabilities,
                barrier: CompletionBarrier::new(),
            }),
            stats: CoderStatistics::default(),
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn config(&self) -> &CoderConfig {
        &self.config
    }

    fn resources(&self) -> Result<&ContextResources> {
        self.resources.as_ref().ok_or(Error::Released)
    }

    pub(crate) fn generator(&self) -> Result<&Arc<GeneratorMatrix>> {
        Ok(&self.resources()?.generator)
    }

    pub(crate) fn is_released(&self) -> bool {
        self.resources.is_none()
    }

    /// Runs one matrix application and records it.
    pub(crate) fn compute(
        &mut self,
        kind: ComputeKind,
        matrix: &[u8],
        inputs: &[&[u8]],
        outputs: &mut [&mut [u8]],
        block_size: usize,
    ) -> Result<()> {
        let resources = self.resources.as_ref().ok_or(Error::Released)?;
        let plan = SplitPlan::new(
            block_size,
            split_alignment(self.config.alignment(), &resources.capabilities),
            self.config.split_unaligned(),
        );

        let start = Instant::now();
        let report = dispatch(
            resources.accelerator.as_ref(),
            &resources.barrier,
            self.id,
            kind,
            plan,
            resources.capabilities.concurrent_submissions,
            matrix,
            inputs,
            outputs,
        )?;

        self.stats.compute_calls += 1;
        self.stats.sub_operations += report.issued;
        if report.issued > 1 {
            self.stats.split_calls += 1;
        }
        self.stats.bytes_processed += (block_size * outputs.len()) as u64;
        self.stats.total_time_ms += start.elapsed().as_secs_f64() * 1000.0;

        Ok(())
    }

    pub(crate) fn stats_mut(&mut self) -> &mut CoderStatistics {
        &mut self.stats
    }

    pub(crate) fn statistics(&self) -> CoderStatistics {
        self.stats.clone()
    }

    pub(crate) fn hardware_statistics(&self) -> Option<HardwareStatistics> {
        self.resources
            .as_ref()
            .map(|resources| resources.accelerator.get_statistics())
    }

    /// Frees the context's resources. Returns false if already released.
    pub(crate) fn release(&mut self) -> bool {
        match self.resources.take() {
            Some(_) => {
                debug!(id = self.id, "coder context released");
                true
            }
            None => false,
        }
    }
}
