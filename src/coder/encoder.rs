//! Reed-Solomon encoder.

use std::sync::Arc;

use tracing::trace;

use crate::buffers::resolve_encode;
use crate::coder::{CoderContext, CoderStatistics};
use crate::config::CoderConfig;
use crate::error::Result;
use crate::hardware::{ComputeKind, HardwareAccelerator, HardwareStatistics};
use crate::matrix::{default_generator, GeneratorMatrix, MatrixGenerator};

/// Computes m parity blocks from k data blocks.
///
/// # Examples
///
/// ```
/// use gf16_ec::prelude::*;
///
/// let mut encoder = ReedSolomonEncoder::new(CoderConfig::new(2, 1)).unwrap();
/// let (a, b) = ([0x12u8; 64], [0x34u8; 64]);
/// let mut parity = [0u8; 64];
///
/// encoder
///     .encode(&[Some(&a[..]), Some(&b[..])], &mut [Some(&mut parity[..])], 64)
///     .unwrap();
/// // the first parity row of the Vandermonde code is all ones
/// assert_eq!(parity[0], 0x12 ^ 0x34);
/// ```
#[derive(Debug)]
pub struct ReedSolomonEncoder {
    ctx: CoderContext,
}

impl ReedSolomonEncoder {
    /// Creates an encoder using the process-wide matrix generator and the
    /// backend selected by `config`.
    pub fn new(config: CoderConfig) -> Result<Self> {
        Self::with_parts(config, default_generator(), None)
    }

    /// Creates an encoder driving `accelerator` instead of the configured backend.
    pub fn with_accelerator(
        config: CoderConfig,
        accelerator: Arc<dyn HardwareAccelerator>,
    ) -> Result<Self> {
        Self::with_parts(config, default_generator(), Some(accelerator))
    }

    /// Creates an encoder whose generator matrix is built by `generator`.
    pub fn with_generator(config: CoderConfig, generator: &MatrixGenerator) -> Result<Self> {
        Self::with_parts(config, generator, None)
    }

    /// Creates an encoder from explicit parts.
    pub fn with_parts(
        config: CoderConfig,
        generator: &MatrixGenerator,
        accelerator: Option<Arc<dyn HardwareAccelerator>>,
    ) -> Result<Self> {
        Ok(Self {
            ctx: CoderContext::new(config, generator, accelerator)?,
        })
    }

    /// Encodes one stripe.
    ///
    /// `data` holds k blocks and `coding` m blocks, all exactly `block_size`
    /// bytes. Parity is written into `coding`; data is only read.
    pub fn encode(
        &mut self,
        data: &[Option<&[u8]>],
        coding: &mut [Option<&mut [u8]>],
        block_size: usize,
    ) -> Result<()> {
        let result = self.encode_stripe(data, coding, block_size);
        if result.is_err() && !self.ctx.is_released() {
            self.ctx.stats_mut().failed_calls += 1;
        }
        result
    }

    fn encode_stripe(
        &mut self,
        data: &[Option<&[u8]>],
        coding: &mut [Option<&mut [u8]>],
        block_size: usize,
    ) -> Result<()> {
        let generator = Arc::clone(self.ctx.generator()?);
        let (k, m) = (generator.data_blocks(), generator.parity_blocks());
        let (inputs, mut outputs) = resolve_encode(k, m, data, coding, block_size)?;

        trace!(id = self.ctx.id(), block_size, "encoding stripe");
        self.ctx.compute(
            ComputeKind::Encode,
            generator.packed(),
            &inputs,
            &mut outputs,
            block_size,
        )
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CoderConfig {
        self.ctx.config()
    }

    /// Returns the context id used in logs and completion tags.
    pub fn id(&self) -> u64 {
        self.ctx.id()
    }

    /// Returns the generator matrix, unless released.
    pub fn generator_matrix(&self) -> Result<&GeneratorMatrix> {
        Ok(self.ctx.generator()?.as_ref())
    }

    /// Returns the encoder's counters.
    pub fn get_statistics(&self) -> CoderStatistics {
        self.ctx.statistics()
    }

    /// Returns the backend's counters, unless released.
    pub fn hardware_statistics(&self) -> Option<HardwareStatistics> {
        self.ctx.hardware_statistics()
    }

    /// Frees the encoder's resources. Calling it again has no effect.
    pub fn release(&mut self) {
        self.ctx.release();
    }

    /// Returns true once [`release`](Self::release) has been called.
    pub fn is_released(&self) -> bool {
        self.ctx.is_released()
    }
}
