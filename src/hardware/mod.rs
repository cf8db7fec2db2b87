//! Compute backends for matrix application over GF(2^4).
//!
//! Encoding and decoding both reduce to one primitive: given a coefficient
//! matrix of `rows` inputs by `cols` outputs, fill every output block with the
//! GF(2^4) dot product of its matrix column and the input blocks. Backends
//! implement that primitive behind the [`HardwareAccelerator`] trait, so an
//! offload engine can replace the software path without touching the coders.
//!
//! Backends are selected per context through [`select_accelerator`], or
//! injected directly when a context is created.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub mod cpu;

pub use cpu::{register_cpu_accelerators, CPUAccelerator};

use crate::config::{HardwareTarget, DEFAULT_ALIGNMENT, MAX_BLOCKS};
use crate::error::{Error, Result};
use crate::matrix::GeneratorMatrix;

/// Types of compute backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AcceleratorType {
    /// Portable software implementation
    Cpu,
    /// External offload engine (e.g. a NIC or storage controller)
    Offload,
}

impl std::fmt::Display for AcceleratorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AcceleratorType::Cpu => write!(f, "CPU"),
            AcceleratorType::Offload => write!(f, "Offload"),
        }
    }
}

/// Kind of coding work a compute call performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComputeKind {
    /// Data blocks in, parity blocks out
    Encode,
    /// Survivor blocks in, erased blocks out
    Decode,
}

/// Capabilities profile of a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareCapabilities {
    /// Number of processing units the backend can use
    pub processor_count: usize,
    /// Largest stripe (k + m) the backend accepts
    pub max_blocks: usize,
    /// Preferred alignment of the bulk path in bytes
    pub preferred_alignment: usize,
    /// Whether the backend may be driven from several threads at once
    pub concurrent_submissions: bool,
}

/// Performance counters of a backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HardwareStatistics {
    /// Number of encode sub-operations executed
    pub encode_operations: usize,
    /// Number of decode sub-operations executed
    pub decode_operations: usize,
    /// Number of sub-operations that returned an error
    pub failed_operations: usize,
    /// Bytes written to output blocks
    pub bytes_processed: u64,
    /// Total processing time in milliseconds
    pub total_time_ms: f64,
}

/// Core trait for compute backends.
///
/// `apply_matrix` receives `inputs.len()` rows and `outputs.len()` columns;
/// `matrix[r * cols + c]` is the coefficient of input r in output c. All input
/// and output slices have the same length. Outputs are overwritten, not
/// accumulated into.
pub trait HardwareAccelerator: std::fmt::Debug + Send + Sync {
    /// Returns the type of this backend.
    fn accelerator_type(&self) -> AcceleratorType;

    /// Returns whether this backend can be used on the current system.
    fn is_available(&self) -> bool;

    /// Returns the capabilities of this backend.
    fn capabilities(&self) -> HardwareCapabilities;

    /// Prepares the backend for a context using `generator`.
    ///
    /// Called once per context, after the generator is built. Backends that
    /// need no per-context state keep the default.
    fn initialize(&self, generator: &GeneratorMatrix) -> Result<()> {
        let _ = generator;
        Ok(())
    }

    /// Applies `matrix` to `inputs`, writing `outputs`.
    fn apply_matrix(
        &self,
        kind: ComputeKind,
        matrix: &[u8],
        inputs: &[&[u8]],
        outputs: &mut [&mut [u8]],
    ) -> Result<()>;

    /// Returns the backend's counters.
    fn get_statistics(&self) -> HardwareStatistics;
}

/// Checks the shape contract of [`HardwareAccelerator::apply_matrix`].
pub fn check_apply_shape(matrix: &[u8], inputs: &[&[u8]], outputs: &[&mut [u8]]) -> Result<usize> {
    if matrix.len() != inputs.len() * outputs.len() {
        return Err(Error::Compute(format!(
            "matrix has {} coefficients for {} inputs and {} outputs",
            matrix.len(),
            inputs.len(),
            outputs.len()
        )));
    }

    let len = inputs
        .first()
        .map(|b| b.len())
        .or_else(|| outputs.first().map(|b| b.len()))
        .unwrap_or(0);
    if inputs.iter().any(|b| b.len() != len) || outputs.iter().any(|b| b.len() != len) {
        return Err(Error::Compute("blocks of one call differ in length".into()));
    }

    Ok(len)
}

/// Default capabilities of an in-process backend.
pub(crate) fn host_capabilities() -> HardwareCapabilities {
    HardwareCapabilities {
        processor_count: num_cpus::get(),
        max_blocks: MAX_BLOCKS,
        preferred_alignment: DEFAULT_ALIGNMENT,
        concurrent_submissions: true,
    }
}

/// Picks a backend for `target` from the registered ones.
///
/// `Auto` prefers an available offload engine and falls back to software;
/// `Cpu` always selects the software backend.
pub fn select_accelerator(target: HardwareTarget) -> Result<Arc<dyn HardwareAccelerator>> {
    let mut accelerators: Vec<Arc<dyn HardwareAccelerator>> = Vec::new();
    if let Err(e) = register_cpu_accelerators(&mut accelerators) {
        tracing::warn!("Failed to register CPU accelerators: {}", e);
    }

    let wanted = |acc: &Arc<dyn HardwareAccelerator>| match target {
        HardwareTarget::Cpu => acc.accelerator_type() == AcceleratorType::Cpu,
        HardwareTarget::Auto => true,
    };

    let mut candidates: Vec<_> = accelerators
        .into_iter()
        .filter(|acc| wanted(acc) && acc.is_available())
        .collect();
    // Offload engines first under Auto
    candidates.sort_by_key(|acc| acc.accelerator_type() == AcceleratorType::Cpu);

    candidates.into_iter().next().ok_or_else(|| {
        Error::HardwareUnavailable(format!("no available backend for {:?}", target))
    })
}
