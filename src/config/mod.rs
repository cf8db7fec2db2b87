//! Configuration settings for a coder context.
//!
//! A configuration fixes the stripe geometry (k data blocks, m parity blocks),
//! the generator construction and the compute backend for the whole lifetime
//! of a context. It is validated once, when the context is created.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Width of a field symbol in bits. Fixed: all arithmetic happens in GF(2^4).
pub const FIELD_WIDTH: usize = 4;

/// Maximum number of blocks in a stripe (k + m) for a 4-bit field.
pub const MAX_BLOCKS: usize = 1 << FIELD_WIDTH;

/// Default alignment unit of the bulk compute path, in bytes.
pub const DEFAULT_ALIGNMENT: usize = 64;

/// Construction used for the generator matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatrixType {
    /// Systematic Vandermonde-derived distribution matrix
    Vandermonde,
    /// Original Cauchy matrix, entries 1 / (i ^ (m + j))
    Cauchy,
}

/// Compute backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HardwareTarget {
    /// Use the best available backend, falling back to software
    Auto,
    /// Use the software reference backend only
    Cpu,
}

/// Configuration settings for an encoder or decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoderConfig {
    /// Number of data blocks (k)
    data_blocks: usize,
    /// Number of parity blocks (m)
    parity_blocks: usize,
    /// Generator matrix construction
    matrix_type: MatrixType,
    /// Compute backend selection
    hardware_target: HardwareTarget,
    /// Whether unaligned blocks are split into an aligned and a remainder sub-operation
    split_unaligned: bool,
    /// Alignment unit of the bulk path in bytes
    alignment: usize,
}

impl Default for CoderConfig {
    fn default() -> Self {
        Self {
            data_blocks: 6,
            parity_blocks: 3,
            matrix_type: MatrixType::Vandermonde,
            hardware_target: HardwareTarget::Auto,
            split_unaligned: true,
            alignment: DEFAULT_ALIGNMENT,
        }
    }
}

impl CoderConfig {
    /// Creates a configuration for `k` data blocks and `m` parity blocks.
    pub fn new(data_blocks: usize, parity_blocks: usize) -> Self {
        Self {
            data_blocks,
            parity_blocks,
            ..Self::default()
        }
    }

    /// Sets the number of data blocks.
    pub fn with_data_blocks(mut self, data_blocks: usize) -> Self {
        self.data_blocks = data_blocks;
        self
    }

    /// Sets the number of parity blocks.
    pub fn with_parity_blocks(mut self, parity_blocks: usize) -> Self {
        self.parity_blocks = parity_blocks;
        self
    }

    /// Sets the generator matrix construction.
    ///
    /// # Arguments
    ///
    /// * `matrix_type` - Vandermonde or Cauchy
    ///
    /// # Returns
    ///
    /// Updated configuration with the new matrix type
    pub fn with_matrix_type(mut self, matrix_type: MatrixType) -> Self {
        self.matrix_type = matrix_type;
        self
    }

    /// Shorthand for the boolean form used by bindings: `true` selects Vandermonde.
    pub fn with_vandermonde(self, use_vandermonde: bool) -> Self {
        self.with_matrix_type(if use_vandermonde {
            MatrixType::Vandermonde
        } else {
            MatrixType::Cauchy
        })
    }

    /// Sets the compute backend selection.
    pub fn with_hardware_target(mut self, hardware_target: HardwareTarget) -> Self {
        self.hardware_target = hardware_target;
        self
    }

    /// Enables or disables the aligned/remainder split of unaligned blocks.
    pub fn with_split_unaligned(mut self, split_unaligned: bool) -> Self {
        self.split_unaligned = split_unaligned;
        self
    }

    /// Sets the alignment unit of the bulk compute path.
    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    /// Returns the number of data blocks (k).
    pub fn data_blocks(&self) -> usize {
        self.data_blocks
    }

    /// Returns the number of parity blocks (m).
    pub fn parity_blocks(&self) -> usize {
        self.parity_blocks
    }

    /// Returns k + m.
    pub fn total_blocks(&self) -> usize {
        self.data_blocks + self.parity_blocks
    }

    /// Returns the generator matrix construction.
    pub fn matrix_type(&self) -> MatrixType {
        self.matrix_type
    }

    /// Returns the compute backend selection.
    pub fn hardware_target(&self) -> HardwareTarget {
        self.hardware_target
    }

    /// Returns whether unaligned blocks are split.
    pub fn split_unaligned(&self) -> bool {
        self.split_unaligned
    }

    /// Returns the alignment unit of the bulk path.
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Validates the configuration.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error if it's invalid
    pub fn validate(&self) -> Result<()> {
        if self.data_blocks == 0 {
            return Err(Error::InvalidConfiguration(
                "Number of data blocks must be greater than zero".to_string(),
            ));
        }

        if self.parity_blocks == 0 {
            return Err(Error::InvalidConfiguration(
                "Number of parity blocks must be greater than zero".to_string(),
            ));
        }

        // 4-bit field: every block needs a distinct field element
        if self.total_blocks() > MAX_BLOCKS {
            return Err(Error::InvalidConfiguration(format!(
                "A {}-bit field allows k + m <= {}, got k = {}, m = {}",
                FIELD_WIDTH, MAX_BLOCKS, self.data_blocks, self.parity_blocks
            )));
        }

        if self.alignment == 0 || !self.alignment.is_power_of_two() {
            return Err(Error::InvalidConfiguration(format!(
                "Alignment must be a non-zero power of two, got {}",
                self.alignment
            )));
        }

        Ok(())
    }

    /// Parses a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
