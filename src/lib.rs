//! # gf16-ec
//!
//! Reed-Solomon erasure coding over GF(2^4) for stripes of at most 16 blocks.
//! A stripe holds k data blocks and m parity blocks (k + m <= 16); any k of the
//! k + m blocks are enough to reconstruct the rest.
//!
//! ## Features
//!
//! - Systematic Vandermonde or Cauchy generator matrices
//! - Decoding from arbitrary survivor sets, with the decode matrix cached per erasure pattern
//! - Nullable buffer arrays that mirror what a managed-runtime binding hands over
//! - Pluggable compute backends behind the `HardwareAccelerator` trait
//! - Optional split of unaligned blocks into concurrent bulk and remainder sub-operations
//!
//! ## Modules
//!
//! - `config`: Configuration settings for an encoder or decoder
//! - `galois`: GF(2^4) arithmetic
//! - `matrix`: Generator matrix construction and inversion
//! - `erasure`: Erasure patterns
//! - `buffers`: Buffer validation and resolution
//! - `hardware`: Compute backends
//! - `parallel`: Split dispatch and completion tracking
//! - `coder`: Encoder and decoder contexts
//!
//! ## Example
//!
//! ```
//! use gf16_ec::prelude::*;
//!
//! let block_size = 128;
//! let data: Vec<Vec<u8>> = (0..4u8).map(|i| vec![i * 17; block_size]).collect();
//! let mut parity = vec![vec![0u8; block_size]; 2];
//!
//! let mut encoder = gf16_ec::encoder(4, 2, true).unwrap();
//! let inputs: Vec<Option<&[u8]>> = data.iter().map(|d| Some(d.as_slice())).collect();
//! let mut outputs: Vec<Option<&mut [u8]>> = parity.iter_mut().map(|p| Some(p.as_mut_slice())).collect();
//! encoder.encode(&inputs, &mut outputs, block_size).unwrap();
//!
//! // lose data block 1 and parity block 5
//! let mut stripe: Vec<Option<&[u8]>> = data.iter().chain(&parity).map(|b| Some(b.as_slice())).collect();
//! stripe[1] = None;
//! stripe[5] = None;
//!
//! let mut recovered = vec![0u8; block_size];
//! let mut decoder = gf16_ec::decoder(4, 2, true).unwrap();
//! decoder.decode(&stripe, &mut [Some(recovered.as_mut_slice())], &[1], block_size).unwrap();
//! assert_eq!(recovered, data[1]);
//! ```

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

// Re-export error types
pub use crate::error::{Error, Result};

// Modules
pub mod buffers;
pub mod coder;
pub mod config;
pub mod erasure;
pub mod error;
pub mod galois;
pub mod hardware;
pub mod matrix;
pub mod parallel;

pub mod prelude {
    //! Prelude module that re-exports commonly used types and functions.

    pub use crate::coder::{CoderStatistics, ReedSolomonDecoder, ReedSolomonEncoder};
    pub use crate::config::{CoderConfig, HardwareTarget, MatrixType};
    pub use crate::erasure::ErasureSet;
    pub use crate::error::{Error, Result};
    pub use crate::hardware::cpu::CPUAccelerator;
    pub use crate::hardware::{
        AcceleratorType, ComputeKind, HardwareAccelerator, HardwareCapabilities, HardwareStatistics,
    };
    pub use crate::matrix::{GeneratorMatrix, MatrixGenerator};
}

/// Creates an encoder for `k` data and `m` parity blocks.
///
/// `use_vandermonde` selects the Vandermonde construction, otherwise Cauchy.
pub fn encoder(k: usize, m: usize, use_vandermonde: bool) -> Result<coder::ReedSolomonEncoder> {
    coder::ReedSolomonEncoder::new(config::CoderConfig::new(k, m).with_vandermonde(use_vandermonde))
}

/// Creates a decoder for `k` data and `m` parity blocks.
///
/// `use_vandermonde` must match the encoder that produced the parity.
pub fn decoder(k: usize, m: usize, use_vandermonde: bool) -> Result<coder::ReedSolomonDecoder> {
    coder::ReedSolomonDecoder::new(config::CoderConfig::new(k, m).with_vandermonde(use_vandermonde))
}
