//! Generator matrix construction and storage.
//!
//! A [`GeneratorMatrix`] is built once per coder context and kept in two forms:
//! the wide m×k form used by matrix inversion, and the packed k×m byte form that
//! the compute backends consume (`packed[j * m + i]` is the coefficient of data
//! block j in parity block i).
//!
//! Construction goes through a [`MatrixGenerator`], which serializes builds
//! behind a lock. A process-wide instance is available via [`default_generator`];
//! tests and embedders can create their own.

pub mod construction;
pub mod inversion;

use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};

use lazy_static::lazy_static;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::{MatrixType, MAX_BLOCKS};
use crate::error::{Error, Result};

pub use inversion::{invert_matrix, make_decoding_matrix, DecodingSolution};

/// Generator matrix of a (k, m) code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorMatrix {
    k: usize,
    m: usize,
    matrix_type: MatrixType,
    /// m×k row-major, one row per parity block
    wide: Vec<u32>,
    /// k×m row-major, one row per data block
    packed: Vec<u8>,
}

impl GeneratorMatrix {
    /// Wraps an m×k coding matrix and derives its packed form.
    pub fn from_wide(k: usize, m: usize, matrix_type: MatrixType, wide: Vec<u32>) -> Result<Self> {
        if wide.len() != k * m {
            return Err(Error::Internal(format!(
                "coding matrix has {} entries, expected {}",
                wide.len(),
                k * m
            )));
        }
        if let Some(bad) = wide.iter().find(|&&e| e > 0x0f) {
            return Err(Error::Internal(format!(
                "coding matrix entry {} is not a GF(2^4) element",
                bad
            )));
        }

        let mut packed = vec![0u8; k * m];
        for i in 0..m {
            for j in 0..k {
                packed[j * m + i] = wide[i * k + j] as u8;
            }
        }

        Ok(Self {
            k,
            m,
            matrix_type,
            wide,
            packed,
        })
    }

    /// Number of data blocks.
    pub fn data_blocks(&self) -> usize {
        self.k
    }

    /// Number of parity blocks.
    pub fn parity_blocks(&self) -> usize {
        self.m
    }

    /// Construction that produced this matrix.
    pub fn matrix_type(&self) -> MatrixType {
        self.matrix_type
    }

    /// The m×k wide form.
    pub fn wide(&self) -> &[u32] {
        &self.wide
    }

    /// The k×m packed byte form.
    pub fn packed(&self) -> &[u8] {
        &self.packed
    }

    /// Coefficient of data block `data` in parity block `parity`.
    pub fn coefficient(&self, parity: usize, data: usize) -> u8 {
        self.packed[data * self.m + parity]
    }

    /// Renders the wide form as text, one parity row per line.
    pub fn dump(&self) -> String {
        format_matrix(&self.wide, self.m, self.k)
    }
}

/// Formats a row-major matrix as rows of space-separated hex digits.
pub fn format_matrix<T: std::fmt::LowerHex>(matrix: &[T], rows: usize, cols: usize) -> String {
    let mut out = String::new();
    for r in 0..rows {
        for c in 0..cols {
            if c > 0 {
                out.push(' ');
            }
            let _ = write!(out, "{:>2x}", matrix[r * cols + c]);
        }
        out.push('\n');
    }
    out
}

/// Serialized generator-matrix factory.
///
/// Builds are mutually exclusive per generator; distinct generators do not
/// contend with each other.
#[derive(Debug, Default)]
pub struct MatrixGenerator {
    lock: Mutex<()>,
    builds: AtomicUsize,
}

impl MatrixGenerator {
    /// Creates an independent generator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the generator matrix for a (k, m) code.
    pub fn generate(&self, k: usize, m: usize, matrix_type: MatrixType) -> Result<GeneratorMatrix> {
        if k == 0 || m == 0 || k + m > MAX_BLOCKS {
            return Err(Error::InvalidConfiguration(format!(
                "cannot build a generator for k = {}, m = {}",
                k, m
            )));
        }

        let wide = {
            let _guard = self.lock.lock();
            let wide = match matrix_type {
                MatrixType::Vandermonde => construction::vandermonde_coding_matrix(k, m)?,
                MatrixType::Cauchy => construction::cauchy_coding_matrix(k, m)?,
            };
            self.builds.fetch_add(1, Ordering::Relaxed);
            wide
        };

        let generator = GeneratorMatrix::from_wide(k, m, matrix_type, wide)?;
        debug!(k, m, ?matrix_type, "generator matrix built");
        trace!("generator matrix:\n{}", generator.dump());

        Ok(generator)
    }

    /// Number of matrices this generator has built.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }
}

lazy_static! {
    static ref DEFAULT_GENERATOR: MatrixGenerator = MatrixGenerator::new();
}

/// Process-wide generator used when a context is not given one explicitly.
pub fn default_generator() -> &'static MatrixGenerator {
    &DEFAULT_GENERATOR
}
