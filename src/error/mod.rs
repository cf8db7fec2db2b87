//! Error handling for the gf16-ec library.
//!
//! Every failure in the engine is surfaced synchronously through this enum.
//! Nothing inside the crate retries; the caller (or the binding layer above it)
//! decides how to translate these into its own error representation.

use thiserror::Error;

/// Result type used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Error enum for the erasure coding engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid k/m/field-width combination, detected when a context is created
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A buffer or matrix could not be allocated
    #[error("Allocation failed: could not reserve {needed} bytes")]
    Allocation {
        /// Number of bytes requested
        needed: usize,
    },

    /// Wrong array lengths, block sizes or erasure indices
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A buffer that the operation cannot do without was not supplied
    #[error("Missing buffer for block {slot}")]
    MissingBuffer {
        /// Index of the block (or output position) that had no buffer
        slot: usize,
    },

    /// The erasure pattern cannot be recovered with the available survivors
    #[error("Unrecoverable erasure pattern: {erased} blocks erased, at most {correctable} can be recovered")]
    UnrecoverableErasures {
        /// Number of blocks the pattern erases
        erased: usize,
        /// Number of blocks the code can recover
        correctable: usize,
    },

    /// The compute primitive reported a failure
    #[error("Compute error: {0}")]
    Compute(String),

    /// The requested compute backend is not present
    #[error("Hardware unavailable: {0}")]
    HardwareUnavailable(String),

    /// The compute backend refused to initialize
    #[error("Hardware initialization failed: {0}")]
    HardwareInitialization(String),

    /// Opaque failure reported by an external compute backend
    #[error("Backend error: {0}")]
    Backend(#[from] anyhow::Error),

    /// Configuration (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The coder context was already released
    #[error("Coder context has been released")]
    Released,

    /// Internal invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if the error leaves the context usable for later calls.
    ///
    /// Configuration and release errors are terminal for a context; everything
    /// else only fails the call that produced it.
    pub fn is_per_call(&self) -> bool {
        !matches!(
            self,
            Error::InvalidConfiguration(_)
                | Error::HardwareUnavailable(_)
                | Error::HardwareInitialization(_)
                | Error::Released
        )
    }
}

/// Reserves a zero-filled byte vector, mapping allocator refusal to [`Error::Allocation`].
pub(crate) fn try_alloc_zeroed(len: usize) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| Error::Allocation { needed: len })?;
    buffer.resize(len, 0);
    Ok(buffer)
}
