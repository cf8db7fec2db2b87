//! Per-decoder cache of the decode matrix.
//!
//! The expensive part of preparing a decode is inverting the survivor
//! submatrix, which depends only on which blocks are erased. The cache keys on
//! that membership; a request listing the same erasures in a different order
//! reuses the inverse and only recomputes the column layout.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::erasure::ErasureSet;
use crate::error::{Error, Result};
use crate::galois;
use crate::matrix::{format_matrix, make_decoding_matrix, GeneratorMatrix};

/// Decode matrix for the most recent erasure pattern of a decoder.
#[derive(Debug)]
pub struct DecodeMatrixCache {
    generator: Arc<GeneratorMatrix>,
    /// Membership the inverse was built for, `None` until the first build
    erasures: Option<ErasureSet>,
    survivors: Vec<usize>,
    inverse: Vec<u32>,
    /// Erasure order the column layout of `matrix` follows
    order: Vec<usize>,
    /// k × order.len(), `matrix[j * order.len() + l]` weighs survivor j for erasure l
    matrix: Vec<u8>,
    rebuilds: usize,
}

impl DecodeMatrixCache {
    /// Creates an empty cache for `generator`.
    pub fn new(generator: Arc<GeneratorMatrix>) -> Self {
        Self {
            generator,
            erasures: None,
            survivors: Vec::new(),
            inverse: Vec::new(),
            order: Vec::new(),
            matrix: Vec::new(),
            rebuilds: 0,
        }
    }

    /// Makes the cached matrix match `erasures`, in that column order.
    ///
    /// Invalid requests leave the cache as it was. A failed inversion leaves it
    /// empty.
    pub fn prepare(&mut self, erasures: &[usize]) -> Result<()> {
        let k = self.generator.data_blocks();
        let m = self.generator.parity_blocks();
        let set = ErasureSet::from_indices(erasures, k + m)?;
        if set.len() > m {
            warn!(erased = set.len(), correctable = m, "unrecoverable erasure pattern rejected");
            return Err(Error::UnrecoverableErasures {
                erased: set.len(),
                correctable: m,
            });
        }

        if self.erasures.as_ref() != Some(&set) {
            self.invalidate();
            let solution = make_decoding_matrix(k, m, self.generator.wide(), &set)?;
            self.inverse = solution.inverse;
            self.survivors = solution.survivors;
            self.erasures = Some(set);
            self.rebuilds += 1;
            debug!(
                erased = set.len(),
                data_erased = set.data_erasures(k),
                survivors = ?self.survivors,
                "decode matrix rebuilt"
            );
        }

        if self.order != erasures {
            self.fill_columns(erasures);
            trace!("decode matrix for {:?}:\n{}", self.order, self.dump());
        }

        Ok(())
    }

    fn fill_columns(&mut self, erasures: &[usize]) {
        let k = self.generator.data_blocks();
        let wide = self.generator.wide();
        let cols = erasures.len();

        let mut matrix = vec![0u8; k * cols];
        for (l, &erased) in erasures.iter().enumerate() {
            for j in 0..k {
                let coefficient = if erased < k {
                    self.inverse[erased * k + j]
                } else {
                    // parity row times the inverse
                    let parity = erased - k;
                    u32::from((0..k).fold(0u8, |acc, i| {
                        galois::add(
                            acc,
                            galois::mul(self.inverse[i * k + j] as u8, wide[parity * k + i] as u8),
                        )
                    }))
                };
                matrix[j * cols + l] = coefficient as u8;
            }
        }

        self.matrix = matrix;
        self.order = erasures.to_vec();
    }

    /// Drops the cached pattern.
    pub fn invalidate(&mut self) {
        self.erasures = None;
        self.survivors.clear();
        self.inverse.clear();
        self.order.clear();
        self.matrix.clear();
    }

    /// Returns true if a matrix is cached.
    pub fn is_current(&self) -> bool {
        self.erasures.is_some()
    }

    /// Cached decode matrix, survivors by erasures.
    pub fn decode_matrix(&self) -> &[u8] {
        &self.matrix
    }

    /// Block ids the matrix reads, one per row.
    pub fn survivors(&self) -> &[usize] {
        &self.survivors
    }

    /// Erasure order the matrix columns follow.
    pub fn erasure_order(&self) -> &[usize] {
        &self.order
    }

    /// Number of times the inverse was recomputed.
    pub fn rebuild_count(&self) -> usize {
        self.rebuilds
    }

    /// Renders the cached matrix as text.
    pub fn dump(&self) -> String {
        format_matrix(&self.matrix, self.survivors.len(), self.order.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatrixType;
    use crate::matrix::MatrixGenerator;

    fn cache(k: usize, m: usize) -> DecodeMatrixCache {
        let generator = MatrixGenerator::new()
            .generate(k, m, MatrixType::Vandermonde)
            .unwrap();
        DecodeMatrixCache::new(Arc::new(generator))
    }

    #[test]
    fn test_reorder_does_not_rebuild() {
        let mut cache = cache(6, 3);
        cache.prepare(&[1, 4, 7]).unwrap();
        let ascending = cache.decode_matrix().to_vec();
        assert_eq!(cache.rebuild_count(), 1);
        assert_eq!(cache.survivors(), &[0, 2, 3, 5, 6, 8]);

        cache.prepare(&[7, 1, 4]).unwrap();
        assert_eq!(cache.rebuild_count(), 1);
        assert_eq!(cache.erasure_order(), &[7, 1, 4]);

        // column l of the reordered matrix is column order[l] of the first one
        let map = [2usize, 0, 1];
        let reordered = cache.decode_matrix();
        for j in 0..6 {
            for l in 0..3 {
                assert_eq!(reordered[j * 3 + l], ascending[j * 3 + map[l]]);
            }
        }
    }

    #[test]
    fn test_membership_change_rebuilds() {
        let mut cache = cache(6, 3);
        cache.prepare(&[1, 4]).unwrap();
        cache.prepare(&[1, 4]).unwrap();
        assert_eq!(cache.rebuild_count(), 1);
        cache.prepare(&[1, 5]).unwrap();
        assert_eq!(cache.rebuild_count(), 2);
    }

    #[test]
    fn test_data_column_is_inverse_row() {
        let mut cache = cache(4, 2);
        // data block 0 lost, survivors 1,2,3,4: block 0 = parity 0 xor others
        cache.prepare(&[0]).unwrap();
        assert_eq!(cache.survivors(), &[1, 2, 3, 4]);
        assert_eq!(cache.decode_matrix(), &[1, 1, 1, 1]);
    }

    #[test]
    fn test_invalid_request_keeps_cache() {
        let mut cache = cache(6, 3);
        cache.prepare(&[2]).unwrap();
        assert!(matches!(
            cache.prepare(&[0, 1, 2, 3]),
            Err(Error::UnrecoverableErasures { erased: 4, correctable: 3 })
        ));
        assert!(cache.prepare(&[9]).is_err());
        assert!(cache.prepare(&[1, 1]).is_err());
        assert!(cache.is_current());
        assert_eq!(cache.erasure_order(), &[2]);
        assert_eq!(cache.rebuild_count(), 1);
    }

    #[test]
    fn test_empty_pattern() {
        let mut cache = cache(3, 2);
        cache.prepare(&[]).unwrap();
        assert!(cache.decode_matrix().is_empty());
        assert_eq!(cache.survivors(), &[0, 1, 2]);
    }
}
