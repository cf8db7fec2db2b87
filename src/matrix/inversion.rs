//! Matrix inversion over GF(2^4) and the decoding-matrix primitive.

use crate::erasure::ErasureSet;
use crate::error::{Error, Result};
use crate::galois;

#[inline]
fn field_mul(a: u32, b: u32) -> u32 {
    u32::from(galois::mul(a as u8, b as u8))
}

#[inline]
fn field_add(a: u32, b: u32) -> u32 {
    u32::from(galois::add(a as u8, b as u8))
}

/// Inverts a square `size`×`size` matrix with Gauss-Jordan elimination.
///
/// Returns `None` when the matrix is singular.
pub fn invert_matrix(matrix: &[u32], size: usize) -> Option<Vec<u32>> {
    debug_assert_eq!(matrix.len(), size * size);

    let mut mat = matrix.to_vec();
    let mut inv = vec![0u32; size * size];
    for i in 0..size {
        inv[i * size + i] = 1;
    }

    // Forward pass: upper triangular with a unit diagonal
    for i in 0..size {
        let row_start = i * size;

        if mat[row_start + i] == 0 {
            let swap_row = (i + 1..size).find(|&j| mat[j * size + i] != 0)?;
            for c in 0..size {
                mat.swap(row_start + c, swap_row * size + c);
                inv.swap(row_start + c, swap_row * size + c);
            }
        }

        let pivot = mat[row_start + i];
        if pivot != 1 {
            let scale = u32::from(galois::inverse(pivot as u8)?);
            for c in 0..size {
                mat[row_start + c] = field_mul(mat[row_start + c], scale);
                inv[row_start + c] = field_mul(inv[row_start + c], scale);
            }
        }

        for j in i + 1..size {
            let factor = mat[j * size + i];
            if factor != 0 {
                for c in 0..size {
                    mat[j * size + c] = field_add(mat[j * size + c], field_mul(factor, mat[row_start + c]));
                    inv[j * size + c] = field_add(inv[j * size + c], field_mul(factor, inv[row_start + c]));
                }
            }
        }
    }

    // Backward pass
    for i in (0..size).rev() {
        for j in 0..i {
            let factor = mat[j * size + i];
            if factor != 0 {
                mat[j * size + i] = 0;
                for c in 0..size {
                    inv[j * size + c] = field_add(inv[j * size + c], field_mul(factor, inv[i * size + c]));
                }
            }
        }
    }

    Some(inv)
}

/// Result of the decoding-matrix primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodingSolution {
    /// k×k inverse, row i expresses data block i over the survivors
    pub inverse: Vec<u32>,
    /// Ids of the k blocks the inverse reads, ascending
    pub survivors: Vec<usize>,
}

/// Selects the first `k` surviving blocks and inverts their generator rows.
///
/// `coding_matrix` is the m×k row-major generator in wide form. Data survivors
/// contribute identity rows, parity survivors contribute their generator row.
pub fn make_decoding_matrix(
    k: usize,
    m: usize,
    coding_matrix: &[u32],
    erasures: &ErasureSet,
) -> Result<DecodingSolution> {
    let survivors: Vec<usize> = (0..k + m).filter(|&i| !erasures.contains(i)).take(k).collect();
    if survivors.len() < k {
        return Err(Error::UnrecoverableErasures {
            erased: erasures.len(),
            correctable: m,
        });
    }

    let mut selected = vec![0u32; k * k];
    for (row, &id) in survivors.iter().enumerate() {
        if id < k {
            selected[row * k + id] = 1;
        } else {
            let parity = id - k;
            selected[row * k..(row + 1) * k]
                .copy_from_slice(&coding_matrix[parity * k..(parity + 1) * k]);
        }
    }

    let inverse = invert_matrix(&selected, k).ok_or(Error::UnrecoverableErasures {
        erased: erasures.len(),
        correctable: m,
    })?;

    Ok(DecodingSolution { inverse, survivors })
}
