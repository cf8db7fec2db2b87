//! Coding matrix constructions over GF(2^4).
//!
//! Both constructions return an m×k matrix in row-major order, one row per
//! parity block, with entries stored as wide integers. The Vandermonde variant
//! builds the full (k+m)×k distribution matrix, reduces its top k rows to the
//! identity with elementary column operations, then normalizes row k and
//! column 0 to all ones; the parity rows are what remains below the identity.

use crate::error::{Error, Result};
use crate::galois;

fn field_inverse(value: u32) -> Result<u32> {
    galois::inverse(value as u8)
        .map(u32::from)
        .ok_or_else(|| Error::Internal("zero pivot while building coding matrix".into()))
}

#[inline]
fn field_mul(a: u32, b: u32) -> u32 {
    u32::from(galois::mul(a as u8, b as u8))
}

/// Extended Vandermonde matrix: first row e0, last row e(cols-1), row i holds powers of i.
fn extended_vandermonde(rows: usize, cols: usize) -> Result<Vec<u32>> {
    if rows > galois::FIELD_SIZE || cols > galois::FIELD_SIZE {
        return Err(Error::InvalidConfiguration(format!(
            "Vandermonde matrix {}x{} does not fit GF(2^4)",
            rows, cols
        )));
    }

    let mut vdm = vec![0u32; rows * cols];
    vdm[0] = 1;
    if rows == 1 {
        return Ok(vdm);
    }

    vdm[(rows - 1) * cols + cols - 1] = 1;
    if rows == 2 {
        return Ok(vdm);
    }

    for i in 1..rows - 1 {
        let mut power = 1u32;
        for j in 0..cols {
            vdm[i * cols + j] = power;
            power = field_mul(power, i as u32);
        }
    }

    Ok(vdm)
}

/// Systematic distribution matrix of `rows` x `cols` whose top `cols` rows are the identity.
fn big_vandermonde_distribution(rows: usize, cols: usize) -> Result<Vec<u32>> {
    if cols >= rows {
        return Err(Error::InvalidConfiguration(format!(
            "distribution matrix needs more rows than columns, got {}x{}",
            rows, cols
        )));
    }

    let mut dist = extended_vandermonde(rows, cols)?;

    for i in 1..cols {
        let row_start = i * cols;

        let pivot = (i..rows)
            .find(|&j| dist[j * cols + i] != 0)
            .ok_or_else(|| Error::Internal("Vandermonde reduction found no pivot".into()))?;
        if pivot != i {
            for c in 0..cols {
                dist.swap(pivot * cols + c, row_start + c);
            }
        }

        let diagonal = dist[row_start + i];
        if diagonal != 1 {
            let scale = field_inverse(diagonal)?;
            for r in 0..rows {
                dist[r * cols + i] = field_mul(scale, dist[r * cols + i]);
            }
        }

        // Zero the rest of row i: column j += e * column i
        for j in 0..cols {
            let e = dist[row_start + j];
            if j != i && e != 0 {
                for r in 0..rows {
                    dist[r * cols + j] ^= field_mul(e, dist[r * cols + i]);
                }
            }
        }
    }

    // Row `cols` becomes all ones
    let ones_row = cols * cols;
    for j in 0..cols {
        let e = dist[ones_row + j];
        if e != 1 {
            let scale = field_inverse(e)?;
            for r in cols..rows {
                dist[r * cols + j] = field_mul(scale, dist[r * cols + j]);
            }
        }
    }

    // Column 0 of every later row becomes one
    for r in cols + 1..rows {
        let e = dist[r * cols];
        if e != 1 {
            let scale = field_inverse(e)?;
            for j in 0..cols {
                dist[r * cols + j] = field_mul(dist[r * cols + j], scale);
            }
        }
    }

    Ok(dist)
}

/// Builds the m×k Vandermonde-derived coding matrix.
pub fn vandermonde_coding_matrix(k: usize, m: usize) -> Result<Vec<u32>> {
    let dist = big_vandermonde_distribution(k + m, k)?;
    Ok(dist[k * k..].to_vec())
}

/// Builds the m×k original Cauchy coding matrix, entry (i, j) = 1 / (i ^ (m + j)).
pub fn cauchy_coding_matrix(k: usize, m: usize) -> Result<Vec<u32>> {
    if k + m > galois::FIELD_SIZE {
        return Err(Error::InvalidConfiguration(format!(
            "Cauchy matrix needs k + m <= {}, got {}",
            galois::FIELD_SIZE,
            k + m
        )));
    }

    let mut matrix = Vec::with_capacity(k * m);
    for i in 0..m {
        for j in 0..k {
            matrix.push(field_inverse((i ^ (m + j)) as u32)?);
        }
    }

    Ok(matrix)
}
