//! Galois field arithmetic in GF(2^4).
//!
//! All block arithmetic of the engine happens in the 16-element field defined
//! by the primitive polynomial x^4 + x + 1 (0x13). Multiplication goes through
//! a discrete-log/antilog table pair of 15 entries each. A stored byte holds two
//! field symbols (high and low nibble) which are multiplied independently by the
//! same 4-bit coefficient.
//!
//! Everything here reads static tables only, so it is safe to call from any
//! number of threads at once.

use lazy_static::lazy_static;

/// Primitive polynomial of the field: x^4 + x + 1.
pub const FIELD_POLYNOMIAL: u8 = 0x13;

/// Number of elements in the field.
pub const FIELD_SIZE: usize = 16;

/// Order of the multiplicative group.
pub const GROUP_ORDER: usize = FIELD_SIZE - 1;

/// `LOG_TABLE[x - 1]` is the discrete log of `x` (x in 1..=15).
const LOG_TABLE: [u8; GROUP_ORDER] = [0, 1, 4, 2, 8, 5, 10, 3, 14, 9, 7, 6, 13, 11, 12];

/// `ILOG_TABLE[e]` is the primitive element raised to `e` (e in 0..15).
const ILOG_TABLE: [u8; GROUP_ORDER] = [1, 2, 4, 8, 3, 6, 12, 11, 5, 10, 7, 14, 15, 13, 9];

lazy_static! {
    /// Full-byte product tables, one per 4-bit coefficient: `BYTE_PRODUCTS[y][x] == mul_byte(x, y)`.
    static ref BYTE_PRODUCTS: Vec<[u8; 256]> = (0..FIELD_SIZE as u8)
        .map(|y| {
            let mut table = [0u8; 256];
            for (x, entry) in table.iter_mut().enumerate() {
                *entry = mul_byte(x as u8, y);
            }
            table
        })
        .collect();
}

/// Adds two field elements (XOR).
#[inline]
pub fn add(a: u8, b: u8) -> u8 {
    a ^ b
}

/// Multiplies two 4-bit field elements.
///
/// Only the low nibble of each argument is used. A zero operand short-circuits
/// to zero, so index 0 of the log table is never looked up.
#[inline]
pub fn mul(x: u8, y: u8) -> u8 {
    let (x, y) = (x & 0x0f, y & 0x0f);
    if x == 0 || y == 0 {
        return 0;
    }

    let log_x = LOG_TABLE[(x - 1) as usize] as usize;
    let log_y = LOG_TABLE[(y - 1) as usize] as usize;

    ILOG_TABLE[(log_x + log_y) % GROUP_ORDER]
}

/// Multiplies both nibbles of `x` by the 4-bit coefficient `y` and repacks them.
#[inline]
pub fn mul_byte(x: u8, y: u8) -> u8 {
    let high = mul(x >> 4, y);
    let low = mul(x & 0x0f, y);

    (high << 4) | low
}

/// Returns the multiplicative inverse of `x`, or `None` for zero.
#[inline]
pub fn inverse(x: u8) -> Option<u8> {
    let x = x & 0x0f;
    if x == 0 {
        return None;
    }

    let log_x = LOG_TABLE[(x - 1) as usize] as usize;
    Some(ILOG_TABLE[(GROUP_ORDER - log_x) % GROUP_ORDER])
}

/// Divides `a` by `b`, or `None` when `b` is zero.
#[inline]
pub fn divide(a: u8, b: u8) -> Option<u8> {
    inverse(b).map(|inv| mul(a, inv))
}

/// Multiply two elements using direct polynomial multiplication without tables.
///
/// Slower than [`mul`]; kept as an independent reference for verification.
pub fn multiply_direct(a: u8, b: u8) -> u8 {
    let mut a = a & 0x0f;
    let mut b = b & 0x0f;
    let mut result = 0u8;

    while b > 0 {
        if b & 1 != 0 {
            result ^= a;
        }
        a <<= 1;
        if a & 0x10 != 0 {
            a ^= FIELD_POLYNOMIAL;
        }
        b >>= 1;
    }

    result
}

/// Accumulates `coefficient * src` into `dst`, byte by byte.
///
/// `dst[i] ^= mul_byte(src[i], coefficient)` for every position both slices cover.
pub fn mul_region_xor(coefficient: u8, src: &[u8], dst: &mut [u8]) {
    match coefficient & 0x0f {
        0 => {}
        1 => {
            for (d, &s) in dst.iter_mut().zip(src) {
                *d ^= s;
            }
        }
        c => {
            let table = &BYTE_PRODUCTS[c as usize];
            for (d, &s) in dst.iter_mut().zip(src) {
                *d ^= table[s as usize];
            }
        }
    }
}
