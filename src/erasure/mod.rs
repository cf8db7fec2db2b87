//! Erasure patterns.
//!
//! An [`ErasureSet`] records which blocks of a stripe are missing, as a bit map
//! over the k + m block ids. Two sets are equal when they erase the same blocks,
//! regardless of the order the indices were listed in.

use bitvec::prelude::*;

use crate::config::MAX_BLOCKS;
use crate::error::{Error, Result};

type BlockMap = BitArray<[u16; 1], Lsb0>;

/// Set of erased block ids in a stripe of `total` blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErasureSet {
    total: usize,
    map: BlockMap,
}

impl ErasureSet {
    /// Creates an empty set for a stripe of `total` blocks.
    pub fn new(total: usize) -> Result<Self> {
        if total == 0 || total > MAX_BLOCKS {
            return Err(Error::InvalidInput(format!(
                "stripe of {} blocks is outside 1..={}",
                total, MAX_BLOCKS
            )));
        }

        Ok(Self {
            total,
            map: BitArray::new([0u16; 1]),
        })
    }

    /// Builds a set from a list of indices, rejecting duplicates and out-of-range ids.
    pub fn from_indices(indices: &[usize], total: usize) -> Result<Self> {
        let mut set = Self::new(total)?;
        for &index in indices {
            set.insert(index)?;
        }
        Ok(set)
    }

    /// Parses a failure map such as `"0,1,0,0,1,0"`, one flag per block.
    ///
    /// Fails when the map does not have `k + m` entries, contains anything but
    /// 0 or 1, or marks more than `m` blocks as failed.
    pub fn from_failed_blocks(failed: &str, k: usize, m: usize) -> Result<Self> {
        let mut set = Self::new(k + m)?;
        let flags: Vec<&str> = failed.split(',').map(str::trim).collect();
        if flags.len() != k + m {
            return Err(Error::InvalidInput(format!(
                "failure map has {} entries, expected {}",
                flags.len(),
                k + m
            )));
        }

        for (index, flag) in flags.into_iter().enumerate() {
            match flag {
                "0" => {}
                "1" => set.insert(index)?,
                other => {
                    return Err(Error::InvalidInput(format!(
                        "failure map entry {} is '{}', expected 0 or 1",
                        index, other
                    )))
                }
            }
        }

        if set.len() > m {
            return Err(Error::UnrecoverableErasures {
                erased: set.len(),
                correctable: m,
            });
        }

        Ok(set)
    }

    /// Marks `index` as erased.
    pub fn insert(&mut self, index: usize) -> Result<()> {
        if index >= self.total {
            return Err(Error::InvalidInput(format!(
                "erasure index {} out of range for {} blocks",
                index, self.total
            )));
        }
        if self.map[index] {
            return Err(Error::InvalidInput(format!(
                "erasure index {} listed twice",
                index
            )));
        }
        self.map.set(index, true);
        Ok(())
    }

    /// Returns true if block `index` is erased.
    pub fn contains(&self, index: usize) -> bool {
        index < self.total && self.map[index]
    }

    /// Number of erased blocks.
    pub fn len(&self) -> usize {
        self.map.count_ones()
    }

    /// Returns true if nothing is erased.
    pub fn is_empty(&self) -> bool {
        self.map.not_any()
    }

    /// Number of blocks in the stripe.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Erased ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.map.iter_ones().take_while(move |&i| i < self.total)
    }

    /// Number of erased data blocks among the first `k`.
    pub fn data_erasures(&self, k: usize) -> usize {
        self.iter().filter(|&i| i < k).count()
    }

    /// Erasure map as a bit mask, bit i set when block i is erased.
    pub fn mask(&self) -> u16 {
        self.map.as_raw_slice()[0]
    }

    /// Complement of [`mask`](Self::mask) over the stripe.
    pub fn survived_mask(&self) -> u16 {
        let stripe = if self.total == MAX_BLOCKS {
            u16::MAX
        } else {
            (1u16 << self.total) - 1
        };
        !self.mask() & stripe
    }

    /// Per-block flags, 1 for erased and 0 for present.
    pub fn to_flags(&self) -> Vec<u8> {
        (0..self.total).map(|i| u8::from(self.map[i])).collect()
    }
}
