//! Buffer resolution for encode and decode calls.
//!
//! Callers hand over arrays of optional block buffers. This module validates
//! them against the stripe geometry, classifies every block slot of a decode
//! call, and binds the final list of readable survivors and writable targets
//! that a compute call consumes. Erased slots the caller did not ask for are
//! backed by a per-decoder [`ScratchArena`], which grows monotonically and is
//! reused across calls.

use tracing::debug;

use crate::error::{try_alloc_zeroed, Error, Result};

/// Classification of one block slot in a decode call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotSource {
    /// Input present; the block is a survivor
    Present,
    /// Input missing and requested; reconstructed into `outputs[output]`
    ErasedRequested {
        /// Position in the caller's output array
        output: usize,
    },
    /// Input missing and not requested; reconstructed into scratch
    ErasedDontCare,
}

/// Resolved slot layout of a decode call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeLayout {
    slots: Vec<SlotSource>,
    /// Every missing slot, ascending
    decode_erasures: Vec<usize>,
    dont_care: usize,
}

impl DecodeLayout {
    /// Per-slot classification.
    pub fn slots(&self) -> &[SlotSource] {
        &self.slots
    }

    /// Slots the compute call must reconstruct, ascending.
    pub fn decode_erasures(&self) -> &[usize] {
        &self.decode_erasures
    }

    /// Number of reconstructed slots without a caller buffer.
    pub fn dont_care(&self) -> usize {
        self.dont_care
    }
}

fn check_block(len: usize, block_size: usize, slot: usize) -> Result<()> {
    if len != block_size {
        return Err(Error::InvalidInput(format!(
            "block {} holds {} bytes, expected {}",
            slot, len, block_size
        )));
    }
    Ok(())
}

fn check_block_size(block_size: usize) -> Result<()> {
    if block_size == 0 {
        return Err(Error::InvalidInput("block size must be greater than zero".into()));
    }
    Ok(())
}

/// Validates an encode call and binds its buffers.
///
/// Every data and coding slot must be present and exactly `block_size` long.
pub fn resolve_encode<'d, 'c>(
    k: usize,
    m: usize,
    data: &[Option<&'d [u8]>],
    coding: &'c mut [Option<&mut [u8]>],
    block_size: usize,
) -> Result<(Vec<&'d [u8]>, Vec<&'c mut [u8]>)> {
    check_block_size(block_size)?;
    if data.len() != k {
        return Err(Error::InvalidInput(format!(
            "expected {} data blocks, got {}",
            k,
            data.len()
        )));
    }
    if coding.len() != m {
        return Err(Error::InvalidInput(format!(
            "expected {} coding blocks, got {}",
            m,
            coding.len()
        )));
    }

    let mut inputs = Vec::with_capacity(k);
    for (slot, block) in data.iter().enumerate() {
        let block = block.ok_or(Error::MissingBuffer { slot })?;
        check_block(block.len(), block_size, slot)?;
        inputs.push(block);
    }

    let mut outputs = Vec::with_capacity(m);
    for (i, block) in coding.iter_mut().enumerate() {
        let slot = k + i;
        let block = block.as_deref_mut().ok_or(Error::MissingBuffer { slot })?;
        check_block(block.len(), block_size, slot)?;
        outputs.push(block);
    }

    Ok((inputs, outputs))
}

/// Classifies the slots of a decode call.
///
/// `inputs` has one entry per block (k + m). `outputs` is parallel to
/// `erasures`. An erasure whose input is present is treated as a survivor and
/// its output left untouched; a missing input whose index is not listed is
/// still reconstructed, into scratch.
pub fn plan_decode(
    total: usize,
    inputs: &[Option<&[u8]>],
    outputs: &[Option<&mut [u8]>],
    erasures: &[usize],
    block_size: usize,
) -> Result<DecodeLayout> {
    check_block_size(block_size)?;
    if inputs.len() != total {
        return Err(Error::InvalidInput(format!(
            "expected {} input slots, got {}",
            total,
            inputs.len()
        )));
    }
    if outputs.len() != erasures.len() {
        return Err(Error::InvalidInput(format!(
            "{} output buffers for {} erasures",
            outputs.len(),
            erasures.len()
        )));
    }

    let mut requested: Vec<Option<usize>> = vec![None; total];
    for (position, &index) in erasures.iter().enumerate() {
        if index >= total {
            return Err(Error::InvalidInput(format!(
                "erasure index {} out of range for {} blocks",
                index, total
            )));
        }
        if requested[index].replace(position).is_some() {
            return Err(Error::InvalidInput(format!(
                "erasure index {} listed twice",
                index
            )));
        }
    }

    let mut slots = Vec::with_capacity(total);
    let mut decode_erasures = Vec::new();
    let mut dont_care = 0;

    for (slot, input) in inputs.iter().enumerate() {
        match (input, requested[slot]) {
            (Some(block), _) => {
                check_block(block.len(), block_size, slot)?;
                slots.push(SlotSource::Present);
            }
            (None, Some(position)) => {
                let output = outputs[position]
                    .as_deref()
                    .ok_or(Error::MissingBuffer { slot })?;
                check_block(output.len(), block_size, slot)?;
                slots.push(SlotSource::ErasedRequested { output: position });
                decode_erasures.push(slot);
            }
            (None, None) => {
                slots.push(SlotSource::ErasedDontCare);
                decode_erasures.push(slot);
                dont_care += 1;
            }
        }
    }

    Ok(DecodeLayout {
        slots,
        decode_erasures,
        dont_care,
    })
}

/// Binds the reconstruction targets of `layout`, in `decode_erasures` order.
///
/// Requested slots write into the caller's output buffers; don't-care slots
/// take consecutive `block_size` chunks of `scratch`.
pub fn bind_targets<'a>(
    layout: &DecodeLayout,
    outputs: &'a mut [Option<&mut [u8]>],
    scratch: &'a mut [u8],
    block_size: usize,
) -> Result<Vec<&'a mut [u8]>> {
    let mut caller: Vec<Option<&'a mut [u8]>> =
        outputs.iter_mut().map(|o| o.as_deref_mut()).collect();
    let mut spare = scratch.chunks_exact_mut(block_size);

    let mut targets = Vec::with_capacity(layout.decode_erasures.len());
    for &slot in &layout.decode_erasures {
        let target = match layout.slots[slot] {
            SlotSource::ErasedRequested { output } => caller
                .get_mut(output)
                .and_then(Option::take)
                .ok_or(Error::MissingBuffer { slot })?,
            SlotSource::ErasedDontCare => spare
                .next()
                .ok_or_else(|| Error::Internal("scratch arena too small".into()))?,
            SlotSource::Present => {
                return Err(Error::Internal(format!("block {} is not erased", slot)))
            }
        };
        targets.push(target);
    }

    Ok(targets)
}

/// Reusable backing store for don't-care reconstructions.
///
/// Capacity tracks the largest block size and the largest don't-care count
/// seen so far; the buffer is replaced only when either grows.
#[derive(Debug, Default)]
pub struct ScratchArena {
    buffer: Vec<u8>,
    block_size: usize,
    blocks: usize,
    allocations: usize,
}

impl ScratchArena {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `blocks` chunks' worth of scratch at `block_size`, growing if needed.
    pub fn reserve(&mut self, block_size: usize, blocks: usize) -> Result<&mut [u8]> {
        if blocks == 0 {
            return Ok(&mut self.buffer[..0]);
        }

        if block_size > self.block_size || blocks > self.blocks {
            let new_block_size = block_size.max(self.block_size);
            let new_blocks = blocks.max(self.blocks);
            let needed = new_block_size
                .checked_mul(new_blocks)
                .ok_or(Error::Allocation { needed: usize::MAX })?;

            self.buffer = try_alloc_zeroed(needed)?;
            self.block_size = new_block_size;
            self.blocks = new_blocks;
            self.allocations += 1;
            debug!(block_size = new_block_size, blocks = new_blocks, "scratch arena grown");
        }

        Ok(&mut self.buffer[..block_size * blocks])
    }

    /// Current capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Number of times the arena allocated.
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    /// Frees the backing store.
    pub fn release(&mut self) {
        self.buffer = Vec::new();
        self.block_size = 0;
        self.blocks = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_encode() {
        let a = [1u8; 8];
        let b = [2u8; 8];
        let mut p = [0u8; 8];
        let data = [Some(&a[..]), Some(&b[..])];
        let mut coding = [Some(&mut p[..])];
        let (inputs, outputs) = resolve_encode(2, 1, &data, &mut coding, 8).unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(outputs.len(), 1);
    }

    #[test]
    fn test_resolve_encode_rejects() {
        let a = [1u8; 8];
        let short = [2u8; 4];
        let mut p = [0u8; 8];

        let data = [Some(&a[..]), None];
        let mut coding = [Some(&mut p[..])];
        assert!(matches!(
            resolve_encode(2, 1, &data, &mut coding, 8),
            Err(Error::MissingBuffer { slot: 1 })
        ));

        let data = [Some(&a[..]), Some(&short[..])];
        assert!(matches!(
            resolve_encode(2, 1, &data, &mut coding, 8),
            Err(Error::InvalidInput(_))
        ));

        let data = [Some(&a[..])];
        assert!(resolve_encode(2, 1, &data, &mut coding, 8).is_err());

        let data = [Some(&a[..]), Some(&a[..])];
        let mut no_coding: [Option<&mut [u8]>; 1] = [None];
        assert!(matches!(
            resolve_encode(2, 1, &data, &mut no_coding, 8),
            Err(Error::MissingBuffer { slot: 2 })
        ));
        assert!(resolve_encode(2, 1, &data, &mut coding, 0).is_err());
    }

    #[test]
    fn test_plan_decode_classifies_slots() {
        let block = [0u8; 4];
        let mut out = [0u8; 4];
        // slots 1 and 3 missing, only 3 requested; slot 0 requested but present
        let inputs = [Some(&block[..]), None, Some(&block[..]), None, Some(&block[..])];
        let outputs = [Some(&mut out[..]), None];
        let layout = plan_decode(5, &inputs, &outputs, &[3, 0], 4).unwrap();

        assert_eq!(
            layout.slots(),
            &[
                SlotSource::Present,
                SlotSource::ErasedDontCare,
                SlotSource::Present,
                SlotSource::ErasedRequested { output: 0 },
                SlotSource::Present,
            ]
        );
        assert_eq!(layout.decode_erasures(), &[1, 3]);
        assert_eq!(layout.dont_care(), 1);
    }

    #[test]
    fn test_plan_decode_rejects() {
        let block = [0u8; 4];
        let mut out = [0u8; 4];
        let inputs = [Some(&block[..]), None, Some(&block[..])];

        let outputs = [Some(&mut out[..])];
        assert!(plan_decode(3, &inputs, &outputs, &[3], 4).is_err());
        assert!(plan_decode(3, &inputs, &outputs, &[], 4).is_err());
        assert!(plan_decode(3, &inputs[..2], &outputs, &[1], 4).is_err());
        assert!(plan_decode(3, &inputs, &outputs, &[1], 8).is_err());

        let missing: [Option<&mut [u8]>; 1] = [None];
        assert!(matches!(
            plan_decode(3, &inputs, &missing, &[1], 4),
            Err(Error::MissingBuffer { slot: 1 })
        ));

        let mut second = [0u8; 4];
        let doubled = [Some(&mut out[..]), Some(&mut second[..])];
        assert!(plan_decode(3, &inputs, &doubled, &[1, 1], 4).is_err());
    }

    #[test]
    fn test_bind_targets_order() {
        let block = [0u8; 2];
        let mut out = [0u8; 2];
        let inputs = [None, Some(&block[..]), None, Some(&block[..])];
        let mut outputs = [Some(&mut out[..])];
        let layout = plan_decode(4, &inputs, &outputs, &[2], 2).unwrap();

        let mut arena = ScratchArena::new();
        let scratch = arena.reserve(2, layout.dont_care()).unwrap();
        let mut targets = bind_targets(&layout, &mut outputs, scratch, 2).unwrap();
        assert_eq!(targets.len(), 2);
        targets[0].fill(0xaa);
        targets[1].fill(0xbb);
        drop(targets);
        assert_eq!(out, [0xbb, 0xbb]);
    }

    #[test]
    fn test_arena_grows_monotonically() {
        let mut arena = ScratchArena::new();
        assert_eq!(arena.reserve(64, 0).unwrap().len(), 0);
        assert_eq!(arena.allocations(), 0);

        assert_eq!(arena.reserve(64, 2).unwrap().len(), 128);
        assert_eq!(arena.reserve(32, 1).unwrap().len(), 32);
        assert_eq!(arena.allocations(), 1);

        assert_eq!(arena.reserve(128, 1).unwrap().len(), 128);
        assert_eq!(arena.capacity(), 256);
        assert_eq!(arena.allocations(), 2);

        arena.release();
        assert_eq!(arena.capacity(), 0);
    }
}
