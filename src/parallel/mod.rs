//! # Split dispatch
//!
//! Backends work best on block lengths that are a multiple of their alignment
//! unit. When splitting is enabled, a block of length `n` is cut into the
//! largest aligned prefix and the remaining tail, and the two parts run as
//! independent sub-operations on the rayon pool. A [`CompletionBarrier`]
//! joins them before the call returns.
//!
//! ## Components
//!
//! - `SplitPlan`: where a block is cut
//! - `CompletionBarrier`: waits for every issued sub-operation
//! - `dispatch`: runs a matrix application over a plan

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::trace;

use crate::error::{Error, Result};
use crate::hardware::{ComputeKind, HardwareAccelerator};

mod completion;

pub use completion::{CompletionBarrier, CompletionContext, CompletionKind};

/// How a block is divided between the bulk and remainder paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitPlan {
    /// Length of the aligned prefix
    pub aligned: usize,
    /// Length of the tail
    pub remainder: usize,
}

impl SplitPlan {
    /// Plans a block of `block_size` bytes.
    ///
    /// With splitting disabled the whole block runs as one bulk sub-operation.
    pub fn new(block_size: usize, alignment: usize, split: bool) -> Self {
        if !split || alignment == 0 {
            return Self {
                aligned: block_size,
                remainder: 0,
            };
        }

        let remainder = block_size % alignment;
        Self {
            aligned: block_size - remainder,
            remainder,
        }
    }

    /// Number of sub-operations the plan issues.
    pub fn sub_operations(&self) -> usize {
        usize::from(self.aligned > 0) + usize::from(self.remainder > 0)
    }
}

/// Outcome of a dispatched call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    /// Sub-operations issued
    pub issued: usize,
    /// Whether the call ran on worker threads
    pub concurrent: bool,
}

fn run_guarded(
    accelerator: &dyn HardwareAccelerator,
    kind: ComputeKind,
    matrix: &[u8],
    inputs: &[&[u8]],
    outputs: &mut [&mut [u8]],
) -> Result<()> {
    catch_unwind(AssertUnwindSafe(|| {
        accelerator.apply_matrix(kind, matrix, inputs, outputs)
    }))
    .unwrap_or_else(|_| Err(Error::Compute("compute backend panicked".into())))
}

/// Applies `matrix` over `plan`, blocking until every sub-operation completes.
///
/// When both parts are non-empty and `concurrent` is set, they run as two
/// rayon tasks; otherwise they run one after the other on the calling thread.
/// Either way every part is issued on and signalled to `barrier`.
#[allow(clippy::too_many_arguments)]
pub fn dispatch(
    accelerator: &dyn HardwareAccelerator,
    barrier: &CompletionBarrier,
    owner: u64,
    kind: ComputeKind,
    plan: SplitPlan,
    concurrent: bool,
    matrix: &[u8],
    inputs: &[&[u8]],
    outputs: &mut [&mut [u8]],
) -> Result<DispatchReport> {
    let aligned_ctx = CompletionContext {
        kind: CompletionKind::Aligned,
        owner,
    };
    let remainder_ctx = CompletionContext {
        kind: CompletionKind::Remainder,
        owner,
    };

    if plan.sub_operations() < 2 {
        let ctx = if plan.aligned > 0 { aligned_ctx } else { remainder_ctx };
        barrier.issue();
        barrier.signal(ctx, run_guarded(accelerator, kind, matrix, inputs, outputs));
        barrier.wait()?;
        return Ok(DispatchReport {
            issued: 1,
            concurrent: false,
        });
    }

    let (head_inputs, tail_inputs): (Vec<&[u8]>, Vec<&[u8]>) =
        inputs.iter().map(|block| block.split_at(plan.aligned)).unzip();
    let mut head_outputs = Vec::with_capacity(outputs.len());
    let mut tail_outputs = Vec::with_capacity(outputs.len());
    for block in outputs.iter_mut() {
        let (head, tail) = block.split_at_mut(plan.aligned);
        head_outputs.push(head);
        tail_outputs.push(tail);
    }

    trace!(
        owner,
        aligned = plan.aligned,
        remainder = plan.remainder,
        concurrent,
        "issuing split operation"
    );

    barrier.issue();
    barrier.issue();

    let mut run_head = || {
        let status = run_guarded(accelerator, kind, matrix, &head_inputs, &mut head_outputs);
        barrier.signal(aligned_ctx, status);
    };
    let mut run_tail = || {
        let status = run_guarded(accelerator, kind, matrix, &tail_inputs, &mut tail_outputs);
        barrier.signal(remainder_ctx, status);
    };

    if concurrent {
        rayon::join(run_head, run_tail);
    } else {
        run_head();
        run_tail();
    }

    barrier.wait()?;

    Ok(DispatchReport {
        issued: 2,
        concurrent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::CPUAccelerator;

    #[test]
    fn test_split_plan() {
        assert_eq!(SplitPlan::new(128, 64, true), SplitPlan { aligned: 128, remainder: 0 });
        assert_eq!(SplitPlan::new(100, 64, true), SplitPlan { aligned: 64, remainder: 36 });
        assert_eq!(SplitPlan::new(30, 64, true), SplitPlan { aligned: 0, remainder: 30 });
        assert_eq!(SplitPlan::new(100, 64, false), SplitPlan { aligned: 100, remainder: 0 });
        assert_eq!(SplitPlan::new(100, 64, true).sub_operations(), 2);
        assert_eq!(SplitPlan::new(30, 64, true).sub_operations(), 1);
    }

    fn xor_two(block_size: usize, split: bool, concurrent: bool) -> (Vec<u8>, DispatchReport) {
        let accelerator = CPUAccelerator::new();
        let barrier = CompletionBarrier::new();
        let a: Vec<u8> = (0..block_size).map(|i| i as u8).collect();
        let b: Vec<u8> = (0..block_size).map(|i| (i * 7) as u8).collect();
        let mut out = vec![0u8; block_size];
        let inputs: Vec<&[u8]> = vec![&a, &b];
        let mut outputs: Vec<&mut [u8]> = vec![&mut out];
        let report = dispatch(
            &accelerator,
            &barrier,
            1,
            ComputeKind::Encode,
            SplitPlan::new(block_size, 64, split),
            concurrent,
            &[1, 1],
            &inputs,
            &mut outputs,
        )
        .unwrap();
        assert_eq!(barrier.outstanding(), 0);
        for i in 0..block_size {
            assert_eq!(out[i], a[i] ^ b[i]);
        }
        (out, report)
    }

    #[test]
    fn test_dispatch_split_covers_whole_block() {
        let (_, report) = xor_two(200, true, true);
        assert_eq!(report, DispatchReport { issued: 2, concurrent: true });
    }

    #[test]
    fn test_dispatch_split_in_sequence() {
        let (_, report) = xor_two(200, true, false);
        assert_eq!(report, DispatchReport { issued: 2, concurrent: false });
    }

    #[test]
    fn test_dispatch_single_path() {
        assert_eq!(xor_two(128, true, true).1.issued, 1);
        assert_eq!(xor_two(30, true, true).1.issued, 1);
        assert!(!xor_two(200, false, true).1.concurrent);
    }

    #[test]
    fn test_dispatch_reports_backend_error() {
        let accelerator = CPUAccelerator::new();
        let barrier = CompletionBarrier::new();
        let a = vec![0u8; 100];
        let mut out = vec![0u8; 100];
        let inputs: Vec<&[u8]> = vec![&a];
        let mut outputs: Vec<&mut [u8]> = vec![&mut out];
        // wrong coefficient count fails both halves
        let result = dispatch(
            &accelerator,
            &barrier,
            1,
            ComputeKind::Decode,
            SplitPlan::new(100, 64, true),
            true,
            &[1, 1, 1],
            &inputs,
            &mut outputs,
        );
        assert!(matches!(result, Err(Error::Compute(_))));
        assert_eq!(barrier.outstanding(), 0);
    }
}
