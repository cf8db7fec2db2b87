//! Completion tracking for split compute operations.
//!
//! One call may issue up to two sub-operations (bulk and remainder). The caller
//! increments the barrier's reference count once per issued sub-operation, each
//! sub-operation signals exactly once, and the caller blocks in
//! [`CompletionBarrier::wait`] until the count returns to zero. A failure from
//! either sub-operation fails the whole call.

use parking_lot::{Condvar, Mutex};
use tracing::{error, trace, warn};

use crate::error::{Error, Result};

/// Which part of a block a sub-operation covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionKind {
    /// The largest aligned prefix, or the whole block when not split
    Aligned,
    /// The unaligned tail
    Remainder,
}

/// Tag attached to each completion signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionContext {
    /// Part of the block the sub-operation covered
    pub kind: CompletionKind,
    /// Id of the coder context that issued it
    pub owner: u64,
}

#[derive(Debug, Default)]
struct BarrierState {
    ref_count: usize,
    failures: Vec<(CompletionContext, String)>,
}

/// Reference-counted completion barrier.
#[derive(Debug, Default)]
pub struct CompletionBarrier {
    state: Mutex<BarrierState>,
    done: Condvar,
}

impl CompletionBarrier {
    /// Creates an idle barrier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one issued sub-operation.
    pub fn issue(&self) {
        self.state.lock().ref_count += 1;
    }

    /// Signals completion of one issued sub-operation.
    pub fn signal(&self, context: CompletionContext, status: Result<()>) {
        let mut state = self.state.lock();
        if let Err(e) = status {
            warn!(owner = context.owner, kind = ?context.kind, "sub-operation failed: {}", e);
            state.failures.push((context, e.to_string()));
        } else {
            trace!(owner = context.owner, kind = ?context.kind, "sub-operation complete");
        }

        match state.ref_count.checked_sub(1) {
            Some(remaining) => state.ref_count = remaining,
            None => {
                warn!(owner = context.owner, "completion signalled with nothing outstanding");
                return;
            }
        }

        if state.ref_count == 0 {
            self.done.notify_all();
        }
    }

    /// Blocks until every issued sub-operation has signalled.
    ///
    /// Returns the first recorded failure, if any, and clears the failure state
    /// for the next call.
    pub fn wait(&self) -> Result<()> {
        let mut state = self.state.lock();
        while state.ref_count > 0 {
            self.done.wait(&mut state);
        }

        let failures = std::mem::take(&mut state.failures);
        match failures.into_iter().next() {
            None => Ok(()),
            Some((context, message)) => {
                error!(owner = context.owner, "compute call failed: {}", message);
                Err(Error::Compute(format!(
                    "{:?} sub-operation failed: {}",
                    context.kind, message
                )))
            }
        }
    }

    /// Number of sub-operations still outstanding.
    pub fn outstanding(&self) -> usize {
        self.state.lock().ref_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALIGNED: CompletionContext = CompletionContext {
        kind: CompletionKind::Aligned,
        owner: 7,
    };
    const REMAINDER: CompletionContext = CompletionContext {
        kind: CompletionKind::Remainder,
        owner: 7,
    };

    #[test]
    fn test_wait_for_both() {
        let barrier = CompletionBarrier::new();
        barrier.issue();
        barrier.issue();
        std::thread::scope(|s| {
            s.spawn(|| barrier.signal(ALIGNED, Ok(())));
            s.spawn(|| barrier.signal(REMAINDER, Ok(())));
            assert!(barrier.wait().is_ok());
        });
        assert_eq!(barrier.outstanding(), 0);
    }

    #[test]
    fn test_one_failure_fails_the_call() {
        let barrier = CompletionBarrier::new();
        barrier.issue();
        barrier.issue();
        barrier.signal(ALIGNED, Ok(()));
        barrier.signal(REMAINDER, Err(Error::Compute("engine fault".into())));
        let err = barrier.wait().unwrap_err();
        assert!(err.to_string().contains("Remainder"));

        // failure state does not leak into the next call
        barrier.issue();
        barrier.signal(ALIGNED, Ok(()));
        assert!(barrier.wait().is_ok());
    }

    #[test]
    fn test_wait_without_issue() {
        assert!(CompletionBarrier::new().wait().is_ok());
    }
}
