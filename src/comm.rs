//! Collective operations between the workers of a distributed solve.
//!
//! Every worker holds a full copy of the block vectors, so norms and dot products are
//! computed locally. The only collective operation is the agreement on outcomes through
//! [`Communicator::any`]: all workers must call it, in the same order, or the solve
//! deadlocks.

pub trait Communicator {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Returns `true` on every worker if `flag` is `true` on at least one worker.
    fn any(&self, flag: bool) -> bool;

    /// The worker responsible for side effects such as writing diagnostics.
    fn is_coordinator(&self) -> bool {
        self.rank() == 0
    }
}

impl<C: Communicator + ?Sized> Communicator for &C {
    fn rank(&self) -> usize {
        (**self).rank()
    }

    fn size(&self) -> usize {
        (**self).size()
    }

    fn any(&self, flag: bool) -> bool {
        (**self).any(flag)
    }
}

/// A single worker owning every degree of freedom.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct SerialCommunicator;

impl Communicator for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn any(&self, flag: bool) -> bool {
        flag
    }
}
