//! Errors raised while processing or committing a cavity pass

use crate::topology::handle::ElementKind;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CavityError {
    /// A patch the pass needs is locked or was modified earlier in this round.
    #[error("patch {patch} is busy")]
    Contention { patch: u32 },
    /// A copy could not be followed to its owner.
    #[error("{kind} copy ({patch}, {local}) has no owner entry")]
    MissingCopy {
        kind: ElementKind,
        patch: u32,
        local: u16,
    },
    /// Owner resolution did not terminate within the hop budget.
    #[error("owner chain from {kind} ({patch}, {local}) is too long")]
    ChainTooLong {
        kind: ElementKind,
        patch: u32,
        local: u16,
    },
    /// No free slot of `kind` is left in the patch.
    #[error("patch {patch} has no free {kind} slot")]
    CapacityExhausted { patch: u32, kind: ElementKind },
    /// The patch would reference more neighbors than its stash holds.
    #[error("patch {patch} stash is full")]
    StashOverflow { patch: u32 },
    #[error("patch {patch} {kind} LP table is full")]
    HashTableFull { patch: u32, kind: ElementKind },
    /// The pass failed earlier and its working copy cannot be committed.
    #[error("cavity pass on patch {patch} was aborted")]
    Aborted { patch: u32 },
    /// Raised by user code inside an edit kernel.
    #[error("kernel error: {0}")]
    Kernel(String),
}

impl CavityError {
    /// Whether re-running the same patch later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CavityError::Contention { .. } | CavityError::MissingCopy { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(CavityError::Contention { patch: 1 }.is_retryable());
        assert!(
            CavityError::MissingCopy {
                kind: ElementKind::Edge,
                patch: 0,
                local: 3
            }
            .is_retryable()
        );
        assert!(
            !CavityError::CapacityExhausted {
                patch: 0,
                kind: ElementKind::Face
            }
            .is_retryable()
        );
        assert!(!CavityError::Kernel("bad".into()).is_retryable());
    }
}
