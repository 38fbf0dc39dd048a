use thiserror::Error;

pub type Result<T> = std::result::Result<T, LinkError>;

/// Failure modes surfaced by the link-graph engine.
///
/// `InvariantViolation` signals a reciprocity or bookkeeping mismatch that a
/// correct caller sequence can never produce; it is fatal to the mutation
/// that detected it. The remaining variants are ordinary caller errors and
/// leave the store unchanged.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("accessor is detached")]
    DetachedAccessor,
    #[error("index {index} out of range (size {size})")]
    IndexOutOfRange { index: usize, size: usize },
    #[error("link bookkeeping invariant violated: {0}")]
    InvariantViolation(&'static str),
    #[error("table is the target of links from another table")]
    CrossTableLinkTarget,
    #[error("operation not allowed by schema: {0}")]
    IllegalCombination(&'static str),
    #[error("allocation failed: {0}")]
    AllocationFailure(&'static str),
}

impl LinkError {
    pub(crate) fn range(index: usize, size: usize) -> Self {
        LinkError::IndexOutOfRange { index, size }
    }
}
