//! Error kinds shared by every module in this crate.

use crate::coord::VoxelPos;
use crate::region::Region;

/// Every fallible operation in this crate returns one of these kinds.
///
/// Mirrors the one-enum-per-concern shape the rest of the codebase uses for
/// its storage errors, but collapsed into a single enum since a caller of
/// the volume/extractor API wants to match on outcome, not on which
/// submodule produced it.
#[derive(thiserror::Error, Debug)]
pub enum VolumeError {
    #[error("access at {coord} is outside the enclosing region {region:?}")]
    OutOfBounds { coord: VoxelPos, region: Region },

    #[error("region {region:?} is not valid: {reason}")]
    InvalidRegion { region: Region, reason: String },

    #[error("block side {requested} must be a nonzero power of two")]
    InvalidBlockSide { requested: u16 },

    #[error("mesh index overflow: a 16-bit mesh cannot hold a 65536th vertex")]
    MeshIndexOverflow,

    #[error("pager failed during {operation} on region {region:?}")]
    PagerFailure {
        operation: PagerOperation,
        region: Region,
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("extractor precondition failed: {detail}")]
    ExtractorPrecondition { detail: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagerOperation {
    PageIn,
    PageOut,
}

impl std::fmt::Display for PagerOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            PagerOperation::PageIn => write!(f, "page-in"),
            PagerOperation::PageOut => write!(f, "page-out"),
        }
    }
}
