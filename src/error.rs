//! Synthesis-time error taxonomy.
//!
//! Every variant is raised before any texture is requested, so a failed
//! synthesis never leaves partially allocated GPU state behind.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    #[error("{op} kernel expects {expected} input tensor(s), got {actual}")]
    InvalidInputCount {
        op: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("incompatible shapes for broadcasting: {a:?} and {b:?}")]
    IncompatibleShapes { a: Vec<usize>, b: Vec<usize> },

    #[error("matmul contraction dimension mismatch: {a:?} has K={a_k}, {b:?} has K={b_k}")]
    IncompatibleContractionDim {
        a: Vec<usize>,
        b: Vec<usize>,
        a_k: usize,
        b_k: usize,
    },

    #[error("rank {0} is not supported by the packed coordinate primitives (1..=6)")]
    UnsupportedRank(usize),

    #[error("dimension {0} does not fit in shader i32 coordinates")]
    DimensionTooLarge(usize),

    #[error("{channels}-channel layouts are not supported (packed: {is_packed})")]
    UnsupportedChannels { channels: usize, is_packed: bool },

    #[error("tensor data length {actual} does not match shape {shape:?} ({expected} elements)")]
    DataLengthMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
}
