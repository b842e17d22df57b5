//! Error type shared by every zfp component.
//!
//! The `Display` text of each variant is stable: callers and tests compare
//! against the exact strings.

use thiserror::Error;

use crate::scalar::ScalarType;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ZfpError {
    /// The header names a scalar type that arrays cannot hold.
    #[error("zfp scalar type not supported")]
    UnsupportedScalarType,

    /// The header describes a field with more than three dimensions.
    #[error("zfp deserialization supports only 1D, 2D, and 3D arrays")]
    UnsupportedDimensionality,

    /// The dimensionality is valid, but no array type was registered for it.
    #[error("zfp array{dims}d not supported; include its support before using the factory")]
    DimensionalityNotRegistered { dims: usize },

    /// An external buffer is shorter than the shape and mode require.
    #[error("zfp buffer size is smaller than required")]
    BufferTooSmall { required: usize, actual: usize },

    /// Encoding the header would need the long mode or wider fields.
    #[error("zfp serialization supports only short headers")]
    HeaderTooLong,

    #[error("bit stream access out of bounds: {requested} bits at position {position} exceeds capacity of {capacity} bits")]
    Bounds {
        position: usize,
        requested: usize,
        capacity: usize,
    },

    /// Magic bytes or codec version did not match.
    #[error("zfp header is corrupt")]
    CorruptHeader,

    /// A fixed block budget smaller than the flag and exponent of one block.
    #[error("zfp block budget of {bits} bits cannot hold a {required}-bit block header")]
    BlockBudgetTooSmall { bits: u32, required: u32 },

    #[error("zfp compression mode {0:#x} not supported")]
    UnsupportedMode(u64),

    #[error("zfp scalar type mismatch: expected {expected}, found {found}")]
    ScalarTypeMismatch {
        expected: ScalarType,
        found: ScalarType,
    },

    #[error("invalid shape: {0}")]
    InvalidShape(String),

    #[error("index {index:?} out of bounds for array of shape {shape:?}")]
    IndexOutOfBounds { index: Vec<usize>, shape: Vec<usize> },
}

/// Convenience alias used throughout the zfp crates.
pub type Result<T> = std::result::Result<T, ZfpError>;
