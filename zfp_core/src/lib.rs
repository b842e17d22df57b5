pub mod bitstream;
pub mod codec;
pub mod error;
pub mod field;
pub mod format;
pub mod mode;
pub mod scalar;
pub mod shape;

pub use bitstream::{BitStorage, BitStream};
pub use codec::Codec;
pub use error::{Result, ZfpError};
pub use format::{Header, StreamHeader, HEADER_BITS, HEADER_BYTES, MAGIC};
pub use mode::{Mode, Params};
pub use scalar::{Scalar, ScalarType};
pub use shape::Shape;
