//! Compressed multidimensional arrays with random read/write access.
//!
//! Values live in a zfp-compressed buffer; a small cache of decoded blocks
//! serves element reads and collects writes until the block is written back.

pub mod array;
pub mod cache;
pub mod factory;
pub mod iter;
pub mod store;

pub use array::{
    Array1, Array1d, Array1f, Array2, Array2d, Array2f, Array3, Array3d, Array3f, ArrayConfig, ArrayScalar,
    CompressedArray, DEFAULT_CACHE_BLOCKS,
};
pub use cache::{BlockCache, BlockStore, CacheStats};
pub use factory::{Array, Constructor, Factory};
pub use iter::{Cursor, Iter, Ref};
pub use store::{BlockBuffer, BufferView, Source};
