//! Random-access compressed arrays.
//!
//! A [`CompressedArray`] looks like a dense `D`-dimensional array of `T`
//! but keeps its values compressed in blocks of `4^D`. Reads decode the
//! owning block into a small write-back cache; writes modify the cached
//! block and are re-encoded when the block is evicted or the array is
//! flushed.

use log::{debug, warn};
use xxhash_rust::xxh3::xxh3_64;
use zfp_core::field::scatter_block;
use zfp_core::{Header, Mode, Result, Scalar, ScalarType, Shape, ZfpError, HEADER_BYTES};

use crate::cache::{BlockCache, BlockStore, CacheStats};
use crate::iter::{Cursor, Iter, Ref};
use crate::store::{BlockBuffer, BufferView, Source};

/// Default number of decoded blocks kept per array.
pub const DEFAULT_CACHE_BLOCKS: usize = 16;

mod sealed {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

/// Scalar types an array can hold.
pub trait ArrayScalar: Scalar + sealed::Sealed {}

impl ArrayScalar for f32 {}
impl ArrayScalar for f64 {}

/// Tuning knobs that do not affect the compressed representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ArrayConfig {
    /// Capacity of the decoded-block cache.
    pub cache_blocks: usize,
}

impl Default for ArrayConfig {
    fn default() -> Self {
        Self {
            cache_blocks: DEFAULT_CACHE_BLOCKS,
        }
    }
}

pub struct CompressedArray<'a, T: ArrayScalar, const D: usize> {
    shape: Shape,
    mode: Mode,
    buffer: BlockBuffer<'a>,
    cache: BlockCache<T>,
}

pub type Array1<'a, T> = CompressedArray<'a, T, 1>;
pub type Array2<'a, T> = CompressedArray<'a, T, 2>;
pub type Array3<'a, T> = CompressedArray<'a, T, 3>;

pub type Array1f<'a> = Array1<'a, f32>;
pub type Array2f<'a> = Array2<'a, f32>;
pub type Array3f<'a> = Array3<'a, f32>;
pub type Array1d<'a> = Array1<'a, f64>;
pub type Array2d<'a> = Array2<'a, f64>;
pub type Array3d<'a> = Array3<'a, f64>;

impl<T: ArrayScalar, const D: usize> CompressedArray<'static, T, D> {
    /// All-zero array with an owned buffer.
    pub fn new(extents: [usize; D], mode: Mode) -> Result<Self> {
        Self::with_config(extents, mode, ArrayConfig::default())
    }

    /// Fixed-rate array storing `rate` bits per value (after rounding to a
    /// whole 64-bit word per block).
    pub fn with_rate(extents: [usize; D], rate: f64) -> Result<Self> {
        Self::new(extents, Mode::fixed_rate(rate, T::TYPE, D))
    }

    pub fn with_config(extents: [usize; D], mode: Mode, config: ArrayConfig) -> Result<Self> {
        Self::open(Shape::new(&extents)?, mode, Source::Empty, config)
    }

    /// Array owning a copy of compressed `bytes` laid out as
    /// [`compressed_data`](Self::compressed_data) returns them.
    pub fn from_compressed(extents: [usize; D], mode: Mode, bytes: Vec<u8>, config: ArrayConfig) -> Result<Self> {
        Self::open(Shape::new(&extents)?, mode, Source::Bytes(bytes), config)
    }
}

impl<'a, T: ArrayScalar, const D: usize> CompressedArray<'a, T, D> {
    /// Array over a caller buffer holding compressed data. The buffer is
    /// checked against the size the shape and mode need before it is read.
    pub fn from_view(extents: [usize; D], mode: Mode, view: BufferView<'a>, config: ArrayConfig) -> Result<Self> {
        Self::open(Shape::new(&extents)?, mode, Source::View(view), config)
    }

    /// Array described by `header`, over `source`.
    pub fn from_header(header: &Header, source: Source<'a>, config: ArrayConfig) -> Result<Self> {
        if header.scalar_type() != T::TYPE {
            return Err(ZfpError::ScalarTypeMismatch {
                expected: T::TYPE,
                found: header.scalar_type(),
            });
        }
        if header.dims() != D {
            return Err(ZfpError::InvalidShape(format!(
                "header describes a {}D array, expected {}D",
                header.dims(),
                D
            )));
        }
        Self::open(*header.shape(), header.mode(), source, config)
    }

    fn open(shape: Shape, mode: Mode, source: Source<'a>, config: ArrayConfig) -> Result<Self> {
        if shape.dims() != D {
            return Err(ZfpError::InvalidShape(format!("expected {} extents, got {}", D, shape.dims())));
        }
        let buffer = BlockBuffer::open::<T>(shape, mode, source)?;
        let cache = BlockCache::new(config.cache_blocks, shape.block_len());
        debug!(
            "created array{}{} {:?}, {:?}, cache of {} blocks",
            D,
            T::TYPE.suffix(),
            shape.extents(),
            mode,
            cache.capacity()
        );
        Ok(Self {
            shape,
            mode,
            buffer,
            cache,
        })
    }

    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn extents(&self) -> [usize; D] {
        let mut extents = [0; D];
        extents.copy_from_slice(self.shape.extents());
        extents
    }

    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[inline]
    pub fn scalar_type(&self) -> ScalarType {
        T::TYPE
    }

    /// Bits per value, for fixed-rate arrays.
    pub fn rate(&self) -> Option<f64> {
        self.mode.rate(D)
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.shape.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shape.is_empty()
    }

    /// Short header describing this array.
    pub fn header(&self) -> Result<Header> {
        Header::new(T::TYPE, self.shape, self.mode)
    }

    fn locate(&self, index: &[usize; D]) -> Result<(usize, usize)> {
        if !self.shape.contains(index) {
            return Err(ZfpError::IndexOutOfBounds {
                index: index.to_vec(),
                shape: self.shape.extents().to_vec(),
            });
        }
        Ok(self.shape.locate(index))
    }

    pub(crate) fn value(&mut self, block: usize, offset: usize) -> Result<T> {
        Ok(self.cache.get(block, &mut self.buffer)?[offset])
    }

    /// Cached value for writing; marks the block dirty.
    pub(crate) fn value_mut(&mut self, block: usize, offset: usize) -> Result<&mut T> {
        Ok(&mut self.cache.get_mut(block, &mut self.buffer)?[offset])
    }

    pub fn get_at(&mut self, index: [usize; D]) -> Result<T> {
        let (block, offset) = self.locate(&index)?;
        self.value(block, offset)
    }

    /// Stores `value`; the owning block is re-encoded lazily.
    pub fn set_at(&mut self, index: [usize; D], value: T) -> Result<()> {
        let (block, offset) = self.locate(&index)?;
        *self.value_mut(block, offset)? = value;
        Ok(())
    }

    /// Reference to one element.
    pub fn at(&mut self, index: [usize; D]) -> Result<Ref<'_, 'a, T, D>> {
        let (block, offset) = self.locate(&index)?;
        Ok(Ref::new(self, index, block, offset))
    }

    /// Exchanges two elements.
    pub fn swap(&mut self, a: [usize; D], b: [usize; D]) -> Result<()> {
        let x = self.get_at(a)?;
        let y = self.get_at(b)?;
        self.set_at(a, y)?;
        self.set_at(b, x)
    }

    /// Every `(index, value)` pair in block order.
    pub fn iter(&mut self) -> Iter<'_, 'a, T, D> {
        Iter::new(self)
    }

    /// Mutable traversal in block order.
    pub fn cursor(&mut self) -> Cursor<'_, 'a, T, D> {
        Cursor::new(self)
    }

    /// Replaces every value with `f(index, value)`, block by block.
    pub fn update_each(&mut self, mut f: impl FnMut([usize; D], T) -> T) -> Result<()> {
        let mut cursor = self.cursor();
        while let Some(mut element) = cursor.next_ref() {
            let index = element.index();
            element.update(|value| f(index, value))?;
        }
        Ok(())
    }

    /// Writes every modified block back into the compressed buffer.
    pub fn flush(&mut self) -> Result<()> {
        self.cache.flush(&mut self.buffer)?;
        if self.buffer.is_fragmented() {
            self.buffer.compact()?;
        }
        Ok(())
    }

    /// Compressed blocks, consistent with every write made so far.
    pub fn compressed_data(&mut self) -> Result<&[u8]> {
        self.flush()?;
        Ok(self.buffer.bytes())
    }

    pub fn compressed_size(&mut self) -> Result<usize> {
        Ok(self.compressed_data()?.len())
    }

    /// Header followed by the compressed blocks.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let header = self.header()?;
        let data = self.compressed_data()?;
        let mut bytes = Vec::with_capacity(HEADER_BYTES + data.len());
        bytes.extend_from_slice(&header.to_bytes());
        bytes.extend_from_slice(data);
        Ok(bytes)
    }

    /// xxh3-64 of the compressed data.
    pub fn checksum(&mut self) -> Result<u64> {
        Ok(xxh3_64(self.compressed_data()?))
    }

    /// Decompresses the whole array, x varying fastest.
    pub fn get_all(&mut self) -> Result<Vec<T>> {
        self.cache.flush(&mut self.buffer)?;
        let mut data = vec![T::default(); self.shape.len()];
        let mut values = vec![T::default(); self.shape.block_len()];
        for block in 0..self.shape.block_count() {
            BlockStore::<T>::decode_block(&mut self.buffer, block, &mut values)?;
            scatter_block(&values, &self.shape, block, &mut data);
        }
        Ok(data)
    }

    /// Replaces every value; `data` is dense with x varying fastest.
    pub fn set_all(&mut self, data: &[T]) -> Result<()> {
        if data.len() != self.shape.len() {
            return Err(ZfpError::InvalidShape(format!(
                "{} values do not fill shape {:?}",
                data.len(),
                self.shape.extents()
            )));
        }
        self.cache.discard();
        self.buffer.encode_all(data)
    }

    pub fn cache_blocks(&self) -> usize {
        self.cache.capacity()
    }

    pub fn set_cache_blocks(&mut self, blocks: usize) -> Result<()> {
        self.cache.resize(blocks, &mut self.buffer)
    }

    /// Writes back and drops every cached block.
    pub fn clear_cache(&mut self) -> Result<()> {
        self.cache.clear(&mut self.buffer)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn reset_cache_stats(&mut self) {
        self.cache.reset_stats();
    }
}

impl<T: ArrayScalar> CompressedArray<'_, T, 1> {
    pub fn get(&mut self, i: usize) -> Result<T> {
        self.get_at([i])
    }

    pub fn set(&mut self, i: usize, value: T) -> Result<()> {
        self.set_at([i], value)
    }
}

impl<T: ArrayScalar> CompressedArray<'_, T, 2> {
    pub fn get(&mut self, i: usize, j: usize) -> Result<T> {
        self.get_at([i, j])
    }

    pub fn set(&mut self, i: usize, j: usize, value: T) -> Result<()> {
        self.set_at([i, j], value)
    }
}

impl<T: ArrayScalar> CompressedArray<'_, T, 3> {
    pub fn get(&mut self, i: usize, j: usize, k: usize) -> Result<T> {
        self.get_at([i, j, k])
    }

    pub fn set(&mut self, i: usize, j: usize, k: usize, value: T) -> Result<()> {
        self.set_at([i, j, k], value)
    }
}

impl<T: ArrayScalar, const D: usize> Drop for CompressedArray<'_, T, D> {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("failed to flush array{}{} on drop: {}", D, T::TYPE.suffix(), e);
        }
    }
}
