//! Compressed block storage backing an array.
//!
//! # Buffer layout
//! ```text
//! fixed rate:     [BLOCK 0][BLOCK 1] ... [BLOCK N-1]     block i at bit i * R
//! variable modes: [BLOCK 0][BLOCK 1] ... [BLOCK N-1]     contiguous after compaction
//!                 ...[gap][BLOCK k']                     between compactions
//! ```
//!
//! Fixed-rate blocks are rewritten in place. In the variable modes a block
//! that grows is appended after the last used bit and the old slot becomes
//! a gap; [`BlockBuffer::compact`] squeezes gaps out again.

use log::debug;
use zfp_core::bitstream::{BitStorage, BitStream};
use zfp_core::field::gather_block;
use zfp_core::shape::BLOCK_SIDE;
use zfp_core::{Codec, Mode, Result, Scalar, Shape, ZfpError};

use crate::cache::BlockStore;

/// Caller-owned buffer lent to an array, with an explicit length.
///
/// The array reads and rewrites the first `len` bytes in place and never
/// takes ownership; the borrow keeps the buffer alive and untouched by
/// anyone else for as long as the array exists.
#[derive(Debug)]
pub struct BufferView<'a> {
    bytes: &'a mut [u8],
    len: usize,
}

impl<'a> BufferView<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        let len = bytes.len();
        Self { bytes, len }
    }

    /// View of which only the first `len` bytes are usable. `len` is
    /// clamped to the slice length.
    pub fn with_len(bytes: &'a mut [u8], len: usize) -> Self {
        let len = len.min(bytes.len());
        Self { bytes, len }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn into_slice(self) -> &'a mut [u8] {
        &mut self.bytes[..self.len]
    }
}

/// Where an array's compressed bytes come from.
#[derive(Debug)]
pub enum Source<'a> {
    /// Fresh owned buffer holding an all-zero array.
    Empty,
    /// Owned copy of previously compressed data.
    Bytes(Vec<u8>),
    /// Borrowed caller buffer.
    View(BufferView<'a>),
}

#[derive(Debug)]
enum Storage<'a> {
    Owned(Vec<u8>),
    Borrowed(&'a mut [u8]),
}

impl AsRef<[u8]> for Storage<'_> {
    fn as_ref(&self) -> &[u8] {
        match self {
            Storage::Owned(v) => v,
            Storage::Borrowed(s) => s,
        }
    }
}

impl AsMut<[u8]> for Storage<'_> {
    fn as_mut(&mut self) -> &mut [u8] {
        match self {
            Storage::Owned(v) => v,
            Storage::Borrowed(s) => s,
        }
    }
}

impl BitStorage for Storage<'_> {
    fn reserve_bits(&mut self, bits: usize) -> bool {
        match self {
            Storage::Owned(v) => v.reserve_bits(bits),
            Storage::Borrowed(s) => s.reserve_bits(bits),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    offset: usize,
    bits: usize,
}

#[derive(Debug)]
enum Layout {
    Fixed { block_bits: usize },
    Variable { slots: Vec<Slot>, end: usize },
}

/// Compressed blocks of one array plus the index needed to reach each of
/// them directly.
#[derive(Debug)]
pub struct BlockBuffer<'a> {
    codec: Codec,
    shape: Shape,
    stream: BitStream<Storage<'a>>,
    layout: Layout,
    scratch: BitStream<Vec<u8>>,
}

/// Bits taken by an all-zero block in a variable-size mode.
#[inline]
fn zero_block_bits(mode: Mode) -> usize {
    mode.params().minbits.max(1) as usize
}

impl<'a> BlockBuffer<'a> {
    /// Smallest buffer, in bytes, that can hold an array of this shape:
    /// exact for fixed rate, the all-zero encoding otherwise.
    pub fn required_bytes(shape: &Shape, mode: Mode) -> usize {
        let per_block = match mode.block_bits() {
            Some(bits) => bits as usize,
            None => zero_block_bits(mode),
        };
        (shape.block_count() * per_block + 7) / 8
    }

    /// Opens storage for `shape`; buffer sizes are validated before any
    /// byte is read.
    pub fn open<T: Scalar>(shape: Shape, mode: Mode, source: Source<'a>) -> Result<Self> {
        let codec = Codec::new(mode, T::TYPE, shape.dims())?;
        let required = Self::required_bytes(&shape, mode);
        let (storage, scan) = match source {
            Source::Empty => (Storage::Owned(vec![0u8; required]), false),
            Source::Bytes(bytes) => {
                check_size(required, bytes.len())?;
                (Storage::Owned(bytes), true)
            }
            Source::View(view) => {
                check_size(required, view.len())?;
                (Storage::Borrowed(view.into_slice()), true)
            }
        };

        let count = shape.block_count();
        let layout = match mode.block_bits() {
            Some(bits) => Layout::Fixed {
                block_bits: bits as usize,
            },
            None => {
                let bits = zero_block_bits(mode);
                Layout::Variable {
                    slots: (0..count)
                        .map(|i| Slot {
                            offset: i * bits,
                            bits,
                        })
                        .collect(),
                    end: count * bits,
                }
            }
        };

        let mut buffer = Self {
            codec,
            shape,
            stream: BitStream::new(storage),
            layout,
            scratch: BitStream::with_capacity(256),
        };
        if scan {
            buffer.index_blocks::<T>()?;
        }
        debug!(
            "opened {} block buffer for {:?}: {} blocks, {} bytes",
            if buffer.is_borrowed() { "borrowed" } else { "owned" },
            buffer.shape.extents(),
            count,
            buffer.used_bytes()
        );
        Ok(buffer)
    }

    /// Decodes an existing variable-size stream once to find where each
    /// block starts.
    fn index_blocks<T: Scalar>(&mut self) -> Result<()> {
        let Layout::Variable { slots, end } = &mut self.layout else {
            return Ok(());
        };
        let mut values = vec![T::default(); self.codec.block_len()];
        self.stream.rewind();
        for slot in slots.iter_mut() {
            let offset = self.stream.position();
            let bits = self.codec.decode_block(&mut self.stream, &mut values)?;
            *slot = Slot { offset, bits };
        }
        *end = self.stream.position();
        Ok(())
    }

    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    #[inline]
    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn is_borrowed(&self) -> bool {
        matches!(self.stream.get_ref(), Storage::Borrowed(_))
    }

    /// Bits from the start of the buffer to the end of the last block.
    pub fn used_bits(&self) -> usize {
        match &self.layout {
            Layout::Fixed { block_bits } => self.shape.block_count() * block_bits,
            Layout::Variable { end, .. } => *end,
        }
    }

    pub fn used_bytes(&self) -> usize {
        (self.used_bits() + 7) / 8
    }

    /// Compressed bytes up to the end of the last block.
    pub fn bytes(&self) -> &[u8] {
        &self.stream.as_bytes()[..self.used_bytes()]
    }

    /// Compressed size of one block in bits.
    pub fn block_bits(&self, block: usize) -> usize {
        match &self.layout {
            Layout::Fixed { block_bits } => *block_bits,
            Layout::Variable { slots, .. } => slots[block].bits,
        }
    }

    /// Sum of the block sizes, ignoring gaps.
    fn live_bits(&self) -> usize {
        match &self.layout {
            Layout::Fixed { .. } => self.used_bits(),
            Layout::Variable { slots, .. } => slots.iter().map(|s| s.bits).sum(),
        }
    }

    /// True when a variable layout has gaps or blocks out of raster order.
    pub fn is_fragmented(&self) -> bool {
        let Layout::Variable { slots, end } = &self.layout else {
            return false;
        };
        let mut expected = 0;
        for slot in slots {
            if slot.offset != expected {
                return true;
            }
            expected += slot.bits;
        }
        expected != *end
    }

    /// Rewrites a variable layout as a contiguous block sequence in raster
    /// order.
    pub fn compact(&mut self) -> Result<()> {
        self.compact_except(None)
    }

    /// Compacts, dropping the bits of block `skip` (about to be rewritten).
    fn compact_except(&mut self, skip: Option<usize>) -> Result<()> {
        let Layout::Variable { slots, end } = &mut self.layout else {
            return Ok(());
        };
        let before = *end;
        let mut packed = BitStream::with_capacity((before + 7) / 8);
        for (block, slot) in slots.iter_mut().enumerate() {
            let offset = packed.position();
            if Some(block) == skip {
                *slot = Slot { offset, bits: 0 };
                continue;
            }
            self.stream.seek(slot.offset);
            packed.copy_from(&mut self.stream, slot.bits)?;
            slot.offset = offset;
        }
        *end = packed.position();
        let after = *end;
        packed.flush()?;
        install(&mut self.stream, packed.into_inner())?;
        debug!("compacted block buffer from {} to {} bits", before, after);
        Ok(())
    }

    /// Re-encodes every block from a dense field, discarding the old
    /// contents.
    pub fn encode_all<T: Scalar>(&mut self, data: &[T]) -> Result<()> {
        let mut values = vec![T::default(); self.codec.block_len()];
        if let Layout::Fixed { .. } = self.layout {
            for block in 0..self.shape.block_count() {
                gather_block(data, &self.shape, block, &mut values);
                BlockStore::<T>::encode_block(self, block, &values)?;
            }
            return Ok(());
        }

        let mut packed = BitStream::with_capacity(self.stream.as_bytes().len());
        let mut offsets = Vec::with_capacity(self.shape.block_count());
        for block in 0..self.shape.block_count() {
            gather_block(data, &self.shape, block, &mut values);
            let offset = packed.position();
            let bits = encode_into(&self.codec, &self.shape, &mut packed, block, &values)?;
            offsets.push(Slot { offset, bits });
        }
        let end = packed.position();
        packed.flush()?;
        install(&mut self.stream, packed.into_inner())?;
        self.layout = Layout::Variable { slots: offsets, end };
        Ok(())
    }

    /// Whether the storage can hold `bits` bits without growing past a
    /// borrowed buffer.
    fn fits(&self, bits: usize) -> bool {
        !self.is_borrowed() || bits <= self.stream.capacity_bits()
    }

    /// Encodes `values` into the scratch stream; returns the bit count.
    fn encode_scratch<T: Scalar>(&mut self, block: usize, values: &[T]) -> Result<usize> {
        self.scratch.rewind();
        encode_into(&self.codec, &self.shape, &mut self.scratch, block, values)
    }
}

fn check_size(required: usize, actual: usize) -> Result<()> {
    if actual < required {
        return Err(ZfpError::BufferTooSmall { required, actual });
    }
    Ok(())
}

/// Encodes one block, padding it first when it sticks out of the array.
fn encode_into<T: Scalar, B: BitStorage>(
    codec: &Codec,
    shape: &Shape,
    stream: &mut BitStream<B>,
    block: usize,
    values: &[T],
) -> Result<usize> {
    let extent = shape.block_extent(block);
    if extent[..shape.dims()].iter().all(|&n| n == BLOCK_SIDE) {
        codec.encode_block(stream, values)
    } else {
        codec.encode_partial(stream, values, &extent)
    }
}

/// Replaces the leading bytes of the storage with `packed`, zeroing the
/// rest of a borrowed buffer.
fn install(stream: &mut BitStream<Storage<'_>>, packed: Vec<u8>) -> Result<()> {
    match stream.get_mut() {
        Storage::Owned(v) => *v = packed,
        Storage::Borrowed(s) => {
            if packed.len() > s.len() {
                return Err(ZfpError::Bounds {
                    position: 0,
                    requested: packed.len() * 8,
                    capacity: s.len() * 8,
                });
            }
            let (head, tail) = s.split_at_mut(packed.len());
            head.copy_from_slice(&packed);
            tail.fill(0);
        }
    }
    Ok(())
}

impl<T: Scalar> BlockStore<T> for BlockBuffer<'_> {
    fn decode_block(&mut self, block: usize, values: &mut [T]) -> Result<()> {
        let offset = match &self.layout {
            Layout::Fixed { block_bits } => block * block_bits,
            Layout::Variable { slots, .. } => slots[block].offset,
        };
        self.stream.seek(offset);
        self.codec.decode_block(&mut self.stream, values)?;
        Ok(())
    }

    fn encode_block(&mut self, block: usize, values: &[T]) -> Result<()> {
        let slot = match &self.layout {
            Layout::Fixed { block_bits } => {
                self.stream.seek(block * block_bits);
                encode_into(&self.codec, &self.shape, &mut self.stream, block, values)?;
                return Ok(());
            }
            Layout::Variable { slots, .. } => slots[block],
        };

        let bits = self.encode_scratch(block, values)?;
        let end = self.used_bits();
        let offset = if bits <= slot.bits || (slot.offset + slot.bits == end && self.fits(slot.offset + bits)) {
            // in place, or the last block growing into free space
            slot.offset
        } else {
            if !self.fits(end + bits) {
                let capacity = self.stream.capacity_bits();
                let others = self.live_bits() - slot.bits;
                if others + bits > capacity {
                    return Err(ZfpError::Bounds {
                        position: others,
                        requested: bits,
                        capacity,
                    });
                }
                self.compact_except(Some(block))?;
            }
            self.used_bits()
        };

        self.stream.seek(offset);
        self.scratch.rewind();
        self.stream.copy_from(&mut self.scratch, bits)?;
        if let Layout::Variable { slots, end } = &mut self.layout {
            slots[block] = Slot { offset, bits };
            *end = (*end).max(offset + bits);
        }
        Ok(())
    }
}
