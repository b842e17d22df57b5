//! Whole-field compression.
//!
//! # Stream layout
//! ```text
//! [STREAM HEADER: 96 or 148 bits]
//! [BLOCK 0] [BLOCK 1] ... [BLOCK N-1]   ← raster block order, x fastest
//! [0..7 zero bits]                      ← flush to a byte boundary
//! ```
//!
//! In fixed-rate mode every block has the same width, so block `i` starts at
//! bit `header + i * block_bits` and can be decoded without touching any
//! other block (see [`decompress_block`]).

use log::debug;

use crate::bitstream::BitStream;
use crate::codec::{Codec, MAX_BLOCK_LEN};
use crate::error::{Result, ZfpError};
use crate::format::StreamHeader;
use crate::mode::Mode;
use crate::scalar::Scalar;
use crate::shape::{Shape, BLOCK_SIDE, MAX_DIMS};

/// Visits every in-range value of block `index`, passing its offset within
/// the block and its position in the dense field. Returns the block extent.
fn for_each_in_block(shape: &Shape, index: usize, mut f: impl FnMut(usize, usize)) -> [usize; MAX_DIMS] {
    let dims = shape.dims();
    let coords = shape.block_coords(index);
    let extent = shape.block_extent(index);
    let mut at = [0usize; MAX_DIMS];
    'values: for offset in 0..shape.block_len() {
        for axis in 0..dims {
            let local = (offset >> (2 * axis)) & 3;
            if local >= extent[axis] {
                continue 'values;
            }
            at[axis] = coords[axis] * BLOCK_SIDE + local;
        }
        f(offset, shape.linear(&at[..dims]));
    }
    extent
}

/// Copies block `index` out of a dense x-fastest field.
///
/// Only the in-range part of `block` is written; the returned extent tells
/// how much of it that is.
pub fn gather_block<T: Copy>(data: &[T], shape: &Shape, index: usize, block: &mut [T]) -> [usize; MAX_DIMS] {
    for_each_in_block(shape, index, |offset, pos| block[offset] = data[pos])
}

/// Inverse of [`gather_block`]: stores the in-range values of `block`.
pub fn scatter_block<T: Copy>(block: &[T], shape: &Shape, index: usize, data: &mut [T]) {
    for_each_in_block(shape, index, |offset, pos| data[pos] = block[offset]);
}

#[inline]
fn is_complete(extent: &[usize; MAX_DIMS], dims: usize) -> bool {
    extent[..dims].iter().all(|&n| n == BLOCK_SIDE)
}

fn check_len(len: usize, shape: &Shape) -> Result<()> {
    if len != shape.len() {
        return Err(ZfpError::InvalidShape(format!(
            "{} values do not fill shape {:?}",
            len,
            shape.extents()
        )));
    }
    Ok(())
}

/// Compresses a dense field (x varying fastest) into a self-describing
/// byte stream.
pub fn compress<T: Scalar>(data: &[T], shape: &Shape, mode: Mode) -> Result<Vec<u8>> {
    check_len(data.len(), shape)?;
    let codec = Codec::new(mode, T::TYPE, shape.dims())?;
    let header = StreamHeader::new(T::TYPE, *shape, mode);
    let n = codec.block_len();

    let mut stream = BitStream::with_capacity(data.len() * T::TYPE.size_bytes() / 2);
    header.write(&mut stream)?;
    let mut block = [T::default(); MAX_BLOCK_LEN];
    for index in 0..shape.block_count() {
        let extent = gather_block(data, shape, index, &mut block[..n]);
        if is_complete(&extent, shape.dims()) {
            codec.encode_block(&mut stream, &block[..n])?;
        } else {
            codec.encode_partial(&mut stream, &block[..n], &extent)?;
        }
    }
    stream.flush()?;

    let bytes = stream.into_inner();
    debug!(
        "compressed {} {} values into {} bytes ({:?})",
        data.len(),
        T::TYPE,
        bytes.len(),
        mode
    );
    Ok(bytes)
}

/// Decompresses a stream produced by [`compress`].
pub fn decompress<T: Scalar>(bytes: &[u8]) -> Result<(StreamHeader, Vec<T>)> {
    let mut stream = BitStream::new(bytes);
    let header = read_header::<T, _>(&mut stream)?;
    let codec = Codec::new(header.mode, header.scalar, header.shape.dims())?;
    let n = codec.block_len();

    let mut data = vec![T::default(); header.shape.len()];
    let mut block = [T::default(); MAX_BLOCK_LEN];
    for index in 0..header.shape.block_count() {
        codec.decode_block(&mut stream, &mut block[..n])?;
        scatter_block(&block[..n], &header.shape, index, &mut data);
    }
    Ok((header, data))
}

/// Decodes the single block `index` of a compressed stream.
///
/// Fixed-rate streams seek straight to the block; other modes have to
/// decode the blocks in front of it.
pub fn decompress_block<T: Scalar>(bytes: &[u8], index: usize) -> Result<Vec<T>> {
    let mut stream = BitStream::new(bytes);
    let header = read_header::<T, _>(&mut stream)?;
    let count = header.shape.block_count();
    if index >= count {
        return Err(ZfpError::IndexOutOfBounds {
            index: vec![index],
            shape: vec![count],
        });
    }
    let codec = Codec::new(header.mode, header.scalar, header.shape.dims())?;
    let mut block = vec![T::default(); codec.block_len()];
    match header.mode.block_bits() {
        Some(bits) => {
            let start = stream.position() + index * bits as usize;
            stream.seek(start);
        }
        None => {
            for _ in 0..index {
                codec.decode_block(&mut stream, &mut block)?;
            }
        }
    }
    codec.decode_block(&mut stream, &mut block)?;
    Ok(block)
}

fn read_header<T: Scalar, B: AsRef<[u8]>>(stream: &mut BitStream<B>) -> Result<StreamHeader> {
    let header = StreamHeader::read(stream)?;
    if header.scalar != T::TYPE {
        return Err(ZfpError::ScalarTypeMismatch {
            expected: T::TYPE,
            found: header.scalar,
        });
    }
    if header.shape.dims() > 3 {
        return Err(ZfpError::UnsupportedDimensionality);
    }
    Ok(header)
}
