//! zfp header format.
//!
//! ```text
//! bits  0..32   magic "zfp" + codec version byte
//! bits 32..84   field metadata (52 bits, least significant first):
//!                 scalar type - 1      2 bits
//!                 dimensionality - 1   2 bits
//!                 extents - 1          48 bits: 1x48, 2x24, 3x16 or 4x12,
//!                                      x in the lowest bits
//! bits 84..96   mode, 12-bit short code
//! bits 96..148  rest of a long mode code (only when the short code is 0xfff)
//! ```
//!
//! A [`StreamHeader`] can describe any of this. An array [`Header`] is the
//! short 96-bit form restricted to floating-point 1D–3D fields.

use crate::bitstream::{BitStorage, BitStream};
use crate::error::{Result, ZfpError};
use crate::mode::{Mode, LONG_MODE_BITS, SHORT_MODE_BITS, SHORT_MODE_MAX};
use crate::scalar::ScalarType;
use crate::shape::{Shape, MAX_DIMS};

/// Magic bytes at the start of every header.
pub const MAGIC: &[u8; 3] = b"zfp";

/// Version of the block codec that produced the stream.
pub const CODEC_VERSION: u8 = 5;

pub const MAGIC_BITS: u32 = 32;
pub const META_BITS: u32 = 52;

/// Width of a header carrying a short mode code.
pub const HEADER_BITS: usize = (MAGIC_BITS + META_BITS + SHORT_MODE_BITS) as usize;
pub const HEADER_BYTES: usize = HEADER_BITS / 8;

/// Width of a header carrying a long mode code.
pub const LONG_HEADER_BITS: usize = (MAGIC_BITS + META_BITS + LONG_MODE_BITS) as usize;

const EXTENT_BITS: u32 = 48;

fn magic_word() -> u64 {
    u64::from_le_bytes([MAGIC[0], MAGIC[1], MAGIC[2], CODEC_VERSION, 0, 0, 0, 0])
}

/// Packs scalar type, dimensionality and extents into the metadata word.
fn encode_meta(scalar: ScalarType, shape: &Shape) -> Result<u64> {
    let dims = shape.dims();
    let width = EXTENT_BITS / dims as u32;
    let mut meta = 0u64;
    for axis in (0..dims).rev() {
        let n = shape.extent(axis) as u64 - 1;
        if n >> width != 0 {
            return Err(ZfpError::HeaderTooLong);
        }
        meta = (meta << width) + n;
    }
    meta = (meta << 2) + (dims as u64 - 1);
    meta = (meta << 2) + scalar.header_bits();
    Ok(meta)
}

#[inline]
fn meta_scalar(meta: u64) -> ScalarType {
    ScalarType::from_header_bits(meta)
}

#[inline]
fn meta_dims(meta: u64) -> usize {
    ((meta >> 2) & 0x3) as usize + 1
}

fn meta_shape(meta: u64) -> Result<Shape> {
    let dims = meta_dims(meta);
    let width = EXTENT_BITS / dims as u32;
    let mask = (1u64 << width) - 1;
    let mut rest = meta >> 4;
    let mut extents = [0usize; MAX_DIMS];
    for extent in extents.iter_mut().take(dims) {
        *extent = (rest & mask) as usize + 1;
        rest >>= width;
    }
    Shape::new(&extents[..dims])
}

fn check_magic<B: AsRef<[u8]>>(stream: &mut BitStream<B>) -> Result<()> {
    if stream.read_bits(MAGIC_BITS)? != magic_word() {
        return Err(ZfpError::CorruptHeader);
    }
    Ok(())
}

/// Full header of a compressed stream: any scalar type, 1–4 dimensions,
/// short or long mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    pub scalar: ScalarType,
    pub shape: Shape,
    pub mode: Mode,
}

impl StreamHeader {
    pub fn new(scalar: ScalarType, shape: Shape, mode: Mode) -> Self {
        Self { scalar, shape, mode }
    }

    /// Encoded width in bits.
    pub fn bits(&self) -> usize {
        if self.mode.short_code().is_some() {
            HEADER_BITS
        } else {
            LONG_HEADER_BITS
        }
    }

    /// Writes the header at the stream's position; returns the bits written.
    pub fn write<B: BitStorage>(&self, stream: &mut BitStream<B>) -> Result<usize> {
        let meta = encode_meta(self.scalar, &self.shape)?;
        let code = self.mode.code();
        stream.write_bits(magic_word(), MAGIC_BITS)?;
        stream.write_bits(meta, META_BITS)?;
        let rest = stream.write_bits(code, SHORT_MODE_BITS)?;
        if code > SHORT_MODE_MAX {
            stream.write_bits(rest, LONG_MODE_BITS - SHORT_MODE_BITS)?;
        }
        Ok(self.bits())
    }

    pub fn read<B: AsRef<[u8]>>(stream: &mut BitStream<B>) -> Result<Self> {
        check_magic(stream)?;
        let meta = stream.read_bits(META_BITS)?;
        let mut code = stream.read_bits(SHORT_MODE_BITS)?;
        if code > SHORT_MODE_MAX {
            code += stream.read_bits(LONG_MODE_BITS - SHORT_MODE_BITS)? << SHORT_MODE_BITS;
        }
        Ok(Self {
            scalar: meta_scalar(meta),
            shape: meta_shape(meta)?,
            mode: Mode::from_code(code)?,
        })
    }
}

/// Short header describing a compressed array.
///
/// Construction validates everything the 96-bit layout cannot hold, so a
/// `Header` always encodes to exactly [`HEADER_BYTES`] bytes and decodes
/// back to an equal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    scalar: ScalarType,
    shape: Shape,
    mode: Mode,
    meta: u64,
    code: u64,
}

impl Header {
    pub fn new(scalar: ScalarType, shape: Shape, mode: Mode) -> Result<Self> {
        if !scalar.is_float() {
            return Err(ZfpError::UnsupportedScalarType);
        }
        if shape.dims() > 3 {
            return Err(ZfpError::HeaderTooLong);
        }
        let code = mode.short_code().ok_or(ZfpError::HeaderTooLong)?;
        mode.check_budget(scalar)?;
        let meta = encode_meta(scalar, &shape)?;
        Ok(Self {
            scalar,
            shape,
            mode,
            meta,
            code,
        })
    }

    /// Parses the first [`HEADER_BYTES`] bytes of `bytes`.
    ///
    /// Scalar type and dimensionality are checked before the extents and
    /// mode are interpreted.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut stream = BitStream::new(bytes);
        check_magic(&mut stream)?;
        let meta = stream.read_bits(META_BITS)?;
        let scalar = meta_scalar(meta);
        if !scalar.is_float() {
            return Err(ZfpError::UnsupportedScalarType);
        }
        if meta_dims(meta) > 3 {
            return Err(ZfpError::UnsupportedDimensionality);
        }
        let code = stream.read_bits(SHORT_MODE_BITS)?;
        if code > SHORT_MODE_MAX {
            return Err(ZfpError::HeaderTooLong);
        }
        let mode = Mode::from_code(code)?;
        mode.check_budget(scalar)?;
        let shape = meta_shape(meta)?;
        Ok(Self {
            scalar,
            shape,
            mode,
            meta,
            code,
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_BYTES] {
        let word = magic_word() as u128
            | (self.meta as u128) << MAGIC_BITS
            | (self.code as u128) << (MAGIC_BITS + META_BITS);
        let mut buf = [0u8; HEADER_BYTES];
        buf.copy_from_slice(&word.to_le_bytes()[..HEADER_BYTES]);
        buf
    }

    /// Writes the header into a bit stream, e.g. ahead of field data.
    pub fn write<B: BitStorage>(&self, stream: &mut BitStream<B>) -> Result<usize> {
        StreamHeader::from(*self).write(stream)
    }

    #[inline]
    pub fn scalar_type(&self) -> ScalarType {
        self.scalar
    }

    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    #[inline]
    pub fn dims(&self) -> usize {
        self.shape.dims()
    }

    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Bits per value for fixed-rate headers.
    pub fn rate(&self) -> Option<f64> {
        self.mode.rate(self.dims())
    }
}

impl From<Header> for StreamHeader {
    fn from(h: Header) -> Self {
        StreamHeader::new(h.scalar, h.shape, h.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_bytes_match_stream_layout() {
        let shape = Shape::new(&[12, 34, 5]).unwrap();
        let header = Header::new(ScalarType::Double, shape, Mode::FixedRate { block_bits: 1024 }).unwrap();

        let mut stream = BitStream::default();
        assert_eq!(header.write(&mut stream).unwrap(), HEADER_BITS);
        assert_eq!(stream.as_bytes(), &header.to_bytes()[..]);
        assert_eq!(&stream.as_bytes()[..3], b"zfp");
    }

    #[test]
    fn test_stream_header_long_mode_roundtrip() {
        let shape = Shape::new(&[7, 7, 7, 7]).unwrap();
        let header = StreamHeader::new(ScalarType::Int64, shape, Mode::FixedRate { block_bits: 4096 });
        let mut stream = BitStream::default();
        assert_eq!(header.write(&mut stream).unwrap(), LONG_HEADER_BITS);
        assert_eq!(stream.position(), LONG_HEADER_BITS);
        stream.rewind();
        assert_eq!(StreamHeader::read(&mut stream).unwrap(), header);
    }

    #[test]
    fn test_extent_field_width() {
        let fits = Shape::new(&[1 << 16, 1 << 16, 1 << 16]).unwrap();
        assert!(Header::new(ScalarType::Float, fits, Mode::fixed_precision(8)).is_ok());
        let wide = Shape::new(&[(1 << 16) + 1, 4, 4]).unwrap();
        assert_eq!(
            Header::new(ScalarType::Float, wide, Mode::fixed_precision(8)),
            Err(ZfpError::HeaderTooLong)
        );
    }

    #[test]
    fn test_fixed_rate_below_exponent_width_rejected() {
        let shape = Shape::new(&[8]).unwrap();
        let tight = Mode::FixedRate { block_bits: 8 };
        assert_eq!(
            Header::new(ScalarType::Double, shape, tight),
            Err(ZfpError::BlockBudgetTooSmall { bits: 8, required: 12 })
        );

        // the same code read off the wire fails before any data is touched
        let mut stream = BitStream::default();
        StreamHeader::new(ScalarType::Double, shape, tight)
            .write(&mut stream)
            .unwrap();
        assert_eq!(
            Header::from_bytes(stream.as_bytes()),
            Err(ZfpError::BlockBudgetTooSmall { bits: 8, required: 12 })
        );
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = Header::new(ScalarType::Float, Shape::new(&[8]).unwrap(), Mode::fixed_precision(8))
            .unwrap()
            .to_bytes();
        bytes[0] = b'Z';
        assert_eq!(Header::from_bytes(&bytes), Err(ZfpError::CorruptHeader));
    }
}
