//! Block codec: compresses one `4^d` block of scalars at a time.
//!
//! Each block is coded independently of every other block, which is the
//! property random access into a compressed field relies on.
//!
//! Floating-point blocks are first converted to a block-floating-point
//! representation: the largest magnitude fixes a common exponent `emax`, and
//! every value becomes a signed integer scaled by `2^(p - 2 - emax)`. Integer
//! blocks skip this step; their values must lie in `[-2^(p-2), 2^(p-2))`.
//! The integers then pass through the decorrelating transform, are reordered
//! by sequency, converted to negabinary, and handed to the embedded coder.

mod embedded;
mod transform;

use crate::bitstream::{BitStorage, BitStream};
use crate::error::{Result, ZfpError};
use crate::mode::{Mode, Params};
use crate::scalar::{frexp_exponent, ldexp, Scalar, ScalarType};
use crate::shape::{block_len, BLOCK_SIDE, MAX_DIMS};

use embedded::{decode_ints, encode_ints};
use transform::{forward_transform, from_negabinary, inverse_transform, permutation, to_negabinary};

/// Largest block the codec handles (3D).
pub const MAX_BLOCK_LEN: usize = 64;

/// Encoder/decoder for blocks of one scalar type and dimensionality under
/// one budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codec {
    params: Params,
    scalar: ScalarType,
    dims: usize,
}

/// Number of bit planes to code for a block with common exponent `emax`.
#[inline]
fn precision(emax: i32, maxprec: u32, minexp: i32, dims: usize) -> u32 {
    let planes = (emax as i64 - minexp as i64 + 2 * (dims as i64 + 1)).max(0);
    (maxprec as i64).min(planes) as u32
}

impl Codec {
    /// Fails when `mode` cannot hold a block header of `scalar`, so that a
    /// fixed-rate block never spills into its neighbour.
    pub fn new(mode: Mode, scalar: ScalarType, dims: usize) -> Result<Self> {
        if !(1..=3).contains(&dims) {
            return Err(ZfpError::UnsupportedDimensionality);
        }
        mode.check_budget(scalar)?;
        Ok(Self {
            params: mode.params(),
            scalar,
            dims,
        })
    }

    #[inline]
    pub fn scalar_type(&self) -> ScalarType {
        self.scalar
    }

    fn check_type<T: Scalar>(&self) -> Result<()> {
        if T::TYPE != self.scalar {
            return Err(ZfpError::ScalarTypeMismatch {
                expected: self.scalar,
                found: T::TYPE,
            });
        }
        Ok(())
    }

    #[inline]
    pub fn params(&self) -> Params {
        self.params
    }

    #[inline]
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Values per block.
    #[inline]
    pub fn block_len(&self) -> usize {
        block_len(self.dims)
    }

    /// Encodes one full block at the stream's position.
    ///
    /// Returns the number of bits written, which lies between `minbits` and
    /// `maxbits` (exactly `maxbits` in fixed-rate mode).
    pub fn encode_block<T: Scalar, B: BitStorage>(
        &self,
        stream: &mut BitStream<B>,
        block: &[T],
    ) -> Result<usize> {
        debug_assert_eq!(block.len(), self.block_len());
        self.check_type::<T>()?;
        let bits = match T::TYPE.exponent_bits() {
            Some(ebits) => self.encode_float_block(stream, block, ebits)?,
            None => {
                let mut iblock = [0i64; MAX_BLOCK_LEN];
                for (dst, v) in iblock.iter_mut().zip(block) {
                    *dst = v.to_i64();
                }
                let p = self.params;
                self.encode_int_block::<T, B>(stream, p.minbits, p.maxbits, p.maxprec, &mut iblock)?
            }
        };
        Ok(bits as usize)
    }

    /// Encodes a block of which only the leading `extent[axis]` values along
    /// each axis are meaningful; the rest are padded from the edge values.
    pub fn encode_partial<T: Scalar, B: BitStorage>(
        &self,
        stream: &mut BitStream<B>,
        block: &[T],
        extent: &[usize; MAX_DIMS],
    ) -> Result<usize> {
        let n = self.block_len();
        let mut padded = [T::default(); MAX_BLOCK_LEN];
        padded[..n].copy_from_slice(&block[..n]);
        pad_partial(&mut padded[..n], self.dims, extent);
        self.encode_block(stream, &padded[..n])
    }

    /// Decodes one block at the stream's position into `block`; returns the
    /// bits consumed. Never reads beyond `maxbits` bits.
    pub fn decode_block<T: Scalar, B: AsRef<[u8]>>(
        &self,
        stream: &mut BitStream<B>,
        block: &mut [T],
    ) -> Result<usize> {
        debug_assert_eq!(block.len(), self.block_len());
        self.check_type::<T>()?;
        let bits = match T::TYPE.exponent_bits() {
            Some(ebits) => self.decode_float_block(stream, block, ebits)?,
            None => {
                let mut iblock = [0i64; MAX_BLOCK_LEN];
                let p = self.params;
                let bits = self.decode_int_block::<T, B>(stream, p.minbits, p.maxbits, p.maxprec, &mut iblock)?;
                for (dst, &v) in block.iter_mut().zip(iblock.iter()) {
                    *dst = T::from_i64(v);
                }
                bits
            }
        };
        Ok(bits as usize)
    }

    fn encode_float_block<T: Scalar, B: BitStorage>(
        &self,
        stream: &mut BitStream<B>,
        block: &[T],
        ebits: u32,
    ) -> Result<u32> {
        let p = self.params;
        let ebias = T::TYPE.exponent_bias();
        let intprec = T::TYPE.precision_bits();
        let mut bits = 1;

        let max = block.iter().map(|v| v.to_f64().abs()).fold(0.0, f64::max);
        let emax = if max > 0.0 {
            frexp_exponent(max).clamp(1 - ebias, ebias + 1)
        } else {
            -ebias
        };
        let maxprec = precision(emax, p.maxprec, p.minexp, self.dims);
        let e = if maxprec > 0 { (emax + ebias) as u64 } else { 0 };

        if e > 0 {
            // exponent with a leading 1 flag
            bits += ebits;
            stream.write_bits(2 * e + 1, bits)?;
            let scale = intprec as i32 - 2 - emax;
            let mut iblock = [0i64; MAX_BLOCK_LEN];
            for (dst, v) in iblock.iter_mut().zip(block) {
                *dst = ldexp(v.to_f64(), scale) as i64;
            }
            bits += self.encode_int_block::<T, B>(
                stream,
                p.minbits.saturating_sub(bits),
                p.maxbits.saturating_sub(bits),
                maxprec,
                &mut iblock,
            )?;
        } else {
            // a single 0 bit marks a block with no significant values
            stream.write_bit(false)?;
            if p.minbits > bits {
                stream.pad((p.minbits - bits) as usize)?;
                bits = p.minbits;
            }
        }
        Ok(bits)
    }

    fn decode_float_block<T: Scalar, B: AsRef<[u8]>>(
        &self,
        stream: &mut BitStream<B>,
        block: &mut [T],
        ebits: u32,
    ) -> Result<u32> {
        let p = self.params;
        let ebias = T::TYPE.exponent_bias();
        let intprec = T::TYPE.precision_bits();
        let mut bits = 1;

        if stream.read_bit()? {
            bits += ebits;
            let emax = stream.read_bits(ebits)? as i32 - ebias;
            let maxprec = precision(emax, p.maxprec, p.minexp, self.dims);
            let mut iblock = [0i64; MAX_BLOCK_LEN];
            bits += self.decode_int_block::<T, B>(
                stream,
                p.minbits.saturating_sub(bits),
                p.maxbits.saturating_sub(bits),
                maxprec,
                &mut iblock,
            )?;
            let scale = emax - (intprec as i32 - 2);
            for (dst, &v) in block.iter_mut().zip(iblock.iter()) {
                *dst = T::from_f64(ldexp(v as f64, scale));
            }
        } else {
            block.fill(T::default());
            if p.minbits > bits {
                stream.skip((p.minbits - bits) as usize)?;
                bits = p.minbits;
            }
        }
        Ok(bits)
    }

    fn encode_int_block<T: Scalar, B: BitStorage>(
        &self,
        stream: &mut BitStream<B>,
        minbits: u32,
        maxbits: u32,
        maxprec: u32,
        iblock: &mut [i64; MAX_BLOCK_LEN],
    ) -> Result<u32> {
        let n = self.block_len();
        let intprec = T::TYPE.precision_bits();
        forward_transform(&mut iblock[..n], self.dims);
        let mut ublock = [0u64; MAX_BLOCK_LEN];
        for (u, &i) in ublock.iter_mut().zip(permutation(self.dims)) {
            *u = to_negabinary(iblock[i], intprec);
        }
        let mut bits = encode_ints(stream, maxbits, maxprec, &ublock[..n], intprec)?;
        if bits < minbits {
            stream.pad((minbits - bits) as usize)?;
            bits = minbits;
        }
        Ok(bits)
    }

    fn decode_int_block<T: Scalar, B: AsRef<[u8]>>(
        &self,
        stream: &mut BitStream<B>,
        minbits: u32,
        maxbits: u32,
        maxprec: u32,
        iblock: &mut [i64; MAX_BLOCK_LEN],
    ) -> Result<u32> {
        let n = self.block_len();
        let intprec = T::TYPE.precision_bits();
        let mut ublock = [0u64; MAX_BLOCK_LEN];
        let mut bits = decode_ints(stream, maxbits, maxprec, &mut ublock[..n], intprec)?;
        if bits < minbits {
            stream.skip((minbits - bits) as usize)?;
            bits = minbits;
        }
        for (&u, &i) in ublock.iter().zip(permutation(self.dims)) {
            iblock[i] = from_negabinary(u, intprec);
        }
        inverse_transform(&mut iblock[..n], self.dims);
        Ok(bits)
    }
}

/// Fills the out-of-range part of a partial block by replicating edge
/// values along x, then y, then z.
pub fn pad_partial<T: Copy>(block: &mut [T], dims: usize, extent: &[usize; MAX_DIMS]) {
    for axis in 0..dims {
        let n = extent[axis];
        if n >= BLOCK_SIDE {
            continue;
        }
        let stride = 1 << (2 * axis);
        for start in 0..block_len(dims) {
            let coord = |a: usize| (start >> (2 * a)) & 3;
            if coord(axis) != 0 || (axis + 1..dims).any(|a| coord(a) >= extent[a]) {
                continue;
            }
            let at = |i: usize| start + i * stride;
            match n {
                1 => {
                    block[at(1)] = block[at(0)];
                    block[at(2)] = block[at(1)];
                    block[at(3)] = block[at(0)];
                }
                2 => {
                    block[at(2)] = block[at(1)];
                    block[at(3)] = block[at(0)];
                }
                3 => {
                    block[at(3)] = block[at(0)];
                }
                _ => {}
            }
        }
    }
}
