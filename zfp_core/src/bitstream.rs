//! Bit-oriented reader/writer over a byte buffer.
//!
//! Bits are packed least-significant first within each byte, so a value
//! written with `write_bits(v, n)` occupies stream positions `p..p + n` with
//! bit 0 of `v` at `p`. The buffer may be owned and growable (`Vec<u8>`) or a
//! fixed-size borrowed slice; writing past the end of a fixed-size buffer
//! fails with [`ZfpError::Bounds`] instead of growing it.

use crate::error::{Result, ZfpError};

/// Byte storage a [`BitStream`] can write into.
pub trait BitStorage: AsRef<[u8]> + AsMut<[u8]> {
    /// Makes the storage hold at least `bits` bits. Returns `false` when the
    /// storage is fixed-size and too short.
    fn reserve_bits(&mut self, bits: usize) -> bool;
}

impl BitStorage for Vec<u8> {
    fn reserve_bits(&mut self, bits: usize) -> bool {
        let bytes = (bits + 7) / 8;
        if self.len() < bytes {
            self.resize(bytes, 0);
        }
        true
    }
}

impl<'a> BitStorage for &'a mut [u8] {
    fn reserve_bits(&mut self, bits: usize) -> bool {
        self.len() * 8 >= bits
    }
}

/// Sequential, randomly seekable bit stream.
#[derive(Debug, Clone)]
pub struct BitStream<B> {
    buf: B,
    /// Current bit offset from the start of `buf`.
    pos: usize,
}

impl<B: AsRef<[u8]>> BitStream<B> {
    /// Wraps `buf`, positioned at its first bit.
    pub fn new(buf: B) -> Self {
        Self { buf, pos: 0 }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Moves to an absolute bit offset. Bounds are checked on the next access.
    #[inline]
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Returns to the first bit without touching the buffer contents.
    #[inline]
    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    /// Number of bits the underlying buffer currently holds.
    #[inline]
    pub fn capacity_bits(&self) -> usize {
        self.buf.as_ref().len() * 8
    }

    /// Bits between the start of the stream and the current position.
    #[inline]
    pub fn size_bits(&self) -> usize {
        self.pos
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_ref()
    }

    pub fn get_ref(&self) -> &B {
        &self.buf
    }

    pub fn into_inner(self) -> B {
        self.buf
    }

    fn check(&self, bits: usize) -> Result<()> {
        let capacity = self.capacity_bits();
        if self.pos.checked_add(bits).map_or(true, |end| end > capacity) {
            return Err(ZfpError::Bounds {
                position: self.pos,
                requested: bits,
                capacity,
            });
        }
        Ok(())
    }

    pub fn read_bit(&mut self) -> Result<bool> {
        self.check(1)?;
        let byte = self.buf.as_ref()[self.pos / 8];
        let bit = (byte >> (self.pos % 8)) & 1 == 1;
        self.pos += 1;
        Ok(bit)
    }

    /// Reads the next `n <= 64` bits; the first bit read lands in bit 0.
    pub fn read_bits(&mut self, n: u32) -> Result<u64> {
        debug_assert!(n <= 64);
        let n = n as usize;
        self.check(n)?;
        let bytes = self.buf.as_ref();
        let mut value = 0u64;
        let mut shift = 0;
        let mut remaining = n;
        while remaining > 0 {
            let offset = self.pos % 8;
            let take = (8 - offset).min(remaining);
            let chunk = (bytes[self.pos / 8] >> offset) as u64 & ((1u64 << take) - 1);
            value |= chunk << shift;
            shift += take;
            remaining -= take;
            self.pos += take;
        }
        Ok(value)
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.check(n)?;
        self.pos += n;
        Ok(())
    }
}

impl<B: BitStorage> BitStream<B> {
    fn reserve(&mut self, bits: usize) -> Result<()> {
        if !self.buf.reserve_bits(self.pos + bits) {
            return Err(ZfpError::Bounds {
                position: self.pos,
                requested: bits,
                capacity: self.capacity_bits(),
            });
        }
        Ok(())
    }

    /// Writes one bit and returns it.
    pub fn write_bit(&mut self, bit: bool) -> Result<bool> {
        self.reserve(1)?;
        let mask = 1u8 << (self.pos % 8);
        let byte = &mut self.buf.as_mut()[self.pos / 8];
        if bit {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
        self.pos += 1;
        Ok(bit)
    }

    /// Writes the low `n <= 64` bits of `value` and returns `value >> n`.
    ///
    /// Previously written bits in the target range are overwritten, so a
    /// block can be re-encoded in place.
    pub fn write_bits(&mut self, value: u64, n: u32) -> Result<u64> {
        debug_assert!(n <= 64);
        let n = n as usize;
        self.reserve(n)?;
        let bytes = self.buf.as_mut();
        let mut v = value;
        let mut remaining = n;
        while remaining > 0 {
            let index = self.pos / 8;
            let offset = self.pos % 8;
            let take = (8 - offset).min(remaining);
            let mask = (((1u16 << take) - 1) as u8) << offset;
            bytes[index] = (bytes[index] & !mask) | (((v as u8) << offset) & mask);
            v >>= take;
            remaining -= take;
            self.pos += take;
        }
        Ok(if n >= 64 { 0 } else { value >> n })
    }

    /// Writes `n` zero bits.
    pub fn pad(&mut self, mut n: usize) -> Result<()> {
        self.reserve(n)?;
        while n > 0 {
            let k = n.min(64);
            self.write_bits(0, k as u32)?;
            n -= k;
        }
        Ok(())
    }

    /// Pads with zeros to the next byte boundary; returns the padding length.
    pub fn flush(&mut self) -> Result<usize> {
        let padding = (8 - self.pos % 8) % 8;
        self.pad(padding)?;
        Ok(padding)
    }

    /// Copies the next `n` bits of `src` to this stream, advancing both.
    pub fn copy_from<C: AsRef<[u8]>>(&mut self, src: &mut BitStream<C>, mut n: usize) -> Result<()> {
        self.reserve(n)?;
        while n > 0 {
            let k = n.min(64) as u32;
            let bits = src.read_bits(k)?;
            self.write_bits(bits, k)?;
            n -= k as usize;
        }
        Ok(())
    }

    pub fn get_mut(&mut self) -> &mut B {
        &mut self.buf
    }
}

impl BitStream<Vec<u8>> {
    /// Creates an empty growable stream with `bytes` bytes preallocated.
    pub fn with_capacity(bytes: usize) -> Self {
        Self::new(Vec::with_capacity(bytes))
    }
}

impl Default for BitStream<Vec<u8>> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
