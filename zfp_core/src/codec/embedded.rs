//! Embedded bit-plane coder.
//!
//! Coefficients are emitted one bit plane at a time, most significant plane
//! first. Within a plane, the bits of coefficients already known to be
//! significant are written verbatim; the remainder is group tested: a 1 bit
//! announces that some further coefficient becomes significant, followed by
//! a unary run to locate it. Coding stops as soon as the bit budget or the
//! precision is exhausted, so any prefix of the output decodes to a valid
//! approximation.

use crate::bitstream::{BitStorage, BitStream};
use crate::error::Result;

/// Encodes `data` (negabinary, `intprec` bits each) with at most `maxbits`
/// bits and `maxprec` bit planes. Returns the number of bits written.
pub(crate) fn encode_ints<B: BitStorage>(
    stream: &mut BitStream<B>,
    maxbits: u32,
    maxprec: u32,
    data: &[u64],
    intprec: u32,
) -> Result<u32> {
    let size = data.len();
    debug_assert!(size <= 64);
    let kmin = intprec.saturating_sub(maxprec);
    let mut bits = maxbits;
    let mut n = 0usize;
    let mut k = intprec;

    while bits > 0 && k > kmin {
        k -= 1;
        // gather bit plane k
        let mut x = 0u64;
        for (i, &v) in data.iter().enumerate() {
            x += ((v >> k) & 1) << i;
        }
        // bits of coefficients already significant
        let m = (n as u32).min(bits);
        bits -= m;
        x = stream.write_bits(x, m)?;
        // group test the rest
        while n < size && bits > 0 {
            bits -= 1;
            if !stream.write_bit(x != 0)? {
                break;
            }
            while n < size - 1 && bits > 0 {
                bits -= 1;
                if stream.write_bit(x & 1 != 0)? {
                    break;
                }
                x >>= 1;
                n += 1;
            }
            x >>= 1;
            n += 1;
        }
    }

    Ok(maxbits - bits)
}

/// Inverse of [`encode_ints`]; fills `data` and returns the bits consumed.
pub(crate) fn decode_ints<B: AsRef<[u8]>>(
    stream: &mut BitStream<B>,
    maxbits: u32,
    maxprec: u32,
    data: &mut [u64],
    intprec: u32,
) -> Result<u32> {
    let size = data.len();
    debug_assert!(size <= 64);
    data.fill(0);
    let kmin = intprec.saturating_sub(maxprec);
    let mut bits = maxbits;
    let mut n = 0usize;
    let mut k = intprec;

    while bits > 0 && k > kmin {
        k -= 1;
        let m = (n as u32).min(bits);
        bits -= m;
        let mut x = stream.read_bits(m)?;
        while n < size && bits > 0 {
            bits -= 1;
            if !stream.read_bit()? {
                break;
            }
            while n < size - 1 && bits > 0 {
                bits -= 1;
                if stream.read_bit()? {
                    break;
                }
                n += 1;
            }
            x += 1u64 << n;
            n += 1;
        }
        // deposit bit plane k
        let mut i = 0;
        while x != 0 {
            data[i] |= (x & 1) << k;
            x >>= 1;
            i += 1;
        }
    }

    Ok(maxbits - bits)
}
