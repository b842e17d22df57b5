//! Decorrelating block transform, coefficient ordering, and negabinary
//! conversion.

use crate::shape::block_len;

/// Forward lifting step on the four values `p[start + i * stride]`.
///
/// Non-orthogonal transform:
/// ```text
///        ( 4  4  4  4) (x)
/// 1/16 * ( 5  1 -1 -5) (y)
///        (-4  4  4 -4) (z)
///        (-2  6 -6  2) (w)
/// ```
#[inline]
fn forward_lift(p: &mut [i64], start: usize, stride: usize) {
    let (mut x, mut y, mut z, mut w) = (
        p[start],
        p[start + stride],
        p[start + 2 * stride],
        p[start + 3 * stride],
    );
    x = x.wrapping_add(w);
    x >>= 1;
    w = w.wrapping_sub(x);
    z = z.wrapping_add(y);
    z >>= 1;
    y = y.wrapping_sub(z);
    x = x.wrapping_add(z);
    x >>= 1;
    z = z.wrapping_sub(x);
    w = w.wrapping_add(y);
    w >>= 1;
    y = y.wrapping_sub(w);
    w = w.wrapping_add(y >> 1);
    y = y.wrapping_sub(w >> 1);
    p[start] = x;
    p[start + stride] = y;
    p[start + 2 * stride] = z;
    p[start + 3 * stride] = w;
}

/// Inverse of [`forward_lift`], up to the low bits dropped by its shifts.
#[inline]
fn inverse_lift(p: &mut [i64], start: usize, stride: usize) {
    let (mut x, mut y, mut z, mut w) = (
        p[start],
        p[start + stride],
        p[start + 2 * stride],
        p[start + 3 * stride],
    );
    y = y.wrapping_add(w >> 1);
    w = w.wrapping_sub(y >> 1);
    y = y.wrapping_add(w);
    w <<= 1;
    w = w.wrapping_sub(y);
    z = z.wrapping_add(x);
    x <<= 1;
    x = x.wrapping_sub(z);
    y = y.wrapping_add(z);
    z <<= 1;
    z = z.wrapping_sub(y);
    w = w.wrapping_add(x);
    x <<= 1;
    x = x.wrapping_sub(w);
    p[start] = x;
    p[start + stride] = y;
    p[start + 2 * stride] = z;
    p[start + 3 * stride] = w;
}

#[inline]
fn coord(index: usize, axis: usize) -> usize {
    (index >> (2 * axis)) & 3
}

/// Calls `f(start, stride)` for every line of the block running along `axis`.
fn for_each_line(dims: usize, axis: usize, mut f: impl FnMut(usize, usize)) {
    let stride = 1 << (2 * axis);
    for start in 0..block_len(dims) {
        if coord(start, axis) == 0 {
            f(start, stride);
        }
    }
}

/// Applies the lifting transform along x, then y, then z.
pub(crate) fn forward_transform(block: &mut [i64], dims: usize) {
    for axis in 0..dims {
        for_each_line(dims, axis, |start, stride| forward_lift(block, start, stride));
    }
}

/// Undoes [`forward_transform`], visiting the axes in reverse order.
pub(crate) fn inverse_transform(block: &mut [i64], dims: usize) {
    for axis in (0..dims).rev() {
        for_each_line(dims, axis, |start, stride| inverse_lift(block, start, stride));
    }
}

/// Orders coefficients by total sequency so that low-frequency coefficients,
/// which tend to be largest, are coded first.
const fn precedes(a: usize, b: usize) -> bool {
    let (ax, ay, az) = (a & 3, (a >> 2) & 3, (a >> 4) & 3);
    let (bx, by, bz) = (b & 3, (b >> 2) & 3, (b >> 4) & 3);
    let (da, db) = (ax + ay + az, bx + by + bz);
    if da != db {
        return da < db;
    }
    let (sa, sb) = (ax * ax + ay * ay + az * az, bx * bx + by * by + bz * bz);
    if sa != sb {
        return sa < sb;
    }
    if ax != bx {
        return ax > bx;
    }
    ay > by
}

const fn sequency_order<const N: usize>() -> [usize; N] {
    let mut perm = [0usize; N];
    let mut i = 0;
    while i < N {
        perm[i] = i;
        i += 1;
    }
    let mut a = 1;
    while a < N {
        let mut b = a;
        while b > 0 && precedes(perm[b], perm[b - 1]) {
            let t = perm[b];
            perm[b] = perm[b - 1];
            perm[b - 1] = t;
            b -= 1;
        }
        a += 1;
    }
    perm
}

const PERM_1: [usize; 4] = sequency_order::<4>();
const PERM_2: [usize; 16] = sequency_order::<16>();
const PERM_3: [usize; 64] = sequency_order::<64>();

/// Coefficient coding order for a block of `dims` dimensions.
pub(crate) fn permutation(dims: usize) -> &'static [usize] {
    match dims {
        1 => &PERM_1,
        2 => &PERM_2,
        _ => &PERM_3,
    }
}

const NBMASK_32: u32 = 0xaaaa_aaaa;
const NBMASK_64: u64 = 0xaaaa_aaaa_aaaa_aaaa;

/// Two's complement to negabinary in `intprec` bits.
#[inline]
pub(crate) fn to_negabinary(x: i64, intprec: u32) -> u64 {
    if intprec == 32 {
        ((x as u32).wrapping_add(NBMASK_32) ^ NBMASK_32) as u64
    } else {
        (x as u64).wrapping_add(NBMASK_64) ^ NBMASK_64
    }
}

#[inline]
pub(crate) fn from_negabinary(u: u64, intprec: u32) -> i64 {
    if intprec == 32 {
        ((u as u32 ^ NBMASK_32).wrapping_sub(NBMASK_32)) as i32 as i64
    } else {
        (u ^ NBMASK_64).wrapping_sub(NBMASK_64) as i64
    }
}
