//! Element references and block-order traversal.
//!
//! Traversals visit blocks in raster order and, inside a block, values with
//! x varying fastest. Each block is therefore decoded once per pass, however
//! small the cache. Positions of partial edge blocks that fall outside the
//! array are skipped.
//!
//! - [`Iter`] yields `([i, j, k], value)` pairs.
//! - [`Cursor`] hands out one mutable [`Ref`] at a time.
//! - [`Ref`] is a proxy for a single element; writes through it mark the
//!   owning block dirty like [`CompressedArray::set_at`] does.

use zfp_core::shape::{BLOCK_SIDE, MAX_DIMS};
use zfp_core::{Result, Shape};

use crate::array::{ArrayScalar, CompressedArray};

/// Array positions in block order, as `(block, offset in block, index)`.
#[derive(Debug, Clone)]
pub(crate) struct BlockOrder<const D: usize> {
    shape: Shape,
    block: usize,
    offset: usize,
    origin: [usize; MAX_DIMS],
    extent: [usize; MAX_DIMS],
    remaining: usize,
}

impl<const D: usize> BlockOrder<D> {
    pub(crate) fn new(shape: Shape) -> Self {
        let mut order = Self {
            shape,
            block: 0,
            offset: 0,
            origin: [0; MAX_DIMS],
            extent: [0; MAX_DIMS],
            remaining: shape.len(),
        };
        order.enter(0);
        order
    }

    fn enter(&mut self, block: usize) {
        let coords = self.shape.block_coords(block);
        for (origin, c) in self.origin.iter_mut().zip(coords) {
            *origin = c * BLOCK_SIDE;
        }
        self.extent = self.shape.block_extent(block);
        self.block = block;
        self.offset = 0;
    }
}

impl<const D: usize> Iterator for BlockOrder<D> {
    type Item = (usize, usize, [usize; D]);

    fn next(&mut self) -> Option<Self::Item> {
        while self.remaining > 0 {
            if self.offset == self.shape.block_len() {
                self.enter(self.block + 1);
            }
            let offset = self.offset;
            self.offset += 1;

            let mut index = [0usize; D];
            let mut inside = true;
            for (axis, i) in index.iter_mut().enumerate() {
                let local = (offset >> (2 * axis)) & 3;
                inside &= local < self.extent[axis];
                *i = self.origin[axis] + local;
            }
            if inside {
                self.remaining -= 1;
                return Some((self.block, offset, index));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<const D: usize> ExactSizeIterator for BlockOrder<D> {}

/// Proxy for one element of a compressed array.
///
/// A `Ref` borrows its array mutably, since even a read may decode a block
/// into the cache and evict another.
pub struct Ref<'r, 'a, T: ArrayScalar, const D: usize> {
    array: &'r mut CompressedArray<'a, T, D>,
    index: [usize; D],
    block: usize,
    offset: usize,
}

impl<'r, 'a, T: ArrayScalar, const D: usize> Ref<'r, 'a, T, D> {
    pub(crate) fn new(array: &'r mut CompressedArray<'a, T, D>, index: [usize; D], block: usize, offset: usize) -> Self {
        Self {
            array,
            index,
            block,
            offset,
        }
    }

    #[inline]
    pub fn index(&self) -> [usize; D] {
        self.index
    }

    pub fn get(&mut self) -> Result<T> {
        self.array.value(self.block, self.offset)
    }

    pub fn set(&mut self, value: T) -> Result<()> {
        *self.array.value_mut(self.block, self.offset)? = value;
        Ok(())
    }

    /// Replaces the value with `f(value)`; returns the new value.
    pub fn update(&mut self, f: impl FnOnce(T) -> T) -> Result<T> {
        let value = self.array.value_mut(self.block, self.offset)?;
        *value = f(*value);
        Ok(*value)
    }
}

/// Read-only traversal in block order.
pub struct Iter<'r, 'a, T: ArrayScalar, const D: usize> {
    array: &'r mut CompressedArray<'a, T, D>,
    order: BlockOrder<D>,
}

impl<'r, 'a, T: ArrayScalar, const D: usize> Iter<'r, 'a, T, D> {
    pub(crate) fn new(array: &'r mut CompressedArray<'a, T, D>) -> Self {
        let order = BlockOrder::new(*array.shape());
        Self { array, order }
    }
}

impl<T: ArrayScalar, const D: usize> Iterator for Iter<'_, '_, T, D> {
    type Item = Result<([usize; D], T)>;

    fn next(&mut self) -> Option<Self::Item> {
        let (block, offset, index) = self.order.next()?;
        Some(self.array.value(block, offset).map(|value| (index, value)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.order.size_hint()
    }
}

impl<T: ArrayScalar, const D: usize> ExactSizeIterator for Iter<'_, '_, T, D> {}

/// Mutable traversal in block order.
///
/// Unlike an [`Iterator`], each [`Ref`] borrows the cursor, so only one
/// element is reachable at a time.
pub struct Cursor<'r, 'a, T: ArrayScalar, const D: usize> {
    array: &'r mut CompressedArray<'a, T, D>,
    order: BlockOrder<D>,
}

impl<'r, 'a, T: ArrayScalar, const D: usize> Cursor<'r, 'a, T, D> {
    pub(crate) fn new(array: &'r mut CompressedArray<'a, T, D>) -> Self {
        let order = BlockOrder::new(*array.shape());
        Self { array, order }
    }

    /// Moves to the next element; `None` once every element was visited.
    pub fn next_ref(&mut self) -> Option<Ref<'_, 'a, T, D>> {
        let (block, offset, index) = self.order.next()?;
        Some(Ref::new(&mut *self.array, index, block, offset))
    }

    /// Elements not yet visited.
    pub fn remaining(&self) -> usize {
        self.order.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{Array2d, Array3f};
    use zfp_core::Mode;

    #[test]
    fn test_block_order_skips_positions_outside_partial_blocks() {
        let shape = Shape::new(&[5, 3]).unwrap();
        let order: Vec<_> = BlockOrder::<2>::new(shape).collect();
        assert_eq!(order.len(), 15);
        let first: Vec<[usize; 2]> = order[..5].iter().map(|&(_, _, i)| i).collect();
        assert_eq!(first, vec![[0, 0], [1, 0], [2, 0], [3, 0], [0, 1]]);
        let last: Vec<_> = order[12..].to_vec();
        assert_eq!(last, vec![(1, 0, [4, 0]), (1, 4, [4, 1]), (1, 8, [4, 2])]);

        let mut seen: Vec<_> = order.iter().map(|&(_, _, i)| i).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 15);
    }

    #[test]
    fn test_block_order_offsets_match_locate() {
        let shape = Shape::new(&[6, 5, 7]).unwrap();
        let mut order = BlockOrder::<3>::new(shape);
        assert_eq!(order.len(), 210);
        for (block, offset, index) in order.by_ref() {
            assert_eq!(shape.locate(&index), (block, offset));
        }
        assert_eq!(order.len(), 0);
    }

    #[test]
    fn test_ref_reads_and_writes() {
        let mut array = Array2d::new([6, 6], Mode::fixed_precision(40)).unwrap();
        let mut element = array.at([4, 1]).unwrap();
        assert_eq!(element.index(), [4, 1]);
        assert_eq!(element.get().unwrap(), 0.0);
        element.set(2.5).unwrap();
        assert_eq!(element.update(|v| v * 2.0).unwrap(), 5.0);
        assert_eq!(array.get(4, 1).unwrap(), 5.0);

        array.clear_cache().unwrap();
        assert!((array.get(4, 1).unwrap() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_cursor_visits_every_element_once() {
        let mut array = Array3f::with_rate([5, 2, 3], 16.0).unwrap();
        let mut cursor = array.cursor();
        assert_eq!(cursor.remaining(), 30);
        let mut visited = 0;
        while let Some(mut element) = cursor.next_ref() {
            let [i, j, k] = element.index();
            element.set((i + 10 * j + 100 * k) as f32).unwrap();
            visited += 1;
        }
        assert_eq!(visited, 30);
        assert_eq!(cursor.remaining(), 0);
        assert_eq!(array.get(4, 1, 2).unwrap(), 214.0);
    }
}
