use crate::error::{Result, ZfpError};

/// Largest dimensionality a stream header can describe.
pub const MAX_DIMS: usize = 4;

/// Side length of a block along every axis.
pub const BLOCK_SIDE: usize = 4;

/// Number of values in a block of the given dimensionality (`4^dims`).
#[inline]
pub const fn block_len(dims: usize) -> usize {
    1 << (2 * dims)
}

/// Per-axis extents of a field, x varying fastest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Shape {
    extents: [usize; MAX_DIMS],
    dims: usize,
}

impl Shape {
    pub fn new(extents: &[usize]) -> Result<Self> {
        if extents.is_empty() || extents.len() > MAX_DIMS {
            return Err(ZfpError::InvalidShape(format!(
                "expected 1 to {} extents, got {}",
                MAX_DIMS,
                extents.len()
            )));
        }
        if let Some(axis) = extents.iter().position(|&n| n == 0) {
            return Err(ZfpError::InvalidShape(format!("extent of axis {} is zero", axis)));
        }
        let mut padded = [1usize; MAX_DIMS];
        padded[..extents.len()].copy_from_slice(extents);
        Ok(Self {
            extents: padded,
            dims: extents.len(),
        })
    }

    #[inline]
    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn extents(&self) -> &[usize] {
        &self.extents[..self.dims]
    }

    /// Extent along `axis`; axes beyond `dims()` have extent 1.
    #[inline]
    pub fn extent(&self, axis: usize) -> usize {
        self.extents.get(axis).copied().unwrap_or(1)
    }

    /// Total number of values.
    pub fn len(&self) -> usize {
        self.extents().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values per block for this dimensionality.
    #[inline]
    pub fn block_len(&self) -> usize {
        block_len(self.dims)
    }

    /// Number of blocks along each axis (1 beyond `dims()`).
    pub fn blocks_per_axis(&self) -> [usize; MAX_DIMS] {
        let mut blocks = [1usize; MAX_DIMS];
        for (axis, b) in blocks.iter_mut().enumerate().take(self.dims) {
            *b = (self.extents[axis] + BLOCK_SIDE - 1) / BLOCK_SIDE;
        }
        blocks
    }

    pub fn block_count(&self) -> usize {
        self.blocks_per_axis().iter().product()
    }

    /// Block coordinates of block `index` in raster order.
    pub fn block_coords(&self, mut index: usize) -> [usize; MAX_DIMS] {
        let blocks = self.blocks_per_axis();
        let mut coords = [0usize; MAX_DIMS];
        for axis in 0..MAX_DIMS {
            coords[axis] = index % blocks[axis];
            index /= blocks[axis];
        }
        coords
    }

    /// Number of in-range values along each axis of block `index`.
    pub fn block_extent(&self, index: usize) -> [usize; MAX_DIMS] {
        let coords = self.block_coords(index);
        let mut counts = [1usize; MAX_DIMS];
        for axis in 0..self.dims {
            let start = coords[axis] * BLOCK_SIDE;
            counts[axis] = (self.extents[axis] - start).min(BLOCK_SIDE);
        }
        counts
    }

    /// Locates a value: returns `(block index, offset within the block)`.
    pub fn locate(&self, index: &[usize]) -> (usize, usize) {
        let blocks = self.blocks_per_axis();
        let mut block = 0;
        let mut offset = 0;
        for axis in (0..self.dims).rev() {
            block = block * blocks[axis] + index[axis] / BLOCK_SIDE;
            offset = offset * BLOCK_SIDE + index[axis] % BLOCK_SIDE;
        }
        (block, offset)
    }

    /// Linear position of `index` in a dense x-fastest layout.
    pub fn linear(&self, index: &[usize]) -> usize {
        let mut pos = 0;
        for axis in (0..self.dims).rev() {
            pos = pos * self.extents[axis] + index[axis];
        }
        pos
    }

    pub fn contains(&self, index: &[usize]) -> bool {
        index.len() == self.dims && index.iter().zip(self.extents()).all(|(&i, &n)| i < n)
    }
}
