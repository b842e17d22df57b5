//! Write-back cache of decoded blocks.
//!
//! The cache knows nothing about compression: it asks a [`BlockStore`] to
//! decode a block on a miss and to encode a dirty block when that block is
//! evicted or flushed. Replacement is least-recently-used.

use std::collections::HashMap;

use log::trace;
use zfp_core::Result;

/// Backing store the cache reads blocks from and writes them back to.
pub trait BlockStore<T> {
    /// Decodes block `block` into `values` (one full block).
    fn decode_block(&mut self, block: usize, values: &mut [T]) -> Result<()>;
    /// Encodes `values` as the new contents of block `block`.
    fn encode_block(&mut self, block: usize, values: &[T]) -> Result<()>;
}

/// Access counters, cumulative since construction or the last reset.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub writebacks: u64,
}

impl CacheStats {
    /// Fraction of accesses served without decoding.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

#[derive(Debug)]
struct Line<T> {
    block: usize,
    values: Vec<T>,
    dirty: bool,
    /// Tick of the last access.
    used: u64,
}

#[derive(Debug)]
pub struct BlockCache<T> {
    capacity: usize,
    block_len: usize,
    lines: Vec<Line<T>>,
    /// block index -> position in `lines`
    index: HashMap<usize, usize>,
    scratch: Vec<T>,
    tick: u64,
    stats: CacheStats,
}

impl<T: Copy + Default> BlockCache<T> {
    /// Cache holding up to `capacity` blocks of `block_len` values each.
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize, block_len: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            block_len,
            lines: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            scratch: vec![T::default(); block_len],
            tick: 0,
            stats: CacheStats::default(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of blocks currently cached.
    #[inline]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn contains(&self, block: usize) -> bool {
        self.index.contains_key(&block)
    }

    pub fn is_dirty(&self, block: usize) -> bool {
        self.index
            .get(&block)
            .map_or(false, |&slot| self.lines[slot].dirty)
    }

    #[inline]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = CacheStats::default();
    }

    /// Decoded values of `block`, loading it on a miss.
    pub fn get<S: BlockStore<T>>(&mut self, block: usize, store: &mut S) -> Result<&[T]> {
        let slot = self.load(block, store)?;
        Ok(&self.lines[slot].values)
    }

    /// Mutable values of `block`; the block is written back when evicted or
    /// flushed.
    pub fn get_mut<S: BlockStore<T>>(&mut self, block: usize, store: &mut S) -> Result<&mut [T]> {
        let slot = self.load(block, store)?;
        let line = &mut self.lines[slot];
        line.dirty = true;
        Ok(&mut line.values)
    }

    /// Writes every dirty block back; lines stay cached and become clean.
    pub fn flush<S: BlockStore<T>>(&mut self, store: &mut S) -> Result<()> {
        for line in self.lines.iter_mut().filter(|line| line.dirty) {
            store.encode_block(line.block, &line.values)?;
            line.dirty = false;
            self.stats.writebacks += 1;
            trace!("wrote back block {}", line.block);
        }
        Ok(())
    }

    /// Flushes, then empties the cache.
    pub fn clear<S: BlockStore<T>>(&mut self, store: &mut S) -> Result<()> {
        self.flush(store)?;
        self.discard();
        Ok(())
    }

    /// Empties the cache without writing anything back.
    pub fn discard(&mut self) {
        self.lines.clear();
        self.index.clear();
    }

    /// Changes the capacity, evicting least recently used blocks as needed.
    pub fn resize<S: BlockStore<T>>(&mut self, capacity: usize, store: &mut S) -> Result<()> {
        let capacity = capacity.max(1);
        while self.lines.len() > capacity {
            let slot = self.victim();
            self.write_back(slot, store)?;
            let line = self.lines.swap_remove(slot);
            self.index.remove(&line.block);
            if let Some(moved) = self.lines.get(slot) {
                self.index.insert(moved.block, slot);
            }
            self.stats.evictions += 1;
        }
        self.capacity = capacity;
        Ok(())
    }

    /// Slot holding `block`, decoding it into the cache on a miss.
    fn load<S: BlockStore<T>>(&mut self, block: usize, store: &mut S) -> Result<usize> {
        self.tick += 1;
        if let Some(&slot) = self.index.get(&block) {
            self.stats.hits += 1;
            self.lines[slot].used = self.tick;
            return Ok(slot);
        }

        self.stats.misses += 1;
        trace!("cache miss on block {}", block);
        // decode before evicting so a failed decode leaves the cache intact
        store.decode_block(block, &mut self.scratch)?;

        let slot = if self.lines.len() < self.capacity {
            self.lines.push(Line {
                block,
                values: vec![T::default(); self.block_len],
                dirty: false,
                used: 0,
            });
            self.lines.len() - 1
        } else {
            let slot = self.victim();
            self.write_back(slot, store)?;
            self.index.remove(&self.lines[slot].block);
            self.stats.evictions += 1;
            slot
        };

        let line = &mut self.lines[slot];
        std::mem::swap(&mut line.values, &mut self.scratch);
        line.block = block;
        line.dirty = false;
        line.used = self.tick;
        self.index.insert(block, slot);
        Ok(slot)
    }

    fn victim(&self) -> usize {
        self.lines
            .iter()
            .enumerate()
            .min_by_key(|(_, line)| line.used)
            .map_or(0, |(slot, _)| slot)
    }

    fn write_back<S: BlockStore<T>>(&mut self, slot: usize, store: &mut S) -> Result<()> {
        let line = &mut self.lines[slot];
        if line.dirty {
            store.encode_block(line.block, &line.values)?;
            line.dirty = false;
            self.stats.writebacks += 1;
            trace!("evicted dirty block {}", line.block);
        }
        Ok(())
    }
}
