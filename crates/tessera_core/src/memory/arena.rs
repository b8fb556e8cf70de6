//! # Arena Allocator
//!
//! A growable block arena for tick-scoped scratch data.
//!
//! ```text
//! blocks: [ 64 KiB ][ 64 KiB ][ 300 KiB (oversized) ]
//!            ^ offset bumps forward; reset() rewinds to block 0
//! ```
//!
//! Blocks are never freed on reset, only rewound, so after the first few
//! ticks a worker stops touching the global allocator for scratch memory.

use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use bytemuck::{Pod, Zeroable};

/// Default block size in bytes.
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Largest alignment an arena slice can satisfy.
pub const MAX_ALIGN: usize = std::mem::align_of::<u64>();

/// Typed handle to a slice inside an [`Arena`].
///
/// Becomes stale when the arena is reset; stale handles resolve to `None`.
#[derive(Debug)]
pub struct ArenaSlice<T> {
    block: usize,
    offset: usize,
    len: usize,
    epoch: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ArenaSlice<T> {
    /// Number of elements.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the slice has no elements.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<T> Clone for ArenaSlice<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ArenaSlice<T> {}

/// A bump-pointer block arena.
///
/// # Thread Safety
///
/// Not shared. Each worker owns exactly one arena and hands it to job bodies
/// through its worker context.
///
/// # Example
///
/// ```rust
/// use tessera_core::Arena;
///
/// let mut arena = Arena::new(1024);
/// let a = arena.alloc::<f32>(16);
/// let b = arena.alloc::<u32>(4);
///
/// arena.get_mut(&a).unwrap()[0] = 1.5;
/// assert_eq!(arena.get(&b).unwrap(), &[0, 0, 0, 0]);
///
/// arena.reset();
/// assert!(arena.get(&a).is_none());
/// ```
#[derive(Debug)]
pub struct Arena {
    blocks: Vec<Box<[u64]>>,
    current: usize,
    offset: usize,
    block_size: usize,
    epoch: u64,
    allocated: usize,
}

impl Arena {
    /// Creates an arena whose blocks hold `block_size` bytes.
    ///
    /// # Arguments
    ///
    /// * `block_size` - Bytes per regular block; oversized requests get a
    ///   dedicated block
    #[must_use]
    pub fn new(block_size: usize) -> Self {
        let block_size = block_size.max(MAX_ALIGN);
        Self {
            blocks: vec![Self::new_block(block_size)],
            current: 0,
            offset: 0,
            block_size,
            epoch: 0,
            allocated: 0,
        }
    }

    fn new_block(bytes: usize) -> Box<[u64]> {
        vec![0u64; bytes.div_ceil(MAX_ALIGN)].into_boxed_slice()
    }

    /// Allocates `len` zeroed elements.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized or needs alignment above [`MAX_ALIGN`].
    pub fn alloc<T: Pod>(&mut self, len: usize) -> ArenaSlice<T> {
        let size = std::mem::size_of::<T>();
        assert!(size > 0, "zero-sized types cannot be arena allocated");
        assert!(
            std::mem::align_of::<T>() <= MAX_ALIGN,
            "arena alignment limit is {MAX_ALIGN} bytes"
        );

        let bytes = size.checked_mul(len).expect("arena allocation size overflow");
        let (block, offset) = self.reserve(bytes, std::mem::align_of::<T>());

        let raw: &mut [u8] = bytemuck::cast_slice_mut(&mut self.blocks[block][..]);
        raw[offset..offset + bytes].fill(0);
        self.allocated += bytes;

        ArenaSlice {
            block,
            offset,
            len,
            epoch: self.epoch,
            _marker: PhantomData,
        }
    }

    /// Allocates and immediately borrows `len` zeroed elements.
    pub fn alloc_slice<T: Pod>(&mut self, len: usize) -> &mut [T] {
        let slice = self.alloc::<T>(len);
        self.view_mut(&slice)
    }

    fn reserve(&mut self, bytes: usize, align: usize) -> (usize, usize) {
        while self.current < self.blocks.len() {
            let start = self.offset.next_multiple_of(align);
            let capacity = self.blocks[self.current].len() * MAX_ALIGN;
            if start + bytes <= capacity {
                self.offset = start + bytes;
                return (self.current, start);
            }
            self.current += 1;
            self.offset = 0;
        }

        self.blocks.push(Self::new_block(bytes.max(self.block_size)));
        self.current = self.blocks.len() - 1;
        self.offset = bytes;
        (self.current, 0)
    }

    /// Resolves a handle. `None` if the arena was reset since allocation.
    #[must_use]
    pub fn get<T: Pod>(&self, slice: &ArenaSlice<T>) -> Option<&[T]> {
        if slice.epoch != self.epoch {
            return None;
        }
        let raw: &[u8] = bytemuck::cast_slice(&self.blocks[slice.block][..]);
        let end = slice.offset + slice.len * std::mem::size_of::<T>();
        Some(bytemuck::cast_slice(&raw[slice.offset..end]))
    }

    /// Mutable variant of [`get`](Self::get).
    pub fn get_mut<T: Pod>(&mut self, slice: &ArenaSlice<T>) -> Option<&mut [T]> {
        if slice.epoch != self.epoch {
            return None;
        }
        Some(self.view_mut(slice))
    }

    fn view_mut<T: Pod>(&mut self, slice: &ArenaSlice<T>) -> &mut [T] {
        let raw: &mut [u8] = bytemuck::cast_slice_mut(&mut self.blocks[slice.block][..]);
        let end = slice.offset + slice.len * std::mem::size_of::<T>();
        bytemuck::cast_slice_mut(&mut raw[slice.offset..end])
    }

    /// Rewinds to the first block and invalidates every handle.
    ///
    /// No memory is released.
    #[inline]
    pub fn reset(&mut self) {
        self.epoch += 1;
        self.current = 0;
        self.offset = 0;
        self.allocated = 0;
    }

    /// Number of resets performed.
    #[inline]
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Bytes handed out since the last reset (excluding alignment padding).
    #[inline]
    #[must_use]
    pub const fn allocated(&self) -> usize {
        self.allocated
    }

    /// Total bytes reserved across all blocks.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.blocks.iter().map(|b| b.len() * MAX_ALIGN).sum()
    }

    /// Number of blocks owned.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_SIZE)
    }
}

/// Scratch buffer that lives either in a worker arena or on the heap.
#[derive(Debug)]
pub enum Scratch<'a, T> {
    /// Borrowed from the current worker's arena.
    Arena(&'a mut [T]),
    /// Plain heap allocation, for code not running on a worker.
    Heap(Vec<T>),
}

impl<T: Zeroable + Clone> Scratch<'_, T> {
    /// Zeroed heap-backed scratch.
    #[must_use]
    pub fn heap(len: usize) -> Self {
        Scratch::Heap(vec![T::zeroed(); len])
    }
}

impl<T> Scratch<'_, T> {
    /// Whether the buffer came from an arena.
    #[must_use]
    pub fn is_arena(&self) -> bool {
        matches!(self, Scratch::Arena(_))
    }
}

impl<T> Deref for Scratch<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        match self {
            Scratch::Arena(slice) => slice,
            Scratch::Heap(vec) => vec,
        }
    }
}

impl<T> DerefMut for Scratch<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        match self {
            Scratch::Arena(slice) => slice,
            Scratch::Heap(vec) => vec,
        }
    }
}
