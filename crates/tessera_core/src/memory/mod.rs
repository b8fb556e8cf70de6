//! # Memory Management
//!
//! Per-worker scratch memory for transient, tick-scoped allocations.
//!
//! ## Design Philosophy
//!
//! Each worker owns one [`Arena`]. Job bodies running on that worker carve
//! typed, zeroed slices out of it; at the start of every tick the arena is
//! reset and its blocks are reused. Nothing is shared between workers, so no
//! locks are involved. Code running off a worker uses [`Scratch::heap`].

mod arena;

pub use arena::{Arena, ArenaSlice, Scratch, DEFAULT_BLOCK_SIZE, MAX_ALIGN};
