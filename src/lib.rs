//! A weight-bounded LRU memory cache, intended for decoded images and other values which are large in memory.
//!
//! Decoded images are expensive to produce and expensive to keep.  A plain map of keys to images either grows without
//! bound or forgets things at random.  This crate keeps the most recently used ones, up to a total weight, usually
//! the bytes their pixel buffers take:
//!
//! [WeightedLru] is the low-level building block: a single-threaded Lru cache where every item has a weight.  When the
//! total weight goes over the maximum, the least recently used items are evicted until it fits again.  A single item
//! heavier than the maximum is still kept, alone, so that the value just inserted is never thrown away immediately.
//!
//! [LruMemoryCache] wraps it in a mutex, weighs values with a [Weigher], ignores blank keys, and hands out values
//! behind `Arc` so callers can keep using them after they have been evicted.  It implements [Cache], the surface the
//! rest of an image pipeline talks to.
//!
//! How big a cache may get comes from a [CapacitySource], usually a [MemoryFraction] of the memory available to the
//! process.  Finding out how much memory that is, and decoding images, are left to the caller.
mod capacity;
mod error;
mod image;
mod memory_cache;
mod traits;
mod weighted_lru;

pub use capacity::*;
pub use error::*;
pub use image::*;
pub use memory_cache::*;
pub use traits::*;
pub use weighted_lru::*;
