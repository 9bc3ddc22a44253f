//! Collaborator contracts.
//!
//! The cache itself knows nothing about what it stores.  A [Weigher] tells it what each value costs, and a
//! [CapacitySource] tells it how much it may hold in total.  [Cache] is the surface handed to the rest of an image
//! loading pipeline.
use std::sync::Arc;

/// Estimate the cost of an item.  This is usually its in-memory size in bytes.
pub trait EstimateCost {
    fn estimate_cost(&self) -> u64;
}

impl EstimateCost for Vec<u8> {
    fn estimate_cost(&self) -> u64 {
        self.len() as u64
    }
}

impl EstimateCost for String {
    fn estimate_cost(&self) -> u64 {
        self.len() as u64
    }
}

/// Computes the weight of a value as it goes into the cache.
///
/// Must be deterministic for a given value.  The cache records the weight once on insertion and subtracts that same
/// figure on removal.
pub trait Weigher<V: ?Sized>: Send + Sync {
    fn weigh(&self, value: &V) -> u64;
}

impl<V: ?Sized, F> Weigher<V> for F
where
    F: Fn(&V) -> u64 + Send + Sync,
{
    fn weigh(&self, value: &V) -> u64 {
        self(value)
    }
}

/// A [Weigher] which asks the value itself, via [EstimateCost].
#[derive(Debug, Default, Clone, Copy)]
pub struct CostWeigher;

impl<V: EstimateCost + ?Sized> Weigher<V> for CostWeigher {
    fn weigh(&self, value: &V) -> u64 {
        value.estimate_cost()
    }
}

/// Where the maximum weight of a cache comes from, usually some share of the memory available to the process.
///
/// Queried once, when the cache is built.
pub trait CapacitySource {
    fn max_weight(&self) -> u64;
}

impl<F: Fn() -> u64> CapacitySource for F {
    fn max_weight(&self) -> u64 {
        self()
    }
}

/// The operations an image pipeline needs from a memory cache.
///
/// Blank keys are never an error: writes with one are ignored and reads with one find nothing.
pub trait Cache<V> {
    fn set(&self, key: &str, value: V);

    /// Fetch a value, counting as a use of it.
    fn get(&self, key: &str) -> Option<Arc<V>>;

    fn remove(&self, key: &str) -> Option<Arc<V>>;

    /// Check for a key without counting as a use of it.
    fn contains(&self, key: &str) -> bool;

    /// Total weight of everything cached.
    fn size(&self) -> u64;

    /// Number of entries cached.
    fn count(&self) -> usize;

    fn clear(&self);
}
