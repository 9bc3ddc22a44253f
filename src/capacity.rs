//! Stock [CapacitySource] implementations.
use crate::*;

/// A fixed maximum weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedCapacity(pub u64);

impl CapacitySource for FixedCapacity {
    fn max_weight(&self) -> u64 {
        self.0
    }
}

/// A fraction of whatever another source reports, typically the maximum memory of the host process.
///
/// Image caches conventionally take a quarter of it, which is what [MemoryFraction::quarter_of] gives.
#[derive(Debug, Clone, Copy)]
pub struct MemoryFraction<S> {
    source: S,
    divisor: u64,
}

impl<S: CapacitySource> MemoryFraction<S> {
    pub fn new(source: S, divisor: u64) -> Result<MemoryFraction<S>, CapacityError> {
        if divisor == 0 {
            return Err(CapacityError::ZeroDivisor);
        }

        Ok(MemoryFraction { source, divisor })
    }

    pub fn quarter_of(source: S) -> MemoryFraction<S> {
        MemoryFraction { source, divisor: 4 }
    }

    pub fn divisor(&self) -> u64 {
        self.divisor
    }
}

impl<S: CapacitySource> CapacitySource for MemoryFraction<S> {
    fn max_weight(&self) -> u64 {
        self.source.max_weight() / self.divisor
    }
}
