use crate::MemoryCacheConfigBuilderError;

/// Failures while working out how big a cache may get.  Cache operations themselves never fail.
#[derive(Debug, thiserror::Error)]
pub enum CapacityError {
    #[error("a memory fraction needs a non-zero divisor")]
    ZeroDivisor,
    #[error("invalid cache configuration: {0}")]
    Config(#[from] MemoryCacheConfigBuilderError),
}
