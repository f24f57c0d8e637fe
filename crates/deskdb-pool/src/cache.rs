//! Read-result caching
//!
//! Results of read-only statements are memoized per statement text and
//! parameter binding for a bounded time. Writes are never cached.

#[allow(clippy::module_inception)]
mod cache;
mod key;

#[cfg(test)]
mod tests;

pub use cache::{CacheConfig, CacheStats, ResultCache};
pub use key::{CacheKey, params_digest};
