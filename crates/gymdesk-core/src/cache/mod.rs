//! Client-side caching of backend reads.
//!
//! This module provides:
//! - `TtlCache`: expiring key/value store with one expiry timer per key
//! - `CacheKey`: deterministic keys built from a resource, page and filters
//!
//! Services keep separate instances for list data and aggregate stats so
//! invalidating one never evicts the other.

pub mod keys;
pub mod ttl;

pub use keys::{CacheKey, UNSET_FILTER};
pub use ttl::{CacheEntry, TtlCache};
