//! Cache Adapter
//!
//! Trait for pluggable shared-cache backends. The engine only assumes TTL
//! semantics; the bundled in-process adapter and an external shared cache
//! (Redis-style SETEX) are interchangeable behind this boundary.
//!
//! Adapter failures must be treated by callers exactly like a cache miss:
//! the read path degrades to the next tier, never to an error.

use async_trait::async_trait;

use crate::error::ScResult;
use crate::types::{CacheEntry, CacheStats};

#[async_trait]
pub trait CacheAdapter: Send + Sync {
	/// Look up an entry. Expired entries are reported as `None`.
	async fn get(&self, key: &str) -> ScResult<Option<CacheEntry>>;

	/// Store an entry under its TTL, replacing any previous one.
	async fn set(&self, key: &str, entry: CacheEntry) -> ScResult<()>;

	/// Drop a single entry. Returns whether one was present.
	async fn invalidate(&self, key: &str) -> ScResult<bool>;

	/// Drop every entry. Returns the number removed.
	async fn invalidate_all(&self) -> ScResult<usize>;

	/// Backend statistics for the cache status surface.
	async fn stats(&self) -> ScResult<CacheStats>;
}

// vim: ts=4
