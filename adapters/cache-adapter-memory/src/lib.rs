//! In-process cache and lock adapters
//!
//! The bundled default backends for single-instance deployments and tests.
//! Both mirror the semantics an external shared backend provides: the cache
//! is a TTL map (SETEX-style, lazy expiry), the lock table is set-if-absent
//! with token-checked release (SET NX + EX-style). Multi-instance
//! deployments swap in a shared backend behind the same traits.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use screensync_types::cache_adapter::CacheAdapter;
use screensync_types::error::ScResult;
use screensync_types::lock_adapter::LockAdapter;
use screensync_types::types::{CacheEntry, CacheStats, Timestamp};

/// TTL-based in-memory cache
pub struct MemoryCacheAdapter {
	entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCacheAdapter {
	pub fn new() -> Self {
		Self { entries: RwLock::new(HashMap::new()) }
	}
}

impl Default for MemoryCacheAdapter {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl CacheAdapter for MemoryCacheAdapter {
	async fn get(&self, key: &str) -> ScResult<Option<CacheEntry>> {
		let now = Timestamp::now();
		let expired = {
			let entries = self.entries.read();
			match entries.get(key) {
				Some(entry) if entry.is_expired(now) => true,
				Some(entry) => return Ok(Some(entry.clone())),
				None => return Ok(None),
			}
		};

		if expired {
			self.entries.write().remove(key);
			debug!("Cache entry '{}' expired", key);
		}
		Ok(None)
	}

	async fn set(&self, key: &str, entry: CacheEntry) -> ScResult<()> {
		self.entries.write().insert(key.to_string(), entry);
		Ok(())
	}

	async fn invalidate(&self, key: &str) -> ScResult<bool> {
		Ok(self.entries.write().remove(key).is_some())
	}

	async fn invalidate_all(&self) -> ScResult<usize> {
		let mut entries = self.entries.write();
		let removed = entries.len();
		entries.clear();
		Ok(removed)
	}

	async fn stats(&self) -> ScResult<CacheStats> {
		Ok(CacheStats { entries: self.entries.read().len() })
	}
}

struct LockRecord {
	token: String,
	expires_at: Instant,
}

/// Set-if-absent lock table with token-checked release
pub struct MemoryLockAdapter {
	locks: Mutex<HashMap<String, LockRecord>>,
}

impl MemoryLockAdapter {
	pub fn new() -> Self {
		Self { locks: Mutex::new(HashMap::new()) }
	}
}

impl Default for MemoryLockAdapter {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl LockAdapter for MemoryLockAdapter {
	async fn acquire(&self, key: &str, token: &str, ttl: Duration) -> ScResult<bool> {
		let mut locks = self.locks.lock();
		let now = Instant::now();

		match locks.get(key) {
			Some(record) if record.expires_at > now => Ok(false),
			_ => {
				locks.insert(
					key.to_string(),
					LockRecord { token: token.to_string(), expires_at: now + ttl },
				);
				Ok(true)
			}
		}
	}

	async fn release(&self, key: &str, token: &str) -> ScResult<bool> {
		let mut locks = self.locks.lock();
		match locks.get(key) {
			Some(record) if record.token == token => {
				locks.remove(key);
				Ok(true)
			}
			_ => Ok(false),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use screensync_types::types::{ConfigDocument, Source};
	use serde_json::Map;

	fn entry(screen: &str, ttl_secs: u64) -> CacheEntry {
		CacheEntry::new(ConfigDocument::new(screen, Map::new(), Source::File), ttl_secs)
	}

	#[tokio::test]
	async fn test_cache_set_get_invalidate() {
		let cache = MemoryCacheAdapter::new();
		cache.set("screen:Auth", entry("Auth", 60)).await.unwrap();

		let hit = cache.get("screen:Auth").await.unwrap();
		assert!(hit.is_some());
		assert_eq!(cache.stats().await.unwrap().entries, 1);

		assert!(cache.invalidate("screen:Auth").await.unwrap());
		assert!(cache.get("screen:Auth").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_cache_expired_entry_is_miss() {
		let cache = MemoryCacheAdapter::new();
		cache.set("screen:Auth", entry("Auth", 0)).await.unwrap();
		assert!(cache.get("screen:Auth").await.unwrap().is_none());
		assert_eq!(cache.stats().await.unwrap().entries, 0);
	}

	#[tokio::test]
	async fn test_cache_invalidate_all() {
		let cache = MemoryCacheAdapter::new();
		cache.set("a", entry("a", 60)).await.unwrap();
		cache.set("b", entry("b", 60)).await.unwrap();
		assert_eq!(cache.invalidate_all().await.unwrap(), 2);
		assert_eq!(cache.stats().await.unwrap().entries, 0);
	}

	#[tokio::test]
	async fn test_lock_set_if_absent() {
		let locks = MemoryLockAdapter::new();
		let ttl = Duration::from_secs(5);

		assert!(locks.acquire("k", "a", ttl).await.unwrap());
		assert!(!locks.acquire("k", "b", ttl).await.unwrap());
		assert!(locks.release("k", "a").await.unwrap());
		assert!(locks.acquire("k", "b", ttl).await.unwrap());
	}

	#[tokio::test]
	async fn test_lock_expiry_allows_takeover() {
		let locks = MemoryLockAdapter::new();
		assert!(locks.acquire("k", "a", Duration::from_millis(0)).await.unwrap());
		assert!(locks.acquire("k", "b", Duration::from_secs(5)).await.unwrap());
	}

	#[tokio::test]
	async fn test_lock_release_checks_token() {
		let locks = MemoryLockAdapter::new();
		assert!(locks.acquire("k", "a", Duration::from_secs(5)).await.unwrap());
		assert!(!locks.release("k", "wrong").await.unwrap());
		assert!(locks.release("k", "a").await.unwrap());
		assert!(!locks.release("k", "a").await.unwrap());
	}
}

// vim: ts=4
