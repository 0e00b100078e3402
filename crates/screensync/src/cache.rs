//! Cache layer
//!
//! Wraps the shared-cache adapter with the `cache` circuit breaker and
//! per-screen TTLs. Every failure mode here (breaker open, backend error,
//! per-call timeout) is reported to callers as a miss: the cache tier is
//! never allowed to fail a read.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use screensync_core::breaker::{BreakerSnapshot, CircuitBreaker};
use screensync_types::cache_adapter::CacheAdapter;
use screensync_types::types::CacheEntry;

use crate::prelude::*;

/// Per-screen TTL configuration; some screens cache longer than others
#[derive(Debug, Clone)]
pub struct CacheTtl {
	default_secs: u64,
	per_screen: HashMap<String, u64>,
}

impl CacheTtl {
	pub fn new(default_secs: u64, overrides: impl IntoIterator<Item = (String, u64)>) -> Self {
		Self { default_secs, per_screen: overrides.into_iter().collect() }
	}

	pub fn for_screen(&self, screen: &str) -> u64 {
		self.per_screen.get(screen).copied().unwrap_or(self.default_secs)
	}
}

/// Status snapshot for the cache admin surface
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
	pub entries: usize,
	pub hits: u64,
	pub misses: u64,
	pub breaker: BreakerSnapshot,
}

pub struct CacheLayer {
	adapter: Arc<dyn CacheAdapter>,
	breaker: Arc<CircuitBreaker>,
	ttl: CacheTtl,
	hits: AtomicU64,
	misses: AtomicU64,
}

impl CacheLayer {
	pub fn new(adapter: Arc<dyn CacheAdapter>, breaker: Arc<CircuitBreaker>, ttl: CacheTtl) -> Self {
		Self { adapter, breaker, ttl, hits: AtomicU64::new(0), misses: AtomicU64::new(0) }
	}

	fn key(screen: &str) -> String {
		format!("config:{}", screen)
	}

	/// Look a screen's document up; any failure is a miss.
	pub async fn get(&self, screen: &str) -> Option<ConfigDocument> {
		let key = Self::key(screen);
		let result = self.breaker.call(|| async { self.adapter.get(&key).await }).await;

		match result {
			Ok(Some(entry)) => {
				self.hits.fetch_add(1, Ordering::Relaxed);
				let mut document = entry.document;
				document.screen = screen.to_string();
				Some(document)
			}
			Ok(None) => {
				self.misses.fetch_add(1, Ordering::Relaxed);
				None
			}
			Err(err) => {
				debug!("Cache get for '{}' degraded to miss: {}", screen, err);
				self.misses.fetch_add(1, Ordering::Relaxed);
				None
			}
		}
	}

	/// Store a document under its screen's TTL. Best-effort.
	pub async fn set(&self, screen: &str, document: &ConfigDocument) {
		let key = Self::key(screen);
		let entry = CacheEntry::new(document.clone(), self.ttl.for_screen(screen));
		let result = self.breaker.call(|| async { self.adapter.set(&key, entry).await }).await;
		if let Err(err) = result {
			debug!("Cache set for '{}' failed: {}", screen, err);
		}
	}

	/// Drop a screen's entry. Best-effort; returns whether one was present.
	pub async fn invalidate(&self, screen: &str) -> bool {
		let key = Self::key(screen);
		match self.breaker.call(|| async { self.adapter.invalidate(&key).await }).await {
			Ok(present) => present,
			Err(err) => {
				debug!("Cache invalidate for '{}' failed: {}", screen, err);
				false
			}
		}
	}

	/// Drop every entry. Best-effort; returns the number removed.
	pub async fn invalidate_all(&self) -> usize {
		match self.breaker.call(|| async { self.adapter.invalidate_all().await }).await {
			Ok(removed) => removed,
			Err(err) => {
				warn!("Cache clear failed: {}", err);
				0
			}
		}
	}

	pub async fn status(&self) -> CacheStatus {
		let entries = match self.adapter.stats().await {
			Ok(stats) => stats.entries,
			Err(_) => 0,
		};
		CacheStatus {
			entries,
			hits: self.hits.load(Ordering::Relaxed),
			misses: self.misses.load(Ordering::Relaxed),
			breaker: self.breaker.snapshot(),
		}
	}

	pub fn breaker(&self) -> &Arc<CircuitBreaker> {
		&self.breaker
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use screensync_cache_adapter_memory::MemoryCacheAdapter;
	use screensync_core::breaker::{BreakerConfig, BreakerState};
	use screensync_types::types::Source;
	use serde_json::Map;

	fn layer() -> CacheLayer {
		CacheLayer::new(
			Arc::new(MemoryCacheAdapter::new()),
			Arc::new(CircuitBreaker::new("cache", BreakerConfig::default())),
			CacheTtl::new(300, [("Fast".to_string(), 5)]),
		)
	}

	fn doc(screen: &str) -> ConfigDocument {
		ConfigDocument::new(screen, Map::new(), Source::File)
	}

	#[tokio::test]
	async fn test_set_then_get() {
		let cache = layer();
		cache.set("Auth", &doc("Auth")).await;

		let hit = cache.get("Auth").await;
		assert_eq!(hit.unwrap().screen, "Auth");

		let status = cache.status().await;
		assert_eq!(status.hits, 1);
		assert_eq!(status.entries, 1);
	}

	#[tokio::test]
	async fn test_open_breaker_is_a_miss() {
		let cache = layer();
		cache.set("Auth", &doc("Auth")).await;
		cache.breaker().force_open();

		assert!(cache.get("Auth").await.is_none());
		assert_eq!(cache.status().await.breaker.state, BreakerState::Open);
	}

	#[tokio::test]
	async fn test_ttl_override() {
		let ttl = CacheTtl::new(300, [("Fast".to_string(), 5)]);
		assert_eq!(ttl.for_screen("Fast"), 5);
		assert_eq!(ttl.for_screen("Other"), 300);
	}

	#[tokio::test]
	async fn test_invalidate() {
		let cache = layer();
		cache.set("Auth", &doc("Auth")).await;
		assert!(cache.invalidate("Auth").await);
		assert!(cache.get("Auth").await.is_none());
	}
}

// vim: ts=4
