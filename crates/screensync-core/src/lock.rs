//! Distributed lock with bounded backoff
//!
//! Serializes concurrent writers to the same screen across server
//! instances. Acquisition retries with exponential backoff up to a bounded
//! attempt count and surfaces `LockTimeout` on exhaustion; the write path
//! must never proceed without the lock. Each acquisition carries a fresh
//! fencing token so only the acquiring writer can release.

use std::cmp;
use std::sync::Arc;
use std::time::Duration;

use screensync_types::lock_adapter::LockAdapter;
use screensync_types::utils::random_id;

use crate::prelude::*;

#[derive(Debug, Clone)]
pub struct LockConfig {
	/// Lock TTL in the backend; covers crashed holders
	pub ttl: Duration,
	pub max_attempts: u32,
	pub initial_backoff: Duration,
	pub max_backoff: Duration,
}

impl Default for LockConfig {
	fn default() -> Self {
		Self {
			ttl: Duration::from_secs(30),
			max_attempts: 8,
			initial_backoff: Duration::from_millis(50),
			max_backoff: Duration::from_secs(2),
		}
	}
}

pub struct DistributedLock {
	adapter: Arc<dyn LockAdapter>,
	config: LockConfig,
}

impl DistributedLock {
	pub fn new(adapter: Arc<dyn LockAdapter>, config: LockConfig) -> Self {
		Self { adapter, config }
	}

	/// Acquire the lock for `key`, retrying with exponential backoff.
	pub async fn lock(&self, key: &str) -> ScResult<LockGuard> {
		let token = random_id();
		let mut backoff = self.config.initial_backoff;

		for attempt in 1..=self.config.max_attempts {
			match self.adapter.acquire(key, &token, self.config.ttl).await {
				Ok(true) => {
					debug!("Lock '{}' acquired (attempt {})", key, attempt);
					return Ok(LockGuard {
						adapter: Arc::clone(&self.adapter),
						key: key.to_string(),
						token,
						released: false,
					});
				}
				Ok(false) => {
					debug!("Lock '{}' busy (attempt {}/{})", key, attempt, self.config.max_attempts);
				}
				Err(err) => {
					// Backend hiccups count as a failed attempt; exhaustion
					// still surfaces as LockTimeout below
					warn!("Lock '{}' backend error on attempt {}: {}", key, attempt, err);
				}
			}

			if attempt < self.config.max_attempts {
				tokio::time::sleep(backoff).await;
				backoff = cmp::min(backoff * 2, self.config.max_backoff);
			}
		}

		Err(Error::LockTimeout(format!(
			"could not acquire lock '{}' after {} attempts",
			key, self.config.max_attempts
		)))
	}
}

/// Held lock; release is explicit so callers control when the critical
/// section ends. A guard dropped without an explicit release (a cancelled
/// critical section) spawns a best-effort release so the key is not pinned
/// until the backend TTL; the TTL remains the backstop for crashed holders.
pub struct LockGuard {
	adapter: Arc<dyn LockAdapter>,
	key: String,
	token: String,
	released: bool,
}

impl LockGuard {
	pub fn token(&self) -> &str {
		&self.token
	}

	/// Release the lock; only succeeds while this guard's token still holds it.
	pub async fn release(mut self) -> ScResult<bool> {
		self.released = true;
		let released = self.adapter.release(&self.key, &self.token).await?;
		if !released {
			warn!("Lock '{}' was no longer held by this token at release", self.key);
		}
		Ok(released)
	}
}

impl Drop for LockGuard {
	fn drop(&mut self) {
		if self.released {
			return;
		}
		let adapter = Arc::clone(&self.adapter);
		let key = std::mem::take(&mut self.key);
		let token = std::mem::take(&mut self.token);
		if let Ok(handle) = tokio::runtime::Handle::try_current() {
			handle.spawn(async move {
				warn!("Lock '{}' dropped without release, releasing", key);
				if let Err(err) = adapter.release(&key, &token).await {
					warn!("Lock '{}' release on drop failed: {}", key, err);
				}
			});
		}
	}
}


// vim: ts=4
