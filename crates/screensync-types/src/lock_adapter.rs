//! Distributed Lock Adapter
//!
//! Trait for pluggable mutual-exclusion backends keyed per screen.
//! Acquisition is atomic set-if-absent; release only succeeds for the
//! fencing token that acquired the lock, so a slow writer can never clobber
//! a newer holder's lock. An external shared backend (Redis SET NX + EX)
//! plugs in behind the same trait as the bundled in-process adapter.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::ScResult;

#[async_trait]
pub trait LockAdapter: Send + Sync {
	/// Try to take the lock. Returns `false` if it is currently held by
	/// another (unexpired) token.
	async fn acquire(&self, key: &str, token: &str, ttl: Duration) -> ScResult<bool>;

	/// Release the lock if `token` is the current holder. Returns whether
	/// the lock was actually released.
	async fn release(&self, key: &str, token: &str) -> ScResult<bool>;
}

// vim: ts=4
