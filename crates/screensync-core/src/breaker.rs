//! Circuit breaker for external dependencies
//!
//! Each external dependency (`cache`, `filesystem`, `transport`) gets a
//! named breaker. A breaker is CLOSED in normal operation; after
//! `failure_threshold` consecutive failures it OPENs and rejects calls
//! without attempting I/O until the cool-down elapses, then a HALF_OPEN
//! probe decides whether to close again or reopen with a fresh cool-down.
//!
//! Every guarded call also carries its own timeout, independent of the
//! breaker's cool-down window. Rejections and timeouts surface as
//! `Error::DependencyUnavailable(name)` so callers on the read path can
//! treat them exactly like a miss and degrade to the next tier.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::prelude::*;

#[derive(Debug, Clone)]
pub struct BreakerConfig {
	/// Consecutive failures before the breaker opens
	pub failure_threshold: u32,
	/// How long an open breaker waits before allowing a half-open probe
	pub cooldown: Duration,
	/// Per-call timeout, independent of the cool-down
	pub call_timeout: Duration,
}

impl Default for BreakerConfig {
	fn default() -> Self {
		Self {
			failure_threshold: 5,
			cooldown: Duration::from_secs(30),
			call_timeout: Duration::from_secs(10),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakerState {
	Closed,
	Open,
	HalfOpen,
}

impl std::fmt::Display for BreakerState {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			BreakerState::Closed => write!(f, "closed"),
			BreakerState::Open => write!(f, "open"),
			BreakerState::HalfOpen => write!(f, "half-open"),
		}
	}
}

#[derive(Debug)]
struct BreakerInner {
	state: BreakerState,
	failure_count: u32,
	last_failure: Option<Instant>,
	next_attempt: Option<Instant>,
}

/// Point-in-time view of a breaker, for the cache status surface
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSnapshot {
	pub name: &'static str,
	pub state: BreakerState,
	pub failure_count: u32,
	/// Seconds until the next half-open probe is allowed, when open
	#[serde(skip_serializing_if = "Option::is_none")]
	pub retry_in_secs: Option<u64>,
}

pub struct CircuitBreaker {
	name: &'static str,
	config: BreakerConfig,
	inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
	pub fn new(name: &'static str, config: BreakerConfig) -> Self {
		Self {
			name,
			config,
			inner: Mutex::new(BreakerInner {
				state: BreakerState::Closed,
				failure_count: 0,
				last_failure: None,
				next_attempt: None,
			}),
		}
	}

	pub fn name(&self) -> &'static str {
		self.name
	}

	/// Execute an operation through the breaker.
	///
	/// Fails fast with `DependencyUnavailable` when the breaker is open;
	/// a call that outlives `call_timeout` counts as a failure.
	pub async fn call<F, Fut, T>(&self, operation: F) -> ScResult<T>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = ScResult<T>>,
	{
		if !self.allow_request() {
			return Err(Error::DependencyUnavailable(self.name));
		}

		match tokio::time::timeout(self.config.call_timeout, operation()).await {
			Ok(Ok(value)) => {
				self.on_success();
				Ok(value)
			}
			Ok(Err(err)) => {
				self.on_failure();
				Err(err)
			}
			Err(_) => {
				self.on_failure();
				warn!("Breaker '{}': call timed out", self.name);
				Err(Error::DependencyUnavailable(self.name))
			}
		}
	}

	pub fn state(&self) -> BreakerState {
		self.inner.lock().state
	}

	pub fn snapshot(&self) -> BreakerSnapshot {
		let inner = self.inner.lock();
		let retry_in_secs = match inner.state {
			BreakerState::Open => inner
				.next_attempt
				.map(|at| at.saturating_duration_since(Instant::now()).as_secs()),
			_ => None,
		};
		BreakerSnapshot {
			name: self.name,
			state: inner.state,
			failure_count: inner.failure_count,
			retry_in_secs,
		}
	}

	/// Force the breaker open (used by tests and operational tooling)
	pub fn force_open(&self) {
		let mut inner = self.inner.lock();
		inner.state = BreakerState::Open;
		inner.next_attempt = Some(Instant::now() + self.config.cooldown);
	}

	fn allow_request(&self) -> bool {
		let mut inner = self.inner.lock();
		match inner.state {
			BreakerState::Closed | BreakerState::HalfOpen => true,
			BreakerState::Open => {
				let due = inner.next_attempt.is_some_and(|at| Instant::now() >= at);
				if due {
					inner.state = BreakerState::HalfOpen;
					info!("Breaker '{}' half-open, probing", self.name);
				}
				due
			}
		}
	}

	fn on_success(&self) {
		let mut inner = self.inner.lock();
		if inner.state == BreakerState::HalfOpen {
			info!("Breaker '{}' closing after successful probe", self.name);
		}
		inner.state = BreakerState::Closed;
		inner.failure_count = 0;
		inner.last_failure = None;
		inner.next_attempt = None;
	}

	fn on_failure(&self) {
		let mut inner = self.inner.lock();
		inner.failure_count += 1;
		inner.last_failure = Some(Instant::now());

		let reopen = inner.state == BreakerState::HalfOpen;
		if reopen || inner.failure_count >= self.config.failure_threshold {
			if inner.state != BreakerState::Open {
				warn!(
					"Breaker '{}' opening after {} consecutive failures",
					self.name, inner.failure_count
				);
			}
			inner.state = BreakerState::Open;
			inner.next_attempt = Some(Instant::now() + self.config.cooldown);
		}
	}
}

/// Named breakers for the engine's external dependencies
pub struct BreakerRegistry {
	config: BreakerConfig,
	breakers: parking_lot::RwLock<HashMap<&'static str, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
	pub fn new(config: BreakerConfig) -> Self {
		Self { config, breakers: parking_lot::RwLock::new(HashMap::new()) }
	}

	/// Get the breaker for a dependency, creating it on first use
	pub fn get(&self, name: &'static str) -> Arc<CircuitBreaker> {
		if let Some(breaker) = self.breakers.read().get(name) {
			return Arc::clone(breaker);
		}
		let mut breakers = self.breakers.write();
		Arc::clone(
			breakers
				.entry(name)
				.or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.config.clone()))),
		)
	}

	pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
		let mut snapshots: Vec<_> =
			self.breakers.read().values().map(|b| b.snapshot()).collect();
		snapshots.sort_by_key(|s| s.name);
		snapshots
	}
}

impl Default for BreakerRegistry {
	fn default() -> Self {
		Self::new(BreakerConfig::default())
	}
}


// vim: ts=4
