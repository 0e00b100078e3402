//! Core infrastructure for the Screensync engine.
//!
//! This crate contains shared infrastructure that is independent of the
//! engine's HTTP/WS surface: the circuit breaker guarding external
//! dependencies, the per-key debouncer behind the file watcher, the
//! distributed lock serializing writers, and the subscriber broadcast
//! registry. Extracting these into a separate crate enables better build
//! parallelism and clearer module boundaries.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod breaker;
pub mod debounce;
pub mod lock;
pub mod prelude;
pub mod ws_broadcast;

pub use breaker::{BreakerConfig, BreakerRegistry, BreakerState, CircuitBreaker};
pub use debounce::Debouncer;
pub use lock::{DistributedLock, LockConfig, LockGuard};
pub use ws_broadcast::{Broadcaster, PublishOutcome, PushMessage};

// vim: ts=4
