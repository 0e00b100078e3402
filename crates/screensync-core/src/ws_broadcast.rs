//! Subscriber broadcast registry
//!
//! Tracks connected WebSocket subscribers and fans updated documents out to
//! all of them. Each subscriber gets its own bounded, ordered channel, so a
//! single subscriber sees pushes in publish order; delivery across
//! subscribers is best-effort parallel fan-out. Delivery is fire-and-forget:
//! a full resync on reconnect is the correctness backstop.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, mpsc};

use screensync_types::types::ConfigDocument;
use screensync_types::utils::random_id;

use crate::prelude::*;

/// An update push, tagged for client-side deduplication and ordering
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
	pub screen: String,
	pub document: ConfigDocument,
	pub update_id: String,
	pub timestamp: Timestamp,
}

impl PushMessage {
	pub fn new(screen: impl Into<String>, document: ConfigDocument) -> Self {
		Self {
			screen: screen.into(),
			document,
			update_id: random_id(),
			timestamp: Timestamp::now(),
		}
	}
}

/// A connected subscriber; owned by the broadcaster, never persisted
#[derive(Debug)]
struct Subscriber {
	connected_at: Timestamp,
	last_activity: Timestamp,
	sender: mpsc::Sender<PushMessage>,
}

/// Registry statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastStats {
	pub connections: usize,
	pub sync_counter: u64,
}

/// Delivery accounting for one publish call.
///
/// `dropped` counts lagging subscribers whose buffer was full (they resync
/// on reconnect); `failed` counts subscribers whose channel was closed, the
/// signal the transport dependency is degraded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOutcome {
	pub delivered: usize,
	pub dropped: usize,
	pub failed: usize,
}

/// Configuration
#[derive(Clone, Debug)]
pub struct BroadcastConfig {
	/// Maximum number of pushes to buffer per subscriber
	pub buffer_size: usize,
}

impl Default for BroadcastConfig {
	fn default() -> Self {
		Self { buffer_size: 128 }
	}
}

pub struct Broadcaster {
	subscribers: RwLock<HashMap<String, Subscriber>>,
	sync_counter: AtomicU64,
	config: BroadcastConfig,
}

impl Broadcaster {
	pub fn new() -> Self {
		Self::with_config(BroadcastConfig::default())
	}

	pub fn with_config(config: BroadcastConfig) -> Self {
		Self {
			subscribers: RwLock::new(HashMap::new()),
			sync_counter: AtomicU64::new(0),
			config,
		}
	}

	/// Register a subscriber connection.
	///
	/// Returns the receiver its pushes are delivered on, in publish order.
	pub async fn register(&self, connection_id: &str) -> mpsc::Receiver<PushMessage> {
		let (sender, receiver) = mpsc::channel(self.config.buffer_size);
		let now = Timestamp::now();
		let subscriber = Subscriber { connected_at: now, last_activity: now, sender };

		self.subscribers.write().await.insert(connection_id.to_string(), subscriber);
		debug!("Subscriber registered: {}", connection_id);
		receiver
	}

	/// Remove a subscriber connection
	pub async fn unregister(&self, connection_id: &str) {
		self.subscribers.write().await.remove(connection_id);
		debug!("Subscriber unregistered: {}", connection_id);
	}

	/// Fan an updated document out to every subscriber.
	///
	/// Returns the delivery outcome. Slow subscribers whose buffer is full
	/// miss the push (they resync on reconnect); closed subscribers count as
	/// failed deliveries and are pruned.
	pub async fn publish(&self, screen: &str, document: ConfigDocument) -> PublishOutcome {
		let message = PushMessage::new(screen, document);
		let mut outcome = PublishOutcome::default();
		let mut dead = Vec::new();

		{
			let subscribers = self.subscribers.read().await;
			for (connection_id, subscriber) in subscribers.iter() {
				match subscriber.sender.try_send(message.clone()) {
					Ok(()) => outcome.delivered += 1,
					Err(mpsc::error::TrySendError::Full(_)) => {
						warn!("Subscriber {} lagging, dropping push for '{}'", connection_id, screen);
						outcome.dropped += 1;
					}
					Err(mpsc::error::TrySendError::Closed(_)) => {
						outcome.failed += 1;
						dead.push(connection_id.clone());
					}
				}
			}
		}

		if !dead.is_empty() {
			let mut subscribers = self.subscribers.write().await;
			for connection_id in dead {
				subscribers.remove(&connection_id);
				debug!("Pruned dead subscriber: {}", connection_id);
			}
		}

		debug!(
			"Published '{}' v{} to {} subscribers ({} dropped, {} failed)",
			screen, message.document.version, outcome.delivered, outcome.dropped, outcome.failed
		);
		outcome
	}

	/// Record subscriber liveness (heartbeat or client message)
	pub async fn touch(&self, connection_id: &str) {
		if let Some(subscriber) = self.subscribers.write().await.get_mut(connection_id) {
			subscriber.last_activity = Timestamp::now();
		}
	}

	/// Next monotonic full-sync identifier
	pub fn next_sync_id(&self) -> u64 {
		self.sync_counter.fetch_add(1, Ordering::Relaxed) + 1
	}

	pub async fn stats(&self) -> BroadcastStats {
		BroadcastStats {
			connections: self.subscribers.read().await.len(),
			sync_counter: self.sync_counter.load(Ordering::Relaxed),
		}
	}

	/// Drop subscribers whose receiving side has gone away
	pub async fn sweep(&self) -> usize {
		let mut subscribers = self.subscribers.write().await;
		let before = subscribers.len();
		subscribers.retain(|_, subscriber| !subscriber.sender.is_closed());
		let removed = before - subscribers.len();
		if removed > 0 {
			info!("Swept {} dead subscribers", removed);
		}
		removed
	}

	/// Age of a connection, for diagnostics
	pub async fn connected_at(&self, connection_id: &str) -> Option<Timestamp> {
		self.subscribers.read().await.get(connection_id).map(|s| s.connected_at)
	}
}

impl Default for Broadcaster {
	fn default() -> Self {
		Self::new()
	}
}


// vim: ts=4
