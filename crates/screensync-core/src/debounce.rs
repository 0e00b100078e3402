//! Per-key debouncer
//!
//! Collapses bursts of events for the same key into a single firing after a
//! quiet period: arm on the first event, cancel and re-arm on every repeat,
//! fire once the key has been quiet long enough. The file watcher uses one
//! of these per screen so rapid successive saves cause a single reload.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::prelude::*;

struct PendingFire {
	generation: u64,
	handle: JoinHandle<()>,
}

pub struct Debouncer {
	quiet: Duration,
	generation: AtomicU64,
	pending: Arc<Mutex<HashMap<String, PendingFire>>>,
	tx: mpsc::Sender<String>,
}

impl Debouncer {
	/// Create a debouncer and the channel its firings are delivered on
	pub fn new(quiet: Duration, buffer: usize) -> (Self, mpsc::Receiver<String>) {
		let (tx, rx) = mpsc::channel(buffer);
		let debouncer = Self {
			quiet,
			generation: AtomicU64::new(0),
			pending: Arc::new(Mutex::new(HashMap::new())),
			tx,
		};
		(debouncer, rx)
	}

	/// Record an event for `key`, re-arming its quiet-period timer
	pub fn trigger(&self, key: &str) {
		let generation = self.generation.fetch_add(1, Ordering::Relaxed);
		let quiet = self.quiet;
		let tx = self.tx.clone();
		let pending = Arc::clone(&self.pending);
		let fire_key = key.to_string();

		let handle = tokio::spawn(async move {
			tokio::time::sleep(quiet).await;

			// Only the newest timer for this key may fire
			{
				let mut pending = pending.lock();
				match pending.get(&fire_key) {
					Some(fire) if fire.generation == generation => {
						pending.remove(&fire_key);
					}
					_ => return,
				}
			}

			if tx.send(fire_key).await.is_err() {
				debug!("Debounce receiver dropped, discarding firing");
			}
		});

		let mut pending = self.pending.lock();
		if let Some(previous) = pending.insert(key.to_string(), PendingFire { generation, handle }) {
			previous.handle.abort();
		}
	}

	/// Number of keys currently armed
	pub fn pending_len(&self) -> usize {
		self.pending.lock().len()
	}
}


// vim: ts=4
