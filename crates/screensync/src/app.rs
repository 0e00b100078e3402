//! App state type
//!
//! All mutable engine state (snapshot map, breaker states, lock table,
//! subscriber registry) hangs off one `AppState` instance with injected
//! adapters, so tests get fresh state per instance and nothing is an
//! ambient singleton.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use screensync_core::breaker::BreakerRegistry;
use screensync_core::lock::{DistributedLock, LockConfig};
use screensync_core::ws_broadcast::Broadcaster;
use screensync_types::cache_adapter::CacheAdapter;
use screensync_types::lock_adapter::LockAdapter;

use crate::cache::{CacheLayer, CacheTtl};
use crate::prelude::*;
use crate::store::{ConfigStore, StoreConfig};

#[derive(Debug, Clone)]
pub struct AppOpts {
	pub listen: Box<str>,
	/// Root of the durable file layout: `<screen>.json` plus the
	/// `schemas/`, `templates/` and `backups/` subdirectories
	pub data_dir: PathBuf,
	/// Screens assumed to exist when discovery finds nothing
	pub default_screens: Vec<String>,
	/// Default cache TTL; individual screens may override
	pub cache_ttl_secs: u64,
	/// Per-screen TTL overrides (screen name -> seconds)
	pub screen_ttl_overrides: Vec<(String, u64)>,
	/// Overall deadline for a single write operation
	pub write_timeout: Duration,
	/// Timestamped backups kept per screen
	pub backup_keep: usize,
}

impl Default for AppOpts {
	fn default() -> Self {
		Self {
			listen: "0.0.0.0:8080".into(),
			data_dir: PathBuf::from("./data"),
			default_screens: vec![
				"Home".to_string(),
				"Auth".to_string(),
				"Profile".to_string(),
				"Settings".to_string(),
			],
			cache_ttl_secs: 300,
			screen_ttl_overrides: Vec::new(),
			write_timeout: Duration::from_secs(10),
			backup_keep: 10,
		}
	}
}

/// Pluggable backends for the shared cache and the distributed lock
pub struct Adapters {
	pub cache_adapter: Arc<dyn CacheAdapter>,
	pub lock_adapter: Arc<dyn LockAdapter>,
}

pub struct AppState {
	pub opts: AppOpts,
	pub store: ConfigStore,
	pub broadcaster: Arc<Broadcaster>,
	pub breakers: Arc<BreakerRegistry>,
}

pub type App = Arc<AppState>;

/// Wire the engine together and preload every discovered screen.
pub async fn build_app(opts: AppOpts, adapters: Adapters) -> ScResult<App> {
	let breakers = Arc::new(BreakerRegistry::default());
	let broadcaster = Arc::new(Broadcaster::new());

	let ttl = CacheTtl::new(opts.cache_ttl_secs, opts.screen_ttl_overrides.iter().cloned());
	let cache = CacheLayer::new(adapters.cache_adapter, breakers.get("cache"), ttl);
	let lock = DistributedLock::new(adapters.lock_adapter, LockConfig::default());

	let store_config = StoreConfig {
		data_dir: opts.data_dir.clone(),
		default_screens: opts.default_screens.clone(),
		write_timeout: opts.write_timeout,
		backup_keep: opts.backup_keep,
	};
	let store = ConfigStore::new(
		store_config,
		cache,
		lock,
		Arc::clone(&broadcaster),
		Arc::clone(&breakers),
	)
	.await?;
	store.init().await;

	Ok(Arc::new(AppState { opts, store, broadcaster, breakers }))
}

// vim: ts=4
