//! Standalone screensync server with the bundled in-process adapters.
//!
//! Options come from the environment:
//!   LISTEN          listen address (default 0.0.0.0:8080)
//!   DATA_DIR        config file directory (default ./data)
//!   CACHE_TTL_SECS  default cache TTL (default 300)
//!   SCREENS         comma-separated default screen set
//!   RUST_LOG        tracing filter

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use screensync::{Adapters, AppOpts};
use screensync_cache_adapter_memory::{MemoryCacheAdapter, MemoryLockAdapter};
use screensync_types::error::ScResult;

fn opts_from_env() -> AppOpts {
	let mut opts = AppOpts::default();
	if let Ok(listen) = env::var("LISTEN") {
		opts.listen = listen.into();
	}
	if let Ok(data_dir) = env::var("DATA_DIR") {
		opts.data_dir = PathBuf::from(data_dir);
	}
	if let Ok(ttl) = env::var("CACHE_TTL_SECS") {
		match ttl.parse() {
			Ok(secs) => opts.cache_ttl_secs = secs,
			Err(_) => tracing::warn!("Ignoring bad CACHE_TTL_SECS: {}", ttl),
		}
	}
	if let Ok(screens) = env::var("SCREENS") {
		opts.default_screens = screens
			.split(',')
			.map(str::trim)
			.filter(|s| !s.is_empty())
			.map(str::to_string)
			.collect();
	}
	opts
}

#[tokio::main]
async fn main() -> ScResult<()> {
	tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.init();

	let adapters = Adapters {
		cache_adapter: Arc::new(MemoryCacheAdapter::new()),
		lock_adapter: Arc::new(MemoryLockAdapter::new()),
	};
	screensync::run(opts_from_env(), adapters).await
}

// vim: ts=4
