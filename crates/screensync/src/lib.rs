//! Screensync: configuration distribution and cache-consistency engine.
//!
//! Loads, validates, updates, invalidates, and broadcasts versioned screen
//! configuration documents across three storage tiers (shared cache,
//! authoritative file store, template generator), with a WebSocket channel
//! fanning every change out to connected subscribers.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod app;
pub mod cache;
pub mod extract;
pub mod handler;
pub mod prelude;
pub mod routes;
pub mod store;
pub mod watcher;
pub mod websocket;

use std::time::Duration;

use crate::prelude::*;

pub use app::{Adapters, App, AppOpts, AppState, build_app};
pub use store::{ConfigStore, Mutation};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Interval for the dead-subscriber sweep task
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Build the engine, start the file watcher and sweep task, and serve the
/// HTTP/WS surface until the listener shuts down.
pub async fn run(opts: AppOpts, adapters: Adapters) -> ScResult<()> {
	let listen = opts.listen.clone();
	let app = build_app(opts, adapters).await?;

	let _watcher = watcher::FileWatcher::spawn(app.clone())?;

	let sweep_app = app.clone();
	tokio::spawn(async move {
		let mut interval = tokio::time::interval(SWEEP_INTERVAL);
		loop {
			interval.tick().await;
			sweep_app.broadcaster.sweep().await;
		}
	});

	let router = routes::build_routes(app);
	let listener = tokio::net::TcpListener::bind(&*listen).await?;
	info!("Screensync v{} listening on {}", VERSION, listen);
	axum::serve(listener, router).await?;
	Ok(())
}

// vim: ts=4
