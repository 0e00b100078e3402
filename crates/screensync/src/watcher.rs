//! Config directory watcher
//!
//! Watches the data directory for edits to `<screen>.json` files and drives
//! invalidate -> reload -> broadcast, debounced per screen so a burst of
//! rapid saves causes one reload. Subdirectories (schemas, templates,
//! backups) are not watched.

use notify::{EventKind, RecursiveMode, Watcher};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use screensync_core::debounce::Debouncer;

use crate::prelude::*;

/// Quiet period before a changed screen is reloaded
const DEBOUNCE_QUIET: Duration = Duration::from_millis(500);

pub struct FileWatcher {
	// kept alive for the lifetime of the watcher; dropping it stops events
	_watcher: notify::RecommendedWatcher,
	event_task: JoinHandle<()>,
	reload_task: JoinHandle<()>,
}

impl FileWatcher {
	/// Start watching the app's data directory.
	pub fn spawn(app: App) -> ScResult<Self> {
		let (raw_tx, mut raw_rx) = mpsc::channel::<notify::Event>(256);

		// the notify callback runs on its own thread, blocking_send is safe there
		let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
			match result {
				Ok(event) => {
					let _ = raw_tx.blocking_send(event);
				}
				Err(err) => warn!("File watcher error: {}", err),
			}
		})
		.map_err(|err| Error::Internal(format!("file watcher init: {}", err)))?;

		watcher
			.watch(&app.opts.data_dir, RecursiveMode::NonRecursive)
			.map_err(|err| {
				Error::ConfigError(format!("cannot watch {}: {}", app.opts.data_dir.display(), err))
			})?;
		info!("Watching {} for config changes", app.opts.data_dir.display());

		let (debouncer, mut fire_rx) = Debouncer::new(DEBOUNCE_QUIET, 64);

		let event_task = tokio::spawn(async move {
			while let Some(event) = raw_rx.recv().await {
				if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
					continue;
				}
				for path in &event.paths {
					if let Some(screen) = screen_for_path(path) {
						debouncer.trigger(&screen);
					}
				}
			}
		});

		let reload_app = app.clone();
		let reload_task = tokio::spawn(async move {
			while let Some(screen) = fire_rx.recv().await {
				info!("File change for '{}', reloading", screen);
				reload_app.store.invalidate(&screen).await;
				match reload_app.store.reload(&screen).await {
					Ok(document) => {
						debug!("Reload of '{}' now at v{}", screen, document.version);
					}
					Err(Error::NotFound) => {
						debug!("'{}' removed from disk, keeping previous state", screen);
					}
					Err(err) => {
						warn!("Reload of '{}' failed, keeping previous state: {}", screen, err);
					}
				}
			}
		});

		Ok(Self { _watcher: watcher, event_task, reload_task })
	}
}

impl Drop for FileWatcher {
	fn drop(&mut self) {
		self.event_task.abort();
		self.reload_task.abort();
	}
}

/// Screen name for a changed path; only top-level `<screen>.json` files count.
fn screen_for_path(path: &Path) -> Option<String> {
	let name = path.file_name()?.to_str()?;
	let screen = name.strip_suffix(".json")?;
	if screen.is_empty() || screen.contains('.') {
		return None;
	}
	Some(screen.to_string())
}


// vim: ts=4
