//! End-to-end consistency behavior of the tiered store:
//! version monotonicity, the fallback chain, write serialization and
//! subscriber fan-out, all against a real temp directory and the bundled
//! in-process adapters.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, json};
use tempfile::TempDir;

use screensync::watcher::FileWatcher;
use screensync::{Adapters, App, AppOpts, Mutation, build_app};
use screensync_cache_adapter_memory::{MemoryCacheAdapter, MemoryLockAdapter};
use screensync_core::breaker::BreakerState;
use screensync_types::cache_adapter::CacheAdapter;
use screensync_types::error::{Error, ScResult};
use screensync_types::lock_adapter::LockAdapter;
use screensync_types::types::{CacheEntry, CacheStats, Source, UpdateContext, Version};

async fn test_app() -> (App, TempDir) {
	let dir = TempDir::new().unwrap();
	let opts = AppOpts {
		data_dir: dir.path().to_path_buf(),
		default_screens: vec!["Home".to_string(), "Auth".to_string()],
		write_timeout: Duration::from_secs(5),
		..AppOpts::default()
	};
	let adapters = Adapters {
		cache_adapter: Arc::new(MemoryCacheAdapter::new()),
		lock_adapter: Arc::new(MemoryLockAdapter::new()),
	};
	let app = build_app(opts, adapters).await.unwrap();
	(app, dir)
}

async fn seed_file(app: &App, screen: &str, content: serde_json::Value) {
	let mut document = content;
	document["version"] = json!("1.0.0");
	document["lastUpdated"] = json!(1700000000);
	document["_metadata"] = json!({ "source": "file", "loadedAt": 1700000000 });
	tokio::fs::write(
		app.opts.data_dir.join(format!("{}.json", screen)),
		serde_json::to_vec_pretty(&document).unwrap(),
	)
	.await
	.unwrap();
}

fn set(key: &str, value: serde_json::Value) -> Mutation {
	Mutation::Set { key: key.to_string(), value }
}

fn ctx() -> UpdateContext {
	UpdateContext {
		user_id: "tester".to_string(),
		role: "admin".to_string(),
		source: "api".to_string(),
	}
}

#[tokio::test]
async fn write_bumps_version_and_broadcasts() {
	let (app, _dir) = test_app().await;
	seed_file(&app, "Home", json!({ "backgroundColor": "#000000" })).await;

	let mut rx = app.broadcaster.register("conn-1").await;

	let written = app
		.store
		.write("Home", set("backgroundColor", json!("#ffffff")), ctx())
		.await
		.unwrap();

	assert_eq!(written.version.to_string(), "1.0.1");
	assert_eq!(written.content["backgroundColor"], json!("#ffffff"));
	assert_eq!(written.meta.modified_by.as_deref(), Some("tester"));

	let push = rx.recv().await.unwrap();
	assert_eq!(push.screen, "Home");
	assert_eq!(push.document.version.to_string(), "1.0.1");
	assert!(!push.update_id.is_empty());
}

#[tokio::test]
async fn load_after_write_returns_new_version() {
	let (app, _dir) = test_app().await;
	seed_file(&app, "Home", json!({ "title": "old" })).await;

	app.store.write("Home", set("title", json!("new")), ctx()).await.unwrap();

	let loaded = app.store.load("Home").await.unwrap();
	assert_eq!(loaded.version.to_string(), "1.0.1");
	assert_eq!(loaded.content["title"], json!("new"));
}

#[tokio::test]
async fn versions_strictly_increase() {
	let (app, _dir) = test_app().await;
	seed_file(&app, "Home", json!({})).await;

	let mut previous = Version::initial();
	for i in 0..5 {
		let written = app.store.write("Home", set("i", json!(i)), ctx()).await.unwrap();
		assert!(written.version > previous);
		previous = written.version;
	}
	assert_eq!(previous.to_string(), "1.0.5");
}

#[tokio::test]
async fn concurrent_writers_serialize() {
	let (app, _dir) = test_app().await;
	seed_file(&app, "Home", json!({})).await;

	let app_a = app.clone();
	let app_b = app.clone();
	let a = tokio::spawn(async move {
		app_a.store.write("Home", set("a", json!(1)), ctx()).await
	});
	let b = tokio::spawn(async move {
		app_b.store.write("Home", set("b", json!(2)), ctx()).await
	});

	let mut versions = vec![
		a.await.unwrap().unwrap().version.to_string(),
		b.await.unwrap().unwrap().version.to_string(),
	];
	versions.sort();
	assert_eq!(versions, vec!["1.0.1", "1.0.2"]);

	// the final document carries both writes
	let merged = app.store.load("Home").await.unwrap();
	assert_eq!(merged.content["a"], json!(1));
	assert_eq!(merged.content["b"], json!(2));
}

#[tokio::test]
async fn reserved_key_write_rejected() {
	let (app, _dir) = test_app().await;
	seed_file(&app, "Home", json!({})).await;

	for key in ["_metadata", "version", "lastUpdated"] {
		let result = app.store.write("Home", set(key, json!("x")), ctx()).await;
		assert!(matches!(result, Err(Error::ValidationError(_))), "key {} accepted", key);
	}

	// nothing committed
	assert_eq!(app.store.load("Home").await.unwrap().version.to_string(), "1.0.0");
}

#[tokio::test]
async fn oversized_string_rejected() {
	let (app, _dir) = test_app().await;
	seed_file(&app, "Home", json!({})).await;

	let long = "x".repeat(10_001);
	let result = app.store.write("Home", set("blob", json!(long)), ctx()).await;
	assert!(matches!(result, Err(Error::ValidationError(_))));
}

#[tokio::test]
async fn reload_is_idempotent() {
	let (app, _dir) = test_app().await;
	seed_file(&app, "Auth", json!({ "title": "Sign in" })).await;

	let first = app.store.reload("Auth").await.unwrap();
	let second = app.store.reload("Auth").await.unwrap();

	assert_eq!(first.version, second.version);
	assert_eq!(first.content, second.content);
}

#[tokio::test]
async fn reload_of_malformed_file_keeps_previous_state() {
	let (app, _dir) = test_app().await;
	seed_file(&app, "Auth", json!({ "title": "Sign in" })).await;
	app.store.reload("Auth").await.unwrap();

	tokio::fs::write(app.opts.data_dir.join("Auth.json"), b"{ broken").await.unwrap();
	assert!(app.store.reload("Auth").await.is_err());

	// previous snapshot still served
	let documents = app.store.documents().await;
	assert_eq!(documents["Auth"].content["title"], json!("Sign in"));
}

#[tokio::test]
async fn template_seeds_file_tier() {
	let (app, _dir) = test_app().await;
	tokio::fs::write(
		app.opts.data_dir.join("templates/Promo.template.json"),
		br#"{ "banner": "hello" }"#,
	)
	.await
	.unwrap();

	let loaded = app.store.load("Promo").await.unwrap();
	assert_eq!(loaded.meta.source, Source::Template);
	assert_eq!(loaded.version, Version::initial());
	assert_eq!(loaded.content["banner"], json!("hello"));

	// the generated document was persisted as the new authoritative file
	let raw = tokio::fs::read_to_string(app.opts.data_dir.join("Promo.json")).await.unwrap();
	let on_disk: serde_json::Value = serde_json::from_str(&raw).unwrap();
	assert_eq!(on_disk["banner"], json!("hello"));
}

#[tokio::test]
async fn minimal_fallback_when_all_tiers_empty() {
	let (app, _dir) = test_app().await;

	// "Home" is a known default screen with no file, template or cache entry
	let loaded = app.store.load("Home").await.unwrap();
	assert_eq!(loaded.meta.source, Source::MinimalFallback);
	assert_eq!(loaded.content["title"], json!("Home"));

	// never persisted
	assert!(!app.opts.data_dir.join("Home.json").exists());
}

#[tokio::test]
async fn unknown_screen_is_not_found() {
	let (app, _dir) = test_app().await;
	let result = app.store.load("Nonexistent").await;
	assert!(matches!(result, Err(Error::NotFound)));
}

#[tokio::test]
async fn open_cache_breaker_degrades_to_file() {
	let (app, _dir) = test_app().await;
	seed_file(&app, "Auth", json!({ "title": "Sign in" })).await;

	// warm the cache, then take the cache dependency down
	app.store.load("Auth").await.unwrap();
	app.breakers.get("cache").force_open();

	let loaded = app.store.load("Auth").await.unwrap();
	assert_eq!(loaded.meta.source, Source::File);
	assert_eq!(loaded.content["title"], json!("Sign in"));
}

#[tokio::test]
async fn cached_load_reports_cache_source() {
	let (app, _dir) = test_app().await;
	seed_file(&app, "Auth", json!({ "title": "Sign in" })).await;

	let first = app.store.load("Auth").await.unwrap();
	assert_eq!(first.meta.source, Source::File);

	let second = app.store.load("Auth").await.unwrap();
	assert_eq!(second.meta.source, Source::Cache);
	assert_eq!(second.version, first.version);
}

#[tokio::test]
async fn schema_rejects_invalid_write() {
	let dir = TempDir::new().unwrap();
	tokio::fs::create_dir_all(dir.path().join("schemas")).await.unwrap();
	tokio::fs::write(
		dir.path().join("schemas/Strict.schema.json"),
		serde_json::to_vec(&json!({
			"type": "object",
			"properties": { "count": { "type": "integer" } }
		}))
		.unwrap(),
	)
	.await
	.unwrap();

	let opts = AppOpts {
		data_dir: dir.path().to_path_buf(),
		default_screens: vec!["Strict".to_string()],
		..AppOpts::default()
	};
	let adapters = Adapters {
		cache_adapter: Arc::new(MemoryCacheAdapter::new()),
		lock_adapter: Arc::new(MemoryLockAdapter::new()),
	};
	let app = build_app(opts, adapters).await.unwrap();

	let ok = app.store.write("Strict", set("count", json!(3)), ctx()).await;
	assert!(ok.is_ok());

	let bad = app.store.write("Strict", set("count", json!("three")), ctx()).await;
	assert!(matches!(bad, Err(Error::ValidationError(_))));
}

#[tokio::test]
async fn backups_written_and_pruned() {
	let dir = TempDir::new().unwrap();
	let opts = AppOpts {
		data_dir: dir.path().to_path_buf(),
		default_screens: vec!["Home".to_string()],
		backup_keep: 2,
		..AppOpts::default()
	};
	let adapters = Adapters {
		cache_adapter: Arc::new(MemoryCacheAdapter::new()),
		lock_adapter: Arc::new(MemoryLockAdapter::new()),
	};
	let app = build_app(opts, adapters).await.unwrap();
	seed_file(&app, "Home", json!({})).await;

	for i in 0..4 {
		app.store.write("Home", set("i", json!(i)), ctx()).await.unwrap();
		// backup names are second-granular
		tokio::time::sleep(Duration::from_millis(1100)).await;
	}

	let mut backups = 0;
	let mut entries = tokio::fs::read_dir(app.opts.data_dir.join("backups")).await.unwrap();
	while let Some(entry) = entries.next_entry().await.unwrap() {
		if entry.file_name().to_string_lossy().starts_with("Home.") {
			backups += 1;
		}
	}
	assert_eq!(backups, 2);
}

#[tokio::test]
async fn cache_clear_forces_file_read() {
	let (app, _dir) = test_app().await;
	seed_file(&app, "Auth", json!({ "title": "Sign in" })).await;

	app.store.load("Auth").await.unwrap();
	assert!(app.store.invalidate("Auth").await);

	let reloaded = app.store.load("Auth").await.unwrap();
	assert_eq!(reloaded.meta.source, Source::File);
}

/// Cache whose writes stall, to push a write past its deadline while the
/// screen lock is held
struct StallingCacheAdapter {
	inner: MemoryCacheAdapter,
	set_delay: Duration,
}

#[async_trait]
impl CacheAdapter for StallingCacheAdapter {
	async fn get(&self, key: &str) -> ScResult<Option<CacheEntry>> {
		self.inner.get(key).await
	}

	async fn set(&self, key: &str, entry: CacheEntry) -> ScResult<()> {
		tokio::time::sleep(self.set_delay).await;
		self.inner.set(key, entry).await
	}

	async fn invalidate(&self, key: &str) -> ScResult<bool> {
		self.inner.invalidate(key).await
	}

	async fn invalidate_all(&self) -> ScResult<usize> {
		self.inner.invalidate_all().await
	}

	async fn stats(&self) -> ScResult<CacheStats> {
		self.inner.stats().await
	}
}

#[tokio::test]
async fn timed_out_write_surfaces_and_releases_lock() {
	let dir = TempDir::new().unwrap();
	let lock_adapter = Arc::new(MemoryLockAdapter::new());
	let opts = AppOpts {
		data_dir: dir.path().to_path_buf(),
		default_screens: vec!["Home".to_string()],
		write_timeout: Duration::from_millis(50),
		..AppOpts::default()
	};
	let adapters = Adapters {
		cache_adapter: Arc::new(StallingCacheAdapter {
			inner: MemoryCacheAdapter::new(),
			set_delay: Duration::from_millis(500),
		}),
		lock_adapter: Arc::clone(&lock_adapter) as Arc<dyn LockAdapter>,
	};
	let app = build_app(opts, adapters).await.unwrap();
	seed_file(&app, "Home", json!({})).await;

	let result = app.store.write("Home", set("a", json!(1)), ctx()).await;
	assert!(matches!(result, Err(Error::OperationTimeout(_))));

	// the cancelled critical section must not leave the screen lock held
	tokio::time::sleep(Duration::from_millis(100)).await;
	assert!(
		lock_adapter.acquire("screen:Home", "next-writer", Duration::from_secs(5)).await.unwrap(),
		"lock leaked after cancelled write"
	);
}

#[tokio::test]
async fn failed_deliveries_trip_transport_breaker() {
	let (app, _dir) = test_app().await;
	seed_file(&app, "Home", json!({})).await;

	// five consecutive publishes into closed subscriber channels
	for i in 0..5 {
		let rx = app.broadcaster.register(&format!("conn-{}", i)).await;
		drop(rx);
		app.store.write("Home", set("i", json!(i)), ctx()).await.unwrap();
	}

	let snapshot = app.breakers.get("transport").snapshot();
	assert_eq!(snapshot.state, BreakerState::Open);
	assert!(snapshot.failure_count >= 5);

	// broadcast degradation never fails the write itself
	let written = app.store.write("Home", set("after", json!(true)), ctx()).await.unwrap();
	assert_eq!(written.version.to_string(), "1.0.6");
}

#[tokio::test]
async fn unchanged_reload_does_not_rebroadcast() {
	let (app, _dir) = test_app().await;
	seed_file(&app, "Auth", json!({ "title": "Sign in" })).await;

	let mut rx = app.broadcaster.register("conn-1").await;

	app.store.reload("Auth").await.unwrap();
	assert_eq!(rx.recv().await.unwrap().screen, "Auth");

	// same file, same version: no second push
	app.store.reload("Auth").await.unwrap();
	let extra = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
	assert!(extra.is_err());
}

#[tokio::test]
async fn watcher_reloads_edited_file_and_broadcasts() {
	let (app, _dir) = test_app().await;
	seed_file(&app, "Auth", json!({ "title": "old" })).await;
	app.store.load("Auth").await.unwrap();

	let _watcher = FileWatcher::spawn(app.clone()).unwrap();
	// give the watcher time to arm before editing
	tokio::time::sleep(Duration::from_millis(200)).await;

	let mut rx = app.broadcaster.register("conn-1").await;

	let edited = json!({
		"version": "1.1.0",
		"lastUpdated": 1700000100,
		"_metadata": { "source": "file", "loadedAt": 1700000100 },
		"title": "new"
	});
	tokio::fs::write(
		app.opts.data_dir.join("Auth.json"),
		serde_json::to_vec_pretty(&edited).unwrap(),
	)
	.await
	.unwrap();

	// edit -> debounce -> reload -> broadcast
	let push = tokio::time::timeout(Duration::from_secs(5), rx.recv())
		.await
		.expect("no broadcast after file edit")
		.unwrap();
	assert_eq!(push.screen, "Auth");
	assert_eq!(push.document.version.to_string(), "1.1.0");
	assert_eq!(push.document.content["title"], json!("new"));

	let loaded = app.store.load("Auth").await.unwrap();
	assert_eq!(loaded.version.to_string(), "1.1.0");
}

#[tokio::test]
async fn mutation_merge_applies_all_keys() {
	let (app, _dir) = test_app().await;
	seed_file(&app, "Home", json!({ "keep": true })).await;

	let mut updates = Map::new();
	updates.insert("theme".to_string(), json!("dark"));
	updates.insert("fontSize".to_string(), json!(14));
	let written = app
		.store
		.write("Home", Mutation::Merge { updates }, ctx())
		.await
		.unwrap();

	assert_eq!(written.content["keep"], json!(true));
	assert_eq!(written.content["theme"], json!("dark"));
	assert_eq!(written.content["fontSize"], json!(14));
	assert_eq!(written.version.to_string(), "1.0.1");
}
