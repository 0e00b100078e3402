//! Tiered configuration store
//!
//! The authoritative state of every screen lives in `<data_dir>/<screen>.json`.
//! Reads walk shared cache -> file -> template -> built-in minimal document
//! and write results back into the tiers they bypassed; writes go through the
//! per-screen distributed lock, validate against the screen schema, bump the
//! version, back the previous file up, persist, refresh the cache and fan the
//! new document out to subscribers.
//!
//! Tier-local failures degrade: an open cache breaker is a miss, a failed
//! backup is a warning. Filesystem failures are fatal for writes only.

mod schema;
mod template;

pub use schema::SchemaSet;
pub use template::minimal_document;

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use screensync_core::breaker::{BreakerRegistry, CircuitBreaker};
use screensync_core::lock::DistributedLock;
use screensync_core::ws_broadcast::Broadcaster;
use screensync_types::types::{
	DocumentMeta, MAX_STRING_VALUE_LEN, Source, UpdateContext, is_reserved_key,
};

use crate::cache::{CacheLayer, CacheStatus};
use crate::prelude::*;

/// A change applied to a screen's content under the write lock
#[derive(Debug, Clone)]
pub enum Mutation {
	Set { key: String, value: Value },
	Merge { updates: Map<String, Value> },
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
	pub data_dir: PathBuf,
	pub default_screens: Vec<String>,
	pub write_timeout: Duration,
	pub backup_keep: usize,
}

pub struct ConfigStore {
	config: StoreConfig,
	cache: CacheLayer,
	lock: DistributedLock,
	broadcaster: Arc<Broadcaster>,
	schemas: SchemaSet,
	fs_breaker: Arc<CircuitBreaker>,
	transport_breaker: Arc<CircuitBreaker>,
	/// Last known-good document per screen; concurrent readers, no ambient state
	snapshots: RwLock<HashMap<String, ConfigDocument>>,
	known_screens: RwLock<BTreeSet<String>>,
}

impl ConfigStore {
	pub async fn new(
		config: StoreConfig,
		cache: CacheLayer,
		lock: DistributedLock,
		broadcaster: Arc<Broadcaster>,
		breakers: Arc<BreakerRegistry>,
	) -> ScResult<Self> {
		for dir in [
			config.data_dir.clone(),
			config.data_dir.join("schemas"),
			config.data_dir.join("templates"),
			config.data_dir.join("backups"),
		] {
			tokio::fs::create_dir_all(&dir).await?;
		}

		let schemas = SchemaSet::load(&config.data_dir.join("schemas")).await?;

		Ok(Self {
			config,
			cache,
			lock,
			broadcaster,
			schemas,
			fs_breaker: breakers.get("filesystem"),
			transport_breaker: breakers.get("transport"),
			snapshots: RwLock::new(HashMap::new()),
			known_screens: RwLock::new(BTreeSet::new()),
		})
	}

	/// Discover all screens and preload each one; failures are logged, not fatal.
	pub async fn init(&self) {
		let screens = self.discover_screens().await;
		self.known_screens.write().await.extend(screens.iter().cloned());

		for screen in &screens {
			if let Err(err) = self.load(screen).await {
				warn!("Preload of '{}' failed: {}", screen, err);
			}
		}
		info!("Store initialized with {} screens", screens.len());
	}

	/// Union of the file, schema and template inventories; the configured
	/// default set when discovery yields nothing.
	pub async fn discover_screens(&self) -> Vec<String> {
		let mut screens = BTreeSet::new();

		if let Ok(mut entries) = tokio::fs::read_dir(&self.config.data_dir).await {
			while let Ok(Some(entry)) = entries.next_entry().await {
				if let Some(name) = entry.file_name().to_str() {
					if let Some(screen) = name.strip_suffix(".json") {
						screens.insert(screen.to_string());
					}
				}
			}
		}
		for screen in self.schemas.screens() {
			screens.insert(screen.to_string());
		}
		if let Ok(mut entries) = tokio::fs::read_dir(self.templates_dir()).await {
			while let Ok(Some(entry)) = entries.next_entry().await {
				if let Some(name) = entry.file_name().to_str() {
					if let Some(screen) = name.strip_suffix(".template.json") {
						screens.insert(screen.to_string());
					}
				}
			}
		}

		if screens.is_empty() {
			debug!("Discovery found nothing, using default screen set");
			self.config.default_screens.clone()
		} else {
			screens.into_iter().collect()
		}
	}

	pub async fn screens(&self) -> Vec<String> {
		self.known_screens.read().await.iter().cloned().collect()
	}

	/// All currently resident documents, keyed by screen
	pub async fn documents(&self) -> BTreeMap<String, ConfigDocument> {
		self.snapshots
			.read()
			.await
			.iter()
			.map(|(screen, document)| (screen.clone(), document.clone()))
			.collect()
	}

	/// Load a screen's document, walking cache -> file -> template -> minimal.
	pub async fn load(&self, screen: &str) -> ScResult<ConfigDocument> {
		validate_screen_name(screen)?;

		if let Some(document) = self.cache.get(screen).await {
			if self.is_stale(screen, &document).await {
				debug!("Cache copy of '{}' is stale (v{}), walking on", screen, document.version);
			} else if let Err(err) = self.schemas.validate(screen, &document) {
				warn!("Cache copy of '{}' fails schema, walking on: {}", screen, err);
			} else {
				return Ok(document.retag(Source::Cache));
			}
		}

		match self.read_file(screen).await {
			Ok(Some(document)) => match self.schemas.validate(screen, &document) {
				Ok(()) => {
					let document = document.retag(Source::File);
					self.remember(document.clone()).await;
					self.cache.set(screen, &document).await;
					return Ok(document);
				}
				Err(err) => {
					warn!("Stored file for '{}' fails schema, walking on: {}", screen, err);
				}
			},
			Ok(None) => {}
			Err(err) => {
				warn!("File tier unavailable for '{}': {}", screen, err);
				// serve the last known-good copy while the filesystem is down
				if let Some(snapshot) = self.snapshot(screen).await {
					return Ok(snapshot);
				}
			}
		}

		if let Some(content) = template::load_template(&self.templates_dir(), screen).await {
			let document = template::document_from_template(screen, content);
			match self.schemas.validate(screen, &document) {
				Ok(()) => {
					// seed the file tier so the next load is authoritative
					if let Err(err) = self.persist(&document).await {
						warn!("Could not persist template-derived '{}': {}", screen, err);
					}
					self.remember(document.clone()).await;
					self.cache.set(screen, &document).await;
					info!("Generated '{}' v{} from template", screen, document.version);
					return Ok(document);
				}
				Err(err) => {
					warn!("Template for '{}' fails schema, walking on: {}", screen, err);
				}
			}
		}

		if !self.is_known(screen).await {
			return Err(Error::NotFound);
		}

		// memory-only; never persisted or cached
		warn!("All tiers failed for '{}', serving minimal document", screen);
		let document = template::minimal_document(screen);
		self.remember(document.clone()).await;
		Ok(document)
	}

	/// Apply a mutation to a screen under its distributed lock.
	///
	/// The whole operation runs under the configured write deadline.
	pub async fn write(
		&self,
		screen: &str,
		mutation: Mutation,
		ctx: UpdateContext,
	) -> ScResult<ConfigDocument> {
		validate_screen_name(screen)?;
		validate_mutation(&mutation)?;

		match tokio::time::timeout(
			self.config.write_timeout,
			self.write_locked(screen, mutation, ctx),
		)
		.await
		{
			Ok(result) => result,
			Err(_) => Err(Error::OperationTimeout(format!(
				"write to '{}' exceeded {}s",
				screen,
				self.config.write_timeout.as_secs()
			))),
		}
	}

	async fn write_locked(
		&self,
		screen: &str,
		mutation: Mutation,
		ctx: UpdateContext,
	) -> ScResult<ConfigDocument> {
		let guard = self.lock.lock(&format!("screen:{}", screen)).await?;
		let result = self.apply_write(screen, mutation, &ctx).await;
		if let Err(err) = guard.release().await {
			warn!("Releasing write lock for '{}' failed: {}", screen, err);
		}
		result
	}

	async fn apply_write(
		&self,
		screen: &str,
		mutation: Mutation,
		ctx: &UpdateContext,
	) -> ScResult<ConfigDocument> {
		// the write base is always the authoritative tier, never the cache
		let base = match self.read_file(screen).await? {
			Some(document) => document,
			None => match template::load_template(&self.templates_dir(), screen).await {
				Some(content) => template::document_from_template(screen, content),
				None if self.is_known(screen).await => template::minimal_document(screen),
				None => return Err(Error::NotFound),
			},
		};

		let mut next = base.clone();
		apply_mutation(&mut next.content, mutation);
		next.version = base.version.bumped();
		next.last_updated = Timestamp::now();
		next.meta = DocumentMeta {
			source: Source::File,
			loaded_at: Timestamp::now(),
			modified_by: Some(ctx.user_id.clone()),
			update_source: Some(ctx.source.clone()),
		};

		self.schemas.validate(screen, &next)?;

		self.backup(screen).await;
		self.persist(&next).await?;
		self.remember(next.clone()).await;

		self.cache.invalidate(screen).await;
		self.cache.set(screen, &next).await;
		self.publish(screen, next.clone()).await;

		info!(
			"Wrote '{}' v{} (user {}, role {})",
			screen, next.version, ctx.user_id, ctx.role
		);
		Ok(next)
	}

	/// Re-read a screen from its file, bypassing the cache entirely.
	///
	/// A malformed or schema-invalid file leaves the previous in-memory state
	/// untouched and surfaces the error. Idempotent for an unchanged file.
	pub async fn reload(&self, screen: &str) -> ScResult<ConfigDocument> {
		validate_screen_name(screen)?;

		let raw = self.read_file_raw(screen).await?.ok_or(Error::NotFound)?;
		let document = parse_document(screen, &raw)
			.map_err(|err| Error::ValidationError(format!("reload of '{}' failed: {}", screen, err)))?;
		self.schemas.validate(screen, &document)?;

		// a watcher event for our own just-persisted write parses to the
		// resident state; don't rebroadcast it
		if let Some(current) = self.snapshot(screen).await {
			if current.version == document.version && current.content == document.content {
				debug!("Reload of '{}' unchanged at v{}", screen, document.version);
				return Ok(current);
			}
		}

		let document = document.retag(Source::File);
		self.remember(document.clone()).await;
		self.cache.invalidate(screen).await;
		self.cache.set(screen, &document).await;
		self.publish(screen, document.clone()).await;

		info!("Reloaded '{}' v{}", screen, document.version);
		Ok(document)
	}

	/// Drop a screen's cache entry
	pub async fn invalidate(&self, screen: &str) -> bool {
		self.cache.invalidate(screen).await
	}

	/// Drop every cache entry; returns the number removed
	pub async fn clear_cache(&self) -> usize {
		self.cache.invalidate_all().await
	}

	pub async fn cache_status(&self) -> CacheStatus {
		self.cache.status().await
	}

	// --- tier plumbing ---

	fn file_path(&self, screen: &str) -> PathBuf {
		self.config.data_dir.join(format!("{}.json", screen))
	}

	fn templates_dir(&self) -> PathBuf {
		self.config.data_dir.join("templates")
	}

	fn backups_dir(&self) -> PathBuf {
		self.config.data_dir.join("backups")
	}

	/// Raw file read through the `filesystem` breaker. A missing file is
	/// `Ok(None)` and never counts against the breaker.
	async fn read_file_raw(&self, screen: &str) -> ScResult<Option<String>> {
		let path = self.file_path(screen);
		self.fs_breaker
			.call(|| async {
				match tokio::fs::read_to_string(&path).await {
					Ok(raw) => Ok(Some(raw)),
					Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
					Err(err) => Err(err.into()),
				}
			})
			.await
	}

	/// File-tier read; a malformed file is a tier miss, not an error.
	async fn read_file(&self, screen: &str) -> ScResult<Option<ConfigDocument>> {
		match self.read_file_raw(screen).await? {
			None => Ok(None),
			Some(raw) => match parse_document(screen, &raw) {
				Ok(document) => Ok(Some(document)),
				Err(err) => {
					warn!("Stored file for '{}' is malformed, treating as absent: {}", screen, err);
					Ok(None)
				}
			},
		}
	}

	/// Write-then-rename so a cancelled or crashed write can never leave a
	/// truncated authoritative file behind.
	async fn persist(&self, document: &ConfigDocument) -> ScResult<()> {
		let path = self.file_path(&document.screen);
		let staging = self.config.data_dir.join(format!("{}.json.tmp", document.screen));
		let bytes = serde_json::to_vec_pretty(document)?;
		self.fs_breaker
			.call(|| async {
				tokio::fs::write(&staging, &bytes).await?;
				tokio::fs::rename(&staging, &path).await?;
				Ok(())
			})
			.await
	}

	/// Copy the current file to a timestamped backup. Non-fatal.
	async fn backup(&self, screen: &str) {
		let source = self.file_path(screen);
		let target = self
			.backups_dir()
			.join(format!("{}.{}.json", screen, Timestamp::now()));

		match tokio::fs::copy(&source, &target).await {
			Ok(_) => self.prune_backups(screen).await,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
			Err(err) => warn!("Backup of '{}' failed: {}", screen, err),
		}
	}

	/// Keep the newest `backup_keep` backups for a screen. Non-fatal.
	async fn prune_backups(&self, screen: &str) {
		let prefix = format!("{}.", screen);
		let mut backups = Vec::new();

		let Ok(mut entries) = tokio::fs::read_dir(self.backups_dir()).await else { return };
		while let Ok(Some(entry)) = entries.next_entry().await {
			if let Some(name) = entry.file_name().to_str() {
				if name.starts_with(&prefix) && name.ends_with(".json") {
					backups.push(entry.path());
				}
			}
		}

		// lexicographic sort matches chronological for unix-second names
		backups.sort();
		while backups.len() > self.config.backup_keep {
			let oldest = backups.remove(0);
			if let Err(err) = tokio::fs::remove_file(&oldest).await {
				debug!("Could not prune backup {}: {}", oldest.display(), err);
				break;
			}
		}
	}

	/// Fan a committed document out. Failed deliveries to registered
	/// subscribers count against the `transport` breaker; never fatal.
	async fn publish(&self, screen: &str, document: ConfigDocument) {
		let result = self
			.transport_breaker
			.call(|| async {
				let outcome = self.broadcaster.publish(screen, document).await;
				if outcome.failed > 0 {
					return Err(Error::DependencyUnavailable("transport"));
				}
				Ok(outcome)
			})
			.await;
		if let Err(err) = result {
			warn!("Broadcast of '{}' degraded: {}", screen, err);
		}
	}

	async fn remember(&self, document: ConfigDocument) {
		self.known_screens.write().await.insert(document.screen.clone());
		self.snapshots.write().await.insert(document.screen.clone(), document);
	}

	async fn snapshot(&self, screen: &str) -> Option<ConfigDocument> {
		self.snapshots.read().await.get(screen).cloned()
	}

	async fn is_known(&self, screen: &str) -> bool {
		self.known_screens.read().await.contains(screen)
	}

	/// A cache copy is stale when the in-memory snapshot has moved past it
	async fn is_stale(&self, screen: &str, cached: &ConfigDocument) -> bool {
		match self.snapshot(screen).await {
			Some(snapshot) => snapshot.version > cached.version,
			None => false,
		}
	}
}

fn parse_document(screen: &str, raw: &str) -> ScResult<ConfigDocument> {
	let mut document: ConfigDocument = serde_json::from_str(raw)?;
	document.screen = screen.to_string();
	Ok(document)
}

fn validate_screen_name(screen: &str) -> ScResult<()> {
	let valid = !screen.is_empty()
		&& screen.len() <= 64
		&& screen
			.chars()
			.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
	if valid {
		Ok(())
	} else {
		Err(Error::ValidationError(format!("invalid screen name: '{}'", screen)))
	}
}

fn validate_mutation(mutation: &Mutation) -> ScResult<()> {
	match mutation {
		Mutation::Set { key, value } => {
			validate_key(key)?;
			validate_value(key, value)
		}
		Mutation::Merge { updates } => {
			if updates.is_empty() {
				return Err(Error::ValidationError("empty update set".to_string()));
			}
			for (key, value) in updates {
				validate_key(key)?;
				validate_value(key, value)?;
			}
			Ok(())
		}
	}
}

fn validate_key(key: &str) -> ScResult<()> {
	if key.is_empty() {
		Err(Error::ValidationError("empty key".to_string()))
	} else if is_reserved_key(key) {
		Err(Error::ValidationError(format!("key '{}' is reserved", key)))
	} else {
		Ok(())
	}
}

/// Bound every string in the value, recursively. Reserved-key checks apply
/// only at the top level; nested objects may legitimately contain a
/// `version` field of their own.
fn validate_value(key: &str, value: &Value) -> ScResult<()> {
	match value {
		Value::String(s) if s.len() > MAX_STRING_VALUE_LEN => Err(Error::ValidationError(format!(
			"string value under '{}' exceeds {} characters",
			key, MAX_STRING_VALUE_LEN
		))),
		Value::Array(items) => items.iter().try_for_each(|item| validate_value(key, item)),
		Value::Object(map) => map.iter().try_for_each(|(k, v)| validate_value(k, v)),
		_ => Ok(()),
	}
}

fn apply_mutation(content: &mut Map<String, Value>, mutation: Mutation) {
	match mutation {
		Mutation::Set { key, value } => {
			content.insert(key, value);
		}
		Mutation::Merge { updates } => {
			for (key, value) in updates {
				content.insert(key, value);
			}
		}
	}
}


// vim: ts=4
