//! Schema registry
//!
//! Compiles every `schemas/<screen>.schema.json` once at startup (Draft 7)
//! and validates documents against them before a write is committed. A
//! screen without a schema skips validation; a malformed schema file is
//! logged and skipped so one bad schema cannot take the engine down.

use jsonschema::{Draft, JSONSchema};
use std::collections::HashMap;
use std::path::Path;

use crate::prelude::*;

/// Validation errors surfaced per write, at most
const MAX_REPORTED_ERRORS: usize = 5;

pub struct SchemaSet {
	schemas: HashMap<String, JSONSchema>,
}

impl SchemaSet {
	/// Load and compile every schema under `dir`. Missing directory means
	/// no schemas; unreadable or uncompilable files are skipped with a warning.
	pub async fn load(dir: &Path) -> ScResult<Self> {
		let mut schemas = HashMap::new();

		let mut entries = match tokio::fs::read_dir(dir).await {
			Ok(entries) => entries,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
				debug!("No schema directory at {}", dir.display());
				return Ok(Self { schemas });
			}
			Err(err) => return Err(err.into()),
		};

		while let Some(entry) = entries.next_entry().await? {
			let path = entry.path();
			let Some(screen) = schema_screen_name(&path) else { continue };

			let raw = match tokio::fs::read_to_string(&path).await {
				Ok(raw) => raw,
				Err(err) => {
					warn!("Skipping unreadable schema {}: {}", path.display(), err);
					continue;
				}
			};
			let value: serde_json::Value = match serde_json::from_str(&raw) {
				Ok(value) => value,
				Err(err) => {
					warn!("Skipping malformed schema {}: {}", path.display(), err);
					continue;
				}
			};
			match JSONSchema::options().with_draft(Draft::Draft7).compile(&value) {
				Ok(compiled) => {
					debug!("Compiled schema for '{}'", screen);
					schemas.insert(screen, compiled);
				}
				Err(err) => {
					warn!("Skipping uncompilable schema {}: {}", path.display(), err);
				}
			}
		}

		info!("Loaded {} screen schemas from {}", schemas.len(), dir.display());
		Ok(Self { schemas })
	}

	/// Validate a document's full wire shape against its screen's schema.
	///
	/// Screens without a schema pass trivially.
	pub fn validate(&self, screen: &str, document: &ConfigDocument) -> ScResult<()> {
		let Some(schema) = self.schemas.get(screen) else {
			return Ok(());
		};

		let instance = serde_json::to_value(document)?;
		if let Err(errors) = schema.validate(&instance) {
			let mut messages: Vec<String> = errors
				.take(MAX_REPORTED_ERRORS)
				.map(|err| format!("{}: {}", err.instance_path, err))
				.collect();
			messages.sort();
			return Err(Error::ValidationError(format!(
				"'{}' failed schema validation: {}",
				screen,
				messages.join("; ")
			)));
		}
		Ok(())
	}

	pub fn has(&self, screen: &str) -> bool {
		self.schemas.contains_key(screen)
	}

	/// Screens that carry a schema, for discovery
	pub fn screens(&self) -> impl Iterator<Item = &str> {
		self.schemas.keys().map(String::as_str)
	}
}

/// `Auth.schema.json` -> `Auth`
fn schema_screen_name(path: &Path) -> Option<String> {
	let name = path.file_name()?.to_str()?;
	name.strip_suffix(".schema.json").map(str::to_string)
}


// vim: ts=4
