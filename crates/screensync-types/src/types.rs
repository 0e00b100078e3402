//! Core document types
//!
//! A screen configuration is an arbitrary JSON object plus three reserved
//! fields maintained by the engine: `version`, `lastUpdated` and
//! `_metadata`. The reserved fields live as typed struct members here; the
//! free-form content is carried in a flattened map so the on-disk and
//! on-the-wire shape matches what clients consume.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, ScResult};

/// Content keys a write may never touch directly
pub const RESERVED_KEYS: [&str; 3] = ["_metadata", "version", "lastUpdated"];

/// Upper bound for string values accepted by the write surface
pub const MAX_STRING_VALUE_LEN: usize = 10_000;

/// Unix timestamp in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
	pub fn now() -> Self {
		Self(chrono::Utc::now().timestamp())
	}
}

impl fmt::Display for Timestamp {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Semantic version triple, serialized as a `"1.0.3"` string.
///
/// Strictly increasing per screen: every successful write bumps the patch
/// component; major/minor are operator-controlled via file edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
	pub major: u32,
	pub minor: u32,
	pub patch: u32,
}

impl Version {
	/// First version of a freshly generated document
	pub fn initial() -> Self {
		Self { major: 1, minor: 0, patch: 0 }
	}

	/// Next version after a successful write
	pub fn bumped(self) -> Self {
		Self { patch: self.patch + 1, ..self }
	}
}

impl fmt::Display for Version {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
	}
}

impl FromStr for Version {
	type Err = Error;

	fn from_str(s: &str) -> ScResult<Self> {
		let mut parts = s.split('.');
		let mut next = || {
			parts
				.next()
				.and_then(|p| p.parse::<u32>().ok())
				.ok_or_else(|| Error::ValidationError(format!("invalid version: {}", s)))
		};
		let version = Version { major: next()?, minor: next()?, patch: next()? };
		if parts.next().is_some() {
			return Err(Error::ValidationError(format!("invalid version: {}", s)));
		}
		Ok(version)
	}
}

impl Serialize for Version {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for Version {
	fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		s.parse().map_err(serde::de::Error::custom)
	}
}

/// The tier a currently held document copy was last materialized from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
	File,
	Cache,
	Template,
	MinimalFallback,
}

impl Source {
	pub fn as_str(self) -> &'static str {
		match self {
			Source::File => "file",
			Source::Cache => "cache",
			Source::Template => "template",
			Source::MinimalFallback => "minimal-fallback",
		}
	}
}

/// Engine-maintained document metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMeta {
	pub source: Source,
	pub loaded_at: Timestamp,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub modified_by: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub update_source: Option<String>,
}

impl DocumentMeta {
	pub fn new(source: Source) -> Self {
		Self { source, loaded_at: Timestamp::now(), modified_by: None, update_source: None }
	}
}

/// A versioned screen configuration document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigDocument {
	/// Screen name, carried out of band (the file/cache key identifies it)
	#[serde(skip)]
	pub screen: String,

	pub version: Version,

	#[serde(rename = "lastUpdated")]
	pub last_updated: Timestamp,

	#[serde(rename = "_metadata")]
	pub meta: DocumentMeta,

	/// Free-form nested configuration content
	#[serde(flatten)]
	pub content: Map<String, Value>,
}

impl ConfigDocument {
	pub fn new(screen: impl Into<String>, content: Map<String, Value>, source: Source) -> Self {
		Self {
			screen: screen.into(),
			version: Version::initial(),
			last_updated: Timestamp::now(),
			meta: DocumentMeta::new(source),
			content,
		}
	}

	/// Re-tag the document with the tier it was just materialized from
	pub fn retag(mut self, source: Source) -> Self {
		self.meta.source = source;
		self.meta.loaded_at = Timestamp::now();
		self
	}

	/// The content map as a JSON value, for schema validation
	pub fn content_value(&self) -> Value {
		Value::Object(self.content.clone())
	}
}

/// Check whether a content key is engine-reserved
pub fn is_reserved_key(key: &str) -> bool {
	RESERVED_KEYS.contains(&key)
}

/// A cached document copy with its TTL bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
	pub document: ConfigDocument,
	pub cached_at: Timestamp,
	pub ttl_secs: u64,
}

impl CacheEntry {
	pub fn new(document: ConfigDocument, ttl_secs: u64) -> Self {
		Self { document, cached_at: Timestamp::now(), ttl_secs }
	}

	pub fn is_expired(&self, now: Timestamp) -> bool {
		now.0 >= self.cached_at.0 + self.ttl_secs as i64
	}
}

/// Cache backend statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
	pub entries: usize,
}

/// Trusted, already-authenticated write context passed into every write
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContext {
	pub user_id: String,
	pub role: String,
	pub source: String,
}

impl UpdateContext {
	pub fn system() -> Self {
		Self { user_id: "system".into(), role: "service".into(), source: "internal".into() }
	}
}


// vim: ts=4
