//! Template tier
//!
//! When neither cache nor file can produce a document, a screen-specific
//! template under `templates/<screen>.template.json` seeds a fresh one at
//! version 1.0.0. If there is no template either, a minimal built-in
//! document keeps read paths alive; that one is never persisted.

use serde_json::{Map, Value, json};
use std::path::Path;

use screensync_types::types::Source;

use crate::prelude::*;

/// Read a screen's template content, if one exists and parses to an object.
pub async fn load_template(dir: &Path, screen: &str) -> Option<Map<String, Value>> {
	let path = dir.join(format!("{}.template.json", screen));
	let raw = match tokio::fs::read_to_string(&path).await {
		Ok(raw) => raw,
		Err(err) => {
			if err.kind() != std::io::ErrorKind::NotFound {
				warn!("Template {} unreadable: {}", path.display(), err);
			}
			return None;
		}
	};

	match serde_json::from_str::<Value>(&raw) {
		Ok(Value::Object(content)) => Some(content),
		Ok(_) => {
			warn!("Template {} is not a JSON object, ignoring", path.display());
			None
		}
		Err(err) => {
			warn!("Template {} is malformed, ignoring: {}", path.display(), err);
			None
		}
	}
}

/// A fresh document generated from template content
pub fn document_from_template(screen: &str, content: Map<String, Value>) -> ConfigDocument {
	ConfigDocument::new(screen, content, Source::Template)
}

/// Last-resort document when every other tier failed; memory-only.
pub fn minimal_document(screen: &str) -> ConfigDocument {
	let mut content = Map::new();
	content.insert("title".to_string(), json!(screen));
	content.insert("layout".to_string(), json!("default"));
	ConfigDocument::new(screen, content, Source::MinimalFallback)
}


// vim: ts=4
