//! Custom extractors
//!
//! Authentication lives outside this engine: an upstream gateway
//! authenticates callers and forwards the write context in trusted
//! headers. The extractor never rejects; absent headers degrade to
//! anonymous/service defaults used for document audit metadata.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use screensync_types::types::UpdateContext;

use crate::prelude::*;

#[derive(Debug, Clone)]
pub struct UpdateCtx(pub UpdateContext);

impl<S> FromRequestParts<S> for UpdateCtx
where
	S: Send + Sync,
{
	type Rejection = Error;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		let header = |name: &str| {
			parts
				.headers
				.get(name)
				.and_then(|value| value.to_str().ok())
				.map(str::to_string)
		};

		Ok(UpdateCtx(UpdateContext {
			user_id: header("x-user-id").unwrap_or_else(|| "anonymous".to_string()),
			role: header("x-user-role").unwrap_or_else(|| "service".to_string()),
			source: header("x-update-source").unwrap_or_else(|| "api".to_string()),
		}))
	}
}

// vim: ts=4
