//! Engine error taxonomy
//!
//! Tier-local failures (cache, a single backup write) are swallowed and
//! logged by their callers; everything here is what surfaces to the caller
//! of a store operation or an HTTP handler.

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;

pub type ScResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	/// Unknown screen (after the full tier walk failed to produce anything)
	NotFound,
	/// Document failed schema validation or a write touched a reserved key
	ValidationError(String),
	/// The per-screen distributed lock could not be acquired in time
	LockTimeout(String),
	/// A circuit breaker is open or the guarded call failed; named by dependency
	DependencyUnavailable(&'static str),
	/// The overall operation deadline was exceeded
	OperationTimeout(String),
	/// Bad engine configuration (startup-time)
	ConfigError(String),
	Internal(String),

	// externals
	Io(std::io::Error),
	Json(serde_json::Error),
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		Self::Io(err)
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Self::Json(err)
	}
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Error::NotFound => write!(f, "not found"),
			Error::ValidationError(msg) => write!(f, "validation error: {}", msg),
			Error::LockTimeout(msg) => write!(f, "lock timeout: {}", msg),
			Error::DependencyUnavailable(dep) => write!(f, "dependency unavailable: {}", dep),
			Error::OperationTimeout(msg) => write!(f, "operation timeout: {}", msg),
			Error::ConfigError(msg) => write!(f, "config error: {}", msg),
			Error::Internal(msg) => write!(f, "internal error: {}", msg),
			Error::Io(err) => write!(f, "io error: {}", err),
			Error::Json(err) => write!(f, "json error: {}", err),
		}
	}
}

impl std::error::Error for Error {}

impl IntoResponse for Error {
	fn into_response(self) -> axum::response::Response {
		let (status, message) = match &self {
			Error::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
			Error::ValidationError(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
			Error::LockTimeout(_) => (StatusCode::CONFLICT, self.to_string()),
			Error::DependencyUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
			Error::OperationTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, self.to_string()),
			_ => (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string()),
		};
		(status, Json(json!({ "error": message }))).into_response()
	}
}


// vim: ts=4
