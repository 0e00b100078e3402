//! HTTP handlers for the config surface

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use screensync_core::breaker::BreakerSnapshot;
use screensync_core::ws_broadcast::BroadcastStats;

use crate::cache::CacheStatus;
use crate::extract::UpdateCtx;
use crate::prelude::*;
use crate::store::Mutation;

/// GET /config
pub async fn get_all(State(app): State<App>) -> Json<BTreeMap<String, ConfigDocument>> {
	Json(app.store.documents().await)
}

/// GET /config/{screen}
pub async fn get_screen(
	State(app): State<App>,
	Path(screen): Path<String>,
) -> ScResult<Json<ConfigDocument>> {
	Ok(Json(app.store.load(&screen).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateReq {
	pub screen: String,
	pub key: String,
	pub value: Value,
}

/// POST /config/update
pub async fn update(
	State(app): State<App>,
	UpdateCtx(ctx): UpdateCtx,
	Json(req): Json<UpdateReq>,
) -> ScResult<Json<ConfigDocument>> {
	let mutation = Mutation::Set { key: req.key, value: req.value };
	Ok(Json(app.store.write(&req.screen, mutation, ctx).await?))
}

#[derive(Debug, Deserialize)]
pub struct BulkUpdateReq {
	pub screen: String,
	pub updates: Map<String, Value>,
}

/// POST /config/update-bulk
pub async fn update_bulk(
	State(app): State<App>,
	UpdateCtx(ctx): UpdateCtx,
	Json(req): Json<BulkUpdateReq>,
) -> ScResult<Json<ConfigDocument>> {
	let mutation = Mutation::Merge { updates: req.updates };
	Ok(Json(app.store.write(&req.screen, mutation, ctx).await?))
}

/// POST /config/reload/{screen}
pub async fn reload(
	State(app): State<App>,
	Path(screen): Path<String>,
) -> ScResult<Json<ConfigDocument>> {
	Ok(Json(app.store.reload(&screen).await?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
	pub cache: CacheStatus,
	pub breakers: Vec<BreakerSnapshot>,
	pub subscribers: BroadcastStats,
}

/// GET /config/cache/status
pub async fn cache_status(State(app): State<App>) -> Json<StatusResponse> {
	Json(StatusResponse {
		cache: app.store.cache_status().await,
		breakers: app.breakers.snapshots(),
		subscribers: app.broadcaster.stats().await,
	})
}

#[derive(Debug, Deserialize)]
pub struct ClearParams {
	pub screen: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearResponse {
	pub cleared: usize,
}

/// POST /config/cache/clear — scoped to one screen with `?screen=`
pub async fn cache_clear(
	State(app): State<App>,
	Query(params): Query<ClearParams>,
) -> Json<ClearResponse> {
	let cleared = match params.screen {
		Some(screen) => {
			let removed = app.store.invalidate(&screen).await;
			info!("Cache cleared for '{}' (present: {})", screen, removed);
			usize::from(removed)
		}
		None => {
			let removed = app.store.clear_cache().await;
			info!("Cache cleared ({} entries)", removed);
			removed
		}
	};
	Json(ClearResponse { cleared })
}

// vim: ts=4
