//! Route table

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::app::App;
use crate::{handler, websocket};

pub fn build_routes(app: App) -> Router {
	Router::new()
		.route("/config", get(handler::get_all))
		.route("/config/{screen}", get(handler::get_screen))
		.route("/config/update", post(handler::update))
		.route("/config/update-bulk", post(handler::update_bulk))
		.route("/config/reload/{screen}", post(handler::reload))
		.route("/config/cache/status", get(handler::cache_status))
		.route("/config/cache/clear", post(handler::cache_clear))
		.route("/ws/config", get(websocket::config_ws_handler))
		.layer(TraceLayer::new_for_http())
		.layer(CorsLayer::permissive())
		.with_state(app)
}

// vim: ts=4
