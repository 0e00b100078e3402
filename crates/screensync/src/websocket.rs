//! Real-time config channel
//!
//! Every subscriber gets a full-state sync on connect, then receives an
//! `update` frame for each committed write or reload. Clients may request a
//! single screen (`get`) or check liveness (`ping`). The server pings on a
//! heartbeat interval; a failed send ends the connection and the registry
//! entry is cleaned up.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use screensync_types::utils::random_id;

use crate::prelude::*;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
enum ServerMessage {
	/// Full-state snapshot pushed once per connection
	Sync {
		documents: BTreeMap<String, ConfigDocument>,
		sync_id: u64,
		server_version: String,
	},
	/// A committed write or reload
	Update {
		screen: String,
		document: ConfigDocument,
		update_id: String,
		timestamp: Timestamp,
	},
	/// Answer to a client `get`
	Screen { screen: String, document: ConfigDocument },
	Pong,
	Error { message: String },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ClientMessage {
	Get { screen: String },
	Ping,
}

pub async fn config_ws_handler(State(app): State<App>, ws: WebSocketUpgrade) -> impl IntoResponse {
	ws.on_upgrade(move |socket| handle_config_connection(app, socket))
}

async fn handle_config_connection(app: App, socket: WebSocket) {
	let connection_id = random_id();
	info!("WS subscriber {} connected", connection_id);

	let mut push_rx = app.broadcaster.register(&connection_id).await;
	let (mut sink, mut stream) = socket.split();

	let sync = ServerMessage::Sync {
		documents: app.store.documents().await,
		sync_id: app.broadcaster.next_sync_id(),
		server_version: crate::VERSION.to_string(),
	};
	if send(&mut sink, &sync).await.is_err() {
		app.broadcaster.unregister(&connection_id).await;
		return;
	}

	let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
	heartbeat.tick().await;

	loop {
		tokio::select! {
			Some(push) = push_rx.recv() => {
				let message = ServerMessage::Update {
					screen: push.screen,
					document: push.document,
					update_id: push.update_id,
					timestamp: push.timestamp,
				};
				if send(&mut sink, &message).await.is_err() {
					break;
				}
			}
			incoming = stream.next() => {
				match incoming {
					Some(Ok(Message::Text(text))) => {
						app.broadcaster.touch(&connection_id).await;
						let reply = handle_client_message(&app, &text).await;
						if send(&mut sink, &reply).await.is_err() {
							break;
						}
					}
					Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
						app.broadcaster.touch(&connection_id).await;
					}
					Some(Ok(Message::Close(_))) | None => break,
					Some(Ok(_)) => {}
					Some(Err(err)) => {
						debug!("WS subscriber {} receive error: {}", connection_id, err);
						break;
					}
				}
			}
			_ = heartbeat.tick() => {
				if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
					break;
				}
			}
		}
	}

	app.broadcaster.unregister(&connection_id).await;
	info!("WS subscriber {} disconnected", connection_id);
}

async fn handle_client_message(app: &App, text: &str) -> ServerMessage {
	match serde_json::from_str::<ClientMessage>(text) {
		Ok(ClientMessage::Ping) => ServerMessage::Pong,
		Ok(ClientMessage::Get { screen }) => match app.store.load(&screen).await {
			Ok(document) => ServerMessage::Screen { screen, document },
			Err(err) => ServerMessage::Error { message: err.to_string() },
		},
		Err(err) => ServerMessage::Error { message: format!("unrecognized message: {}", err) },
	}
}

async fn send(
	sink: &mut SplitSink<WebSocket, Message>,
	message: &ServerMessage,
) -> Result<(), axum::Error> {
	match serde_json::to_string(message) {
		Ok(text) => sink.send(Message::Text(text.into())).await,
		Err(err) => {
			error!("WS frame encode failed: {}", err);
			Ok(())
		}
	}
}


// vim: ts=4
