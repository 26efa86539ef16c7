//! Dashboard WebSocket
//!
//! Streams state deltas to operator dashboards. Clients opt in per
//! station:
//!
//! - Client -> server: `{"type":"subscribe","data":{"stationId":"..."}}`
//!   and `{"type":"unsubscribe","data":{"stationId":"..."}}`
//! - Server -> client: `{"type":"station_update"|"connector_update"|
//!   "payment_update","data":{...}}`
//!
//! The default subscription set is empty: a client that never subscribes
//! receives nothing. Delivery is best-effort; a slow client lags on the
//! bus and loses events rather than blocking publishers.

use std::collections::HashSet;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::select;
use tracing::{debug, info, warn};

use crate::events::{EventMessage, SharedEventBus};

/// Subscription management frames sent by dashboard clients
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
enum ClientMessage {
    Subscribe(SubscriptionTarget),
    Unsubscribe(SubscriptionTarget),
}

#[derive(Debug, Deserialize)]
struct SubscriptionTarget {
    #[serde(rename = "stationId")]
    station_id: String,
}

/// State for the dashboard WebSocket handler
#[derive(Clone)]
pub struct DashboardState {
    pub event_bus: SharedEventBus,
}

/// WebSocket upgrade handler for dashboard clients
pub async fn ws_dashboard_handler(
    ws: WebSocketUpgrade,
    State(state): State<DashboardState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_dashboard_socket(socket, state))
}

fn wants(subscriptions: &HashSet<String>, event: &EventMessage) -> bool {
    subscriptions.contains(event.event.charge_point_id())
}

async fn handle_dashboard_socket(socket: WebSocket, state: DashboardState) {
    let (mut sender, mut receiver) = socket.split();
    let mut subscriber = state.event_bus.subscribe();
    let mut subscriptions: HashSet<String> = HashSet::new();

    let welcome = serde_json::json!({
        "type": "connected",
        "data": { "message": "subscribe with {\"type\":\"subscribe\",\"data\":{\"stationId\":\"...\"}}" }
    });
    if sender.send(Message::Text(welcome.to_string().into())).await.is_err() {
        return;
    }

    info!("Dashboard client connected");

    loop {
        select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Subscribe(target)) => {
                                debug!(station_id = target.station_id.as_str(), "Dashboard subscribe");
                                subscriptions.insert(target.station_id);
                            }
                            Ok(ClientMessage::Unsubscribe(target)) => {
                                debug!(station_id = target.station_id.as_str(), "Dashboard unsubscribe");
                                subscriptions.remove(&target.station_id);
                            }
                            Err(e) => {
                                warn!("Unparsable dashboard frame: {}", e);
                                let error = serde_json::json!({
                                    "type": "error",
                                    "data": { "error": format!("unrecognized frame: {}", e) }
                                });
                                if sender.send(Message::Text(error.to_string().into())).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("Dashboard WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }

            event = subscriber.recv() => {
                match event {
                    Some(event_msg) => {
                        if !wants(&subscriptions, &event_msg) {
                            continue;
                        }
                        match serde_json::to_string(&event_msg) {
                            Ok(json) => {
                                if sender.send(Message::Text(json.into())).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!("Failed to serialize event: {}", e),
                        }
                    }
                    None => {
                        warn!("Event bus closed");
                        break;
                    }
                }
            }
        }
    }

    info!("Dashboard client disconnected");
}
