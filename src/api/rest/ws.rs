use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::Utc;
use futures::stream::SplitStream;
use futures::SinkExt;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::models::identity::{Identity, Role};
use crate::realtime::events::{ClientEvent, ServerEvent};
use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// One socket serves one identity. The first client message must be `join`;
/// after that, every inbound event maps onto one hub/store call and a
/// forwarding task drains the gateway channel into the socket. Transport
/// only; no ride state lives in the session.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let Some(identity) = await_join(&mut receiver).await else {
        debug!("websocket closed before joining");
        return;
    };

    if identity.role == Role::Captain {
        state.hub.set_online(identity.id, true, Utc::now());
    }

    let registration = state.gateway.join(identity);
    let conn_id = registration.conn_id;
    let mut events = registration.events;

    state
        .metrics
        .connected_clients
        .with_label_values(&[identity.role.as_str()])
        .inc();
    info!(role = identity.role.as_str(), id = %identity.id, "realtime client joined");

    let send_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize event for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_state = state.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let Message::Text(text) = msg else { continue };

            match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => handle_client_event(&recv_state, identity, event),
                Err(err) => {
                    debug!(error = %err, "unparseable client event");
                    recv_state.gateway.emit_to_identity(
                        identity,
                        ServerEvent::Error {
                            message: "unrecognized event".to_string(),
                        },
                    );
                }
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    // Disconnects only deregister routing. Ride state is untouched and
    // captain presence expires via the freshness window.
    state.gateway.leave(identity, conn_id);
    state
        .metrics
        .connected_clients
        .with_label_values(&[identity.role.as_str()])
        .dec();
    info!(role = identity.role.as_str(), id = %identity.id, "realtime client disconnected");
}

async fn await_join(receiver: &mut SplitStream<WebSocket>) -> Option<Identity> {
    while let Some(Ok(msg)) = receiver.next().await {
        let Message::Text(text) = msg else { continue };

        match serde_json::from_str::<ClientEvent>(&text) {
            Ok(ClientEvent::Join { user_type, user_id }) => {
                return Some(Identity {
                    role: user_type,
                    id: user_id,
                });
            }
            _ => {
                debug!("expected join as first event");
                return None;
            }
        }
    }

    None
}

fn handle_client_event(state: &AppState, identity: Identity, event: ClientEvent) {
    match event {
        ClientEvent::Join { .. } => {
            // Already joined on this socket; re-joins are ignored.
        }
        ClientEvent::UpdateLocationCaptain { user_id, location } => {
            if identity.role != Role::Captain {
                return;
            }
            // The joined identity governs; a mismatched user_id is ignored.
            if user_id.is_some_and(|claimed| claimed != identity.id) {
                return;
            }

            state.metrics.location_updates_total.inc();

            if let Some((ride_id, viewers)) =
                state.hub.record_location(identity.id, location, Utc::now())
            {
                let event = ServerEvent::CaptainLocation {
                    ride_id,
                    captain_id: identity.id,
                    location,
                };
                state.gateway.emit_to_set(viewers, &event);
            }
        }
        ClientEvent::UpdateAvailabilityCaptain { is_online } => {
            if identity.role == Role::Captain {
                state.hub.set_online(identity.id, is_online, Utc::now());
            }
        }
        ClientEvent::TrackRide { ride_id } => {
            let Ok(ride) = state.rides.get(ride_id) else {
                state.gateway.emit_to_identity(
                    identity,
                    ServerEvent::Error {
                        message: "unknown ride".to_string(),
                    },
                );
                return;
            };

            let is_viewer = match identity.role {
                Role::Customer => ride.customer_id == identity.id,
                Role::StoreOwner => ride.store_owner_id == identity.id,
                Role::Captain => false,
            };

            if !is_viewer || !ride.status.is_trackable() {
                state.gateway.emit_to_identity(
                    identity,
                    ServerEvent::Error {
                        message: "ride is not trackable".to_string(),
                    },
                );
                return;
            }

            state.hub.subscribe(ride_id, identity);
        }
        ClientEvent::UntrackRide { ride_id } => {
            state.hub.unsubscribe(ride_id, identity);
        }
    }
}
