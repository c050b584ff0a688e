//! Real-time Gateway (C7).
//!
//! One WebSocket connection per bidder session. On connect we authenticate,
//! push a `SERVER_TIME` frame for clock sync, then drive a loop that
//! multiplexes inbound room-membership/bid commands against outbound
//! fan-out events for every auction the connection has joined.

pub mod auth;
pub mod protocol;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::admission::{BidAdmissionService, BidAttempt};
use crate::error::WireError;
use crate::fanout::FanoutBus;
use crate::hotstore::HotStore;
use auth::{extract_bearer, CredentialVerifier};
use protocol::{BidInfo, ClientMessage, ServerMessage};

#[derive(Clone)]
pub struct GatewayState {
    pub admission: Arc<BidAdmissionService>,
    pub hot: Arc<HotStore>,
    pub fanout: Arc<FanoutBus>,
    pub auth: Arc<CredentialVerifier>,
}

pub fn router(state: GatewayState) -> Router {
    Router::new().route("/ws", get(ws_handler)).with_state(state)
}

async fn ws_handler(State(state): State<GatewayState>, headers: HeaderMap, ws: WebSocketUpgrade) -> impl IntoResponse {
    let Some(token) = extract_bearer(&headers) else {
        return (StatusCode::UNAUTHORIZED, "missing bearer credential").into_response();
    };
    let Some(identity) = state.auth.verify(token) else {
        return (StatusCode::UNAUTHORIZED, "invalid bearer credential").into_response();
    };
    ws.on_upgrade(move |socket| handle_socket(socket, identity, state))
}

#[tracing::instrument(skip(socket, state), fields(bidder_id = %identity.bidder_id))]
async fn handle_socket(socket: WebSocket, identity: auth::Identity, state: GatewayState) {
    let bidder_id = identity.bidder_id;
    let bidder_username = identity.username;
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();

    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let Ok(text) = serde_json::to_string(&message) else { continue };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let _ = out_tx.send(ServerMessage::ServerTime { now: chrono::Utc::now() });

    let mut rooms: HashMap<Uuid, tokio::task::JoinHandle<()>> = HashMap::new();

    while let Some(Ok(message)) = ws_rx.next().await {
        let Message::Text(text) = message else {
            if matches!(message, Message::Close(_)) {
                break;
            }
            continue;
        };
        let Ok(client_message) = serde_json::from_str::<ClientMessage>(&text) else {
            let _ = out_tx.send(ServerMessage::Error {
                error: WireError { code: "MALFORMED_MESSAGE", message: "could not parse client message".into(), details: None },
            });
            continue;
        };

        match client_message {
            ClientMessage::AuctionJoin { auction_id } => {
                join_room(auction_id, &state, &out_tx, &mut rooms);
            }
            ClientMessage::AuctionLeave { auction_id } => {
                if let Some(handle) = rooms.remove(&auction_id) {
                    handle.abort();
                }
            }
            ClientMessage::BidPlaced { auction_id, amount } => {
                handle_bid(auction_id, amount, bidder_id, &bidder_username, &state, &out_tx).await;
            }
        }
    }

    for (_, handle) in rooms.into_iter() {
        handle.abort();
    }
    writer.abort();
    info!("gateway connection closed");
}

fn join_room(
    auction_id: Uuid,
    state: &GatewayState,
    out_tx: &mpsc::UnboundedSender<ServerMessage>,
    rooms: &mut HashMap<Uuid, tokio::task::JoinHandle<()>>,
) {
    if rooms.contains_key(&auction_id) {
        return;
    }
    if state.hot.get(auction_id).is_none() {
        let _ = out_tx.send(ServerMessage::Error {
            error: WireError { code: "AUCTION_NOT_FOUND", message: "no active auction with that id".into(), details: None },
        });
        return;
    }
    let _ = out_tx.send(ServerMessage::AuctionJoined { auction_id });

    let mut receiver = state.fanout.subscribe(auction_id);
    let forward_tx = out_tx.clone();
    let handle = tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if forward_tx.send(event.into()).is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    rooms.insert(auction_id, handle);
}

async fn handle_bid(
    auction_id: Uuid,
    amount: rust_decimal::Decimal,
    bidder_id: Uuid,
    bidder_username: &str,
    state: &GatewayState,
    out_tx: &mpsc::UnboundedSender<ServerMessage>,
) {
    let server_time = chrono::Utc::now();
    let attempt = BidAttempt {
        auction_id,
        bidder_id,
        bidder_username: bidder_username.to_string(),
        amount,
        server_time,
        ip_address: None,
        user_agent: None,
    };
    match state.admission.place_bid(attempt).await {
        Ok(outcome) => {
            let bid = BidInfo {
                amount,
                bidder_id,
                bidder_username: bidder_username.to_string(),
                timestamp: server_time,
                total_bids: outcome.total_bids,
            };
            let _ = out_tx.send(ServerMessage::BidAccepted { auction_id, bid });
        }
        Err(err) => {
            warn!(?err, %auction_id, %bidder_id, "bid rejected");
            let wire: WireError = (&err).into();
            let _ = out_tx.send(ServerMessage::BidRejected { auction_id, error: wire });
        }
    }
}
