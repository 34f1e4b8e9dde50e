//! Reference presence authority.
//!
//! Owns the canonical member set per room and fans every change out to all
//! subscribers. Two subscription surfaces carry the same events: a
//! server-sent event stream (the request/stream transport reads this) and a
//! WebSocket (the persistent-socket transport). Intents arrive as plain
//! POSTs or as socket messages.
//!
//! ```text
//! participant ──→ POST /join/:room/:user ──┐
//! participant ──→ POST /trouble/:room/:user│──→ RoomLedger ──→ broadcast
//! participant ←── GET  /stream/:room (SSE) ┘        │
//! participant ←──→ GET /ws/:room/:user ─────────────┘
//! ```

use crate::channel::{PresenceIntent, RoomEvent, RoomLedger};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::sse::{Event, Sse},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::Stream;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex};
use tower_http::cors::{Any, CorsLayer};

/// How often idle streams carry a keepalive event.
const PING_INTERVAL: Duration = Duration::from_secs(15);

/// Per-room broadcast fan-out capacity.
const BROADCAST_CAPACITY: usize = 64;

/// Authority configuration.
#[derive(Debug, Clone)]
pub struct AuthorityConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
}

impl AuthorityConfig {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

/// Shared authority state.
#[derive(Default)]
pub struct AuthorityState {
    rooms: Mutex<HashMap<String, RoomSlot>>,
}

struct RoomSlot {
    ledger: RoomLedger,
    tx: broadcast::Sender<RoomEvent>,
}

impl Default for RoomSlot {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            ledger: RoomLedger::new(),
            tx,
        }
    }
}

impl AuthorityState {
    /// Run `mutate` against a room's ledger and broadcast what it returns.
    async fn mutate_room<F>(&self, room: &str, mutate: F)
    where
        F: FnOnce(&mut RoomLedger) -> Vec<RoomEvent>,
    {
        let mut rooms = self.rooms.lock().await;
        let slot = rooms.entry(room.to_string()).or_default();
        let events = mutate(&mut slot.ledger);
        for event in events {
            // No subscribers yet is fine; the next snapshot catches them up.
            let _ = slot.tx.send(event);
        }
    }

    /// Subscribe to a room, creating it on first sight.
    async fn subscribe(&self, room: &str) -> (RoomEvent, broadcast::Receiver<RoomEvent>) {
        let mut rooms = self.rooms.lock().await;
        let slot = rooms.entry(room.to_string()).or_default();
        (slot.ledger.snapshot(), slot.tx.subscribe())
    }
}

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Acknowledgement body for the mutation endpoints.
#[derive(Serialize)]
pub struct AckResponse {
    pub status: String,
}

fn ack() -> Json<AckResponse> {
    Json(AckResponse {
        status: "ok".to_string(),
    })
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /join/:room/:user
async fn join(
    State(state): State<Arc<AuthorityState>>,
    Path((room, user)): Path<(String, String)>,
) -> Json<AckResponse> {
    tracing::info!(%room, %user, "join");
    state.mutate_room(&room, |ledger| ledger.join(&user)).await;
    ack()
}

/// POST /leave/:room/:user
async fn leave(
    State(state): State<Arc<AuthorityState>>,
    Path((room, user)): Path<(String, String)>,
) -> Json<AckResponse> {
    tracing::info!(%room, %user, "leave");
    state.mutate_room(&room, |ledger| ledger.leave(&user)).await;
    ack()
}

/// POST /trouble/:room/:user
async fn trouble(
    State(state): State<Arc<AuthorityState>>,
    Path((room, user)): Path<(String, String)>,
) -> Json<AckResponse> {
    tracing::info!(%room, %user, "trouble reported");
    state
        .mutate_room(&room, |ledger| {
            ledger.apply_intent(&user, PresenceIntent::Trouble)
        })
        .await;
    ack()
}

/// POST /resolve/:room/:user
async fn resolve(
    State(state): State<Arc<AuthorityState>>,
    Path((room, user)): Path<(String, String)>,
) -> Json<AckResponse> {
    tracing::info!(%room, %user, "trouble resolved");
    state
        .mutate_room(&room, |ledger| {
            ledger.apply_intent(&user, PresenceIntent::Resolved)
        })
        .await;
    ack()
}

fn event_json(event: &RoomEvent) -> String {
    serde_json::to_string(event).unwrap_or_else(|_| "{\"type\":\"ping\"}".to_string())
}

/// GET /stream/:room, the server-sent event stream of room events.
///
/// Opens with the current members snapshot, then relays the broadcast.
/// Idle periods carry explicit `ping` events so proxies keep the stream
/// alive; consumers ignore them.
async fn stream(
    State(state): State<Arc<AuthorityState>>,
    Path(room): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (snapshot, rx) = state.subscribe(&room).await;
    tracing::info!(%room, "stream subscriber attached");

    let first = futures_util::stream::iter(vec![Ok(Event::default().data(event_json(&snapshot)))]);
    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.tick().await; // an interval's first tick is immediate; swallow it
    let rest = futures_util::stream::unfold((rx, ping), |(mut rx, mut ping)| async move {
        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Ok(event) => {
                        let item = Ok(Event::default().data(event_json(&event)));
                        return Some((item, (rx, ping)));
                    }
                    // A lagged subscriber just misses to the next snapshot.
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
                _ = ping.tick() => {
                    let item = Ok(Event::default().data(event_json(&RoomEvent::Ping)));
                    return Some((item, (rx, ping)));
                }
            }
        }
    });

    Sse::new(first.chain(rest))
}

/// GET /ws/:room/:user, a socket carrying the same events, accepting intents.
async fn ws(
    State(state): State<Arc<AuthorityState>>,
    Path((room, user)): Path<(String, String)>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, room, user))
}

async fn handle_socket(socket: WebSocket, state: Arc<AuthorityState>, room: String, user: String) {
    tracing::info!(%room, %user, "socket subscriber attached");
    state.mutate_room(&room, |ledger| ledger.join(&user)).await;
    let (snapshot, mut rx) = state.subscribe(&room).await;

    let (mut outbound, mut inbound) = socket.split();

    if outbound
        .send(Message::Text(event_json(&snapshot)))
        .await
        .is_err()
    {
        state.mutate_room(&room, |ledger| ledger.leave(&user)).await;
        return;
    }

    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.tick().await;
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => {
                    if outbound.send(Message::Text(event_json(&event))).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            message = inbound.next() => match message {
                Some(Ok(Message::Text(payload))) => {
                    match serde_json::from_str::<PresenceIntent>(&payload) {
                        Ok(intent) => {
                            state
                                .mutate_room(&room, |ledger| ledger.apply_intent(&user, intent))
                                .await;
                        }
                        Err(e) => {
                            // One bad message never stops the socket.
                            tracing::warn!(%user, "discarding malformed intent: {e}");
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(%user, "socket error: {e}");
                    break;
                }
            },
            _ = ping.tick() => {
                if outbound.send(Message::Text(event_json(&RoomEvent::Ping))).await.is_err() {
                    break;
                }
            }
        }
    }

    // Socket gone, participant gone.
    state.mutate_room(&room, |ledger| ledger.leave(&user)).await;
    tracing::info!(%room, %user, "socket subscriber detached");
}

/// Run the authority server.
pub async fn run(
    config: AuthorityConfig,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let state = Arc::new(AuthorityState::default());

    let app = Router::new()
        .route("/health", get(health))
        .route("/join/:room/:user", post(join))
        .route("/leave/:room/:user", post(leave))
        .route("/trouble/:room/:user", post(trouble))
        .route("/resolve/:room/:user", post(resolve))
        .route("/stream/:room", get(stream))
        .route("/ws/:room/:user", get(ws))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("presence authority listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("authority shutdown signal received");
            })
            .await
        {
            tracing::error!("authority server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
