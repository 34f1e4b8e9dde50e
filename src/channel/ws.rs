//! Persistent-socket transport.
//!
//! One worker thread owns a current-thread runtime and the socket; intents
//! and the inbound stream share a single `select!` loop, so this
//! participant's sends stay ordered and a socket drop is reported exactly
//! once. Same contract as the request/stream hybrid, different wire.

use crate::channel::{ChannelError, PresenceChannel, PresenceIntent, RoomEvent};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

/// How long `connect` waits for the socket handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

enum Outbound {
    Intent(PresenceIntent),
    Close,
}

/// Channel handle over a persistent socket.
pub struct WsChannel {
    token: String,
    outbound_tx: tokio::sync::mpsc::UnboundedSender<Outbound>,
    events_rx: Receiver<RoomEvent>,
    // Held so the receivers never report disconnection while the handle lives.
    _events_tx: Sender<RoomEvent>,
    errors_rx: Receiver<ChannelError>,
    _errors_tx: Sender<ChannelError>,
    open: Arc<AtomicBool>,
    connected: bool,
}

impl WsChannel {
    /// Open `{base}/ws/{room}/{user}` and start the socket worker.
    ///
    /// `base_url` uses the `ws://` or `wss://` scheme.
    pub fn connect(base_url: &str, room: &str, user: &str) -> Result<Self, ChannelError> {
        let token = uuid::Uuid::new_v4().to_string();
        let url = format!(
            "{}/ws/{room}/{user}?token={token}",
            base_url.trim_end_matches('/')
        );

        let (events_tx, events_rx) = unbounded();
        let (errors_tx, errors_rx) = unbounded();
        let (outbound_tx, outbound_rx) = tokio::sync::mpsc::unbounded_channel();
        let (ack_tx, ack_rx) = bounded(1);
        let open = Arc::new(AtomicBool::new(true));

        spawn_socket_worker(
            url,
            outbound_rx,
            ack_tx,
            events_tx.clone(),
            errors_tx.clone(),
            open.clone(),
        );

        match ack_rx.recv_timeout(CONNECT_TIMEOUT) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(ChannelError::Connect(
                    "timed out waiting for socket handshake".to_string(),
                ))
            }
        }

        Ok(Self {
            token,
            outbound_tx,
            events_rx,
            _events_tx: events_tx,
            errors_rx,
            _errors_tx: errors_tx,
            open,
            connected: true,
        })
    }
}

impl PresenceChannel for WsChannel {
    fn session_token(&self) -> &str {
        &self.token
    }

    fn send(&mut self, intent: PresenceIntent) -> Result<(), ChannelError> {
        if !self.connected {
            return Err(ChannelError::Send("channel is disconnected".to_string()));
        }
        self.outbound_tx
            .send(Outbound::Intent(intent))
            .map_err(|_| ChannelError::Send("socket worker is gone".to_string()))
    }

    fn events(&self) -> Receiver<RoomEvent> {
        self.events_rx.clone()
    }

    fn errors(&self) -> Receiver<ChannelError> {
        self.errors_rx.clone()
    }

    fn disconnect(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        self.open.store(false, Ordering::SeqCst);
        let _ = self.outbound_tx.send(Outbound::Close);
        while self.events_rx.try_recv().is_ok() {}
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn spawn_socket_worker(
    url: String,
    mut outbound_rx: tokio::sync::mpsc::UnboundedReceiver<Outbound>,
    ack_tx: Sender<Result<(), ChannelError>>,
    events_tx: Sender<RoomEvent>,
    errors_tx: Sender<ChannelError>,
    open: Arc<AtomicBool>,
) {
    std::thread::Builder::new()
        .name("presence-socket".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    let _ = ack_tx.send(Err(ChannelError::Connect(format!(
                        "Failed to create runtime: {e}"
                    ))));
                    return;
                }
            };

            runtime.block_on(async move {
                let (ws_stream, _response) = match tokio_tungstenite::connect_async(url.as_str()).await {
                    Ok(pair) => pair,
                    Err(e) => {
                        let _ = ack_tx.send(Err(ChannelError::Connect(e.to_string())));
                        return;
                    }
                };
                let _ = ack_tx.send(Ok(()));

                let (mut write, mut read) = ws_stream.split();
                loop {
                    tokio::select! {
                        outbound = outbound_rx.recv() => match outbound {
                            Some(Outbound::Intent(intent)) => {
                                let payload = match serde_json::to_string(&intent) {
                                    Ok(payload) => payload,
                                    Err(e) => {
                                        tracing::warn!("unencodable intent: {e}");
                                        continue;
                                    }
                                };
                                if let Err(e) = write.send(Message::Text(payload)).await {
                                    if open.load(Ordering::SeqCst) {
                                        let _ = errors_tx.send(ChannelError::Send(e.to_string()));
                                    }
                                    return;
                                }
                            }
                            Some(Outbound::Close) | None => {
                                let _ = write.send(Message::Close(None)).await;
                                return;
                            }
                        },
                        inbound = read.next() => match inbound {
                            Some(Ok(Message::Text(payload))) => {
                                match serde_json::from_str::<RoomEvent>(&payload) {
                                    Ok(event) => {
                                        if open.load(Ordering::SeqCst) {
                                            let _ = events_tx.send(event);
                                        }
                                    }
                                    Err(e) => {
                                        tracing::warn!("discarding malformed room event: {e}");
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                if open.load(Ordering::SeqCst) {
                                    let _ = errors_tx.send(ChannelError::Dropped(
                                        "socket closed".to_string(),
                                    ));
                                }
                                return;
                            }
                            Some(Ok(_)) => {} // binary/ping/pong frames carry nothing for us
                            Some(Err(e)) => {
                                if open.load(Ordering::SeqCst) {
                                    let _ = errors_tx.send(ChannelError::Dropped(e.to_string()));
                                }
                                return;
                            }
                        },
                    }
                }
            });
        })
        .expect("spawn presence socket thread");
}
