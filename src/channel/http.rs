//! Request/stream hybrid transport.
//!
//! Outbound intents go as plain POSTs, one FIFO worker per channel so a later
//! `resolved` can never overtake this participant's earlier `trouble`.
//! Inbound events arrive on a server-sent event stream read by a pump thread;
//! one malformed event is discarded with a warning, it never stops the
//! stream. Blocking HTTP lives entirely on the worker threads.

use crate::channel::{ChannelError, PresenceChannel, PresenceIntent, RoomEvent};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::io::{BufRead, BufReader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How long `connect` waits for the join handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Presence authority endpoint configuration.
#[derive(Debug, Clone)]
pub struct HttpChannelConfig {
    /// Base URL of the presence authority
    pub base_url: String,
}

impl HttpChannelConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn join_url(&self, room: &str, user: &str) -> String {
        format!("{}/join/{room}/{user}", self.base_url)
    }

    pub fn leave_url(&self, room: &str, user: &str) -> String {
        format!("{}/leave/{room}/{user}", self.base_url)
    }

    pub fn intent_url(&self, room: &str, user: &str, intent: PresenceIntent) -> String {
        let action = match intent {
            PresenceIntent::Trouble => "trouble",
            PresenceIntent::Resolved => "resolve",
        };
        format!("{}/{action}/{room}/{user}", self.base_url)
    }

    pub fn stream_url(&self, room: &str) -> String {
        format!("{}/stream/{room}", self.base_url)
    }
}

enum Outbound {
    Intent(PresenceIntent),
    Leave,
}

/// Channel handle over the request/stream transport.
pub struct HttpChannel {
    token: String,
    outbound_tx: Sender<Outbound>,
    events_rx: Receiver<RoomEvent>,
    // Held so the receivers never report disconnection while the handle lives.
    _events_tx: Sender<RoomEvent>,
    errors_rx: Receiver<ChannelError>,
    _errors_tx: Sender<ChannelError>,
    open: Arc<AtomicBool>,
    connected: bool,
}

impl HttpChannel {
    /// Join `room` as `user` and start the outbound worker and stream pump.
    ///
    /// Retrying a failed connect with the same identity is safe: the
    /// authority deduplicates by identity, and the session token travels in
    /// the `X-Session-Token` header for its benefit.
    pub fn connect(
        config: HttpChannelConfig,
        room: &str,
        user: &str,
    ) -> Result<Self, ChannelError> {
        let token = uuid::Uuid::new_v4().to_string();
        let (events_tx, events_rx) = unbounded();
        let (errors_tx, errors_rx) = unbounded();
        let (outbound_tx, outbound_rx) = unbounded();
        let (ack_tx, ack_rx) = bounded(1);
        let open = Arc::new(AtomicBool::new(true));

        spawn_sender_worker(
            config.clone(),
            room.to_string(),
            user.to_string(),
            token.clone(),
            outbound_rx,
            ack_tx,
            errors_tx.clone(),
        );

        match ack_rx.recv_timeout(CONNECT_TIMEOUT) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(ChannelError::Connect(
                    "timed out waiting for join handshake".to_string(),
                ))
            }
        }

        spawn_stream_pump(
            config.stream_url(room),
            events_tx.clone(),
            errors_tx.clone(),
            open.clone(),
        );

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

impl PresenceChannel for HttpChannel {
    fn session_token(&self) -> &str {
        &self.token
    }

    fn send(&mut self, intent: PresenceIntent) -> Result<(), ChannelError> {
        if !self.connected {
            return Err(ChannelError::Send("channel is disconnected".to_string()));
        }
        self.outbound_tx
            .send(Outbound::Intent(intent))
            .map_err(|_| ChannelError::Send("outbound worker is gone".to_string()))
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
        let _ = self.outbound_tx.send(Outbound::Leave);
        while self.events_rx.try_recv().is_ok() {}
    }
}

impl Drop for HttpChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// FIFO worker: one join handshake, then intents in send order, then leave.
fn spawn_sender_worker(
    config: HttpChannelConfig,
    room: String,
    user: String,
    token: String,
    outbound_rx: Receiver<Outbound>,
    ack_tx: Sender<Result<(), ChannelError>>,
    errors_tx: Sender<ChannelError>,
) {
    std::thread::Builder::new()
        .name(format!("presence-send-{user}"))
        .spawn(move || {
            let client = match reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
            {
                Ok(client) => client,
                Err(e) => {
                    let _ = ack_tx.send(Err(ChannelError::Connect(e.to_string())));
                    return;
                }
            };

            if let Err(e) = post(&client, &config.join_url(&room, &user), &token) {
                let _ = ack_tx.send(Err(ChannelError::Connect(e)));
                return;
            }
            let _ = ack_tx.send(Ok(()));

            while let Ok(outbound) = outbound_rx.recv() {
                match outbound {
                    Outbound::Intent(intent) => {
                        let url = config.intent_url(&room, &user, intent);
                        // One immediate retry; beyond that the failure is
                        // reported and the next intent proceeds normally.
                        let result = post(&client, &url, &token)
                            .or_else(|_| post(&client, &url, &token));
                        if let Err(e) = result {
                            tracing::warn!(%user, ?intent, "intent delivery failed: {e}");
                            let _ = errors_tx.send(ChannelError::Send(e));
                        }
                    }
                    Outbound::Leave => {
                        if let Err(e) = post(&client, &config.leave_url(&room, &user), &token) {
                            tracing::debug!(%user, "leave notification failed: {e}");
                        }
                        return;
                    }
                }
            }
        })
        .expect("spawn presence sender thread");
}

fn post(client: &reqwest::blocking::Client, url: &str, token: &str) -> Result<(), String> {
    let response = client
        .post(url)
        .header("X-Session-Token", token)
        .send()
        .map_err(|e| e.to_string())?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("{url} returned {status}"));
    }
    Ok(())
}

/// Pump thread: reads `data:` lines off the event stream until the stream or
/// the handle goes away.
fn spawn_stream_pump(
    stream_url: String,
    events_tx: Sender<RoomEvent>,
    errors_tx: Sender<ChannelError>,
    open: Arc<AtomicBool>,
) {
    std::thread::Builder::new()
        .name("presence-stream".to_string())
        .spawn(move || {
            // Streaming read: no overall request timeout.
            let client = match reqwest::blocking::Client::builder().build() {
                Ok(client) => client,
                Err(e) => {
                    let _ = errors_tx.send(ChannelError::Dropped(e.to_string()));
                    return;
                }
            };
            let response = match client.get(&stream_url).send() {
                Ok(response) if response.status().is_success() => response,
                Ok(response) => {
                    let _ = errors_tx.send(ChannelError::Dropped(format!(
                        "stream returned {}",
                        response.status()
                    )));
                    return;
                }
                Err(e) => {
                    if open.load(Ordering::SeqCst) {
                        let _ = errors_tx.send(ChannelError::Dropped(e.to_string()));
                    }
                    return;
                }
            };

            for line in BufReader::new(response).lines() {
                if !open.load(Ordering::SeqCst) {
                    return;
                }
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        let _ = errors_tx.send(ChannelError::Dropped(e.to_string()));
                        return;
                    }
                };
                let line = line.trim();
                if line.is_empty() || line.starts_with(':') {
                    continue;
                }
                let Some(payload) = line.strip_prefix("data:") else {
                    continue;
                };
                match serde_json::from_str::<RoomEvent>(payload.trim_start()) {
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

            if open.load(Ordering::SeqCst) {
                let _ = errors_tx.send(ChannelError::Dropped("stream ended".to_string()));
            }
        })
        .expect("spawn presence stream thread");
}
