//! In-process WebSocket poker server stand-in for integration tests.
//!
//! Records every JSON message it receives and can broadcast raw text to all
//! open connections. It tracks `registerPlayer` and `takeSeat` per
//! connection, and after every `takeSeat` and `startGame` broadcasts a
//! `gameState` listing every seated player. Connections can be dropped from
//! the server side on demand or right after a named player starts the game.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::{Map, Value, json};
use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::{net::TcpListener, sync::broadcast, time};
use tokio_tungstenite::{accept_async, tungstenite::Message};

pub struct MockServer {
    pub endpoint: String,
    state: Arc<ServerState>,
}

#[derive(Default)]
struct ServerState {
    received: Mutex<Vec<Value>>,
    seats: Mutex<BTreeMap<u8, String>>,
    connections: AtomicUsize,
    outbound: Mutex<Option<broadcast::Sender<String>>>,
    /// `None` drops every connection, `Some(name)` only that player's.
    drops: Mutex<Option<broadcast::Sender<Option<String>>>>,
    drop_on_start: Mutex<Option<String>>,
}

impl ServerState {
    fn sender(&self) -> Option<broadcast::Sender<String>> {
        self.outbound.lock().unwrap().clone()
    }

    fn dropper(&self) -> Option<broadcast::Sender<Option<String>>> {
        self.drops.lock().unwrap().clone()
    }

    fn request_drop(&self, target: Option<String>) {
        if let Some(tx) = self.dropper() {
            let _ = tx.send(target);
        }
    }

    /// A `gameState` envelope listing every seated player with 1000 chips.
    fn snapshot_text(&self, started: bool) -> String {
        let seats = self.seats.lock().unwrap().clone();
        let players: Vec<(u8, &str, f64)> = seats
            .iter()
            .map(|(seat, name)| (*seat, name.as_str(), 1000.0))
            .collect();
        let mut data = game_state(&players);
        data["gameStarted"] = json!(started);
        json!({ "messageType": "gameState", "data": data }).to_string()
    }
}

impl MockServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, _) = broadcast::channel(64);
        let (drops, _) = broadcast::channel(8);
        let state = Arc::new(ServerState {
            outbound: Mutex::new(Some(tx)),
            drops: Mutex::new(Some(drops)),
            ..ServerState::default()
        });

        let accept_state = state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = accept_state.clone();
                tokio::spawn(async move {
                    if let Ok(ws) = accept_async(stream).await {
                        handle_connection(ws, state).await;
                    }
                });
            }
        });

        Self {
            endpoint: format!("ws://{addr}"),
            state,
        }
    }

    /// Send `text` verbatim to every open connection.
    pub fn broadcast(&self, text: impl Into<String>) {
        if let Some(tx) = self.state.sender() {
            let _ = tx.send(text.into());
        }
    }

    pub fn broadcast_json(&self, message_type: &str, data: Value) {
        self.broadcast(json!({ "messageType": message_type, "data": data }).to_string());
    }

    /// Close every open connection from the server side.
    pub fn drop_connections(&self) {
        self.state.request_drop(None);
    }

    /// Close the connection of the player registered as `name`.
    pub fn drop_player(&self, name: &str) {
        self.state.request_drop(Some(name.to_string()));
    }

    /// Close `name`'s connection as soon as its `startGame` has been answered.
    pub fn drop_on_start(&self, name: &str) {
        *self.state.drop_on_start.lock().unwrap() = Some(name.to_string());
    }

    pub fn received(&self) -> Vec<Value> {
        self.state.received.lock().unwrap().clone()
    }

    pub fn received_of_type(&self, message_type: &str) -> Vec<Value> {
        self.received()
            .into_iter()
            .filter(|message| message["messageType"] == message_type)
            .collect()
    }

    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub async fn wait_for_connections(&self, count: usize) {
        wait_until(|| self.connections() >= count).await;
    }

    /// Wait until at least `count` messages of `message_type` have arrived.
    pub async fn wait_for_type(&self, message_type: &str, count: usize) -> Vec<Value> {
        wait_until(|| self.received_of_type(message_type).len() >= count).await;
        self.received_of_type(message_type)
    }
}

/// Poll `condition` every 10ms for up to five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(time::Instant::now() < deadline, "condition not met within 5s");
        time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn game_state(players: &[(u8, &str, f64)]) -> Value {
    let players: Map<String, Value> = players
        .iter()
        .map(|(seat, name, chips)| {
            (
                seat.to_string(),
                json!({ "name": name, "chips": chips, "bet": 0, "inGame": true }),
            )
        })
        .collect();
    json!({ "gameStarted": true, "players": players, "pot": 0, "communityCards": [] })
}

async fn handle_connection(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    state: Arc<ServerState>,
) {
    let (Some(tx), Some(drop_tx)) = (state.sender(), state.dropper()) else {
        return;
    };
    let mut outbound = tx.subscribe();
    let mut drops = drop_tx.subscribe();
    state.connections.fetch_add(1, Ordering::SeqCst);
    let (mut sink, mut stream) = ws.split();
    let mut name = String::new();

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let Ok(message) = serde_json::from_str::<Value>(text.as_str()) else {
                        continue;
                    };
                    state.received.lock().unwrap().push(message.clone());
                    match message["messageType"].as_str() {
                        Some("registerPlayer") => {
                            name = message["data"]["name"].as_str().unwrap_or_default().to_string();
                        }
                        Some("takeSeat") => {
                            if let Some(seat) = message["data"]["seat"].as_u64() {
                                state.seats.lock().unwrap().insert(seat as u8, name.clone());
                                let _ = tx.send(state.snapshot_text(false));
                            }
                        }
                        Some("startGame") => {
                            let _ = tx.send(state.snapshot_text(true));
                            let target = state.drop_on_start.lock().unwrap().clone();
                            if target.is_some_and(|target| target == name) {
                                state.request_drop(Some(name.clone()));
                            }
                        }
                        _ => {}
                    }
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
            text = outbound.recv() => match text {
                Ok(text) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
            target = drops.recv() => match target {
                Ok(target) if target.as_ref().is_none_or(|target| *target == name) => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    state.connections.fetch_sub(1, Ordering::SeqCst);
}
