/// Realtime gateway: relays published BidEvents to every watcher currently
/// subscribed to that auction's topic.
// region:    --- Imports
use crate::auction::events::AuctionEvent;
use crate::auth::AuthUser;
use crate::fanout;
use crate::message_broker::KafkaConsumer;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};

// endregion: --- Imports

// region:    --- Client Protocol

pub type ClientId = u64;

/// Frames an authenticated watcher may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    JoinAuction { auction_id: i64 },
    LeaveAuction { auction_id: i64 },
}

// endregion: --- Client Protocol

// region:    --- Subscription Registry

/// Per-auction rooms of connected watchers.
///
/// Senders that fail are pruned on the next relay, so a crashed connection
/// cannot wedge a room.
pub struct SubscriptionRegistry {
    rooms: RwLock<HashMap<i64, HashMap<ClientId, mpsc::UnboundedSender<Message>>>>,
    next_client_id: AtomicU64,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            next_client_id: AtomicU64::new(1),
        }
    }

    pub fn next_client_id(&self) -> ClientId {
        self.next_client_id.fetch_add(1, Ordering::SeqCst)
    }

    pub async fn join(
        &self,
        auction_id: i64,
        client_id: ClientId,
        sender: mpsc::UnboundedSender<Message>,
    ) {
        self.rooms
            .write()
            .await
            .entry(auction_id)
            .or_default()
            .insert(client_id, sender);
        debug!(
            "{:<12} --> client {} joined auction {}",
            "Gateway", client_id, auction_id
        );
    }

    pub async fn leave(&self, auction_id: i64, client_id: ClientId) {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get_mut(&auction_id) {
            room.remove(&client_id);
            if room.is_empty() {
                rooms.remove(&auction_id);
            }
        }
    }

    /// Tear down every subscription a disconnecting watcher holds.
    pub async fn remove_client(&self, client_id: ClientId) {
        let mut rooms = self.rooms.write().await;
        for room in rooms.values_mut() {
            room.remove(&client_id);
        }
        rooms.retain(|_, room| !room.is_empty());
    }

    /// Forward a payload verbatim to every member of an auction's room.
    /// Returns the number of watchers reached.
    pub async fn relay(&self, auction_id: i64, payload: &str) -> usize {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(&auction_id) else {
            return 0;
        };
        room.retain(|_, sender| sender.send(Message::Text(payload.to_string())).is_ok());
        let delivered = room.len();
        if room.is_empty() {
            rooms.remove(&auction_id);
        }
        delivered
    }

    pub async fn room_size(&self, auction_id: i64) -> usize {
        self.rooms
            .read()
            .await
            .get(&auction_id)
            .map(|room| room.len())
            .unwrap_or(0)
    }
}

// endregion: --- Subscription Registry

// region:    --- Client Session

/// Drive one authenticated watcher's connection until it closes, then tear
/// down its subscriptions.
pub async fn client_session(
    socket: WebSocket,
    registry: Arc<SubscriptionRegistry>,
    watcher: AuthUser,
) {
    let client_id = registry.next_client_id();
    info!(
        "{:<12} --> watcher {} connected as client {}",
        "Gateway", watcher.id, client_id
    );

    let (mut sink, mut stream) = socket.split();
    let (sender, mut receiver) = mpsc::unbounded_channel::<Message>();

    let send_task = tokio::spawn(async move {
        while let Some(message) = receiver.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::JoinAuction { auction_id }) => {
                    registry.join(auction_id, client_id, sender.clone()).await;
                }
                Ok(ClientMessage::LeaveAuction { auction_id }) => {
                    registry.leave(auction_id, client_id).await;
                }
                Err(e) => {
                    debug!(
                        "{:<12} --> ignoring malformed client frame: {}",
                        "Gateway", e
                    );
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("{:<12} --> client {} socket error: {}", "Gateway", client_id, e);
                break;
            }
        }
    }

    registry.remove_client(client_id).await;
    send_task.abort();
    info!("{:<12} --> client {} disconnected", "Gateway", client_id);
}

// endregion: --- Client Session

// region:    --- Relay

/// Consume every auction's bid topic and fan each event out to that
/// auction's room. Malformed topics or payloads are dropped, never fatal.
pub async fn run_relay(consumer: Arc<KafkaConsumer>, registry: Arc<SubscriptionRegistry>) {
    let result = consumer
        .consume(&[fanout::BID_TOPIC_PATTERN], move |topic, payload| {
            let registry = Arc::clone(&registry);
            Box::pin(async move {
                let Some(auction_id) = fanout::parse_bid_topic(&topic) else {
                    warn!("{:<12} --> dropping event on foreign topic: {}", "Gateway", topic);
                    return Ok(());
                };

                let Ok(text) = std::str::from_utf8(&payload) else {
                    warn!(
                        "{:<12} --> dropping non-utf8 event on {}",
                        "Gateway", topic
                    );
                    return Ok(());
                };

                if serde_json::from_str::<AuctionEvent>(text).is_err() {
                    warn!("{:<12} --> dropping malformed event on {}", "Gateway", topic);
                    return Ok(());
                }

                let delivered = registry.relay(auction_id, text).await;
                debug!(
                    "{:<12} --> relayed event on auction {} to {} watchers",
                    "Gateway", auction_id, delivered
                );
                Ok(())
            })
        })
        .await;

    if let Err(e) = result {
        error!("{:<12} --> relay loop terminated: {:?}", "Gateway", e);
    }
}

// endregion: --- Relay

// region:    --- Tests


// endregion: --- Tests
