use std::sync::Arc;

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;
use uuid::Uuid;

use super::{presence::ConnectionId, sse::SseHub};
use crate::dto::sse::ServerEvent;

const SPECTATOR_CAPACITY: usize = 32;

/// Handle used to push messages to one connected socket.
#[derive(Clone)]
pub struct Subscriber {
    /// Writer channel of the socket.
    pub tx: mpsc::UnboundedSender<Message>,
    /// Authenticated user behind the socket, if any.
    pub user_id: Option<Uuid>,
}

/// Broadcast group of one session: connected sockets plus spectator streams.
pub struct Room {
    subscribers: DashMap<ConnectionId, Subscriber>,
    spectators: SseHub,
}

impl Room {
    fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
            spectators: SseHub::new(SPECTATOR_CAPACITY),
        }
    }

    /// Hub mirrored to spectator SSE streams.
    pub fn spectators(&self) -> &SseHub {
        &self.spectators
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver `message` to every subscriber, dropping the ones whose writer is gone.
    pub fn send_all(&self, message: &Message) -> usize {
        self.send_where(message, |_| true)
    }

    /// Deliver `message` to subscribers matching `filter`, dropping the ones whose writer is gone.
    ///
    /// Returns the number of successful deliveries.
    pub fn send_where<F>(&self, message: &Message, filter: F) -> usize
    where
        F: Fn(&Subscriber) -> bool,
    {
        let targets: Vec<(ConnectionId, mpsc::UnboundedSender<Message>)> = self
            .subscribers
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| (*entry.key(), entry.tx.clone()))
            .collect();

        let mut delivered = 0;
        for (connection_id, tx) in targets {
            if tx.send(message.clone()).is_ok() {
                delivered += 1;
            } else {
                debug!(connection = %connection_id, "writer closed, dropping subscriber");
                self.subscribers.remove(&connection_id);
            }
        }
        delivered
    }
}

/// Rooms keyed by session identifier.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<Uuid, Arc<Room>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing room of `session_id`, if any socket or spectator touched it.
    pub fn get(&self, session_id: Uuid) -> Option<Arc<Room>> {
        self.rooms.get(&session_id).map(|room| room.clone())
    }

    /// Add a socket to the room of `session_id`.
    ///
    /// The insert happens while the map entry is held, so a concurrent
    /// [`RoomRegistry::release_if_idle`] cannot discard the room in between.
    pub fn join(&self, session_id: Uuid, connection_id: ConnectionId, subscriber: Subscriber) {
        let room = self
            .rooms
            .entry(session_id)
            .or_insert_with(|| Arc::new(Room::new()));
        room.subscribers.insert(connection_id, subscriber);
    }

    /// Subscribe a spectator stream to the room of `session_id`, under the same entry guard as [`RoomRegistry::join`].
    pub fn subscribe_spectator(&self, session_id: Uuid) -> broadcast::Receiver<ServerEvent> {
        let room = self
            .rooms
            .entry(session_id)
            .or_insert_with(|| Arc::new(Room::new()));
        room.spectators.subscribe()
    }

    /// Remove a socket, discarding the room once nobody listens to it anymore.
    pub fn leave(&self, session_id: Uuid, connection_id: ConnectionId) {
        if let Some(room) = self.rooms.get(&session_id) {
            room.subscribers.remove(&connection_id);
        }
        self.release_if_idle(session_id);
    }

    /// Discard the room of `session_id` once no socket or spectator listens to it.
    pub fn release_if_idle(&self, session_id: Uuid) {
        self.rooms.remove_if(&session_id, |_, room| {
            room.subscribers.is_empty() && room.spectators.receiver_count() == 0
        });
    }
}
