//! Connection handles and the outbound delivery seam.
//!
//! The engine never writes to a socket. Every state transition pushes
//! [`Dispatch`] entries into an [`Outbox`]; the owning [`Lobby`] flushes them
//! into an injected [`Broadcaster`] while still holding the lobby lock, so
//! clients observe events in the order the state changed.
//!
//! [`Lobby`]: super::lobby::Lobby

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::ServerEvent;
use super::lobby::LobbyId;
use super::player::PlayerId;

/// Transport-assigned identity of one live socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A live connection attached to a player record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub id: ConnectionId,

    /// Remote address, used for the per-IP connection limit
    pub remote_ip: IpAddr,

    /// When this connection was established
    pub connected_at: chrono::DateTime<chrono::Utc>,
}

impl Connection {
    pub fn new(remote_ip: IpAddr) -> Self {
        Self {
            id: ConnectionId::new(),
            remote_ip,
            connected_at: chrono::Utc::now(),
        }
    }

    /// How long this connection has been open at `now`.
    pub fn age(&self, now: chrono::DateTime<chrono::Utc>) -> chrono::Duration {
        now - self.connected_at
    }
}

/// Delivery of outbound events, implemented by the transport.
///
/// Implementations must not block and must not call back into the lobby;
/// they are invoked with the lobby lock held.
pub trait Broadcaster: Send + Sync {
    /// Deliver to a single player of a lobby.
    fn unicast(&self, lobby: &LobbyId, player: &PlayerId, event: &ServerEvent);

    /// Deliver to every connected player of a lobby.
    fn broadcast(&self, lobby: &LobbyId, event: &ServerEvent);

    /// Deliver to every connected player of a lobby except `sender`.
    fn broadcast_except(&self, lobby: &LobbyId, sender: &PlayerId, event: &ServerEvent);

    /// Forcibly close a connection.
    fn close(&self, connection: &ConnectionId);
}

/// One pending outbound action.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    To(PlayerId, ServerEvent),
    All(ServerEvent),
    AllExcept(PlayerId, ServerEvent),
    Close(ConnectionId),
}

/// Ordered buffer of dispatches produced by one engine operation.
#[derive(Debug, Default)]
pub struct Outbox {
    pending: Vec<Dispatch>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_player(&mut self, player: PlayerId, event: ServerEvent) {
        self.pending.push(Dispatch::To(player, event));
    }

    pub fn to_all(&mut self, event: ServerEvent) {
        self.pending.push(Dispatch::All(event));
    }

    pub fn to_all_except(&mut self, sender: PlayerId, event: ServerEvent) {
        self.pending.push(Dispatch::AllExcept(sender, event));
    }

    pub fn system_message(&mut self, text: impl Into<String>) {
        self.to_all(ServerEvent::SystemMessage(text.into()));
    }

    pub fn private_system_message(&mut self, player: PlayerId, text: impl Into<String>) {
        self.to_player(player, ServerEvent::SystemMessage(text.into()));
    }

    pub fn close(&mut self, connection: ConnectionId) {
        self.pending.push(Dispatch::Close(connection));
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dispatch> {
        self.pending.iter()
    }

    /// Take the buffered dispatches, leaving the outbox empty.
    pub fn drain(&mut self) -> Vec<Dispatch> {
        std::mem::take(&mut self.pending)
    }

    /// Hand every buffered dispatch to `broadcaster`, in order.
    pub fn flush(&mut self, lobby: &LobbyId, broadcaster: &dyn Broadcaster) {
        for dispatch in self.drain() {
            match dispatch {
                Dispatch::To(player, event) => broadcaster.unicast(lobby, &player, &event),
                Dispatch::All(event) => broadcaster.broadcast(lobby, &event),
                Dispatch::AllExcept(sender, event) => {
                    broadcaster.broadcast_except(lobby, &sender, &event)
                }
                Dispatch::Close(connection) => broadcaster.close(&connection),
            }
        }
    }
}

/// Broadcaster that records everything it is asked to deliver.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingBroadcaster {
    pub delivered: parking_lot::Mutex<Vec<Dispatch>>,
}

#[cfg(test)]
impl RecordingBroadcaster {
    pub fn take(&self) -> Vec<Dispatch> {
        std::mem::take(&mut *self.delivered.lock())
    }
}

#[cfg(test)]
impl Broadcaster for RecordingBroadcaster {
    fn unicast(&self, _lobby: &LobbyId, player: &PlayerId, event: &ServerEvent) {
        self.delivered.lock().push(Dispatch::To(*player, event.clone()));
    }

    fn broadcast(&self, _lobby: &LobbyId, event: &ServerEvent) {
        self.delivered.lock().push(Dispatch::All(event.clone()));
    }

    fn broadcast_except(&self, _lobby: &LobbyId, sender: &PlayerId, event: &ServerEvent) {
        self.delivered
            .lock()
            .push(Dispatch::AllExcept(*sender, event.clone()));
    }

    fn close(&self, connection: &ConnectionId) {
        self.delivered.lock().push(Dispatch::Close(*connection));
    }
}
