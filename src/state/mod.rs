//! Game state for sketchturn lobbies.
//!
//! This module provides the engine and the handles around it:
//!
//! - `player` - Player records and the per-turn player state machine
//! - `connection` - Connection handles and the outbound [`Broadcaster`] seam
//! - `event` - Client and server wire events
//! - `game` - The turn state machine ([`LobbyState`])
//! - `words` - Word selection, hints and word lists
//! - `scoring` - Guess points, drawer bonus and ranks
//! - `votekick` - Vote-based removal
//! - `chat` - Chat commands and text filtering
//! - `lobby` - Lock-holding [`Lobby`] handles and the [`LobbyDirectory`]
//! - `timer` - Per-lobby round timer
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                              AppState                                │
//! │                                                                      │
//! │  ┌────────────────────────────────────────────────────────────────┐  │
//! │  │                      LobbyDirectory                            │  │
//! │  │   lobby_id → Arc<Lobby>                                        │  │
//! │  └──────────────┬─────────────────────────────────────────────────┘  │
//! │                 │                                                    │
//! │  ┌──────────────▼──────────────┐        ┌──────────────────────┐    │
//! │  │ Lobby (Mutex)               │ ticks  │ RoundTimer (task)    │    │
//! │  │   LobbyState ── Outbox ─────┼───────▶│   epoch-bound        │    │
//! │  │        │                    │◀───────┤                      │    │
//! │  └────────┼────────────────────┘        └──────────────────────┘    │
//! │           ▼                                                          │
//! │     Broadcaster (transport)                                          │
//! │                                                                      │
//! │  PlayerState per turn:                                               │
//! │      Guessing ──▶ Standby        Guessing ──▶ Drawing                │
//! │          ▲           │               ▲           │                   │
//! │          └───────────┴───────────────┴───────────┘  (next turn)      │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use sketchturn_state::state::{AppState, LobbySettings, Connection};
//!
//! let app = AppState::new(word_source, broadcaster);
//! let (lobby_id, owner, token) = app.create_lobby("Alice", LobbySettings::default())?;
//! app.connect(&lobby_id, &token, Connection::new(remote_ip))?;
//! app.handle_event(&lobby_id, owner, r#"{"type":"message","data":"!start"}"#)?;
//! ```

pub mod chat;
pub mod config;
pub mod connection;
pub mod event;
pub mod game;
pub mod lobby;
pub mod names;
pub mod player;
pub mod scoring;
pub mod timer;
pub mod votekick;
pub mod words;

use std::sync::Arc;

use thiserror::Error;

// Re-export commonly used types
pub use chat::{ChatFilter, Command, HtmlEscapeFilter};
pub use config::{LobbySettings, LOBBY_SETTING_BOUNDS, SUPPORTED_LANGUAGES};
pub use connection::{Broadcaster, Connection, ConnectionId, Dispatch, Outbox};
pub use event::{ClientEvent, EventError, ServerEvent};
pub use game::{LobbyServices, LobbyState};
pub use lobby::{Lobby, LobbyDirectory, LobbyError, LobbyId};
pub use names::{NameGenerator, PetNameGenerator};
pub use player::{InvalidTransition, Player, PlayerEvent, PlayerId, PlayerState, PlayerView};
pub use timer::{Clock, SystemClock, TokioClock};
pub use words::{DirectoryWordSource, StaticWordSource, WordHint, WordSource, WordSourceError};

/// Failure of an ID-routed request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error(transparent)]
    Lobby(#[from] LobbyError),

    #[error(transparent)]
    Event(#[from] EventError),
}

/// Combined application state.
///
/// Routes transport requests by lobby ID and removes lobbies once their last
/// player disconnects. You can also use the [`LobbyDirectory`] directly.
#[derive(Debug)]
pub struct AppState {
    pub lobbies: LobbyDirectory,
}

impl AppState {
    /// Default services: HTML escaping, pet names and the system clock.
    pub fn new(words: Arc<dyn WordSource>, broadcaster: Arc<dyn Broadcaster>) -> Self {
        let services = LobbyServices {
            chat_filter: Arc::new(HtmlEscapeFilter),
            names: Arc::new(PetNameGenerator),
        };
        Self::with_services(words, services, broadcaster, Arc::new(SystemClock))
    }

    pub fn with_services(
        words: Arc<dyn WordSource>,
        services: LobbyServices,
        broadcaster: Arc<dyn Broadcaster>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            lobbies: LobbyDirectory::new(words, services, broadcaster, clock),
        }
    }

    /// Create a lobby. Returns its ID with the owner's ID and session token.
    pub fn create_lobby(
        &self,
        owner_name: &str,
        settings: LobbySettings,
    ) -> Result<(LobbyId, PlayerId, String), LobbyError> {
        let (lobby, owner, token) = self.lobbies.create_lobby(owner_name, settings)?;
        Ok((*lobby.id(), owner, token))
    }

    pub fn join(&self, lobby_id: &LobbyId, name: &str) -> Result<(PlayerId, String), LobbyError> {
        self.lobbies.require(lobby_id)?.join(name)
    }

    pub fn connect(
        &self,
        lobby_id: &LobbyId,
        session_token: &str,
        connection: Connection,
    ) -> Result<PlayerId, LobbyError> {
        self.lobbies.require(lobby_id)?.connect(session_token, connection)
    }

    /// Detach a connection; the lobby goes away with its last connection.
    pub fn disconnect(&self, lobby_id: &LobbyId, player: PlayerId, connection: ConnectionId) {
        let Some(lobby) = self.lobbies.get(lobby_id) else {
            return;
        };
        if !lobby.disconnect(player, connection) {
            self.lobbies.remove_if_vacant(lobby_id);
        }
    }

    pub fn handle_event(
        &self,
        lobby_id: &LobbyId,
        sender: PlayerId,
        raw: &str,
    ) -> Result<(), RequestError> {
        let lobby = self.lobbies.require(lobby_id)?;
        lobby.handle_raw_event(sender, raw)?;
        Ok(())
    }

    pub fn lobby_count(&self) -> usize {
        self.lobbies.count()
    }
}
