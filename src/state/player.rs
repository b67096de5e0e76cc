//! Player records and the per-turn player state machine.
//!
//! # State Diagram
//!
//! ```text
//!                 begin_turn (every player, every turn)
//!        ┌──────────────────────────────────────────────┐
//!        ▼                                              │
//! ┌──────────────┐  assign_drawer   ┌───────────┐       │
//! │   Guessing   │─────────────────▶│  Drawing  │───────┤
//! └──────┬───────┘                  └───────────┘       │
//!        │ guess_correctly                              │
//!        ▼                                              │
//! ┌──────────────┐                                      │
//! │   Standby    │──────────────────────────────────────┘
//! └──────────────┘
//! ```

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::connection::Connection;

/// Opaque player identity, stable across reconnects within a lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(Uuid);

impl PlayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PlayerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// What a player is doing during the current turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlayerState {
    /// Still trying to guess the word
    #[default]
    Guessing,
    /// Currently drawing
    Drawing,
    /// Already guessed correctly this turn
    Standby,
}

impl PlayerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Guessing => "guessing",
            Self::Drawing => "drawing",
            Self::Standby => "standby",
        }
    }

    /// Drawing and standby players may see the full word.
    pub fn sees_full_word(&self) -> bool {
        matches!(self, Self::Drawing | Self::Standby)
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State transition events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    BeginTurn,
    AssignDrawer,
    GuessCorrectly,
}

/// Error when a state transition is invalid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition from {from} via {event:?}: {reason}")]
pub struct InvalidTransition {
    pub from: PlayerState,
    pub event: PlayerEvent,
    pub reason: &'static str,
}

impl PlayerState {
    /// Calculate the new state for an event.
    pub fn transition(self, event: PlayerEvent) -> Result<Self, InvalidTransition> {
        use PlayerEvent::*;
        use PlayerState::*;

        let invalid = |reason: &'static str| InvalidTransition {
            from: self,
            event,
            reason,
        };

        match (self, event) {
            (_, BeginTurn) => Ok(Guessing),

            (Guessing, AssignDrawer) => Ok(Drawing),
            (Drawing, AssignDrawer) => Err(invalid("Already drawing")),
            (Standby, AssignDrawer) => Err(invalid("Turn must begin first")),

            (Guessing, GuessCorrectly) => Ok(Standby),
            (Drawing, GuessCorrectly) => Err(invalid("The drawer cannot guess")),
            (Standby, GuessCorrectly) => Err(invalid("Already guessed")),
        }
    }
}

/// One participant of a lobby.
#[derive(Debug)]
pub struct Player {
    pub id: PlayerId,

    /// Display name
    pub name: String,

    /// Token used to resume this identity after a reconnect
    pub session_token: String,

    /// Live connection, exclusively owned by this record
    pub connection: Option<Connection>,

    pub connected: bool,

    /// Cumulative score for the current game
    pub score: i64,

    /// Points earned in the most recently completed turn
    pub last_score: i64,

    /// Recomputed after every score-affecting event
    pub rank: usize,

    state: PlayerState,

    /// Targets this player has voted to kick during the current turn
    kick_votes: HashSet<PlayerId>,

    pub joined_at: chrono::DateTime<chrono::Utc>,
}

impl Player {
    pub fn new(name: String) -> Self {
        Self {
            id: PlayerId::new(),
            name,
            session_token: Uuid::new_v4().to_string(),
            connection: None,
            connected: false,
            score: 0,
            last_score: 0,
            rank: 1,
            state: PlayerState::Guessing,
            kick_votes: HashSet::new(),
            joined_at: chrono::Utc::now(),
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    /// Time since this player joined the lobby.
    pub fn time_in_lobby(&self, now: chrono::DateTime<chrono::Utc>) -> chrono::Duration {
        now - self.joined_at
    }

    /// Apply an event in place, returning error if invalid.
    pub fn apply_mut(&mut self, event: PlayerEvent) -> Result<(), InvalidTransition> {
        self.state = self.state.transition(event)?;
        Ok(())
    }

    /// Reset for a new turn: back to guessing, ballots discarded.
    pub fn begin_turn(&mut self) -> Result<(), InvalidTransition> {
        self.kick_votes.clear();
        self.apply_mut(PlayerEvent::BeginTurn)
    }

    pub fn is_guessing(&self) -> bool {
        self.state == PlayerState::Guessing
    }

    pub fn is_drawing(&self) -> bool {
        self.state == PlayerState::Drawing
    }

    /// Record a ballot against `target`. Returns false if already cast.
    pub fn vote_to_kick(&mut self, target: PlayerId) -> bool {
        self.kick_votes.insert(target)
    }

    pub fn has_voted_to_kick(&self, target: &PlayerId) -> bool {
        self.kick_votes.contains(target)
    }

    pub fn withdraw_kick_vote(&mut self, target: &PlayerId) {
        self.kick_votes.remove(target);
    }

    /// Serializable view sent to clients.
    pub fn view(&self) -> PlayerView {
        PlayerView {
            id: self.id,
            name: self.name.clone(),
            score: self.score,
            last_score: self.last_score,
            rank: self.rank,
            connected: self.connected,
            state: self.state,
        }
    }
}

/// The player as clients see it in `update-players`, `next-turn` and `ready`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub score: i64,
    pub last_score: i64,
    pub rank: usize,
    pub connected: bool,
    pub state: PlayerState,
}
