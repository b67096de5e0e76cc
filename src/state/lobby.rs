//! Lobby handles and the lobby directory.
//!
//! A [`Lobby`] owns one [`LobbyState`] behind a mutex. Every operation runs
//! the engine under that lock, flushes the resulting dispatches to the
//! [`Broadcaster`] and then reconciles the round timer with the new state.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::config::LobbySettings;
use super::connection::{Broadcaster, Connection, ConnectionId, Outbox};
use super::event::{ClientEvent, EventError};
use super::game::{LobbyServices, LobbyState};
use super::player::PlayerId;
use super::timer::{Clock, RoundTimer};
use super::words::{WordSource, WordSourceError};

/// Unique lobby identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LobbyId(Uuid);

impl LobbyId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LobbyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LobbyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for LobbyId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lobby errors.
#[derive(Debug, Error)]
pub enum LobbyError {
    #[error("unsupported language '{0}'")]
    UnsupportedLanguage(String),

    #[error("{field} must be between {min} and {max}, got {value}")]
    InvalidSetting {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("lobby is full")]
    Full,

    #[error("unknown session")]
    UnknownSession,

    #[error("too many connections from {0}")]
    TooManyConnections(IpAddr),

    #[error("lobby {0} not found")]
    NotFound(LobbyId),

    #[error("lobby has been closed")]
    Closed,

    #[error("word list unavailable: {0}")]
    WordList(#[from] WordSourceError),
}

struct LobbyCore {
    state: LobbyState,
    timer: Option<RoundTimer>,
    closed: bool,
}

/// A running lobby.
pub struct Lobby {
    id: LobbyId,
    core: Mutex<LobbyCore>,
    broadcaster: Arc<dyn Broadcaster>,
    clock: Arc<dyn Clock>,
    this: Weak<Lobby>,
}

impl fmt::Debug for Lobby {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lobby").field("id", &self.id).finish_non_exhaustive()
    }
}

impl Lobby {
    pub fn new(
        state: LobbyState,
        broadcaster: Arc<dyn Broadcaster>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id: *state.id(),
            core: Mutex::new(LobbyCore {
                state,
                timer: None,
                closed: false,
            }),
            broadcaster,
            clock,
            this: this.clone(),
        })
    }

    pub fn id(&self) -> &LobbyId {
        &self.id
    }

    /// Run `f` against the state under the lock, then deliver and reconcile.
    fn apply<T>(
        &self,
        f: impl FnOnce(&mut LobbyState, DateTime<Utc>, &mut Outbox) -> Result<T, LobbyError>,
    ) -> Result<T, LobbyError> {
        let mut core = self.core.lock();
        if core.closed {
            return Err(LobbyError::Closed);
        }

        let mut out = Outbox::new();
        let result = f(&mut core.state, self.clock.now(), &mut out);
        out.flush(&self.id, self.broadcaster.as_ref());
        self.sync_timer(&mut core);
        result
    }

    /// Keep exactly one timer running for the current epoch while a turn is
    /// active, and none otherwise. A task that died is replaced.
    fn sync_timer(&self, core: &mut LobbyCore) {
        let epoch = core.state.epoch();
        let active = core.state.is_round_active() && !core.closed;

        if let Some(timer) = core.timer.take() {
            if active && timer.epoch() == epoch && !timer.is_finished() {
                core.timer = Some(timer);
                return;
            }
            drop(timer.cancel());
        }

        if active {
            core.timer = RoundTimer::spawn(self.id, self.this.clone(), epoch);
        }
    }

    /// Called by the timer task once per tick. Returns false when the task
    /// should stop.
    pub(super) fn on_tick(&self, epoch: u64) -> bool {
        let mut core = self.core.lock();
        if core.closed || core.state.epoch() != epoch || !core.state.is_round_active() {
            return false;
        }

        let mut out = Outbox::new();
        core.state.tick(self.clock.now(), &mut out);
        out.flush(&self.id, self.broadcaster.as_ref());
        self.sync_timer(&mut core);
        core.state.epoch() == epoch
    }

    /// Decode and route one raw client frame.
    pub fn handle_raw_event(&self, sender: PlayerId, raw: &str) -> Result<(), EventError> {
        let event = ClientEvent::decode(raw).inspect_err(|e| {
            warn!(lobby = %self.id, player = %sender, error = %e, "malformed client event");
        })?;
        self.handle_event(sender, event);
        Ok(())
    }

    pub fn handle_event(&self, sender: PlayerId, event: ClientEvent) {
        let result = self.apply(|state, now, out| {
            state.handle_event(sender, event, now, out);
            Ok(())
        });
        if let Err(e) = result {
            debug!(lobby = %self.id, player = %sender, error = %e, "event dropped");
        }
    }

    /// Add a player. Returns the player's ID and session token.
    pub fn join(&self, name: &str) -> Result<(PlayerId, String), LobbyError> {
        self.apply(|state, _, out| state.join_player(name, out))
    }

    pub fn connect(
        &self,
        session_token: &str,
        connection: Connection,
    ) -> Result<PlayerId, LobbyError> {
        self.apply(|state, _, out| state.connect(session_token, connection, out))
    }

    /// Returns false once nobody in the lobby is connected.
    pub fn disconnect(&self, player: PlayerId, connection: ConnectionId) -> bool {
        self.apply(|state, now, out| Ok(state.disconnect(player, connection, now, out)))
            .unwrap_or(false)
    }

    /// Read-only access to the current state.
    pub fn inspect<T>(&self, f: impl FnOnce(&LobbyState) -> T) -> T {
        f(&self.core.lock().state)
    }

    pub fn has_connected_players(&self) -> bool {
        self.inspect(LobbyState::has_connected_players)
    }

    pub fn is_closed(&self) -> bool {
        self.core.lock().closed
    }

    /// Close the lobby if nobody is connected, atomically with the check.
    /// Returns true if the lobby is closed afterwards.
    pub fn close_if_vacant(&self) -> bool {
        let mut core = self.core.lock();
        if core.closed {
            return true;
        }
        if core.state.has_connected_players() {
            return false;
        }
        core.closed = true;
        self.sync_timer(&mut core);
        true
    }

    /// Stop the timer and refuse further operations.
    pub fn shutdown(&self) {
        let mut core = self.core.lock();
        core.closed = true;
        self.sync_timer(&mut core);
    }
}

/// Registry of live lobbies.
pub struct LobbyDirectory {
    lobbies: Mutex<HashMap<LobbyId, Arc<Lobby>>>,
    words: Arc<dyn WordSource>,
    services: LobbyServices,
    broadcaster: Arc<dyn Broadcaster>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for LobbyDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LobbyDirectory")
            .field("count", &self.count())
            .finish_non_exhaustive()
    }
}

impl LobbyDirectory {
    pub fn new(
        words: Arc<dyn WordSource>,
        services: LobbyServices,
        broadcaster: Arc<dyn Broadcaster>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            lobbies: Mutex::new(HashMap::new()),
            words,
            services,
            broadcaster,
            clock,
        }
    }

    /// Create and register a lobby owned by `owner_name`.
    ///
    /// Nothing is registered if the settings or the word list are rejected.
    pub fn create_lobby(
        &self,
        owner_name: &str,
        settings: LobbySettings,
    ) -> Result<(Arc<Lobby>, PlayerId, String), LobbyError> {
        let settings = settings.validate()?;
        let words = self.words.load(&settings.language)?;

        let id = LobbyId::new();
        let (state, owner, token) = LobbyState::new(
            id,
            settings,
            words,
            owner_name,
            self.services.clone(),
            StdRng::from_rng(&mut rand::rng()),
        );
        let lobby = Lobby::new(state, self.broadcaster.clone(), self.clock.clone());

        let count = {
            let mut lobbies = self.lobbies.lock();
            lobbies.insert(id, lobby.clone());
            lobbies.len()
        };
        info!(lobby = %id, count, "lobby created");

        Ok((lobby, owner, token))
    }

    pub fn get(&self, id: &LobbyId) -> Option<Arc<Lobby>> {
        self.lobbies.lock().get(id).cloned()
    }

    /// Look up a lobby, failing with [`LobbyError::NotFound`].
    pub fn require(&self, id: &LobbyId) -> Result<Arc<Lobby>, LobbyError> {
        self.get(id).ok_or(LobbyError::NotFound(*id))
    }

    /// Unregister and shut down a lobby.
    pub fn remove(&self, id: &LobbyId) -> Option<Arc<Lobby>> {
        let (lobby, count) = {
            let mut lobbies = self.lobbies.lock();
            let lobby = lobbies.remove(id)?;
            (lobby, lobbies.len())
        };
        lobby.shutdown();
        let age_secs = lobby.inspect(|s| s.age(self.clock.now()).num_seconds());
        info!(lobby = %id, count, age_secs, "lobby removed");
        Some(lobby)
    }

    /// Remove the lobby if nobody is connected to it.
    pub fn remove_if_vacant(&self, id: &LobbyId) -> bool {
        let (lobby, count) = {
            let mut lobbies = self.lobbies.lock();
            match lobbies.get(id) {
                Some(lobby) if lobby.close_if_vacant() => {}
                _ => return false,
            }
            let Some(lobby) = lobbies.remove(id) else {
                return false;
            };
            (lobby, lobbies.len())
        };
        let age_secs = lobby.inspect(|s| s.age(self.clock.now()).num_seconds());
        info!(lobby = %id, count, age_secs, "empty lobby removed");
        true
    }

    pub fn count(&self) -> usize {
        self.lobbies.lock().len()
    }

    pub fn lobby_ids(&self) -> Vec<LobbyId> {
        self.lobbies.lock().keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::connection::{Dispatch, RecordingBroadcaster};
    use crate::state::event::ServerEvent;
    use crate::state::game::fixture::{services, WORDS};
    use crate::state::timer::TokioClock;
    use crate::state::words::StaticWordSource;
    use std::time::Duration;

    fn directory() -> (LobbyDirectory, Arc<RecordingBroadcaster>) {
        let recorder = Arc::new(RecordingBroadcaster::default());
        let words = StaticWordSource::new().with_language("english", &WORDS);
        let directory = LobbyDirectory::new(
            Arc::new(words),
            services(),
            recorder.clone(),
            Arc::new(TokioClock::starting_at(Utc::now())),
        );
        (directory, recorder)
    }

    fn settings(rounds: u32) -> LobbySettings {
        LobbySettings {
            drawing_time: 60,
            rounds,
            custom_word_chance: 0,
            clients_per_ip_limit: 4,
            ..Default::default()
        }
    }

    fn ip() -> IpAddr {
        "192.0.2.7".parse().unwrap()
    }

    /// Lobby with an owner and one more player, both connected.
    fn two_player_lobby(
        directory: &LobbyDirectory,
        rounds: u32,
    ) -> (Arc<Lobby>, PlayerId, PlayerId) {
        let (lobby, owner, token) = directory.create_lobby("Owner", settings(rounds)).unwrap();
        lobby.connect(&token, Connection::new(ip())).unwrap();
        let (guest, token) = lobby.join("Guest").unwrap();
        lobby.connect(&token, Connection::new(ip())).unwrap();
        (lobby, owner, guest)
    }

    #[test]
    fn test_lobby_id_parse() {
        let id = LobbyId::new();
        assert_eq!(id.to_string().parse::<LobbyId>().unwrap(), id);
        assert!("not-a-uuid".parse::<LobbyId>().is_err());
    }

    #[test]
    fn test_invalid_settings_register_nothing() {
        let (directory, _) = directory();
        let result = directory.create_lobby(
            "Owner",
            LobbySettings {
                rounds: 0,
                ..Default::default()
            },
        );
        assert!(matches!(
            result,
            Err(LobbyError::InvalidSetting { field: "rounds", .. })
        ));

        let result = directory.create_lobby(
            "Owner",
            LobbySettings {
                language: "klingon".to_string(),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(LobbyError::UnsupportedLanguage(_))));
        assert_eq!(directory.count(), 0);
    }

    #[test]
    fn test_missing_word_list_registers_nothing() {
        let (directory, _) = directory();
        let result = directory.create_lobby(
            "Owner",
            LobbySettings {
                language: "german".to_string(),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(LobbyError::WordList(_))));
        assert_eq!(directory.count(), 0);
    }

    #[test]
    fn test_create_get_remove() {
        let (directory, _) = directory();
        let (lobby, owner, _) = directory.create_lobby("Owner", settings(1)).unwrap();
        let id = *lobby.id();

        assert_eq!(directory.count(), 1);
        assert_eq!(directory.lobby_ids(), vec![id]);
        assert_eq!(directory.get(&id).unwrap().inspect(|s| s.owner()), Some(owner));

        assert!(directory.remove(&id).is_some());
        assert!(directory.get(&id).is_none());
        assert!(matches!(directory.require(&id), Err(LobbyError::NotFound(_))));
        assert!(lobby.is_closed());
        assert!(matches!(lobby.join("late"), Err(LobbyError::Closed)));
    }

    #[test]
    fn test_remove_if_vacant() {
        let (directory, _) = directory();
        let (lobby, owner, guest) = two_player_lobby(&directory, 1);
        let id = *lobby.id();
        let owner_conn = lobby.inspect(|s| s.player(&owner).unwrap().connection.clone().unwrap());
        let guest_conn = lobby.inspect(|s| s.player(&guest).unwrap().connection.clone().unwrap());

        assert!(lobby.disconnect(owner, owner_conn.id));
        assert!(!directory.remove_if_vacant(&id));

        assert!(!lobby.disconnect(guest, guest_conn.id));
        assert!(directory.remove_if_vacant(&id));
        assert_eq!(directory.count(), 0);
    }

    #[test]
    fn test_connect_after_vacant_close_is_refused() {
        let (directory, _) = directory();
        let (lobby, owner, token) = directory.create_lobby("Owner", settings(1)).unwrap();
        let conn = Connection::new(ip());
        let conn_id = conn.id;
        lobby.connect(&token, conn).unwrap();

        assert!(!lobby.close_if_vacant());
        assert!(!lobby.disconnect(owner, conn_id));
        assert!(lobby.close_if_vacant());
        assert!(lobby.is_closed());

        assert!(matches!(
            lobby.connect(&token, Connection::new(ip())),
            Err(LobbyError::Closed)
        ));
        assert!(!lobby.has_connected_players());
        assert!(directory.remove_if_vacant(lobby.id()));
        assert_eq!(directory.count(), 0);
    }

    #[test]
    fn test_malformed_event_is_rejected() {
        let (directory, recorder) = directory();
        let (lobby, owner, _) = two_player_lobby(&directory, 1);
        recorder.take();

        assert!(lobby.handle_raw_event(owner, "{not json").is_err());
        assert!(recorder.take().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_runs_timer() {
        let (directory, recorder) = directory();
        let (lobby, owner, guest) = two_player_lobby(&directory, 1);
        recorder.take();

        lobby
            .handle_raw_event(owner, r#"{"type":"message","data":"!start"}"#)
            .unwrap();
        assert_eq!(lobby.inspect(|s| s.drawer()), Some(owner));
        let first_epoch = lobby.inspect(|s| s.epoch());

        let prompted = recorder
            .take()
            .into_iter()
            .any(|d| matches!(d, Dispatch::To(p, ServerEvent::PromptWords(_)) if p == owner));
        assert!(prompted);

        // The turn runs out without a word and rotation moves on.
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(lobby.inspect(|s| s.drawer()), Some(guest));
        assert!(lobby.inspect(|s| s.epoch()) > first_epoch);
        assert!(recorder.take().contains(&Dispatch::All(ServerEvent::SystemMessage(
            "Round over. No word was chosen.".to_string()
        ))));

        // Last turn of the last round: the game finishes and the timer stops.
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(lobby.inspect(|s| s.round()), 0);
        assert!(!lobby.inspect(|s| s.is_round_active()));

        let epoch = lobby.inspect(|s| s.epoch());
        recorder.take();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(lobby.inspect(|s| s.epoch()), epoch);
        assert!(recorder.take().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hints_revealed_by_timer() {
        let (directory, recorder) = directory();
        let (lobby, owner, guest) = two_player_lobby(&directory, 1);

        lobby
            .handle_raw_event(owner, r#"{"type":"message","data":"!start"}"#)
            .unwrap();
        lobby
            .handle_raw_event(owner, r#"{"type":"choose-word","data":0}"#)
            .unwrap();
        recorder.take();

        tokio::time::sleep(Duration::from_millis(50_500)).await;
        let hidden_for_guest = lobby.inspect(|s| {
            s.available_hints(s.player(&guest).unwrap())
                .iter()
                .filter(|h| h.is_hidden())
                .count()
        });
        let word_len = lobby.inspect(|s| s.current_word().chars().count());
        assert_eq!(hidden_for_guest, word_len - 2);
        assert_eq!(lobby.inspect(|s| s.drawer()), Some(owner));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guess_ending_turn_restarts_timer() {
        let (directory, _) = directory();
        let (lobby, owner, guest) = two_player_lobby(&directory, 2);

        lobby
            .handle_raw_event(owner, r#"{"type":"message","data":"!start"}"#)
            .unwrap();
        lobby
            .handle_raw_event(owner, r#"{"type":"choose-word","data":1}"#)
            .unwrap();
        let word = lobby.inspect(|s| s.current_word().to_string());

        tokio::time::sleep(Duration::from_secs(10)).await;
        lobby.handle_event(guest, ClientEvent::Message(word));
        assert_eq!(lobby.inspect(|s| s.drawer()), Some(guest));

        // The new turn gets a full 60 seconds; the old timer must not end it early.
        tokio::time::sleep(Duration::from_secs(55)).await;
        assert_eq!(lobby.inspect(|s| s.drawer()), Some(guest));
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(lobby.inspect(|s| s.round()), 2);
        assert_eq!(lobby.inspect(|s| s.drawer()), Some(owner));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_timer() {
        let (directory, recorder) = directory();
        let (lobby, owner, _) = two_player_lobby(&directory, 1);
        lobby
            .handle_raw_event(owner, r#"{"type":"message","data":"!start"}"#)
            .unwrap();

        directory.remove(lobby.id());
        recorder.take();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(recorder.take().is_empty());
        assert_eq!(lobby.inspect(|s| s.drawer()), Some(owner));
    }
}
