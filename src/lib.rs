//! Sketchturn State Library
//!
//! This crate provides the authoritative server-side engine for a
//! drawing-and-guessing game.
//!
//! # Overview
//!
//! The state module provides:
//!
//! - **Turn State Machine** - Rotates the drawer through every player for a
//!   configured number of rounds, ends turns on timeout or when everyone has
//!   guessed, and finishes the game after the last turn.
//!
//! - **Words & Hints** - Offers three unused words per turn, masks the chosen
//!   word and reveals letters on a fixed schedule.
//!
//! - **Scoring** - Time-weighted guess points, a drawer bonus and
//!   competition ranks.
//!
//! - **Vote-kick** - Majority removal with point reversal when the drawer is
//!   kicked.
//!
//! - **Chat Commands** - `!start`, `!setmp`, `!nick` and `!help`.
//!
//! - **Lobby Directory** - Creation, lookup and removal of lobbies, each
//!   with its own round timer.
//!
//! # Design Principles
//!
//! 1. **One lock per lobby** - Every mutation of a lobby, timer ticks
//!    included, runs under that lobby's mutex.
//!
//! 2. **Engine is synchronous** - [`LobbyState`] takes the current time and
//!    an [`Outbox`] and never blocks.
//!
//! 3. **No networking** - Delivery goes through the [`Broadcaster`] trait the
//!    transport implements.
//!
//! 4. **Serialization-ready** - Wire events are serde types.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use sketchturn_state::state::{
//!     HtmlEscapeFilter, LobbyId, LobbyServices, LobbySettings, LobbyState, Outbox,
//!     PetNameGenerator,
//! };
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let services = LobbyServices {
//!     chat_filter: Arc::new(HtmlEscapeFilter),
//!     names: Arc::new(PetNameGenerator),
//! };
//! let words = vec!["apple".to_string(), "kite".to_string(), "moon".to_string()];
//! let (mut state, owner, _token) = LobbyState::new(
//!     LobbyId::new(),
//!     LobbySettings::default(),
//!     words,
//!     "Alice",
//!     services,
//!     StdRng::seed_from_u64(7),
//! );
//! let (guest, _) = state.join_player("Bob", &mut Outbox::new()).unwrap();
//!
//! let mut out = Outbox::new();
//! state.handle_message(owner, "!start", chrono::Utc::now(), &mut out);
//! assert_eq!(state.drawer(), Some(owner));
//! assert!(state.player(&guest).unwrap().is_guessing());
//! ```

pub mod state;

// Re-export everything from state module at crate root
pub use state::*;
