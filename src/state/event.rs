//! Inbound client events and outbound server events.
//!
//! Both directions use the same envelope: `{"type": "<kebab-case>", "data": ...}`.

use serde::{Deserialize, Serialize};

use super::player::{PlayerId, PlayerView};
use super::words::WordHint;

/// RGB color of a drawing primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// A straight stroke segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Line {
    pub from_x: f32,
    pub from_y: f32,
    pub to_x: f32,
    pub to_y: f32,
    pub color: RgbColor,
    pub line_width: f32,
}

/// A flood fill starting at a point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub x: f32,
    pub y: f32,
    pub color: RgbColor,
}

/// One instruction of the current drawing, replayed to late joiners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum DrawOp {
    Line(Line),
    Fill(Fill),
}

/// Events a client may send.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    Message(String),
    Line(Line),
    Fill(Fill),
    ClearDrawingBoard,
    ChooseWord(usize),
    KickVote(String),
}

impl ClientEvent {
    /// Decode a raw text frame.
    pub fn decode(raw: &str) -> Result<Self, EventError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Inbound payload could not be understood.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("malformed event: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A chat line as displayed by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub author: String,
    pub content: String,
}

/// State right after a new turn started. No word has been chosen yet, so
/// hints and the drawing are deliberately absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextTurn {
    pub round: u32,
    pub players: Vec<PlayerView>,
    pub round_end_time: i64,
}

/// Everything a freshly connected client needs to render the lobby.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ready {
    pub player_id: PlayerId,
    pub drawing: bool,
    pub round: u32,
    pub max_rounds: u32,
    pub round_end_time: i64,
    pub word_hints: Vec<WordHint>,
    pub players: Vec<PlayerView>,
    pub current_drawing: Vec<DrawOp>,
}

/// Events the server emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    SystemMessage(String),
    Message(ChatMessage),
    NonGuessingPlayerMessage(ChatMessage),
    UpdateWordhint(Vec<WordHint>),
    UpdatePlayers(Vec<PlayerView>),
    CorrectGuess,
    NextTurn(NextTurn),
    PromptWords(Vec<String>),
    YourTurn,
    Ready(Box<Ready>),
    ResetUsername,
    PersistUsername(String),
    Line(Line),
    Fill(Fill),
    ClearDrawingBoard,
}

impl ServerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SystemMessage(_) => "system-message",
            Self::Message(_) => "message",
            Self::NonGuessingPlayerMessage(_) => "non-guessing-player-message",
            Self::UpdateWordhint(_) => "update-wordhint",
            Self::UpdatePlayers(_) => "update-players",
            Self::CorrectGuess => "correct-guess",
            Self::NextTurn(_) => "next-turn",
            Self::PromptWords(_) => "prompt-words",
            Self::YourTurn => "your-turn",
            Self::Ready(_) => "ready",
            Self::ResetUsername => "reset-username",
            Self::PersistUsername(_) => "persist-username",
            Self::Line(_) => "line",
            Self::Fill(_) => "fill",
            Self::ClearDrawingBoard => "clear-drawing-board",
        }
    }

    /// Convert to JSON for sending to clients.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}
