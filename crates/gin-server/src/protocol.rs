//! WebSocket protocol messages for the Gin Rummy server.

use gin_core::{Card, GameAction, PlayerId, PlayerView, ReplenishInfo, RoundEnd, RoundReveal};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Create a room and take seat 0
    #[serde(rename_all = "camelCase")]
    CreateRoom {
        #[serde(default, deserialize_with = "lenient_code")]
        code: String,
        #[serde(default)]
        players_needed: Option<LooseCount>,
        #[serde(default)]
        points_target: Option<LooseCount>,
    },

    /// Join an existing room by code
    JoinRoom {
        #[serde(default, deserialize_with = "lenient_code")]
        code: String,
    },

    /// Deal the first round (host only)
    StartGame {
        #[serde(default, deserialize_with = "lenient_code")]
        code: String,
    },

    /// Report the current display order of the hand
    HandOrder { order: Vec<String> },

    #[serde(rename = "draw-deck")]
    DrawDeck,

    #[serde(rename = "draw-discard")]
    DrawDiscard,

    #[serde(rename_all = "camelCase")]
    Discard { card_id: String },

    Gin,

    Rematch,
}

impl ClientMessage {
    /// The in-game action this message carries, if any.
    ///
    /// A discard naming a card id that doesn't parse yields `None` and is
    /// dropped like any other illegal action.
    pub fn into_action(self) -> Option<GameAction> {
        match self {
            ClientMessage::HandOrder { order } => Some(GameAction::HandOrder(order)),
            ClientMessage::DrawDeck => Some(GameAction::DrawDeck),
            ClientMessage::DrawDiscard => Some(GameAction::DrawDiscard),
            ClientMessage::Discard { card_id } => {
                card_id.parse::<Card>().ok().map(GameAction::Discard)
            }
            ClientMessage::Gin => Some(GameAction::Gin),
            ClientMessage::Rematch => Some(GameAction::Rematch),
            ClientMessage::CreateRoom { .. }
            | ClientMessage::JoinRoom { .. }
            | ClientMessage::StartGame { .. } => None,
        }
    }
}

/// A count that browsers may send as a number or as a numeric string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LooseCount {
    Number(serde_json::Number),
    Text(String),
    Other(Value),
}

impl LooseCount {
    /// The whole, non-negative value. Blank text reads as zero.
    pub fn value(&self) -> Option<u32> {
        match self {
            LooseCount::Number(n) => n
                .as_u64()
                .or_else(|| {
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                        .map(|f| f as u64)
                })
                .and_then(|n| u32::try_from(n).ok()),
            LooseCount::Text(s) if s.trim().is_empty() => Some(0),
            LooseCount::Text(s) => s.trim().parse().ok(),
            LooseCount::Other(_) => None,
        }
    }
}

impl From<u32> for LooseCount {
    fn from(n: u32) -> Self {
        LooseCount::Number(n.into())
    }
}

/// Room codes arrive as strings, but a numeric code is accepted and
/// anything else reads as empty.
fn lenient_code<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Seat assigned on create/join
    #[serde(rename_all = "camelCase")]
    Init { player_id: PlayerId },

    /// Joined room successfully
    JoinOk { code: String },

    /// Create/join/start refused
    JoinError { message: String },

    /// Room occupancy changed
    RoomUpdate {
        code: String,
        joined: usize,
        needed: usize,
    },

    /// Host started the game
    GameStart { code: String },

    /// Private per-player snapshot
    State(Box<PlayerView>),

    /// Discard pile shuffled back into the deck
    #[serde(rename_all = "camelCase")]
    DeckReshuffle {
        code: String,
        deck_count: usize,
        info: ReplenishInfo,
    },

    /// Round summary with both hands
    RoundEnd(Box<RoundEnd>),

    /// Reveal payload for the end-of-round animation
    RoundReveal {
        code: String,
        #[serde(flatten)]
        reveal: Box<RoundReveal>,
    },
}
