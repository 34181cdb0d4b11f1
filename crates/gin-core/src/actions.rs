//! Player actions and the events they produce.
//!
//! This module defines everything a seated player can ask of a round, and
//! the events the round reports back once an action has been applied.

use crate::card::Card;
use crate::game::PlayerId;
use serde::{Deserialize, Serialize};

/// All possible actions a player can take
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameAction {
    // ==================== Turn Actions ====================
    /// Take the top card of the deck
    DrawDeck,
    /// Take the exposed top card of the discard pile
    DrawDiscard,
    /// Put a card from hand on top of the discard pile, ending the turn
    Discard(Card),
    /// Declare gin on the just-drawn hand
    Gin,

    // ==================== Between Rounds ====================
    /// Vote to start a fresh match
    Rematch,

    // ==================== Side Channel ====================
    /// Remember how the player arranged their hand (card ids)
    HandOrder(Vec<String>),
}

/// Where a drawn card came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrawSource {
    Deck,
    Discard,
}

/// How a round was won. Only gin is played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WinType {
    Gin,
}

/// Details of a deck replenishment from the discard pile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplenishInfo {
    /// Deck size before
    pub before: usize,
    /// Deck size after
    pub after: usize,
    /// Milliseconds since the Unix epoch
    pub ts: u64,
}

/// Events that occur as a result of actions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEvent {
    /// A new round was dealt
    RoundStarted { round_id: u32 },

    /// The discard pile was shuffled back into the deck
    DeckReplenished(ReplenishInfo),

    /// A player drew a card
    CardDrawn { player: PlayerId, source: DrawSource },

    /// A player discarded, passing the turn
    CardDiscarded {
        player: PlayerId,
        card: Card,
        next_player: PlayerId,
    },

    /// A round ended
    RoundWon {
        winner: PlayerId,
        loser: PlayerId,
        win_type: WinType,
        /// Deadwood points charged to the loser
        points: u32,
    },

    /// A player's score crossed the target
    MatchWon { winner: PlayerId, loser: PlayerId },

    /// A player voted for a rematch
    RematchVoted { player: PlayerId },

    /// Both players voted and the match was reset
    MatchReset,

    /// A player's hand display order was recorded
    HandOrderRecorded { player: PlayerId },
}

impl GameEvent {
    /// Whether clients need a fresh snapshot after this event
    pub fn changes_view(&self) -> bool {
        !matches!(self, GameEvent::HandOrderRecorded { .. })
    }
}
