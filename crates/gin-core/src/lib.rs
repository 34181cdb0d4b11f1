//! Gin Rummy round engine
//!
//! This crate provides the authoritative game logic for a two-player Gin
//! Rummy server, including:
//! - Card identity, values, and deck construction
//! - Meld enumeration and minimum-deadwood search
//! - Round and match state machine with full rule enforcement
//! - Per-player views and end-of-round reveal payloads
//!
//! # Architecture
//!
//! The engine knows nothing about sockets or rooms. A server feeds it
//! `GameAction`s tagged with a seat index and turns the returned
//! `GameEvent`s and `PlayerView`s into messages.
//!
//! # Modules
//!
//! - [`card`]: Cards, ranks, suits, deck construction
//! - [`meld`]: Meld candidates and the deadwood optimiser
//! - [`game`]: Round/match state machine
//! - [`view`]: Per-player snapshots and reveal payloads
//! - [`bot`]: Computer players

pub mod actions;
pub mod bot;
pub mod card;
pub mod game;
pub mod meld;
pub mod view;

// Re-export commonly used types
pub use actions::{DrawSource, GameAction, GameEvent, ReplenishInfo, WinType};
pub use bot::{Bot, BotDifficulty};
pub use card::{
    build_standard_deck, card_value, rank_order, shuffle, Card, CardParseError, Rank, Suit,
    DECK_SIZE,
};
pub use game::{
    GameError, GameState, MatchState, PlayerId, Round, TurnPhase, DEFAULT_TARGET_SCORE, HAND_SIZE,
    PLAYER_COUNT,
};
pub use meld::{
    all_melds, best_deadwood, count_deadwood_cards, layout_from_best_deadwood, Deadwood, Meld,
    MeldKind, MeldLayout,
};
pub use view::{PlayerView, RoundEnd, RoundReveal};
