//! Core round and match state machine.
//!
//! This module contains the main `GameState` struct and all round logic.
//! A `GameState` owns the current `Round` (deck, discard pile, hands, turn)
//! and the `MatchState` that survives from one round to the next.

use crate::actions::{DrawSource, GameAction, GameEvent, ReplenishInfo, WinType};
use crate::card::{build_standard_deck, shuffle, Card};
use crate::meld::{best_deadwood, count_deadwood_cards, Deadwood};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Seat index of a player, 0 or 1
pub type PlayerId = u8;

/// Players per round
pub const PLAYER_COUNT: usize = 2;

/// Cards dealt to each player
pub const HAND_SIZE: usize = 10;

/// Match target used when none is configured
pub const DEFAULT_TARGET_SCORE: u32 = 10;

/// Most deadwood cards a hand may hold when declaring gin
const GIN_MAX_DEADWOOD: usize = 1;

/// Per-turn sub-state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnPhase {
    /// Must draw from the deck or the discard pile
    Draw,
    /// Must discard (or declare gin)
    Discard,
}

/// Errors that can occur when applying actions
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum GameError {
    #[error("Unknown player {0}")]
    UnknownPlayer(PlayerId),

    #[error("Not your turn")]
    NotYourTurn,

    #[error("Invalid action for current phase")]
    InvalidPhase,

    #[error("Deck is empty and cannot be replenished")]
    EmptyDeck,

    #[error("Discard pile is empty")]
    EmptyDiscard,

    #[error("Don't have that card")]
    NoSuchCard,

    #[error("Too much deadwood for gin ({0} cards)")]
    NotGin(usize),

    #[error("Round is over")]
    RoundOver,

    #[error("Match is over")]
    MatchOver,

    #[error("Round is still in progress")]
    RoundInProgress,
}

/// One deal-to-gin cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    /// Monotonic round identifier, 1 for the first round of a room
    pub id: u32,
    /// Draw pile, top is the last element
    pub deck: Vec<Card>,
    /// Discard pile, top is the last element
    pub discard_pile: Vec<Card>,
    /// Hands indexed by player
    pub hands: [Vec<Card>; PLAYER_COUNT],
    /// Current player index
    pub current_player: PlayerId,
    pub phase: TurnPhase,
    pub over: bool,
    pub winner: Option<PlayerId>,
    pub win_type: Option<WinType>,
    /// Last display order each player reported, as card ids
    pub hand_orders: [Vec<String>; PLAYER_COUNT],
}

impl Round {
    /// Shuffle a fresh deck and deal it
    fn deal(id: u32, rng: &mut StdRng) -> Self {
        let mut deck = build_standard_deck();
        shuffle(&mut deck, rng);

        let mut hands: [Vec<Card>; PLAYER_COUNT] = Default::default();
        for _ in 0..HAND_SIZE {
            for hand in hands.iter_mut() {
                hand.extend(deck.pop());
            }
        }
        let discard_pile = deck.pop().into_iter().collect();

        Self {
            id,
            deck,
            discard_pile,
            hands,
            current_player: 0,
            phase: TurnPhase::Draw,
            over: false,
            winner: None,
            win_type: None,
            hand_orders: Default::default(),
        }
    }

    /// Exposed discard card
    pub fn discard_top(&self) -> Option<Card> {
        self.discard_pile.last().copied()
    }
}

/// State that persists across rounds within one room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchState {
    /// Cumulative deadwood points charged to each player
    pub scores: [u32; PLAYER_COUNT],
    /// Reaching this score loses the match
    pub target_score: u32,
    pub over: bool,
    pub winner: Option<PlayerId>,
    pub rematch_votes: [bool; PLAYER_COUNT],
    /// Summary of the last finished round
    pub round_message: Option<String>,
    /// When `round_message` was written, ms since the Unix epoch
    pub round_message_ts: Option<u64>,
}

impl MatchState {
    pub fn new(target_score: u32) -> Self {
        Self {
            scores: [0; PLAYER_COUNT],
            target_score,
            over: false,
            winner: None,
            rematch_votes: [false; PLAYER_COUNT],
            round_message: None,
            round_message_ts: None,
        }
    }
}

/// The complete game state of one room
#[derive(Debug, Clone)]
pub struct GameState {
    pub round: Round,
    pub match_state: MatchState,
    rng: StdRng,
}

impl GameState {
    /// Start a fresh match and deal its first round
    pub fn new(target_score: u32) -> Self {
        Self::with_rng(target_score, StdRng::from_entropy())
    }

    /// Same as `new` with a deterministic shuffle
    pub fn with_seed(target_score: u32, seed: u64) -> Self {
        Self::with_rng(target_score, StdRng::seed_from_u64(seed))
    }

    fn with_rng(target_score: u32, mut rng: StdRng) -> Self {
        let round = Round::deal(1, &mut rng);
        Self {
            round,
            match_state: MatchState::new(target_score),
            rng,
        }
    }

    /// Deal the next round, carrying scores and target forward.
    ///
    /// Reads the match state as it is now, so a rematch or reset that happened
    /// since the previous round ended is honoured.
    pub fn start_next_round(&mut self) -> Vec<GameEvent> {
        let id = self.round.id + 1;
        self.round = Round::deal(id, &mut self.rng);
        self.match_state.over = false;
        self.match_state.winner = None;
        self.match_state.rematch_votes = [false; PLAYER_COUNT];
        vec![GameEvent::RoundStarted { round_id: id }]
    }

    /// The other seat
    pub fn opponent(player: PlayerId) -> PlayerId {
        (player + 1) % PLAYER_COUNT as PlayerId
    }

    pub fn current_player(&self) -> PlayerId {
        self.round.current_player
    }

    pub fn phase(&self) -> TurnPhase {
        self.round.phase
    }

    pub fn round_id(&self) -> u32 {
        self.round.id
    }

    pub fn is_round_over(&self) -> bool {
        self.round.over
    }

    pub fn is_match_over(&self) -> bool {
        self.match_state.over
    }

    /// Hand of a player (empty for an unknown seat)
    pub fn hand(&self, player: PlayerId) -> &[Card] {
        self.round
            .hands
            .get(player as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Best meld partition of a player's hand
    pub fn deadwood(&self, player: PlayerId) -> Deadwood {
        best_deadwood(self.hand(player))
    }

    /// Every card currently in the deck, discard pile, and hands
    pub fn all_cards(&self) -> Vec<Card> {
        let round = &self.round;
        round
            .deck
            .iter()
            .chain(round.discard_pile.iter())
            .chain(round.hands.iter().flatten())
            .copied()
            .collect()
    }

    /// Refill an empty deck from the discard pile, keeping its top card.
    ///
    /// Returns `None` if the deck still has cards or the pile has fewer than
    /// two cards.
    pub fn maybe_replenish(&mut self) -> Option<ReplenishInfo> {
        let round = &mut self.round;
        if !round.deck.is_empty() || round.discard_pile.len() < 2 {
            return None;
        }

        let before = round.deck.len();
        let top = round.discard_pile.pop()?;
        let mut refill = std::mem::take(&mut round.discard_pile);
        shuffle(&mut refill, &mut self.rng);
        round.deck = refill;
        round.discard_pile.push(top);

        Some(ReplenishInfo {
            before,
            after: round.deck.len(),
            ts: now_millis(),
        })
    }

    /// Replenish ahead of a snapshot so clients never see an empty deck on
    /// their draw.
    pub fn replenish_for_view(&mut self) -> Option<ReplenishInfo> {
        if self.round.phase == TurnPhase::Draw && self.round.deck.is_empty() {
            self.maybe_replenish()
        } else {
            None
        }
    }

    /// Get all currently valid actions for a player
    pub fn valid_actions(&self, player: PlayerId) -> Vec<GameAction> {
        let mut actions = Vec::new();
        if player as usize >= PLAYER_COUNT {
            return actions;
        }

        if self.round.over || self.match_state.over {
            if !self.match_state.rematch_votes[player as usize] {
                actions.push(GameAction::Rematch);
            }
            return actions;
        }

        if player != self.round.current_player {
            return actions;
        }

        match self.round.phase {
            TurnPhase::Draw => {
                if !self.round.deck.is_empty() || self.round.discard_pile.len() >= 2 {
                    actions.push(GameAction::DrawDeck);
                }
                if !self.round.discard_pile.is_empty() {
                    actions.push(GameAction::DrawDiscard);
                }
            }
            TurnPhase::Discard => {
                let hand = self.hand(player);
                if count_deadwood_cards(hand) <= GIN_MAX_DEADWOOD {
                    actions.push(GameAction::Gin);
                }
                for card in hand {
                    actions.push(GameAction::Discard(*card));
                }
            }
        }

        actions
    }

    /// Apply an action to the game state.
    ///
    /// A rejected action leaves the state untouched.
    pub fn apply_action(
        &mut self,
        player: PlayerId,
        action: GameAction,
    ) -> Result<Vec<GameEvent>, GameError> {
        if player as usize >= PLAYER_COUNT {
            return Err(GameError::UnknownPlayer(player));
        }

        // Hand order and rematch skip the turn guards
        match action {
            GameAction::HandOrder(order) => {
                self.round.hand_orders[player as usize] = order;
                return Ok(vec![GameEvent::HandOrderRecorded { player }]);
            }
            GameAction::Rematch => return self.vote_rematch(player),
            _ => {}
        }

        if self.match_state.over {
            return Err(GameError::MatchOver);
        }
        if self.round.over {
            return Err(GameError::RoundOver);
        }
        if player != self.round.current_player {
            return Err(GameError::NotYourTurn);
        }

        match action {
            GameAction::DrawDeck => self.draw_from_deck(player),
            GameAction::DrawDiscard => self.draw_from_discard(player),
            GameAction::Discard(card) => self.discard(player, card),
            GameAction::Gin => self.declare_gin(player),
            GameAction::HandOrder(_) | GameAction::Rematch => Err(GameError::InvalidPhase),
        }
    }

    fn draw_from_deck(&mut self, player: PlayerId) -> Result<Vec<GameEvent>, GameError> {
        if self.round.phase != TurnPhase::Draw {
            return Err(GameError::InvalidPhase);
        }

        let mut events = Vec::new();
        if let Some(info) = self.maybe_replenish() {
            events.push(GameEvent::DeckReplenished(info));
        }

        let card = self.round.deck.pop().ok_or(GameError::EmptyDeck)?;
        self.round.hands[player as usize].push(card);
        self.round.phase = TurnPhase::Discard;

        events.push(GameEvent::CardDrawn {
            player,
            source: DrawSource::Deck,
        });
        Ok(events)
    }

    fn draw_from_discard(&mut self, player: PlayerId) -> Result<Vec<GameEvent>, GameError> {
        if self.round.phase != TurnPhase::Draw {
            return Err(GameError::InvalidPhase);
        }

        let card = self.round.discard_pile.pop().ok_or(GameError::EmptyDiscard)?;
        self.round.hands[player as usize].push(card);
        self.round.phase = TurnPhase::Discard;

        Ok(vec![GameEvent::CardDrawn {
            player,
            source: DrawSource::Discard,
        }])
    }

    fn discard(&mut self, player: PlayerId, card: Card) -> Result<Vec<GameEvent>, GameError> {
        if self.round.phase != TurnPhase::Discard {
            return Err(GameError::InvalidPhase);
        }

        let hand = &mut self.round.hands[player as usize];
        let idx = hand
            .iter()
            .position(|c| *c == card)
            .ok_or(GameError::NoSuchCard)?;
        let card = hand.remove(idx);
        self.round.discard_pile.push(card);

        let next_player = Self::opponent(player);
        self.round.current_player = next_player;
        self.round.phase = TurnPhase::Draw;

        Ok(vec![GameEvent::CardDiscarded {
            player,
            card,
            next_player,
        }])
    }

    fn declare_gin(&mut self, player: PlayerId) -> Result<Vec<GameEvent>, GameError> {
        if self.round.phase != TurnPhase::Discard {
            return Err(GameError::InvalidPhase);
        }

        let deadwood_cards = count_deadwood_cards(self.hand(player));
        if deadwood_cards > GIN_MAX_DEADWOOD {
            return Err(GameError::NotGin(deadwood_cards));
        }

        let loser = Self::opponent(player);
        let points = self.deadwood(loser).points;
        self.match_state.scores[loser as usize] += points;
        self.match_state.round_message = Some(format!(
            "Player {} GIN! Player {} +{} points",
            player + 1,
            loser + 1,
            points
        ));
        self.match_state.round_message_ts = Some(now_millis());

        self.round.over = true;
        self.round.winner = Some(player);
        self.round.win_type = Some(WinType::Gin);

        let mut events = vec![GameEvent::RoundWon {
            winner: player,
            loser,
            win_type: WinType::Gin,
            points,
        }];
        events.extend(self.check_match_over(loser));
        Ok(events)
    }

    /// The player just charged with deadwood loses the match once their
    /// score reaches the target
    fn check_match_over(&mut self, loser: PlayerId) -> Option<GameEvent> {
        if self.match_state.scores[loser as usize] < self.match_state.target_score {
            return None;
        }
        let winner = Self::opponent(loser);

        self.match_state.over = true;
        self.match_state.winner = Some(winner);
        Some(GameEvent::MatchWon { winner, loser })
    }

    fn vote_rematch(&mut self, player: PlayerId) -> Result<Vec<GameEvent>, GameError> {
        if !self.round.over && !self.match_state.over {
            return Err(GameError::RoundInProgress);
        }

        self.match_state.rematch_votes[player as usize] = true;
        let mut events = vec![GameEvent::RematchVoted { player }];

        if self.match_state.rematch_votes.iter().all(|&v| v) {
            let target = self.match_state.target_score;
            self.match_state = MatchState::new(target);
            events.push(GameEvent::MatchReset);
            events.extend(self.start_next_round());
        }

        Ok(events)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
