//! What each client is allowed to see.
//!
//! A `PlayerView` is private to one seat: the player's own hand, only the
//! size of the opponent's, and the shared round and match fields. The
//! `RoundEnd` and `RoundReveal` payloads are public and show both hands.

use crate::actions::{ReplenishInfo, WinType};
use crate::card::Card;
use crate::game::{GameState, PlayerId, TurnPhase, PLAYER_COUNT};
use crate::meld::{layout_from_best_deadwood, MeldLayout};
use serde::{Deserialize, Serialize};

/// Per-player snapshot of the game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub your_hand: Vec<Card>,
    pub your_turn: bool,
    pub phase: TurnPhase,
    pub discard_top: Option<Card>,
    pub deck_count: usize,
    pub opp_hand_count: usize,
    pub deck_replenished: bool,
    pub deck_replenish_info: Option<ReplenishInfo>,
    pub round_over: bool,
    pub winner: Option<PlayerId>,
    pub win_type: Option<WinType>,
    pub round_id: u32,
    pub scores: [u32; PLAYER_COUNT],
    pub target_score: u32,
    pub match_over: bool,
    pub match_winner: Option<PlayerId>,
    pub round_message: Option<String>,
    pub round_message_ts: Option<u64>,
    pub rematch_votes: [bool; PLAYER_COUNT],
    pub deadwood_count: usize,
    pub deadwood_points: u32,
}

impl PlayerView {
    /// Build the snapshot for one seat. `replenished` is the replenishment
    /// that happened while preparing this batch of snapshots, if any.
    pub fn for_player(
        game: &GameState,
        player: PlayerId,
        replenished: Option<ReplenishInfo>,
    ) -> Self {
        let round = &game.round;
        let match_state = &game.match_state;
        let hand = game.hand(player);
        let deadwood = game.deadwood(player);

        Self {
            your_hand: hand.to_vec(),
            your_turn: round.current_player == player,
            phase: round.phase,
            discard_top: round.discard_top(),
            deck_count: round.deck.len(),
            opp_hand_count: game.hand(GameState::opponent(player)).len(),
            deck_replenished: replenished.is_some(),
            deck_replenish_info: replenished,
            round_over: round.over,
            winner: round.winner,
            win_type: round.win_type,
            round_id: round.id,
            scores: match_state.scores,
            target_score: match_state.target_score,
            match_over: match_state.over,
            match_winner: match_state.winner,
            round_message: match_state.round_message.clone(),
            round_message_ts: match_state.round_message_ts,
            rematch_votes: match_state.rematch_votes,
            deadwood_count: deadwood.count,
            deadwood_points: deadwood.points,
        }
    }
}

/// Summary broadcast when a round ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundEnd {
    pub win_type: WinType,
    pub winner: PlayerId,
    pub hands: [Vec<Card>; PLAYER_COUNT],
    pub deadwood_points: [u32; PLAYER_COUNT],
    pub scores: [u32; PLAYER_COUNT],
    pub target_score: u32,
}

/// Everything clients need to animate the end-of-round reveal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundReveal {
    pub round_id: u32,
    pub winner: PlayerId,
    pub loser: PlayerId,
    pub win_type: WinType,
    pub hands: [Vec<Card>; PLAYER_COUNT],
    pub hand_orders: [Vec<String>; PLAYER_COUNT],
    pub layouts: [MeldLayout; PLAYER_COUNT],
    pub scores: [u32; PLAYER_COUNT],
    pub target_score: u32,
}

impl GameState {
    /// Public round summary, once the round has a winner
    pub fn round_end(&self) -> Option<RoundEnd> {
        let winner = self.round.winner?;
        let win_type = self.round.win_type?;
        Some(RoundEnd {
            win_type,
            winner,
            hands: self.round.hands.clone(),
            deadwood_points: [self.deadwood(0).points, self.deadwood(1).points],
            scores: self.match_state.scores,
            target_score: self.match_state.target_score,
        })
    }

    /// Public reveal of both hands, once the round has a winner
    pub fn round_reveal(&self) -> Option<RoundReveal> {
        let winner = self.round.winner?;
        let win_type = self.round.win_type?;
        Some(RoundReveal {
            round_id: self.round.id,
            winner,
            loser: GameState::opponent(winner),
            win_type,
            hands: self.round.hands.clone(),
            hand_orders: self.round.hand_orders.clone(),
            layouts: [
                layout_from_best_deadwood(self.hand(0)),
                layout_from_best_deadwood(self.hand(1)),
            ],
            scores: self.match_state.scores,
            target_score: self.match_state.target_score,
        })
    }
}
