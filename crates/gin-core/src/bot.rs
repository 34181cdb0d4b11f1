//! Computer players.
//!
//! - Easy: random legal moves
//! - Greedy: keeps whatever lowers its deadwood, declares gin as soon as it can

use crate::actions::GameAction;
use crate::card::Card;
use crate::game::{GameState, PlayerId, TurnPhase};
use crate::meld::best_deadwood;
use rand::prelude::*;
use serde::{Deserialize, Serialize};

/// Bot difficulty level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BotDifficulty {
    Easy,
    Greedy,
}

/// A bot player that can decide on actions
pub struct Bot {
    pub player_id: PlayerId,
    pub difficulty: BotDifficulty,
    rng: StdRng,
}

impl Bot {
    pub fn new(player_id: PlayerId, difficulty: BotDifficulty) -> Self {
        Self {
            player_id,
            difficulty,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(player_id: PlayerId, difficulty: BotDifficulty, seed: u64) -> Self {
        Self {
            player_id,
            difficulty,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Choose an action from the valid actions
    pub fn choose_action(&mut self, game: &GameState) -> Option<GameAction> {
        let valid_actions = game.valid_actions(self.player_id);
        if valid_actions.is_empty() {
            return None;
        }

        match self.difficulty {
            BotDifficulty::Easy => valid_actions.choose(&mut self.rng).cloned(),
            BotDifficulty::Greedy => Some(self.choose_greedy(game, valid_actions)),
        }
    }

    fn choose_greedy(&mut self, game: &GameState, valid_actions: Vec<GameAction>) -> GameAction {
        // Between rounds the only option is a rematch vote
        if game.is_round_over() || game.is_match_over() {
            return valid_actions[0].clone();
        }

        let hand = game.hand(self.player_id);
        match game.phase() {
            TurnPhase::Draw => {
                let take_discard = game
                    .round
                    .discard_top()
                    .filter(|_| valid_actions.contains(&GameAction::DrawDiscard))
                    .map(|top| {
                        let mut with_top = hand.to_vec();
                        with_top.push(top);
                        score_after_best_discard(&with_top) < score(hand)
                    })
                    .unwrap_or(false);

                if take_discard || !valid_actions.contains(&GameAction::DrawDeck) {
                    GameAction::DrawDiscard
                } else {
                    GameAction::DrawDeck
                }
            }
            TurnPhase::Discard => {
                if valid_actions.contains(&GameAction::Gin) {
                    return GameAction::Gin;
                }
                match best_discard(hand) {
                    Some(card) => GameAction::Discard(card),
                    None => valid_actions
                        .choose(&mut self.rng)
                        .cloned()
                        .unwrap_or(GameAction::DrawDeck),
                }
            }
        }
    }
}

fn score(hand: &[Card]) -> (usize, u32) {
    let best = best_deadwood(hand);
    (best.count, best.points)
}

/// The card whose removal leaves the lowest deadwood
fn best_discard(hand: &[Card]) -> Option<Card> {
    hand.iter()
        .enumerate()
        .map(|(i, card)| {
            let mut rest = hand.to_vec();
            rest.remove(i);
            (score(&rest), *card)
        })
        .min_by_key(|(s, _)| *s)
        .map(|(_, card)| card)
}

fn score_after_best_discard(hand: &[Card]) -> (usize, u32) {
    best_discard(hand)
        .map(|discard| {
            let rest: Vec<Card> = hand.iter().copied().filter(|c| *c != discard).collect();
            score(&rest)
        })
        .unwrap_or_else(|| score(hand))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::DEFAULT_TARGET_SCORE;

    #[test]
    fn test_bot_waits_for_its_turn() {
        let game = GameState::with_seed(DEFAULT_TARGET_SCORE, 31);
        let mut bot = Bot::with_seed(1, BotDifficulty::Greedy, 1);
        assert_eq!(bot.choose_action(&game), None);
    }

    #[test]
    fn test_easy_bot_picks_valid_action() {
        let game = GameState::with_seed(DEFAULT_TARGET_SCORE, 32);
        let mut bot = Bot::with_seed(0, BotDifficulty::Easy, 2);
        let action = bot.choose_action(&game).unwrap();
        assert!(game.valid_actions(0).contains(&action));
    }

    #[test]
    fn test_greedy_bot_discards_deadwood() {
        use crate::card::{Rank, Suit};

        let hand = [
            Card::new(Rank::Two, Suit::Clubs),
            Card::new(Rank::Three, Suit::Clubs),
            Card::new(Rank::Four, Suit::Clubs),
            Card::new(Rank::King, Suit::Hearts),
            Card::new(Rank::Ace, Suit::Spades),
        ];
        assert_eq!(best_discard(&hand), Some(Card::new(Rank::King, Suit::Hearts)));
    }

    #[test]
    fn test_greedy_bot_plays_a_turn() {
        let mut game = GameState::with_seed(DEFAULT_TARGET_SCORE, 33);
        let mut bot = Bot::with_seed(0, BotDifficulty::Greedy, 3);

        let draw = bot.choose_action(&game).unwrap();
        assert!(matches!(draw, GameAction::DrawDeck | GameAction::DrawDiscard));
        game.apply_action(0, draw).unwrap();

        let next = bot.choose_action(&game).unwrap();
        assert!(matches!(next, GameAction::Discard(_) | GameAction::Gin));
        game.apply_action(0, next).unwrap();
    }
}
