//! Card identity, values, and deck construction.
//!
//! This module contains:
//! - `Suit` and `Rank` with their run ordering and deadwood values
//! - `Card` with its `${rank}${suit}` identity string
//! - Standard 52-card deck construction and shuffling

use rand::seq::SliceRandom;
use rand::Rng;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of cards in a standard deck
pub const DECK_SIZE: usize = 52;

/// Card suit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Suit {
    #[serde(rename = "♠")]
    Spades,
    #[serde(rename = "♥")]
    Hearts,
    #[serde(rename = "♦")]
    Diamonds,
    #[serde(rename = "♣")]
    Clubs,
}

impl Suit {
    /// All suits in deck construction order
    pub const ALL: [Suit; 4] = [Suit::Spades, Suit::Hearts, Suit::Diamonds, Suit::Clubs];

    pub fn symbol(&self) -> &'static str {
        match self {
            Suit::Spades => "♠",
            Suit::Hearts => "♥",
            Suit::Diamonds => "♦",
            Suit::Clubs => "♣",
        }
    }

    fn from_symbol(s: &str) -> Option<Suit> {
        Suit::ALL.into_iter().find(|suit| suit.symbol() == s)
    }
}

/// Card rank. Aces are low only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Rank {
    #[serde(rename = "A")]
    Ace,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "5")]
    Five,
    #[serde(rename = "6")]
    Six,
    #[serde(rename = "7")]
    Seven,
    #[serde(rename = "8")]
    Eight,
    #[serde(rename = "9")]
    Nine,
    #[serde(rename = "10")]
    Ten,
    #[serde(rename = "J")]
    Jack,
    #[serde(rename = "Q")]
    Queen,
    #[serde(rename = "K")]
    King,
}

impl Rank {
    /// All ranks in run order
    pub const ALL: [Rank; 13] = [
        Rank::Ace,
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
    ];

    /// Position in a run, A=1 through K=13
    pub fn order(&self) -> u8 {
        *self as u8 + 1
    }

    /// Deadwood value: A=1, pips at face value, J/Q/K=10
    pub fn value(&self) -> u32 {
        match self {
            Rank::Jack | Rank::Queen | Rank::King => 10,
            other => other.order() as u32,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Rank::Ace => "A",
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
        }
    }

    fn from_label(s: &str) -> Option<Rank> {
        Rank::ALL.into_iter().find(|rank| rank.label() == s)
    }
}

/// A single playing card.
///
/// Serialized as `{ "suit": "♥", "rank": "10", "value": 10 }`. The `value`
/// field is derived from the rank and ignored when reading a card back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
}

impl Card {
    pub fn new(rank: Rank, suit: Suit) -> Self {
        Self { rank, suit }
    }

    /// Deadwood value of this card
    pub fn value(&self) -> u32 {
        self.rank.value()
    }

    /// Identity string, e.g. `10♥`
    pub fn id(&self) -> String {
        self.to_string()
    }
}

impl Serialize for Card {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Card", 3)?;
        state.serialize_field("suit", &self.suit)?;
        state.serialize_field("rank", &self.rank)?;
        state.serialize_field("value", &self.value())?;
        state.end()
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.rank.label(), self.suit.symbol())
    }
}

/// Failure to parse a card identity string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CardParseError {
    #[error("Card id is empty")]
    Empty,

    #[error("Unknown suit in card id {0:?}")]
    UnknownSuit(String),

    #[error("Unknown rank in card id {0:?}")]
    UnknownRank(String),
}

impl FromStr for Card {
    type Err = CardParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let suit_char = s.chars().last().ok_or(CardParseError::Empty)?;
        let (rank_part, suit_part) = s.split_at(s.len() - suit_char.len_utf8());

        let suit = Suit::from_symbol(suit_part)
            .ok_or_else(|| CardParseError::UnknownSuit(s.to_string()))?;
        let rank = Rank::from_label(rank_part)
            .ok_or_else(|| CardParseError::UnknownRank(s.to_string()))?;

        Ok(Card { rank, suit })
    }
}

/// Deadwood value of a card
pub fn card_value(card: &Card) -> u32 {
    card.value()
}

/// Run position of a rank (A=1 .. K=13)
pub fn rank_order(rank: Rank) -> u8 {
    rank.order()
}

/// Build all 52 cards, suit-major then rank-minor
pub fn build_standard_deck() -> Vec<Card> {
    let mut deck = Vec::with_capacity(DECK_SIZE);
    for suit in Suit::ALL {
        for rank in Rank::ALL {
            deck.push(Card::new(rank, suit));
        }
    }
    deck
}

/// Uniform in-place shuffle (Fisher-Yates)
pub fn shuffle<R: Rng + ?Sized>(cards: &mut [Card], rng: &mut R) {
    cards.shuffle(rng);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn test_standard_deck_is_complete() {
        let deck = build_standard_deck();
        assert_eq!(deck.len(), DECK_SIZE);

        let unique: HashSet<Card> = deck.iter().copied().collect();
        assert_eq!(unique.len(), DECK_SIZE);

        // Suit-major construction order
        assert_eq!(deck[0], Card::new(Rank::Ace, Suit::Spades));
        assert_eq!(deck[12], Card::new(Rank::King, Suit::Spades));
        assert_eq!(deck[13], Card::new(Rank::Ace, Suit::Hearts));
        assert_eq!(deck[51], Card::new(Rank::King, Suit::Clubs));
    }

    #[test]
    fn test_card_values() {
        assert_eq!(card_value(&Card::new(Rank::Ace, Suit::Clubs)), 1);
        assert_eq!(card_value(&Card::new(Rank::Seven, Suit::Clubs)), 7);
        assert_eq!(card_value(&Card::new(Rank::Ten, Suit::Clubs)), 10);
        assert_eq!(card_value(&Card::new(Rank::Jack, Suit::Clubs)), 10);
        assert_eq!(card_value(&Card::new(Rank::King, Suit::Clubs)), 10);
    }

    #[test]
    fn test_rank_order() {
        assert_eq!(rank_order(Rank::Ace), 1);
        assert_eq!(rank_order(Rank::Ten), 10);
        assert_eq!(rank_order(Rank::Jack), 11);
        assert_eq!(rank_order(Rank::King), 13);
    }

    #[test]
    fn test_card_id_round_trip() {
        for card in build_standard_deck() {
            assert_eq!(card.id().parse::<Card>(), Ok(card));
        }
        assert_eq!(Card::new(Rank::Ten, Suit::Hearts).id(), "10♥");
    }

    #[test]
    fn test_card_id_rejects_garbage() {
        assert_eq!("".parse::<Card>(), Err(CardParseError::Empty));
        assert!(matches!("10X".parse::<Card>(), Err(CardParseError::UnknownSuit(_))));
        assert!(matches!("1♥".parse::<Card>(), Err(CardParseError::UnknownRank(_))));
        assert!(matches!("♥".parse::<Card>(), Err(CardParseError::UnknownRank(_))));
    }

    #[test]
    fn test_card_json_shape() {
        let card = Card::new(Rank::Queen, Suit::Diamonds);
        let json = serde_json::to_value(card).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "suit": "♦", "rank": "Q", "value": 10 })
        );

        let back: Card = serde_json::from_value(json).unwrap();
        assert_eq!(back, card);
    }

    #[test]
    fn test_shuffle_keeps_cards() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut deck = build_standard_deck();
        shuffle(&mut deck, &mut rng);

        assert_ne!(deck, build_standard_deck());
        let mut sorted = deck.clone();
        sorted.sort();
        let mut expected = build_standard_deck();
        expected.sort();
        assert_eq!(sorted, expected);
    }
}
