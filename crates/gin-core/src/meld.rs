//! Meld enumeration and minimum-deadwood search.
//!
//! A hand is scored by partitioning it into disjoint melds and leaving the
//! rest as deadwood. Candidate melds are enumerated generously (every 3-card
//! subset of a four-of-a-kind, every sub-run of length 3 or more) so that the
//! search can trade a card between a set and a run. The search itself is a
//! memoized include/exclude recursion over candidate bitmasks, keyed by
//! `(candidate index, used mask)`.

use crate::card::{Card, Rank, Suit};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Hands are indexed into a `u64` bitmask
pub const MAX_HAND_SIZE: usize = 64;

/// Kind of meld
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeldKind {
    /// Three or four cards of one rank
    Set,
    /// Three or more consecutive ranks of one suit
    Run,
}

/// A candidate meld found in a hand
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meld {
    pub kind: MeldKind,
    pub cards: Vec<Card>,
}

/// Best partition of a hand
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deadwood {
    /// Number of cards left outside melds
    pub count: usize,
    /// Sum of their values
    pub points: u32,
    /// Union of the chosen meld masks
    pub used_mask: u64,
    /// Chosen melds as bitmasks over hand positions
    pub chosen_masks: Vec<u64>,
}

/// Melds and leftover cards for rendering a hand
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeldLayout {
    pub meld_groups: Vec<Vec<Card>>,
    pub deadwood: Vec<Card>,
    pub deadwood_points: u32,
    pub deadwood_count: usize,
}

/// Enumerate every candidate meld in a hand.
pub fn all_melds(hand: &[Card]) -> Vec<Meld> {
    candidate_positions(hand)
        .into_iter()
        .map(|(kind, positions)| Meld {
            kind,
            cards: positions.into_iter().map(|i| hand[i]).collect(),
        })
        .collect()
}

/// Candidate melds as lists of hand positions
fn candidate_positions(hand: &[Card]) -> Vec<(MeldKind, Vec<usize>)> {
    let mut melds = Vec::new();

    let mut by_rank: BTreeMap<Rank, Vec<usize>> = BTreeMap::new();
    let mut by_suit: BTreeMap<Suit, Vec<usize>> = BTreeMap::new();
    for (i, card) in hand.iter().enumerate() {
        by_rank.entry(card.rank).or_default().push(i);
        by_suit.entry(card.suit).or_default().push(i);
    }

    // Sets
    for group in by_rank.values() {
        match group.len() {
            3 => melds.push((MeldKind::Set, group.clone())),
            4 => {
                melds.push((MeldKind::Set, group.clone()));
                for skip in 0..4 {
                    let subset = group
                        .iter()
                        .enumerate()
                        .filter(|(idx, _)| *idx != skip)
                        .map(|(_, &pos)| pos)
                        .collect();
                    melds.push((MeldKind::Set, subset));
                }
            }
            _ => {}
        }
    }

    // Runs
    for group in by_suit.values() {
        let mut sorted = group.clone();
        sorted.sort_by_key(|&i| hand[i].rank.order());

        let mut segment: Vec<usize> = Vec::new();
        for pos in sorted {
            let extends = segment
                .last()
                .map(|&prev| hand[pos].rank.order() == hand[prev].rank.order() + 1)
                .unwrap_or(true);
            if !extends {
                push_run_slices(&segment, &mut melds);
                segment.clear();
            }
            segment.push(pos);
        }
        push_run_slices(&segment, &mut melds);
    }

    melds
}

/// Every contiguous slice of length >= 3 of a maximal run
fn push_run_slices(segment: &[usize], melds: &mut Vec<(MeldKind, Vec<usize>)>) {
    if segment.len() < 3 {
        return;
    }
    for start in 0..segment.len() {
        for end in (start + 3)..=segment.len() {
            melds.push((MeldKind::Run, segment[start..end].to_vec()));
        }
    }
}

struct Search<'a> {
    hand: &'a [Card],
    masks: Vec<u64>,
    memo: HashMap<(usize, u64), (usize, u32)>,
}

impl Search<'_> {
    fn leftover(&self, used: u64) -> (usize, u32) {
        self.hand
            .iter()
            .enumerate()
            .filter(|&(i, _)| used & (1u64 << i) == 0)
            .fold((0, 0), |(count, points), (_, card)| {
                (count + 1, points + card.value())
            })
    }

    /// Lowest (count, points) reachable from candidate `i` onwards
    fn best(&mut self, i: usize, used: u64) -> (usize, u32) {
        if let Some(&cached) = self.memo.get(&(i, used)) {
            return cached;
        }

        let result = if i == self.masks.len() {
            self.leftover(used)
        } else {
            let skip = self.best(i + 1, used);
            let mask = self.masks[i];
            if used & mask == 0 {
                skip.min(self.best(i + 1, used | mask))
            } else {
                skip
            }
        };

        self.memo.insert((i, used), result);
        result
    }

    /// Walk the memo table to recover one optimal choice of melds
    fn reconstruct(&mut self) -> Vec<u64> {
        let mut chosen = Vec::new();
        let mut used = 0;
        for i in 0..self.masks.len() {
            let here = self.best(i, used);
            if self.best(i + 1, used) == here {
                continue;
            }
            used |= self.masks[i];
            chosen.push(self.masks[i]);
        }
        chosen
    }
}

/// Find the meld partition that leaves the fewest deadwood cards, breaking
/// ties on deadwood points.
///
/// Hands longer than [`MAX_HAND_SIZE`] are truncated to their first
/// `MAX_HAND_SIZE` cards.
pub fn best_deadwood(hand: &[Card]) -> Deadwood {
    let hand = &hand[..hand.len().min(MAX_HAND_SIZE)];
    let masks = candidate_positions(hand)
        .into_iter()
        .map(|(_, positions)| positions.into_iter().fold(0u64, |m, i| m | (1u64 << i)))
        .collect();

    let mut search = Search {
        hand,
        masks,
        memo: HashMap::new(),
    };

    let (count, points) = search.best(0, 0);
    let chosen_masks = search.reconstruct();
    let used_mask = chosen_masks.iter().fold(0, |acc, m| acc | m);

    Deadwood {
        count,
        points,
        used_mask,
        chosen_masks,
    }
}

/// Number of deadwood cards in the best partition
pub fn count_deadwood_cards(hand: &[Card]) -> usize {
    best_deadwood(hand).count
}

/// Concrete meld groups and deadwood cards of the best partition
pub fn layout_from_best_deadwood(hand: &[Card]) -> MeldLayout {
    let hand = &hand[..hand.len().min(MAX_HAND_SIZE)];
    let best = best_deadwood(hand);

    let cards_in = |mask: u64| -> Vec<Card> {
        hand.iter()
            .enumerate()
            .filter(|&(i, _)| mask & (1u64 << i) != 0)
            .map(|(_, c)| *c)
            .collect()
    };

    MeldLayout {
        meld_groups: best.chosen_masks.iter().map(|&m| cards_in(m)).collect(),
        deadwood: cards_in(!best.used_mask),
        deadwood_points: best.points,
        deadwood_count: best.count,
    }
}
