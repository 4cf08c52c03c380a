use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cards::{Card, Rank, Suit};
use crate::errors::GameError;
use crate::rules::{validate_card_count, Ruleset};

/// Big Two combination types, weakest first.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandType {
    Single = 1,
    Pair = 2,
    Triple = 3,
    Straight = 4,
    Flush = 5,
    FullHouse = 6,
    FourOfAKind = 7,
    StraightFlush = 8,
}

impl fmt::Display for HandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandType::Single => "single",
            HandType::Pair => "pair",
            HandType::Triple => "triple",
            HandType::Straight => "straight",
            HandType::Flush => "flush",
            HandType::FullHouse => "full house",
            HandType::FourOfAKind => "four of a kind",
            HandType::StraightFlush => "straight flush",
        };
        f.write_str(name)
    }
}

/// Tie-break key within one hand type. Keys of different variants are never
/// compared against each other.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Singles, straights and straight flushes: the highest card.
    HighCard(Card),
    /// Pairs and triples: the group rank, then its best suit.
    Group { rank: Rank, suit: Suit },
    /// Flushes: every card, highest first.
    Ladder([Card; 5]),
    FullHouse { triple: Rank, pair: Rank },
    FourOfAKind { quad: Rank, kicker: Card },
}

/// A validated combination.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Hand {
    pub hand_type: HandType,
    pub key: TieBreak,
    /// Cards in ascending order.
    pub cards: Vec<Card>,
}

impl Hand {
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Whether this hand may be played over `previous` in the same trick.
    pub fn beats(&self, previous: &Hand) -> bool {
        if self.len() != previous.len() {
            return false;
        }
        if self.len() < 5 {
            return self.hand_type == previous.hand_type && self.key > previous.key;
        }
        match self.hand_type.cmp(&previous.hand_type) {
            std::cmp::Ordering::Equal => self.key > previous.key,
            ord => ord.is_gt(),
        }
    }
}

/// Classifies a play of 1, 2, 3 or 5 cards.
///
/// # Errors
///
/// - [`GameError::IllegalCardCount`] for any other size
/// - [`GameError::InvalidShape`] when the cards form no legal combination
///
/// # Examples
///
/// ```
/// use bigtwo_engine::cards::parse_cards;
/// use bigtwo_engine::hand::{evaluate, HandType};
/// use bigtwo_engine::rules::Ruleset;
///
/// let cards = parse_cards("5c 6d 7h 8s 9c").unwrap();
/// let hand = evaluate(&cards, &Ruleset::classic()).unwrap();
/// assert_eq!(hand.hand_type, HandType::Straight);
/// ```
pub fn evaluate(cards: &[Card], rules: &Ruleset) -> Result<Hand, GameError> {
    validate_card_count(cards)?;
    let mut sorted = cards.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    let invalid = GameError::InvalidShape { count: n };
    if sorted.windows(2).any(|w| w[0] == w[1]) {
        return Err(invalid);
    }

    let (hand_type, key) = match n {
        1 => (HandType::Single, TieBreak::HighCard(sorted[0])),
        2 | 3 => {
            if sorted.iter().any(|c| c.rank != sorted[0].rank) {
                return Err(invalid);
            }
            let hand_type = if n == 2 {
                HandType::Pair
            } else {
                HandType::Triple
            };
            // sorted ascending, so the last card carries the best suit
            let top = sorted[n - 1];
            (
                hand_type,
                TieBreak::Group {
                    rank: top.rank,
                    suit: top.suit,
                },
            )
        }
        _ => classify_five(&sorted, rules).ok_or(invalid)?,
    };

    Ok(Hand {
        hand_type,
        key,
        cards: sorted,
    })
}

/// `beats` over raw card sets. An empty table is beaten by any legal hand.
pub fn beats(
    previous: Option<&[Card]>,
    candidate: &[Card],
    rules: &Ruleset,
) -> Result<bool, GameError> {
    let candidate = evaluate(candidate, rules)?;
    match previous {
        None => Ok(true),
        Some(prev) => Ok(candidate.beats(&evaluate(prev, rules)?)),
    }
}

fn classify_five(sorted: &[Card], rules: &Ruleset) -> Option<(HandType, TieBreak)> {
    let top = sorted[4];
    let flush = sorted.iter().all(|c| c.suit == sorted[0].suit);
    let straight = is_straight(sorted, rules);

    if straight && flush {
        return Some((HandType::StraightFlush, TieBreak::HighCard(top)));
    }

    let groups = rank_groups(sorted);
    match groups.as_slice() {
        [(quad, 4), (kicker, 1)] | [(kicker, 1), (quad, 4)] => {
            let kicker = sorted.iter().copied().find(|c| c.rank == *kicker)?;
            return Some((
                HandType::FourOfAKind,
                TieBreak::FourOfAKind {
                    quad: *quad,
                    kicker,
                },
            ));
        }
        [(triple, 3), (pair, 2)] | [(pair, 2), (triple, 3)] => {
            return Some((
                HandType::FullHouse,
                TieBreak::FullHouse {
                    triple: *triple,
                    pair: *pair,
                },
            ));
        }
        _ => {}
    }

    if flush {
        let mut ladder = [top; 5];
        for (slot, card) in ladder.iter_mut().zip(sorted.iter().rev()) {
            *slot = *card;
        }
        return Some((HandType::Flush, TieBreak::Ladder(ladder)));
    }
    if straight {
        return Some((HandType::Straight, TieBreak::HighCard(top)));
    }
    None
}

/// Five consecutive ranks in Big Two order, no wrap-around.
fn is_straight(sorted: &[Card], rules: &Ruleset) -> bool {
    if !rules.allow_two_in_straight && sorted.iter().any(|c| c.rank == Rank::Two) {
        return false;
    }
    sorted
        .windows(2)
        .all(|w| w[1].rank.index() == w[0].rank.index() + 1)
}

/// (rank, count) pairs in ascending rank order.
fn rank_groups(sorted: &[Card]) -> Vec<(Rank, usize)> {
    let mut groups: Vec<(Rank, usize)> = Vec::new();
    for c in sorted {
        match groups.last_mut() {
            Some((rank, count)) if *rank == c.rank => *count += 1,
            _ => groups.push((c.rank, 1)),
        }
    }
    groups
}
