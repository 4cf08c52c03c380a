use std::collections::HashSet;

use rand::Rng;

use crate::cards::{Card, THREE_OF_DIAMONDS};
use crate::deck::Deck;
use crate::errors::GameError;
use crate::rules::{Ruleset, HAND_SIZE, MAX_PLAYERS, MIN_PLAYERS};

/// Upper bound on reshuffles while looking for a deal in which 3♦ is held.
pub const MAX_DEAL_ATTEMPTS: u32 = 10;

/// Result of dealing one game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deal {
    /// One sorted hand per seat, in seat order.
    pub hands: Vec<Vec<Card>>,
    /// Cards left undealt when fewer than four players sit.
    pub stock: Vec<Card>,
    /// Shuffles performed to produce this deal.
    pub attempts: u32,
}

impl Deal {
    /// Builds a prearranged deal, checking sizes and that no card appears twice.
    pub fn from_hands(hands: Vec<Vec<Card>>) -> Result<Self, GameError> {
        check_seat_count(hands.len())?;
        let mut seen = HashSet::new();
        for (seat, hand) in hands.iter().enumerate() {
            if hand.len() != HAND_SIZE {
                return Err(GameError::InvalidDeal(format!(
                    "seat {} holds {} cards",
                    seat,
                    hand.len()
                )));
            }
            for card in hand {
                if !seen.insert(*card) {
                    return Err(GameError::InvalidDeal(format!("{} dealt twice", card)));
                }
            }
        }
        let stock = crate::cards::full_deck()
            .into_iter()
            .filter(|c| !seen.contains(c))
            .collect();
        let hands = hands
            .into_iter()
            .map(|mut h| {
                h.sort_unstable();
                h
            })
            .collect();
        Ok(Self {
            hands,
            stock,
            attempts: 0,
        })
    }

    /// Seat holding 3♦, if it was dealt.
    pub fn three_of_diamonds_seat(&self) -> Option<usize> {
        self.hands
            .iter()
            .position(|h| h.contains(&THREE_OF_DIAMONDS))
    }
}

/// Shuffles and deals 13 cards to each of `players` seats.
///
/// Under the 3♦ rule the deck is reshuffled, at most [`MAX_DEAL_ATTEMPTS`] times,
/// until 3♦ lands in some hand. With four players it always does; with two or
/// three it can sit in the stock. If every attempt misses, 3♦ is swapped from
/// the stock with a random card of a random seat so the game can always open.
///
/// # Examples
///
/// ```
/// use bigtwo_engine::deal::deal;
/// use bigtwo_engine::deck::Deck;
/// use bigtwo_engine::rules::Ruleset;
///
/// let mut deck = Deck::new_with_seed(7);
/// let dealt = deal(3, &Ruleset::classic(), &mut deck).unwrap();
/// assert_eq!(dealt.hands.len(), 3);
/// assert!(dealt.hands.iter().all(|h| h.len() == 13));
/// assert!(dealt.three_of_diamonds_seat().is_some());
/// ```
pub fn deal(players: usize, rules: &Ruleset, deck: &mut Deck) -> Result<Deal, GameError> {
    check_seat_count(players)?;

    let mut attempts = 0;
    let mut dealt = loop {
        attempts += 1;
        deck.shuffle();
        let hands: Vec<Vec<Card>> = (0..players)
            .map(|_| {
                let mut hand = deck.deal_n(HAND_SIZE);
                hand.sort_unstable();
                hand
            })
            .collect();
        let stock = deck.take_remaining();
        let dealt = Deal {
            hands,
            stock,
            attempts,
        };
        if !rules.must_start_with_three_of_diamonds
            || dealt.three_of_diamonds_seat().is_some()
            || attempts >= MAX_DEAL_ATTEMPTS
        {
            break dealt;
        }
    };

    if rules.must_start_with_three_of_diamonds && dealt.three_of_diamonds_seat().is_none() {
        place_three_of_diamonds(&mut dealt, deck);
    }
    Ok(dealt)
}

fn place_three_of_diamonds(dealt: &mut Deal, deck: &mut Deck) {
    let Some(stock_pos) = dealt.stock.iter().position(|c| *c == THREE_OF_DIAMONDS) else {
        return;
    };
    let rng = deck.rng();
    let seat = rng.random_range(0..dealt.hands.len());
    let slot = rng.random_range(0..dealt.hands[seat].len());
    std::mem::swap(&mut dealt.hands[seat][slot], &mut dealt.stock[stock_pos]);
    dealt.hands[seat].sort_unstable();
}

fn check_seat_count(players: usize) -> Result<(), GameError> {
    if players < MIN_PLAYERS {
        return Err(GameError::TooFewPlayers {
            count: players,
            minimum: MIN_PLAYERS,
        });
    }
    if players > MAX_PLAYERS {
        return Err(GameError::TooManyPlayers {
            maximum: MAX_PLAYERS,
        });
    }
    Ok(())
}

/// Seat that leads the first trick: the 3♦ holder under the classic rule,
/// otherwise `owner_seat`.
pub fn starting_seat(dealt: &Deal, rules: &Ruleset, owner_seat: usize) -> usize {
    if rules.must_start_with_three_of_diamonds {
        dealt.three_of_diamonds_seat().unwrap_or(owner_seat)
    } else {
        owner_seat
    }
}
