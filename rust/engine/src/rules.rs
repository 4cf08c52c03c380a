use serde::{Deserialize, Serialize};

use crate::cards::{Card, THREE_OF_DIAMONDS};
use crate::errors::GameError;

pub const MIN_PLAYERS: usize = 2;
pub const MAX_PLAYERS: usize = 4;
pub const HAND_SIZE: usize = 13;

/// Table rules chosen in the lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ruleset {
    /// The first lead of a deal must contain 3♦, and its holder leads.
    pub must_start_with_three_of_diamonds: bool,
    /// Straights may contain rank 2 (still no wrap-around).
    pub allow_two_in_straight: bool,
}

impl Default for Ruleset {
    fn default() -> Self {
        Self::classic()
    }
}

impl Ruleset {
    pub fn classic() -> Self {
        Self {
            must_start_with_three_of_diamonds: true,
            allow_two_in_straight: false,
        }
    }

    /// The lobby owner leads and any card may open the game.
    pub fn free_start() -> Self {
        Self {
            must_start_with_three_of_diamonds: false,
            allow_two_in_straight: false,
        }
    }

    /// Looks up a preset by the name the lobby offers.
    pub fn preset(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "classic" => Some(Self::classic()),
            "free_start" | "free-start" => Some(Self::free_start()),
            _ => None,
        }
    }
}

/// Number of cards a single play may contain.
pub fn legal_size(count: usize) -> bool {
    matches!(count, 1 | 2 | 3 | 5)
}

pub fn validate_card_count(cards: &[Card]) -> Result<(), GameError> {
    if legal_size(cards.len()) {
        Ok(())
    } else {
        Err(GameError::IllegalCardCount(cards.len()))
    }
}

/// Enforces the 3♦ requirement for the very first lead of a deal.
///
/// # Examples
///
/// ```
/// use bigtwo_engine::cards::{Card, Rank, Suit, THREE_OF_DIAMONDS};
/// use bigtwo_engine::errors::GameError;
/// use bigtwo_engine::rules::{validate_first_lead, Ruleset};
///
/// let rules = Ruleset::classic();
/// assert!(validate_first_lead(&rules, true, &[THREE_OF_DIAMONDS]).is_ok());
///
/// let three_clubs = Card::new(Rank::Three, Suit::Clubs);
/// assert_eq!(
///     validate_first_lead(&rules, true, &[three_clubs]),
///     Err(GameError::MissingRequiredLeadCard)
/// );
/// assert!(validate_first_lead(&Ruleset::free_start(), true, &[three_clubs]).is_ok());
/// ```
pub fn validate_first_lead(
    rules: &Ruleset,
    first_lead: bool,
    cards: &[Card],
) -> Result<(), GameError> {
    if rules.must_start_with_three_of_diamonds && first_lead && !cards.contains(&THREE_OF_DIAMONDS)
    {
        return Err(GameError::MissingRequiredLeadCard);
    }
    Ok(())
}
