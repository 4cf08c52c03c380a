use thiserror::Error;

use crate::table::PlayerId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("It's not player {actual}'s turn (expected player {expected})")]
    NotYourTurn { expected: PlayerId, actual: PlayerId },
    #[error("Illegal card count: {0} (must be 1, 2, 3 or 5)")]
    IllegalCardCount(usize),
    #[error("Play of {actual} cards does not match the {expected} on the table")]
    CardinalityMismatch { expected: usize, actual: usize },
    #[error("Cards do not form a legal {count}-card combination")]
    InvalidShape { count: usize },
    #[error("The first lead must contain the 3 of diamonds")]
    MissingRequiredLeadCard,
    #[error("Play does not beat the cards on the table")]
    DoesNotBeat,
    #[error("Cannot pass while leading an open trick")]
    CannotPassOpenTable,
    #[error("Player {0} does not hold every selected card")]
    CardsNotInHand(PlayerId),
    #[error("Table already started")]
    TableAlreadyStarted,
    #[error("Table has not started")]
    NotStarted,
    #[error("Game is over")]
    GameOver,
    #[error("Player {0} is not the table owner")]
    NotTableOwner(PlayerId),
    #[error("Too few players: {count} (minimum {minimum})")]
    TooFewPlayers { count: usize, minimum: usize },
    #[error("Table is full ({maximum} players)")]
    TooManyPlayers { maximum: usize },
    #[error("Player {0} is already seated")]
    AlreadySeated(PlayerId),
    #[error("Player {0} is not seated at this table")]
    NotSeated(PlayerId),
    #[error("Invalid deal: {0}")]
    InvalidDeal(String),
}

impl GameError {
    /// Machine-readable code for the presentation layer.
    pub fn code(&self) -> &'static str {
        match self {
            GameError::NotYourTurn { .. } => "not_your_turn",
            GameError::IllegalCardCount(_) => "illegal_card_count",
            GameError::CardinalityMismatch { .. } => "cardinality_mismatch",
            GameError::InvalidShape { .. } => "invalid_shape",
            GameError::MissingRequiredLeadCard => "missing_required_lead_card",
            GameError::DoesNotBeat => "does_not_beat",
            GameError::CannotPassOpenTable => "cannot_pass_open_table",
            GameError::CardsNotInHand(_) => "cards_not_in_hand",
            GameError::TableAlreadyStarted => "table_already_started",
            GameError::NotStarted => "table_not_started",
            GameError::GameOver => "game_over",
            GameError::NotTableOwner(_) => "not_table_owner",
            GameError::TooFewPlayers { .. } => "too_few_players",
            GameError::TooManyPlayers { .. } => "too_many_players",
            GameError::AlreadySeated(_) => "already_seated",
            GameError::NotSeated(_) => "not_seated",
            GameError::InvalidDeal(_) => "invalid_deal",
        }
    }
}
