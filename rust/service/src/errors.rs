//! Error types surfaced to the presentation layer.
//!
//! Every failure is a typed, recoverable condition. The presentation layer receives an
//! [`ErrorResponse`] with a stable code and renders its own message.

use std::fmt;

use bigtwo_engine::errors::GameError;
use bigtwo_engine::table::PlayerId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::{ChannelId, TableId};

/// Serializable error payload for the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "not_your_turn")
    pub error: String,
    /// Human-readable error message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        error: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: Some(details),
        }
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

/// Error classification for logging levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Rejected user action; expected during normal play
    Client,
    /// A collaborator failed; needs investigation
    Server,
    /// Money may be out of balance
    Critical,
}

/// Conversion of service errors into [`ErrorResponse`] with severity-aware logging.
pub trait IntoErrorResponse {
    fn error_code(&self) -> &'static str;

    fn error_message(&self) -> String;

    fn error_details(&self) -> Option<serde_json::Value> {
        None
    }

    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Client
    }

    fn to_error_response(&self) -> ErrorResponse {
        if let Some(details) = self.error_details() {
            ErrorResponse::with_details(self.error_code(), self.error_message(), details)
        } else {
            ErrorResponse::new(self.error_code(), self.error_message())
        }
    }

    /// Logs at the level matching [`severity`](Self::severity) and returns the payload.
    fn into_logged_response(self) -> ErrorResponse
    where
        Self: Sized,
    {
        let severity = self.severity();
        let response = self.to_error_response();
        match severity {
            ErrorSeverity::Client => {
                tracing::debug!(error = %response.error, message = %response.message, "request rejected");
            }
            ErrorSeverity::Server => {
                tracing::error!(error = %response.error, message = %response.message, "service error");
            }
            ErrorSeverity::Critical => {
                tracing::error!(
                    error = %response.error,
                    message = %response.message,
                    details = ?response.details,
                    "critical service error"
                );
            }
        }
        response
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error(transparent)]
    Game(#[from] GameError),
    #[error("Table not found: {0}")]
    TableNotFound(TableId),
    #[error("Channel {0} already has a table")]
    ChannelOccupied(ChannelId),
    #[error("Stake {stake} is not one of {options:?}")]
    InvalidStake { stake: u64, options: Vec<u64> },
    #[error("Players {players:?} cannot cover the stake of {stake}")]
    InsufficientFunds { players: Vec<PlayerId>, stake: u64 },
    #[error("Collecting the stake from player {player} failed: {reason}")]
    DebitFailed {
        player: PlayerId,
        reason: String,
        /// Players who were charged and could not be refunded.
        unrefunded: Vec<PlayerId>,
    },
    #[error("Table storage poisoned")]
    StoragePoisoned,
}

impl IntoErrorResponse for TableError {
    fn error_code(&self) -> &'static str {
        match self {
            TableError::Game(err) => err.code(),
            TableError::TableNotFound(_) => "table_not_found",
            TableError::ChannelOccupied(_) => "channel_occupied",
            TableError::InvalidStake { .. } => "invalid_stake",
            TableError::InsufficientFunds { .. } => "insufficient_funds",
            TableError::DebitFailed { .. } => "debit_failed",
            TableError::StoragePoisoned => "storage_poisoned",
        }
    }

    fn error_message(&self) -> String {
        self.to_string()
    }

    fn error_details(&self) -> Option<serde_json::Value> {
        match self {
            TableError::InsufficientFunds { players, stake } => Some(serde_json::json!({
                "players": players,
                "stake": stake,
            })),
            TableError::DebitFailed {
                player, unrefunded, ..
            } => Some(serde_json::json!({
                "player": player,
                "unrefunded": unrefunded,
            })),
            TableError::InvalidStake { options, .. } => {
                Some(serde_json::json!({ "options": options }))
            }
            TableError::Game(GameError::NotYourTurn { expected, .. }) => {
                Some(serde_json::json!({ "expected": expected }))
            }
            _ => None,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            TableError::DebitFailed { unrefunded, .. } if !unrefunded.is_empty() => {
                ErrorSeverity::Critical
            }
            TableError::DebitFailed { .. } | TableError::StoragePoisoned => ErrorSeverity::Server,
            _ => ErrorSeverity::Client,
        }
    }
}
