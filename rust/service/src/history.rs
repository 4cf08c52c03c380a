use std::path::Path;
use std::sync::{Mutex, RwLock};

use bigtwo_engine::logger::{GameLogger, GameRecord};
use bigtwo_engine::table::PlayerId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::{ErrorSeverity, IntoErrorResponse};

/// Finished and cancelled games, newest last.
#[derive(Debug, Default)]
pub struct GameHistory {
    games: RwLock<Vec<GameRecord>>,
    logger: Option<Mutex<GameLogger>>,
}

impl GameHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also appends every record to the JSONL file at `path`.
    pub fn with_log_file(path: impl AsRef<Path>) -> Result<Self, HistoryError> {
        let logger = GameLogger::create(path).map_err(|e| HistoryError::Io(e.to_string()))?;
        Ok(Self {
            games: RwLock::new(Vec::new()),
            logger: Some(Mutex::new(logger)),
        })
    }

    /// Stores `record`. A failing log file does not lose the in-memory copy.
    pub fn record(&self, mut record: GameRecord) -> Result<(), HistoryError> {
        if record.ts.is_none() {
            record.ts = Some(bigtwo_engine::logger::now_rfc3339());
        }
        let written = match &self.logger {
            Some(logger) => logger
                .lock()
                .map_err(|_| HistoryError::StoragePoisoned)?
                .write(&record)
                .map_err(|e| HistoryError::Io(e.to_string())),
            None => Ok(()),
        };
        self.games
            .write()
            .map_err(|_| HistoryError::StoragePoisoned)?
            .push(record);
        written
    }

    /// Most recent first.
    pub fn recent(&self, limit: usize) -> Result<Vec<GameRecord>, HistoryError> {
        let games = self.games.read().map_err(|_| HistoryError::StoragePoisoned)?;
        Ok(games.iter().rev().take(limit).cloned().collect())
    }

    pub fn get(&self, game_id: &str) -> Result<Option<GameRecord>, HistoryError> {
        let games = self.games.read().map_err(|_| HistoryError::StoragePoisoned)?;
        Ok(games.iter().find(|g| g.game_id == game_id).cloned())
    }

    pub fn len(&self) -> usize {
        self.games.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Completed games a player sat in, and how many they won.
    pub fn stats_for(&self, player: PlayerId) -> Result<PlayerStats, HistoryError> {
        let games = self.games.read().map_err(|_| HistoryError::StoragePoisoned)?;
        let mut stats = PlayerStats::default();
        for game in games
            .iter()
            .filter(|g| g.result.is_none() && g.players.contains(&player))
        {
            stats.games += 1;
            if game.winner() == Some(player) {
                stats.wins += 1;
                stats.winnings += game.stake * game.players.len() as u64;
            }
        }
        Ok(stats)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub games: usize,
    pub wins: usize,
    /// Sum of pots won, before subtracting stakes paid.
    pub winnings: u64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HistoryError {
    #[error("History storage poisoned")]
    StoragePoisoned,
    #[error("Failed to write game log: {0}")]
    Io(String),
}

impl IntoErrorResponse for HistoryError {
    fn error_code(&self) -> &'static str {
        match self {
            HistoryError::StoragePoisoned => "history_storage_poisoned",
            HistoryError::Io(_) => "history_io",
        }
    }

    fn error_message(&self) -> String {
        self.to_string()
    }

    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Server
    }
}
