use serde::{Deserialize, Serialize};

use crate::cards::Card;
use crate::rules::Ruleset;
use crate::table::PlayerId;

/// What a player did on their turn.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Play { cards: Vec<Card> },
    Pass,
}

/// Records a single accepted action.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub player_id: PlayerId,
    /// Zero-based trick counter within the deal
    pub trick: u32,
    pub action: Action,
}

/// Complete record of one finished (or abandoned) game.
/// Serialized to JSONL for game history storage.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub game_id: String,
    /// Deck seed, when the deal was reproducible
    pub seed: Option<u64>,
    pub ruleset: Ruleset,
    /// Seat order
    pub players: Vec<PlayerId>,
    pub actions: Vec<ActionRecord>,
    /// First entry is the winner
    pub finish_order: Vec<PlayerId>,
    #[serde(default)]
    pub stake: u64,
    /// RFC3339 timestamp
    #[serde(default)]
    pub ts: Option<String>,
    /// Why the game ended when it did not play out, e.g. "cancelled"
    #[serde(default)]
    pub result: Option<String>,
}

impl GameRecord {
    pub fn winner(&self) -> Option<PlayerId> {
        self.finish_order.first().copied()
    }
}

use chrono::{SecondsFormat, Utc};
use std::fs::{create_dir_all, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Appends game records to a JSONL file.
pub struct GameLogger {
    writer: Option<BufWriter<std::fs::File>>,
}

impl GameLogger {
    pub fn create<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                create_dir_all(parent)?;
            }
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Some(BufWriter::new(f)),
        })
    }

    /// A logger that stamps records but writes nowhere.
    pub fn disabled() -> Self {
        Self { writer: None }
    }

    pub fn write(&mut self, record: &GameRecord) -> std::io::Result<()> {
        let mut rec = record.clone();
        if rec.ts.is_none() {
            rec.ts = Some(now_rfc3339());
        }
        let line = serde_json::to_string(&rec).map_err(std::io::Error::other)?;
        if let Some(w) = &mut self.writer {
            w.write_all(line.as_bytes())?;
            w.write_all(b"\n")?;
            w.flush()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for GameLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameLogger")
            .field("enabled", &self.writer.is_some())
            .finish()
    }
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
