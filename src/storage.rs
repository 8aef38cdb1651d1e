//! Saved games kept as a JSON array in a single file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::board::Board;
use crate::snapshot::{BoardSnapshot, SnapshotError};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("could not access save file: {0}")]
    Io(#[from] io::Error),
    #[error("save file is corrupt: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no saved game #{0}")]
    NoSuchGame(usize),
    #[error("saved game is invalid: {0}")]
    InvalidSnapshot(#[from] SnapshotError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedGame {
    pub name: String,
    #[serde(rename = "timestamp")]
    pub saved_at: DateTime<Utc>,
    #[serde(flatten)]
    pub snapshot: BoardSnapshot,
}

pub struct GameStore {
    path: PathBuf,
}

impl GameStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All saved games, oldest first. A missing file means no games.
    pub fn list(&self) -> Result<Vec<SavedGame>, StorageError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&text)?)
    }

    fn write(&self, games: &[SavedGame]) -> Result<(), StorageError> {
        fs::write(&self.path, serde_json::to_string_pretty(games)?)?;
        Ok(())
    }

    /// Append the board to the store under a generated name.
    pub fn save(&self, board: &Board) -> Result<SavedGame, StorageError> {
        let saved_at = Utc::now();
        let size = board.size();
        let game = SavedGame {
            name: format!("Go {size}x{size} - {}", saved_at.format("%Y-%m-%d %H:%M:%S")),
            saved_at,
            snapshot: BoardSnapshot::from_board(board),
        };
        let mut games = self.list()?;
        games.push(game.clone());
        self.write(&games)?;
        debug!("saved '{}' to {}", game.name, self.path.display());
        Ok(game)
    }

    /// Snapshot of game `index`, validated and ready for a registry.
    pub fn load(&self, index: usize) -> Result<BoardSnapshot, StorageError> {
        let game = self
            .list()?
            .into_iter()
            .nth(index)
            .ok_or(StorageError::NoSuchGame(index))?;
        game.snapshot.validate()?;
        Ok(game.snapshot)
    }

    pub fn delete(&self, index: usize) -> Result<SavedGame, StorageError> {
        let mut games = self.list()?;
        if index >= games.len() {
            return Err(StorageError::NoSuchGame(index));
        }
        let removed = games.remove(index);
        self.write(&games)?;
        Ok(removed)
    }
}
