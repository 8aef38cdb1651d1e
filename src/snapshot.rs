//! Serializable copy of one board: the payload of `sync-accept` and of saved
//! games.
//!
//! Snapshots arriving from the network are untrusted. [`BoardSnapshot::validate`]
//! checks the shape before anything is written into a registry.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::board::{Board, Move, Stone};
use crate::constants::MIN_BOARD_SIZE;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("invalid board size {0}")]
    InvalidBoardSize(usize),
    #[error("grid has {found} rows, expected {expected}")]
    RowCount { expected: usize, found: usize },
    #[error("grid row {row} has {found} cells, expected {expected}")]
    RowLength {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("history entry {index} at ({row}, {col}) is off the board")]
    MoveOutOfBounds { index: usize, row: usize, col: usize },
}

/// Complete state of one board as exchanged between peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSnapshot {
    pub board_size: usize,
    /// Rows of cells, `grid[row][col]`.
    pub grid: Vec<Vec<Option<Stone>>>,
    pub move_history: Vec<Move>,
    pub current_player: Stone,
    pub black_capture_count: u32,
    pub white_capture_count: u32,
}

impl BoardSnapshot {
    pub fn from_board(board: &Board) -> Self {
        let size = board.size();
        let grid = board
            .cells()
            .chunks(size)
            .map(|row| row.to_vec())
            .collect();
        Self {
            board_size: size,
            grid,
            move_history: board.history().to_vec(),
            current_player: board.current_player(),
            black_capture_count: board.captures(Stone::Black),
            white_capture_count: board.captures(Stone::White),
        }
    }

    pub fn validate(&self) -> Result<(), SnapshotError> {
        let size = self.board_size;
        if size < MIN_BOARD_SIZE {
            return Err(SnapshotError::InvalidBoardSize(size));
        }
        if self.grid.len() != size {
            return Err(SnapshotError::RowCount {
                expected: size,
                found: self.grid.len(),
            });
        }
        if let Some((row, cells)) = self
            .grid
            .iter()
            .enumerate()
            .find(|(_, cells)| cells.len() != size)
        {
            return Err(SnapshotError::RowLength {
                row,
                expected: size,
                found: cells.len(),
            });
        }
        // Stones in the history may have been captured since, so only the
        // coordinates are checked.
        if let Some((index, mv)) = self
            .move_history
            .iter()
            .enumerate()
            .find(|(_, mv)| mv.row >= size || mv.col >= size)
        {
            return Err(SnapshotError::MoveOutOfBounds {
                index,
                row: mv.row,
                col: mv.col,
            });
        }
        Ok(())
    }

    /// Build a board from this snapshot after validating it.
    pub fn to_board(&self) -> Result<Board, SnapshotError> {
        self.validate()?;
        let cells = self.grid.iter().flatten().copied().collect();
        Ok(Board::from_parts(
            self.board_size,
            cells,
            self.move_history.clone(),
            self.current_player,
            self.black_capture_count,
            self.white_capture_count,
        ))
    }
}
