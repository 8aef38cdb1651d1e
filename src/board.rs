//! Go board engine: stone placement, captures, suicide rejection and
//! single-move undo.
//!
//! The grid is a flat `Vec<Option<Stone>>` indexed row-major. Group
//! traversal always uses an explicit work-list with a visited bitmap, so a
//! group spanning most of a 19x19 board costs no call-stack depth.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::MIN_BOARD_SIZE;

/// A stone color. Black moves first.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stone {
    Black,
    White,
}

impl Stone {
    pub fn opponent(self) -> Stone {
        match self {
            Stone::Black => Stone::White,
            Stone::White => Stone::Black,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Stone::Black => "Black",
            Stone::White => "White",
        }
    }
}

/// A (row, col) position on the grid.
pub type Point = (usize, usize);

/// One entry of the move history.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub row: usize,
    pub col: usize,
    pub stone: Stone,
}

/// Why a move attempt was refused. The board is left untouched, except that
/// opponent captures resolved before a suicide check are kept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("Illegal move: ({row}, {col}) is off a {size}x{size} board")]
    OutOfBounds { row: usize, col: usize, size: usize },
    /// Point holds a stone that is not the most recent move.
    #[error("Illegal move: only the last placed stone can be removed")]
    Occupied,
    #[error("Illegal move: suicide")]
    Suicide,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("invalid board size {0}, must be at least {MIN_BOARD_SIZE}")]
    InvalidBoardSize(usize),
}

/// Result of a successful [`Board::attempt_move`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// A stone was placed and `captured` opponent stones were removed.
    Placed { mv: Move, captured: u32 },
    /// The most recent move was taken back.
    Undone(Move),
}

/// One Go board of fixed size with its history, turn and capture tallies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Board {
    size: usize,
    cells: Vec<Option<Stone>>,
    history: Vec<Move>,
    current_player: Stone,
    black_captures: u32,
    white_captures: u32,
}

impl Board {
    pub fn new(size: usize) -> Result<Self, BoardError> {
        if size < MIN_BOARD_SIZE {
            return Err(BoardError::InvalidBoardSize(size));
        }
        Ok(Self {
            size,
            cells: vec![None; size * size],
            history: Vec::new(),
            current_player: Stone::Black,
            black_captures: 0,
            white_captures: 0,
        })
    }

    /// Assemble a board from already-validated parts (see `snapshot`).
    pub(crate) fn from_parts(
        size: usize,
        cells: Vec<Option<Stone>>,
        history: Vec<Move>,
        current_player: Stone,
        black_captures: u32,
        white_captures: u32,
    ) -> Self {
        debug_assert_eq!(cells.len(), size * size);
        Self {
            size,
            cells,
            history,
            current_player,
            black_captures,
            white_captures,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn current_player(&self) -> Stone {
        self.current_player
    }

    pub fn history(&self) -> &[Move] {
        &self.history
    }

    pub fn last_move(&self) -> Option<&Move> {
        self.history.last()
    }

    /// Stones captured by `stone`.
    pub fn captures(&self, stone: Stone) -> u32 {
        match stone {
            Stone::Black => self.black_captures,
            Stone::White => self.white_captures,
        }
    }

    pub(crate) fn cells(&self) -> &[Option<Stone>] {
        &self.cells
    }

    fn idx(&self, row: usize, col: usize) -> usize {
        row * self.size + col
    }

    pub fn in_bounds(&self, row: usize, col: usize) -> bool {
        row < self.size && col < self.size
    }

    /// Stone at (row, col); `None` for empty or off-board points.
    pub fn get(&self, row: usize, col: usize) -> Option<Stone> {
        if !self.in_bounds(row, col) {
            return None;
        }
        self.cells[self.idx(row, col)]
    }

    fn set(&mut self, row: usize, col: usize, value: Option<Stone>) {
        let i = self.idx(row, col);
        self.cells[i] = value;
    }

    /// True if a move at (row, col) is already recorded in the history.
    pub fn has_played_at(&self, row: usize, col: usize) -> bool {
        self.history.iter().any(|m| m.row == row && m.col == col)
    }

    fn neighbors(&self, row: usize, col: usize) -> impl Iterator<Item = Point> + use<> {
        let s = self.size;
        let mut v = Vec::with_capacity(4);
        if row > 0 {
            v.push((row - 1, col));
        }
        if row + 1 < s {
            v.push((row + 1, col));
        }
        if col > 0 {
            v.push((row, col - 1));
        }
        if col + 1 < s {
            v.push((row, col + 1));
        }
        v.into_iter()
    }

    /// Play the current player's stone at (row, col), or take back the most
    /// recent move when (row, col) is where it was played.
    pub fn attempt_move(&mut self, row: usize, col: usize) -> Result<MoveOutcome, MoveError> {
        self.check_bounds(row, col)?;
        if self.get(row, col).is_some() {
            return self.undo_at(row, col).map(MoveOutcome::Undone);
        }

        let stone = self.current_player;
        let captured = self.place(row, col, stone)?;
        let mv = Move { row, col, stone };
        self.history.push(mv);
        self.current_player = stone.opponent();
        Ok(MoveOutcome::Placed { mv, captured })
    }

    /// Apply a move received from a peer through the same placement rules as
    /// local play, then hand the turn to `next_player` as the peer reported.
    pub fn apply_remote(
        &mut self,
        row: usize,
        col: usize,
        stone: Stone,
        next_player: Stone,
    ) -> Result<u32, MoveError> {
        self.check_bounds(row, col)?;
        if self.get(row, col).is_some() {
            return Err(MoveError::Occupied);
        }
        let captured = self.place(row, col, stone)?;
        self.history.push(Move { row, col, stone });
        self.current_player = next_player;
        Ok(captured)
    }

    /// Reset to an empty board with Black to move and no captures.
    pub fn clear(&mut self) {
        self.cells.iter_mut().for_each(|c| *c = None);
        self.history.clear();
        self.current_player = Stone::Black;
        self.black_captures = 0;
        self.white_captures = 0;
    }

    fn check_bounds(&self, row: usize, col: usize) -> Result<(), MoveError> {
        if self.in_bounds(row, col) {
            Ok(())
        } else {
            Err(MoveError::OutOfBounds {
                row,
                col,
                size: self.size,
            })
        }
    }

    fn undo_at(&mut self, row: usize, col: usize) -> Result<Move, MoveError> {
        match self.last_move().copied() {
            Some(last)
                if last.row == row && last.col == col && self.get(row, col) == Some(last.stone) =>
            {
                self.set(row, col, None);
                self.history.pop();
                self.current_player = last.stone;
                Ok(last)
            }
            _ => Err(MoveError::Occupied),
        }
    }

    /// Put `stone` on an empty point, resolve captures, and reject suicide.
    /// Returns the number of opponent stones removed.
    fn place(&mut self, row: usize, col: usize, stone: Stone) -> Result<u32, MoveError> {
        self.set(row, col, Some(stone));
        let captured = self.resolve_captures(row, col, stone);

        // Captures made above stand even when the placement is refused.
        if !self.has_liberty(row, col, stone) {
            self.set(row, col, None);
            return Err(MoveError::Suicide);
        }
        Ok(captured)
    }

    /// Remove every opponent group adjacent to (row, col) left without a
    /// liberty, crediting the removed stones to `acting`.
    fn resolve_captures(&mut self, row: usize, col: usize, acting: Stone) -> u32 {
        let opp = acting.opponent();
        let mut total = 0;
        for (nr, nc) in self.neighbors(row, col) {
            if self.get(nr, nc) == Some(opp) && !self.has_liberty(nr, nc, opp) {
                total += self.remove_group(nr, nc, opp);
            }
        }
        match acting {
            Stone::Black => self.black_captures += total,
            Stone::White => self.white_captures += total,
        }
        total
    }

    /// Whether the group of `stone` containing (row, col) touches an empty
    /// point. Stops at the first liberty found.
    pub fn has_liberty(&self, row: usize, col: usize, stone: Stone) -> bool {
        if self.get(row, col) != Some(stone) {
            return false;
        }
        let mut stack = vec![(row, col)];
        let mut visited = vec![false; self.size * self.size];
        while let Some((r, c)) = stack.pop() {
            let i = self.idx(r, c);
            if visited[i] {
                continue;
            }
            visited[i] = true;
            for (nr, nc) in self.neighbors(r, c) {
                match self.get(nr, nc) {
                    None => return true,
                    Some(s) if s == stone && !visited[self.idx(nr, nc)] => stack.push((nr, nc)),
                    _ => {}
                }
            }
        }
        false
    }

    /// Clear the whole group of `stone` containing (row, col) and return how
    /// many stones were removed.
    pub(crate) fn remove_group(&mut self, row: usize, col: usize, stone: Stone) -> u32 {
        let mut stack = vec![(row, col)];
        let mut visited = vec![false; self.size * self.size];
        let mut removed = 0;
        while let Some((r, c)) = stack.pop() {
            let i = self.idx(r, c);
            if visited[i] {
                continue;
            }
            visited[i] = true;
            if self.cells[i] != Some(stone) {
                continue;
            }
            self.cells[i] = None;
            removed += 1;
            for (nr, nc) in self.neighbors(r, c) {
                if !visited[self.idx(nr, nc)] && self.get(nr, nc) == Some(stone) {
                    stack.push((nr, nc));
                }
            }
        }
        removed
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "   ")?;
        for col in 0..self.size {
            write!(f, "{:<2}", col % 10)?;
        }
        writeln!(f)?;
        for row in 0..self.size {
            write!(f, "{row:>2} ")?;
            for col in 0..self.size {
                let ch = match self.get(row, col) {
                    Some(Stone::Black) => 'X',
                    Some(Stone::White) => 'O',
                    None => '.',
                };
                write!(f, "{ch} ")?;
            }
            writeln!(f)?;
        }
        writeln!(
            f,
            "Black captures: {}  White captures: {}  To move: {}",
            self.black_captures,
            self.white_captures,
            self.current_player.name()
        )
    }
}
