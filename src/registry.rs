//! One board per size, plus a pointer to the board currently in play.
//!
//! The current board is held inline so that [`BoardRegistry::current`] never
//! fails; boards of other sizes wait in `parked` until selected again.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use crate::board::{Board, BoardError};
use crate::snapshot::{BoardSnapshot, SnapshotError};

#[derive(Debug, Clone)]
pub struct BoardRegistry {
    current: Board,
    parked: BTreeMap<usize, Board>,
}

impl BoardRegistry {
    pub fn new(initial_size: usize) -> Result<Self, BoardError> {
        Ok(Self {
            current: Board::new(initial_size)?,
            parked: BTreeMap::new(),
        })
    }

    pub fn current_size(&self) -> usize {
        self.current.size()
    }

    pub fn current(&self) -> &Board {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut Board {
        &mut self.current
    }

    /// Board for `size`, created empty on first use.
    pub fn board(&mut self, size: usize) -> Result<&mut Board, BoardError> {
        if size == self.current.size() {
            return Ok(&mut self.current);
        }
        match self.parked.entry(size) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(e) => Ok(e.insert(Board::new(size)?)),
        }
    }

    /// Make `size` the current board, creating it if needed. The previous
    /// current board keeps its game.
    pub fn set_current(&mut self, size: usize) -> Result<(), BoardError> {
        if size == self.current.size() {
            return Ok(());
        }
        let next = match self.parked.remove(&size) {
            Some(board) => board,
            None => Board::new(size)?,
        };
        let previous = std::mem::replace(&mut self.current, next);
        self.parked.insert(previous.size(), previous);
        Ok(())
    }

    /// Overwrite the board matching the snapshot's size wholesale. Used by
    /// sync reconciliation and saved-game loading, never by local play.
    pub fn replace_snapshot(&mut self, snapshot: &BoardSnapshot) -> Result<(), SnapshotError> {
        let board = snapshot.to_board()?;
        if board.size() == self.current.size() {
            self.current = board;
        } else {
            self.parked.insert(board.size(), board);
        }
        Ok(())
    }

    /// Sizes that currently have a board, in ascending order.
    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes: Vec<usize> = self.parked.keys().copied().collect();
        sizes.push(self.current.size());
        sizes.sort_unstable();
        sizes
    }
}
