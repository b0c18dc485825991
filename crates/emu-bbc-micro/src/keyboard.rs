//! Keyboard matrix shared between the UI thread and the emulation thread.
//!
//! The BBC Micro keyboard is wired as a 10-column by 8-row matrix, scanned
//! by the System VIA (columns selected through the addressable latch, rows
//! read back on Port A). The UI thread is the only writer; the emulation
//! thread only reads — per §5, this is a lock-free byte grid, not a
//! channel message, since key state changes far more often than the
//! emulation thread needs to observe it.

use std::sync::atomic::{AtomicBool, Ordering};

pub const COLUMNS: usize = 10;
pub const ROWS: usize = 8;

/// Lock-free key matrix. Cells are written only by the UI thread and read
/// only by the emulation thread.
pub struct KeyMatrix {
    cells: [AtomicBool; COLUMNS * ROWS],
}

impl KeyMatrix {
    #[must_use]
    pub fn new() -> Self {
        Self { cells: std::array::from_fn(|_| AtomicBool::new(false)) }
    }

    fn index(row: usize, col: usize) -> usize {
        col * ROWS + row
    }

    /// Called by the UI thread when a key's physical state changes.
    pub fn set(&self, row: usize, col: usize, pressed: bool) {
        if row < ROWS && col < COLUMNS {
            self.cells[Self::index(row, col)].store(pressed, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn is_key_pressed(&self, row: usize, col: usize) -> bool {
        if row >= ROWS || col >= COLUMNS {
            return false;
        }
        self.cells[Self::index(row, col)].load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_key_column_pressed(&self, col: usize) -> bool {
        (0..ROWS).any(|row| self.is_key_pressed(row, col))
    }

    #[must_use]
    pub fn is_any_key_pressed(&self) -> bool {
        (0..COLUMNS).any(|col| self.is_key_column_pressed(col))
    }
}

impl Default for KeyMatrix {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_read_round_trips() {
        let matrix = KeyMatrix::new();
        assert!(!matrix.is_key_pressed(3, 4));
        matrix.set(3, 4, true);
        assert!(matrix.is_key_pressed(3, 4));
        assert!(matrix.is_key_column_pressed(4));
        assert!(matrix.is_any_key_pressed());
    }

    #[test]
    fn out_of_range_cells_read_as_unpressed() {
        let matrix = KeyMatrix::new();
        assert!(!matrix.is_key_pressed(99, 99));
    }

    #[test]
    fn empty_matrix_reports_no_key_pressed() {
        let matrix = KeyMatrix::new();
        assert!(!matrix.is_any_key_pressed());
    }
}
