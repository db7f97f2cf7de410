//! Pure Game of Life evaluation over a toroidal grid.
//!
//! Everything here is deterministic and free of I/O, so the same code
//! serves as the worker compute kernel and as the reference path in tests.

use comms::specs::Cell;
use ndarray::{Array2, ArrayView2};

/// Byte value of a live cell, matching the raster encoding.
pub const ALIVE: u8 = 255;
/// Byte value of a dead cell.
pub const DEAD: u8 = 0;

/// Row-major cell matrix, height x width.
pub type Grid = Array2<u8>;

// Relative positions of the 8 neighbouring cells.
const NEIGHBOURS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Computes the next state of rows `[start, end)` of `grid`.
///
/// A live cell with 2 or 3 live neighbours survives, a dead cell with
/// exactly 3 live neighbours is born, every other cell dies. Neighbour
/// lookups wrap modulo the view's own dimensions, so a full grid behaves
/// as a torus and a band framed by halo rows never reads outside itself.
///
/// # Arguments
/// * `grid` - Current state, either the whole grid or a band with halos.
/// * `start` - First row to evaluate.
/// * `end` - One past the last row to evaluate.
///
/// # Returns
/// The next state of the evaluated rows, `end - start` rows tall.
///
/// # Panics
/// Panics if `[start, end)` is not a valid row range of `grid`. Malformed
/// ranges are a caller contract violation, not a runtime condition.
pub fn next_rows(grid: ArrayView2<'_, u8>, start: usize, end: usize) -> Array2<u8> {
    assert!(start <= end && end <= grid.nrows());

    let (height, width) = grid.dim();
    let mut next = Array2::from_elem((end - start, width), DEAD);

    for row in start..end {
        for col in 0..width {
            let mut alive = 0;
            for (dr, dc) in NEIGHBOURS {
                let r = (row as isize + dr).rem_euclid(height as isize) as usize;
                let c = (col as isize + dc).rem_euclid(width as isize) as usize;
                if grid[[r, c]] == ALIVE {
                    alive += 1;
                }
            }

            next[[row - start, col]] = match (grid[[row, col]], alive) {
                (ALIVE, 2 | 3) => ALIVE,
                (DEAD, 3) => ALIVE,
                _ => DEAD,
            };
        }
    }

    next
}

/// Lists the coordinates of every live cell in row-major order.
pub fn alive_cells(grid: ArrayView2<'_, u8>) -> Vec<Cell> {
    grid.indexed_iter()
        .filter(|&(_, &cell)| cell == ALIVE)
        .map(|((y, x), _)| Cell {
            x: x as u32,
            y: y as u32,
        })
        .collect()
}

/// Counts the live cells.
pub fn alive_count(grid: ArrayView2<'_, u8>) -> usize {
    grid.iter().filter(|&&cell| cell == ALIVE).count()
}
