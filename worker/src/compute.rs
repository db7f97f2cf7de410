use comms::specs::RunSpec;
use gol::Grid;
use ndarray::s;
use rayon::prelude::*;

use crate::error::{Result, WorkerErr};

// Grids of exactly this size are always split four ways, whatever the run
// asks for. Kept for compatibility with the deployed fixtures.
const SMALL_GRID_DIM: usize = 16;
const SMALL_GRID_SPLIT: usize = 4;

/// Splits `rows` into `splits` contiguous ranges, as evenly as possible,
/// with the remainder absorbed by the last range.
fn sub_ranges(rows: usize, splits: usize) -> Vec<(usize, usize)> {
    let chunk = rows / splits;
    (0..splits)
        .map(|i| {
            let start = i * chunk;
            let end = if i == splits - 1 { rows } else { (i + 1) * chunk };
            (start, end)
        })
        .collect()
}

fn split_degree(spec: &RunSpec) -> usize {
    if spec.width == SMALL_GRID_DIM && spec.height == SMALL_GRID_DIM {
        SMALL_GRID_SPLIT
    } else {
        spec.threads.max(1)
    }
}

/// Computes the next state of a band's owned rows.
///
/// `cells` holds the rows `[start, end)` of the grid framed by one halo row
/// above and one below, row-major. The owned rows are split into sub-ranges
/// evaluated in parallel, each task over its own copy of the band, and the
/// outputs are merged back in sub-range order.
///
/// # Arguments
/// * `spec` - The run configuration the band belongs to.
/// * `start` - First owned row, in grid coordinates.
/// * `end` - One past the last owned row, in grid coordinates.
/// * `cells` - The band including both halo rows.
///
/// # Returns
/// The next state of the owned rows, `end - start` rows tall.
///
/// # Errors
/// `WorkerErr::BandRange` when `end` precedes `start`, and
/// `WorkerErr::BandSizeMismatch` when the cell count disagrees with the
/// requested range. Neither computes on truncated data.
pub fn process_band(spec: &RunSpec, start: usize, end: usize, cells: &[u8]) -> Result<Grid> {
    if end < start {
        return Err(WorkerErr::BandRange { start, end });
    }

    let owned = end - start;
    let expected = (owned + 2) * spec.width;
    if cells.len() != expected {
        return Err(WorkerErr::BandSizeMismatch {
            got: cells.len(),
            expected,
        });
    }

    let band = Grid::from_shape_vec((owned + 2, spec.width), cells.to_vec())
        .map_err(|_| WorkerErr::BandSizeMismatch {
            got: cells.len(),
            expected,
        })?;

    let strips: Vec<Grid> = sub_ranges(owned, split_degree(spec))
        .into_par_iter()
        .map(|(a, b)| {
            // Each task evaluates its own copy of the band.
            let local = band.clone();
            gol::next_rows(local.view(), 1 + a, 1 + b)
        })
        .collect();

    let mut out = Grid::from_elem((owned, spec.width), gol::DEAD);
    let mut at = 0;
    for strip in &strips {
        out.slice_mut(s![at..at + strip.nrows(), ..]).assign(strip);
        at += strip.nrows();
    }

    Ok(out)
}
