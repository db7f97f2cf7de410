//! Row-band partitioning and halo assembly.

use gol::Grid;
use ndarray::s;

/// Splits `height` rows into `bands` contiguous ranges, sized as evenly as
/// possible with the remainder absorbed by the last band.
pub fn band_ranges(height: usize, bands: usize) -> Vec<(usize, usize)> {
    let size = height / bands;
    (0..bands)
        .map(|i| {
            let start = i * size;
            let end = if i == bands - 1 { height } else { (i + 1) * size };
            (start, end)
        })
        .collect()
}

/// Copies rows `[start, end)` of `grid` framed by one wrapped halo row on
/// each side. The halo always wraps the full grid height, also with a
/// single band bordering itself.
pub fn band_with_halo(grid: &Grid, start: usize, end: usize) -> Grid {
    let (height, width) = grid.dim();
    let rows = end - start;
    let mut band = Grid::from_elem((rows + 2, width), gol::DEAD);

    band.row_mut(0)
        .assign(&grid.row((start + height - 1) % height));
    band.slice_mut(s![1..rows + 1, ..])
        .assign(&grid.slice(s![start..end, ..]));
    band.row_mut(rows + 1).assign(&grid.row(end % height));
    band
}

/// Writes a computed band back into `grid` at `start`.
pub fn stitch(grid: &mut Grid, start: usize, rows: &Grid) {
    grid.slice_mut(s![start..start + rows.nrows(), ..]).assign(rows);
}
