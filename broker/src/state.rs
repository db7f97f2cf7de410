use comms::specs::RunSpec;
use gol::Grid;

use crate::partition;

/// State owned by one run's orchestration loop.
///
/// Nothing outside the loop holds a reference to it; control calls observe
/// it only through the loop's replies.
#[derive(Debug)]
pub struct RunState {
    pub spec: RunSpec,
    pub grid: Grid,
    pub turn: usize,
    pub paused: bool,
    pub alive: usize,
}

impl RunState {
    /// Seeds a run. The alive cache starts at the initial grid's count so
    /// queries are meaningful before the first generation completes.
    pub fn new(spec: RunSpec, grid: Grid) -> Self {
        let alive = gol::alive_count(grid.view());
        Self {
            spec,
            grid,
            turn: 0,
            paused: false,
            alive,
        }
    }

    /// Commits one completed generation: stitches every band back in
    /// order, refreshes the alive cache and advances the turn, once.
    pub fn commit(&mut self, bands: Vec<(usize, Grid)>) {
        for (start, rows) in &bands {
            partition::stitch(&mut self.grid, *start, rows);
        }
        self.alive = gol::alive_count(self.grid.view());
        self.turn += 1;
    }
}
