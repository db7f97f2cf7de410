use gol::Grid;

/// Results of the last processed band, kept readable for snapshot queries
/// arriving on other connections.
#[derive(Debug, Default)]
pub struct WorkerState {
    /// Number of bands processed since startup.
    pub turns: usize,

    /// The last computed band, halo stripped.
    pub last: Option<Grid>,
}

impl WorkerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one processed band.
    pub fn record(&mut self, band: Grid) {
        self.turns += 1;
        self.last = Some(band);
    }
}
