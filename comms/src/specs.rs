use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Immutable configuration of a run, shipped with `StartRun` and echoed on
/// every band so worker calls stay self-contained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSpec {
    /// Grid width in cells.
    pub width: usize,
    /// Grid height in cells.
    pub height: usize,
    /// Total generations to compute.
    pub turns: usize,
    /// Intra-worker parallelism degree.
    pub threads: usize,
}

/// Coordinate of a live cell, column first.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct Cell {
    pub x: u32,
    pub y: u32,
}
