pub mod compute;
pub mod error;
pub mod service;
pub mod state;

pub use error::{Result, WorkerErr};
pub use service::{Served, serve};
pub use state::WorkerState;
