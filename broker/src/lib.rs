pub mod broker;
pub mod error;
pub mod partition;
pub mod service;
pub mod state;
pub mod workers;

pub use broker::{Broker, Event, Outcome};
pub use error::{BrokerErr, Result};
pub use service::{Session, serve_conn};
pub use state::RunState;
pub use workers::WorkerHandle;
