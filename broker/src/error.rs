use std::{error::Error, fmt, io};

/// The broker module's result type.
pub type Result<T> = std::result::Result<T, BrokerErr>;

/// Broker runtime failures.
///
/// Worker failures carry the worker index so a dead connection is
/// distinguishable from a hung one.
#[derive(Debug)]
pub enum BrokerErr {
    Io(io::Error),
    /// A worker call failed at the transport level.
    WorkerCall { worker: usize, source: io::Error },
    /// A worker reported an application level error.
    Remote { worker: usize, detail: String },
    /// A worker returned a band that disagrees with the requested range.
    BandMismatch {
        worker: usize,
        got: usize,
        expected: usize,
    },
    /// The controller hung up while a run was active.
    ControllerGone,
}

impl fmt::Display for BrokerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerErr::Io(e) => write!(f, "io error: {e}"),
            BrokerErr::WorkerCall { worker, source } => {
                write!(f, "call to worker {worker} failed: {source}")
            }
            BrokerErr::Remote { worker, detail } => {
                write!(f, "worker {worker} reported: {detail}")
            }
            BrokerErr::BandMismatch {
                worker,
                got,
                expected,
            } => write!(
                f,
                "worker {worker} returned {got} cells, expected {expected}"
            ),
            BrokerErr::ControllerGone => write!(f, "controller disconnected mid-run"),
        }
    }
}

impl Error for BrokerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BrokerErr::Io(e) => Some(e),
            BrokerErr::WorkerCall { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for BrokerErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<BrokerErr> for io::Error {
    fn from(value: BrokerErr) -> Self {
        match value {
            BrokerErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
