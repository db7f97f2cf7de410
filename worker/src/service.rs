use std::{borrow::Cow, io, sync::Arc};

use comms::{
    GolReceiver, GolSender,
    msg::{Command, Msg, Payload},
};
use log::{debug, info, warn};
use parking_lot::RwLock;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    task,
};

use crate::{compute, error::Result, state::WorkerState};

/// Why a connection loop ended.
#[derive(Debug, PartialEq, Eq)]
pub enum Served {
    /// The peer closed the connection.
    Disconnected,
    /// A `Terminate` command was received; the process should exit.
    Terminated,
}

/// Serves one broker connection until the peer disconnects or terminates
/// the worker.
///
/// Bands are computed on the blocking pool so snapshot queries on other
/// connections stay responsive; the shared `state` records the last
/// computed band and the processed-band count.
///
/// # Arguments
/// * `state` - Shared worker state, updated after every band.
/// * `rx` - Receiving end of the connection.
/// * `tx` - Sending end of the connection.
///
/// # Errors
/// Returns `WorkerErr::Io` on transport failures. A malformed band is
/// answered with `Msg::Err` and does not end the loop.
pub async fn serve<R, W>(
    state: Arc<RwLock<WorkerState>>,
    mut rx: GolReceiver<R>,
    mut tx: GolSender<W>,
) -> Result<Served>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut rx_buf = vec![0; 1028];

    loop {
        let msg: Msg = match rx.recv_into(&mut rx_buf).await {
            Ok(msg) => msg,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                debug!("broker disconnected");
                return Ok(Served::Disconnected);
            }
            Err(e) => return Err(e.into()),
        };

        match msg {
            Msg::Data(Payload::Band {
                spec,
                start,
                end,
                cells,
            }) => {
                let owned = cells.to_vec();
                let (start, end) = (start as usize, end as usize);

                let computed = task::spawn_blocking(move || {
                    compute::process_band(&spec, start, end, &owned)
                })
                .await
                .map_err(|e| io::Error::other(format!("compute join error: {e}")))?;

                match computed {
                    Ok(rows) => {
                        {
                            let mut state = state.write();
                            state.record(rows.clone());
                            debug!(turns = state.turns; "band processed");
                        }

                        // SAFETY: Arrays built by the engine are owned and
                        //         standard layout.
                        let cells = rows.as_slice().unwrap();
                        let reply = Msg::Data(Payload::BandDone {
                            start: start as u32,
                            end: end as u32,
                            cells,
                        });
                        tx.send(&reply).await?;
                    }
                    Err(e) => {
                        warn!("rejecting band: {e}");
                        tx.send(&Msg::Err(Cow::Owned(e.to_string()))).await?;
                    }
                }
            }
            Msg::Control(Command::Snapshot) => {
                let (turns, band) = {
                    let state = state.read();
                    (state.turns, state.last.clone())
                };
                let band = band.unwrap_or_else(|| gol::Grid::from_elem((0, 0), gol::DEAD));

                // SAFETY: Arrays built by the engine are owned and standard
                //         layout.
                let cells = band.as_slice().unwrap();
                let reply = Msg::Data(Payload::Grid {
                    turn: turns as u32,
                    cells,
                });
                tx.send(&reply).await?;
            }
            Msg::Control(Command::Terminate) => {
                info!("terminate received");
                return Ok(Served::Terminated);
            }
            Msg::Control(cmd) => warn!("ignoring unexpected command {cmd:?}"),
            Msg::Data(payload) => warn!("ignoring unexpected payload {payload:?}"),
            Msg::Err(detail) => warn!("broker reported: {detail}"),
        }
    }
}
