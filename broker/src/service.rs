use std::{borrow::Cow, io};

use comms::{
    GolReceiver, GolSender,
    msg::{Command, Msg, Payload},
};
use gol::Grid;
use log::{debug, info, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};

use crate::{
    broker::{Broker, Event, Outcome},
    error::BrokerErr,
};

/// Why a controller session ended.
#[derive(Debug, PartialEq, Eq)]
pub enum Session {
    /// The controller closed the connection.
    Closed,
    /// A `Terminate` was processed; the process should exit.
    Killed,
}

/// Serves one controller connection: handshake, run, final reply, repeat.
///
/// A reader task parses messages off the connection into events so the
/// orchestration loop can observe control calls while a generation is in
/// flight.
///
/// # Arguments
/// * `broker` - The broker and its worker pool.
/// * `rx` - Receiving end of the controller connection.
/// * `tx` - Sending end of the controller connection.
///
/// # Errors
/// Returns `io::Error` when replying to the controller fails. A failed run
/// is reported to the controller as `Msg::Err` and ends the session's
/// current run only.
pub async fn serve_conn<R, W, Rw, Ww>(
    broker: &mut Broker<Rw, Ww>,
    rx: GolReceiver<R>,
    tx: &mut GolSender<W>,
) -> io::Result<Session>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
    Rw: AsyncRead + Unpin,
    Ww: AsyncWrite + Unpin,
{
    let (event_tx, mut events) = mpsc::channel(16);
    let reader = tokio::spawn(read_events(rx, event_tx));

    let session = drive(broker, &mut events, tx).await;
    reader.abort();
    session
}

async fn drive<W, Rw, Ww>(
    broker: &mut Broker<Rw, Ww>,
    events: &mut mpsc::Receiver<Event>,
    tx: &mut GolSender<W>,
) -> io::Result<Session>
where
    W: AsyncWrite + Unpin,
    Rw: AsyncRead + Unpin,
    Ww: AsyncWrite + Unpin,
{
    loop {
        // Handshake: `StartRun` announcing the spec, then the seed grid.
        let spec = loop {
            match events.recv().await {
                None => return Ok(Session::Closed),
                Some(Event::Start(spec)) => break spec,
                Some(Event::Key(Command::Terminate)) => {
                    broker.shutdown().await;
                    return Ok(Session::Killed);
                }
                Some(Event::Key(cmd)) => {
                    warn!("no active run for {cmd:?}");
                    tx.send(&Msg::Err(Cow::Borrowed("no active run"))).await?;
                }
                Some(other) => warn!("expected StartRun, got {other:?}"),
            }
        };

        let seed = loop {
            match events.recv().await {
                None => return Ok(Session::Closed),
                Some(Event::Seed { cells }) => {
                    match Grid::from_shape_vec((spec.height, spec.width), cells) {
                        Ok(grid) => break grid,
                        Err(_) => {
                            warn!("seed grid does not match {}x{}", spec.width, spec.height);
                            tx.send(&Msg::Err(Cow::Borrowed("seed grid size mismatch")))
                                .await?;
                        }
                    }
                }
                Some(Event::Key(Command::Terminate)) => {
                    broker.shutdown().await;
                    return Ok(Session::Killed);
                }
                Some(other) => warn!("expected the seed grid, got {other:?}"),
            }
        };

        match broker.run(spec, seed, events, tx).await {
            Ok(Outcome::Finished(state)) => {
                let alive = gol::alive_cells(state.grid.view());

                // SAFETY: The committed grid is an owned standard layout
                //         array.
                let cells = state.grid.as_slice().unwrap();
                let msg = Msg::Data(Payload::Final {
                    turn: state.turn as u32,
                    done: true,
                    alive: Cow::Owned(alive),
                    cells,
                });
                tx.send(&msg).await?;
                debug!("final state delivered");
            }
            Ok(Outcome::Killed) => return Ok(Session::Killed),
            Err(BrokerErr::ControllerGone) => {
                info!("controller vanished, discarding the run");
                return Ok(Session::Closed);
            }
            Err(e) => {
                warn!("run failed: {e}");
                tx.send(&Msg::Err(Cow::Owned(e.to_string()))).await?;
            }
        }
    }
}

async fn read_events<R>(mut rx: GolReceiver<R>, events: mpsc::Sender<Event>)
where
    R: AsyncRead + Unpin,
{
    let mut rx_buf = vec![0; 1028];

    loop {
        let event = match rx.recv_into(&mut rx_buf).await {
            Ok(Msg::Control(Command::StartRun(spec))) => Event::Start(spec),
            Ok(Msg::Data(Payload::Grid { cells, .. })) => Event::Seed {
                cells: cells.to_vec(),
            },
            Ok(Msg::Control(cmd)) => Event::Key(cmd),
            Ok(Msg::Err(detail)) => Event::Remote(detail.into_owned()),
            Ok(other) => {
                warn!("ignoring unexpected message {other:?}");
                continue;
            }
            Err(e) => {
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    debug!("controller disconnected");
                } else {
                    warn!("controller read failed: {e}");
                }
                break;
            }
        };

        if events.send(event).await.is_err() {
            break;
        }
    }
}
