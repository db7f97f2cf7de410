use comms::{
    GolSender,
    msg::{Command, Msg, Payload},
    specs::RunSpec,
};
use futures::future;
use gol::Grid;
use log::{debug, info, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};

use crate::{
    error::{BrokerErr, Result},
    partition,
    state::RunState,
    workers::WorkerHandle,
};

/// A controller message, parsed off the connection by the session's reader
/// task.
#[derive(Debug)]
pub enum Event {
    /// `StartRun` announcing a new run's parameters.
    Start(RunSpec),
    /// The seed grid following `StartRun`.
    Seed { cells: Vec<u8> },
    /// Any other control command.
    Key(Command),
    /// An application level error from the peer.
    Remote(String),
}

/// Outcome of one run.
#[derive(Debug)]
pub enum Outcome {
    /// All turns completed.
    Finished(RunState),
    /// The run was killed by `Terminate`; the workers are gone.
    Killed,
}

enum Flow {
    Continue,
    Kill,
}

enum StepEnd {
    Done(Vec<Grid>),
    Kill,
}

/// The run orchestrator over a fixed set of worker connections.
pub struct Broker<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    workers: Vec<WorkerHandle<R, W>>,
}

impl<R, W> Broker<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a broker over an established worker pool.
    pub fn new(workers: Vec<WorkerHandle<R, W>>) -> Self {
        Self { workers }
    }

    /// Drives one run to completion.
    ///
    /// The loop exclusively owns the `RunState`. Control calls arrive as
    /// events and are answered between generations, while paused, or while
    /// a generation's fan-in is in flight (against the last committed
    /// state); `Terminate` aborts an in-flight generation without waiting
    /// for it.
    ///
    /// # Arguments
    /// * `spec` - The run configuration.
    /// * `seed` - The initial grid.
    /// * `events` - Control events from the controller connection.
    /// * `ctrl_tx` - Sending end of the controller connection, for replies.
    ///
    /// # Errors
    /// Worker failures and a vanished controller abort the run; the
    /// `RunState` is discarded.
    pub async fn run<Wc>(
        &mut self,
        spec: RunSpec,
        seed: Grid,
        events: &mut mpsc::Receiver<Event>,
        ctrl_tx: &mut GolSender<Wc>,
    ) -> Result<Outcome>
    where
        Wc: AsyncWrite + Unpin,
    {
        let mut state = RunState::new(spec, seed);
        info!(
            "run started: {}x{}, {} turns over {} workers",
            spec.width,
            spec.height,
            spec.turns,
            self.workers.len()
        );

        while state.turn < spec.turns {
            // Control window. Parks on the channel while paused instead of
            // spinning.
            loop {
                let event = if state.paused {
                    Some(events.recv().await.ok_or(BrokerErr::ControllerGone)?)
                } else {
                    match events.try_recv() {
                        Ok(event) => Some(event),
                        Err(mpsc::error::TryRecvError::Empty) => None,
                        Err(mpsc::error::TryRecvError::Disconnected) => {
                            return Err(BrokerErr::ControllerGone);
                        }
                    }
                };

                let Some(event) = event else { break };
                let flow = answer(
                    event,
                    &mut state.paused,
                    state.turn,
                    state.alive,
                    &state.grid,
                    ctrl_tx,
                )
                .await?;

                if let Flow::Kill = flow {
                    self.shutdown().await;
                    return Ok(Outcome::Killed);
                }
            }

            // One generation: fan out every band, then a blocking join. No
            // partial commits; either every band lands or the turn does not
            // advance.
            let ranges = partition::band_ranges(spec.height, self.workers.len());
            let end = {
                let bands: Vec<Grid> = ranges
                    .iter()
                    .map(|&(start, end)| partition::band_with_halo(&state.grid, start, end))
                    .collect();

                let step = future::try_join_all(
                    self.workers
                        .iter_mut()
                        .zip(ranges.iter().zip(&bands))
                        .map(|(worker, (&(start, end), band))| {
                            worker.process(spec, start, end, band)
                        }),
                );
                tokio::pin!(step);

                loop {
                    tokio::select! {
                        rows = &mut step => break StepEnd::Done(rows?),
                        event = events.recv() => {
                            let event = event.ok_or(BrokerErr::ControllerGone)?;
                            let flow = answer(
                                event,
                                &mut state.paused,
                                state.turn,
                                state.alive,
                                &state.grid,
                                ctrl_tx,
                            )
                            .await?;

                            if let Flow::Kill = flow {
                                break StepEnd::Kill;
                            }
                        }
                    }
                }
            };

            match end {
                StepEnd::Kill => {
                    self.shutdown().await;
                    return Ok(Outcome::Killed);
                }
                StepEnd::Done(rows) => {
                    let starts = ranges.iter().map(|&(start, _)| start);
                    state.commit(starts.zip(rows).collect());
                    debug!(turn = state.turn; "generation committed");
                }
            }
        }

        info!("run finished at turn {}", state.turn);
        Ok(Outcome::Finished(state))
    }

    /// Broadcasts `Terminate` to every worker.
    pub async fn shutdown(&mut self) {
        info!("terminating {} workers", self.workers.len());
        future::join_all(self.workers.iter_mut().map(|worker| worker.terminate())).await;
    }
}

/// Answers one control event against the last committed state.
async fn answer<W>(
    event: Event,
    paused: &mut bool,
    turn: usize,
    alive: usize,
    grid: &Grid,
    tx: &mut GolSender<W>,
) -> Result<Flow>
where
    W: AsyncWrite + Unpin,
{
    match event {
        Event::Key(Command::ToggleKey { pause }) => {
            *paused = pause;
            debug!("pause flag set to {pause}");
            tx.send(&Msg::Control(Command::Turn { turn: turn as u32 }))
                .await?;
            Ok(Flow::Continue)
        }
        Event::Key(Command::Snapshot) => {
            // SAFETY: The committed grid is an owned standard layout array.
            let cells = grid.as_slice().unwrap();
            tx.send(&Msg::Data(Payload::Grid {
                turn: turn as u32,
                cells,
            }))
            .await?;
            Ok(Flow::Continue)
        }
        Event::Key(Command::AliveCount) => {
            tx.send(&Msg::Control(Command::Count {
                turn: turn as u32,
                alive: alive as u32,
            }))
            .await?;
            Ok(Flow::Continue)
        }
        Event::Key(Command::Terminate) => Ok(Flow::Kill),
        Event::Key(cmd) => {
            warn!("ignoring unexpected command {cmd:?}");
            Ok(Flow::Continue)
        }
        Event::Start(_) | Event::Seed { .. } => {
            warn!("ignoring a start request while a run is active");
            Ok(Flow::Continue)
        }
        Event::Remote(detail) => {
            warn!("controller reported: {detail}");
            Ok(Flow::Continue)
        }
    }
}
