use std::{io, sync::Arc};

use parking_lot::RwLock;
use tokio::io as tokio_io;
use tokio::task::JoinHandle;

use broker::{Broker, Session, WorkerHandle, serve_conn};
use comms::msg::{Command, Msg, Payload};
use comms::specs::RunSpec;
use gol::Grid;
use worker::{Served, WorkerState};

type DuplexRx = tokio_io::ReadHalf<tokio_io::DuplexStream>;
type DuplexTx = tokio_io::WriteHalf<tokio_io::DuplexStream>;
type Channel = (comms::GolReceiver<DuplexRx>, comms::GolSender<DuplexTx>);

fn channel_pair() -> (Channel, Channel) {
    let (one, two) = tokio_io::duplex(1 << 16);
    let (rx1, tx1) = tokio_io::split(one);
    let (rx2, tx2) = tokio_io::split(two);
    (comms::channel(rx1, tx1), comms::channel(rx2, tx2))
}

/// Spawns `n` in-process workers and returns a broker wired to them.
fn cluster(
    n: usize,
) -> (
    Broker<DuplexRx, DuplexTx>,
    Vec<JoinHandle<worker::Result<Served>>>,
) {
    let mut handles = Vec::new();
    let mut tasks = Vec::new();

    for id in 0..n {
        let ((bk_rx, bk_tx), (wk_rx, wk_tx)) = channel_pair();
        let state = Arc::new(RwLock::new(WorkerState::new()));
        tasks.push(tokio::spawn(worker::serve(state, wk_rx, wk_tx)));
        handles.push(WorkerHandle::new(id, bk_rx, bk_tx));
    }

    (Broker::new(handles), tasks)
}

fn glider_16() -> Grid {
    let mut grid = Grid::from_elem((16, 16), gol::DEAD);
    for (y, x) in [(0, 1), (1, 2), (2, 0), (2, 1), (2, 2)] {
        grid[[y, x]] = gol::ALIVE;
    }
    grid
}

fn scattered(height: usize, width: usize) -> Grid {
    // Deterministic mix of still lifes, oscillators and debris.
    Grid::from_shape_fn((height, width), |(y, x)| {
        if (y * 31 + x * 17) % 5 == 0 {
            gol::ALIVE
        } else {
            gol::DEAD
        }
    })
}

fn translate(grid: &Grid, dy: usize, dx: usize) -> Grid {
    let (height, width) = grid.dim();
    let mut out = Grid::from_elem((height, width), gol::DEAD);
    for ((y, x), &cell) in grid.indexed_iter() {
        out[[(y + dy) % height, (x + dx) % width]] = cell;
    }
    out
}

fn reference(seed: &Grid, turns: usize) -> Grid {
    let mut world = seed.clone();
    for _ in 0..turns {
        world = gol::next_rows(world.view(), 0, world.nrows());
    }
    world
}

async fn start_run(
    tx: &mut comms::GolSender<DuplexTx>,
    spec: RunSpec,
    seed: &Grid,
) -> io::Result<()> {
    tx.send(&Msg::Control(Command::StartRun(spec))).await?;
    tx.send(&Msg::Data(Payload::Grid {
        turn: 0,
        cells: seed.as_slice().unwrap(),
    }))
    .await
}

/// Runs `spec` over a fresh cluster of `n` workers and returns the final
/// grid, turn and alive-cell count.
async fn run_cluster(n: usize, spec: RunSpec, seed: &Grid) -> io::Result<(Grid, u32, usize)> {
    let (mut broker, _workers) = cluster(n);
    let ((mut ctl_rx, mut ctl_tx), (srv_rx, mut srv_tx)) = channel_pair();

    let session = serve_conn(&mut broker, srv_rx, &mut srv_tx);
    let controller = async move {
        start_run(&mut ctl_tx, spec, seed).await?;

        let mut buf = Vec::new();
        let out = match ctl_rx.recv_into(&mut buf).await? {
            Msg::Data(Payload::Final {
                turn,
                done,
                alive,
                cells,
            }) => {
                assert!(done);
                let grid = Grid::from_shape_vec((spec.height, spec.width), cells.to_vec())
                    .expect("final grid shape");
                (grid, turn, alive.len())
            }
            other => panic!("unexpected msg: {other:?}"),
        };

        drop(ctl_tx);
        Ok::<_, io::Error>(out)
    };

    let (session, out) = tokio::join!(session, controller);
    assert_eq!(session?, Session::Closed);
    out
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn glider_e2e_single_worker() -> io::Result<()> {
    let spec = RunSpec {
        width: 16,
        height: 16,
        turns: 4,
        threads: 1,
    };
    let seed = glider_16();

    let (grid, turn, alive) = run_cluster(1, spec, &seed).await?;

    assert_eq!(turn, 4);
    assert_eq!(alive, 5);
    assert_eq!(grid, translate(&seed, 1, 1));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn partition_count_does_not_change_the_result() -> io::Result<()> {
    // 18 rows over 4 workers leaves a remainder band; 16 divides evenly.
    for height in [16, 18] {
        let spec = RunSpec {
            width: 8,
            height,
            turns: 5,
            threads: 2,
        };
        let seed = scattered(height, 8);
        let expected = reference(&seed, spec.turns);

        for workers in [1, 2, 4] {
            let (grid, turn, _) = run_cluster(workers, spec, &seed).await?;
            assert_eq!(turn, 5);
            assert_eq!(
                grid, expected,
                "diverged with {workers} workers at height {height}"
            );
        }
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn turns_zero_returns_the_seed() -> io::Result<()> {
    let spec = RunSpec {
        width: 8,
        height: 8,
        turns: 0,
        threads: 1,
    };
    let seed = scattered(8, 8);

    let (grid, turn, alive) = run_cluster(1, spec, &seed).await?;

    assert_eq!(turn, 0);
    assert_eq!(grid, seed);
    assert_eq!(alive, gol::alive_count(seed.view()));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pause_is_a_toggle_not_a_counter() -> io::Result<()> {
    let spec = RunSpec {
        width: 8,
        height: 8,
        turns: 2_000,
        threads: 1,
    };
    let seed = scattered(8, 8);

    let (mut broker, _workers) = cluster(2);
    let ((mut ctl_rx, mut ctl_tx), (srv_rx, mut srv_tx)) = channel_pair();

    let session = serve_conn(&mut broker, srv_rx, &mut srv_tx);
    let controller = async move {
        start_run(&mut ctl_tx, spec, &seed).await?;

        // Pause twice, resume once: the loop must end up running.
        for pause in [true, true, false] {
            ctl_tx
                .send(&Msg::Control(Command::ToggleKey { pause }))
                .await?;
        }

        let mut buf = Vec::new();
        for _ in 0..3 {
            match ctl_rx.recv_into(&mut buf).await? {
                Msg::Control(Command::Turn { .. }) => {}
                other => panic!("unexpected msg: {other:?}"),
            }
        }

        match ctl_rx.recv_into(&mut buf).await? {
            Msg::Data(Payload::Final { turn, done, .. }) => {
                assert!(done);
                assert_eq!(turn, 2_000);
            }
            other => panic!("unexpected msg: {other:?}"),
        }

        drop(ctl_tx);
        Ok::<_, io::Error>(())
    };

    let (session, out) = tokio::join!(session, controller);
    assert_eq!(session?, Session::Closed);
    out
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn snapshot_and_count_are_stable_while_paused() -> io::Result<()> {
    let spec = RunSpec {
        width: 8,
        height: 8,
        turns: 2_000,
        threads: 1,
    };
    let seed = scattered(8, 8);

    let (mut broker, _workers) = cluster(1);
    let ((mut ctl_rx, mut ctl_tx), (srv_rx, mut srv_tx)) = channel_pair();

    let session = serve_conn(&mut broker, srv_rx, &mut srv_tx);
    let controller = async move {
        start_run(&mut ctl_tx, spec, &seed).await?;

        ctl_tx
            .send(&Msg::Control(Command::ToggleKey { pause: true }))
            .await?;

        let mut buf = Vec::new();
        let paused_at = match ctl_rx.recv_into(&mut buf).await? {
            Msg::Control(Command::Turn { turn }) => turn,
            other => panic!("unexpected msg: {other:?}"),
        };

        // The generation that was in flight when the pause landed may still
        // commit; after that the snapshot must not change. At most one
        // extra round is ever needed.
        let mut snapshots = Vec::new();
        loop {
            ctl_tx.send(&Msg::Control(Command::Snapshot)).await?;
            match ctl_rx.recv_into(&mut buf).await? {
                Msg::Data(Payload::Grid { turn, cells }) => {
                    snapshots.push((turn, cells.to_vec()));
                }
                other => panic!("unexpected msg: {other:?}"),
            }

            let n = snapshots.len();
            if n >= 2 && snapshots[n - 1] == snapshots[n - 2] {
                break;
            }
            assert!(n <= 2, "snapshot kept changing while paused");
        }
        assert!(snapshots[0].0 >= paused_at);
        let stable = snapshots.last().unwrap().clone();

        // The alive count is cached; asking twice recomputes nothing and no
        // generation can slip in while paused.
        let mut counts = Vec::new();
        for _ in 0..2 {
            ctl_tx.send(&Msg::Control(Command::AliveCount)).await?;
            match ctl_rx.recv_into(&mut buf).await? {
                Msg::Control(Command::Count { turn, alive }) => counts.push((turn, alive)),
                other => panic!("unexpected msg: {other:?}"),
            }
        }
        assert_eq!(counts[0], counts[1]);
        assert_eq!(counts[0].0, stable.0);

        let snapshot_grid =
            Grid::from_shape_vec((spec.height, spec.width), stable.1.clone()).unwrap();
        assert_eq!(gol::alive_count(snapshot_grid.view()), counts[0].1 as usize);

        ctl_tx
            .send(&Msg::Control(Command::ToggleKey { pause: false }))
            .await?;
        match ctl_rx.recv_into(&mut buf).await? {
            Msg::Control(Command::Turn { .. }) => {}
            other => panic!("unexpected msg: {other:?}"),
        }

        match ctl_rx.recv_into(&mut buf).await? {
            Msg::Data(Payload::Final { turn, .. }) => assert_eq!(turn, 2_000),
            other => panic!("unexpected msg: {other:?}"),
        }

        drop(ctl_tx);
        Ok::<_, io::Error>(())
    };

    let (session, out) = tokio::join!(session, controller);
    assert_eq!(session?, Session::Closed);
    out
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn terminate_kills_the_run_and_the_workers() -> io::Result<()> {
    let spec = RunSpec {
        width: 8,
        height: 8,
        turns: 1_000_000,
        threads: 1,
    };
    let seed = scattered(8, 8);

    let (mut broker, workers) = cluster(2);
    let ((mut ctl_rx, mut ctl_tx), (srv_rx, mut srv_tx)) = channel_pair();

    let session = serve_conn(&mut broker, srv_rx, &mut srv_tx);
    let controller = async move {
        start_run(&mut ctl_tx, spec, &seed).await?;

        // Freeze the run, note the committed turn twice, then kill.
        ctl_tx
            .send(&Msg::Control(Command::ToggleKey { pause: true }))
            .await?;

        let mut buf = Vec::new();
        match ctl_rx.recv_into(&mut buf).await? {
            Msg::Control(Command::Turn { .. }) => {}
            other => panic!("unexpected msg: {other:?}"),
        }

        // Let the in-flight generation land, then check the turn is frozen.
        let mut turns = Vec::new();
        loop {
            ctl_tx.send(&Msg::Control(Command::AliveCount)).await?;
            match ctl_rx.recv_into(&mut buf).await? {
                Msg::Control(Command::Count { turn, .. }) => turns.push(turn),
                other => panic!("unexpected msg: {other:?}"),
            }

            let n = turns.len();
            if n >= 2 && turns[n - 1] == turns[n - 2] {
                break;
            }
            assert!(n <= 2, "turn kept advancing while paused");
        }

        ctl_tx.send(&Msg::Control(Command::Terminate)).await?;
        Ok::<_, io::Error>(())
    };

    let (session, out) = tokio::join!(session, controller);
    out?;
    assert_eq!(session?, Session::Killed);

    // Every worker observed the terminate broadcast.
    for task in workers {
        assert_eq!(task.await.unwrap()?, Served::Terminated);
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn a_connection_serves_successive_runs() -> io::Result<()> {
    let spec = RunSpec {
        width: 16,
        height: 16,
        turns: 4,
        threads: 1,
    };
    let seed = glider_16();

    let (mut broker, _workers) = cluster(2);
    let ((mut ctl_rx, mut ctl_tx), (srv_rx, mut srv_tx)) = channel_pair();

    let session = serve_conn(&mut broker, srv_rx, &mut srv_tx);
    let controller = async move {
        let mut buf = Vec::new();

        for round in 1..=2 {
            let input = translate(&seed, round - 1, round - 1);
            start_run(&mut ctl_tx, spec, &input).await?;

            match ctl_rx.recv_into(&mut buf).await? {
                Msg::Data(Payload::Final { turn, cells, .. }) => {
                    assert_eq!(turn, 4);
                    let grid =
                        Grid::from_shape_vec((spec.height, spec.width), cells.to_vec()).unwrap();
                    assert_eq!(grid, translate(&seed, round, round));
                }
                other => panic!("unexpected msg: {other:?}"),
            }
        }

        drop(ctl_tx);
        Ok::<_, io::Error>(())
    };

    let (session, out) = tokio::join!(session, controller);
    assert_eq!(session?, Session::Closed);
    out
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn a_dead_worker_fails_the_run_cleanly() -> io::Result<()> {
    let spec = RunSpec {
        width: 8,
        height: 8,
        turns: 10,
        threads: 1,
    };
    let seed = scattered(8, 8);

    // A worker that hangs up on the first band instead of answering.
    let ((bk_rx, bk_tx), (wk_rx, wk_tx)) = channel_pair();
    tokio::spawn(async move {
        let mut rx = wk_rx;
        let mut buf = Vec::new();
        let _ = rx.recv_into::<Msg>(&mut buf).await;
        drop((rx, wk_tx));
    });

    let mut broker = Broker::new(vec![WorkerHandle::new(0, bk_rx, bk_tx)]);
    let ((mut ctl_rx, mut ctl_tx), (srv_rx, mut srv_tx)) = channel_pair();

    let session = serve_conn(&mut broker, srv_rx, &mut srv_tx);
    let controller = async move {
        start_run(&mut ctl_tx, spec, &seed).await?;

        let mut buf = Vec::new();
        match ctl_rx.recv_into(&mut buf).await? {
            Msg::Err(detail) => assert!(detail.contains("worker 0"), "got: {detail}"),
            other => panic!("unexpected msg: {other:?}"),
        }

        drop(ctl_tx);
        Ok::<_, io::Error>(())
    };

    let (session, out) = tokio::join!(session, controller);
    assert_eq!(session?, Session::Closed);
    out
}
