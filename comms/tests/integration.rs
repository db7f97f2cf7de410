use std::borrow::Cow;

use tokio::io;

use comms::msg::{Command, Msg, Payload};
use comms::specs::{Cell, RunSpec};

fn spec() -> RunSpec {
    RunSpec {
        width: 16,
        height: 16,
        turns: 4,
        threads: 2,
    }
}

#[tokio::test]
async fn send_recv_control() {
    const SIZE: usize = 256;

    let (one, two) = io::duplex(SIZE);
    let (rx, tx) = io::split(one);
    let (_, mut tx) = comms::channel(rx, tx);

    tx.send(&Msg::Control(Command::StartRun(spec())))
        .await
        .unwrap();
    tx.send(&Msg::Control(Command::ToggleKey { pause: true }))
        .await
        .unwrap();

    let (rx, tx) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx);

    let mut buf = Vec::new();
    let msg: Msg = rx.recv_into(&mut buf).await.unwrap();
    assert!(matches!(msg, Msg::Control(Command::StartRun(s)) if s == spec()));

    let msg: Msg = rx.recv_into(&mut buf).await.unwrap();
    assert!(matches!(msg, Msg::Control(Command::ToggleKey { pause: true })));
}

#[tokio::test]
async fn band_carries_cells_unchanged() {
    let (one, two) = io::duplex(4096);
    let (rx, tx) = io::split(one);
    let (_, mut tx) = comms::channel(rx, tx);

    let cells: Vec<u8> = (0..6 * 16).map(|i| if i % 3 == 0 { 255 } else { 0 }).collect();
    let msg = Msg::Data(Payload::Band {
        spec: spec(),
        start: 4,
        end: 8,
        cells: &cells,
    });
    tx.send(&msg).await.unwrap();

    let (rx, tx) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx);

    let mut buf = Vec::new();
    match rx.recv_into(&mut buf).await.unwrap() {
        Msg::Data(Payload::Band {
            spec: got_spec,
            start,
            end,
            cells: got,
        }) => {
            assert_eq!(got_spec, spec());
            assert_eq!((start, end), (4, 8));
            assert_eq!(got, &cells[..]);
        }
        other => panic!("unexpected msg: {other:?}"),
    }
}

#[tokio::test]
async fn final_carries_alive_list() {
    let (one, two) = io::duplex(4096);
    let (rx, tx) = io::split(one);
    let (_, mut tx) = comms::channel(rx, tx);

    let alive = vec![Cell { x: 1, y: 0 }, Cell { x: 15, y: 15 }];
    let cells = vec![0u8; 16 * 16];
    let msg = Msg::Data(Payload::Final {
        turn: 4,
        done: true,
        alive: Cow::Borrowed(&alive),
        cells: &cells,
    });
    tx.send(&msg).await.unwrap();

    let (rx, tx) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx);

    let mut buf = Vec::new();
    match rx.recv_into(&mut buf).await.unwrap() {
        Msg::Data(Payload::Final {
            turn,
            done,
            alive: got_alive,
            cells: got_cells,
        }) => {
            assert_eq!(turn, 4);
            assert!(done);
            assert_eq!(got_alive.as_ref(), &alive[..]);
            assert_eq!(got_cells, &cells[..]);
        }
        other => panic!("unexpected msg: {other:?}"),
    }
}

#[tokio::test]
async fn err_detail_survives() {
    let (one, two) = io::duplex(256);
    let (rx, tx) = io::split(one);
    let (_, mut tx) = comms::channel(rx, tx);

    tx.send(&Msg::Err(Cow::Borrowed("band shape mismatch")))
        .await
        .unwrap();

    let (rx, tx) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx);

    let mut buf = Vec::new();
    match rx.recv_into(&mut buf).await.unwrap() {
        Msg::Err(detail) => assert_eq!(detail, "band shape mismatch"),
        other => panic!("unexpected msg: {other:?}"),
    }
}
