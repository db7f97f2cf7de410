use std::{borrow::Cow, io};

use crate::{
    Deserialize, Serialize,
    protocol::{self, Kind},
    specs::{Cell, RunSpec},
};

/// The command for the `Control` variant of the `Msg` enum.
///
/// Requests and replies share the enum; which variants a peer may send
/// depends on its role.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Announces a run; the seed grid follows as a `Grid` payload.
    StartRun(RunSpec),
    /// Sets or clears the pause flag of the active run.
    ToggleKey { pause: bool },
    /// Asks for a copy of the current grid.
    Snapshot,
    /// Asks for the cached live-cell count.
    AliveCount,
    /// Stops the receiving process; propagated to every worker.
    Terminate,
    /// Reply carrying the current turn.
    Turn { turn: u32 },
    /// Reply to `AliveCount`.
    Count { turn: u32, alive: u32 },
}

/// The payload data for the `Data` variant of the `Msg` enum.
#[derive(Debug)]
pub enum Payload<'a> {
    /// A row band framed by one halo row on each side, bound for a worker.
    Band {
        spec: RunSpec,
        start: u32,
        end: u32,
        cells: &'a [u8],
    },
    /// The computed owned rows of a band, halo stripped.
    BandDone {
        start: u32,
        end: u32,
        cells: &'a [u8],
    },
    /// A full grid at a given turn: a run seed or a snapshot reply.
    Grid { turn: u32, cells: &'a [u8] },
    /// Terminal reply of a run.
    Final {
        turn: u32,
        done: bool,
        alive: Cow<'a, [Cell]>,
        cells: &'a [u8],
    },
}

/// The application layer message for the entire system.
#[derive(Debug)]
pub enum Msg<'a> {
    Control(Command),
    Data(Payload<'a>),
    Err(Cow<'a, str>),
}

impl Msg<'_> {
    fn truncated<T>(what: &'static str) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("message truncated reading {what}"),
        ))
    }

    fn invalid_kind<T>(kind: Kind) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("received an invalid kind {kind}"),
        ))
    }
}

fn push_kind(buf: &mut Vec<u8>, kind: Kind) {
    buf.extend_from_slice(&kind.to_be_bytes());
}

fn push_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

fn push_spec(buf: &mut Vec<u8>, spec: &RunSpec) {
    push_u32(buf, spec.width as u32);
    push_u32(buf, spec.height as u32);
    push_u32(buf, spec.turns as u32);
    push_u32(buf, spec.threads as u32);
}

fn take_u32(buf: &[u8]) -> io::Result<(u32, &[u8])> {
    if buf.len() < size_of::<u32>() {
        return Msg::truncated("a field");
    }

    let (head, rest) = buf.split_at(size_of::<u32>());

    // SAFETY: `head` is exactly four bytes long.
    Ok((u32::from_be_bytes(head.try_into().unwrap()), rest))
}

fn take_spec(buf: &[u8]) -> io::Result<(RunSpec, &[u8])> {
    let (width, rest) = take_u32(buf)?;
    let (height, rest) = take_u32(rest)?;
    let (turns, rest) = take_u32(rest)?;
    let (threads, rest) = take_u32(rest)?;

    let spec = RunSpec {
        width: width as usize,
        height: height as usize,
        turns: turns as usize,
        threads: threads as usize,
    };

    Ok((spec, rest))
}

impl<'a> Serialize<'a> for Msg<'a> {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]> {
        match self {
            Msg::Err(e) => {
                push_kind(buf, protocol::ERR);
                Some(e.as_bytes())
            }
            Msg::Control(cmd) => {
                push_kind(buf, protocol::CONTROL);

                // SAFETY: `Command` is a plain derive with no maps inside,
                //         and writing to a `Vec` cannot fail.
                serde_json::to_writer(buf, cmd).unwrap();
                None
            }
            Msg::Data(Payload::Band {
                spec,
                start,
                end,
                cells,
            }) => {
                push_kind(buf, protocol::BAND);
                push_spec(buf, spec);
                push_u32(buf, *start);
                push_u32(buf, *end);
                Some(*cells)
            }
            Msg::Data(Payload::BandDone { start, end, cells }) => {
                push_kind(buf, protocol::BAND_DONE);
                push_u32(buf, *start);
                push_u32(buf, *end);
                Some(*cells)
            }
            Msg::Data(Payload::Grid { turn, cells }) => {
                push_kind(buf, protocol::GRID);
                push_u32(buf, *turn);
                Some(*cells)
            }
            Msg::Data(Payload::Final {
                turn,
                done,
                alive,
                cells,
            }) => {
                push_kind(buf, protocol::FINAL);
                push_u32(buf, *turn);
                buf.push(*done as u8);
                push_u32(buf, alive.len() as u32);
                buf.extend_from_slice(bytemuck::cast_slice::<Cell, u8>(alive.as_ref()));
                Some(*cells)
            }
        }
    }
}

impl<'a> Deserialize<'a> for Msg<'a> {
    fn deserialize(buf: &'a [u8]) -> io::Result<Self> {
        if buf.len() < protocol::KIND_SIZE {
            return Self::truncated("the kind");
        }

        let (kind_buf, rest) = buf.split_at(protocol::KIND_SIZE);

        // SAFETY: `kind_buf` is exactly `KIND_SIZE` bytes long.
        let kind = Kind::from_be_bytes(kind_buf.try_into().unwrap());

        match kind {
            protocol::ERR => {
                let detail = str::from_utf8(rest)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

                Ok(Self::Err(Cow::Borrowed(detail)))
            }
            protocol::CONTROL => {
                let cmd = serde_json::from_slice(rest)?;
                Ok(Self::Control(cmd))
            }
            protocol::BAND => {
                let (spec, rest) = take_spec(rest)?;
                let (start, rest) = take_u32(rest)?;
                let (end, cells) = take_u32(rest)?;

                Ok(Self::Data(Payload::Band {
                    spec,
                    start,
                    end,
                    cells,
                }))
            }
            protocol::BAND_DONE => {
                let (start, rest) = take_u32(rest)?;
                let (end, cells) = take_u32(rest)?;

                Ok(Self::Data(Payload::BandDone { start, end, cells }))
            }
            protocol::GRID => {
                let (turn, cells) = take_u32(rest)?;
                Ok(Self::Data(Payload::Grid { turn, cells }))
            }
            protocol::FINAL => {
                let (turn, rest) = take_u32(rest)?;
                let Some((&done, rest)) = rest.split_first() else {
                    return Self::truncated("the completion flag");
                };
                let (count, rest) = take_u32(rest)?;

                let alive_len = count as usize * size_of::<Cell>();
                if rest.len() < alive_len {
                    return Self::truncated("the live cell list");
                }

                let (alive, cells) = rest.split_at(alive_len);
                let alive = Cow::Owned(bytemuck::pod_collect_to_vec(alive));

                Ok(Self::Data(Payload::Final {
                    turn,
                    done: done != 0,
                    alive,
                    cells,
                }))
            }
            kind => Self::invalid_kind(kind),
        }
    }
}
