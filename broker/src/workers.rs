use comms::{
    GolReceiver, GolSender,
    msg::{Command, Msg, Payload},
    specs::RunSpec,
};
use gol::Grid;
use log::warn;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{BrokerErr, Result};

/// One registered worker service connection.
pub struct WorkerHandle<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    id: usize,
    rx: GolReceiver<R>,
    tx: GolSender<W>,
    rx_buf: Vec<u8>,
}

impl<R, W> WorkerHandle<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a handle over an established worker connection.
    ///
    /// # Arguments
    /// * `id` - Index of the worker, used in failure reports.
    /// * `rx` - Receiving end of the connection.
    /// * `tx` - Sending end of the connection.
    pub fn new(id: usize, rx: GolReceiver<R>, tx: GolSender<W>) -> Self {
        Self {
            id,
            rx,
            tx,
            rx_buf: vec![0; 1028],
        }
    }

    /// Ships one band and waits for the computed rows.
    ///
    /// # Errors
    /// `BrokerErr::WorkerCall` on transport failures, `BrokerErr::Remote`
    /// when the worker rejects the band, `BrokerErr::BandMismatch` when the
    /// reply disagrees with the requested range.
    pub async fn process(
        &mut self,
        spec: RunSpec,
        start: usize,
        end: usize,
        band: &Grid,
    ) -> Result<Grid> {
        let id = self.id;

        // SAFETY: Bands are assembled as owned standard layout arrays.
        let cells = band.as_slice().unwrap();
        let msg = Msg::Data(Payload::Band {
            spec,
            start: start as u32,
            end: end as u32,
            cells,
        });

        self.tx
            .send(&msg)
            .await
            .map_err(|source| BrokerErr::WorkerCall { worker: id, source })?;

        let reply: Msg = self
            .rx
            .recv_into(&mut self.rx_buf)
            .await
            .map_err(|source| BrokerErr::WorkerCall { worker: id, source })?;

        match reply {
            Msg::Data(Payload::BandDone { cells, .. }) => {
                let rows = end - start;
                let expected = rows * spec.width;
                if cells.len() != expected {
                    return Err(BrokerErr::BandMismatch {
                        worker: id,
                        got: cells.len(),
                        expected,
                    });
                }

                let grid = Grid::from_shape_vec((rows, spec.width), cells.to_vec()).map_err(
                    |_| BrokerErr::BandMismatch {
                        worker: id,
                        got: cells.len(),
                        expected,
                    },
                )?;
                Ok(grid)
            }
            Msg::Err(detail) => Err(BrokerErr::Remote {
                worker: id,
                detail: detail.into_owned(),
            }),
            other => Err(BrokerErr::Remote {
                worker: id,
                detail: format!("unexpected reply {other:?}"),
            }),
        }
    }

    /// Sends `Terminate`; delivery is best effort.
    pub async fn terminate(&mut self) {
        let id = self.id;
        if let Err(e) = self.tx.send(&Msg::Control(Command::Terminate)).await {
            warn!(worker = id; "terminate delivery failed: {e}");
        }
    }
}
