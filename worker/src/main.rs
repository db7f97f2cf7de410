use std::{env, io, sync::Arc};

use log::{info, warn};
use parking_lot::RwLock;
use tokio::{net::TcpListener, signal, sync::watch};

use worker::{Served, WorkerState, serve};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8040";

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let addr = format!(
        "{}:{}",
        env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
        env::var("PORT").unwrap_or_else(|_| DEFAULT_PORT.to_string()),
    );

    let list = TcpListener::bind(&addr).await?;
    info!("listening at {addr}");

    let state = Arc::new(RwLock::new(WorkerState::new()));
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    loop {
        tokio::select! {
            conn = list.accept() => {
                let (stream, peer) = conn?;
                info!("broker connected from {peer}");

                let (rx, tx) = stream.into_split();
                let (rx, tx) = comms::channel(rx, tx);
                let state = Arc::clone(&state);
                let shutdown = shutdown_tx.clone();

                tokio::spawn(async move {
                    match serve(state, rx, tx).await {
                        Ok(Served::Terminated) => {
                            let _ = shutdown.send(true);
                        }
                        Ok(Served::Disconnected) => {}
                        Err(e) => warn!("connection failed: {e}"),
                    }
                });
            }
            _ = shutdown_rx.changed() => {
                info!("terminated by broker");
                break;
            }
            _ = signal::ctrl_c() => {
                info!("received SIGTERM");
                break;
            }
        }
    }

    Ok(())
}
