use std::{env, io};

use log::{info, warn};
use tokio::{
    net::{TcpListener, TcpStream},
    signal,
};

use broker::{Broker, Session, WorkerHandle, serve_conn};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8030";
const DEFAULT_WORKERS: &str = "127.0.0.1:8040,127.0.0.1:8050,127.0.0.1:8060,127.0.0.1:8070";

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let addr = format!(
        "{}:{}",
        env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
        env::var("PORT").unwrap_or_else(|_| DEFAULT_PORT.to_string()),
    );
    let pool = env::var("WORKERS").unwrap_or_else(|_| DEFAULT_WORKERS.to_string());

    let mut workers = Vec::new();
    for (id, worker_addr) in pool.split(',').map(str::trim).enumerate() {
        let stream = TcpStream::connect(worker_addr).await?;
        info!(worker = id; "connected to {worker_addr}");

        let (rx, tx) = stream.into_split();
        let (rx, tx) = comms::channel(rx, tx);
        workers.push(WorkerHandle::new(id, rx, tx));
    }

    let mut broker = Broker::new(workers);

    let list = TcpListener::bind(&addr).await?;
    info!("listening at {addr}");

    loop {
        tokio::select! {
            conn = list.accept() => {
                let (stream, peer) = conn?;
                info!("controller connected from {peer}");

                let (rx, tx) = stream.into_split();
                let (rx, mut tx) = comms::channel(rx, tx);

                match serve_conn(&mut broker, rx, &mut tx).await {
                    Ok(Session::Killed) => break,
                    Ok(Session::Closed) => info!("controller disconnected"),
                    Err(e) => warn!("session failed: {e}"),
                }
            }
            _ = signal::ctrl_c() => {
                info!("received SIGTERM");
                break;
            }
        }
    }

    Ok(())
}
