//! Echo demo built on `framelink`.
//!
//! `framelink listen` echoes every packet back over the stream it arrived
//! on; `framelink send` dials a listener and prints the echoes.

mod cli;

use std::{net::SocketAddr, process::ExitCode, sync::Arc};

use bytes::Bytes;
use clap::Parser;
use cli::{Cli, Command};
use framelink::{Acceptor, Connection, ConnectionBuilder, ConnectionConfig, TransportKind};
use tokio::sync::{Notify, mpsc};
use tracing::{error, info};

fn main() -> ExitCode {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to start runtime");
            return ExitCode::FAILURE;
        }
    };
    let result = runtime.block_on(async {
        match cli.command {
            Command::Listen { addr } => listen(addr).await,
            Command::Send {
                addr,
                message,
                count,
            } => send(addr, message, count).await,
        }
    });
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "framelink failed");
            ExitCode::FAILURE
        }
    }
}

fn background() -> ConnectionConfig { ConnectionConfig::default().background_processing(true) }

async fn listen(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    // One sender task keeps each connection's echoes in arrival order.
    let (echo_tx, mut echo_rx) = mpsc::unbounded_channel::<(Connection, Bytes)>();
    tokio::spawn(async move {
        while let Some((conn, packet)) = echo_rx.recv().await {
            conn.send(&packet, TransportKind::Stream).await;
        }
    });
    let builder = ConnectionBuilder::new()
        .config(background())
        .on_packet(move |packet: &Bytes, conn: &Connection| {
            let _ = echo_tx.send((conn.clone(), packet.clone()));
        })
        .on_connection_error(|e, conn| {
            info!(peer_addr = ?conn.peer_addr(), error = %e, "closing connection");
            conn.close();
        });
    let acceptor = Acceptor::bind(addr, builder).await?;
    acceptor.run().await;
    Ok(())
}

async fn send(addr: SocketAddr, message: String, count: usize) -> Result<(), Box<dyn std::error::Error>> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let failed = Arc::new(Notify::new());
    let on_error = Arc::clone(&failed);
    let conn = ConnectionBuilder::new()
        .config(background())
        .on_packet(move |packet: &Bytes, _| {
            let _ = tx.send(packet.clone());
        })
        .on_connect_error(|e, _| {
            error!(error = %e, "connect failed");
        })
        .on_connection_error(move |e, _| {
            error!(error = %e, "connection failed");
            on_error.notify_one();
        })
        .dial(addr);

    conn.connect().await;
    if !conn.is_connected() {
        return Err(format!("could not connect to {addr}").into());
    }
    let packet = Bytes::from(message.into_bytes());
    for _ in 0..count {
        conn.send(&packet, TransportKind::Stream).await;
    }
    for _ in 0..count {
        tokio::select! {
            echoed = rx.recv() => {
                let Some(echoed) = echoed else { break };
                println!("{}", String::from_utf8_lossy(&echoed));
            }
            () = failed.notified() => break,
        }
    }
    conn.close();
    Ok(())
}
