use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpSocket};
use tokio::signal::unix::SignalKind;

use crate::config::Config;
use crate::state::State;
use crate::web::app::App;

/// Pending connections allowed on the listen socket.
const TCP_LISTEN_BACKLOG: u32 = 1024;

/// Binds `config.http_addr`, connects to the primary store and the accelerator, and serves
/// requests until a termination signal arrives.
///
/// On shutdown, in-flight auto-heal polls are cancelled so their requests can finish.
pub async fn server(config: Config) -> Result<()> {
    tracing::info!(addr = %config.http_addr, "starting boltbench");

    let listener = listen(&config).context("failed to start TCP listener")?;
    let state = State::new(config).await?;
    let shutdown = state.shutdown.clone();

    let server_handle = tokio::spawn(async move {
        App::new(state)
            .graceful_shutdown(true)
            .serve(listener)
            .await
    });

    tokio::spawn(async move {
        elegant_departure::get_shutdown_guard().wait().await;
        tracing::info!("Shutting down, cancelling auto-heal polls");
        shutdown.cancel();
    });

    elegant_departure::tokio::depart()
        .on_termination()
        .on_sigint()
        .on_signal(SignalKind::hangup())
        .on_signal(SignalKind::quit())
        .await;

    let server_result = server_handle.await.map_err(From::from).flatten();
    tracing::info!("Shutdown complete");
    server_result
}

fn listen(config: &Config) -> Result<TcpListener> {
    let addr = config.http_addr;
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4(),
        SocketAddr::V6(_) => TcpSocket::new_v6(),
    }?;

    #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
    socket.set_reuseport(true)?;
    socket.bind(addr)?;

    let listener = socket.listen(TCP_LISTEN_BACKLOG)?;
    tracing::info!("HTTP server listening on {addr}");

    Ok(listener)
}
