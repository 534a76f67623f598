//! Bus server: accept loop over a local socket.
//!
//! For each accepted peer the server constructs a server-originated
//! [`Connection`], invokes the application callback so it can bind
//! objects, then drives the dispatch loop until the peer goes away.

#[cfg(unix)]
use std::path::Path;
#[cfg(unix)]
use std::sync::Arc;
#[cfg(unix)]
use std::time::Duration;
#[cfg(unix)]
use tokio::sync::{mpsc, Mutex};
#[cfg(unix)]
use tracing::{debug, error, info, instrument, warn};

#[cfg(unix)]
use crate::config::ConnectionOptions;
#[cfg(unix)]
use crate::error::Result;
#[cfg(unix)]
use crate::protocol::connection::Connection;
#[cfg(unix)]
use crate::transport::local;
#[cfg(unix)]
use crate::utils::timeout::SHUTDOWN_TIMEOUT;

/// Serve the bus at `path` until interrupted.
///
/// Installs a CTRL+C handler that triggers the graceful shutdown path of
/// [`serve_with_shutdown`].
#[cfg(unix)]
#[instrument(skip(path, options, on_connected), fields(socket_path = %path.as_ref().display()))]
pub async fn serve<P, F>(path: P, options: ConnectionOptions, on_connected: F) -> Result<()>
where
    P: AsRef<Path>,
    F: Fn(&Connection) + Send + Sync + 'static,
{
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("received CTRL+C, shutting down");
            let _ = shutdown_tx_clone.send(()).await;
        }
    });

    serve_with_shutdown(path, options, on_connected, shutdown_rx).await
}

/// Serve the bus at `path` with an external shutdown channel.
///
/// On shutdown, waits up to the shutdown timeout for active connections to
/// drain, then removes the socket file.
#[cfg(unix)]
#[instrument(skip(path, options, on_connected, shutdown_rx), fields(socket_path = %path.as_ref().display()))]
pub async fn serve_with_shutdown<P, F>(
    path: P,
    options: ConnectionOptions,
    on_connected: F,
    mut shutdown_rx: mpsc::Receiver<()>,
) -> Result<()>
where
    P: AsRef<Path>,
    F: Fn(&Connection) + Send + Sync + 'static,
{
    let listener = local::bind(&path).await?;
    let path_string = path.as_ref().to_string_lossy().to_string();

    let active_connections = Arc::new(Mutex::new(0u32));

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("shutting down, waiting for connections to close");

                let deadline = tokio::time::sleep(SHUTDOWN_TIMEOUT);
                tokio::pin!(deadline);

                loop {
                    tokio::select! {
                        _ = &mut deadline => {
                            warn!("shutdown timeout reached, forcing exit");
                            break;
                        }
                        _ = tokio::time::sleep(Duration::from_millis(100)) => {
                            let connections = *active_connections.lock().await;
                            if connections == 0 {
                                info!("all connections closed");
                                break;
                            }
                            debug!(connections, "waiting for connections to close");
                        }
                    }
                }

                local::cleanup(&path_string).await;
                return Ok(());
            }

            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, _)) => {
                        let conn = Connection::new(stream, options.clone());
                        debug!(connection = conn.id(), "peer connected");
                        on_connected(&conn);

                        let active_connections = active_connections.clone();
                        {
                            let mut count = active_connections.lock().await;
                            *count += 1;
                        }

                        tokio::spawn(async move {
                            if let Err(e) = conn.run().await {
                                warn!(connection = conn.id(), error = %e, "connection failed");
                            }
                            conn.close();

                            let mut count = active_connections.lock().await;
                            *count -= 1;
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "error accepting connection");
                    }
                }
            }
        }
    }
}
