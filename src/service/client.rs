//! Bus client: dial a peer, or run supervised with reconnection.

#[cfg(unix)]
use std::path::Path;
#[cfg(unix)]
use std::time::Duration;
#[cfg(unix)]
use rand_core::{OsRng, RngCore};
#[cfg(unix)]
use tracing::{info, instrument, warn};

#[cfg(unix)]
use crate::config::{ClientConfig, ConnectionOptions};
#[cfg(unix)]
use crate::error::{BusError, Result};
#[cfg(unix)]
use crate::protocol::connection::Connection;
#[cfg(unix)]
use crate::transport::local;

/// Dial the bus at `path` and return a live connection.
///
/// The dispatch loop runs in a background task; `on_connected` is invoked
/// once so the application can bind its objects.
#[cfg(unix)]
#[instrument(skip(path, options, on_connected), fields(socket_path = %path.as_ref().display()))]
pub async fn connect<P, F>(path: P, options: ConnectionOptions, on_connected: F) -> Result<Connection>
where
    P: AsRef<Path>,
    F: Fn(&Connection) + Send + Sync + 'static,
{
    let stream = local::dial(&path).await?;
    let conn = Connection::new(stream, options);

    let background = conn.clone();
    tokio::spawn(async move {
        if let Err(e) = background.run().await {
            warn!(connection = background.id(), error = %e, "connection loop failed");
        }
        background.close();
    });

    on_connected(&conn);
    Ok(conn)
}

/// Run a supervised client: dial, serve the connection to completion, and
/// reconnect with capped, jittered exponential backoff.
///
/// `on_connected` is re-invoked on every successful reconnect. Returns when
/// `auto_reconnect` is off and the connection ends, or with an error once
/// `max_reconnect_attempts` consecutive attempts failed (0 retries forever).
#[cfg(unix)]
#[instrument(skip(path, config, options, on_connected), fields(socket_path = %path.as_ref().display()))]
pub async fn run_supervised<P, F>(
    path: P,
    config: ClientConfig,
    options: ConnectionOptions,
    on_connected: F,
) -> Result<()>
where
    P: AsRef<Path>,
    F: Fn(&Connection) + Send + Sync,
{
    let mut failures = 0u32;
    let mut delay = config.reconnect_delay;

    loop {
        match local::dial_timeout(&path, config.connect_timeout).await {
            Ok(stream) => {
                failures = 0;
                delay = config.reconnect_delay;

                let conn = Connection::new(stream, options.clone());
                info!(connection = conn.id(), "connected");
                on_connected(&conn);

                match conn.run().await {
                    Ok(()) => info!(connection = conn.id(), "disconnected"),
                    Err(e) => warn!(connection = conn.id(), error = %e, "connection failed"),
                }
                conn.close();
            }
            Err(e) => {
                failures += 1;
                warn!(error = %e, failures, "connect attempt failed");
                if config.max_reconnect_attempts > 0 && failures >= config.max_reconnect_attempts {
                    return Err(BusError::ConnectionClosed);
                }
            }
        }

        if !config.auto_reconnect {
            return Ok(());
        }

        let backoff = jittered(delay);
        info!(delay_ms = backoff.as_millis() as u64, "reconnecting after backoff");
        tokio::time::sleep(backoff).await;
        delay = (delay * 2).min(config.reconnect_delay_max);
    }
}

/// Randomize a backoff delay to 0.5x..1.5x of its nominal value.
#[cfg(unix)]
fn jittered(delay: Duration) -> Duration {
    let mut buf = [0u8; 8];
    OsRng.fill_bytes(&mut buf);
    let roll = u64::from_le_bytes(buf) % 1000;

    let millis = delay.as_millis() as u64;
    Duration::from_millis((millis / 2 + millis * roll / 1000).max(1))
}
