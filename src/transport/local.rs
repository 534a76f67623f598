//! Local IPC endpoint over unix domain sockets.
//!
//! Binding removes a stale socket file left by a previous run before
//! listening. Dialing is wrapped in the default connect timeout.

#[cfg(unix)]
use std::path::Path;
#[cfg(unix)]
use std::time::Duration;
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};
#[cfg(unix)]
use tracing::{info, instrument};

#[cfg(unix)]
use crate::error::{BusError, Result};
#[cfg(unix)]
use crate::utils::timeout;

/// Bind a unix domain socket listener at `path`.
#[cfg(unix)]
#[instrument(skip(path), fields(socket_path = %path.as_ref().display()))]
pub async fn bind<P: AsRef<Path>>(path: P) -> Result<UnixListener> {
    if path.as_ref().exists() {
        tokio::fs::remove_file(&path).await.ok();
    }

    let listener = UnixListener::bind(&path)?;
    info!("listening on unix socket");
    Ok(listener)
}

/// Dial the unix domain socket at `path` with the default connect timeout.
#[cfg(unix)]
#[instrument(skip(path), fields(socket_path = %path.as_ref().display()))]
pub async fn dial<P: AsRef<Path>>(path: P) -> Result<UnixStream> {
    dial_timeout(path, timeout::DEFAULT_TIMEOUT).await
}

/// Dial with an explicit connect timeout.
#[cfg(unix)]
pub async fn dial_timeout<P: AsRef<Path>>(path: P, limit: Duration) -> Result<UnixStream> {
    timeout::with_timeout(limit, async {
        UnixStream::connect(path).await.map_err(BusError::Io)
    })
    .await
}

/// Remove the socket file at `path`, ignoring a missing file.
#[cfg(unix)]
pub async fn cleanup<P: AsRef<Path>>(path: P) {
    if path.as_ref().exists() {
        tokio::fs::remove_file(&path).await.ok();
    }
}
