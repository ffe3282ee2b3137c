//! Unix domain socket listener (ldapi).

use std::path::Path;

use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::error::Result;
use crate::service::LdapServer;
use crate::transport::{drain_connections, ActiveConnections};
use crate::utils::metrics::global_metrics;

/// Listen on `path` until Ctrl-C
#[instrument(skip_all, fields(socket_path = %path.as_ref().display()))]
pub async fn start_server<P: AsRef<Path>>(server: LdapServer, path: P) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received CTRL+C signal, shutting down");
            let _ = shutdown_tx.send(()).await;
        }
    });

    start_server_with_shutdown(server, path, shutdown_rx).await
}

/// Listen on `path` until `shutdown_rx` fires, removing the socket file afterwards
#[instrument(skip_all, fields(socket_path = %path.as_ref().display()))]
pub async fn start_server_with_shutdown<P: AsRef<Path>>(
    server: LdapServer,
    path: P,
    mut shutdown_rx: mpsc::Receiver<()>,
) -> Result<()> {
    let path = path.as_ref().to_path_buf();
    if path.exists() {
        tokio::fs::remove_file(&path).await.ok();
    }

    let listener = UnixListener::bind(&path)?;
    info!(path = %path.display(), "Listening on unix socket");

    let config = server.server_config().clone();
    let active = ActiveConnections::default();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                server.shutdown();
                drain_connections(&active, config.shutdown_timeout).await;

                if path.exists() {
                    if let Err(e) = tokio::fs::remove_file(&path).await {
                        error!(error = %e, path = %path.display(), "Failed to remove socket file");
                    } else {
                        info!(path = %path.display(), "Removed socket file");
                    }
                }
                return Ok(());
            }

            accepted = listener.accept() => {
                let stream = match accepted {
                    Ok((stream, _)) => stream,
                    Err(e) => {
                        global_metrics().connection_error();
                        error!(error = %e, "Error accepting connection");
                        continue;
                    }
                };

                let Some(slot) = active.try_acquire(config.max_connections) else {
                    warn!(max = config.max_connections, "Connection limit reached, rejecting");
                    continue;
                };

                let server = server.clone();
                let peer = format!("unix:{}", path.display());
                tokio::spawn(async move {
                    if let Err(e) = server.serve_stream(stream, peer).await {
                        global_metrics().connection_error();
                        debug!(error = %e, "Connection ended with error");
                    }
                    drop(slot);
                });
            }
        }
    }
}
