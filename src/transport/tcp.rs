//! TCP listener for plain LDAP and LDAP over TLS.

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::error::Result;
use crate::service::LdapServer;
use crate::transport::{drain_connections, ActiveConnections};
use crate::utils::metrics::global_metrics;

/// Listen on the server's configured address until Ctrl-C
pub async fn start_server(server: LdapServer) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received CTRL+C signal, shutting down");
            let _ = shutdown_tx.send(()).await;
        }
    });

    start_server_with_shutdown(server, shutdown_rx).await
}

/// Listen on the server's configured address until `shutdown_rx` fires
#[instrument(skip_all, fields(address = %server.server_config().address))]
pub async fn start_server_with_shutdown(
    server: LdapServer,
    shutdown_rx: mpsc::Receiver<()>,
) -> Result<()> {
    let listener = TcpListener::bind(&server.server_config().address).await?;
    info!(address = %listener.local_addr()?, "Listening for LDAP connections");
    serve_listener(server, listener, shutdown_rx).await
}

/// Accept loop over an already-bound listener
pub async fn serve_listener(
    server: LdapServer,
    listener: TcpListener,
    mut shutdown_rx: mpsc::Receiver<()>,
) -> Result<()> {
    let config = server.server_config().clone();
    let active = ActiveConnections::default();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                server.shutdown();
                drain_connections(&active, config.shutdown_timeout).await;
                return Ok(());
            }

            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        global_metrics().connection_error();
                        error!(error = %e, "Error accepting connection");
                        continue;
                    }
                };

                let Some(slot) = active.try_acquire(config.max_connections) else {
                    warn!(peer = %addr, max = config.max_connections, "Connection limit reached, rejecting");
                    continue;
                };

                if config.tcp_nodelay {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(error = %e, "Failed to set TCP_NODELAY");
                    }
                }

                let server = server.clone();
                tokio::spawn(async move {
                    if let Err(e) = server.serve_stream(stream, addr.to_string()).await {
                        global_metrics().connection_error();
                        debug!(peer = %addr, error = %e, "Connection ended with error");
                    }
                    drop(slot);
                });
            }
        }
    }
}
