//! # Service Layer
//!
//! The LDAP server engine: handler interface, per-connection read loop,
//! per-request operation tasks and the root information entry.
//!
//! ## Components
//! - **Handler**: application callbacks plus the search result sink
//! - **Connection**: frame dispatch, Bind/Unbind/Abandon, extended operations
//! - **Operation**: Search, Modify, Add, Delete, ModifyDN and Compare tasks
//! - **Root DSE**: the zero-length DN entry
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use ldap_protocol::config::LdapConfig;
//! use ldap_protocol::protocol::router::{OperationKind, Router};
//! use ldap_protocol::service::{handler::DefaultHandler, LdapServer};
//!
//! # async fn run() -> ldap_protocol::error::Result<()> {
//! let mut router = Router::new();
//! router.route(OperationKind::Search, "dc=example,dc=com", Arc::new(DefaultHandler))?;
//! let server = LdapServer::new(LdapConfig::default(), router)?;
//! server.run().await
//! # }
//! ```

pub mod connection;
pub mod handler;
pub mod operation;
pub mod root_dse;

#[cfg(unix)]
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{validation_result, LdapConfig, LimitsConfig, ServerConfig, TlsMode};
use crate::error::{ProtocolError, Result};
use crate::protocol::filter::Attributes;
use crate::protocol::matching::MatchingRules;
use crate::protocol::message::Control;
use crate::protocol::result::{LdapError, LdapResult};
use crate::protocol::router::Router;
use crate::transport::tls::TlsServerConfig;
use crate::utils::metrics::global_metrics;
use crate::utils::timeout::with_timeout_error;

use connection::{AsyncStream, BoxedStream, Connection};

/// Read-only state shared by every connection of a server
pub struct ServerContext {
    pub(crate) router: Router,
    pub(crate) rules: MatchingRules,
    pub(crate) limits: LimitsConfig,
    pub(crate) root_dse: Attributes,
    pub(crate) supported_controls: Vec<String>,
    pub(crate) tls_acceptor: Option<TlsAcceptor>,
    pub(crate) tls_mode: TlsMode,
    pub(crate) handshake_timeout: Duration,
    pub(crate) max_message_size: usize,
}

impl ServerContext {
    /// Refuse critical controls no handler understands
    pub(crate) fn check_controls(&self, controls: &[Control]) -> LdapResult<()> {
        match controls
            .iter()
            .find(|c| c.critical && !self.supported_controls.contains(&c.oid))
        {
            Some(control) => Err(LdapError::unavailable_critical_extension(&control.oid)),
            None => Ok(()),
        }
    }

    /// Attributes of the root information entry
    pub fn root_dse(&self) -> &Attributes {
        &self.root_dse
    }
}

/// An LDAP server: configuration, routes and the shutdown signal
#[derive(Clone)]
pub struct LdapServer {
    context: Arc<ServerContext>,
    config: ServerConfig,
    shutdown: CancellationToken,
}

impl LdapServer {
    /// Build a server with the built-in matching rules
    pub fn new(config: LdapConfig, router: Router) -> Result<Self> {
        Self::with_matching_rules(config, router, MatchingRules::new())
    }

    /// Build a server whose search filters use `rules`.
    ///
    /// Fails if the configuration does not validate.
    pub fn with_matching_rules(config: LdapConfig, router: Router, rules: MatchingRules) -> Result<Self> {
        config.validate_strict()?;
        let acceptor = match TlsServerConfig::from_config(&config.tls)? {
            Some(tls) => Some(tls.acceptor()?),
            None => None,
        };
        Self::with_tls_acceptor(config, router, rules, acceptor)
    }

    /// Build a server around an acceptor constructed by the caller.
    ///
    /// The `[tls]` file paths are not checked; every other section must validate.
    pub fn with_tls_acceptor(
        config: LdapConfig,
        router: Router,
        rules: MatchingRules,
        acceptor: Option<TlsAcceptor>,
    ) -> Result<Self> {
        validation_result(config.validate_without_tls())?;
        let tls_mode = if acceptor.is_some() {
            match config.tls.mode {
                TlsMode::Disabled => TlsMode::StartTls,
                mode => mode,
            }
        } else {
            TlsMode::Disabled
        };
        let context = ServerContext {
            router,
            rules,
            root_dse: root_dse::root_dse(&config.root, tls_mode == TlsMode::StartTls),
            supported_controls: config.root.supported_controls.clone(),
            limits: config.limits.clone(),
            tls_acceptor: acceptor,
            tls_mode,
            handshake_timeout: config.tls.handshake_timeout,
            max_message_size: config.server.max_message_size,
        };
        Ok(Self {
            context: Arc::new(context),
            config: config.server,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.context
    }

    pub fn server_config(&self) -> &ServerConfig {
        &self.config
    }

    /// Token cancelled when the server shuts down
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Ask every connection to send a notice of disconnection and close
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Serve one already-accepted stream.
    ///
    /// Runs the TLS handshake first when the server is in TLS-on-connect mode.
    pub async fn serve_stream<S: AsyncStream>(&self, stream: S, peer: impl Into<String>) -> Result<()> {
        let peer = peer.into();
        let ctx = Arc::clone(&self.context);

        let (stream, tls_active): (BoxedStream, bool) = match (&ctx.tls_mode, &ctx.tls_acceptor) {
            (TlsMode::OnConnect, Some(acceptor)) => {
                let accepted = with_timeout_error(
                    async { acceptor.accept(stream).await.map_err(ProtocolError::from) },
                    ctx.handshake_timeout,
                )
                .await;
                match accepted {
                    Ok(tls) => {
                        global_metrics().tls_handshake(true);
                        (Box::new(tls) as BoxedStream, true)
                    }
                    Err(e) => {
                        global_metrics().tls_handshake(false);
                        warn!(peer = %peer, error = %e, "TLS handshake failed");
                        return Err(e);
                    }
                }
            }
            _ => (Box::new(stream) as BoxedStream, false),
        };

        debug!(peer = %peer, tls_active, "Serving connection");
        Connection::serve(ctx, stream, peer, tls_active, self.shutdown.child_token()).await
    }

    /// Listen on the configured TCP address until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        crate::transport::tcp::start_server(self.clone()).await
    }

    /// Listen on the configured TCP address until `shutdown_rx` fires
    pub async fn run_with_shutdown(&self, shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        crate::transport::tcp::start_server_with_shutdown(self.clone(), shutdown_rx).await
    }

    /// Listen on a Unix domain socket until `shutdown_rx` fires
    #[cfg(unix)]
    pub async fn run_local<P: AsRef<Path>>(&self, path: P, shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        crate::transport::local::start_server_with_shutdown(self.clone(), path, shutdown_rx).await
    }
}
