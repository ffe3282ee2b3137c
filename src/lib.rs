//! # LDAP Protocol
//!
//! An asynchronous LDAPv3 protocol engine built on Tokio.
//!
//! The crate decodes BER-encoded LDAP messages, routes each request by
//! operation kind and DN to an application [`Handler`](service::handler::Handler),
//! evaluates search filters against attribute records and encodes the
//! responses. Storage is left to the application.
//!
//! ## Layers
//! - [`core`]: BER element model and the stream codec
//! - [`protocol`]: messages, DNs, filters, matching rules and the router
//! - [`service`]: the server, connection engine and handler interface
//! - [`transport`]: TCP, TLS and Unix socket listeners
//! - [`config`]: TOML and environment configuration
//! - [`utils`]: logging, metrics and timeouts
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use ldap_protocol::config::LdapConfig;
//! use ldap_protocol::protocol::dn::Dn;
//! use ldap_protocol::protocol::result::{LdapError, LdapResult};
//! use ldap_protocol::protocol::router::{OperationKind, Router};
//! use ldap_protocol::service::handler::{Handler, RequestContext};
//! use ldap_protocol::service::LdapServer;
//!
//! struct Admin;
//!
//! #[async_trait]
//! impl Handler for Admin {
//!     async fn bind(&self, _ctx: &RequestContext, _version: i32, _dn: &Dn, password: &[u8]) -> LdapResult<()> {
//!         if password == b"secret" {
//!             Ok(())
//!         } else {
//!             Err(LdapError::invalid_credentials("Invalid credentials"))
//!         }
//!     }
//! }
//!
//! # async fn run() -> ldap_protocol::error::Result<()> {
//! let mut router = Router::new();
//! router.route(OperationKind::Bind, "uid=admin,dc=example,dc=com", Arc::new(Admin))?;
//! LdapServer::new(LdapConfig::default(), router)?.run().await
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use error::{ProtocolError, Result};
pub use protocol::result::{LdapError, LdapResult, ResultCode};
pub use service::LdapServer;
