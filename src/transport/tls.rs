//! # TLS Transport Layer
//!
//! Server-side TLS for LDAP: certificate loading and the acceptor used both
//! for TLS-on-connect listeners (ldaps) and for in-band StartTLS upgrades.
//!
//! ## Responsibilities
//! - Load the certificate chain and PKCS#8 key from PEM files
//! - Optionally require client certificates signed by a configured CA
//! - Hand out a [`TlsAcceptor`] shared by every connection

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use rustls::server::AllowAnyAuthenticatedClient;
use rustls::{Certificate, PrivateKey, RootCertStore, ServerConfig};
use rustls_pemfile::{certs, pkcs8_private_keys};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info};

use crate::config::{TlsConfig, TlsMode};
use crate::error::{ProtocolError, Result};

/// TLS server configuration
#[derive(Debug, Clone)]
pub struct TlsServerConfig {
    cert_path: String,
    key_path: String,
    /// Optional path to client CA certificates for mTLS
    client_ca_path: Option<String>,
}

impl TlsServerConfig {
    /// Create a new TLS server configuration
    pub fn new<P: AsRef<std::path::Path>>(cert_path: P, key_path: P) -> Self {
        Self {
            cert_path: cert_path.as_ref().to_string_lossy().to_string(),
            key_path: key_path.as_ref().to_string_lossy().to_string(),
            client_ca_path: None,
        }
    }

    /// Require client certificates signed by the CA bundle at `client_ca_path`
    pub fn with_client_auth<S: Into<String>>(mut self, client_ca_path: S) -> Self {
        self.client_ca_path = Some(client_ca_path.into());
        self
    }

    /// Build from the `[tls]` configuration section; `None` when TLS is disabled
    pub fn from_config(config: &TlsConfig) -> Result<Option<Self>> {
        if config.mode == TlsMode::Disabled {
            return Ok(None);
        }
        let (cert, key) = match (&config.cert_path, &config.key_path) {
            (Some(cert), Some(key)) => (cert, key),
            _ => {
                return Err(ProtocolError::ConfigError(
                    "cert_path and key_path are required when TLS is enabled".into(),
                ))
            }
        };
        let mut tls = Self::new(cert, key);
        if let Some(ca) = &config.client_ca_path {
            tls = tls.with_client_auth(ca.clone());
        }
        Ok(Some(tls))
    }

    /// Load the TLS configuration from files
    pub fn load_server_config(&self) -> Result<ServerConfig> {
        let cert_chain = load_certs(&self.cert_path, "certificate")?;

        let key_file = File::open(&self.key_path)
            .map_err(|e| ProtocolError::TlsError(format!("Failed to open key file: {e}")))?;
        let mut key_reader = BufReader::new(key_file);
        let mut keys = pkcs8_private_keys(&mut key_reader)
            .map_err(|_| ProtocolError::TlsError("Failed to parse private key".into()))?;
        if keys.is_empty() {
            return Err(ProtocolError::TlsError("No private keys found".into()));
        }
        let private_key = PrivateKey(keys.swap_remove(0));

        // with_safe_defaults restricts to TLS 1.2+ and modern suites
        let builder = ServerConfig::builder().with_safe_defaults();
        let config = match &self.client_ca_path {
            Some(client_ca_path) => {
                let mut client_root_store = RootCertStore::empty();
                for cert in &load_certs(client_ca_path, "client CA certificate")? {
                    client_root_store.add(cert).map_err(|e| {
                        ProtocolError::TlsError(format!("Failed to add client CA cert: {e}"))
                    })?;
                }
                let client_auth = Arc::new(AllowAnyAuthenticatedClient::new(client_root_store));
                debug!("mTLS enabled with client certificate verification required");
                builder
                    .with_client_cert_verifier(client_auth)
                    .with_single_cert(cert_chain, private_key)
            }
            None => builder
                .with_no_client_auth()
                .with_single_cert(cert_chain, private_key),
        }
        .map_err(|e| ProtocolError::TlsError(format!("TLS error: {e}")))?;

        Ok(config)
    }

    /// Acceptor shared by every connection
    pub fn acceptor(&self) -> Result<TlsAcceptor> {
        let config = self.load_server_config()?;
        info!(cert = %self.cert_path, mtls = self.client_ca_path.is_some(), "TLS acceptor ready");
        Ok(TlsAcceptor::from(Arc::new(config)))
    }
}

fn load_certs(path: &str, what: &str) -> Result<Vec<Certificate>> {
    let file = File::open(path)
        .map_err(|e| ProtocolError::TlsError(format!("Failed to open {what} file: {e}")))?;
    let mut reader = BufReader::new(file);
    let certs = certs(&mut reader)
        .map_err(|_| ProtocolError::TlsError(format!("Failed to parse {what}")))?;
    if certs.is_empty() {
        return Err(ProtocolError::TlsError(format!("No {what} found in {path}")));
    }
    Ok(certs.into_iter().map(Certificate).collect())
}
