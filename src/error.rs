//! # Error Types
//!
//! Transport- and codec-level error handling for the LDAP engine.
//!
//! This module defines the errors that can end a connection, from low-level
//! I/O failures to violations of the BER envelope. Errors that belong to a
//! single operation (and are reported back to the client as a result code)
//! live in [`crate::protocol::result`] instead.
//!
//! ## Error Categories
//! - **I/O Errors**: Network and file system failures
//! - **Protocol Errors**: Malformed BER, unknown operation tags, oversized messages
//! - **TLS Errors**: Certificate loading and handshake failures
//! - **Configuration Errors**: Invalid or unreadable configuration
//!
//! All errors implement `std::error::Error` for interoperability.
//!
//! ## Example Usage
//! ```rust
//! use ldap_protocol::core::ber::Element;
//! use ldap_protocol::error::{ProtocolError, Result};
//! use tracing::{error, info};
//!
//! fn decode(bytes: &[u8]) -> Result<Element> {
//!     Element::decode(bytes)
//! }
//!
//! match decode(&[0x30, 0x03, 0x02, 0x01, 0x05]) {
//!     Ok(element) => info!(?element, "Decoded element"),
//!     Err(ProtocolError::Malformed(reason)) => error!(%reason, "Bad BER"),
//!     Err(e) => error!(error = %e, "Decode failed"),
//! }
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// BER validation errors
    pub const ERR_INDEFINITE_LENGTH: &str = "Indefinite length encoding not supported";
    pub const ERR_LENGTH_TOO_LONG: &str = "Length field exceeds 8 bytes";
    pub const ERR_TAG_TOO_LONG: &str = "Tag number does not fit in 32 bits";
    pub const ERR_TRUNCATED: &str = "Element content is truncated";
    pub const ERR_TRAILING_BYTES: &str = "Trailing bytes after element";
    pub const ERR_TOO_DEEP: &str = "Element nesting too deep";
    pub const ERR_EMPTY_INTEGER: &str = "INTEGER has no content octets";
    pub const ERR_INTEGER_TOO_LONG: &str = "INTEGER does not fit in 64 bits";

    /// Envelope errors
    pub const ERR_NOT_SEQUENCE: &str = "LDAPMessage must be SEQUENCE";
    pub const ERR_BAD_MESSAGE_ID: &str = "Bad Message ID";
    pub const ERR_BAD_PROTOCOL_OP: &str = "Bad protocolOp";
    pub const ERR_BAD_TAG_CLASS: &str = "Bad protocolOp tag class";
    pub const ERR_BAD_AUTH_CHOICE: &str = "BindRequest bad AuthenticationChoice";

    /// Connection errors
    pub const ERR_WRITER_GONE: &str = "Connection writer is no longer available";

    /// TLS errors
    pub const ERR_TLS_NOT_CONFIGURED: &str = "TLS is not configured on this server";
    pub const ERR_TLS_ACTIVE: &str = "TLS is already active on this connection";
    pub const ERR_TLS_OUTSTANDING: &str = "Cannot start TLS with outstanding operations";
    pub const ERR_TLS_BUFFERED: &str = "Unexpected data received before TLS handshake";
}

/// ProtocolError is the primary error type for transport and codec failures
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Message too large: {0} bytes")]
    OversizedMessage(usize),

    #[error("Unrecognised protocolOp tag {0}")]
    UnsupportedOperation(u32),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("TLS error: {0}")]
    TlsError(String),
}

impl ProtocolError {
    /// Shorthand for a malformed-message error built from a static reason
    pub fn malformed(reason: impl Into<String>) -> Self {
        ProtocolError::Malformed(reason.into())
    }

    /// True when the peer simply went away, as opposed to sending garbage
    pub fn is_disconnect(&self) -> bool {
        match self {
            ProtocolError::ConnectionClosed => true,
            ProtocolError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
