//! # Core Protocol Components
//!
//! Low-level element handling and framing for the LDAP wire format.
//!
//! This module provides the foundation for the protocol: the BER
//! tag-length-value model and a Tokio codec that cuts a byte stream into
//! complete top-level elements.
//!
//! ## Components
//! - **BER**: Element model, header parsing, minimal definite-length encoding
//! - **Codec**: Tokio codec for framing LDAP messages over byte streams
//!
//! ## Wire Format
//! ```text
//! [Tag(1..6)] [Length(1..9)] [Content(N)]
//! ```
//!
//! ## Security
//! - Maximum message size: 16MB by default (prevents memory exhaustion)
//! - Indefinite lengths are rejected
//! - Length validation before allocation
//! - Nesting depth is bounded while decoding

pub mod ber;
pub mod codec;
