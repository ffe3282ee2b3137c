//! # LDAP Protocol Model
//!
//! Everything between raw BER elements and application handlers.
//!
//! ## Components
//! - **Result**: RFC 4511 result codes and the operation-level error
//! - **Message**: envelope, request bodies and response encoders
//! - **DN**: distinguished names, RDNs and pattern queries
//! - **Filter**: search filters with three-valued evaluation
//! - **Matching**: per-attribute comparison rules
//! - **Router**: DN prefix trie with wildcard capture

pub mod dn;
pub mod filter;
pub mod matching;
pub mod message;
pub mod result;
pub mod router;

#[cfg(test)]
mod tests;
