//! # Handler Interface
//!
//! Applications implement [`Handler`] to back the directory. The connection
//! engine resolves one handler per request through the
//! [`Router`](crate::protocol::router::Router) and invokes it with a
//! [`RequestContext`]. Search results are streamed through a [`SearchSink`],
//! which enforces the size limit, attribute selection and cancellation.
//!
//! Every method has a default: anonymous LDAPv3 binds succeed, and all other
//! operations answer `unwillingToPerform`.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::protocol::dn::Dn;
use crate::protocol::filter::{Attributes, Filter};
use crate::protocol::message::{
    search_entry, search_reference, AddRequest, CompareRequest, Control, ModifyDnRequest,
    ModifyRequest, SearchRequest,
};
use crate::protocol::result::{LdapError, LdapResult, ResultCode};
use crate::service::connection::FrameWriter;
use crate::utils::metrics::global_metrics;

/// Attribute selector meaning "no attributes"
pub const NO_ATTRIBUTES: &str = "1.1";

/// Attribute selector meaning "all user attributes"
pub const ALL_ATTRIBUTES: &str = "*";

/// What a handler knows about the request it is serving
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub message_id: i32,
    /// DN established by the last successful bind; `None` when anonymous
    pub bound_dn: Option<Dn>,
    pub version: i32,
    /// Values captured by `:name` route components
    pub params: HashMap<String, String>,
    /// Route pattern that selected the handler
    pub pattern: Dn,
    pub controls: Vec<Control>,
    pub peer: String,
    cancel: CancellationToken,
}

impl RequestContext {
    pub(crate) fn new(message_id: i32, peer: String, cancel: CancellationToken) -> Self {
        Self {
            message_id,
            bound_dn: None,
            version: crate::config::LDAP_VERSION,
            params: HashMap::new(),
            pattern: Dn::root(),
            controls: Vec::new(),
            peer,
            cancel,
        }
    }

    /// Captured route parameter
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// True once the request was abandoned or the connection is closing
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the request is cancelled
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn is_anonymous(&self) -> bool {
        self.bound_dn.is_none()
    }
}

/// Directory backend callbacks
#[async_trait]
pub trait Handler: Send + Sync {
    /// Simple bind. `dn` is the root DN for anonymous binds.
    async fn bind(
        &self,
        _ctx: &RequestContext,
        version: i32,
        dn: &Dn,
        _password: &[u8],
    ) -> LdapResult<()> {
        if version != crate::config::LDAP_VERSION {
            return Err(LdapError::protocol_error("This server only supports LDAP version 3"));
        }
        if !dn.is_empty() {
            return Err(LdapError::new(
                ResultCode::InappropriateAuthentication,
                "This server only supports anonymous bind",
            ));
        }
        Ok(())
    }

    /// Emit matching entries through `sink`
    async fn search(
        &self,
        _ctx: &RequestContext,
        _request: &SearchRequest,
        _sink: &mut SearchSink,
    ) -> LdapResult<()> {
        Err(LdapError::unwilling_to_perform("search not implemented"))
    }

    async fn add(&self, _ctx: &RequestContext, _request: &AddRequest) -> LdapResult<()> {
        Err(LdapError::unwilling_to_perform("add not implemented"))
    }

    async fn delete(&self, _ctx: &RequestContext, _dn: &Dn) -> LdapResult<()> {
        Err(LdapError::unwilling_to_perform("delete not implemented"))
    }

    async fn modify(&self, _ctx: &RequestContext, _request: &ModifyRequest) -> LdapResult<()> {
        Err(LdapError::unwilling_to_perform("modify not implemented"))
    }

    /// ModifyDN
    async fn rename(&self, _ctx: &RequestContext, _request: &ModifyDnRequest) -> LdapResult<()> {
        Err(LdapError::unwilling_to_perform("modifydn not implemented"))
    }

    /// Returns whether the entry holds the asserted value
    async fn compare(&self, _ctx: &RequestContext, _request: &CompareRequest) -> LdapResult<bool> {
        Err(LdapError::unwilling_to_perform("compare not implemented"))
    }
}

/// Handler used when no route matches a request
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHandler;

impl Handler for DefaultHandler {}

/// Streams SearchResultEntry and SearchResultReference frames for one search.
pub struct SearchSink {
    writer: FrameWriter,
    message_id: i32,
    size_limit: Option<usize>,
    sent: usize,
    exceeded: bool,
    cancel: CancellationToken,
    attributes: Vec<String>,
    types_only: bool,
    filter: Filter,
}

impl SearchSink {
    pub(crate) fn new(
        writer: FrameWriter,
        message_id: i32,
        size_limit: Option<usize>,
        cancel: CancellationToken,
        request: &SearchRequest,
    ) -> Self {
        Self {
            writer,
            message_id,
            size_limit,
            sent: 0,
            exceeded: false,
            cancel,
            attributes: request.attributes.clone(),
            types_only: request.types_only,
            filter: request.filter.clone(),
        }
    }

    /// The request's filter
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Entries delivered so far
    pub fn sent(&self) -> usize {
        self.sent
    }

    pub fn size_limit(&self) -> Option<usize> {
        self.size_limit
    }

    /// True once an entry was refused for exceeding the size limit
    pub fn exceeded(&self) -> bool {
        self.exceeded
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn check_cancelled(&self) -> LdapResult<()> {
        if self.cancel.is_cancelled() {
            Err(LdapError::new(ResultCode::Other, "operation abandoned"))
        } else {
            Ok(())
        }
    }

    /// Send one entry, shaped by the requested attribute list.
    ///
    /// Fails with `sizeLimitExceeded` once the limit is reached; the entry
    /// that tripped the limit is not sent.
    pub async fn send_entry(&mut self, dn: &str, record: &Attributes) -> LdapResult<()> {
        self.check_cancelled()?;
        if let Some(limit) = self.size_limit {
            if self.sent >= limit {
                self.exceeded = true;
                return Err(LdapError::size_limit_exceeded());
            }
        }
        self.sent += 1;

        let selected = select_attributes(&self.attributes, record);
        let op = search_entry(dn, selected, self.types_only);
        self.writer.send(self.message_id, op).await?;
        global_metrics().entry_sent();
        Ok(())
    }

    /// Send the entry only if it satisfies the request filter
    pub async fn send_if_matches(&mut self, dn: &str, record: &Attributes) -> LdapResult<bool> {
        if !self.filter.matches(record) {
            self.check_cancelled()?;
            return Ok(false);
        }
        self.send_entry(dn, record).await?;
        Ok(true)
    }

    /// Send a continuation reference
    pub async fn send_reference(&mut self, urls: &[String]) -> LdapResult<()> {
        self.check_cancelled()?;
        self.writer.send(self.message_id, search_reference(urls)).await?;
        Ok(())
    }
}

/// Attributes of `record` to return for the requested selectors
fn select_attributes<'a>(
    requested: &[String],
    record: &'a Attributes,
) -> Vec<(&'a str, &'a [Vec<u8>])> {
    let all = requested.is_empty() || requested.iter().any(|a| a == ALL_ATTRIBUTES);
    record
        .iter()
        .filter(|(name, _)| {
            all || requested
                .iter()
                .any(|r| r != NO_ATTRIBUTES && r.eq_ignore_ascii_case(name))
        })
        .map(|(name, values)| (name.as_str(), values.as_slice()))
        .collect()
}
