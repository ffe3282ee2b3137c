//! # LDAP Messages
//!
//! The `LDAPMessage` envelope and the request/response bodies carried in it
//! (RFC 4511 section 4).
//!
//! ```text
//! LDAPMessage ::= SEQUENCE {
//!      messageID       MessageID,
//!      protocolOp      CHOICE { ... [APPLICATION n] ... },
//!      controls        [0] Controls OPTIONAL }
//! ```
//!
//! Envelope violations are [`ProtocolError`]s and end the connection.
//! Problems inside a known request body surface as [`LdapError`]s so the
//! operation can answer with a result code and the connection stays open.
//!
//! Every request type can also be encoded, and every response decoded, so
//! the same types drive clients and tests.

use crate::core::ber::{Element, Tag, TagClass, Value};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::dn::{Dn, Rdn};
use crate::protocol::filter::{Attributes, Filter};
use crate::protocol::matching::MatchingRules;
use crate::protocol::result::{LdapError, LdapResult, ResultCode};

/// APPLICATION tag numbers of `protocolOp`
pub mod tags {
    pub const BIND_REQUEST: u32 = 0;
    pub const BIND_RESPONSE: u32 = 1;
    pub const UNBIND_REQUEST: u32 = 2;
    pub const SEARCH_REQUEST: u32 = 3;
    pub const SEARCH_RESULT_ENTRY: u32 = 4;
    pub const SEARCH_RESULT_DONE: u32 = 5;
    pub const MODIFY_REQUEST: u32 = 6;
    pub const MODIFY_RESPONSE: u32 = 7;
    pub const ADD_REQUEST: u32 = 8;
    pub const ADD_RESPONSE: u32 = 9;
    pub const DEL_REQUEST: u32 = 10;
    pub const DEL_RESPONSE: u32 = 11;
    pub const MODIFY_DN_REQUEST: u32 = 12;
    pub const MODIFY_DN_RESPONSE: u32 = 13;
    pub const COMPARE_REQUEST: u32 = 14;
    pub const COMPARE_RESPONSE: u32 = 15;
    pub const ABANDON_REQUEST: u32 = 16;
    pub const SEARCH_RESULT_REFERENCE: u32 = 19;
    pub const EXTENDED_REQUEST: u32 = 23;
    pub const EXTENDED_RESPONSE: u32 = 24;
}

/// Well-known extended operation names
pub mod oids {
    pub const START_TLS: &str = "1.3.6.1.4.1.1466.20037";
    pub const WHO_AM_I: &str = "1.3.6.1.4.1.4203.1.11.3";
    pub const NOTICE_OF_DISCONNECTION: &str = "1.3.6.1.4.1.1466.20036";
}

fn ldap_string(element: &Element) -> LdapResult<String> {
    element.as_string().map_err(LdapError::from)
}

fn parse_dn(element: &Element) -> LdapResult<Dn> {
    Dn::parse(&ldap_string(element)?)
}

/// A request or response control
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub oid: String,
    pub critical: bool,
    pub value: Option<Vec<u8>>,
}

impl Control {
    fn decode(element: &Element) -> Result<Control> {
        let children = element.children()?;
        let oid = element.child(0)?.as_string()?;
        let mut critical = false;
        let mut value = None;
        for child in &children[1..] {
            if child.tag == Tag::BOOLEAN {
                critical = child.as_bool()?;
            } else if child.tag == Tag::OCTET_STRING {
                value = Some(child.as_bytes()?.to_vec());
            } else {
                return Err(ProtocolError::malformed("unexpected element in Control"));
            }
        }
        Ok(Control {
            oid,
            critical,
            value,
        })
    }

    pub fn to_element(&self) -> Element {
        let mut children = vec![Element::octet_string(self.oid.as_bytes())];
        if self.critical {
            children.push(Element::boolean(true));
        }
        if let Some(value) = &self.value {
            children.push(Element::octet_string(value.clone()));
        }
        Element::sequence(children)
    }
}

/// A decoded envelope whose operation body has not been interpreted yet
#[derive(Debug, Clone, PartialEq)]
pub struct LdapMessage {
    pub message_id: i32,
    pub op: Element,
    pub controls: Vec<Control>,
}

impl LdapMessage {
    pub fn new(message_id: i32, op: Element) -> Self {
        Self {
            message_id,
            op,
            controls: Vec::new(),
        }
    }

    /// Validate and split an envelope
    pub fn decode(element: Element) -> Result<LdapMessage> {
        if element.tag != Tag::SEQUENCE {
            return Err(ProtocolError::malformed(constants::ERR_NOT_SEQUENCE));
        }
        let mut children = match element.value {
            Value::Constructed(children) => children.into_iter(),
            Value::Primitive(_) => {
                return Err(ProtocolError::malformed(constants::ERR_NOT_SEQUENCE))
            }
        };

        let id = children
            .next()
            .filter(|e| e.tag == Tag::INTEGER)
            .ok_or_else(|| ProtocolError::malformed(constants::ERR_BAD_MESSAGE_ID))?;
        let message_id = id
            .as_i32()
            .ok()
            .filter(|id| *id >= 0)
            .ok_or_else(|| ProtocolError::malformed(constants::ERR_BAD_MESSAGE_ID))?;

        let op = children
            .next()
            .ok_or_else(|| ProtocolError::malformed(constants::ERR_BAD_PROTOCOL_OP))?;
        if op.tag.class != TagClass::Application {
            return Err(ProtocolError::malformed(constants::ERR_BAD_TAG_CLASS));
        }

        let mut controls = Vec::new();
        if let Some(list) = children.next() {
            if !list.has_tag(TagClass::Context, 0) {
                return Err(ProtocolError::malformed("unexpected element after protocolOp"));
            }
            for control in list.children()? {
                controls.push(Control::decode(control)?);
            }
        }

        Ok(LdapMessage {
            message_id,
            op,
            controls,
        })
    }

    /// APPLICATION number of the operation
    pub fn op_tag(&self) -> u32 {
        self.op.tag.number
    }

    pub fn to_element(&self) -> Element {
        let mut children = vec![Element::integer(i64::from(self.message_id)), self.op.clone()];
        if !self.controls.is_empty() {
            children.push(Element::constructed(
                Tag::context(0, true),
                self.controls.iter().map(Control::to_element).collect(),
            ));
        }
        Element::sequence(children)
    }
}

/// AuthenticationChoice of a bind request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindAuth {
    Simple(Vec<u8>),
    Sasl {
        mechanism: String,
        credentials: Option<Vec<u8>>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindRequest {
    pub version: i32,
    pub name: String,
    pub auth: BindAuth,
}

impl BindRequest {
    /// A bad authentication choice is an envelope-level error
    pub fn decode(op: &Element) -> Result<BindRequest> {
        let version = op.child(0)?.as_i32()?;
        let name = op.child(1)?.as_string()?;
        let auth = op.child(2)?;
        if auth.tag.class != TagClass::Context {
            return Err(ProtocolError::malformed(constants::ERR_BAD_AUTH_CHOICE));
        }
        let auth = match auth.tag.number {
            0 => BindAuth::Simple(auth.as_bytes()?.to_vec()),
            3 => BindAuth::Sasl {
                mechanism: auth.child(0)?.as_string()?,
                credentials: match auth.children()?.get(1) {
                    Some(c) => Some(c.as_bytes()?.to_vec()),
                    None => None,
                },
            },
            _ => return Err(ProtocolError::malformed(constants::ERR_BAD_AUTH_CHOICE)),
        };
        Ok(BindRequest {
            version,
            name,
            auth,
        })
    }

    pub fn simple(name: &str, password: &[u8]) -> Self {
        Self {
            version: 3,
            name: name.to_string(),
            auth: BindAuth::Simple(password.to_vec()),
        }
    }

    pub fn to_element(&self) -> Element {
        let auth = match &self.auth {
            BindAuth::Simple(password) => {
                Element::primitive(Tag::context(0, false), password.clone())
            }
            BindAuth::Sasl {
                mechanism,
                credentials,
            } => {
                let mut children = vec![Element::octet_string(mechanism.as_bytes())];
                if let Some(credentials) = credentials {
                    children.push(Element::octet_string(credentials.clone()));
                }
                Element::constructed(Tag::context(3, true), children)
            }
        };
        Element::constructed(
            Tag::application(tags::BIND_REQUEST, true),
            vec![
                Element::integer(i64::from(self.version)),
                Element::octet_string(self.name.as_bytes()),
                auth,
            ],
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    BaseObject,
    SingleLevel,
    WholeSubtree,
}

impl SearchScope {
    fn from_code(code: i64) -> LdapResult<Self> {
        match code {
            0 => Ok(SearchScope::BaseObject),
            1 => Ok(SearchScope::SingleLevel),
            2 => Ok(SearchScope::WholeSubtree),
            n => Err(LdapError::protocol_error(format!("bad search scope {n}"))),
        }
    }

    fn code(self) -> i64 {
        match self {
            SearchScope::BaseObject => 0,
            SearchScope::SingleLevel => 1,
            SearchScope::WholeSubtree => 2,
        }
    }

    /// True if `dn` is inside this scope relative to `base`
    pub fn contains(self, base: &Dn, dn: &Dn) -> bool {
        match self {
            SearchScope::BaseObject => dn == base,
            SearchScope::SingleLevel => dn.len() == base.len() + 1 && dn.ends_with(base),
            SearchScope::WholeSubtree => dn.ends_with(base),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerefAliases {
    Never,
    InSearching,
    FindingBaseObj,
    Always,
}

impl DerefAliases {
    fn from_code(code: i64) -> LdapResult<Self> {
        match code {
            0 => Ok(DerefAliases::Never),
            1 => Ok(DerefAliases::InSearching),
            2 => Ok(DerefAliases::FindingBaseObj),
            3 => Ok(DerefAliases::Always),
            n => Err(LdapError::protocol_error(format!("bad derefAliases {n}"))),
        }
    }

    fn code(self) -> i64 {
        match self {
            DerefAliases::Never => 0,
            DerefAliases::InSearching => 1,
            DerefAliases::FindingBaseObj => 2,
            DerefAliases::Always => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub base: Dn,
    pub scope: SearchScope,
    pub deref: DerefAliases,
    /// Client size limit; 0 means none requested
    pub size_limit: i32,
    /// Client time limit in seconds; 0 means none requested
    pub time_limit: i32,
    pub types_only: bool,
    pub filter: Filter,
    pub attributes: Vec<String>,
}

impl SearchRequest {
    pub fn decode(op: &Element, rules: Option<&MatchingRules>) -> LdapResult<SearchRequest> {
        let base = parse_dn(op.child(0)?)?;
        let scope = SearchScope::from_code(op.child(1)?.as_integer()?)?;
        let deref = DerefAliases::from_code(op.child(2)?.as_integer()?)?;
        let size_limit = op.child(3)?.as_i32()?;
        let time_limit = op.child(4)?.as_i32()?;
        let types_only = op.child(5)?.as_bool()?;
        let filter = Filter::parse(op.child(6)?, rules)?;
        let attributes = op
            .child(7)?
            .children()?
            .iter()
            .map(ldap_string)
            .collect::<LdapResult<Vec<_>>>()?;
        Ok(SearchRequest {
            base,
            scope,
            deref,
            size_limit,
            time_limit,
            types_only,
            filter,
            attributes,
        })
    }

    /// Subtree search for every entry below `base`
    pub fn subtree(base: Dn) -> Self {
        Self {
            base,
            scope: SearchScope::WholeSubtree,
            deref: DerefAliases::Never,
            size_limit: 0,
            time_limit: 0,
            types_only: false,
            filter: Filter::True,
            attributes: Vec::new(),
        }
    }

    pub fn to_element(&self) -> Element {
        Element::constructed(
            Tag::application(tags::SEARCH_REQUEST, true),
            vec![
                Element::octet_string(self.base.to_string()),
                Element::enumerated(self.scope.code()),
                Element::enumerated(self.deref.code()),
                Element::integer(i64::from(self.size_limit)),
                Element::integer(i64::from(self.time_limit)),
                Element::boolean(self.types_only),
                self.filter.to_element(),
                Element::sequence(
                    self.attributes
                        .iter()
                        .map(|a| Element::octet_string(a.as_bytes()))
                        .collect(),
                ),
            ],
        )
    }
}

/// Decode `SEQUENCE { type, SET OF value }` into a name and values.
///
/// The type is a string; values are kept as raw octets.
fn attribute(element: &Element) -> Result<(String, Vec<Vec<u8>>)> {
    let name = element.child(0)?.as_string()?;
    let values = element
        .child(1)?
        .children()?
        .iter()
        .map(|v| v.as_bytes().map(<[u8]>::to_vec))
        .collect::<Result<Vec<_>>>()?;
    Ok((name, values))
}

fn attribute_element(name: &str, values: &[Vec<u8>]) -> Element {
    Element::sequence(vec![
        Element::octet_string(name.as_bytes()),
        Element::set(values.iter().map(|v| Element::octet_string(v.as_slice())).collect()),
    ])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyOperation {
    Add,
    Delete,
    Replace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    pub operation: ModifyOperation,
    pub attr: String,
    pub values: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyRequest {
    pub dn: Dn,
    pub changes: Vec<Modification>,
}

impl ModifyRequest {
    pub fn decode(op: &Element) -> LdapResult<ModifyRequest> {
        let dn = parse_dn(op.child(0)?)?;
        let mut changes = Vec::new();
        for change in op.child(1)?.children()? {
            let operation = match change.child(0)?.as_integer()? {
                0 => ModifyOperation::Add,
                1 => ModifyOperation::Delete,
                2 => ModifyOperation::Replace,
                n => {
                    return Err(LdapError::protocol_error(format!(
                        "bad modify operation {n}"
                    )))
                }
            };
            let (attr, values) = attribute(change.child(1)?)?;
            changes.push(Modification {
                operation,
                attr,
                values,
            });
        }
        Ok(ModifyRequest { dn, changes })
    }

    pub fn to_element(&self) -> Element {
        let changes = self
            .changes
            .iter()
            .map(|m| {
                let op = match m.operation {
                    ModifyOperation::Add => 0,
                    ModifyOperation::Delete => 1,
                    ModifyOperation::Replace => 2,
                };
                Element::sequence(vec![
                    Element::enumerated(op),
                    attribute_element(&m.attr, &m.values),
                ])
            })
            .collect();
        Element::constructed(
            Tag::application(tags::MODIFY_REQUEST, true),
            vec![
                Element::octet_string(self.dn.to_string()),
                Element::sequence(changes),
            ],
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddRequest {
    pub dn: Dn,
    pub attributes: Attributes,
}

impl AddRequest {
    /// Naming the same attribute twice is `attributeOrValueExists`
    pub fn decode(op: &Element) -> LdapResult<AddRequest> {
        let dn = parse_dn(op.child(0)?)?;
        let mut attributes = Attributes::new();
        for element in op.child(1)?.children()? {
            let (name, values) = attribute(element)?;
            if attributes.keys().any(|k| k.eq_ignore_ascii_case(&name)) {
                return Err(LdapError::attribute_or_value_exists(format!(
                    "attribute {name} given twice"
                )));
            }
            attributes.insert(name, values);
        }
        Ok(AddRequest { dn, attributes })
    }

    pub fn to_element(&self) -> Element {
        Element::constructed(
            Tag::application(tags::ADD_REQUEST, true),
            vec![
                Element::octet_string(self.dn.to_string()),
                Element::sequence(
                    self.attributes
                        .iter()
                        .map(|(name, values)| attribute_element(name, values))
                        .collect(),
                ),
            ],
        )
    }
}

/// DelRequest is a bare `[APPLICATION 10] LDAPDN`
pub fn decode_delete(op: &Element) -> LdapResult<Dn> {
    parse_dn(op)
}

pub fn delete_request(dn: &Dn) -> Element {
    Element::primitive(Tag::application(tags::DEL_REQUEST, false), dn.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyDnRequest {
    pub dn: Dn,
    pub new_rdn: Rdn,
    pub delete_old_rdn: bool,
    pub new_superior: Option<Dn>,
}

impl ModifyDnRequest {
    pub fn decode(op: &Element) -> LdapResult<ModifyDnRequest> {
        let dn = parse_dn(op.child(0)?)?;
        let new_rdn = parse_dn(op.child(1)?)?;
        if new_rdn.len() != 1 {
            return Err(LdapError::new(
                ResultCode::InvalidDnSyntax,
                "newrdn must be a single RDN",
            ));
        }
        let delete_old_rdn = op.child(2)?.as_bool()?;
        let new_superior = match op.children()?.get(3) {
            Some(e) if e.has_tag(TagClass::Context, 0) => Some(parse_dn(e)?),
            Some(_) => return Err(LdapError::protocol_error("bad newSuperior tag")),
            None => None,
        };
        let new_rdn = new_rdn.rdns()[0].clone();
        Ok(ModifyDnRequest {
            dn,
            new_rdn,
            delete_old_rdn,
            new_superior,
        })
    }

    /// The DN the entry has after the rename
    pub fn new_dn(&self) -> Dn {
        let parent = match &self.new_superior {
            Some(superior) => superior.clone(),
            None => self.dn.parent().unwrap_or_default(),
        };
        parent.child(self.new_rdn.clone())
    }

    pub fn to_element(&self) -> Element {
        let mut children = vec![
            Element::octet_string(self.dn.to_string()),
            Element::octet_string(self.new_rdn.to_string()),
            Element::boolean(self.delete_old_rdn),
        ];
        if let Some(superior) = &self.new_superior {
            children.push(Element::primitive(Tag::context(0, false), superior.to_string()));
        }
        Element::constructed(Tag::application(tags::MODIFY_DN_REQUEST, true), children)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareRequest {
    pub dn: Dn,
    pub attr: String,
    pub value: Vec<u8>,
}

impl CompareRequest {
    pub fn decode(op: &Element) -> LdapResult<CompareRequest> {
        let dn = parse_dn(op.child(0)?)?;
        let ava = op.child(1)?;
        Ok(CompareRequest {
            dn,
            attr: ldap_string(ava.child(0)?)?,
            value: ava.child(1)?.as_bytes()?.to_vec(),
        })
    }

    pub fn to_element(&self) -> Element {
        Element::constructed(
            Tag::application(tags::COMPARE_REQUEST, true),
            vec![
                Element::octet_string(self.dn.to_string()),
                Element::sequence(vec![
                    Element::octet_string(self.attr.as_bytes()),
                    Element::octet_string(self.value.as_slice()),
                ]),
            ],
        )
    }
}

/// AbandonRequest is a bare `[APPLICATION 16] MessageID`
pub fn decode_abandon(op: &Element) -> Result<i32> {
    op.as_i32()
}

pub fn abandon_request(message_id: i32) -> Element {
    Element::integer(i64::from(message_id)).implicit(TagClass::Application, tags::ABANDON_REQUEST)
}

pub fn unbind_request() -> Element {
    Element::null().implicit(TagClass::Application, tags::UNBIND_REQUEST)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedRequest {
    pub name: String,
    pub value: Option<Vec<u8>>,
}

impl ExtendedRequest {
    pub fn decode(op: &Element) -> LdapResult<ExtendedRequest> {
        let name = op.child(0)?;
        if !name.has_tag(TagClass::Context, 0) {
            return Err(LdapError::protocol_error("missing requestName"));
        }
        let value = match op.children()?.get(1) {
            Some(v) if v.has_tag(TagClass::Context, 1) => Some(v.as_bytes()?.to_vec()),
            Some(_) => return Err(LdapError::protocol_error("bad requestValue tag")),
            None => None,
        };
        Ok(ExtendedRequest {
            name: ldap_string(name)?,
            value,
        })
    }

    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: None,
        }
    }

    pub fn to_element(&self) -> Element {
        let mut children = vec![Element::primitive(Tag::context(0, false), self.name.as_bytes())];
        if let Some(value) = &self.value {
            children.push(Element::primitive(Tag::context(1, false), value.clone()));
        }
        Element::constructed(Tag::application(tags::EXTENDED_REQUEST, true), children)
    }
}

/// APPLICATION number of the response paired with a request
pub fn response_tag(request_tag: u32) -> Option<u32> {
    match request_tag {
        tags::BIND_REQUEST => Some(tags::BIND_RESPONSE),
        tags::SEARCH_REQUEST => Some(tags::SEARCH_RESULT_DONE),
        tags::MODIFY_REQUEST => Some(tags::MODIFY_RESPONSE),
        tags::ADD_REQUEST => Some(tags::ADD_RESPONSE),
        tags::DEL_REQUEST => Some(tags::DEL_RESPONSE),
        tags::MODIFY_DN_REQUEST => Some(tags::MODIFY_DN_RESPONSE),
        tags::COMPARE_REQUEST => Some(tags::COMPARE_RESPONSE),
        tags::EXTENDED_REQUEST => Some(tags::EXTENDED_RESPONSE),
        _ => None,
    }
}

/// The `LDAPResult` fields shared by every response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapResponse {
    pub code: ResultCode,
    pub matched_dn: String,
    pub message: String,
}

impl LdapResponse {
    pub fn success() -> Self {
        Self::with_code(ResultCode::Success)
    }

    pub fn with_code(code: ResultCode) -> Self {
        Self {
            code,
            matched_dn: String::new(),
            message: String::new(),
        }
    }

    /// Encode as `[APPLICATION tag]` followed by `extra` trailing fields
    pub fn to_element(&self, tag: u32, extra: Vec<Element>) -> Element {
        let mut children = vec![
            Element::enumerated(i64::from(self.code.code())),
            Element::octet_string(self.matched_dn.as_bytes()),
            Element::octet_string(self.message.as_bytes()),
        ];
        children.extend(extra);
        Element::constructed(Tag::application(tag, true), children)
    }

    pub fn decode(op: &Element) -> Result<LdapResponse> {
        let raw = op.child(0)?.as_integer()?;
        let code = ResultCode::from_code(raw)
            .ok_or_else(|| ProtocolError::malformed(format!("unknown result code {raw}")))?;
        Ok(LdapResponse {
            code,
            matched_dn: op.child(1)?.as_string()?,
            message: op.child(2)?.as_string()?,
        })
    }
}

impl From<&LdapError> for LdapResponse {
    fn from(err: &LdapError) -> Self {
        Self {
            code: err.code,
            matched_dn: err.matched_dn.clone(),
            message: err.message.clone(),
        }
    }
}

pub fn search_entry<'a>(
    dn: &str,
    attributes: impl IntoIterator<Item = (&'a str, &'a [Vec<u8>])>,
    types_only: bool,
) -> Element {
    let attrs = attributes
        .into_iter()
        .map(|(name, values)| {
            let values = if types_only { &[][..] } else { values };
            attribute_element(name, values)
        })
        .collect();
    Element::constructed(
        Tag::application(tags::SEARCH_RESULT_ENTRY, true),
        vec![Element::octet_string(dn.as_bytes()), Element::sequence(attrs)],
    )
}

/// Decode a SearchResultEntry into its DN and attributes
pub fn decode_search_entry(op: &Element) -> Result<(String, Attributes)> {
    let dn = op.child(0)?.as_string()?;
    let mut attributes = Attributes::new();
    for attr in op.child(1)?.children()? {
        let (name, values) = attribute(attr)?;
        attributes.insert(name, values);
    }
    Ok((dn, attributes))
}

pub fn search_reference(urls: &[String]) -> Element {
    Element::constructed(
        Tag::application(tags::SEARCH_RESULT_REFERENCE, true),
        urls.iter().map(|u| Element::octet_string(u.as_bytes())).collect(),
    )
}

pub fn extended_response(result: &LdapResponse, name: Option<&str>, value: Option<&[u8]>) -> Element {
    let mut extra = Vec::new();
    if let Some(name) = name {
        extra.push(Element::primitive(Tag::context(10, false), name.as_bytes()));
    }
    if let Some(value) = value {
        extra.push(Element::primitive(Tag::context(11, false), value));
    }
    result.to_element(tags::EXTENDED_RESPONSE, extra)
}

/// Unsolicited notification sent before the server drops a connection
pub fn notice_of_disconnection(code: ResultCode, message: &str) -> Element {
    let result = LdapResponse {
        code,
        matched_dn: String::new(),
        message: message.to_string(),
    };
    LdapMessage::new(
        0,
        extended_response(&result, Some(oids::NOTICE_OF_DISCONNECTION), None),
    )
    .to_element()
}
