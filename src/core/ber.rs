//! # BER Elements
//!
//! Minimal reader/writer for the tag-length-value encoding that carries every
//! LDAP message.
//!
//! Only the definite-length forms are supported. Tags use the short form for
//! numbers below 31 and the base-128 continuation form otherwise; lengths use
//! the short form up to 127 and the long form (count byte followed by a
//! big-endian integer) above that.
//!
//! ## Layout
//! ```text
//! [Tag(1..6)] [Length(1..9)] [Content(N)]
//! ```
//!
//! Encoding always produces the shortest valid tag, length and integer
//! representations.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{constants, ProtocolError, Result};

/// Maximum nesting depth accepted while decoding
pub const MAX_DEPTH: usize = 64;

/// The two high bits of the identifier octet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TagClass {
    Universal,
    Application,
    Context,
    Private,
}

impl TagClass {
    fn from_identifier(byte: u8) -> Self {
        match byte >> 6 {
            0 => TagClass::Universal,
            1 => TagClass::Application,
            2 => TagClass::Context,
            _ => TagClass::Private,
        }
    }

    fn bits(self) -> u8 {
        match self {
            TagClass::Universal => 0x00,
            TagClass::Application => 0x40,
            TagClass::Context => 0x80,
            TagClass::Private => 0xC0,
        }
    }
}

/// Identifier of an element: class, primitive/constructed flag and number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag {
    pub class: TagClass,
    pub constructed: bool,
    pub number: u32,
}

impl Tag {
    pub const BOOLEAN: Tag = Tag::universal(1, false);
    pub const INTEGER: Tag = Tag::universal(2, false);
    pub const OCTET_STRING: Tag = Tag::universal(4, false);
    pub const NULL: Tag = Tag::universal(5, false);
    pub const ENUMERATED: Tag = Tag::universal(10, false);
    pub const SEQUENCE: Tag = Tag::universal(16, true);
    pub const SET: Tag = Tag::universal(17, true);

    pub const fn universal(number: u32, constructed: bool) -> Self {
        Tag {
            class: TagClass::Universal,
            constructed,
            number,
        }
    }

    pub const fn application(number: u32, constructed: bool) -> Self {
        Tag {
            class: TagClass::Application,
            constructed,
            number,
        }
    }

    pub const fn context(number: u32, constructed: bool) -> Self {
        Tag {
            class: TagClass::Context,
            constructed,
            number,
        }
    }

    /// Number of identifier octets this tag encodes to
    pub fn encoded_len(&self) -> usize {
        if self.number < 0x1f {
            return 1;
        }
        let mut groups = 0;
        let mut n = self.number;
        while n > 0 {
            groups += 1;
            n >>= 7;
        }
        1 + groups
    }

    pub fn encode(&self, out: &mut BytesMut) {
        let lead = self.class.bits() | if self.constructed { 0x20 } else { 0 };
        if self.number < 0x1f {
            out.put_u8(lead | self.number as u8);
            return;
        }

        out.put_u8(lead | 0x1f);
        let groups = self.encoded_len() - 1;
        for i in (0..groups).rev() {
            let group = ((self.number >> (7 * i)) & 0x7f) as u8;
            let more = if i > 0 { 0x80 } else { 0 };
            out.put_u8(group | more);
        }
    }
}

/// Decoded identifier and length octets of one element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub tag: Tag,
    pub header_len: usize,
    pub content_len: usize,
}

impl Header {
    /// Size of the whole element, header included
    pub fn total_len(&self) -> usize {
        self.header_len.saturating_add(self.content_len)
    }
}

/// Parse the tag and length at the start of `buf`.
///
/// Returns `Ok(None)` when more bytes are needed to finish the header and an
/// error when the header itself is invalid (indefinite length, oversized
/// length field, tag number overflow).
pub fn parse_header(buf: &[u8]) -> Result<Option<Header>> {
    let Some(&first) = buf.first() else {
        return Ok(None);
    };
    let class = TagClass::from_identifier(first);
    let constructed = first & 0x20 != 0;
    let mut pos = 1;

    let mut number = u32::from(first & 0x1f);
    if number == 0x1f {
        number = 0;
        loop {
            let Some(&byte) = buf.get(pos) else {
                return Ok(None);
            };
            pos += 1;
            if number > (u32::MAX >> 7) {
                return Err(ProtocolError::malformed(constants::ERR_TAG_TOO_LONG));
            }
            number = (number << 7) | u32::from(byte & 0x7f);
            if byte & 0x80 == 0 {
                break;
            }
        }
    }

    let Some(&len_byte) = buf.get(pos) else {
        return Ok(None);
    };
    pos += 1;

    let content_len = if len_byte & 0x80 == 0 {
        usize::from(len_byte)
    } else {
        let count = usize::from(len_byte & 0x7f);
        if count == 0 {
            return Err(ProtocolError::malformed(constants::ERR_INDEFINITE_LENGTH));
        }
        if count > 8 {
            return Err(ProtocolError::malformed(constants::ERR_LENGTH_TOO_LONG));
        }
        if buf.len() < pos + count {
            return Ok(None);
        }
        let len = buf[pos..pos + count]
            .iter()
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
        pos += count;
        usize::try_from(len).map_err(|_| ProtocolError::OversizedMessage(usize::MAX))?
    };

    Ok(Some(Header {
        tag: Tag {
            class,
            constructed,
            number,
        },
        header_len: pos,
        content_len,
    }))
}

fn length_len(len: usize) -> usize {
    if len < 0x80 {
        1
    } else {
        let bytes = (len as u64).to_be_bytes();
        1 + bytes.iter().skip_while(|b| **b == 0).count()
    }
}

fn encode_length(len: usize, out: &mut BytesMut) {
    if len < 0x80 {
        out.put_u8(len as u8);
        return;
    }
    let bytes = (len as u64).to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    out.put_u8(0x80 | (8 - skip) as u8);
    out.put_slice(&bytes[skip..]);
}

/// Shortest two's complement representation of `value`
fn encode_integer(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < 7 {
        let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
            || (bytes[start] == 0xff && bytes[start + 1] & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

/// Content of an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Primitive(Vec<u8>),
    Constructed(Vec<Element>),
}

/// One decoded tag-length-value unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: Tag,
    pub value: Value,
}

impl Element {
    pub fn primitive(tag: Tag, bytes: impl Into<Vec<u8>>) -> Self {
        Element {
            tag: Tag {
                constructed: false,
                ..tag
            },
            value: Value::Primitive(bytes.into()),
        }
    }

    pub fn constructed(tag: Tag, children: Vec<Element>) -> Self {
        Element {
            tag: Tag {
                constructed: true,
                ..tag
            },
            value: Value::Constructed(children),
        }
    }

    pub fn boolean(value: bool) -> Self {
        Self::primitive(Tag::BOOLEAN, vec![if value { 0xff } else { 0x00 }])
    }

    pub fn integer(value: i64) -> Self {
        Self::primitive(Tag::INTEGER, encode_integer(value))
    }

    pub fn enumerated(value: i64) -> Self {
        Self::primitive(Tag::ENUMERATED, encode_integer(value))
    }

    pub fn octet_string(bytes: impl Into<Vec<u8>>) -> Self {
        Self::primitive(Tag::OCTET_STRING, bytes)
    }

    pub fn null() -> Self {
        Self::primitive(Tag::NULL, Vec::new())
    }

    pub fn sequence(children: Vec<Element>) -> Self {
        Self::constructed(Tag::SEQUENCE, children)
    }

    pub fn set(children: Vec<Element>) -> Self {
        Self::constructed(Tag::SET, children)
    }

    /// Replace the class and number (IMPLICIT tagging), keeping the content form
    pub fn implicit(self, class: TagClass, number: u32) -> Self {
        Element {
            tag: Tag {
                class,
                number,
                constructed: self.tag.constructed,
            },
            value: self.value,
        }
    }

    /// True if class and number match, ignoring the constructed bit
    pub fn has_tag(&self, class: TagClass, number: u32) -> bool {
        self.tag.class == class && self.tag.number == number
    }

    /// Decode exactly one element occupying all of `bytes`
    pub fn decode(bytes: &[u8]) -> Result<Element> {
        let (element, used) = Self::decode_prefix(bytes, 0)?;
        if used != bytes.len() {
            return Err(ProtocolError::malformed(constants::ERR_TRAILING_BYTES));
        }
        Ok(element)
    }

    fn decode_prefix(bytes: &[u8], depth: usize) -> Result<(Element, usize)> {
        if depth > MAX_DEPTH {
            return Err(ProtocolError::malformed(constants::ERR_TOO_DEEP));
        }
        let header = parse_header(bytes)?
            .ok_or_else(|| ProtocolError::malformed(constants::ERR_TRUNCATED))?;
        let end = header
            .header_len
            .checked_add(header.content_len)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| ProtocolError::malformed(constants::ERR_TRUNCATED))?;
        let content = &bytes[header.header_len..end];

        let value = if header.tag.constructed {
            let mut children = Vec::new();
            let mut offset = 0;
            while offset < content.len() {
                let (child, used) = Self::decode_prefix(&content[offset..], depth + 1)?;
                children.push(child);
                offset += used;
            }
            Value::Constructed(children)
        } else {
            Value::Primitive(content.to_vec())
        };

        Ok((
            Element {
                tag: header.tag,
                value,
            },
            end,
        ))
    }

    fn content_len(&self) -> usize {
        match &self.value {
            Value::Primitive(bytes) => bytes.len(),
            Value::Constructed(children) => children.iter().map(Element::encoded_len).sum(),
        }
    }

    /// Size of the complete encoding of this element
    pub fn encoded_len(&self) -> usize {
        let content = self.content_len();
        self.tag.encoded_len() + length_len(content) + content
    }

    pub fn encode(&self, out: &mut BytesMut) {
        self.tag.encode(out);
        encode_length(self.content_len(), out);
        match &self.value {
            Value::Primitive(bytes) => out.put_slice(bytes),
            Value::Constructed(children) => {
                for child in children {
                    child.encode(out);
                }
            }
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut out);
        out.freeze()
    }

    pub fn as_bytes(&self) -> Result<&[u8]> {
        match &self.value {
            Value::Primitive(bytes) => Ok(bytes),
            Value::Constructed(_) => Err(ProtocolError::malformed(format!(
                "expected primitive element, found constructed tag {}",
                self.tag.number
            ))),
        }
    }

    pub fn as_string(&self) -> Result<String> {
        String::from_utf8(self.as_bytes()?.to_vec())
            .map_err(|_| ProtocolError::malformed("string is not valid UTF-8"))
    }

    pub fn as_integer(&self) -> Result<i64> {
        let bytes = self.as_bytes()?;
        if bytes.is_empty() {
            return Err(ProtocolError::malformed(constants::ERR_EMPTY_INTEGER));
        }
        if bytes.len() > 8 {
            return Err(ProtocolError::malformed(constants::ERR_INTEGER_TOO_LONG));
        }
        let seed: i64 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
        Ok(bytes.iter().fold(seed, |acc, b| (acc << 8) | i64::from(*b)))
    }

    pub fn as_i32(&self) -> Result<i32> {
        i32::try_from(self.as_integer()?)
            .map_err(|_| ProtocolError::malformed("integer out of range"))
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self.as_bytes()? {
            [byte] => Ok(*byte != 0),
            _ => Err(ProtocolError::malformed("BOOLEAN must be one octet")),
        }
    }

    pub fn children(&self) -> Result<&[Element]> {
        match &self.value {
            Value::Constructed(children) => Ok(children),
            Value::Primitive(_) => Err(ProtocolError::malformed(format!(
                "expected constructed element, found primitive tag {}",
                self.tag.number
            ))),
        }
    }

    /// The `index`th child of a constructed element
    pub fn child(&self, index: usize) -> Result<&Element> {
        self.children()?.get(index).ok_or_else(|| {
            ProtocolError::malformed(format!(
                "tag {} is missing element {index}",
                self.tag.number
            ))
        })
    }
}

async fn fill<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(ProtocolError::ConnectionClosed)
        }
        Err(e) => Err(ProtocolError::Io(e)),
    }
}

/// Read the raw bytes of one complete element from `reader`.
///
/// A stream that ends before the element is complete yields
/// [`ProtocolError::ConnectionClosed`]; a malformed header yields
/// [`ProtocolError::Malformed`].
pub async fn read_element<R: AsyncRead + Unpin>(reader: &mut R, max_len: usize) -> Result<Vec<u8>> {
    let mut raw = Vec::with_capacity(16);
    loop {
        if let Some(header) = parse_header(&raw)? {
            if header.content_len > max_len {
                return Err(ProtocolError::OversizedMessage(header.content_len));
            }
            let start = raw.len();
            raw.resize(header.total_len(), 0);
            fill(reader, &mut raw[start..]).await?;
            return Ok(raw);
        }
        let mut byte = [0u8; 1];
        fill(reader, &mut byte).await?;
        raw.push(byte[0]);
    }
}
