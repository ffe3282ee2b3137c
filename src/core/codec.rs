//! Framing codec: one LDAP message per decoded item.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::config::MAX_MESSAGE_SIZE;
use crate::core::ber::{parse_header, Element};
use crate::error::{ProtocolError, Result};

/// Splits a stream into complete BER elements and encodes outgoing ones
#[derive(Debug, Clone, Copy)]
pub struct LdapCodec {
    max_message_size: usize,
}

impl LdapCodec {
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }
}

impl Default for LdapCodec {
    fn default() -> Self {
        Self::new(MAX_MESSAGE_SIZE)
    }
}

impl Decoder for LdapCodec {
    type Item = Element;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Element>> {
        let Some(header) = parse_header(src)? else {
            return Ok(None);
        };

        if header.content_len > self.max_message_size {
            return Err(ProtocolError::OversizedMessage(header.content_len));
        }

        let total = header.total_len();
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let frame = src.split_to(total);
        Element::decode(&frame).map(Some)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Element>> {
        match self.decode(src)? {
            Some(element) => Ok(Some(element)),
            None if src.is_empty() => Ok(None),
            // EOF in the middle of an element
            None => Err(ProtocolError::ConnectionClosed),
        }
    }
}

impl Encoder<Element> for LdapCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Element, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(item.encoded_len());
        item.encode(dst);
        Ok(())
    }
}
