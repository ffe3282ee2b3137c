#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Edge-case tests for the wire layer: BER boundaries, framing limits,
//! DN escaping corners and envelope validation.

use bytes::BytesMut;
use ldap_protocol::core::ber::{parse_header, read_element, Element, Tag, TagClass, MAX_DEPTH};
use ldap_protocol::core::codec::LdapCodec;
use ldap_protocol::error::ProtocolError;
use ldap_protocol::protocol::dn::Dn;
use ldap_protocol::protocol::filter::{Attributes, Filter};
use ldap_protocol::protocol::message::{unbind_request, LdapMessage};
use ldap_protocol::protocol::result::ResultCode;
use tokio_util::codec::Decoder;

fn nested(depth: usize) -> Vec<u8> {
    let mut element = Element::null();
    for _ in 0..depth {
        element = Element::sequence(vec![element]);
    }
    element.to_bytes().to_vec()
}

// ============================================================================
// BER HEADER EDGE CASES
// ============================================================================

#[test]
fn test_indefinite_length_is_malformed() {
    let bytes = [0x30, 0x80, 0x02, 0x01, 0x01, 0x00, 0x00];
    assert!(matches!(parse_header(&bytes), Err(ProtocolError::Malformed(_))));
    assert!(matches!(Element::decode(&bytes), Err(ProtocolError::Malformed(_))));
}

#[test]
fn test_length_field_longer_than_eight_octets() {
    let mut bytes = vec![0x04, 0x89];
    bytes.extend_from_slice(&[0x00; 9]);
    assert!(matches!(parse_header(&bytes), Err(ProtocolError::Malformed(_))));
}

#[test]
fn test_empty_buffer_needs_more() {
    assert_eq!(parse_header(&[]).unwrap(), None);
    assert_eq!(parse_header(&[0x30]).unwrap(), None);
    assert_eq!(parse_header(&[0x30, 0x82, 0x01]).unwrap(), None);
}

#[test]
fn test_high_tag_number_roundtrip() {
    let element = Element::octet_string("x").implicit(TagClass::Application, 200);
    let decoded = Element::decode(&element.to_bytes()).unwrap();
    assert!(decoded.has_tag(TagClass::Application, 200));
    assert_eq!(decoded.as_bytes().unwrap(), b"x");
}

#[test]
fn test_long_form_length_roundtrip() {
    let payload = vec![0x5a; 70_000];
    let element = Element::octet_string(payload.clone());
    let bytes = element.to_bytes();
    assert_eq!(bytes[1], 0x83);
    assert_eq!(Element::decode(&bytes).unwrap().as_bytes().unwrap(), &payload[..]);
}

#[test]
fn test_zero_length_values() {
    let element = Element::sequence(Vec::new());
    let decoded = Element::decode(&element.to_bytes()).unwrap();
    assert!(decoded.children().unwrap().is_empty());
    assert_eq!(Element::decode(&[0x04, 0x00]).unwrap().as_bytes().unwrap(), b"");
}

// ============================================================================
// BER CONTENT EDGE CASES
// ============================================================================

#[test]
fn test_truncated_element() {
    let bytes = Element::octet_string("hello").to_bytes();
    let err = Element::decode(&bytes[..bytes.len() - 1]).unwrap_err();
    assert!(matches!(err, ProtocolError::Malformed(_)));
}

#[test]
fn test_child_overruns_parent() {
    // SEQUENCE of length 3 holding an OCTET STRING claiming 5 bytes
    let bytes = [0x30, 0x03, 0x04, 0x05, 0x61];
    assert!(Element::decode(&bytes).is_err());
}

#[test]
fn test_nesting_depth_limit() {
    assert!(Element::decode(&nested(MAX_DEPTH)).is_ok());
    let err = Element::decode(&nested(MAX_DEPTH + 2)).unwrap_err();
    assert!(matches!(err, ProtocolError::Malformed(_)));
}

#[test]
fn test_integer_edge_values() {
    for value in [0, -1, 127, 128, -128, -129, i64::from(i32::MAX), i64::MIN, i64::MAX] {
        let decoded = Element::decode(&Element::integer(value).to_bytes()).unwrap();
        assert_eq!(decoded.as_integer().unwrap(), value);
    }
    assert_eq!(Element::integer(128).as_bytes().unwrap(), &[0x00, 0x80]);
    assert_eq!(Element::integer(-128).as_bytes().unwrap(), &[0x80]);
}

#[test]
fn test_bad_integer_contents() {
    let empty = Element::primitive(Tag::INTEGER, Vec::new());
    assert!(empty.as_integer().is_err());

    let too_long = Element::primitive(Tag::INTEGER, vec![0x01; 9]);
    assert!(too_long.as_integer().is_err());

    let out_of_range = Element::integer(i64::from(i32::MAX) + 1);
    assert!(out_of_range.as_i32().is_err());
}

#[test]
fn test_boolean_must_be_one_octet() {
    assert!(Element::primitive(Tag::BOOLEAN, vec![0xff, 0x00]).as_bool().is_err());
    assert!(Element::primitive(Tag::BOOLEAN, vec![0x01]).as_bool().unwrap());
    assert!(!Element::boolean(false).as_bool().unwrap());
}

#[test]
fn test_invalid_utf8_string() {
    let element = Element::octet_string(vec![0xff, 0xfe]);
    assert!(element.as_string().is_err());
}

// ============================================================================
// FRAMING EDGE CASES
// ============================================================================

#[test]
fn test_codec_rejects_oversize_from_header_alone() {
    let mut codec = LdapCodec::new(1024);
    // header announces 1 MiB, only the header has arrived
    let mut buf = BytesMut::from(&[0x30, 0x83, 0x10, 0x00, 0x00][..]);
    assert!(matches!(
        codec.decode(&mut buf),
        Err(ProtocolError::OversizedMessage(len)) if len == 0x10_0000
    ));
}

#[test]
fn test_codec_accepts_exact_limit() {
    let element = Element::octet_string(vec![0u8; 1024]);
    let mut codec = LdapCodec::new(1024);
    let mut buf = BytesMut::from(&element.to_bytes()[..]);
    assert_eq!(codec.decode(&mut buf).unwrap(), Some(element));
}

#[test]
fn test_codec_eof_mid_frame() {
    let bytes = Element::octet_string("partial").to_bytes();
    let mut codec = LdapCodec::default();
    let mut buf = BytesMut::from(&bytes[..4]);
    assert_eq!(codec.decode(&mut buf).unwrap(), None);
    assert!(matches!(
        codec.decode_eof(&mut buf),
        Err(ProtocolError::ConnectionClosed)
    ));
}

#[test]
fn test_codec_eof_on_boundary_is_clean() {
    let mut codec = LdapCodec::default();
    let mut buf = BytesMut::new();
    assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
}

#[tokio::test]
async fn test_read_element_over_split_writes() {
    let bytes = Element::sequence(vec![Element::integer(7), unbind_request()]).to_bytes();
    let (mut tx, mut rx) = tokio::io::duplex(4);
    let writer = tokio::spawn(async move {
        use tokio::io::AsyncWriteExt;
        for chunk in bytes.chunks(3) {
            tx.write_all(chunk).await.unwrap();
        }
    });
    let raw = read_element(&mut rx, 1024).await.unwrap();
    writer.await.unwrap();

    let message = LdapMessage::decode(Element::decode(&raw).unwrap()).unwrap();
    assert_eq!(message.message_id, 7);
}

#[tokio::test]
async fn test_read_element_closed_early() {
    let bytes = Element::octet_string("abcdef").to_bytes();
    let mut reader = &bytes[..3];
    assert!(matches!(
        read_element(&mut reader, 1024).await,
        Err(ProtocolError::ConnectionClosed)
    ));
}

// ============================================================================
// ENVELOPE EDGE CASES
// ============================================================================

#[test]
fn test_message_id_bounds() {
    let max = Element::sequence(vec![Element::integer(i64::from(i32::MAX)), unbind_request()]);
    assert_eq!(LdapMessage::decode(max).unwrap().message_id, i32::MAX);

    let zero = Element::sequence(vec![Element::integer(0), unbind_request()]);
    assert_eq!(LdapMessage::decode(zero).unwrap().message_id, 0);

    let overflow = Element::sequence(vec![
        Element::integer(i64::from(i32::MAX) + 1),
        unbind_request(),
    ]);
    assert!(LdapMessage::decode(overflow).is_err());
}

#[test]
fn test_controls_element_must_be_tagged() {
    let message = Element::sequence(vec![
        Element::integer(1),
        unbind_request(),
        Element::sequence(Vec::new()),
    ]);
    assert!(LdapMessage::decode(message).is_err());
}

// ============================================================================
// DN EDGE CASES
// ============================================================================

#[test]
fn test_dn_hex_and_quoted_values() {
    let hex = Dn::parse(r"cn=Lu\C4\8Di\C4\87,dc=example").unwrap();
    assert_eq!(hex.rdn().unwrap().get("cn"), Some("Lučić"));

    let quoted = Dn::parse(r#"o="Sue, Grabbit and Runn",c=GB"#).unwrap();
    assert_eq!(quoted.rdn().unwrap().get("o"), Some("Sue, Grabbit and Runn"));
    assert_eq!(quoted.to_string(), r"o=Sue\, Grabbit and Runn,c=GB");
}

#[test]
fn test_dn_whitespace_around_separators() {
    let spaced = Dn::parse(" CN = Steve Kille , O=Isode Limited ,C=GB ").unwrap();
    assert_eq!(spaced, Dn::parse("cn=Steve Kille,o=Isode Limited,c=GB").unwrap());
}

#[test]
fn test_dn_syntax_errors() {
    for input in [r"cn=trailing\", r#"cn="open"#, "cn", "=value", r"cn=\FF", "cn=a,,dc=b"] {
        let err = Dn::parse(input).unwrap_err();
        assert_eq!(err.code, ResultCode::InvalidDnSyntax, "input {input:?}");
    }
}

#[test]
fn test_dn_leading_and_trailing_spaces_survive_escaping() {
    let dn = Dn::parse(r"cn=\ padded\ ,dc=example").unwrap();
    assert_eq!(dn.rdn().unwrap().get("cn"), Some(" padded "));
    assert_eq!(Dn::parse(&dn.to_string()).unwrap(), dn);
}

// ============================================================================
// FILTER EDGE CASES
// ============================================================================

#[test]
fn test_filter_with_unexpected_class() {
    let universal = Element::sequence(Vec::new());
    assert!(Filter::parse(&universal, None).is_err());
}

#[test]
fn test_empty_connectives_fold() {
    let and = Element::constructed(Tag::context(0, true), Vec::new());
    let or = Element::constructed(Tag::context(1, true), Vec::new());
    assert_eq!(Filter::parse(&and, None).unwrap(), Filter::True);
    assert_eq!(Filter::parse(&or, None).unwrap(), Filter::False);
}

#[test]
fn test_extensible_match_is_undefined() {
    let extensible = Element::constructed(
        Tag::context(9, true),
        vec![Element::primitive(Tag::context(3, false), b"cn".to_vec())],
    );
    let filter = Filter::parse(&extensible, None).unwrap();
    let mut record = Attributes::new();
    record.insert("cn".into(), vec!["x".into()]);
    assert!(!filter.matches(&record));

    let negated = Element::constructed(Tag::context(2, true), vec![extensible]);
    assert!(!Filter::parse(&negated, None).unwrap().matches(&record));
}

#[test]
fn test_present_object_class_ignores_case() {
    let present = Element::primitive(Tag::context(7, false), b"OBJECTCLASS".to_vec());
    assert_eq!(Filter::parse(&present, None).unwrap(), Filter::True);
}
