// test-only module included via protocol/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use crate::core::ber::{Element, Tag, TagClass};
use crate::error::ProtocolError;
use crate::protocol::dn::{Dn, Rdn};
use crate::protocol::filter::{Attributes, Filter};
use crate::protocol::message::*;
use crate::protocol::result::ResultCode;

fn dn(s: &str) -> Dn {
    Dn::parse(s).unwrap()
}

fn envelope(children: Vec<Element>) -> Element {
    Element::sequence(children)
}

fn equality(attr: &str, value: &str) -> Element {
    Element::constructed(
        Tag::context(3, true),
        vec![Element::octet_string(attr), Element::octet_string(value)],
    )
}

#[test]
fn test_envelope_roundtrip_with_controls() {
    let mut message = LdapMessage::new(42, unbind_request());
    message.controls.push(Control {
        oid: "1.2.840.113556.1.4.319".into(),
        critical: true,
        value: Some(vec![0x30, 0x00]),
    });

    let bytes = message.to_element().to_bytes();
    let decoded = LdapMessage::decode(Element::decode(&bytes).unwrap()).unwrap();
    assert_eq!(decoded, message);
    assert_eq!(decoded.op_tag(), tags::UNBIND_REQUEST);
}

#[test]
fn test_envelope_must_be_sequence() {
    let err = LdapMessage::decode(Element::octet_string("nope")).unwrap_err();
    assert!(matches!(err, ProtocolError::Malformed(_)));
}

#[test]
fn test_envelope_rejects_bad_message_id() {
    let negative = envelope(vec![Element::integer(-1), unbind_request()]);
    assert!(matches!(
        LdapMessage::decode(negative),
        Err(ProtocolError::Malformed(_))
    ));

    let wrong_type = envelope(vec![Element::octet_string("1"), unbind_request()]);
    assert!(matches!(
        LdapMessage::decode(wrong_type),
        Err(ProtocolError::Malformed(_))
    ));
}

#[test]
fn test_envelope_requires_application_op() {
    let message = envelope(vec![Element::integer(1), Element::null()]);
    assert!(matches!(
        LdapMessage::decode(message),
        Err(ProtocolError::Malformed(_))
    ));

    let missing = envelope(vec![Element::integer(1)]);
    assert!(LdapMessage::decode(missing).is_err());
}

#[test]
fn test_bind_request_simple() {
    let op = BindRequest::simple("uid=admin,ou=Users,dc=example,dc=com", b"secret").to_element();
    let request = BindRequest::decode(&op).unwrap();
    assert_eq!(request.version, 3);
    assert_eq!(request.name, "uid=admin,ou=Users,dc=example,dc=com");
    assert_eq!(request.auth, BindAuth::Simple(b"secret".to_vec()));
}

#[test]
fn test_bind_request_sasl() {
    let request = BindRequest {
        version: 3,
        name: String::new(),
        auth: BindAuth::Sasl {
            mechanism: "EXTERNAL".into(),
            credentials: None,
        },
    };
    let decoded = BindRequest::decode(&request.to_element()).unwrap();
    assert_eq!(decoded, request);
}

#[test]
fn test_bind_request_bad_auth_choice() {
    let op = Element::constructed(
        Tag::application(tags::BIND_REQUEST, true),
        vec![
            Element::integer(3),
            Element::octet_string(""),
            Element::primitive(Tag::context(1, false), b"x".to_vec()),
        ],
    );
    assert!(matches!(
        BindRequest::decode(&op),
        Err(ProtocolError::Malformed(_))
    ));
}

#[test]
fn test_search_request_decode() {
    let op = Element::constructed(
        Tag::application(tags::SEARCH_REQUEST, true),
        vec![
            Element::octet_string("dc=example,dc=com"),
            Element::enumerated(2),
            Element::enumerated(0),
            Element::integer(10),
            Element::integer(5),
            Element::boolean(false),
            equality("uid", "alice"),
            Element::sequence(vec![Element::octet_string("cn"), Element::octet_string("mail")]),
        ],
    );
    let request = SearchRequest::decode(&op, None).unwrap();
    assert_eq!(request.base, dn("dc=example,dc=com"));
    assert_eq!(request.scope, SearchScope::WholeSubtree);
    assert_eq!(request.deref, DerefAliases::Never);
    assert_eq!(request.size_limit, 10);
    assert_eq!(request.time_limit, 5);
    assert_eq!(request.attributes, vec!["cn", "mail"]);

    let mut record = Attributes::new();
    record.insert("uid".into(), vec!["alice".into()]);
    assert!(request.filter.matches(&record));
}

#[test]
fn test_search_request_bad_scope_is_protocol_error() {
    let mut request = SearchRequest::subtree(dn("dc=example,dc=com")).to_element();
    if let crate::core::ber::Value::Constructed(children) = &mut request.value {
        children[1] = Element::enumerated(7);
    }
    let err = SearchRequest::decode(&request, None).unwrap_err();
    assert_eq!(err.code, ResultCode::ProtocolError);
}

#[test]
fn test_search_request_bad_base_dn() {
    let mut request = SearchRequest::subtree(Dn::root()).to_element();
    if let crate::core::ber::Value::Constructed(children) = &mut request.value {
        children[0] = Element::octet_string("not a dn");
    }
    let err = SearchRequest::decode(&request, None).unwrap_err();
    assert_eq!(err.code, ResultCode::InvalidDnSyntax);
}

#[test]
fn test_search_request_roundtrip() {
    let mut request = SearchRequest::subtree(dn("ou=Users,dc=example,dc=com"));
    request.attributes = vec!["1.1".into()];
    request.types_only = true;
    let decoded = SearchRequest::decode(&request.to_element(), None).unwrap();
    assert_eq!(decoded.base, request.base);
    assert!(decoded.types_only);
    assert_eq!(decoded.filter, Filter::True);
}

#[test]
fn test_modify_request_roundtrip() {
    let request = ModifyRequest {
        dn: dn("uid=alice,ou=Users,dc=example,dc=com"),
        changes: vec![
            Modification {
                operation: ModifyOperation::Replace,
                attr: "mail".into(),
                values: vec!["alice@example.org".into()],
            },
            Modification {
                operation: ModifyOperation::Delete,
                attr: "telephoneNumber".into(),
                values: Vec::new(),
            },
        ],
    };
    assert_eq!(ModifyRequest::decode(&request.to_element()).unwrap(), request);
}

#[test]
fn test_add_request_rejects_duplicate_attribute() {
    let attr = |name: &str| {
        Element::sequence(vec![
            Element::octet_string(name),
            Element::set(vec![Element::octet_string("x")]),
        ])
    };
    let op = Element::constructed(
        Tag::application(tags::ADD_REQUEST, true),
        vec![
            Element::octet_string("cn=dup,dc=example,dc=com"),
            Element::sequence(vec![attr("cn"), attr("CN")]),
        ],
    );
    let err = AddRequest::decode(&op).unwrap_err();
    assert_eq!(err.code, ResultCode::AttributeOrValueExists);
}

#[test]
fn test_delete_and_abandon_bodies() {
    let target = dn("uid=bob,ou=Users,dc=example,dc=com");
    assert_eq!(decode_delete(&delete_request(&target)).unwrap(), target);

    let abandon = abandon_request(17);
    assert!(abandon.has_tag(TagClass::Application, tags::ABANDON_REQUEST));
    assert_eq!(decode_abandon(&abandon).unwrap(), 17);
}

#[test]
fn test_modify_dn_new_dn() {
    let request = ModifyDnRequest {
        dn: dn("uid=bob,ou=Users,dc=example,dc=com"),
        new_rdn: Rdn::new("uid", "robert"),
        delete_old_rdn: true,
        new_superior: None,
    };
    let decoded = ModifyDnRequest::decode(&request.to_element()).unwrap();
    assert_eq!(decoded, request);
    assert_eq!(decoded.new_dn(), dn("uid=robert,ou=Users,dc=example,dc=com"));

    let moved = ModifyDnRequest {
        new_superior: Some(dn("ou=Staff,dc=example,dc=com")),
        ..request
    };
    let decoded = ModifyDnRequest::decode(&moved.to_element()).unwrap();
    assert_eq!(decoded.new_dn(), dn("uid=robert,ou=Staff,dc=example,dc=com"));
}

#[test]
fn test_modify_dn_rejects_multi_component_rdn() {
    let op = Element::constructed(
        Tag::application(tags::MODIFY_DN_REQUEST, true),
        vec![
            Element::octet_string("uid=bob,dc=example"),
            Element::octet_string("uid=a,ou=b"),
            Element::boolean(false),
        ],
    );
    let err = ModifyDnRequest::decode(&op).unwrap_err();
    assert_eq!(err.code, ResultCode::InvalidDnSyntax);
}

#[test]
fn test_compare_request_roundtrip() {
    let request = CompareRequest {
        dn: dn("uid=alice,dc=example,dc=com"),
        attr: "mail".into(),
        value: "alice@example.com".into(),
    };
    assert_eq!(CompareRequest::decode(&request.to_element()).unwrap(), request);
}

#[test]
fn test_binary_values_in_update_requests() {
    let photo: Vec<u8> = vec![0xff, 0xd8, 0xff, 0xe0];
    let op = Element::constructed(
        Tag::application(tags::ADD_REQUEST, true),
        vec![
            Element::octet_string("cn=alice,dc=example,dc=com"),
            Element::sequence(vec![Element::sequence(vec![
                Element::octet_string("jpegPhoto"),
                Element::set(vec![Element::octet_string(photo.clone())]),
            ])]),
        ],
    );
    let add = AddRequest::decode(&op).unwrap();
    assert_eq!(add.attributes["jpegPhoto"], vec![photo.clone()]);
    assert_eq!(AddRequest::decode(&add.to_element()).unwrap(), add);

    let compare = CompareRequest {
        dn: dn("cn=alice,dc=example,dc=com"),
        attr: "objectGUID".into(),
        value: vec![0x80, 0x01],
    };
    assert_eq!(CompareRequest::decode(&compare.to_element()).unwrap(), compare);

    let modify = ModifyRequest {
        dn: dn("cn=alice,dc=example,dc=com"),
        changes: vec![Modification {
            operation: ModifyOperation::Add,
            attr: "userCertificate".into(),
            values: vec![vec![0x30, 0x82, 0x00, 0xfe]],
        }],
    };
    assert_eq!(ModifyRequest::decode(&modify.to_element()).unwrap(), modify);
}

#[test]
fn test_extended_request_requires_name() {
    let op = Element::constructed(
        Tag::application(tags::EXTENDED_REQUEST, true),
        vec![Element::octet_string(oids::START_TLS)],
    );
    let err = ExtendedRequest::decode(&op).unwrap_err();
    assert_eq!(err.code, ResultCode::ProtocolError);

    let ok = ExtendedRequest::new(oids::WHO_AM_I).to_element();
    assert_eq!(ExtendedRequest::decode(&ok).unwrap().name, oids::WHO_AM_I);
}

#[test]
fn test_response_tags() {
    assert_eq!(response_tag(tags::BIND_REQUEST), Some(tags::BIND_RESPONSE));
    assert_eq!(response_tag(tags::SEARCH_REQUEST), Some(tags::SEARCH_RESULT_DONE));
    assert_eq!(response_tag(tags::COMPARE_REQUEST), Some(tags::COMPARE_RESPONSE));
    assert_eq!(response_tag(tags::UNBIND_REQUEST), None);
    assert_eq!(response_tag(tags::ABANDON_REQUEST), None);
}

#[test]
fn test_result_encoding() {
    let response = LdapResponse {
        code: ResultCode::NoSuchObject,
        matched_dn: "dc=example,dc=com".into(),
        message: "missing".into(),
    };
    let op = response.to_element(tags::DEL_RESPONSE, Vec::new());
    assert!(op.has_tag(TagClass::Application, tags::DEL_RESPONSE));
    assert_eq!(LdapResponse::decode(&op).unwrap(), response);
}

#[test]
fn test_search_entry_types_only() {
    let values = vec![b"Alice".to_vec()];
    let op = search_entry("cn=alice", [("cn", values.as_slice())], true);
    let (name, attrs) = decode_search_entry(&op).unwrap();
    assert_eq!(name, "cn=alice");
    assert!(attrs["cn"].is_empty());
}

#[test]
fn test_search_entry_carries_binary_values() {
    let photo: Vec<Vec<u8>> = vec![vec![0xff, 0xd8, 0xff, 0xe0]];
    let op = search_entry("cn=alice", [("jpegPhoto", photo.as_slice())], false);
    let (_, attrs) = decode_search_entry(&op).unwrap();
    assert_eq!(attrs["jpegPhoto"], photo);
}

#[test]
fn test_notice_of_disconnection() {
    let notice = notice_of_disconnection(ResultCode::ProtocolError, "bad message");
    let message = LdapMessage::decode(notice).unwrap();
    assert_eq!(message.message_id, 0);
    assert_eq!(message.op_tag(), tags::EXTENDED_RESPONSE);

    let result = LdapResponse::decode(&message.op).unwrap();
    assert_eq!(result.code, ResultCode::ProtocolError);
    assert_eq!(result.message, "bad message");

    let name = message.op.child(3).unwrap();
    assert!(name.has_tag(TagClass::Context, 10));
    assert_eq!(name.as_string().unwrap(), oids::NOTICE_OF_DISCONNECTION);
}
