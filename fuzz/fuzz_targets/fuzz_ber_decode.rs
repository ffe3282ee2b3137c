#![no_main]

use libfuzzer_sys::fuzz_target;
use ldap_protocol::core::ber::Element;
use ldap_protocol::protocol::message::{LdapMessage, SearchRequest};

fuzz_target!(|data: &[u8]| {
    // Envelope and SearchRequest decoding must reject garbage without panicking
    let Ok(element) = Element::decode(data) else {
        return;
    };
    assert_eq!(element.to_bytes().len(), element.encoded_len());
    if let Ok(message) = LdapMessage::decode(element) {
        let _ = SearchRequest::decode(&message.op, None);
    }
});
