#![no_main]

use libfuzzer_sys::fuzz_target;
use ldap_protocol::core::ber::Element;
use ldap_protocol::protocol::filter::{Attributes, Filter};

fuzz_target!(|data: &[u8]| {
    let Ok(element) = Element::decode(data) else {
        return;
    };
    if let Ok(filter) = Filter::parse(&element, None) {
        let mut record = Attributes::new();
        record.insert("cn".into(), vec!["fuzz".into()]);
        let _ = filter.matches(&record);
        let _ = Filter::parse(&filter.to_element(), None);
    }
});
