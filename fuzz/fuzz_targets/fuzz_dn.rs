#![no_main]

use libfuzzer_sys::fuzz_target;
use ldap_protocol::protocol::dn::Dn;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    // Any DN that parses must survive a render/parse cycle unchanged
    if let Ok(dn) = Dn::parse(input) {
        let rendered = dn.to_string();
        assert_eq!(Dn::parse(&rendered).ok(), Some(dn));
    }
});
