//! The root information entry answered for base-scope searches of the
//! zero-length DN.

use crate::config::{RootConfig, LDAP_VERSION};
use crate::protocol::filter::Attributes;
use crate::protocol::message::oids;

fn values<S: AsRef<str>>(items: &[S]) -> Vec<Vec<u8>> {
    items.iter().map(|s| s.as_ref().as_bytes().to_vec()).collect()
}

/// Build the root entry's attributes.
///
/// `start_tls` advertises the StartTLS extension; Who-am-I is always listed.
pub fn root_dse(config: &RootConfig, start_tls: bool) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert(
        "objectClass".into(),
        values(&["top", "extensibleObject"]),
    );
    attrs.insert("supportedLDAPVersion".into(), values(&[LDAP_VERSION.to_string()]));

    if !config.naming_contexts.is_empty() {
        attrs.insert("namingContexts".into(), values(&config.naming_contexts));
    }
    if let Some(subschema) = &config.subschema_subentry {
        attrs.insert("subschemaSubentry".into(), values(&[subschema]));
    }

    let extensions: &[&str] = if start_tls {
        &[oids::START_TLS, oids::WHO_AM_I]
    } else {
        &[oids::WHO_AM_I]
    };
    attrs.insert("supportedExtension".into(), values(extensions));

    if !config.supported_controls.is_empty() {
        attrs.insert("supportedControl".into(), values(&config.supported_controls));
    }
    attrs.insert("vendorName".into(), values(&[&config.vendor_name]));
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_root_entry() {
        let attrs = root_dse(&RootConfig::default(), false);
        assert_eq!(attrs["supportedLDAPVersion"], values(&["3"]));
        assert_eq!(attrs["objectClass"], values(&["top", "extensibleObject"]));
        assert_eq!(attrs["supportedExtension"], values(&[oids::WHO_AM_I]));
        assert!(!attrs.contains_key("namingContexts"));
        assert!(!attrs.contains_key("subschemaSubentry"));
    }

    #[test]
    fn test_configured_root_entry() {
        let config = RootConfig {
            naming_contexts: vec!["dc=example,dc=com".into()],
            subschema_subentry: Some("cn=Subschema".into()),
            vendor_name: "Example".into(),
            supported_controls: vec!["1.2.840.113556.1.4.319".into()],
        };
        let attrs = root_dse(&config, true);
        assert_eq!(attrs["namingContexts"], values(&["dc=example,dc=com"]));
        assert_eq!(attrs["subschemaSubentry"], values(&["cn=Subschema"]));
        assert_eq!(attrs["supportedExtension"][0], oids::START_TLS.as_bytes());
        assert_eq!(attrs["supportedControl"], values(&["1.2.840.113556.1.4.319"]));
        assert_eq!(attrs["vendorName"], values(&["Example"]));
    }
}
