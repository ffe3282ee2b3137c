//! # Distinguished Names
//!
//! A [`Dn`] is an ordered list of [`Rdn`] components, most specific first:
//! `cn=Steve Kille,o=Isode Limited,c=GB` holds `cn` at index 0 and `c` last.
//! Each component maps case-folded attribute names to case-sensitive values,
//! so a multi-valued component such as `ou=Sales+cn=J. Smith` is a single
//! entry with two keys.
//!
//! Parsing unescapes `\XX` hex pairs and `\c` escapes and drops whitespace
//! around separators. Rendering escapes a leading `#` or space, a trailing
//! space, and any of `,+"\<>;`, so `parse(render(dn)) == dn` for every
//! parsed DN.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::protocol::result::{LdapError, LdapResult, ResultCode};

/// Prefix that marks a pattern value as a named capture
pub const WILDCARD_PREFIX: char = ':';

const ESCAPED: &[char] = &[',', '+', '"', '\\', '<', '>', ';'];

/// One component of a DN; several attribute/value pairs when multi-valued
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rdn {
    pairs: BTreeMap<String, String>,
}

impl Rdn {
    pub fn new(attr: &str, value: impl Into<String>) -> Self {
        Self::default().with(attr, value)
    }

    /// Add another attribute to a compound component
    pub fn with(mut self, attr: &str, value: impl Into<String>) -> Self {
        self.pairs.insert(attr.trim().to_ascii_lowercase(), value.into());
        self
    }

    pub fn get(&self, attr: &str) -> Option<&str> {
        self.pairs
            .get(&attr.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Same attribute names, values ignored
    pub fn same_format(&self, other: &Rdn) -> bool {
        self.pairs.keys().eq(other.pairs.keys())
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (attr, value)) in self.pairs.iter().enumerate() {
            if i > 0 {
                f.write_str("+")?;
            }
            write!(f, "{attr}=")?;
            write_escaped(f, value)?;
        }
        Ok(())
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    let count = value.chars().count();
    for (i, c) in value.chars().enumerate() {
        let leading = i == 0 && (c == '#' || c == ' ');
        let trailing = i + 1 == count && c == ' ';
        if leading || trailing || ESCAPED.contains(&c) {
            write!(f, "\\{c}")?;
        } else if c == '\0' {
            f.write_str("\\00")?;
        } else {
            write!(f, "{c}")?;
        }
    }
    Ok(())
}

/// A parsed distinguished name, leaf first
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Dn {
    rdns: Vec<Rdn>,
}

fn invalid(dn: &str, reason: &str) -> LdapError {
    LdapError::new(ResultCode::InvalidDnSyntax, format!("{reason} in DN {dn:?}"))
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

impl Dn {
    /// The zero-length DN naming the root entry
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_rdns(rdns: Vec<Rdn>) -> Self {
        Self { rdns }
    }

    pub fn parse(input: &str) -> LdapResult<Dn> {
        let bytes = input.as_bytes();
        let mut rdns = Vec::new();
        let mut current = Rdn::default();
        let mut pos = 0;

        if input.trim().is_empty() {
            return Ok(Dn::root());
        }

        loop {
            // attribute type
            let start = pos;
            while pos < bytes.len() && bytes[pos] != b'=' {
                if matches!(bytes[pos], b',' | b'+' | b'\\') {
                    return Err(invalid(input, "attribute type without value"));
                }
                pos += 1;
            }
            if pos >= bytes.len() {
                return Err(invalid(input, "missing '='"));
            }
            let attr = input[start..pos].trim();
            if attr.is_empty() {
                return Err(invalid(input, "empty attribute type"));
            }
            pos += 1;

            // attribute value
            while pos < bytes.len() && bytes[pos] == b' ' {
                pos += 1;
            }
            let mut value = Vec::new();
            let mut significant = 0;
            let mut quoted = false;
            if pos < bytes.len() && bytes[pos] == b'"' {
                quoted = true;
                pos += 1;
            }
            while pos < bytes.len() {
                let b = bytes[pos];
                if quoted && b == b'"' {
                    quoted = false;
                    pos += 1;
                    significant = value.len();
                    continue;
                }
                if !quoted && (b == b',' || b == b'+') {
                    break;
                }
                if b == b'\\' {
                    let hi = bytes.get(pos + 1).copied().and_then(hex_value);
                    let lo = bytes.get(pos + 2).copied().and_then(hex_value);
                    match (hi, lo) {
                        (Some(hi), Some(lo)) => {
                            value.push(hi << 4 | lo);
                            pos += 3;
                        }
                        _ => {
                            let Some(next) = input[pos + 1..].chars().next() else {
                                return Err(invalid(input, "trailing backslash"));
                            };
                            let mut buf = [0u8; 4];
                            value.extend_from_slice(next.encode_utf8(&mut buf).as_bytes());
                            pos += 1 + next.len_utf8();
                        }
                    }
                    significant = value.len();
                    continue;
                }
                value.push(b);
                if b != b' ' || quoted {
                    significant = value.len();
                }
                pos += 1;
            }
            if quoted {
                return Err(invalid(input, "unterminated quoted value"));
            }
            value.truncate(significant);
            let value =
                String::from_utf8(value).map_err(|_| invalid(input, "value is not UTF-8"))?;
            current = current.with(attr, value);

            match bytes.get(pos) {
                None => {
                    rdns.push(current);
                    break;
                }
                Some(b'+') => {
                    pos += 1;
                }
                Some(_) => {
                    rdns.push(std::mem::take(&mut current));
                    pos += 1;
                }
            }
        }

        Ok(Dn { rdns })
    }

    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rdn> {
        self.rdns.iter()
    }

    pub fn len(&self) -> usize {
        self.rdns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rdns.is_empty()
    }

    /// The leaf component
    pub fn rdn(&self) -> Option<&Rdn> {
        self.rdns.first()
    }

    /// The DN with its leaf component removed
    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.is_empty() {
            return None;
        }
        Some(Dn {
            rdns: self.rdns[1..].to_vec(),
        })
    }

    /// A new DN with `rdn` prepended as the leaf
    pub fn child(&self, rdn: Rdn) -> Dn {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(rdn);
        rdns.extend(self.rdns.iter().cloned());
        Dn { rdns }
    }

    /// Value of the first occurrence of `attr`, leaf first
    pub fn find_first(&self, attr: &str) -> Option<&str> {
        self.rdns.iter().find_map(|rdn| rdn.get(attr))
    }

    /// Value of the last occurrence of `attr`, leaf first
    pub fn find_last(&self, attr: &str) -> Option<&str> {
        self.rdns.iter().rev().find_map(|rdn| rdn.get(attr))
    }

    /// Every value of `attr`, leaf first
    pub fn find(&self, attr: &str) -> Vec<&str> {
        self.rdns.iter().filter_map(|rdn| rdn.get(attr)).collect()
    }

    /// Value of the `n`th occurrence of `attr` (0 is closest to the leaf)
    pub fn find_nth(&self, attr: &str, n: usize) -> Option<&str> {
        self.rdns.iter().filter_map(|rdn| rdn.get(attr)).nth(n)
    }

    pub fn starts_with(&self, prefix: &Dn) -> bool {
        prefix.len() <= self.len() && self.rdns[..prefix.len()] == prefix.rdns[..]
    }

    pub fn ends_with(&self, suffix: &Dn) -> bool {
        suffix.len() <= self.len() && self.rdns[self.len() - suffix.len()..] == suffix.rdns[..]
    }

    pub fn starts_with_format(&self, prefix: &Dn) -> bool {
        prefix.len() <= self.len()
            && self
                .rdns
                .iter()
                .zip(&prefix.rdns)
                .all(|(a, b)| a.same_format(b))
    }

    pub fn ends_with_format(&self, suffix: &Dn) -> bool {
        suffix.len() <= self.len()
            && self.rdns[self.len() - suffix.len()..]
                .iter()
                .zip(&suffix.rdns)
                .all(|(a, b)| a.same_format(b))
    }

    /// Same attribute shape at every position, values ignored
    pub fn equals_format(&self, other: &Dn) -> bool {
        self.len() == other.len() && self.starts_with_format(other)
    }

    /// True if `needle` appears as a contiguous run of components
    pub fn contains(&self, needle: &Dn) -> bool {
        needle.is_empty()
            || self
                .rdns
                .windows(needle.len())
                .any(|window| window == &needle.rdns[..])
    }

    pub fn contains_format(&self, needle: &Dn) -> bool {
        needle.is_empty()
            || self.rdns.windows(needle.len()).any(|window| {
                window
                    .iter()
                    .zip(&needle.rdns)
                    .all(|(a, b)| a.same_format(b))
            })
    }

    /// Bind the `:name` values of `pattern` against this DN.
    ///
    /// The pattern must have the same shape and its literal values must
    /// match exactly; otherwise `None`. When a name repeats, the binding
    /// closest to the root wins.
    pub fn captures(&self, pattern: &Dn) -> Option<HashMap<String, String>> {
        if !self.equals_format(pattern) {
            return None;
        }
        let mut bindings = HashMap::new();
        for (actual, wanted) in self.rdns.iter().zip(&pattern.rdns).rev() {
            for (attr, value) in wanted.iter() {
                let got = actual.get(attr)?;
                match value.strip_prefix(WILDCARD_PREFIX) {
                    Some(name) => {
                        bindings
                            .entry(name.to_string())
                            .or_insert_with(|| got.to_string());
                    }
                    None if value == got => {}
                    None => return None,
                }
            }
        }
        Some(bindings)
    }
}

impl FromStr for Dn {
    type Err = LdapError;

    fn from_str(s: &str) -> LdapResult<Dn> {
        Dn::parse(s)
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rdn) in self.rdns.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{rdn}")?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Dn {
    type Item = &'a Rdn;
    type IntoIter = std::slice::Iter<'a, Rdn>;

    fn into_iter(self) -> Self::IntoIter {
        self.rdns.iter()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    fn kille() -> Dn {
        dn("cn=Steve Kille,o=Isode Limited,o=Companies,c=GB")
    }

    #[test]
    fn test_parse_rfc_examples() {
        let d = dn("CN=Steve Kille , O=Isode Limited,C=GB");
        assert_eq!(d.len(), 3);
        assert_eq!(d.rdns()[0].get("cn"), Some("Steve Kille"));
        assert_eq!(d.rdns()[2].get("C"), Some("GB"));

        let d = dn("OU=Sales+CN=J. Smith,O=Widget Inc.,C=US");
        assert_eq!(d.rdns()[0].len(), 2);
        assert_eq!(d.rdns()[0].get("ou"), Some("Sales"));
        assert_eq!(d.rdns()[0].get("cn"), Some("J. Smith"));

        let d = dn("CN=L. Eagle,O=Sue\\, Grabbit and Runn,C=GB");
        assert_eq!(d.rdns()[1].get("o"), Some("Sue, Grabbit and Runn"));

        let d = dn("CN=Before\\0DAfter,O=Test,C=GB");
        assert_eq!(d.rdns()[0].get("cn"), Some("Before\rAfter"));

        let d = dn("SN=Lu\\C4\\8Di\\C4\\87");
        assert_eq!(d.rdns()[0].get("sn"), Some("Lu\u{10d}i\u{107}"));
    }

    #[test]
    fn test_render_escapes() {
        let d = Dn::from_rdns(vec![
            Rdn::new("cn", "L. Eagle"),
            Rdn::new("o", "Sue, Grabbit and Runn"),
            Rdn::new("c", "GB"),
        ]);
        assert_eq!(d.to_string(), "cn=L. Eagle,o=Sue\\, Grabbit and Runn,c=GB");

        let d = Dn::from_rdns(vec![Rdn::new("cn", "#lead and trail ")]);
        assert_eq!(d.to_string(), "cn=\\#lead and trail\\ ");
        assert_eq!(dn(&d.to_string()), d);

        let d = Dn::from_rdns(vec![Rdn::new("cn", " ")]);
        assert_eq!(dn(&d.to_string()), d);
    }

    #[test]
    fn test_parse_errors() {
        assert!(Dn::parse("cn").is_err());
        assert!(Dn::parse("=value").is_err());
        assert!(Dn::parse("cn=a\\").is_err());
        assert!(Dn::parse("cn=\"open").is_err());
        assert_eq!(
            Dn::parse("cn").unwrap_err().code,
            ResultCode::InvalidDnSyntax
        );
    }

    #[test]
    fn test_root_dn() {
        assert!(dn("").is_empty());
        assert!(dn("   ").is_empty());
        assert_eq!(Dn::root().to_string(), "");
    }

    #[test]
    fn test_find_family() {
        let d = kille();
        assert_eq!(d.find_first("ou"), None);
        assert_eq!(d.find_first("cn"), Some("Steve Kille"));
        assert_eq!(d.find_first("o"), Some("Isode Limited"));
        assert_eq!(d.find_last("o"), Some("Companies"));
        assert_eq!(d.find("o"), vec!["Isode Limited", "Companies"]);
        assert!(d.find("ou").is_empty());
        assert_eq!(d.find_nth("o", 1), Some("Companies"));
        assert_eq!(d.find_nth("o", 2), None);
        assert_eq!(d.find_nth("cn", 1), None);
    }

    #[test]
    fn test_prefix_and_suffix() {
        let d = kille();
        assert!(d.starts_with(&dn("cn=Steve Kille")));
        assert!(d.starts_with(&dn("cn=Steve Kille, o=Isode Limited")));
        assert!(!d.starts_with(&dn("cn=John Doe")));
        assert!(d.ends_with(&dn("c=GB")));
        assert!(d.ends_with(&dn("o=Companies, c=GB")));
        assert!(!d.ends_with(&dn("c=BE")));

        assert!(d.starts_with_format(&dn("cn=foo, o=bar")));
        assert!(!d.starts_with_format(&dn("c=GB")));
        assert!(d.ends_with_format(&dn("o=foo, c=bar")));
        assert!(!d.ends_with_format(&dn("cn=foo")));
    }

    #[test]
    fn test_equality() {
        let d = kille();
        assert_eq!(d, dn("CN=Steve Kille,     o=Isode Limited,O=Companies,c=GB"));
        assert_ne!(d, dn("cn=John Doe,o=Isode Limited,o=Companies,c=GB"));
        assert_ne!(d, dn("cn=STEVE KILLE,o=Isode Limited,o=Companies,c=GB"));

        assert!(d.equals_format(&dn("CN=foo,O=bar,O=baz,C=bat")));
        assert!(!d.equals_format(&dn("cn=foo,o=Isode Limited,c=GB")));
    }

    #[test]
    fn test_contains() {
        let d = kille();
        assert!(d.contains(&kille()));
        assert!(d.contains(&dn("o=Isode Limited,o=Companies")));
        assert!(d.contains(&dn("c=GB")));
        assert!(!d.contains(&dn("cn=Steve Kille,o=Isode Limited,c=GB")));

        assert!(d.contains_format(&dn("o=bar,o=baz")));
        assert!(!d.contains_format(&dn("cn=foo,o=bar,c=bat")));
        assert!(!d.contains_format(&dn("cn=bar,c=bat")));
    }

    #[test]
    fn test_captures() {
        let d = kille();
        let caps = d
            .captures(&dn("cn=:cn,o=:company,o=Companies,c=:country"))
            .unwrap();
        assert_eq!(caps["cn"], "Steve Kille");
        assert_eq!(caps["company"], "Isode Limited");
        assert_eq!(caps["country"], "GB");

        let caps = d
            .captures(&dn("cn=:cn,o=:company,o=:company,c=:country"))
            .unwrap();
        assert_eq!(caps["company"], "Companies");

        assert!(d.captures(&kille()).unwrap().is_empty());
        assert!(d.captures(&dn("cn=:cn,o=Foo,o=Companies,c=GB")).is_none());
        assert!(d.captures(&dn("o=Companies,c=GB")).is_none());
    }

    #[test]
    fn test_parent_and_child() {
        let d = kille();
        let parent = d.parent().unwrap();
        assert_eq!(parent, dn("o=Isode Limited,o=Companies,c=GB"));
        assert_eq!(parent.child(Rdn::new("CN", "Steve Kille")), d);
        assert!(Dn::root().parent().is_none());
    }
}
