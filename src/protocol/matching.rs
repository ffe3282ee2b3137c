//! # Matching Rules
//!
//! Per-attribute comparison strategies used by the filter engine.
//!
//! A rule normalizes values and declares which comparisons it supports.
//! The provided comparison methods apply the normalization to both sides and
//! report whether any stored value satisfies the assertion. A filter that
//! asks a rule for a comparison it does not support evaluates to undefined.
//!
//! ## Built-in rules
//! - `exactMatch`: identity normalization, all comparisons (the default)
//! - `caseIgnoreMatch` (2.5.13.2): equality, case-folded
//! - `caseExactIA5Match`: equality
//! - `caseIgnoreIA5Match`: equality, ASCII case-folded
//! - `caseExactIA5SubstringsMatch`: substrings
//! - `caseIgnoreIA5SubstringsMatch`: substrings, ASCII case-folded

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::protocol::result::{LdapError, LdapResult, ResultCode};

/// Which comparison a filter leaf requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchKind {
    Equality,
    Ordering,
    Substrings,
}

/// Initial, any and final fragments of a substrings assertion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubstringPattern {
    pub initial: Option<Vec<u8>>,
    pub any: Vec<Vec<u8>>,
    pub final_: Option<Vec<u8>>,
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}

impl SubstringPattern {
    /// True if `value` starts with `initial`, ends with `final_` (without the
    /// two overlapping), and contains each `any` fragment in order between
    /// them.
    pub fn matches(&self, value: impl AsRef<[u8]>) -> bool {
        let value = value.as_ref();
        let mut start = 0;
        let mut end = value.len();

        if let Some(initial) = &self.initial {
            if !value.starts_with(initial) {
                return false;
            }
            start = initial.len();
        }
        if let Some(final_) = &self.final_ {
            if value.len() < start + final_.len() || !value.ends_with(final_) {
                return false;
            }
            end = value.len() - final_.len();
        }

        let middle = &value[start..end];
        let mut pos = 0;
        for fragment in &self.any {
            match find_bytes(&middle[pos..], fragment) {
                Some(found) => pos += found + fragment.len(),
                None => return false,
            }
        }
        true
    }

    fn map(&self, f: impl Fn(&[u8]) -> Vec<u8>) -> SubstringPattern {
        SubstringPattern {
            initial: self.initial.as_deref().map(&f),
            any: self.any.iter().map(|s| f(s)).collect(),
            final_: self.final_.as_deref().map(&f),
        }
    }
}

/// Lowercased, whitespace-free form of a UTF-8 value; other values as-is
fn squash(value: &[u8]) -> Cow<'_, [u8]> {
    match std::str::from_utf8(value) {
        Ok(text) => Cow::Owned(
            text.chars()
                .filter(|c| !c.is_whitespace())
                .flat_map(char::to_lowercase)
                .collect::<String>()
                .into_bytes(),
        ),
        Err(_) => Cow::Borrowed(value),
    }
}

/// A comparison strategy for attribute values.
///
/// Values are octet strings. Rules that fold case only touch values that are
/// valid UTF-8; anything else compares byte for byte.
pub trait MatchingRule: Send + Sync {
    fn oid(&self) -> &str;

    fn name(&self) -> &str;

    fn supports(&self, kind: MatchKind) -> bool;

    /// Canonical form of a value for comparison
    fn normalize<'a>(&self, value: &'a [u8]) -> Cow<'a, [u8]> {
        Cow::Borrowed(value)
    }

    fn equals(&self, values: &[Vec<u8>], assertion: &[u8]) -> bool {
        let wanted = self.normalize(assertion);
        values.iter().any(|v| self.normalize(v) == wanted)
    }

    fn greater_or_equal(&self, values: &[Vec<u8>], assertion: &[u8]) -> bool {
        let bound = self.normalize(assertion);
        values.iter().any(|v| self.normalize(v) >= bound)
    }

    fn less_or_equal(&self, values: &[Vec<u8>], assertion: &[u8]) -> bool {
        let bound = self.normalize(assertion);
        values.iter().any(|v| self.normalize(v) <= bound)
    }

    fn substrings(&self, values: &[Vec<u8>], pattern: &SubstringPattern) -> bool {
        let pattern = pattern.map(|s| self.normalize(s).into_owned());
        values.iter().any(|v| pattern.matches(self.normalize(v)))
    }

    /// Case- and whitespace-insensitive equality
    fn approx(&self, values: &[Vec<u8>], assertion: &[u8]) -> bool {
        let wanted = squash(assertion);
        values.iter().any(|v| squash(v) == wanted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fold {
    None,
    Unicode,
    Ascii,
}

/// Table-driven rule used for the built-in set
#[derive(Debug, Clone, Copy)]
pub struct BuiltinRule {
    oid: &'static str,
    name: &'static str,
    kinds: &'static [MatchKind],
    fold: Fold,
}

impl MatchingRule for BuiltinRule {
    fn oid(&self) -> &str {
        self.oid
    }

    fn name(&self) -> &str {
        self.name
    }

    fn supports(&self, kind: MatchKind) -> bool {
        self.kinds.contains(&kind)
    }

    fn normalize<'a>(&self, value: &'a [u8]) -> Cow<'a, [u8]> {
        match self.fold {
            Fold::None => Cow::Borrowed(value),
            Fold::Unicode => match std::str::from_utf8(value) {
                Ok(text) => Cow::Owned(text.to_lowercase().into_bytes()),
                Err(_) => Cow::Borrowed(value),
            },
            Fold::Ascii if value.iter().any(u8::is_ascii_uppercase) => {
                Cow::Owned(value.to_ascii_lowercase())
            }
            Fold::Ascii => Cow::Borrowed(value),
        }
    }
}

const ALL_KINDS: &[MatchKind] = &[MatchKind::Equality, MatchKind::Ordering, MatchKind::Substrings];

pub const EXACT_MATCH: BuiltinRule = BuiltinRule {
    oid: "2.5.13.5",
    name: "exactMatch",
    kinds: ALL_KINDS,
    fold: Fold::None,
};

pub const CASE_IGNORE_MATCH: BuiltinRule = BuiltinRule {
    oid: "2.5.13.2",
    name: "caseIgnoreMatch",
    kinds: &[MatchKind::Equality],
    fold: Fold::Unicode,
};

pub const CASE_EXACT_IA5_MATCH: BuiltinRule = BuiltinRule {
    oid: "1.3.6.1.4.1.1466.109.114.1",
    name: "caseExactIA5Match",
    kinds: &[MatchKind::Equality],
    fold: Fold::None,
};

pub const CASE_IGNORE_IA5_MATCH: BuiltinRule = BuiltinRule {
    oid: "1.3.6.1.4.1.1466.109.114.2",
    name: "caseIgnoreIA5Match",
    kinds: &[MatchKind::Equality],
    fold: Fold::Ascii,
};

pub const CASE_EXACT_IA5_SUBSTRINGS_MATCH: BuiltinRule = BuiltinRule {
    oid: "1.3.6.1.4.1.4203.1.2.1",
    name: "caseExactIA5SubstringsMatch",
    kinds: &[MatchKind::Substrings],
    fold: Fold::None,
};

pub const CASE_IGNORE_IA5_SUBSTRINGS_MATCH: BuiltinRule = BuiltinRule {
    oid: "1.3.6.1.4.1.1466.109.114.3",
    name: "caseIgnoreIA5SubstringsMatch",
    kinds: &[MatchKind::Substrings],
    fold: Fold::Ascii,
};

const BUILTINS: [BuiltinRule; 6] = [
    EXACT_MATCH,
    CASE_IGNORE_MATCH,
    CASE_EXACT_IA5_MATCH,
    CASE_IGNORE_IA5_MATCH,
    CASE_EXACT_IA5_SUBSTRINGS_MATCH,
    CASE_IGNORE_IA5_SUBSTRINGS_MATCH,
];

/// Shared handle to a matching rule, compared by OID
#[derive(Clone)]
pub struct Rule(Arc<dyn MatchingRule>);

impl Rule {
    pub fn new(rule: impl MatchingRule + 'static) -> Self {
        Rule(Arc::new(rule))
    }

    pub fn exact() -> Self {
        Rule::new(EXACT_MATCH)
    }
}

impl Default for Rule {
    fn default() -> Self {
        Rule::exact()
    }
}

impl Deref for Rule {
    type Target = dyn MatchingRule;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rule({})", self.0.name())
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.0.oid() == other.0.oid()
    }
}

impl Eq for Rule {}

/// Registry of known rules and per-attribute assignments.
///
/// Built before the server starts and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct MatchingRules {
    by_key: HashMap<String, Rule>,
    assigned: HashMap<(String, MatchKind), Rule>,
    default: Rule,
}

impl Default for MatchingRules {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchingRules {
    /// Registry holding the built-in rules and no assignments
    pub fn new() -> Self {
        let mut rules = Self {
            by_key: HashMap::new(),
            assigned: HashMap::new(),
            default: Rule::exact(),
        };
        for rule in BUILTINS {
            rules.register(Rule::new(rule));
        }
        rules
    }

    /// Index `rule` by OID and by lowercased name
    pub fn register(&mut self, rule: Rule) {
        self.by_key.insert(rule.oid().to_string(), rule.clone());
        self.by_key.insert(rule.name().to_ascii_lowercase(), rule);
    }

    /// Look up a rule by OID or (case-insensitive) name
    pub fn find(&self, key: &str) -> Option<Rule> {
        self.by_key
            .get(key)
            .or_else(|| self.by_key.get(&key.to_ascii_lowercase()))
            .cloned()
    }

    /// Use rule `key` for `kind` comparisons on `attr`
    pub fn assign(&mut self, attr: &str, kind: MatchKind, key: &str) -> LdapResult<&mut Self> {
        let rule = self.find(key).ok_or_else(|| {
            LdapError::new(ResultCode::InappropriateMatching, format!("unknown matching rule {key}"))
        })?;
        if !rule.supports(kind) {
            return Err(LdapError::new(
                ResultCode::InappropriateMatching,
                format!("{} does not support {kind:?}", rule.name()),
            ));
        }
        self.assigned.insert((attr.to_ascii_lowercase(), kind), rule);
        Ok(self)
    }

    /// Rule for `kind` comparisons on `attr`, falling back to the default
    pub fn rule_for(&self, attr: &str, kind: MatchKind) -> Rule {
        self.assigned
            .get(&(attr.to_ascii_lowercase(), kind))
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}
