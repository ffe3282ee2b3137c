//! # Search Filters
//!
//! Parses the BER `Filter` CHOICE of a search request into a [`Filter`] tree
//! and evaluates it against an attribute record with three-valued logic
//! (RFC 4511 section 4.5.1.7).
//!
//! Parsing folds trivial branches: `(objectClass=*)` and
//! `(objectClass=top)` become [`Filter::True`], constant operands are removed
//! from AND/OR, an empty AND/OR collapses to its identity and a single
//! remaining operand replaces its parent. Attribute names are case-folded.
//!
//! Leaf comparisons go through the [`Rule`] resolved for the attribute. A
//! missing attribute is false, not undefined, so filters are deterministic
//! without a schema.

use std::collections::BTreeMap;
use std::fmt;

use crate::core::ber::{Element, Tag, TagClass};
use crate::error::{ProtocolError, Result};
use crate::protocol::matching::{MatchKind, MatchingRules, Rule, SubstringPattern};

/// An entry's attributes: name to ordered octet-string values
pub type Attributes = BTreeMap<String, Vec<Vec<u8>>>;

/// Values of `attr` in `record`, matching the name case-insensitively
pub fn values_of<'a>(record: &'a Attributes, attr: &str) -> Option<&'a [Vec<u8>]> {
    if let Some(values) = record.get(attr) {
        return Some(values);
    }
    record
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(attr))
        .map(|(_, values)| values.as_slice())
}

/// Result of evaluating a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ternary {
    True,
    False,
    Undefined,
}

impl Ternary {
    pub fn and(self, other: Ternary) -> Ternary {
        match (self, other) {
            (Ternary::False, _) | (_, Ternary::False) => Ternary::False,
            (Ternary::True, Ternary::True) => Ternary::True,
            _ => Ternary::Undefined,
        }
    }

    pub fn or(self, other: Ternary) -> Ternary {
        match (self, other) {
            (Ternary::True, _) | (_, Ternary::True) => Ternary::True,
            (Ternary::False, Ternary::False) => Ternary::False,
            _ => Ternary::Undefined,
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Ternary {
        match self {
            Ternary::True => Ternary::False,
            Ternary::False => Ternary::True,
            Ternary::Undefined => Ternary::Undefined,
        }
    }

    pub fn is_true(self) -> bool {
        self == Ternary::True
    }
}

impl From<bool> for Ternary {
    fn from(value: bool) -> Self {
        if value {
            Ternary::True
        } else {
            Ternary::False
        }
    }
}

/// Parsed search filter
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    True,
    False,
    Undefined,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equality {
        attr: String,
        rule: Rule,
        value: Vec<u8>,
    },
    Substrings {
        attr: String,
        rule: Rule,
        pattern: SubstringPattern,
    },
    GreaterOrEqual {
        attr: String,
        rule: Rule,
        value: Vec<u8>,
    },
    LessOrEqual {
        attr: String,
        rule: Rule,
        value: Vec<u8>,
    },
    Present(String),
    Approx {
        attr: String,
        rule: Rule,
        value: Vec<u8>,
    },
}

const OBJECT_CLASS: &str = "objectclass";

fn assertion(element: &Element) -> Result<(String, Vec<u8>)> {
    let attr = element.child(0)?.as_string()?.to_ascii_lowercase();
    let value = element.child(1)?.as_bytes()?.to_vec();
    Ok((attr, value))
}

fn rule_for(rules: Option<&MatchingRules>, attr: &str, kind: MatchKind) -> Rule {
    rules
        .map(|r| r.rule_for(attr, kind))
        .unwrap_or_default()
}

impl Filter {
    /// Parse a BER filter, resolving leaf rules through `rules` when given
    pub fn parse(element: &Element, rules: Option<&MatchingRules>) -> Result<Filter> {
        if element.tag.class != TagClass::Context {
            return Err(ProtocolError::malformed(format!(
                "Unrecognised Filter tag class {:?}",
                element.tag.class
            )));
        }

        match element.tag.number {
            0 => {
                let mut conds = element
                    .children()?
                    .iter()
                    .map(|c| Filter::parse(c, rules))
                    .collect::<Result<Vec<_>>>()?;
                conds.retain(|c| *c != Filter::True);
                if conds.is_empty() {
                    return Ok(Filter::True);
                }
                if conds.len() == 1 {
                    return Ok(conds.remove(0));
                }
                if conds.contains(&Filter::False) {
                    return Ok(Filter::False);
                }
                Ok(Filter::And(conds))
            }
            1 => {
                let mut conds = element
                    .children()?
                    .iter()
                    .map(|c| Filter::parse(c, rules))
                    .collect::<Result<Vec<_>>>()?;
                conds.retain(|c| *c != Filter::False);
                if conds.is_empty() {
                    return Ok(Filter::False);
                }
                if conds.len() == 1 {
                    return Ok(conds.remove(0));
                }
                if conds.contains(&Filter::True) {
                    return Ok(Filter::True);
                }
                Ok(Filter::Or(conds))
            }
            2 => {
                let inner = Filter::parse(element.child(0)?, rules)?;
                Ok(match inner {
                    Filter::True => Filter::False,
                    Filter::False => Filter::True,
                    Filter::Undefined => Filter::Undefined,
                    other => Filter::Not(Box::new(other)),
                })
            }
            3 => {
                let (attr, value) = assertion(element)?;
                if attr == OBJECT_CLASS && value.eq_ignore_ascii_case(b"top") {
                    return Ok(Filter::True);
                }
                let rule = rule_for(rules, &attr, MatchKind::Equality);
                Ok(Filter::Equality { attr, rule, value })
            }
            4 => {
                let attr = element.child(0)?.as_string()?.to_ascii_lowercase();
                let pieces = element.child(1)?.children()?;
                let mut pattern = SubstringPattern::default();
                for (i, piece) in pieces.iter().enumerate() {
                    let text = piece.as_bytes()?.to_vec();
                    match piece.tag.number {
                        0 if i == 0 => pattern.initial = Some(text),
                        1 if pattern.final_.is_none() => pattern.any.push(text),
                        2 if pattern.final_.is_none() => pattern.final_ = Some(text),
                        n => {
                            return Err(ProtocolError::malformed(format!(
                                "Unrecognised substring tag {n}"
                            )))
                        }
                    }
                }
                let rule = rule_for(rules, &attr, MatchKind::Substrings);
                Ok(Filter::Substrings {
                    attr,
                    rule,
                    pattern,
                })
            }
            5 => {
                let (attr, value) = assertion(element)?;
                let rule = rule_for(rules, &attr, MatchKind::Ordering);
                Ok(Filter::GreaterOrEqual { attr, rule, value })
            }
            6 => {
                let (attr, value) = assertion(element)?;
                let rule = rule_for(rules, &attr, MatchKind::Ordering);
                Ok(Filter::LessOrEqual { attr, rule, value })
            }
            7 => {
                let attr = element.as_string()?.to_ascii_lowercase();
                if attr == OBJECT_CLASS {
                    return Ok(Filter::True);
                }
                Ok(Filter::Present(attr))
            }
            8 => {
                let (attr, value) = assertion(element)?;
                let rule = rule_for(rules, &attr, MatchKind::Equality);
                Ok(Filter::Approx { attr, rule, value })
            }
            // extensibleMatch: accepted but never resolvable without a schema
            9 => Ok(Filter::Undefined),
            n => Err(ProtocolError::malformed(format!("Unrecognised Filter tag {n}"))),
        }
    }

    /// Evaluate against `record` with three-valued logic
    pub fn evaluate(&self, record: &Attributes) -> Ternary {
        match self {
            Filter::True => Ternary::True,
            Filter::False => Ternary::False,
            Filter::Undefined => Ternary::Undefined,
            Filter::And(conds) => {
                let mut result = Ternary::True;
                for cond in conds {
                    result = result.and(cond.evaluate(record));
                    if result == Ternary::False {
                        break;
                    }
                }
                result
            }
            Filter::Or(conds) => {
                let mut result = Ternary::False;
                for cond in conds {
                    result = result.or(cond.evaluate(record));
                    if result == Ternary::True {
                        break;
                    }
                }
                result
            }
            Filter::Not(inner) => inner.evaluate(record).not(),
            Filter::Present(attr) => values_of(record, attr).is_some().into(),
            Filter::Equality { attr, rule, value } => {
                leaf(record, attr, rule, MatchKind::Equality, |vals| {
                    rule.equals(vals, value)
                })
            }
            Filter::Substrings {
                attr,
                rule,
                pattern,
            } => leaf(record, attr, rule, MatchKind::Substrings, |vals| {
                rule.substrings(vals, pattern)
            }),
            Filter::GreaterOrEqual { attr, rule, value } => {
                leaf(record, attr, rule, MatchKind::Ordering, |vals| {
                    rule.greater_or_equal(vals, value)
                })
            }
            Filter::LessOrEqual { attr, rule, value } => {
                leaf(record, attr, rule, MatchKind::Ordering, |vals| {
                    rule.less_or_equal(vals, value)
                })
            }
            Filter::Approx { attr, rule, value } => {
                leaf(record, attr, rule, MatchKind::Equality, |vals| {
                    rule.approx(vals, value)
                })
            }
        }
    }

    pub fn matches(&self, record: &Attributes) -> bool {
        self.evaluate(record).is_true()
    }

    /// Encode back into the BER `Filter` CHOICE
    pub fn to_element(&self) -> Element {
        fn ava(number: u32, attr: &str, value: &[u8]) -> Element {
            Element::sequence(vec![
                Element::octet_string(attr.as_bytes()),
                Element::octet_string(value),
            ])
            .implicit(TagClass::Context, number)
        }

        match self {
            Filter::True => Element::constructed(Tag::context(0, true), Vec::new()),
            Filter::False => Element::constructed(Tag::context(1, true), Vec::new()),
            Filter::Undefined => Element::constructed(Tag::context(9, true), Vec::new()),
            Filter::And(conds) => Element::constructed(
                Tag::context(0, true),
                conds.iter().map(Filter::to_element).collect(),
            ),
            Filter::Or(conds) => Element::constructed(
                Tag::context(1, true),
                conds.iter().map(Filter::to_element).collect(),
            ),
            Filter::Not(inner) => Element::constructed(Tag::context(2, true), vec![inner.to_element()]),
            Filter::Equality { attr, value, .. } => ava(3, attr, value),
            Filter::Substrings { attr, pattern, .. } => {
                let mut pieces = Vec::new();
                if let Some(initial) = &pattern.initial {
                    pieces.push(Element::primitive(Tag::context(0, false), initial.as_slice()));
                }
                for any in &pattern.any {
                    pieces.push(Element::primitive(Tag::context(1, false), any.as_slice()));
                }
                if let Some(final_) = &pattern.final_ {
                    pieces.push(Element::primitive(Tag::context(2, false), final_.as_slice()));
                }
                Element::sequence(vec![Element::octet_string(attr.as_bytes()), Element::sequence(pieces)])
                    .implicit(TagClass::Context, 4)
            }
            Filter::GreaterOrEqual { attr, value, .. } => ava(5, attr, value),
            Filter::LessOrEqual { attr, value, .. } => ava(6, attr, value),
            Filter::Present(attr) => Element::primitive(Tag::context(7, false), attr.as_bytes()),
            Filter::Approx { attr, value, .. } => ava(8, attr, value),
        }
    }
}

fn leaf(
    record: &Attributes,
    attr: &str,
    rule: &Rule,
    kind: MatchKind,
    test: impl FnOnce(&[Vec<u8>]) -> bool,
) -> Ternary {
    let Some(values) = values_of(record, attr) else {
        return Ternary::False;
    };
    if !rule.supports(kind) {
        return Ternary::Undefined;
    }
    test(values).into()
}

/// Escape an assertion value; values that are not UTF-8 are written as
/// `\xx` octets
fn write_value(f: &mut fmt::Formatter<'_>, value: &[u8]) -> fmt::Result {
    let Ok(text) = std::str::from_utf8(value) else {
        for byte in value {
            write!(f, "\\{byte:02x}")?;
        }
        return Ok(());
    };
    for c in text.chars() {
        match c {
            '*' => f.write_str("\\2a")?,
            '(' => f.write_str("\\28")?,
            ')' => f.write_str("\\29")?,
            '\\' => f.write_str("\\5c")?,
            '\0' => f.write_str("\\00")?,
            c => write!(f, "{c}")?,
        }
    }
    Ok(())
}

/// RFC 4515 string form, for logs
impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::True => f.write_str("(&)"),
            Filter::False => f.write_str("(|)"),
            Filter::Undefined => f.write_str("(?)"),
            Filter::And(conds) | Filter::Or(conds) => {
                f.write_str(if matches!(self, Filter::And(_)) { "(&" } else { "(|" })?;
                for cond in conds {
                    write!(f, "{cond}")?;
                }
                f.write_str(")")
            }
            Filter::Not(inner) => write!(f, "(!{inner})"),
            Filter::Present(attr) => write!(f, "({attr}=*)"),
            Filter::Equality { attr, value, .. }
            | Filter::GreaterOrEqual { attr, value, .. }
            | Filter::LessOrEqual { attr, value, .. }
            | Filter::Approx { attr, value, .. } => {
                let op = match self {
                    Filter::GreaterOrEqual { .. } => ">=",
                    Filter::LessOrEqual { .. } => "<=",
                    Filter::Approx { .. } => "~=",
                    _ => "=",
                };
                write!(f, "({attr}{op}")?;
                write_value(f, value)?;
                f.write_str(")")
            }
            Filter::Substrings { attr, pattern, .. } => {
                write!(f, "({attr}=")?;
                if let Some(initial) = &pattern.initial {
                    write_value(f, initial)?;
                }
                f.write_str("*")?;
                for any in &pattern.any {
                    write_value(f, any)?;
                    f.write_str("*")?;
                }
                if let Some(final_) = &pattern.final_ {
                    write_value(f, final_)?;
                }
                f.write_str(")")
            }
        }
    }
}
