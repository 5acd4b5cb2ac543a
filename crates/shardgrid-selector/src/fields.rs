//! Field selectors.
//!
//! A selector is a comma-separated list of requirements:
//!
//! ```text
//! metadata.name=web,metadata.namespace!=kube-system,metadata.hashkey=gte:100
//! ```
//!
//! Besides `=`, `==` and `!=`, hash-key fields (`metadata.hashkey` and
//! `metadata.ownerReferences.hashkey.<Kind>`) accept `gt:`, `gte:`, `lt:`
//! and `lte:` value prefixes, compared as integers. A controller instance
//! uses these to select the slice of the hash range it owns.
//!
//! `\,`, `\=` and `\\` escape the separators inside values.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{SelectorError, SelectorResult};

pub const HASHKEY_FIELD: &str = "metadata.hashkey";
pub const OWNER_HASHKEY_PREFIX: &str = "metadata.ownerReferences.hashkey.";

/// Field values of one object, keyed by field path.
pub type FieldSet = BTreeMap<String, String>;

pub fn is_hashkey_field(field: &str) -> bool {
    field == HASHKEY_FIELD || field.starts_with(OWNER_HASHKEY_PREFIX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    DoubleEquals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl Operator {
    fn range_prefix(self) -> &'static str {
        match self {
            Operator::GreaterThan => "gt:",
            Operator::GreaterThanOrEqual => "gte:",
            Operator::LessThan => "lt:",
            Operator::LessThanOrEqual => "lte:",
            _ => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub field: String,
    pub op: Operator,
    pub value: String,
}

impl Requirement {
    pub fn matches(&self, fields: &FieldSet) -> bool {
        let actual = fields.get(&self.field);
        match self.op {
            Operator::Equals | Operator::DoubleEquals => {
                actual.map(String::as_str).unwrap_or_default() == self.value
            }
            Operator::NotEquals => actual.map(String::as_str).unwrap_or_default() != self.value,
            op => {
                let (Some(actual), Ok(bound)) = (actual, self.value.parse::<i64>()) else {
                    return false;
                };
                let Ok(actual) = actual.parse::<i64>() else {
                    return false;
                };
                match op {
                    Operator::GreaterThan => actual > bound,
                    Operator::GreaterThanOrEqual => actual >= bound,
                    Operator::LessThan => actual < bound,
                    _ => actual <= bound,
                }
            }
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = escape(&self.value);
        match self.op {
            Operator::Equals => write!(f, "{}={value}", self.field),
            Operator::DoubleEquals => write!(f, "{}=={value}", self.field),
            Operator::NotEquals => write!(f, "{}!={value}", self.field),
            op => write!(f, "{}={}{value}", self.field, op.range_prefix()),
        }
    }
}

/// Conjunction of requirements. The empty selector matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn parse(selector: &str) -> SelectorResult<Self> {
        let invalid = |reason: &str| SelectorError::InvalidSelector {
            selector: selector.to_string(),
            reason: reason.to_string(),
        };

        let mut requirements = Vec::new();
        for term in split_unescaped(selector, ',') {
            let term = term.trim();
            if term.is_empty() {
                continue;
            }
            let (field, op, raw) = split_term(term).ok_or_else(|| invalid("missing operator"))?;
            let field = field.trim();
            if field.is_empty() {
                return Err(invalid("empty field name"));
            }
            let value = unescape(raw).ok_or_else(|| invalid("invalid escape sequence"))?;
            requirements.push(range_requirement(field, op, value)?);
        }
        Ok(Self { requirements })
    }

    pub fn and(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn matches(&self, fields: &FieldSet) -> bool {
        self.requirements.iter().all(|r| r.matches(fields))
    }

    /// The value `field` must equal, if the selector pins it exactly.
    pub fn requires_exact_match(&self, field: &str) -> Option<String> {
        self.requirements
            .iter()
            .find(|r| r.field == field && matches!(r.op, Operator::Equals | Operator::DoubleEquals))
            .map(|r| r.value.clone())
    }

    /// The `[low, high]` bounds the selector places on an integer field,
    /// folding strict bounds into inclusive ones.
    ///
    /// A strict bound past the end of `i64` yields `(Some(i64::MAX),
    /// Some(i64::MIN))`, a range that contains nothing.
    pub fn range_of(&self, field: &str) -> (Option<i64>, Option<i64>) {
        const EMPTY: (Option<i64>, Option<i64>) = (Some(i64::MAX), Some(i64::MIN));
        let mut low: Option<i64> = None;
        let mut high: Option<i64> = None;
        for r in self.requirements.iter().filter(|r| r.field == field) {
            let Ok(v) = r.value.parse::<i64>() else { continue };
            match r.op {
                Operator::GreaterThan => {
                    let Some(v) = v.checked_add(1) else { return EMPTY };
                    low = Some(low.map_or(v, |l| l.max(v)));
                }
                Operator::GreaterThanOrEqual => low = Some(low.map_or(v, |l| l.max(v))),
                Operator::LessThan => {
                    let Some(v) = v.checked_sub(1) else { return EMPTY };
                    high = Some(high.map_or(v, |h| h.min(v)));
                }
                Operator::LessThanOrEqual => high = Some(high.map_or(v, |h| h.min(v))),
                Operator::Equals | Operator::DoubleEquals => {
                    low = Some(low.map_or(v, |l| l.max(v)));
                    high = Some(high.map_or(v, |h| h.min(v)));
                }
                Operator::NotEquals => {}
            }
        }
        (low, high)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<String> = self.requirements.iter().map(ToString::to_string).collect();
        f.write_str(&terms.join(","))
    }
}

/// Split `field<op>value` at the first unescaped operator.
fn split_term(term: &str) -> Option<(&str, Operator, &str)> {
    let bytes = term.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'!' if bytes.get(i + 1) == Some(&b'=') => {
                return Some((&term[..i], Operator::NotEquals, &term[i + 2..]));
            }
            b'=' if bytes.get(i + 1) == Some(&b'=') => {
                return Some((&term[..i], Operator::DoubleEquals, &term[i + 2..]));
            }
            b'=' => return Some((&term[..i], Operator::Equals, &term[i + 1..])),
            _ => {}
        }
        i += 1;
    }
    None
}

/// Turn `field=gte:10` into a range requirement on hash-key fields.
fn range_requirement(field: &str, op: Operator, value: String) -> SelectorResult<Requirement> {
    const RANGES: [(&str, Operator); 4] = [
        ("gte:", Operator::GreaterThanOrEqual),
        ("gt:", Operator::GreaterThan),
        ("lte:", Operator::LessThanOrEqual),
        ("lt:", Operator::LessThan),
    ];

    let range = RANGES
        .iter()
        .find_map(|(prefix, range_op)| value.strip_prefix(prefix).map(|rest| (*range_op, rest.to_string())));
    let (op, value) = match range {
        Some((range_op, rest)) if op == Operator::Equals && is_hashkey_field(field) => (range_op, rest),
        Some((range_op, _)) if is_hashkey_field(field) => {
            return Err(SelectorError::UnsupportedOperator {
                field: field.to_string(),
                op: range_op.range_prefix().trim_end_matches(':').to_string(),
            });
        }
        _ => (op, value),
    };

    if is_hashkey_field(field) && value.parse::<i64>().is_err() {
        return Err(SelectorError::NotAnInteger {
            field: field.to_string(),
            value,
        });
    }
    Ok(Requirement {
        field: field.to_string(),
        op,
        value,
    })
}

fn split_unescaped(s: &str, sep: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == sep {
            out.push(&s[start..i]);
            start = i + 1;
        }
    }
    out.push(&s[start..]);
    out
}

fn unescape(s: &str) -> Option<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next()? {
                e @ ('\\' | ',' | '=') => out.push(e),
                _ => return None,
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | ',' | '=') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
