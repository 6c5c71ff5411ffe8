//! Snapshot normalizer
//!
//! Converts raw entity records into canonical, comparison-ready snapshots:
//! - absent keys, `null`, empty and whitespace-only strings collapse to [`Canonical::Empty`]
//! - numbers and booleans are stringified so `1` and `"1"` compare alike
//! - array fields accept real arrays or JSON-encoded strings and are kept sorted
//!
//! Snapshots are plain immutable values. A new snapshot replaces an old one only
//! by assignment, after the backend confirmed the write it describes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::types::{EntityKind, Record};

/// How to treat an array field whose string content is not valid JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrayFieldPolicy {
    /// Fail closed with a [`MalformedFieldError`]
    #[default]
    Strict,
    /// Treat the whole string as a single-element list
    Lenient,
}

/// An array-typed field held a string that is not a JSON document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedFieldError {
    pub kind: EntityKind,
    pub field: String,
    pub raw: String,
    pub reason: String,
}

impl std::fmt::Display for MalformedFieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "malformed {} field '{}' ({:?}): {}",
            self.kind, self.field, self.raw, self.reason
        )
    }
}

impl std::error::Error for MalformedFieldError {}

/// Canonical, comparison-ready form of a field value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Canonical {
    Empty,
    Scalar(String),
    /// Sorted elements; order never matters for comparison
    List(Vec<String>),
}

impl Canonical {
    /// Compare two canonical values.
    ///
    /// With `numeric` set, scalars that both parse as finite numbers are compared
    /// as numbers, so `"1.50"` equals `1.5`.
    pub fn equivalent(&self, other: &Canonical, numeric: bool) -> bool {
        match (self, other) {
            (Canonical::Empty, Canonical::Empty) => true,
            (Canonical::Scalar(a), Canonical::Scalar(b)) => {
                if numeric {
                    if let Some(equal) = numbers_equal(a, b) {
                        return equal;
                    }
                }
                a == b
            }
            (Canonical::List(a), Canonical::List(b)) => a == b,
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Canonical::Empty)
    }
}

/// `Some(equal)` when both sides are numbers, `None` otherwise.
///
/// Plain decimals (`-0012.50`) compare digit by digit, so integers of any
/// length stay exact. Only exponent forms go through `f64`.
fn numbers_equal(a: &str, b: &str) -> Option<bool> {
    if let (Some(x), Some(y)) = (decimal_key(a), decimal_key(b)) {
        return Some(x == y);
    }
    match (parse_float(a), parse_float(b)) {
        (Some(x), Some(y)) => Some(x == y),
        _ => None,
    }
}

/// Sign, integer digits without leading zeros, fraction without trailing zeros
fn decimal_key(text: &str) -> Option<(bool, &str, &str)> {
    let text = text.trim();
    let (negative, digits) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };
    let (int, frac) = digits.split_once('.').unwrap_or((digits, ""));
    if int.is_empty() && frac.is_empty() {
        return None;
    }
    if !int.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }

    let int = int.trim_start_matches('0');
    let frac = frac.trim_end_matches('0');
    let negative = negative && !(int.is_empty() && frac.is_empty());
    Some((negative, int, frac))
}

fn parse_float(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// One captured field: its canonical value and the raw value it came from
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotField {
    pub canonical: Canonical,
    pub raw: Value,
}

/// Immutable normalized copy of an entity's responsible fields
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    kind: EntityKind,
    fields: BTreeMap<String, SnapshotField>,
}

impl Snapshot {
    /// Normalize a raw record. Bookkeeping fields (ids, audit, foreign keys) are left out.
    pub fn capture(
        record: &Record,
        kind: EntityKind,
        policy: ArrayFieldPolicy,
    ) -> Result<Self, MalformedFieldError> {
        let schema = kind.schema();
        let mut fields = BTreeMap::new();

        for (name, raw) in record {
            if schema.is_bookkeeping(name) {
                continue;
            }

            let canonical = if schema.is_array(name) {
                list_canonical(array_elements(kind, name, raw, policy)?)
            } else {
                canonicalize(raw)
            };

            fields.insert(
                name.clone(),
                SnapshotField {
                    canonical,
                    raw: raw.clone(),
                },
            );
        }

        Ok(Self { kind, fields })
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn get(&self, field: &str) -> Option<&SnapshotField> {
        self.fields.get(field)
    }

    /// Canonical value of a field; absent fields are [`Canonical::Empty`]
    pub fn canonical(&self, field: &str) -> &Canonical {
        const EMPTY: &Canonical = &Canonical::Empty;
        self.fields.get(field).map(|f| &f.canonical).unwrap_or(EMPTY)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    /// Raw values of the captured fields
    pub fn to_record(&self) -> Record {
        self.fields
            .iter()
            .map(|(name, field)| (name.clone(), field.raw.clone()))
            .collect()
    }
}

/// Canonicalize a value of a field not declared as an array
fn canonicalize(raw: &Value) -> Canonical {
    match raw {
        Value::Array(items) => list_canonical(items.iter().filter_map(scalar_text).collect()),
        other => match scalar_text(other) {
            Some(text) => Canonical::Scalar(text),
            None => Canonical::Empty,
        },
    }
}

fn list_canonical(mut items: Vec<String>) -> Canonical {
    if items.is_empty() {
        return Canonical::Empty;
    }
    items.sort();
    Canonical::List(items)
}

/// Trimmed text of a scalar, `None` for "no value"
fn scalar_text(raw: &Value) -> Option<String> {
    match raw {
        Value::Null => None,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => Some(raw.to_string()),
    }
}

/// Elements of an array-typed field, in their original order.
///
/// Accepts a real JSON array, a JSON-encoded string, or "no value". A string
/// that is not JSON is handled according to `policy`.
pub fn array_elements(
    kind: EntityKind,
    field: &str,
    raw: &Value,
    policy: ArrayFieldPolicy,
) -> Result<Vec<String>, MalformedFieldError> {
    match raw {
        Value::Array(items) => Ok(items.iter().filter_map(scalar_text).collect()),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(Vec::new());
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(Value::Array(items)) => Ok(items.iter().filter_map(scalar_text).collect()),
                Ok(other) => Ok(scalar_text(&other).into_iter().collect()),
                Err(err) => match policy {
                    ArrayFieldPolicy::Strict => Err(MalformedFieldError {
                        kind,
                        field: field.to_string(),
                        raw: s.clone(),
                        reason: err.to_string(),
                    }),
                    ArrayFieldPolicy::Lenient => {
                        log::warn!(
                            "{} field '{}' is not valid JSON, treating {:?} as a single element",
                            kind,
                            field,
                            trimmed
                        );
                        Ok(vec![trimmed.to_string()])
                    }
                },
            }
        }
        other => Ok(scalar_text(other).into_iter().collect()),
    }
}
