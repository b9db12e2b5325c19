//! Condition evaluation over JSON documents.
//!
//! Mirrors the PostgreSQL backend: text matches are case-insensitive,
//! ordered comparisons convert the stored value to the operand's type, and
//! missing fields read as `null`. Text orders case-insensitively with a
//! byte-wise tie-break, approximating a linguistic collation.

use std::cmp::Ordering;

use serde_json::Value;

use super::Document;
use crate::query::filter::parse_date;
use crate::query::{Condition, FieldKind, MatchMode, Operand, SortDirection, SortKey};

/// Resolve a dot-separated path; missing segments yield `Null`.
pub fn resolve_attr<'a>(doc: &'a Document, path: &str) -> &'a Value {
    let mut segments = path.split('.');
    let Some(first) = segments.next() else {
        return &Value::Null;
    };
    let mut current = match doc.get(first) {
        Some(v) => v,
        None => return &Value::Null,
    };
    for segment in segments {
        match current.get(segment) {
            Some(v) => current = v,
            None => return &Value::Null,
        }
    }
    current
}

/// Evaluate a condition against one document.
pub fn matches(doc: &Document, condition: &Condition) -> bool {
    match condition {
        Condition::All(items) => items.iter().all(|c| matches(doc, c)),
        Condition::Any(items) => items.iter().any(|c| matches(doc, c)),
        Condition::Eq { field, value } => equals(resolve_attr(doc, field), value),
        Condition::Ne { field, value } => !equals(resolve_attr(doc, field), value),
        Condition::Match {
            field,
            needle,
            mode,
        } => {
            let Some(text) = as_text(resolve_attr(doc, field)) else {
                return false;
            };
            let text = text.to_lowercase();
            let needle = needle.to_lowercase();
            match mode {
                MatchMode::Contains => text.contains(&needle),
                MatchMode::Prefix => text.starts_with(&needle),
                MatchMode::Suffix => text.ends_with(&needle),
            }
        }
        Condition::Gt { field, value } => {
            compare_to_operand(resolve_attr(doc, field), value) == Some(Ordering::Greater)
        }
        Condition::Lt { field, value } => {
            compare_to_operand(resolve_attr(doc, field), value) == Some(Ordering::Less)
        }
        Condition::In { field, values } => {
            let stored = resolve_attr(doc, field);
            values.iter().any(|v| equals(stored, v))
        }
        Condition::Between { field, low, high } => {
            let stored = resolve_attr(doc, field);
            matches!(
                compare_to_operand(stored, low),
                Some(Ordering::Greater | Ordering::Equal)
            ) && matches!(
                compare_to_operand(stored, high),
                Some(Ordering::Less | Ordering::Equal)
            )
        }
    }
}

/// Text form of a stored value, as `->>` would render it.
fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn equals(stored: &Value, operand: &Operand) -> bool {
    match operand {
        Operand::Null => stored.is_null(),
        Operand::Date(d) => stored.as_str().and_then(parse_date).is_some_and(|s| &s == d),
        other => !stored.is_null() && json_eq(stored, &other.to_json()),
    }
}

/// Convert the stored value to the operand's type and compare.
fn compare_to_operand(stored: &Value, operand: &Operand) -> Option<Ordering> {
    match operand {
        Operand::Null => None,
        Operand::Int(_) | Operand::Float(_) => {
            let left = as_number(stored)?;
            let right = match operand {
                Operand::Int(i) => *i as f64,
                Operand::Float(f) => *f,
                _ => return None,
            };
            left.partial_cmp(&right)
        }
        Operand::Date(d) => {
            let left = stored.as_str().and_then(parse_date)?;
            Some(left.cmp(d))
        }
        Operand::Bool(b) => {
            let left = as_bool(stored)?;
            Some(left.cmp(b))
        }
        Operand::Text(t) => {
            let left = as_text(stored)?;
            Some(collate(&left, t))
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Rank of a JSON type in JSONB ordering.
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::String(_) => 1,
        Value::Number(_) => 2,
        Value::Bool(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order of two stored values for sorting; null sorts first.
pub fn compare_values(left: &Value, right: &Value, kind: FieldKind) -> Ordering {
    match kind {
        FieldKind::Number => compare_keys(as_number(left), as_number(right)),
        FieldKind::Date => compare_keys(
            left.as_str().and_then(parse_date),
            right.as_str().and_then(parse_date),
        ),
        FieldKind::Boolean => compare_keys(as_bool(left), as_bool(right)),
        FieldKind::Text => match (as_text(left), as_text(right)) {
            (Some(a), Some(b)) => collate(&a, &b),
            (a, b) => compare_keys(a, b),
        },
        FieldKind::Any => {
            let by_type = type_rank(left).cmp(&type_rank(right));
            if by_type != Ordering::Equal {
                return by_type;
            }
            match (left, right) {
                (Value::Number(a), Value::Number(b)) => compare_keys(a.as_f64(), b.as_f64()),
                (Value::String(a), Value::String(b)) => collate(a, b),
                (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
                _ => Ordering::Equal,
            }
        }
    }
}

/// Case-insensitive order; equal folds fall back to byte order.
fn collate(left: &str, right: &str) -> Ordering {
    left.to_lowercase()
        .cmp(&right.to_lowercase())
        .then_with(|| left.cmp(right))
}

/// `None` sorts before any value.
fn compare_keys<T: PartialOrd>(left: Option<T>, right: Option<T>) -> Ordering {
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Stable sort by one key.
pub fn sort_documents(docs: &mut [Document], key: &SortKey) {
    docs.sort_by(|a, b| {
        let ordering = compare_values(
            resolve_attr(a, &key.field),
            resolve_attr(b, &key.field),
            key.kind,
        );
        match key.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}
