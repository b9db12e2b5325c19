//! Filter predicates and the filter operator compiler.
//!
//! A [`Predicate`] is the normalized operator list for one field. The
//! compiler turns it into a backend-neutral [`Condition`], coercing each
//! operand to the field's declared [`FieldKind`].

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::QueryError;
use super::types::FieldKind;

/// One operator and its raw operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Eq(Value),
    Neq(Value),
    Contains(String),
    StartsWith(String),
    EndsWith(String),
    Gt(Value),
    Lt(Value),
    In(Vec<Value>),
    Between(Value, Value),
}

impl Operation {
    fn from_entry(field: &str, operator: &str, operand: &Value) -> Result<Self, QueryError> {
        let op = match operator {
            "eq" => Self::Eq(operand.clone()),
            "neq" => Self::Neq(operand.clone()),
            "contains" => Self::Contains(text_operand(field, operand)?),
            "startsWith" => Self::StartsWith(text_operand(field, operand)?),
            "endsWith" => Self::EndsWith(text_operand(field, operand)?),
            "gt" => Self::Gt(operand.clone()),
            "lt" => Self::Lt(operand.clone()),
            "in" => {
                let values = list_operand(field, operand)?;
                if values.is_empty() {
                    return Err(QueryError::EmptyInSet {
                        field: field.to_string(),
                    });
                }
                Self::In(values)
            }
            "between" => {
                let values = list_operand(field, operand)?;
                match <[Value; 2]>::try_from(values) {
                    Ok([low, high]) => Self::Between(low, high),
                    Err(_) => {
                        return Err(QueryError::InvalidFilterValue {
                            field: field.to_string(),
                            reason: "between requires exactly two values".into(),
                        });
                    }
                }
            }
            _ => {
                return Err(QueryError::InvalidOperator {
                    field: field.to_string(),
                    operator: operator.to_string(),
                });
            }
        };
        Ok(op)
    }
}

/// Normalized filter for one field: a non-empty list of operations
/// combined with AND.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Predicate(Vec<Operation>);

impl Predicate {
    /// Normalize a raw filter value.
    ///
    /// An object is read as an operator map; any other value is shorthand
    /// for `{eq: value}`.
    pub fn from_json(field: &str, value: &Value) -> Result<Self, QueryError> {
        let Value::Object(map) = value else {
            return Ok(Self::eq(value.clone()));
        };
        if map.is_empty() {
            return Err(QueryError::EmptyPredicate {
                field: field.to_string(),
            });
        }
        let ops = map
            .iter()
            .map(|(operator, operand)| Operation::from_entry(field, operator, operand))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(ops))
    }

    /// Equality shorthand.
    pub fn eq(value: Value) -> Self {
        Self(vec![Operation::Eq(value)])
    }

    pub fn operations(&self) -> &[Operation] {
        &self.0
    }
}

fn text_operand(field: &str, operand: &Value) -> Result<String, QueryError> {
    let text = match operand {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => {
            return Err(QueryError::InvalidFilterValue {
                field: field.to_string(),
                reason: "pattern operand must be text".into(),
            });
        }
    };
    if text.is_empty() {
        return Err(QueryError::InvalidFilterValue {
            field: field.to_string(),
            reason: "pattern operand must not be empty".into(),
        });
    }
    Ok(text)
}

/// Accept a JSON array or a comma-joined string (URL transport).
fn list_operand(field: &str, operand: &Value) -> Result<Vec<Value>, QueryError> {
    match operand {
        Value::Array(items) => Ok(items.clone()),
        Value::String(s) if s.trim().is_empty() => Ok(Vec::new()),
        Value::String(s) => Ok(s
            .split(',')
            .map(|part| Value::String(part.trim().to_string()))
            .collect()),
        _ => Err(QueryError::InvalidFilterValue {
            field: field.to_string(),
            reason: "expected a list of values".into(),
        }),
    }
}

/// Operand after coercion to the field's declared kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(DateTime<Utc>),
}

impl Operand {
    /// Coerce a raw operand for `field` of the given kind.
    pub fn coerce(
        field: &str,
        value: &Value,
        kind: FieldKind,
        allow_null: bool,
    ) -> Result<Self, QueryError> {
        let invalid = |reason: &str| QueryError::InvalidFilterValue {
            field: field.to_string(),
            reason: reason.to_string(),
        };

        match value {
            Value::Null if allow_null => return Ok(Self::Null),
            Value::Null => return Err(invalid("null is only allowed with eq/neq")),
            Value::Array(_) | Value::Object(_) => {
                return Err(invalid("expected a scalar value"));
            }
            _ => {}
        }

        match kind {
            FieldKind::Date => match value {
                Value::String(s) => parse_date(s)
                    .map(Self::Date)
                    .ok_or_else(|| invalid(&format!("'{s}' is not a valid date"))),
                _ => Err(invalid("expected a date string")),
            },
            FieldKind::Number => match value {
                Value::Number(n) => Ok(number_operand(n)),
                Value::String(s) => parse_number(s)
                    .ok_or_else(|| invalid(&format!("'{s}' is not a number"))),
                _ => Err(invalid("expected a number")),
            },
            FieldKind::Boolean => match value {
                Value::Bool(b) => Ok(Self::Bool(*b)),
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" => Ok(Self::Bool(true)),
                    "false" => Ok(Self::Bool(false)),
                    _ => Err(invalid(&format!("'{s}' is not a boolean"))),
                },
                _ => Err(invalid("expected a boolean")),
            },
            FieldKind::Text => match value {
                Value::String(s) => Ok(Self::Text(s.clone())),
                Value::Number(n) => Ok(Self::Text(n.to_string())),
                Value::Bool(b) => Ok(Self::Text(b.to_string())),
                _ => Err(invalid("expected text")),
            },
            FieldKind::Any => Ok(match value {
                Value::Bool(b) => Self::Bool(*b),
                Value::Number(n) => number_operand(n),
                Value::String(s) => Self::Text(s.clone()),
                _ => Self::Null,
            }),
        }
    }

    /// Ordering between comparable operands; `None` across types.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            (Self::Float(a), Self::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// JSON form, with dates rendered as RFC 3339.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => Value::from(*f),
            Self::Text(s) => Value::String(s.clone()),
            Self::Date(d) => Value::String(d.to_rfc3339()),
        }
    }
}

fn number_operand(n: &serde_json::Number) -> Operand {
    match n.as_i64() {
        Some(i) => Operand::Int(i),
        None => Operand::Float(n.as_f64().unwrap_or(f64::NAN)),
    }
}

fn parse_number(s: &str) -> Option<Operand> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(Operand::Int(i));
    }
    s.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(Operand::Float)
}

/// Parse RFC 3339 or a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Pattern anchoring for case-insensitive text matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Contains,
    Prefix,
    Suffix,
}

/// Backend-neutral condition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Conjunction; an empty list matches everything.
    All(Vec<Condition>),
    /// Disjunction; an empty list matches nothing.
    Any(Vec<Condition>),
    Eq {
        field: String,
        value: Operand,
    },
    Ne {
        field: String,
        value: Operand,
    },
    /// Case-insensitive literal text match.
    Match {
        field: String,
        needle: String,
        mode: MatchMode,
    },
    Gt {
        field: String,
        value: Operand,
    },
    Lt {
        field: String,
        value: Operand,
    },
    In {
        field: String,
        values: Vec<Operand>,
    },
    /// Inclusive on both ends, `low <= high`.
    Between {
        field: String,
        low: Operand,
        high: Operand,
    },
}

impl Condition {
    /// Condition matching every document.
    pub fn match_all() -> Self {
        Self::All(Vec::new())
    }

    pub fn is_match_all(&self) -> bool {
        matches!(self, Self::All(items) if items.is_empty())
    }

    /// AND a list of conditions, collapsing the trivial cases.
    pub fn and(mut conditions: Vec<Condition>) -> Self {
        conditions.retain(|c| !c.is_match_all());
        if conditions.len() == 1 {
            conditions.remove(0)
        } else {
            Self::All(conditions)
        }
    }
}

/// Compile one field's predicate into a condition.
///
/// Multiple operations on the same field are combined with AND.
pub fn compile_predicate(
    field: &str,
    predicate: &Predicate,
    kind: FieldKind,
) -> Result<Condition, QueryError> {
    let conditions = predicate
        .operations()
        .iter()
        .map(|op| compile_operation(field, op, kind))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Condition::and(conditions))
}

fn compile_operation(field: &str, op: &Operation, kind: FieldKind) -> Result<Condition, QueryError> {
    let name = field.to_string();
    let cond = match op {
        Operation::Eq(v) => Condition::Eq {
            field: name,
            value: Operand::coerce(field, v, kind, true)?,
        },
        Operation::Neq(v) => Condition::Ne {
            field: name,
            value: Operand::coerce(field, v, kind, true)?,
        },
        Operation::Contains(s) => match_condition(name, s, MatchMode::Contains)?,
        Operation::StartsWith(s) => match_condition(name, s, MatchMode::Prefix)?,
        Operation::EndsWith(s) => match_condition(name, s, MatchMode::Suffix)?,
        Operation::Gt(v) => Condition::Gt {
            field: name,
            value: Operand::coerce(field, v, kind, false)?,
        },
        Operation::Lt(v) => Condition::Lt {
            field: name,
            value: Operand::coerce(field, v, kind, false)?,
        },
        Operation::In(values) => {
            if values.is_empty() {
                return Err(QueryError::EmptyInSet { field: name });
            }
            let values = values
                .iter()
                .map(|v| Operand::coerce(field, v, kind, false))
                .collect::<Result<Vec<_>, _>>()?;
            Condition::In {
                field: name,
                values,
            }
        }
        Operation::Between(a, b) => {
            let a = Operand::coerce(field, a, kind, false)?;
            let b = Operand::coerce(field, b, kind, false)?;
            let (low, high) = match a.compare(&b) {
                Some(Ordering::Greater) => (b, a),
                Some(_) => (a, b),
                None => {
                    return Err(QueryError::InvalidFilterValue {
                        field: name,
                        reason: "between bounds are not comparable".into(),
                    });
                }
            };
            Condition::Between {
                field: name,
                low,
                high,
            }
        }
    };
    Ok(cond)
}

fn match_condition(field: String, needle: &str, mode: MatchMode) -> Result<Condition, QueryError> {
    if needle.is_empty() {
        return Err(QueryError::InvalidFilterValue {
            field,
            reason: "pattern operand must not be empty".into(),
        });
    }
    Ok(Condition::Match {
        field,
        needle: needle.to_string(),
        mode,
    })
}
