//! Query-string transport.
//!
//! Folds decoded `key=value` pairs into the raw query object the schema
//! validates. Repeated keys become arrays and bracket paths nest:
//!
//! ```text
//! fields=name&fields=email               -> {"fields": ["name", "email"]}
//! filters[name][contains]=jo             -> {"filters": {"name": {"contains": "jo"}}}
//! filters[age][between][]=1&...[]=9      -> {"filters": {"age": {"between": ["1", "9"]}}}
//! ```

use serde_json::{Map, Value};

/// Build a raw query object from decoded query-string pairs.
pub fn raw_query_from_pairs<I, K, V>(pairs: I) -> Value
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let mut root = Map::new();
    for (key, value) in pairs {
        let path = split_key(key.as_ref());
        insert(&mut root, &path, value.into());
    }
    Value::Object(root)
}

/// Parse a raw query from an undecoded query string.
pub fn raw_query_from_str(query: &str) -> Value {
    raw_query_from_pairs(url::form_urlencoded::parse(query.as_bytes()))
}

/// `a[b][]` -> `["a", "b", ""]`. Malformed brackets keep the key literal.
fn split_key(key: &str) -> Vec<String> {
    let Some(open) = key.find('[') else {
        return vec![key.to_string()];
    };
    if open == 0 || !key.ends_with(']') {
        return vec![key.to_string()];
    }

    let mut path = vec![key[..open].to_string()];
    let mut rest = &key[open..];
    while let Some(stripped) = rest.strip_prefix('[') {
        let Some(close) = stripped.find(']') else {
            return vec![key.to_string()];
        };
        path.push(stripped[..close].to_string());
        rest = &stripped[close + 1..];
    }
    if !rest.is_empty() {
        return vec![key.to_string()];
    }
    path
}

fn insert(target: &mut Map<String, Value>, path: &[String], value: String) {
    let Some((head, rest)) = path.split_first() else {
        return;
    };

    if rest.is_empty() {
        match target.get_mut(head) {
            Some(slot) if slot.is_array() || slot.is_string() => push(slot, value),
            _ => {
                target.insert(head.clone(), Value::String(value));
            }
        }
        return;
    }

    if rest.len() == 1 && rest[0].is_empty() {
        let slot = target
            .entry(head.clone())
            .or_insert_with(|| Value::Array(Vec::new()));
        push(slot, value);
        return;
    }

    let slot = target
        .entry(head.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    if let Value::Object(inner) = slot {
        insert(inner, rest, value);
    }
}

/// Append to an array slot, promoting a single string to a list.
fn push(slot: &mut Value, value: String) {
    if slot.is_string() {
        let previous = slot.take();
        *slot = Value::Array(vec![previous]);
    }
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
    }
    if let Value::Array(items) = slot {
        items.push(Value::String(value));
    }
}
