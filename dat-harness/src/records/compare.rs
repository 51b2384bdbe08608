use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Number, Value};

/// Outcome of comparing expected records against what the destination returned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordComparison {
    /// Expected but not retrieved.
    pub missing: Vec<Value>,
    /// Retrieved but not expected.
    pub unexpected: Vec<Value>,
}

impl RecordComparison {
    pub fn is_match(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty()
    }
}

impl fmt::Display for RecordComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_match() {
            return write!(f, "records match");
        }
        write!(
            f,
            "{} missing, {} unexpected",
            self.missing.len(),
            self.unexpected.len()
        )?;
        if let Some(first) = self.missing.first() {
            write!(f, "; first missing: {first}")?;
        }
        if let Some(first) = self.unexpected.first() {
            write!(f, "; first unexpected: {first}")?;
        }
        Ok(())
    }
}

/// Drop top-level `_airbyte_*` bookkeeping keys a destination may add to the record.
pub fn prune_internal_fields(record: &Value) -> Value {
    match record {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| !key.starts_with("_airbyte_"))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Integral floats compare equal to integers (`1.0 == 1`), as destinations are free to
/// widen numeric columns.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(_), _) => value.clone(),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Value::Number(Number::from(f as i64))
            }
            _ => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect::<Map<_, _>>(),
        ),
        other => other.clone(),
    }
}

fn fingerprint(record: &Value) -> String {
    canonicalize(&prune_internal_fields(record)).to_string()
}

/// Compare two record lists as multisets: order is ignored, duplicates count.
pub fn compare_records(expected: &[Value], actual: &[Value]) -> RecordComparison {
    let mut remaining: BTreeMap<String, Vec<&Value>> = BTreeMap::new();
    for record in expected {
        remaining.entry(fingerprint(record)).or_default().push(record);
    }

    let mut unexpected = Vec::new();
    for record in actual {
        let key = fingerprint(record);
        match remaining.get_mut(&key).and_then(Vec::pop) {
            Some(_) => {}
            None => unexpected.push(record.clone()),
        }
    }

    let missing = remaining
        .into_values()
        .flatten()
        .cloned()
        .collect::<Vec<_>>();
    RecordComparison {
        missing,
        unexpected,
    }
}
