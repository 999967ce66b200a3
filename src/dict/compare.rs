//! Field-by-field comparison of two dictionaries.
//!
//! Entries are matched by name and compared through their JSON form, so any
//! serde dictionary type (`CsDef`, `XfrmDef`, `GeodeticPath`) can be diffed.
//! Numeric fields compare within a tolerance, everything else exactly.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use serde_json::Value;

use crate::error::{CsError, CsResult};

#[derive(Clone, Debug, PartialEq)]
pub enum Difference {
    /// Present only on the right.
    Added(String),
    /// Present only on the left.
    Removed(String),
    Changed {
        name: String,
        /// Dotted path of the field, e.g. `ellipsoid.a` or `zones[1].east`.
        field: String,
        left: Value,
        right: Value,
    },
}

/// Numeric tolerances keyed by field path or by the field's own name.
#[derive(Clone, Debug, Default)]
pub struct Tolerance {
    pub default: f64,
    pub fields: HashMap<String, f64>,
}

impl Tolerance {
    pub fn new(default: f64) -> Self {
        Self {
            default,
            fields: HashMap::new(),
        }
    }

    pub fn with_field(mut self, field: &str, tolerance: f64) -> Self {
        self.fields.insert(field.to_string(), tolerance);
        self
    }

    fn for_field(&self, path: &str) -> f64 {
        if let Some(t) = self.fields.get(path) {
            return *t;
        }
        let leaf = path.rsplit('.').next().unwrap_or(path);
        let leaf = leaf.split('[').next().unwrap_or(leaf);
        self.fields.get(leaf).copied().unwrap_or(self.default)
    }
}

fn walk(name: &str, field: &str, left: &Value, right: &Value, tol: &Tolerance, out: &mut Vec<Difference>) {
    let changed = |out: &mut Vec<Difference>| {
        out.push(Difference::Changed {
            name: name.to_string(),
            field: field.to_string(),
            left: left.clone(),
            right: right.clone(),
        })
    };
    let child = |key: &str| {
        if field.is_empty() {
            key.to_string()
        } else {
            format!("{field}.{key}")
        }
    };

    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) if (a - b).abs() <= tol.for_field(field) => {}
            _ => changed(out),
        },
        (Value::Object(a), Value::Object(b)) => {
            let keys: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
            for key in keys {
                let va = a.get(key).unwrap_or(&Value::Null);
                let vb = b.get(key).unwrap_or(&Value::Null);
                walk(name, &child(key), va, vb, tol, out);
            }
        }
        (Value::Array(a), Value::Array(b)) if a.len() == b.len() => {
            for (i, (va, vb)) in a.iter().zip(b).enumerate() {
                walk(name, &format!("{field}[{i}]"), va, vb, tol, out);
            }
        }
        _ if left == right => {}
        _ => changed(out),
    }
}

/// Compare two entries already in JSON form. Object fields are visited in
/// key order, so differences come out sorted by field path.
pub fn compare_values(name: &str, left: &Value, right: &Value, tol: &Tolerance) -> Vec<Difference> {
    let mut out = Vec::new();
    walk(name, "", left, right, tol, &mut out);
    out
}

fn index<'a, T: Serialize>(
    items: &'a [T],
    key: &impl Fn(&T) -> &str,
) -> CsResult<BTreeMap<String, &'a T>> {
    let mut map = BTreeMap::new();
    for item in items {
        let name = key(item);
        if map.insert(name.to_ascii_uppercase(), item).is_some() {
            return Err(CsError::DuplicateName(name.to_string()));
        }
    }
    Ok(map)
}

/// Diff two dictionaries. Names match ignoring case; the result is ordered
/// by name.
pub fn compare<T, K>(left: &[T], right: &[T], key: K, tol: &Tolerance) -> CsResult<Vec<Difference>>
where
    T: Serialize,
    K: Fn(&T) -> &str,
{
    let left = index(left, &key)?;
    let right = index(right, &key)?;
    let to_json = |item: &T| serde_json::to_value(item).map_err(|e| CsError::Internal(e.to_string()));

    let mut out = Vec::new();
    for (upper, l) in &left {
        match right.get(upper) {
            Some(r) => out.extend(compare_values(key(l), &to_json(l)?, &to_json(r)?, tol)),
            None => out.push(Difference::Removed(key(l).to_string())),
        }
    }
    for (upper, r) in &right {
        if !left.contains_key(upper) {
            out.push(Difference::Added(key(r).to_string()));
        }
    }
    Ok(out)
}
