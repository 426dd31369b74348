//! Dataset values and dotted-path access.
//!
//! Datasets are JSON objects. Values display the way the template language
//! has always printed them: `True`/`False` for booleans, nothing for null,
//! `10.0` for whole floats and compact JSON for collections.

use std::collections::HashSet;
use std::fmt;

use serde_json::{Map, Number, Value};

pub type Dataset = Map<String, Value>;

/// Concrete type of a dataset value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Null,
    Bool,
    Int,
    Float,
    Str,
    List,
    Dict,
}

impl ValueType {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Bool,
            Value::Number(n) if n.is_f64() => ValueType::Float,
            Value::Number(_) => ValueType::Int,
            Value::String(_) => ValueType::Str,
            Value::Array(_) => ValueType::List,
            Value::Object(_) => ValueType::Dict,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueType::Null => "null",
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Str => "str",
            ValueType::List => "list",
            ValueType::Dict => "dict",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The shape a caller asks `get_data` for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Any,
    /// Yields the value's type name instead of the value.
    Type,
    Dict,
    List,
    Str,
    Bool,
    /// Int or float.
    Number,
    Int,
    Float,
}

impl Kind {
    pub fn accepts(self, ty: ValueType) -> bool {
        match self {
            Kind::Any | Kind::Type => true,
            Kind::Dict => ty == ValueType::Dict,
            Kind::List => ty == ValueType::List,
            Kind::Str => ty == ValueType::Str,
            Kind::Bool => ty == ValueType::Bool,
            Kind::Number => matches!(ty, ValueType::Int | ValueType::Float),
            Kind::Int => ty == ValueType::Int,
            Kind::Float => ty == ValueType::Float,
        }
    }
}

/// Why a dotted path could not be followed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkError {
    MissingKey(String),
    /// Non-numeric or out-of-range segment on a list.
    BadIndex(String),
    /// Tried to step into a scalar.
    NotContainer(ValueType),
}

impl fmt::Display for WalkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalkError::MissingKey(key) => write!(f, "invalid key ({}) for dictionary/object", key),
            WalkError::BadIndex(index) => write!(f, "invalid index ({}) for list/array", index),
            WalkError::NotContainer(ty) => write!(f, "cannot step into value of type {}", ty),
        }
    }
}

/// Follows `path` (`a.b.0.c`) from `root`.
pub fn walk<'a>(root: &'a Value, path: &str) -> Result<&'a Value, WalkError> {
    let mut current = root;
    for step in path.split('.') {
        current = match current {
            Value::Object(map) => map
                .get(step)
                .ok_or_else(|| WalkError::MissingKey(step.to_string()))?,
            Value::Array(items) => step
                .parse::<usize>()
                .ok()
                .and_then(|idx| items.get(idx))
                .ok_or_else(|| WalkError::BadIndex(step.to_string()))?,
            other => return Err(WalkError::NotContainer(ValueType::of(other))),
        };
    }
    Ok(current)
}

/// Like [`walk`] but starting from a dataset map.
pub fn walk_dataset<'a>(dataset: &'a Dataset, path: &str) -> Result<&'a Value, WalkError> {
    let (head, tail) = match path.split_once('.') {
        Some((head, tail)) => (head, Some(tail)),
        None => (path, None),
    };
    let first = dataset
        .get(head)
        .ok_or_else(|| WalkError::MissingKey(head.to_string()))?;
    match tail {
        Some(rest) => walk(first, rest),
        None => Ok(first),
    }
}

/// Every dotted path reachable in `dataset`, list indices included.
pub fn key_set(dataset: &Dataset) -> HashSet<String> {
    let mut keys = HashSet::new();
    for (key, value) in dataset {
        collect_keys(value, key.clone(), &mut keys);
    }
    keys
}

fn collect_keys(value: &Value, path: String, keys: &mut HashSet<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                collect_keys(child, format!("{}.{}", path, key), keys);
            }
        }
        Value::Array(items) => {
            for (idx, child) in items.iter().enumerate() {
                collect_keys(child, format!("{}.{}", path, idx), keys);
            }
        }
        _ => {}
    }
    keys.insert(path);
}

/// Reads a bare word as a number: integer if it has no `.`, float otherwise.
pub fn parse_number(text: &str) -> Option<Value> {
    if text.contains('.') {
        text.parse::<f64>().ok().and_then(float)
    } else {
        text.parse::<i64>().ok().map(Value::from)
    }
}

pub fn float(f: f64) -> Option<Value> {
    Number::from_f64(f).map(Value::Number)
}

/// Float value, or null when not representable (NaN, infinity).
pub fn float_or_null(f: f64) -> Value {
    float(f).unwrap_or(Value::Null)
}

/// Template-facing string form of a value.
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => format_float(f),
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// `10.0`, `0.25`, `1e+22` style float text.
pub fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else if f.is_finite() && f.abs() >= 1e16 {
        let text = format!("{:e}", f);
        match text.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{:0>2}", mantissa, exp),
            Some((mantissa, exp)) => format!("{}e-{:0>2}", mantissa, &exp[1..]),
            None => text,
        }
    } else {
        f.to_string()
    }
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Lenient numeric reading used by filters: numbers as-is, numeric strings
/// parsed, booleans as 0/1.
pub fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(f64::from(u8::from(*b))),
        _ => None,
    }
}

/// Lenient integer reading; floats and float strings truncate.
pub fn to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.trunc() as i64))
        }
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}
