use serde_json::Value;
use tracing::{error, warn};

use crate::data::{self, ValueType};

const SIZE_UNITS: &[&str] = &["bytes", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB", "ZiB", "YiB"];

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

/// Numbers as-is; strings only when they read cleanly as a number.
fn numeric(value: &Value) -> Option<Num> {
    match value {
        Value::Number(n) if !n.is_f64() => n.as_i64().map(Num::Int),
        Value::Number(n) => n.as_f64().map(Num::Float),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                Some(Num::Int(i))
            } else if s.contains('.') {
                s.parse::<f64>().ok().map(Num::Float)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Numeric sum when both sides read as numbers, list concatenation for two
/// lists, string concatenation otherwise.
pub(super) fn add(value: &Value, operand: &Value) -> Value {
    match (value, operand) {
        (Value::Array(a), Value::Array(b)) => return Value::Array(a.iter().chain(b).cloned().collect()),
        (Value::Null | Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_)) => {
            warn!(
                filter = "add",
                value = %ValueType::of(value),
                operand = %ValueType::of(operand),
                "cannot add these types"
            );
            return Value::Null;
        }
        _ => {}
    }
    match (numeric(value), numeric(operand)) {
        (Some(Num::Int(a)), Some(Num::Int(b))) => a
            .checked_add(b)
            .map(Value::from)
            .unwrap_or_else(|| data::float_or_null(a as f64 + b as f64)),
        (Some(a), Some(b)) => data::float_or_null(as_f64(a) + as_f64(b)),
        _ => Value::String(format!("{}{}", data::display(value), data::display(operand))),
    }
}

fn as_f64(n: Num) -> f64 {
    match n {
        Num::Int(i) => i as f64,
        Num::Float(f) => f,
    }
}

pub(super) fn divisible_by(value: &Value, divisor: &Value) -> Value {
    if !matches!(value, Value::String(_) | Value::Number(_)) {
        warn!(filter = "divisibleby", found = %ValueType::of(value), "filter cannot use a value of this type");
        return Value::Null;
    }
    let left = data::to_f64(value).unwrap_or(0.0);
    let right = data::to_f64(divisor).unwrap_or(0.0);
    if left > 0.0 && right > 0.0 {
        Value::Bool(left % right == 0.0)
    } else {
        error!(left, right, "divisibleby needs two positive numbers");
        Value::Null
    }
}

pub(super) fn file_size_format(value: &Value) -> Value {
    let size = match value {
        Value::String(_) | Value::Number(_) => data::to_f64(value),
        _ => None,
    };
    let Some(mut size) = size else {
        warn!(filter = "filesizeformat", value = %data::display(value), "not a size");
        return Value::Null;
    };
    let mut unit = 0;
    while size >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    let number = format!("{:.2}", size);
    let number = number.trim_end_matches('0').trim_end_matches('.');
    Value::String(format!("{} {}", number, SIZE_UNITS[unit]))
}

/// Rounds to `decimals` places. Non-negative counts pad with zeros; negative
/// counts round to `|decimals|` places and drop a zero fraction entirely.
pub(super) fn float_format(value: &Value, decimals: &Value) -> Value {
    let decimals = data::to_i64(decimals).unwrap_or(-1);
    let number = match value {
        Value::Null => 0.0,
        Value::String(s) if s.is_empty() => 0.0,
        other => match data::to_f64(other) {
            Some(f) => f,
            None => {
                warn!(filter = "floatformat", value = %data::display(other), "not a number");
                return value.clone();
            }
        },
    };

    if decimals >= 0 {
        let places = usize::try_from(decimals).unwrap_or(usize::MAX).min(u16::MAX as usize);
        return Value::String(format!("{:.*}", places, number));
    }

    let places = usize::try_from(decimals.unsigned_abs()).unwrap_or(usize::MAX).min(u16::MAX as usize);
    let rounded = format!("{:.*}", places, number).parse::<f64>().unwrap_or(number);
    let text = if rounded.fract() == 0.0 && rounded.abs() < 9.0e18 {
        (rounded as i64).to_string()
    } else if rounded.fract() == 0.0 {
        format!("{:.0}", rounded)
    } else {
        data::format_float(rounded)
    };
    Value::String(text)
}

/// The `position`-th digit from the right (1-based). Anything out of range
/// returns the input unchanged.
pub(super) fn get_digit(value: &Value, position: &Value) -> Value {
    let digits = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) if !n.is_f64() => n.to_string(),
        _ => {
            warn!(filter = "get_digit", found = %ValueType::of(value), "filter cannot use a value of this type");
            return value.clone();
        }
    };
    let length = digits.chars().count();
    let Some(position) = data::to_i64(position) else {
        error!(position = %data::display(position), "get_digit position is not a number");
        return value.clone();
    };
    let index = match usize::try_from(position) {
        Ok(p) if (1..=length).contains(&p) => p - 1,
        _ => {
            error!(length, position, "get_digit position out of range");
            return value.clone();
        }
    };
    match digits.chars().rev().nth(index).and_then(|c| c.to_digit(10)) {
        Some(digit) => Value::from(digit),
        None => {
            error!(value = %digits, position, "get_digit found a non-digit");
            value.clone()
        }
    }
}
