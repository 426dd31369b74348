use std::cmp::Ordering;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};

use serde_json::Value;
use tracing::{error, warn};

use crate::data::{self, ValueType};

fn wrong_type(filter: &'static str, value: &Value) -> Value {
    warn!(filter, found = %ValueType::of(value), "filter cannot use a value of this type");
    Value::Null
}

/// Stable sort of a list of mappings (by dotted key) or of lists (by
/// index). An `order` starting with `r` sorts descending.
pub(super) fn dict_sort(value: &Value, key: &Value, order: &Value) -> Value {
    let Value::Array(items) = value else {
        return wrong_type("dictsort", value);
    };
    let Some(first) = items.first() else {
        return Value::Array(Vec::new());
    };
    let descending = data::display(order).to_lowercase().starts_with('r');

    let keys: Result<Vec<&Value>, String> = match first {
        Value::Object(_) => {
            let path = data::display(key);
            items
                .iter()
                .map(|item| data::walk(item, &path).map_err(|e| e.to_string()))
                .collect()
        }
        Value::Array(_) => {
            let index = data::to_i64(key).unwrap_or(0);
            items.iter().map(|item| nth(item, index)).collect()
        }
        _ => return wrong_type("dictsort", first),
    };
    let keys = match keys {
        Ok(keys) => keys,
        Err(reason) => {
            error!(key = %data::display(key), %reason, "dictsort could not read sort key");
            return Value::Null;
        }
    };
    if keys.iter().any(|k| sort_order(keys[0], k).is_none()) {
        error!(key = %data::display(key), "dictsort keys cannot be compared");
        return Value::Null;
    }

    let mut positions: Vec<usize> = (0..items.len()).collect();
    positions.sort_by(|&a, &b| {
        let ordering = sort_order(keys[a], keys[b]).unwrap_or(Ordering::Equal);
        if descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
    Value::Array(positions.into_iter().map(|i| items[i].clone()).collect())
}

fn nth(item: &Value, index: i64) -> Result<&Value, String> {
    let Value::Array(inner) = item else {
        return Err(format!("cannot index into {}", ValueType::of(item)));
    };
    let resolved = if index < 0 { inner.len() as i64 + index } else { index };
    usize::try_from(resolved)
        .ok()
        .and_then(|i| inner.get(i))
        .ok_or_else(|| format!("index {} out of range", index))
}

fn sort_order(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Number(_) | Value::Bool(_), Value::Number(_) | Value::Bool(_)) => {
            data::to_f64(a)?.partial_cmp(&data::to_f64(b)?)
        }
        _ => None,
    }
}

pub(super) fn first(value: &Value) -> Value {
    match value {
        Value::Array(items) if !items.is_empty() => items[0].clone(),
        Value::String(s) if !s.is_empty() => s.chars().next().map_or(Value::Null, |c| Value::String(c.to_string())),
        Value::Array(_) | Value::String(_) => {
            warn!(filter = "first", "value is empty");
            Value::Null
        }
        other => wrong_type("first", other),
    }
}

pub(super) fn last(value: &Value) -> Value {
    match value {
        Value::Array(items) if !items.is_empty() => items[items.len() - 1].clone(),
        Value::String(s) if !s.is_empty() => s.chars().last().map_or(Value::Null, |c| Value::String(c.to_string())),
        Value::Array(_) | Value::String(_) => {
            warn!(filter = "last", "value is empty");
            Value::Null
        }
        other => wrong_type("last", other),
    }
}

/// Joins scalar items with `joiner`. A string value is first split on
/// `splitter`.
pub(super) fn join(value: &Value, joiner: &str, splitter: &str) -> Value {
    let parts: Vec<String> = match value {
        Value::String(s) => s.split(splitter).map(str::to_string).collect(),
        Value::Array(items) => items
            .iter()
            .filter(|item| matches!(item, Value::String(_) | Value::Number(_) | Value::Bool(_)))
            .map(data::display)
            .collect(),
        other => return wrong_type("join", other),
    };
    Value::String(parts.join(joiner))
}

fn size(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        Value::Object(map) => Some(map.len()),
        _ => None,
    }
}

pub(super) fn length(value: &Value, extra: &Value) -> Value {
    match size(value) {
        Some(n) => Value::from(n as i64 + data::to_i64(extra).unwrap_or(0)),
        None => wrong_type("length", value),
    }
}

pub(super) fn length_is(value: &Value, expected: &Value) -> Value {
    match size(value) {
        Some(n) => Value::Bool(Some(n as i64) == data::to_i64(expected)),
        None => {
            wrong_type("length_is", value);
            Value::Bool(false)
        }
    }
}

pub(super) fn make_list(value: &Value) -> Value {
    match value {
        Value::String(_) | Value::Number(_) => Value::Array(
            data::display(value)
                .chars()
                .map(|c| Value::String(c.to_string()))
                .collect(),
        ),
        Value::Array(_) => value.clone(),
        other => wrong_type("make_list", other),
    }
}

fn pick(len: usize) -> usize {
    let mut hasher = RandomState::new().build_hasher();
    hasher.write_usize(len);
    (hasher.finish() % len as u64) as usize
}

pub(super) fn random(value: &Value) -> Value {
    match value {
        Value::Array(items) if !items.is_empty() => items[pick(items.len())].clone(),
        Value::String(s) if !s.is_empty() => {
            let chars: Vec<char> = s.chars().collect();
            Value::String(chars[pick(chars.len())].to_string())
        }
        Value::Array(_) | Value::String(_) => {
            warn!(filter = "random", "value is empty");
            Value::Null
        }
        other => wrong_type("random", other),
    }
}

/// `start:stop:step` slicing with negative indices counted from the end. A
/// bare number `n` means `:n`.
pub(super) fn slice(value: &Value, spec: &str) -> Value {
    let bounds: Result<Vec<Option<i64>>, _> = spec
        .split(':')
        .map(|part| {
            let part = part.trim();
            if part.is_empty() {
                Ok(None)
            } else {
                part.parse::<i64>().map(Some)
            }
        })
        .collect();
    let (start, stop, step) = match bounds.as_deref() {
        Ok([stop]) => (None, *stop, None),
        Ok([start, stop]) => (*start, *stop, None),
        Ok([start, stop, step]) => (*start, *stop, *step),
        _ => {
            warn!(filter = "slice", spec, "invalid slice");
            return value.clone();
        }
    };
    let step = step.unwrap_or(1);
    if step == 0 {
        warn!(filter = "slice", spec, "slice step cannot be zero");
        return value.clone();
    }

    match value {
        Value::Array(items) => {
            let picked = slice_positions(items.len(), start, stop, step);
            Value::Array(picked.into_iter().map(|i| items[i].clone()).collect())
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let picked = slice_positions(chars.len(), start, stop, step);
            Value::String(picked.into_iter().map(|i| chars[i]).collect())
        }
        other => wrong_type("slice", other),
    }
}

fn slice_positions(len: usize, start: Option<i64>, stop: Option<i64>, step: i64) -> Vec<usize> {
    let len = len as i64;
    let clamp = |index: i64, low: i64, high: i64| {
        let index = if index < 0 { index + len } else { index };
        index.clamp(low, high)
    };
    let mut positions = Vec::new();
    if step > 0 {
        let mut i = start.map_or(0, |s| clamp(s, 0, len));
        let stop = stop.map_or(len, |s| clamp(s, 0, len));
        while i < stop {
            positions.push(i as usize);
            match i.checked_add(step) {
                Some(next) => i = next,
                None => break,
            }
        }
    } else {
        let mut i = start.map_or(len - 1, |s| clamp(s, -1, len - 1));
        let stop = stop.map_or(-1, |s| clamp(s, -1, len - 1));
        while i > stop {
            positions.push(i as usize);
            match i.checked_add(step) {
                Some(next) => i = next,
                None => break,
            }
        }
    }
    positions
}

pub(super) fn unordered_list(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::String(list_items(items, 1)),
        other => wrong_type("unordered_list", other),
    }
}

/// `<li>` lines for `items`; a list directly after an item holds that
/// item's children.
fn list_items(items: &[Value], depth: usize) -> String {
    let indent = "\t".repeat(depth);
    let mut lines = Vec::new();
    let mut iter = items.iter().peekable();
    while let Some(item) = iter.next() {
        let children = match iter.peek() {
            Some(Value::Array(children)) => {
                iter.next();
                Some(children)
            }
            _ => None,
        };
        let sublist = match children {
            Some(children) if !children.is_empty() => format!(
                "\n{indent}<ul>\n{}\n{indent}</ul>\n{indent}",
                list_items(children, depth + 1),
                indent = indent
            ),
            _ => String::new(),
        };
        lines.push(format!("{}<li>{}{}</li>", indent, data::display(item), sublist));
    }
    lines.join("\n")
}

/// `expected` converted to the type of `field`, if it can be.
fn coerce_like(field: &Value, expected: &Value) -> Option<Value> {
    if expected.is_null() {
        return None;
    }
    match field {
        Value::String(_) => Some(Value::String(data::display(expected))),
        Value::Number(n) if !n.is_f64() => match expected {
            Value::Number(e) => e
                .as_i64()
                .or_else(|| e.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
        .map(Value::from),
        Value::Number(_) => data::to_f64(expected).and_then(data::float),
        Value::Bool(_) => match expected {
            Value::Bool(b) => Some(Value::Bool(*b)),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" => Some(Value::Bool(true)),
                "false" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            Value::Number(_) => Some(Value::Bool(data::is_truthy(expected))),
            _ => None,
        },
        Value::Array(_) | Value::Object(_) => Some(expected.clone()),
        Value::Null => None,
    }
}

fn field_matches(item: &Value, key: &str, expected: &Value) -> bool {
    match data::walk(item, key) {
        Ok(field) if !field.is_null() => coerce_like(field, expected).is_some_and(|e| &e == field),
        _ => false,
    }
}

/// First mapping in the list whose `key` field equals `expected`.
pub(super) fn find_where(value: &Value, key: &Value, expected: &Value) -> Value {
    let Value::Array(items) = value else {
        return wrong_type("where", value);
    };
    let key = data::display(key);
    if key.is_empty() {
        return Value::Null;
    }
    items
        .iter()
        .find(|item| field_matches(item, &key, expected))
        .cloned()
        .unwrap_or(Value::Null)
}

/// Every mapping in the list whose `key` field equals `expected`.
pub(super) fn find_where_all(value: &Value, key: &Value, expected: &Value) -> Value {
    let Value::Array(items) = value else {
        return wrong_type("whereall", value);
    };
    let key = data::display(key);
    if key.is_empty() {
        return Value::Array(Vec::new());
    }
    Value::Array(
        items
            .iter()
            .filter(|item| field_matches(item, &key, expected))
            .cloned()
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dict_sort_by_dotted_key() {
        let people = json!([
            {"name": "b", "meta": {"age": 30}},
            {"name": "a", "meta": {"age": 20}},
            {"name": "c", "meta": {"age": 25}}
        ]);
        let sorted = dict_sort(&people, &json!("meta.age"), &json!(""));
        let names: Vec<_> = sorted.as_array().unwrap().iter().map(|p| p["name"].clone()).collect();
        assert_eq!(names, vec![json!("a"), json!("c"), json!("b")]);

        let sorted = dict_sort(&people, &json!("name"), &json!("reverse"));
        assert_eq!(sorted[0]["name"], json!("c"));
    }

    #[test]
    fn dict_sort_lists_by_index() {
        let rows = json!([[1, "z"], [2, "a"]]);
        assert_eq!(dict_sort(&rows, &json!("1"), &json!("")), json!([[2, "a"], [1, "z"]]));
        assert_eq!(dict_sort(&rows, &json!("-2"), &json!("r")), json!([[2, "a"], [1, "z"]]));
    }

    #[test]
    fn dict_sort_is_stable() {
        let rows = json!([{"k": 1, "n": 1}, {"k": 0, "n": 2}, {"k": 1, "n": 3}]);
        let sorted = dict_sort(&rows, &json!("k"), &json!(""));
        assert_eq!(sorted, json!([{"k": 0, "n": 2}, {"k": 1, "n": 1}, {"k": 1, "n": 3}]));
    }

    #[test]
    fn dict_sort_failures() {
        assert_eq!(dict_sort(&json!([{"a": 1}]), &json!("b"), &json!("")), Value::Null);
        assert_eq!(dict_sort(&json!([{"a": 1}, {"a": "x"}]), &json!("a"), &json!("")), Value::Null);
        assert_eq!(dict_sort(&json!("text"), &json!("a"), &json!("")), Value::Null);
        assert_eq!(dict_sort(&json!([]), &json!("a"), &json!("")), json!([]));
    }

    #[test]
    fn first_last_join() {
        assert_eq!(first(&json!([3, 4])), json!(3));
        assert_eq!(last(&json!("abc")), json!("c"));
        assert_eq!(first(&json!([])), Value::Null);
        assert_eq!(join(&json!(["a", 1, null, "b"]), ", ", " "), json!("a, 1, b"));
        assert_eq!(join(&json!("item1;item2"), ", ", ";"), json!("item1, item2"));
    }

    #[test]
    fn lengths() {
        assert_eq!(length(&json!("name"), &json!(0)), json!(4));
        assert_eq!(length(&json!([1, 2]), &json!("3")), json!(5));
        assert_eq!(length(&json!(5), &json!(0)), Value::Null);
        assert_eq!(length_is(&json!("name"), &json!("4")), json!(true));
        assert_eq!(length_is(&json!({"a": 1}), &json!(2)), json!(false));
    }

    #[test]
    fn slicing() {
        let items = json!([0, 1, 2, 3, 4]);
        assert_eq!(slice(&items, "2"), json!([0, 1]));
        assert_eq!(slice(&items, "1:3"), json!([1, 2]));
        assert_eq!(slice(&items, "-2:"), json!([3, 4]));
        assert_eq!(slice(&items, "::-2"), json!([4, 2, 0]));
        assert_eq!(slice(&json!("hello"), "1:-1"), json!("ell"));
        assert_eq!(slice(&items, "a:b"), items);
    }

    #[test]
    fn huge_slice_steps_stop_at_the_end() {
        let items = json!([1, 2, 3]);
        assert_eq!(slice(&items, "1::9223372036854775807"), json!([2]));
        assert_eq!(slice(&items, "::-9223372036854775808"), json!([3]));
    }

    #[test]
    fn nested_unordered_list() {
        let value = json!(["States", ["Kansas", ["Lawrence", "Topeka"], "Illinois"]]);
        let expected = "\t<li>States\n\t<ul>\n\t\t<li>Kansas\n\t\t<ul>\n\t\t\t<li>Lawrence</li>\n\t\t\t<li>Topeka</li>\n\t\t</ul>\n\t\t</li>\n\t\t<li>Illinois</li>\n\t</ul>\n\t</li>";
        assert_eq!(unordered_list(&value), json!(expected));
    }

    #[test]
    fn where_matches_coerced_fields() {
        let products = json!([
            {"id": 1, "type": "toy", "stock": 0},
            {"id": 2, "type": "book", "stock": 5},
            {"id": 3, "type": "toy", "stock": 2}
        ]);
        assert_eq!(find_where(&products, &json!("id"), &json!("2"))["type"], json!("book"));
        assert_eq!(find_where(&products, &json!("stock"), &json!("0"))["id"], json!(1));
        assert_eq!(find_where(&products, &json!("id"), &json!("9")), Value::Null);
        let toys = find_where_all(&products, &json!("type"), &json!("toy"));
        assert_eq!(toys.as_array().map(Vec::len), Some(2));
        assert_eq!(find_where_all(&products, &json!(""), &json!("toy")), json!([]));
    }

    #[test]
    fn make_list_and_random() {
        assert_eq!(make_list(&json!(123)), json!(["1", "2", "3"]));
        let picked = random(&json!([7, 8, 9]));
        assert!([json!(7), json!(8), json!(9)].contains(&picked));
        assert_eq!(random(&json!([])), Value::Null);
    }
}
