use dtlite::filters::{apply, Filter};
use dtlite::{render, Dataset};
use proptest::prelude::*;
use serde_json::{json, Value};

fn dataset(value: Value) -> Dataset {
    match value {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

// Records with distinct sort keys and a marker of their original position.
fn records_strategy() -> impl Strategy<Value = Vec<Value>> {
    prop::collection::hash_set(-1000i64..1000, 0..20).prop_map(|keys| {
        keys.into_iter()
            .enumerate()
            .map(|(position, key)| json!({"key": key, "position": position}))
            .collect()
    })
}

proptest! {
    #[test]
    fn if_else_picks_exactly_one_branch(flag in any::<bool>(), a in "[a-z]{1,8}", b in "[A-Z]{1,8}") {
        let template = format!("{{% if flag %}}{}{{% else %}}{}{{% endif %}}", a, b);
        let out = render(&template, &dataset(json!({"flag": flag}))).unwrap();
        prop_assert_eq!(out, if flag { a } else { b });
    }

    #[test]
    fn for_concatenates_items_in_order(items in prop::collection::vec(any::<i64>(), 0..30)) {
        let out = render("{% for n in items %}{{ n }};{% endfor %}", &dataset(json!({"items": items}))).unwrap();
        let expected: String = items.iter().map(|n| format!("{};", n)).collect();
        prop_assert_eq!(out, expected);
    }

    #[test]
    fn dictsort_reversed_is_exact_reverse(records in records_strategy()) {
        let list = Value::Array(records);
        let ascending = apply(Filter::DictSort, &list, &[json!("key")]);
        let descending = apply(Filter::DictSortReversed, &list, &[json!("key")]);
        let mut reversed = ascending.as_array().cloned().unwrap_or_default();
        reversed.reverse();
        prop_assert_eq!(Value::Array(reversed), descending);
    }

    #[test]
    fn floatformat_is_idempotent(value in -1.0e6f64..1.0e6, places in 0i64..6) {
        let places = json!(places.to_string());
        let once = apply(Filter::FloatFormat, &json!(value), &[places.clone()]);
        let twice = apply(Filter::FloatFormat, &once, &[places]);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn get_digit_matches_decimal_text(value in 0u32..u32::MAX, extra in 1usize..5) {
        let text = value.to_string();
        for n in 1..=text.len() {
            let expected = text.chars().rev().nth(n - 1).and_then(|c| c.to_digit(10)).unwrap();
            prop_assert_eq!(apply(Filter::GetDigit, &json!(value), &[json!(n)]), json!(expected));
        }
        let outside = text.len() + extra;
        prop_assert_eq!(apply(Filter::GetDigit, &json!(value), &[json!(outside)]), json!(value));
    }

    #[test]
    fn child_scopes_leave_parent_untouched(items in prop::collection::vec("[a-z]{0,6}", 0..10)) {
        let out = render(
            "{% for title in items %}{{ title }}{% endfor %}|{{ title }}",
            &dataset(json!({"title": "parent", "items": items})),
        )
        .unwrap();
        prop_assert_eq!(out, format!("{}|parent", items.concat()));
    }
}
