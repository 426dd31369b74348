use dtlite::{render, render_with, Config, Dataset, Engine, MemoryLoader};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn dataset(value: Value) -> Dataset {
    match value {
        Value::Object(map) => map,
        other => panic!("dataset must be an object, got {}", other),
    }
}

fn render_json(template: &str, value: Value) -> String {
    render(template, &dataset(value)).unwrap()
}

// ── Basic substitution ──

#[test]
fn hello_world() {
    assert_eq!(render_json("Hello {{ name }}!", json!({"name": "World"})), "Hello World!");
}

#[test]
fn missing_key_renders_empty() {
    assert_eq!(render_json("[{{ missing.key }}]", json!({})), "[]");
}

#[test]
fn plain_text_passes_through() {
    assert_eq!(render_json("no tags at all\n", json!({})), "no tags at all\n");
}

#[test]
fn values_print_python_style() {
    let out = render_json(
        "{{ price }} {{ count }} {{ ok }} {{ none }}|{{ tags }}",
        json!({"price": 10.0, "count": 3, "ok": true, "none": null, "tags": ["a", 1]}),
    );
    assert_eq!(out, "10.0 3 True |[\"a\",1]");
}

#[test]
fn dotted_paths_index_lists() {
    let out = render_json(
        "{{ posts.1.title }} by {{ posts.1.author.name }}",
        json!({"posts": [{"title": "A"}, {"title": "B", "author": {"name": "Ann"}}]}),
    );
    assert_eq!(out, "B by Ann");
}

// ── Conditionals ──

#[test]
fn if_else_on_comparison() {
    let template = "{% if age > 17 %}adult{% else %}minor{% endif %}";
    assert_eq!(render_json(template, json!({"age": 20})), "adult");
    assert_eq!(render_json(template, json!({"age": 10})), "minor");
}

#[test]
fn elif_chain_stops_at_first_match() {
    let template = "{% if n < 0 %}neg{% elif n == 0 %}zero{% elif n < 10 %}small{% else %}big{% endif %}";
    assert_eq!(render_json(template, json!({"n": -3})), "neg");
    assert_eq!(render_json(template, json!({"n": 0})), "zero");
    assert_eq!(render_json(template, json!({"n": 4})), "small");
    assert_eq!(render_json(template, json!({"n": 40})), "big");
}

#[test]
fn conditions_with_strings_and_membership() {
    let data = json!({"role": "admin", "tags": ["rust", "web"], "meta": {"draft": false}});
    assert_eq!(render_json("{% if role == \"admin\" %}yes{% endif %}", data.clone()), "yes");
    assert_eq!(render_json("{% if \"web\" in tags %}yes{% endif %}", data.clone()), "yes");
    assert_eq!(render_json("{% if not meta.draft %}live{% endif %}", data.clone()), "live");
    assert_eq!(
        render_json("{% if ( role == \"guest\" or \"rust\" in tags ) and not meta.draft %}ok{% endif %}", data),
        "ok"
    );
}

#[test]
fn unbound_operand_makes_condition_false() {
    let template = "{% if nobody > 3 %}yes{% else %}no{% endif %}";
    assert_eq!(render_json(template, json!({})), "no");
}

#[test]
fn boolean_filters_drive_conditions() {
    let template = "{% for n in nums %}{% if n|divisibleby:\"3\" %}F{% else %}{{ n }}{% endif %}{% endfor %}";
    assert_eq!(render_json(template, json!({"nums": [1, 2, 3, 4, 5, 6]})), "12F45F");
}

#[test]
fn bare_numbers_compare_as_numbers() {
    assert_eq!(render_json("{% if 2.5 > 2 %}yes{% endif %}", json!({})), "yes");
    assert_eq!(render_json("{% if score >= 9.5 %}top{% endif %}", json!({"score": 9.75})), "top");
}

#[test]
fn floor_division_with_negative_divisors() {
    for condition in ["7 // -2 == -4", "-7 // -2 == 3", "-7 // 2 == -4", "7 // 2 == 3"] {
        let template = format!("{{% if {} %}}ok{{% else %}}bad{{% endif %}}", condition);
        assert_eq!(render_json(&template, json!({})), "ok", "{}", condition);
    }
}

#[test]
fn oversized_repetition_makes_condition_false() {
    let template = "{% if \"ab\" * 99999999999999999 %}y{% else %}n{% endif %}";
    assert_eq!(render_json(template, json!({})), "n");
    assert_eq!(render_json("{% if \"ab\" * 2 == \"abab\" %}y{% endif %}", json!({})), "y");
}

#[test]
fn parentheses_may_touch_operands() {
    let template = "{% if (age > 17) and (role == \"admin\") %}yes{% else %}no{% endif %}";
    assert_eq!(render_json(template, json!({"age": 20, "role": "admin"})), "yes");
    assert_eq!(render_json(template, json!({"age": 12, "role": "admin"})), "no");
}

// ── Loops ──

#[test]
fn for_concatenates_in_order() {
    let template = "{% for n in nums %}{{ n }},{% endfor %}";
    assert_eq!(render_json(template, json!({"nums": [1, 2, 3]})), "1,2,3,");
    assert_eq!(render_json(template, json!({"nums": []})), "");
}

#[test]
fn nested_loops_see_outer_variables() {
    let template = "{% for row in rows %}{% for cell in row.cells %}{{ row.name }}{{ cell }} {% endfor %}{% endfor %}";
    let data = json!({"rows": [{"name": "a", "cells": [1, 2]}, {"name": "b", "cells": [3]}]});
    assert_eq!(render_json(template, data), "a1 a2 b3 ");
}

#[test]
fn forloop_helper_is_bound() {
    let template = "{% for x in xs %}{{ forloop.counter }}{% if forloop.last %}.{% else %},{% endif %}{% endfor %}";
    assert_eq!(render_json(template, json!({"xs": ["a", "b", "c"]})), "1,2,3.");
}

#[test]
fn for_over_non_list_is_empty() {
    assert_eq!(render_json("{% for c in name %}{{ c }}{% endfor %}", json!({"name": "abc"})), "");
    assert_eq!(render_json("{% for c in %}{{ c }}{% endfor %}", json!({})), "");
}

#[test]
fn loop_variable_does_not_leak_into_parent() {
    let template = "{% for name in names %}{{ name }}{% endfor %}-{{ name }}";
    assert_eq!(
        render_json(template, json!({"name": "outer", "names": ["a", "b"]})),
        "ab-outer"
    );
}

// ── Other directives ──

#[test]
fn firstof_skips_empty_and_missing() {
    let template = "{% firstof blank missing \"fallback\" %}";
    assert_eq!(render_json(template, json!({"blank": ""})), "fallback");
    assert_eq!(render_json("{% firstof a b %}", json!({"a": "", "b": 0})), "0");
    assert_eq!(render_json("{% firstof a %}", json!({})), "");
}

#[test]
fn length_counts_collections_and_text() {
    let data = json!({"items": [1, 2, 3], "title": "hello", "map": {"a": 1, "b": 2}});
    assert_eq!(render_json("{% length items %}", data.clone()), "3");
    assert_eq!(render_json("{% length title %}", data.clone()), "5");
    assert_eq!(render_json("{% length map %}", data), "2");
}

#[test]
fn replace_directive_and_emit_agree() {
    let data = json!({"name": "Ann"});
    assert_eq!(render_json("{% replace name|upper %}", data.clone()), render_json("{{ name|upper }}", data));
}

#[test]
fn filter_block_pipes_rendered_body() {
    let data = json!({"name": "ann"});
    assert_eq!(render_json("{% filter upper %}hi {{ name }}{% endfilter %}", data.clone()), "HI ANN");
    assert_eq!(
        render_json("{% filter lower|title %}HELLO there{% endfilter %}", data.clone()),
        "Hello There"
    );
    assert_eq!(render_json("{% filter cut:\" \" %}a b c{% endfilter %}", data), "abc");
}

#[test]
fn copy_comment_and_unknown_directives() {
    assert_eq!(render_json("{% copy {{ raw }} %}", json!({})), "{{ raw }}");
    assert_eq!(render_json("a{% comment hidden %}b{# note #}c", json!({})), "abc");
    assert_eq!(render_json("a{% block content %}b", json!({})), "ab");
}

#[test]
fn include_and_dataset_directives() {
    let loader = MemoryLoader::new()
        .with_template("part.html", "<b>{{ name }}</b>")
        .with_template("broken.html", "{% if x %}")
        .with_dataset_json("extra.json", r#"{"name": "Bo", "year": 2021}"#);
    let config = Config::default();
    let render = |template: &str, value: Value| render_with(&config, &loader, template, &dataset(value)).unwrap();

    assert_eq!(render("[{% usetemplate \"part.html\" %}]", json!({"name": "Ann"})), "[<b>Ann</b>]");
    assert_eq!(render("[{% usetemplate file %}]", json!({"name": "Ann", "file": "part.html"})), "[<b>Ann</b>]");
    assert_eq!(render("[{% usetemplate \"broken.html\" %}]", json!({})), "[]");
    assert_eq!(render("[{% usetemplate \"nope.html\" %}]", json!({})), "[]");
    assert_eq!(
        render("{{ name }}{% usedataset \"extra.json\" %}{{ name }}{{ year }}", json!({"name": "Ann"})),
        "AnnBo2021"
    );
}

#[test]
fn child_scopes_never_mutate_parent() {
    let loader = MemoryLoader::new().with_dataset_json("override.json", r#"{"title": "child"}"#);
    let config = Config::default();
    let template = "{% for x in xs %}{% usedataset \"override.json\" %}{{ title }}{% endfor %}|{{ title }}\
                    {% if yes %}{% usedataset \"override.json\" %}{% endif %}|{{ title }}";
    let out = render_with(
        &config,
        &loader,
        template,
        &dataset(json!({"title": "parent", "xs": [1, 2], "yes": true})),
    )
    .unwrap();
    assert_eq!(out, "childchild|parent|parent");
}

#[test]
fn self_including_template_stops_at_max_depth() {
    let loader = MemoryLoader::new().with_template("self.html", "x{% usetemplate \"self.html\" %}");
    let engine = Engine::new(Config { max_depth: 3, ..Config::default() }, loader);
    assert_eq!(engine.render_file("self.html", &Dataset::new()).unwrap(), "xxxx");
}

// ── Filters through templates ──

#[test]
fn add_numbers_or_concatenate() {
    assert_eq!(render_json("{{ 7|add:3 }}", json!({})), "10");
    assert_eq!(render_json("{{ \"seven\"|add:3 }}", json!({})), "seven3");
    assert_eq!(render_json("{{ a|add:b }}", json!({"a": 1.5, "b": 2})), "3.5");
}

#[test]
fn dictsort_orders_records() {
    let out = render_json(
        "{{ users|dictsort:\"age\" }}",
        json!({"users": [{"age": 30}, {"age": 20}]}),
    );
    assert_eq!(out, r#"[{"age":20},{"age":30}]"#);
}

#[test]
fn filter_arguments_can_be_names() {
    let data = json!({"items": ["a", "b"], "sep": " + ", "fallback": "none"});
    assert_eq!(render_json("{{ items|join:sep }}", data.clone()), "a + b");
    assert_eq!(render_json("{{ missing|default:fallback }}", data), "none");
}

#[test]
fn chained_filters_apply_left_to_right() {
    let data = json!({"posts": [{"title": "Zeta", "n": 2}, {"title": "alpha", "n": 1}]});
    assert_eq!(render_json("{{ posts|dictsort:\"n\"|first|default:\"?\" }}", data.clone()), r#"{"n":1,"title":"alpha"}"#);
    assert_eq!(render_json("{{ posts|where:\"n\":\"2\" }}", data), r#"{"n":2,"title":"Zeta"}"#);
}

#[test]
fn extreme_filter_arguments_do_not_abort() {
    let data = json!({"xs": [1, 2, 3]});
    assert_eq!(render_json("{{ xs|slice:\"1::9223372036854775807\" }}", data.clone()), "[2]");
    let padded = render_json("[{{ \"ab\"|center:\"99999999999999\" }}]", data.clone());
    assert_eq!(padded.len(), 4096 + 2);
    let formatted = render_json("{{ 7|stringformat:\"99999999999999d\" }}", data);
    assert_eq!(formatted.trim_start(), "7");
}

#[test]
fn unknown_filter_passes_value_through() {
    assert_eq!(render_json("{{ name|sparkle|upper }}", json!({"name": "ann"})), "ANN");
}
