//! Static field-usage scan over lexed templates.

use std::collections::BTreeSet;

use crate::ast::{Action, Body, Branch, DirectiveKind};
use crate::token::Token;

/// Every dataset name a template mentions, without rendering it: name
/// tokens, name sub-arguments and name filter arguments, including those in
/// block bodies and `elif`/`else` branches. The filter names of a
/// `{% filter %}` tag are skipped; their arguments are not.
pub fn scan(actions: &[Action]) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    scan_into(actions, &mut names);
    names
}

fn scan_into(actions: &[Action], names: &mut BTreeSet<String>) {
    for action in actions {
        let Action::Directive(directive) = action else {
            continue;
        };
        if directive.kind.is_verbatim() {
            continue;
        }
        for (index, token) in directive.arguments.iter().enumerate() {
            match directive.kind {
                // `for x in xs` mentions `in` only as syntax.
                DirectiveKind::For if index == 1 && token.value == "in" => continue,
                // Filter names are not data.
                DirectiveKind::Filter => collect_arguments(token, names),
                _ => collect(token, names),
            }
        }
        scan_body(&directive.body, names);
        let mut next = directive.next.as_deref();
        while let Some(branch) = next {
            match branch {
                Branch::Elif { condition, body, next: rest } => {
                    condition.iter().for_each(|token| collect(token, names));
                    scan_body(body, names);
                    next = rest.as_deref();
                }
                Branch::Else { body } => {
                    scan_body(body, names);
                    next = None;
                }
            }
        }
    }
}

fn scan_body(body: &Body, names: &mut BTreeSet<String>) {
    scan_into(&body.actions, names);
}

fn collect(token: &Token, names: &mut BTreeSet<String>) {
    if token.is_name() && !token.is_operator {
        names.insert(token.value.clone());
    }
    collect_arguments(token, names);
}

fn collect_arguments(token: &Token, names: &mut BTreeSet<String>) {
    if let Some(sub) = token.sub_argument.as_ref().filter(|a| a.is_name()) {
        names.insert(sub.value.clone());
    }
    for call in &token.filters {
        for argument in call.arguments.iter().filter(|a| a.is_name()) {
            names.insert(argument.value.clone());
        }
    }
}
