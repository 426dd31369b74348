use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::ast::*;
use crate::context::{Context, Env};
use crate::data::{self, Dataset, Kind, ValueType, WalkError};
use crate::expr::{self, Operand};
use crate::filters::{self, Filter};
use crate::token::{Argument, FilterCall, Token, TokenKind};

/// Renders one context's actions against its dataset.
pub struct Processor<'a> {
    env: Env<'a>,
    level: usize,
    dataset: Dataset,
    keys: HashSet<String>,
}

impl<'a> Processor<'a> {
    pub fn new(env: Env<'a>, level: usize, dataset: Dataset) -> Self {
        let keys = data::key_set(&dataset);
        Self {
            env,
            level,
            dataset,
            keys,
        }
    }

    pub fn run(mut self, actions: &[Action]) -> String {
        let mut output = String::new();
        for action in actions {
            match action {
                Action::Literal(text) => output.push_str(text),
                Action::Directive(directive) => output.push_str(&self.dispatch(directive)),
            }
        }
        output
    }

    fn dispatch(&mut self, directive: &Directive) -> String {
        debug!(level = self.level, directive = directive.kind.name(), "dispatch");
        let args = &directive.arguments;
        match &directive.kind {
            DirectiveKind::Comment | DirectiveKind::Ignore => String::new(),
            DirectiveKind::Copy => directive.body.text.clone(),
            DirectiveKind::Replace => match args.first() {
                Some(token) => data::display(&self.resolve_token(token)),
                None => String::new(),
            },
            DirectiveKind::Firstof => self.first_of(args),
            DirectiveKind::Length => self.length(args),
            DirectiveKind::For => self.for_loop(directive),
            DirectiveKind::If => self.branch(directive),
            DirectiveKind::Filter => self.filter_block(directive),
            DirectiveKind::UseDataset => {
                self.use_dataset(args);
                String::new()
            }
            DirectiveKind::UseTemplate => self.use_template(args),
            DirectiveKind::Unknown(name) => {
                warn!(directive = %name, "unknown directive ignored");
                String::new()
            }
        }
    }

    /// Dataset path first, then the name itself read as a number.
    fn lookup(&self, key: &str) -> Result<Value, WalkError> {
        if self.keys.contains(key) {
            return data::walk_dataset(&self.dataset, key).cloned();
        }
        match data::parse_number(key) {
            Some(number) => Ok(number),
            None => data::walk_dataset(&self.dataset, key).cloned(),
        }
    }

    /// Resolves a dotted name and checks it is of the requested kind.
    pub fn get_data(&self, kind: Kind, key: &str) -> Value {
        let value = match self.lookup(key) {
            Ok(value) => value,
            Err(err) => {
                error!(name = key, %err, "cannot resolve name");
                return Value::Null;
            }
        };
        let found = ValueType::of(&value);
        match kind {
            Kind::Type => Value::String(found.name().to_string()),
            kind if kind.accepts(found) => value,
            kind => {
                warn!(name = key, expected = ?kind, %found, "value has the wrong type");
                Value::Null
            }
        }
    }

    /// Value of a token after its filter chain.
    pub fn resolve_token(&self, token: &Token) -> Value {
        let value = match token.kind {
            TokenKind::Literal | TokenKind::Verbatim => Value::String(token.value.clone()),
            TokenKind::Name => match expression_number(token) {
                Some(number) => number,
                None => self.get_data(Kind::Any, &token.value),
            },
        };
        self.apply_filters(value, &token.filters)
    }

    fn argument(&self, argument: &Argument) -> Value {
        if argument.is_name() {
            self.get_data(Kind::Any, &argument.value)
        } else {
            Value::String(argument.value.clone())
        }
    }

    fn apply_filters(&self, value: Value, calls: &[FilterCall]) -> Value {
        calls.iter().fold(value, |value, call| match Filter::from_name(&call.name) {
            Some(filter) => {
                let args: Vec<Value> = call.arguments.iter().map(|a| self.argument(a)).collect();
                filters::apply(filter, &value, &args)
            }
            None => {
                warn!(filter = %call.name, "unknown filter ignored");
                value
            }
        })
    }

    /// Truth of an `if`/`elif` condition. Operands that cannot be bound, and
    /// expressions that fail to evaluate, make the condition false.
    pub fn evaluate(&self, tokens: &[Token]) -> bool {
        let mut operands = Vec::with_capacity(tokens.len());
        for token in tokens {
            match self.operand(token) {
                Some(operand) => operands.push(operand),
                None => return false,
            }
        }
        match expr::evaluate(&operands) {
            Ok(value) => data::is_truthy(&value),
            Err(err) => {
                let condition: Vec<&str> = tokens.iter().map(|t| t.source.as_str()).collect();
                error!(condition = %condition.join(" "), %err, "condition cannot be evaluated");
                false
            }
        }
    }

    fn operand(&self, token: &Token) -> Option<Operand> {
        if token.is_operator {
            return Some(Operand::Op(token.value.clone()));
        }
        let value = match token.kind {
            TokenKind::Literal | TokenKind::Verbatim => Value::String(token.value.clone()),
            TokenKind::Name => match expression_number(token) {
                Some(number) => number,
                None => match self.lookup(&token.value) {
                    Ok(value) => value,
                    Err(err) => {
                        error!(name = %token.value, %err, "cannot bind condition operand");
                        return None;
                    }
                },
            },
        };
        Some(Operand::Value(self.apply_filters(value, &token.filters)))
    }

    fn child(&self, source: &str) -> Context<'a> {
        let mut context = Context::new(self.env, self.level, source);
        context.set_dataset(self.dataset.clone());
        context
    }

    fn render_body(&self, source: &str, body: &Body) -> String {
        let mut context = self.child(source);
        context.set_actions(body.actions.clone());
        context.process()
    }

    fn first_of(&self, args: &[Token]) -> String {
        args.iter()
            .map(|token| self.resolve_token(token))
            .find(|value| !value.is_null() && value.as_str() != Some(""))
            .map(|value| data::display(&value))
            .unwrap_or_default()
    }

    fn length(&self, args: &[Token]) -> String {
        let Some(token) = args.first() else {
            error!("length needs an argument");
            return String::new();
        };
        let resolved = self.resolve_token(token);
        let mut length = match &resolved {
            Value::Null => 0,
            Value::Array(items) => items.len(),
            Value::Object(map) => map.len(),
            other => data::display(other).chars().count(),
        };
        if length == 0 && token.is_name() && self.keys.contains(&token.value) {
            length = match data::walk_dataset(&self.dataset, &token.value) {
                Ok(Value::Array(items)) => items.len(),
                Ok(Value::Object(map)) => map.len(),
                _ => 0,
            };
        }
        length.to_string()
    }

    fn for_loop(&self, directive: &Directive) -> String {
        let args = &directive.arguments;
        if args.len() != 3 || args[1].value != "in" {
            let found: Vec<&str> = args.iter().map(|t| t.source.as_str()).collect();
            error!(arguments = %found.join(" "), "for expects `item in items`");
            return String::new();
        }
        let variable = &args[0].value;
        let items = match self.resolve_token(&args[2]) {
            Value::Array(items) => items,
            other => {
                error!(
                    iterable = %args[2].value,
                    found = %ValueType::of(&other),
                    "for needs a list to iterate"
                );
                return String::new();
            }
        };

        let length = items.len();
        let mut output = String::new();
        for (index, item) in items.into_iter().enumerate() {
            let mut context = self.child("for");
            context.set_dataset(forloop(index, length));
            let mut binding = Map::new();
            binding.insert(variable.clone(), item);
            context.set_dataset(binding);
            context.set_actions(directive.body.actions.clone());
            output.push_str(&context.process());
        }
        output
    }

    fn branch(&self, directive: &Directive) -> String {
        if self.evaluate(&directive.arguments) {
            return self.render_body("if", &directive.body);
        }
        let mut next = directive.next.as_deref();
        while let Some(branch) = next {
            match branch {
                Branch::Elif { condition, body, next: rest } => {
                    if self.evaluate(condition) {
                        return self.render_body("elif", body);
                    }
                    next = rest.as_deref();
                }
                Branch::Else { body } => return self.render_body("else", body),
            }
        }
        String::new()
    }

    /// Renders the body, then pipes it through each named filter (with its
    /// sub-argument) and that token's own chain.
    fn filter_block(&self, directive: &Directive) -> String {
        let mut value = Value::String(self.render_body("filter", &directive.body));
        for token in &directive.arguments {
            if !token.is_name() {
                warn!(argument = %token.source, "filter directive expects filter names");
                continue;
            }
            value = match Filter::from_name(&token.value) {
                Some(filter) => {
                    let args: Vec<Value> = token.sub_argument.iter().map(|a| self.argument(a)).collect();
                    filters::apply(filter, &value, &args)
                }
                None => {
                    warn!(filter = %token.value, "unknown filter ignored");
                    value
                }
            };
            value = self.apply_filters(value, &token.filters);
        }
        data::display(&value)
    }

    fn source_name(&self, directive: &'static str, args: &[Token]) -> Option<String> {
        let name = args.first().map(|token| data::display(&self.resolve_token(token)));
        match name {
            Some(name) if !name.is_empty() => Some(name),
            _ => {
                error!(directive, "no file name given");
                None
            }
        }
    }

    fn use_dataset(&mut self, args: &[Token]) {
        let Some(id) = self.source_name("usedataset", args) else {
            return;
        };
        let delta = self.env.loader.load_dataset(&id);
        debug!(dataset = %id, keys = delta.len(), "merging dataset");
        for (key, value) in delta {
            self.dataset.insert(key, value);
        }
        self.keys = data::key_set(&self.dataset);
    }

    fn use_template(&self, args: &[Token]) -> String {
        let Some(id) = self.source_name("usetemplate", args) else {
            return String::new();
        };
        let Some(text) = self.env.loader.load_template(&id) else {
            return String::new();
        };
        let mut context = self.child("usetemplate");
        if let Err(err) = context.set_template(&text) {
            error!(template = %id, %err, "included template does not compile");
            return String::new();
        }
        context.process()
    }
}

/// Inside a condition, a dotted bare word that reads as a float is a number
/// and never a dataset path.
fn expression_number(token: &Token) -> Option<Value> {
    if token.is_expression && token.value.contains('.') {
        token.value.parse::<f64>().ok().and_then(data::float)
    } else {
        None
    }
}

fn forloop(index: usize, length: usize) -> Dataset {
    let mut helper = Map::new();
    helper.insert("counter".into(), Value::from(index + 1));
    helper.insert("counter0".into(), Value::from(index));
    helper.insert("revcounter".into(), Value::from(length - index));
    helper.insert("revcounter0".into(), Value::from(length - index - 1));
    helper.insert("first".into(), Value::Bool(index == 0));
    helper.insert("last".into(), Value::Bool(index + 1 == length));
    helper.insert("length".into(), Value::from(length));
    let mut scope = Map::new();
    scope.insert("forloop".into(), Value::Object(helper));
    scope
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::loader::NullLoader;
    use serde_json::json;

    fn processor<'a>(config: &'a Config, value: Value) -> Processor<'a> {
        let Value::Object(dataset) = value else { panic!("not an object") };
        Processor::new(Env { loader: &NullLoader, config }, 0, dataset)
    }

    #[test]
    fn get_data_walks_and_checks_kind() {
        let config = Config::default();
        let p = processor(&config, json!({"user": {"tags": ["a", "b"], "age": 30}}));
        assert_eq!(p.get_data(Kind::Any, "user.tags.1"), json!("b"));
        assert_eq!(p.get_data(Kind::Number, "user.age"), json!(30));
        assert_eq!(p.get_data(Kind::Str, "user.age"), Value::Null);
        assert_eq!(p.get_data(Kind::Type, "user.tags"), json!("list"));
        assert_eq!(p.get_data(Kind::Any, "user.tags.9"), Value::Null);
        assert_eq!(p.get_data(Kind::Any, "user.missing"), Value::Null);
    }

    #[test]
    fn absent_names_fall_back_to_numbers() {
        let config = Config::default();
        let p = processor(&config, json!({"2024": "year"}));
        assert_eq!(p.get_data(Kind::Any, "17"), json!(17));
        assert_eq!(p.get_data(Kind::Any, "2.5"), json!(2.5));
        // A key that looks numeric wins over the number.
        assert_eq!(p.get_data(Kind::Any, "2024"), json!("year"));
    }

    #[test]
    fn conditions_bind_typed_operands() {
        let config = Config::default();
        let p = processor(&config, json!({"age": 20, "name": "Ann", "tags": ["x"]}));
        let cond = |text: &str| -> Vec<Token> {
            text.split_whitespace().map(|w| Token::parse(w, false, true)).collect()
        };
        assert!(p.evaluate(&cond("age > 17")));
        assert!(!p.evaluate(&cond("age > 20.5")));
        assert!(p.evaluate(&cond("\"x\" in tags")));
        assert!(p.evaluate(&cond("name == \"Ann\" and tags")));
        assert!(!p.evaluate(&cond("name == \"Ann\" and unknown")));
        assert!(p.evaluate(&cond("age|divisibleby:\"5\"")));
        assert!(!p.evaluate(&cond("nobody")));
    }

    #[test]
    fn forloop_helper_counts_both_ways() {
        let scope = forloop(1, 3);
        assert_eq!(
            scope.get("forloop"),
            Some(&json!({
                "counter": 2, "counter0": 1, "revcounter": 2, "revcounter0": 1,
                "first": false, "last": false, "length": 3
            }))
        );
    }
}
