//! Rendering scopes.
//!
//! A [`Context`] is one nesting level of a render: the page itself, one loop
//! iteration, a taken `if` branch, a `filter` body or an included template.
//! It owns a copy of its dataset, so nothing a child does is visible to its
//! parent.

use tracing::{debug, error};

use crate::ast::Action;
use crate::config::Config;
use crate::data::Dataset;
use crate::error::LexError;
use crate::eval::Processor;
use crate::loader::Loader;
use crate::parser::Parser;

/// What every context of one render shares.
#[derive(Clone, Copy)]
pub struct Env<'a> {
    pub loader: &'a dyn Loader,
    pub config: &'a Config,
}

pub struct Context<'a> {
    env: Env<'a>,
    level: usize,
    source: String,
    dataset: Dataset,
    actions: Vec<Action>,
}

impl<'a> Context<'a> {
    /// The page-level context.
    pub fn root(env: Env<'a>, source: impl Into<String>) -> Self {
        Self::at_level(env, 0, source.into())
    }

    /// A context one level below `parent_level`, labelled with the tag that
    /// opened it.
    pub fn new(env: Env<'a>, parent_level: usize, source: impl Into<String>) -> Self {
        Self::at_level(env, parent_level + 1, source.into())
    }

    fn at_level(env: Env<'a>, level: usize, source: String) -> Self {
        debug!(level, source = %source, "new context");
        Self {
            env,
            level,
            source,
            dataset: Dataset::new(),
            actions: Vec::new(),
        }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Merges `delta` over the current dataset, top-level keys only.
    pub fn set_dataset(&mut self, delta: Dataset) {
        for (key, value) in delta {
            self.dataset.insert(key, value);
        }
    }

    pub fn set_template(&mut self, text: &str) -> Result<(), LexError> {
        self.actions = Parser::new(text, self.env.config.trim_blocks)?.parse()?;
        Ok(())
    }

    pub fn set_actions(&mut self, actions: Vec<Action>) {
        self.actions = actions;
    }

    /// Renders the stored actions. The actions are consumed; a second call
    /// renders nothing.
    pub fn process(&mut self) -> String {
        let actions = std::mem::take(&mut self.actions);
        if self.level > self.env.config.max_depth {
            error!(
                level = self.level,
                max_depth = self.env.config.max_depth,
                source = %self.source,
                "templates nest too deeply"
            );
            return String::new();
        }
        let output = Processor::new(self.env, self.level, self.dataset.clone()).run(&actions);
        debug!(level = self.level, source = %self.source, bytes = output.len(), "context done");
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::NullLoader;
    use serde_json::json;

    fn dataset(value: serde_json::Value) -> Dataset {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn set_dataset_is_a_shallow_merge() {
        let config = Config::default();
        let env = Env { loader: &NullLoader, config: &config };
        let mut context = Context::root(env, "page");
        context.set_dataset(dataset(json!({"a": {"x": 1}, "b": 2})));
        context.set_dataset(dataset(json!({"a": {"y": 3}})));
        assert_eq!(context.dataset().get("a"), Some(&json!({"y": 3})));
        assert_eq!(context.dataset().get("b"), Some(&json!(2)));
    }

    #[test]
    fn process_is_single_use() {
        let config = Config::default();
        let env = Env { loader: &NullLoader, config: &config };
        let mut context = Context::root(env, "page");
        context.set_dataset(dataset(json!({"name": "World"})));
        context.set_template("Hello {{ name }}!").unwrap();
        assert_eq!(context.process(), "Hello World!");
        assert_eq!(context.process(), "");
    }

    #[test]
    fn children_sit_one_level_down() {
        let config = Config { max_depth: 1, ..Config::default() };
        let env = Env { loader: &NullLoader, config: &config };
        let child = Context::new(env, 0, "for");
        assert_eq!(child.level(), 1);
        let mut too_deep = Context::new(env, 1, "usetemplate");
        too_deep.set_template("text").unwrap();
        assert_eq!(too_deep.process(), "");
    }
}
