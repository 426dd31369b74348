//! dtlite: an offline Django-style template compiler for static sites.
//!
//! A template is compiled once into a list of [`Action`]s and then rendered
//! against a JSON dataset. Rendering never fails once a template has
//! compiled: missing keys, wrong types and bad filter arguments are logged
//! through `tracing` and render as empty text.
//!
//! Supported syntax:
//! - `{{ name|filter:arg }}` emits a value through a filter chain.
//! - `{% for x in xs %}`, `{% if %}`/`{% elif %}`/`{% else %}` and
//!   `{% filter upper %}` blocks.
//! - `{% firstof %}`, `{% length %}`, `{% replace %}`, `{% copy %}`,
//!   `{% comment %}`, `{% ignore %}` and `{# … #}`.
//! - `{% usedataset "more.json" %}` and `{% usetemplate "part.html" %}`,
//!   fetched through a [`Loader`].
//!
//! ```
//! use serde_json::json;
//!
//! let data = json!({"name": "World"});
//! let out = dtlite::render("Hello {{ name }}!", data.as_object().unwrap()).unwrap();
//! assert_eq!(out, "Hello World!");
//! ```

pub mod ast;
pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod eval;
pub mod expr;
pub mod filters;
pub mod lexer;
pub mod loader;
pub mod parser;
pub mod scan;
pub mod token;

use serde::Deserialize;
use tracing::{debug, error};

pub use ast::{Action, Template};
pub use config::Config;
pub use context::{Context, Env};
pub use data::Dataset;
pub use error::{Error, LexError, LexErrorKind};
pub use loader::{FileSink, FsLoader, Loader, MemoryLoader, NullLoader, Sink, StringSink};
pub use scan::scan;

/// Compiles template text.
pub fn lex(text: &str) -> Result<Template, LexError> {
    parser::Parser::new(text, false)?.parse()
}

/// Renders `text` against `dataset` with default settings and no loader.
pub fn render(text: &str, dataset: &Dataset) -> Result<String, Error> {
    render_with(&Config::default(), &NullLoader, text, dataset)
}

/// Renders `text` against `dataset`, resolving includes through `loader`.
pub fn render_with(config: &Config, loader: &dyn Loader, text: &str, dataset: &Dataset) -> Result<String, Error> {
    let mut context = Context::root(Env { loader, config }, "page");
    context.set_dataset(dataset.clone());
    context.set_template(text)?;
    Ok(context.process())
}

/// One output page: a template, the datasets merged into it in order, and
/// where the result goes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Page {
    pub template: String,
    #[serde(default)]
    pub datasets: Vec<String>,
    pub destination: String,
}

/// Settings plus a loader, reused across renders.
pub struct Engine {
    config: Config,
    loader: Box<dyn Loader>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Config::default(), NullLoader)
    }
}

impl Engine {
    pub fn new(config: Config, loader: impl Loader + 'static) -> Self {
        Self {
            config,
            loader: Box::new(loader),
        }
    }

    /// An engine reading from disk under `config.base_dir`.
    pub fn from_config(config: Config) -> Self {
        let loader = FsLoader::new(config.base_dir.clone());
        Self::new(config, loader)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn lex(&self, text: &str) -> Result<Template, LexError> {
        parser::Parser::new(text, self.config.trim_blocks)?.parse()
    }

    pub fn render(&self, text: &str, dataset: &Dataset) -> Result<String, Error> {
        render_with(&self.config, &*self.loader, text, dataset)
    }

    /// Renders a template fetched from the loader. A template that cannot
    /// be loaded renders as empty.
    pub fn render_file(&self, id: &str, dataset: &Dataset) -> Result<String, Error> {
        let text = self.loader.load_template(id).unwrap_or_default();
        self.render(&text, dataset)
    }

    /// Loads, renders and emits one page, returning the rendered text.
    pub fn assemble(&self, page: &Page, sink: &mut dyn Sink) -> Result<String, Error> {
        debug!(template = %page.template, destination = %page.destination, "assembling page");
        let text = self.loader.load_template(&page.template).unwrap_or_default();
        let mut context = Context::root(
            Env {
                loader: &*self.loader,
                config: &self.config,
            },
            page.template.clone(),
        );
        for id in &page.datasets {
            context.set_dataset(self.loader.load_dataset(id));
        }
        if let Err(err) = context.set_template(&text) {
            error!(template = %page.template, %err, "page template does not compile");
            return Err(err.into());
        }
        let output = context.process();
        sink.emit_output(&output, &page.destination)?;
        Ok(output)
    }
}
