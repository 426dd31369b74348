//! Collaborators that fetch templates and datasets and store rendered pages.
//!
//! The engine only talks to the outside world through [`Loader`] and
//! [`Sink`]. Loaders never fail from the engine's point of view: a missing
//! or malformed source is logged and comes back as `None` or an empty
//! dataset, and rendering carries on.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, error};

use crate::data::Dataset;
use crate::error::Error;

/// Source of template text and dataset documents, keyed by identifier
/// (usually a relative file name).
pub trait Loader {
    fn load_template(&self, id: &str) -> Option<String>;

    fn load_dataset(&self, id: &str) -> Dataset;
}

/// Destination for rendered output.
pub trait Sink {
    fn emit_output(&mut self, content: &str, destination: &str) -> Result<(), Error>;
}

/// Decodes a dataset document. Anything but a JSON object is rejected.
pub fn parse_dataset(id: &str, text: &str) -> Result<Dataset, Error> {
    match serde_json::from_str::<Value>(text)? {
        Value::Object(map) => Ok(map),
        _ => Err(Error::NotAnObject(id.to_string())),
    }
}

/// Reads templates and JSON datasets from disk, relative to `base_dir`.
#[derive(Debug, Clone, Default)]
pub struct FsLoader {
    base_dir: Option<PathBuf>,
}

impl FsLoader {
    pub fn new(base_dir: Option<PathBuf>) -> Self {
        Self { base_dir }
    }

    pub fn resolve(&self, id: &str) -> PathBuf {
        match &self.base_dir {
            Some(base) => base.join(id),
            None => PathBuf::from(id),
        }
    }

    /// Like [`Loader::load_template`] but reports the failure.
    pub fn read_template_strict(&self, id: &str) -> Result<String, Error> {
        Ok(fs::read_to_string(self.resolve(id))?)
    }

    /// Like [`Loader::load_dataset`] but reports the failure.
    pub fn read_dataset_strict(&self, id: &str) -> Result<Dataset, Error> {
        let text = fs::read_to_string(self.resolve(id))?;
        parse_dataset(id, &text)
    }
}

impl Loader for FsLoader {
    fn load_template(&self, id: &str) -> Option<String> {
        match self.read_template_strict(id) {
            Ok(text) => {
                debug!(template = id, bytes = text.len(), "loaded template");
                Some(text)
            }
            Err(err) => {
                error!(template = id, %err, "cannot read template");
                None
            }
        }
    }

    fn load_dataset(&self, id: &str) -> Dataset {
        self.read_dataset_strict(id).unwrap_or_else(|err| {
            error!(dataset = id, %err, "cannot read dataset");
            Dataset::new()
        })
    }
}

/// In-memory sources, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    templates: HashMap<String, String>,
    datasets: HashMap<String, Dataset>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, id: impl Into<String>, text: impl Into<String>) -> Self {
        self.templates.insert(id.into(), text.into());
        self
    }

    pub fn with_dataset(mut self, id: impl Into<String>, dataset: Dataset) -> Self {
        self.datasets.insert(id.into(), dataset);
        self
    }

    /// Adds a dataset from JSON text. Text that is not a JSON object is
    /// logged and stored as an empty dataset, the same as a bad file.
    pub fn with_dataset_json(self, id: impl Into<String>, json: &str) -> Self {
        let id = id.into();
        let dataset = parse_dataset(&id, json).unwrap_or_else(|err| {
            error!(dataset = %id, %err, "cannot decode dataset");
            Dataset::new()
        });
        self.with_dataset(id, dataset)
    }
}

impl Loader for MemoryLoader {
    fn load_template(&self, id: &str) -> Option<String> {
        let found = self.templates.get(id).cloned();
        if found.is_none() {
            error!(template = id, "no such template");
        }
        found
    }

    fn load_dataset(&self, id: &str) -> Dataset {
        self.datasets.get(id).cloned().unwrap_or_else(|| {
            error!(dataset = id, "no such dataset");
            Dataset::new()
        })
    }
}

/// A loader with nothing in it.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLoader;

impl Loader for NullLoader {
    fn load_template(&self, id: &str) -> Option<String> {
        error!(template = id, "no loader configured");
        None
    }

    fn load_dataset(&self, id: &str) -> Dataset {
        error!(dataset = id, "no loader configured");
        Dataset::new()
    }
}

/// Writes each page to `root/destination`, creating parent directories.
#[derive(Debug, Clone)]
pub struct FileSink {
    root: PathBuf,
}

impl FileSink {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl Sink for FileSink {
    fn emit_output(&mut self, content: &str, destination: &str) -> Result<(), Error> {
        let path = self.root.join(destination);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        debug!(path = %path.display(), bytes = content.len(), "wrote page");
        Ok(())
    }
}

/// Collects pages in memory as `(destination, content)` pairs.
#[derive(Debug, Clone, Default)]
pub struct StringSink {
    pub pages: Vec<(String, String)>,
}

impl Sink for StringSink {
    fn emit_output(&mut self, content: &str, destination: &str) -> Result<(), Error> {
        self.pages.push((destination.to_string(), content.to_string()));
        Ok(())
    }
}
