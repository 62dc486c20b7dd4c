//! Hierarchical config tree (`description.ext`, `config.cpp` and their includes).
//!
//! A parsed file is a nameless root [`ConfigClass`] holding nested classes and
//! variables. Lookups are case-insensitive; the literal class name is kept for
//! display and for building function names.
//!
//! The parser does not expand macros or evaluate expressions. Anything that is
//! not a string, a number or an array is kept as raw text.

mod parser;

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tower_lsp::lsp_types::Range;

use crate::config::IncludePrefix;

pub use parser::ConfigParser;

/// Where a class was declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Number(f64),
    Array(Vec<Value>),
    /// Unquoted text that is not a plain number (macros, expressions).
    Raw(String),
}

impl Value {
    /// Textual form of a scalar value. Arrays have none.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(text) | Value::Raw(text) => Some(text),
            Value::Number(_) | Value::Array(_) => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigClass {
    /// Name as written in the source.
    pub name: String,
    /// Base class from `class Name: Base`.
    pub parent: Option<String>,
    /// Child classes keyed by lower-cased name, in declaration order.
    /// Reopening a class keeps its first position.
    pub classes: IndexMap<String, ConfigClass>,
    /// Variables keyed by lower-cased name, in declaration order.
    pub variables: IndexMap<String, Value>,
    pub location: Option<SourceLocation>,
}

impl ConfigClass {
    pub fn new(name: impl Into<String>, location: Option<SourceLocation>) -> Self {
        ConfigClass {
            name: name.into(),
            location,
            ..Default::default()
        }
    }

    pub fn class(&self, name: &str) -> Option<&ConfigClass> {
        self.classes.get(&name.to_lowercase())
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(&name.to_lowercase())
    }

    /// A variable's textual value, if it is a scalar.
    pub fn string_variable(&self, name: &str) -> Option<&str> {
        self.variable(name).and_then(Value::as_str)
    }

    /// Child classes in declaration order.
    pub fn children(&self) -> impl Iterator<Item = &ConfigClass> {
        self.classes.values()
    }
}

/// A syntax error, an unreadable file or a broken `#include`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}:{}:{}: {}", .file.display(), .range.start.line + 1, .range.start.character + 1, .message)]
pub struct ParseError {
    pub file: PathBuf,
    pub range: Range,
    pub message: String,
}

/// Supplies the content of files that are open in the editor, so unsaved
/// edits are parsed instead of what is on disk.
pub trait DocumentLoader: Send + Sync {
    fn load(&self, path: &Path) -> Option<String>;
}

/// Told about every file the parser opens, before it is read.
pub trait FileObserver: Send + Sync {
    fn file_touched(&self, path: &Path);
}

/// Reads everything from disk and tells nobody.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl DocumentLoader for NoHooks {
    fn load(&self, _path: &Path) -> Option<String> {
        None
    }
}

impl FileObserver for NoHooks {
    fn file_touched(&self, _path: &Path) {}
}

impl<F> FileObserver for F
where
    F: Fn(&Path) + Send + Sync,
{
    fn file_touched(&self, path: &Path) {
        self(path)
    }
}

/// Parse `path` reading from disk, with the given include prefixes.
pub fn parse_file(path: &Path, prefixes: &[IncludePrefix]) -> Result<ConfigClass, ParseError> {
    ConfigParser::new(prefixes).parse(path)
}
