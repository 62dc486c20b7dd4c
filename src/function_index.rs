//! Function index built from a root file's `CfgFunctions` registry.
//!
//! The registry nests three levels of classes:
//!
//! ```text
//! class CfgFunctions {
//!     class MyTag {                  // tag group: `tag` or the class name
//!         class utils {              // category: `tag`, `file` override
//!             class doThing {};      // function: `file`, `ext` override
//!         };
//!     };
//! };
//! ```
//!
//! which yields `MyTag_fnc_doThing` at `functions/utils/fn_doThing.sqf`,
//! relative to the root file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, trace};

use crate::config::{IncludePrefix, Settings};
use crate::config_tree::{ConfigClass, DocumentLoader};
use crate::diagnostics::{self, DiagnosticBatch};
use crate::docstring::{extract_function_info, FunctionInfo};
use crate::paths::resolve_virtual_path;

pub const REGISTRY_CLASS: &str = "CfgFunctions";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionRecord {
    /// Qualified name as declared, e.g. `MYTAG_fnc_doThing`.
    pub name: String,
    pub filename: PathBuf,
    pub info: Option<FunctionInfo>,
}

/// One root's functions, keyed by lower-cased qualified name.
pub type FunctionMap = HashMap<String, FunctionRecord>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexOptions {
    pub include_prefixes: Vec<IncludePrefix>,
    pub function_dir: String,
    pub extension: String,
}

impl Default for IndexOptions {
    fn default() -> Self {
        IndexOptions {
            include_prefixes: vec![],
            function_dir: "functions".into(),
            extension: ".sqf".into(),
        }
    }
}

impl From<&Settings> for IndexOptions {
    fn from(settings: &Settings) -> Self {
        IndexOptions {
            include_prefixes: settings.include_prefixes.clone(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct FunctionIndex {
    pub functions: FunctionMap,
    pub diagnostics: DiagnosticBatch,
}

/// Tag and base path in effect for the classes below a registry level.
#[derive(Debug, Clone)]
struct Scope<'a> {
    tag: &'a str,
    path: String,
}

impl<'a> Scope<'a> {
    fn tag_group(group: &'a ConfigClass) -> Self {
        Scope {
            tag: group.string_variable("tag").unwrap_or(&group.name),
            path: String::new(),
        }
    }

    /// The category tag only renames; the path default comes from the class name.
    fn category(&self, category: &'a ConfigClass, function_dir: &str) -> Self {
        let path = match category.string_variable("file") {
            Some(file) => file.to_string(),
            None => format!("{}/{}", function_dir, category.name),
        };
        Scope {
            tag: category.string_variable("tag").unwrap_or(self.tag),
            path,
        }
    }

    fn qualified_name(&self, function: &ConfigClass) -> String {
        format!("{}_fnc_{}", self.tag, function.name)
    }

    fn relative_file(&self, function: &ConfigClass, default_extension: &str) -> String {
        if let Some(file) = function.string_variable("file") {
            return file.to_string();
        }

        let extension = function
            .string_variable("ext")
            .unwrap_or(default_extension);
        format!(
            "{}/fn_{}{}",
            self.path.trim_end_matches(['/', '\\']),
            function.name,
            extension
        )
    }
}

/// Builds the function map of the tree parsed from `root_file`.
///
/// A tree without a registry yields an empty index. Functions whose file is
/// missing are still recorded, with an error at their declaration.
pub fn build_function_index(
    tree: &ConfigClass,
    root_file: &Path,
    options: &IndexOptions,
) -> FunctionIndex {
    let mut index = FunctionIndex::default();
    let Some(registry) = tree.class(REGISTRY_CLASS) else {
        trace!("No {REGISTRY_CLASS} in {}", root_file.display());
        return index;
    };

    let base_dir = root_file.parent().unwrap_or(Path::new(""));

    for group in registry.children() {
        let group_scope = Scope::tag_group(group);
        for category in group.children() {
            let scope = group_scope.category(category, &options.function_dir);
            for function in category.children() {
                let name = scope.qualified_name(function);
                let relative = scope.relative_file(function, &options.extension);
                let filename = resolve_virtual_path(&relative, &options.include_prefixes, base_dir);

                if !filename.is_file() {
                    let (file, range) = match &function.location {
                        Some(location) => (location.file.as_path(), location.range),
                        None => (root_file, Default::default()),
                    };
                    index.diagnostics.push_for_file(
                        file,
                        diagnostics::missing_function_file(range, &filename, &name),
                    );
                }

                let key = name.to_lowercase();
                if index.functions.contains_key(&key) {
                    debug!("{name} is declared more than once in {}", root_file.display());
                }
                index.functions.insert(
                    key,
                    FunctionRecord {
                        name,
                        filename,
                        info: None,
                    },
                );
            }
        }
    }

    index
}

/// Fills `info` from the header comment of every function file that exists.
///
/// Open buffers take precedence over disk, but a buffer alone does not make a
/// missing file documented.
pub fn attach_docstrings(functions: &mut FunctionMap, loader: &dyn DocumentLoader) {
    functions.par_iter_mut().for_each(|(_, record)| {
        if !record.filename.is_file() {
            return;
        }

        let text = match loader.load(&record.filename) {
            Some(text) => text,
            None => match std::fs::read_to_string(&record.filename) {
                Ok(text) => text,
                Err(err) => {
                    debug!("Cannot read {}: {err}", record.filename.display());
                    return;
                }
            },
        };

        record.info = extract_function_info(&text);
    });
}
