use std::collections::HashMap;
use std::path::Path;

use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, Range, Url};
use tracing::warn;

use crate::config_tree::ParseError;

/// `source` of every diagnostic this crate produces.
pub const SOURCE: &str = "cfgdex";

/// Diagnostics of one indexing pass, grouped by file.
///
/// An empty list for a URI is meaningful: publishing it clears whatever was
/// reported for that file before.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiagnosticBatch {
    entries: HashMap<Url, Vec<Diagnostic>>,
}

impl DiagnosticBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure `uri` is published, with no diagnostics unless some are pushed.
    pub fn clear(&mut self, uri: Url) {
        self.entries.entry(uri).or_default();
    }

    pub fn clear_file(&mut self, path: &Path) {
        if let Some(uri) = file_url(path) {
            self.clear(uri);
        }
    }

    pub fn push(&mut self, uri: Url, diagnostic: Diagnostic) {
        self.entries.entry(uri).or_default().push(diagnostic);
    }

    pub fn push_for_file(&mut self, path: &Path, diagnostic: Diagnostic) {
        if let Some(uri) = file_url(path) {
            self.push(uri, diagnostic);
        }
    }

    /// Fold another batch into this one. Lists for the same file are concatenated.
    pub fn extend(&mut self, other: DiagnosticBatch) {
        for (uri, diagnostics) in other.entries {
            self.entries.entry(uri).or_default().extend(diagnostics);
        }
    }

    pub fn get(&self, uri: &Url) -> Option<&[Diagnostic]> {
        self.entries.get(uri).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Url, &Vec<Diagnostic>)> {
        self.entries.iter()
    }

    /// Number of files in the batch, including those being cleared.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.entries
            .values()
            .flatten()
            .filter(|diagnostic| diagnostic.severity == Some(DiagnosticSeverity::ERROR))
            .count()
    }
}

impl IntoIterator for DiagnosticBatch {
    type Item = (Url, Vec<Diagnostic>);
    type IntoIter = std::collections::hash_map::IntoIter<Url, Vec<Diagnostic>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

pub fn file_url(path: &Path) -> Option<Url> {
    match Url::from_file_path(path) {
        Ok(uri) => Some(uri),
        Err(()) => {
            warn!("Cannot express {} as a file URI", path.display());
            None
        }
    }
}

fn error(range: Range, message: String) -> Diagnostic {
    Diagnostic {
        range,
        severity: Some(DiagnosticSeverity::ERROR),
        source: Some(SOURCE.into()),
        message,
        ..Default::default()
    }
}

pub fn missing_function_file(range: Range, resolved: &Path, function: &str) -> Diagnostic {
    error(
        range,
        format!(
            "Failed to find {} for function {}.",
            resolved.display(),
            function
        ),
    )
}

pub fn parse_error(err: &ParseError) -> Diagnostic {
    error(err.range, err.message.clone())
}
