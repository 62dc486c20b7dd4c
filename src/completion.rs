//! Completion of function names in scripts and of properties in root files.

use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, Documentation, InsertTextFormat,
};

use crate::description_docs::{description_docs, DocumentationEntry};
use crate::document::DocumentKind;
use crate::function_index::FunctionRecord;
use crate::workspace::Workspace;

pub trait Completable {
    fn completion(&self) -> CompletionItem;
}

impl Completable for FunctionRecord {
    fn completion(&self) -> CompletionItem {
        CompletionItem {
            label: self.name.clone(),
            kind: Some(CompletionItemKind::FUNCTION),
            detail: Some(self.filename.display().to_string()),
            documentation: self
                .info
                .as_ref()
                .and_then(|info| info.description.clone())
                .map(Documentation::String),
            ..Default::default()
        }
    }
}

impl Completable for DocumentationEntry {
    fn completion(&self) -> CompletionItem {
        CompletionItem {
            label: self.name.clone(),
            kind: Some(CompletionItemKind::PROPERTY),
            detail: Some(self.kind.clone()),
            documentation: Some(Documentation::String(self.description.clone())),
            insert_text: Some(self.insert_text()),
            insert_text_format: Some(InsertTextFormat::PLAIN_TEXT),
            ..Default::default()
        }
    }
}

/// Completions for `prefix` typed in a document of the given kind.
///
/// Function names match the prefix case-sensitively; property keys ignore case.
pub fn completions(workspace: &Workspace, kind: DocumentKind, prefix: &str) -> Vec<CompletionItem> {
    match kind {
        DocumentKind::Function => workspace
            .functions()
            .iter()
            .filter(|record| record.name.starts_with(prefix))
            .map(Completable::completion)
            .collect(),
        DocumentKind::Description => description_docs()
            .starting_with(prefix)
            .map(Completable::completion)
            .collect(),
        DocumentKind::Other => vec![],
    }
}
