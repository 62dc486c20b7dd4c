//! Hover for function names in scripts and properties in root files.
//!
//! | Document | Word | Shows |
//! |----------|------|-------|
//! | script (`.sqf`) | function name | call signature, description, parameters |
//! | `description.ext` | property | documentation and wiki link |

use itertools::Itertools;
use tower_lsp::lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind};

use crate::description_docs::{description_docs, DocumentationEntry};
use crate::docstring::{FunctionInfo, FunctionParam};
use crate::document::DocumentKind;
use crate::function_index::FunctionRecord;
use crate::workspace::Workspace;

pub fn hover(workspace: &Workspace, kind: DocumentKind, word: &str) -> Option<Hover> {
    let value = match kind {
        DocumentKind::Function => render_function(&workspace.find_function(word)?),
        DocumentKind::Description => render_entry(description_docs().get(word)?),
        DocumentKind::Other => return None,
    };

    Some(Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value,
        }),
        range: None,
    })
}

fn render_function(record: &FunctionRecord) -> String {
    let empty = FunctionInfo::default();
    let info = record.info.as_ref().unwrap_or(&empty);

    let mut sections = vec![format!("```sqf\n{}\n```", signature(&record.name, info))];
    if let Some(description) = &info.description {
        sections.push(description.clone());
    }
    if !info.params.is_empty() {
        let params = info
            .params
            .iter()
            .enumerate()
            .map(|(index, param)| param_line(index, param))
            .join("\n");
        sections.push(params);
    }
    sections.push(format!("`{}`", record.filename.display()));

    sections.join("\n\n")
}

/// `0. _unit (OBJECT) - the unit` or `0. OBJECT - the unit`
fn param_line(index: usize, param: &FunctionParam) -> String {
    let type_label = param.type_label.as_deref().unwrap_or("ANY");
    let head = match &param.name {
        Some(name) => format!("{index}. {name} ({type_label})"),
        None => format!("{index}. {type_label}"),
    };
    match &param.description {
        Some(description) => format!("{head} - {description}"),
        None => head,
    }
}

/// `(function) BOOL = [_unit, _number1=1] call TAG_fnc_name`
pub fn signature(name: &str, info: &FunctionInfo) -> String {
    let args = match info.params.as_slice() {
        [] => "ANY".to_string(),
        [single] => single
            .type_label
            .clone()
            .or_else(|| single.name.clone())
            .unwrap_or_else(|| "ANY".into()),
        params => format!(
            "[{}]",
            params
                .iter()
                .enumerate()
                .map(|(index, param)| argument(index, param))
                .join(", ")
        ),
    };

    match &info.returns {
        Some(returns) => format!("(function) {returns} = {args} call {name}"),
        None => format!("(function) {args} call {name}"),
    }
}

fn argument(index: usize, param: &FunctionParam) -> String {
    let name = param.name.clone().unwrap_or_else(|| {
        let type_label = param.type_label.as_deref().unwrap_or("any");
        format!("_{}{index}", type_label.to_lowercase())
    });
    match (&param.default_value, param.optional) {
        (Some(default), true) => format!("{name}={default}"),
        _ => name,
    }
}

fn render_entry(entry: &DocumentationEntry) -> String {
    format!(
        "**{}** ({})\n\n{}\n\n[Documentation]({})",
        entry.name, entry.kind, entry.description, entry.link
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_indexed_workspace;

    fn markdown(hover: Hover) -> String {
        match hover.contents {
            HoverContents::Markup(content) => content.value,
            other => panic!("unexpected hover contents {other:?}"),
        }
    }

    fn param(name: Option<&str>, type_label: &str) -> FunctionParam {
        FunctionParam {
            name: name.map(Into::into),
            type_label: Some(type_label.into()),
            ..Default::default()
        }
    }

    /// A documented function shows its signature, description and parameters.
    #[test]
    fn test_function_hover() {
        let (_temp, _dir, workspace) = create_indexed_workspace();
        let value = markdown(hover(&workspace, DocumentKind::Function, "MYTAG_fnc_doThing").unwrap());

        assert!(value.contains("(function) BOOL = OBJECT call MYTAG_fnc_doThing"));
        assert!(value.contains("Does the thing."));
        assert!(value.contains("0. OBJECT - The unit"));
    }

    /// Lookup falls back to any casing of the name.
    #[test]
    fn test_function_hover_any_casing() {
        let (_temp, _dir, workspace) = create_indexed_workspace();
        assert!(hover(&workspace, DocumentKind::Function, "mytag_fnc_dothing").is_some());
        assert!(hover(&workspace, DocumentKind::Function, "MYTAG_fnc_unknown").is_none());
    }

    /// Properties of root files show their documentation and link.
    #[test]
    fn test_description_hover() {
        let (_temp, _dir, workspace) = create_indexed_workspace();
        let value = markdown(hover(&workspace, DocumentKind::Description, "respawnDelay").unwrap());

        assert!(value.contains("**respawnDelay**"));
        assert!(value.contains("https://community.bistudio.com/wiki/Description.ext"));
        assert!(hover(&workspace, DocumentKind::Other, "respawnDelay").is_none());
    }

    /// Signatures without parameter information take anything.
    #[test]
    fn test_signature_without_params() {
        assert_eq!(
            signature("T_fnc_a", &FunctionInfo::default()),
            "(function) ANY call T_fnc_a"
        );
    }

    /// Several parameters become a bracketed list with defaults.
    #[test]
    fn test_signature_with_params() {
        let mut optional = param(None, "NUMBER");
        optional.optional = true;
        optional.default_value = Some("1".into());

        let info = FunctionInfo {
            description: None,
            params: vec![param(Some("_unit"), "OBJECT"), optional, param(None, "BOOL")],
            returns: Some("GROUP".into()),
        };
        assert_eq!(
            signature("T_fnc_a", &info),
            "(function) GROUP = [_unit, _number1=1, _bool2] call T_fnc_a"
        );
    }

    /// Parameter lines with and without names.
    #[test]
    fn test_param_line() {
        let mut named = param(Some("_unit"), "OBJECT");
        named.description = Some("the unit".into());
        assert_eq!(param_line(0, &named), "0. _unit (OBJECT) - the unit");
        assert_eq!(param_line(3, &param(None, "SIDE")), "3. SIDE");
    }
}
