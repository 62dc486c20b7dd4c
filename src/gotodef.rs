use tower_lsp::lsp_types::{Location, Position, Range, Url};

use crate::workspace::Workspace;

/// The file of the function called `name`, if it is known.
pub fn goto_definition(workspace: &Workspace, name: &str) -> Vec<Location> {
    workspace
        .find_function(name)
        .and_then(|record| Url::from_file_path(&record.filename).ok())
        .map(|uri| Location {
            uri,
            range: Range {
                start: Position {
                    line: 0,
                    character: 0,
                },
                end: Position {
                    line: 0,
                    character: 1,
                },
            },
        })
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_indexed_workspace;

    /// A known function resolves to the start of its file.
    #[test]
    fn test_goto_definition_function() {
        let (_temp, dir, workspace) = create_indexed_workspace();
        let locations = goto_definition(&workspace, "MYTAG_fnc_doThing");

        assert_eq!(locations.len(), 1);
        assert_eq!(
            locations[0].uri,
            Url::from_file_path(dir.join("functions/utils/fn_doThing.sqf")).unwrap()
        );
        assert_eq!(locations[0].range.start, Position::new(0, 0));
        assert_eq!(locations[0].range.end, Position::new(0, 1));
    }

    /// Unknown names resolve to nothing.
    #[test]
    fn test_goto_definition_unknown() {
        let (_temp, _dir, workspace) = create_indexed_workspace();
        assert!(goto_definition(&workspace, "MYTAG_fnc_missing").is_empty());
    }
}
