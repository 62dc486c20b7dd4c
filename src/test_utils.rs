//! Shared test utilities.
//!
//! Only compiled when running tests.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::config::Settings;
use crate::workspace::Workspace;

/// Creates a temporary workspace directory for testing.
///
/// Returns the temp directory handle (keep it alive for the test) and the
/// path of a non-hidden `workspace` subdirectory inside it. Discovery skips
/// hidden directories and temp directories are sometimes created under
/// `/tmp/.tmpXXXXX`.
pub fn create_test_workspace_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let workspace_dir = temp_dir.path().join("workspace");
    fs::create_dir(&workspace_dir).expect("Failed to create workspace subdirectory");
    (temp_dir, workspace_dir)
}

/// Writes `text` to `dir/relative`, creating parent directories.
pub fn write_file(dir: &Path, relative: &str, text: &str) -> PathBuf {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent directories");
    }
    fs::write(&path, text).expect("Failed to write test file");
    path
}

/// A mission registering `MYTAG_fnc_doThing` in category `utils`.
pub const MISSION_DESCRIPTION: &str = r#"author = "Tester";
class CfgFunctions
{
    class MyTag
    {
        tag = "MYTAG";
        class utils
        {
            class doThing {};
        };
    };
};
"#;

pub const DO_THING_SOURCE: &str = r#"/*
 * Does the thing.
 *
 * Arguments:
 * 0: The unit <OBJECT>
 *
 * Return Value:
 * Success <BOOL>
 */
params ["_unit"];
true
"#;

/// A workspace with [`MISSION_DESCRIPTION`] and its function file, indexed.
pub fn create_indexed_workspace() -> (TempDir, PathBuf, Workspace) {
    let (temp_dir, workspace_dir) = create_test_workspace_dir();
    write_file(&workspace_dir, "description.ext", MISSION_DESCRIPTION);
    write_file(
        &workspace_dir,
        "functions/utils/fn_doThing.sqf",
        DO_THING_SOURCE,
    );

    let workspace = Workspace::new(&workspace_dir, Settings::default());
    workspace.index_workspace();
    (temp_dir, workspace_dir, workspace)
}
