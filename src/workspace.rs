//! Workspace indexing.
//!
//! A [`Workspace`] owns everything one editor session knows: the settings, the
//! open document buffers and one function map per root file. Root files are
//! re-indexed whole; the map of a root is replaced, never patched, so readers
//! always see either the old or the new table.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use dashmap::DashMap;
use globset::{Glob, GlobSet, GlobSetBuilder};
use parking_lot::{Mutex, RwLock};
use tower_lsp::lsp_types::Url;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::config::Settings;
use crate::config_tree::{ConfigParser, DocumentLoader};
use crate::diagnostics::{self, DiagnosticBatch};
use crate::function_index::{
    attach_docstrings, build_function_index, FunctionMap, FunctionRecord, IndexOptions,
};

/// File name of a mission root, compared case-insensitively.
pub const ROOT_FILE_NAME: &str = "description.ext";

/// Extensions of files that may be included by a root.
const CONFIG_EXTENSIONS: &[&str] = &["hpp", "h", "inc", "cpp", "ext"];

pub struct Workspace {
    root_dir: PathBuf,
    settings: RwLock<Settings>,
    documents: DashMap<Url, String>,
    functions: DashMap<PathBuf, Arc<FunctionMap>>,
    roots: RwLock<BTreeSet<PathBuf>>,
    /// Files each root last published diagnostics for.
    published: DashMap<PathBuf, Vec<Url>>,
}

impl Workspace {
    pub fn new(root_dir: &Path, settings: Settings) -> Workspace {
        Workspace {
            root_dir: root_dir.to_path_buf(),
            settings: RwLock::new(settings),
            documents: DashMap::new(),
            functions: DashMap::new(),
            roots: RwLock::new(BTreeSet::new()),
            published: DashMap::new(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn settings(&self) -> Settings {
        self.settings.read().clone()
    }

    pub fn set_settings(&self, settings: Settings) {
        *self.settings.write() = settings;
    }

    /// Root files indexed so far.
    pub fn roots(&self) -> Vec<PathBuf> {
        self.roots.read().iter().cloned().collect()
    }

    /// The root files named by the settings, sorted and de-duplicated.
    pub fn discover_roots(&self) -> Vec<PathBuf> {
        let settings = self.settings();
        let mut roots = BTreeSet::new();

        for file in &settings.description_files {
            let expanded = shellexpand::tilde(file);
            let path = Path::new(expanded.as_ref());
            roots.insert(if path.is_absolute() {
                path.to_path_buf()
            } else {
                self.root_dir.join(path)
            });
        }

        if settings.discover_description_files {
            let excludes = exclude_set(&settings.exclude);
            let found = WalkDir::new(&self.root_dir)
                .into_iter()
                .filter_entry(|e| {
                    e.depth() == 0
                        || !e
                            .file_name()
                            .to_str()
                            .map(|s| s.starts_with('.'))
                            .unwrap_or(false)
                })
                .flatten()
                .filter(|e| e.file_type().is_file())
                .filter(|e| {
                    e.file_name()
                        .to_str()
                        .is_some_and(|name| name.eq_ignore_ascii_case(ROOT_FILE_NAME))
                })
                .filter(|e| {
                    e.path()
                        .strip_prefix(&self.root_dir)
                        .map(|relative| !excludes.is_match(relative))
                        .unwrap_or(true)
                })
                .map(|e| e.into_path());
            roots.extend(found);
        } else {
            let conventional = self.root_dir.join(ROOT_FILE_NAME);
            if conventional.is_file() {
                roots.insert(conventional);
            }
        }

        roots.into_iter().collect()
    }

    /// Discover and index every root. A root that fails is logged and skipped.
    pub fn index_workspace(&self) -> DiagnosticBatch {
        let roots = self.discover_roots();
        info!(
            "Indexing {} root file(s) under {}",
            roots.len(),
            self.root_dir.display()
        );

        let stale: Vec<PathBuf> = self
            .functions
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|root| !roots.contains(root))
            .collect();
        let mut batch = DiagnosticBatch::new();
        for root in &stale {
            debug!("{} is no longer a root", root.display());
            batch.extend(self.forget_root(root));
        }
        *self.roots.write() = roots.iter().cloned().collect();

        batch.extend(self.index_roots(&roots));
        info!(
            "Indexed {} function(s), {} error(s)",
            self.function_count(),
            batch.error_count()
        );
        batch
    }

    /// Parse one root file and replace its function map.
    ///
    /// A parse error is reported as a diagnostic and leaves the root with an
    /// empty map. A root that no longer exists on disk or in a buffer is
    /// dropped, and the batch clears every file it reported before.
    pub fn index_root(&self, path: &Path) -> anyhow::Result<DiagnosticBatch> {
        if !path.is_file() && self.load(path).is_none() {
            info!("{} no longer exists", path.display());
            return Ok(self.forget_root(path));
        }

        let settings = self.settings();
        let options = IndexOptions::from(&settings);
        let touched = Mutex::new(vec![]);
        let observer = |file: &Path| touched.lock().push(file.to_path_buf());

        let parsed = ConfigParser::new(&options.include_prefixes)
            .with_loader(self)
            .with_observer(&observer)
            .parse(path);

        let mut batch = DiagnosticBatch::new();
        batch.clear(diagnostics::file_url(path).context("Root file has no URI")?);
        for file in touched.into_inner() {
            batch.clear_file(&file);
        }

        let functions = match parsed {
            Ok(tree) => {
                let mut index = build_function_index(&tree, path, &options);
                if settings.docstrings {
                    attach_docstrings(&mut index.functions, self);
                }
                batch.extend(index.diagnostics);
                index.functions
            }
            Err(err) => {
                warn!("{err}");
                batch.push_for_file(&err.file, diagnostics::parse_error(&err));
                FunctionMap::new()
            }
        };

        debug!(
            "{} defines {} function(s)",
            path.display(),
            functions.len()
        );
        self.record_published(path, &mut batch);
        self.functions.insert(path.to_path_buf(), Arc::new(functions));
        self.roots.write().insert(path.to_path_buf());
        Ok(batch)
    }

    /// Remember the files `batch` publishes for `root`. Files published last
    /// time and absent now are cleared in `batch`.
    fn record_published(&self, root: &Path, batch: &mut DiagnosticBatch) {
        let current: Vec<Url> = batch.iter().map(|(uri, _)| uri.clone()).collect();
        if let Some(previous) = self.published.insert(root.to_path_buf(), current) {
            for uri in previous {
                batch.clear(uri);
            }
        }
    }

    /// Drop a root's table. The batch clears every file it published.
    fn forget_root(&self, root: &Path) -> DiagnosticBatch {
        self.functions.remove(root);
        self.roots.write().remove(root);

        let mut batch = DiagnosticBatch::new();
        if let Some((_, uris)) = self.published.remove(root) {
            for uri in uris {
                batch.clear(uri);
            }
        }
        batch
    }

    fn index_roots(&self, roots: &[PathBuf]) -> DiagnosticBatch {
        let mut batch = DiagnosticBatch::new();
        for root in roots {
            match self.index_root(root) {
                Ok(diagnostics) => batch.extend(diagnostics),
                Err(err) => error!("Failed to index {}: {err:#}", root.display()),
            }
        }
        batch
    }

    /// Re-index whatever a change to `uri` may affect.
    ///
    /// A root file re-indexes itself. Any other config file may be included
    /// from anywhere, so every known root is re-indexed.
    pub fn parse_document(&self, uri: &Url) -> DiagnosticBatch {
        let Ok(path) = uri.to_file_path() else {
            return DiagnosticBatch::new();
        };

        if self.is_root(&path) {
            return self.index_roots(&[path]);
        }

        if is_config_file(&path) {
            let roots = self.roots();
            debug!(
                "{} changed, re-indexing {} root(s)",
                path.display(),
                roots.len()
            );
            return self.index_roots(&roots);
        }

        DiagnosticBatch::new()
    }

    fn is_root(&self, path: &Path) -> bool {
        self.roots.read().contains(path)
            || path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.eq_ignore_ascii_case(ROOT_FILE_NAME))
    }

    pub fn open_document(&self, uri: Url, text: String) {
        self.documents.insert(uri, text);
    }

    pub fn update_document(&self, uri: Url, text: String) {
        self.documents.insert(uri, text);
    }

    pub fn close_document(&self, uri: &Url) {
        self.documents.remove(uri);
    }

    pub fn document_text(&self, uri: &Url) -> Option<String> {
        self.documents.get(uri).map(|text| text.value().clone())
    }

    /// Every function of every root, sorted by name.
    pub fn functions(&self) -> Vec<FunctionRecord> {
        let mut records: Vec<_> = self
            .functions
            .iter()
            .flat_map(|map| map.values().cloned().collect::<Vec<_>>())
            .collect();
        records.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.filename.cmp(&b.filename)));
        records
    }

    pub fn function_count(&self) -> usize {
        self.functions.iter().map(|map| map.len()).sum()
    }

    /// Look a function up by its exact name, then case-insensitively.
    pub fn find_function(&self, name: &str) -> Option<FunctionRecord> {
        let maps: Vec<_> = self
            .roots()
            .iter()
            .filter_map(|root| self.function_map(root))
            .collect();

        maps.iter()
            .flat_map(|map| map.get(&name.to_lowercase()))
            .find(|record| record.name == name)
            .or_else(|| maps.iter().find_map(|map| map.get(&name.to_lowercase())))
            .cloned()
    }

    pub fn function_map(&self, root: &Path) -> Option<Arc<FunctionMap>> {
        self.functions.get(root).map(|map| Arc::clone(&map))
    }
}

impl DocumentLoader for Workspace {
    fn load(&self, path: &Path) -> Option<String> {
        let uri = Url::from_file_path(path).ok()?;
        self.document_text(&uri)
    }
}

fn is_config_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            CONFIG_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

fn exclude_set(patterns: &[String]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(err) => warn!("Ignoring exclude pattern {pattern:?}: {err}"),
        }
    }
    builder.build().unwrap_or_else(|err| {
        warn!("Ignoring exclude patterns: {err}");
        GlobSet::empty()
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::test_utils::{
        create_indexed_workspace, create_test_workspace_dir, write_file, MISSION_DESCRIPTION,
    };

    fn uri(path: &Path) -> Url {
        Url::from_file_path(path).unwrap()
    }

    /// Discovery finds nested roots, skips hidden directories and excludes.
    #[test]
    fn test_discover_roots() {
        let (_temp, dir) = create_test_workspace_dir();
        write_file(&dir, "description.ext", "");
        write_file(&dir, "missions/coop.Altis/Description.ext", "");
        write_file(&dir, ".git/description.ext", "");
        write_file(&dir, "backup/description.ext", "");
        write_file(&dir, "missions/coop.Altis/config.cpp", "");

        let settings = Settings {
            exclude: vec!["backup/**".into()],
            ..Default::default()
        };
        let workspace = Workspace::new(&dir, settings);

        assert_eq!(
            workspace.discover_roots(),
            vec![
                dir.join("description.ext"),
                dir.join("missions/coop.Altis/Description.ext"),
            ]
        );
    }

    /// Without discovery only the explicit list and the conventional root count.
    #[test]
    fn test_discover_roots_without_walk() {
        let (_temp, dir) = create_test_workspace_dir();
        write_file(&dir, "description.ext", "");
        write_file(&dir, "nested/description.ext", "");
        write_file(&dir, "config/main.cpp", "");

        let settings = Settings {
            discover_description_files: false,
            description_files: vec!["config/main.cpp".into()],
            ..Default::default()
        };
        let workspace = Workspace::new(&dir, settings);

        assert_eq!(
            workspace.discover_roots(),
            vec![dir.join("config/main.cpp"), dir.join("description.ext")]
        );
    }

    /// The indexed mission exposes its function with docs.
    #[test]
    fn test_index_workspace() {
        let (_temp, dir, workspace) = create_indexed_workspace();

        let map = workspace
            .function_map(&dir.join("description.ext"))
            .unwrap();
        let record = &map["mytag_fnc_dothing"];
        assert_eq!(record.name, "MYTAG_fnc_doThing");
        assert_eq!(
            record.filename,
            dir.join("functions/utils/fn_doThing.sqf")
        );
        assert_eq!(
            record.info.as_ref().and_then(|i| i.description.as_deref()),
            Some("Does the thing.")
        );
        assert_eq!(workspace.roots(), vec![dir.join("description.ext")]);
    }

    /// A broken root reports its error and does not stop the others.
    #[test]
    fn test_parse_error_isolated_to_root() {
        let (_temp, dir) = create_test_workspace_dir();
        write_file(&dir, "a/description.ext", "class CfgFunctions { class T { class c { class f {}; }; };");
        write_file(&dir, "b/description.ext", MISSION_DESCRIPTION);

        let workspace = Workspace::new(&dir, Settings::default());
        let batch = workspace.index_workspace();

        let broken = batch.get(&uri(&dir.join("a/description.ext"))).unwrap();
        assert_eq!(broken.len(), 1);
        assert!(workspace
            .function_map(&dir.join("a/description.ext"))
            .unwrap()
            .is_empty());
        assert!(workspace
            .function_map(&dir.join("b/description.ext"))
            .unwrap()
            .contains_key("mytag_fnc_dothing"));
    }

    /// Creating the missing file clears its diagnostic and keeps the function.
    #[test]
    fn test_reindex_clears_missing_file_diagnostic() {
        let (_temp, dir) = create_test_workspace_dir();
        let root = write_file(&dir, "description.ext", MISSION_DESCRIPTION);
        let workspace = Workspace::new(&dir, Settings::default());

        let first = workspace.index_workspace();
        assert_eq!(first.get(&uri(&root)).map(|d| d.len()), Some(1));

        write_file(&dir, "functions/utils/fn_doThing.sqf", "");
        let second = workspace.parse_document(&uri(&root));
        assert_eq!(second.get(&uri(&root)), Some(&[][..]));
        assert!(workspace.find_function("MYTAG_fnc_doThing").is_some());
    }

    /// Functions declared in an include are attributed to the include.
    #[test]
    fn test_include_diagnostics_and_reindex() {
        let (_temp, dir) = create_test_workspace_dir();
        let root = write_file(
            &dir,
            "description.ext",
            "class CfgFunctions {\n#include \"cfgFunctions.hpp\"\n};\n",
        );
        let include = write_file(
            &dir,
            "cfgFunctions.hpp",
            "class T { class c { class missing {}; }; };\n",
        );
        let workspace = Workspace::new(&dir, Settings::default());

        let batch = workspace.index_workspace();
        assert_eq!(batch.get(&uri(&root)), Some(&[][..]));
        assert_eq!(batch.get(&uri(&include)).map(|d| d.len()), Some(1));

        fs::write(&include, "class T { class c { class other {}; }; };\n").unwrap();
        write_file(&dir, "functions/c/fn_other.sqf", "");
        let batch = workspace.parse_document(&uri(&include));
        assert_eq!(batch.get(&uri(&include)), Some(&[][..]));
        assert!(workspace.find_function("T_fnc_other").is_some());
        assert!(workspace.find_function("T_fnc_missing").is_none());
    }

    /// Open buffers are parsed instead of the file on disk.
    #[test]
    fn test_open_buffer_is_indexed() {
        let (_temp, dir, workspace) = create_indexed_workspace();
        let root = dir.join("description.ext");

        let edited = MISSION_DESCRIPTION.replace("doThing", "doOther");
        workspace.open_document(uri(&root), edited);
        workspace.parse_document(&uri(&root));
        assert!(workspace.find_function("MYTAG_fnc_doOther").is_some());
        assert!(workspace.find_function("MYTAG_fnc_doThing").is_none());

        workspace.close_document(&uri(&root));
        workspace.parse_document(&uri(&root));
        assert!(workspace.find_function("MYTAG_fnc_doThing").is_some());
        assert_eq!(workspace.document_text(&uri(&root)), None);
    }

    /// Unrelated documents do not trigger indexing.
    #[test]
    fn test_parse_document_ignores_scripts() {
        let (_temp, dir, workspace) = create_indexed_workspace();
        let script = dir.join("functions/utils/fn_doThing.sqf");
        assert!(workspace.parse_document(&uri(&script)).is_empty());
    }

    /// Lookup prefers the exact name and falls back to any casing.
    #[test]
    fn test_find_function_casing() {
        let (_temp, _dir, workspace) = create_indexed_workspace();
        assert!(workspace.find_function("MYTAG_fnc_doThing").is_some());
        assert_eq!(
            workspace.find_function("mytag_fnc_dothing").map(|r| r.name),
            Some("MYTAG_fnc_doThing".to_string())
        );
        assert!(workspace.find_function("MYTAG_fnc_nothing").is_none());
    }

    /// A deleted root loses its table on the next scan and its files are cleared.
    #[test]
    fn test_removed_root_is_dropped() {
        let (_temp, dir, workspace) = create_indexed_workspace();
        let root = dir.join("description.ext");
        fs::remove_file(&root).unwrap();

        let batch = workspace.index_workspace();
        assert_eq!(batch.get(&uri(&root)), Some(&[][..]));
        assert!(workspace.function_map(&root).is_none());
        assert!(workspace.functions().is_empty());
        assert!(workspace.roots().is_empty());
        assert!(workspace.index_root(&root).unwrap().is_empty());
    }

    /// A root that becomes excluded has its diagnostics cleared, includes too.
    #[test]
    fn test_excluded_root_is_cleared() {
        let (_temp, dir) = create_test_workspace_dir();
        let root = write_file(
            &dir,
            "a/description.ext",
            "class CfgFunctions {\n#include \"cfgFunctions.hpp\"\n};\n",
        );
        let include = write_file(
            &dir,
            "a/cfgFunctions.hpp",
            "class T { class c { class missing {}; }; };\n",
        );
        let workspace = Workspace::new(&dir, Settings::default());
        let batch = workspace.index_workspace();
        assert_eq!(batch.get(&uri(&include)).map(|d| d.len()), Some(1));

        let mut settings = workspace.settings();
        settings.exclude = vec!["a/**".into()];
        workspace.set_settings(settings);

        let batch = workspace.index_workspace();
        assert_eq!(batch.get(&uri(&root)), Some(&[][..]));
        assert_eq!(batch.get(&uri(&include)), Some(&[][..]));
        assert!(workspace.functions().is_empty());
    }

    /// A file no longer included by a root is cleared on its next index.
    #[test]
    fn test_dropped_include_is_cleared() {
        let (_temp, dir) = create_test_workspace_dir();
        let root = write_file(
            &dir,
            "description.ext",
            "class CfgFunctions {\n#include \"cfgFunctions.hpp\"\n};\n",
        );
        let include = write_file(
            &dir,
            "cfgFunctions.hpp",
            "class T { class c { class missing {}; }; };\n",
        );
        let workspace = Workspace::new(&dir, Settings::default());
        workspace.index_workspace();

        fs::write(&root, "class CfgFunctions {};\n").unwrap();
        let batch = workspace.parse_document(&uri(&root));
        assert_eq!(batch.get(&uri(&include)), Some(&[][..]));
    }
}
