use std::path::Path;

use anyhow::anyhow;
use config::{Config, File};
use serde::{Deserialize, Serialize};

/// Default debounce window applied to reparse requests.
pub const DEFAULT_REPARSE_DELAY_MS: u64 = 200;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Root description files, relative to the workspace root unless absolute
    pub description_files: Vec<String>,
    /// Walk the workspace for every `description.ext`
    pub discover_description_files: bool,
    /// Glob patterns (relative to the workspace root) skipped during discovery
    pub exclude: Vec<String>,
    /// Virtual include prefixes, matched in declaration order
    pub include_prefixes: Vec<IncludePrefix>,
    /// Read function header comments once the index is built
    pub docstrings: bool,
    pub reparse_delay_ms: u64,
}

/// A virtual path prefix (`\x\cba\addons`) and the local directory it maps to.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct IncludePrefix {
    pub prefix: String,
    pub path: String,
}

impl IncludePrefix {
    pub fn new(prefix: impl Into<String>, path: impl Into<String>) -> Self {
        IncludePrefix {
            prefix: prefix.into(),
            path: path.into(),
        }
    }
}

/// Settings pushed by the editor. Every field is optional and only the ones
/// present override the file-based settings.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    pub description_files: Option<Vec<String>>,
    pub discover_description_files: Option<bool>,
    pub exclude: Option<Vec<String>>,
    pub include_prefixes: Option<ClientIncludePrefixes>,
    pub docstrings: Option<bool>,
    pub reparse_delay_ms: Option<u64>,
}

/// Editors usually send include prefixes as an object (`{"\\A3\\": "P:/a3"}`),
/// config files as a list of tables. Both are accepted.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum ClientIncludePrefixes {
    List(Vec<IncludePrefix>),
    Map(serde_json::Map<String, serde_json::Value>),
}

impl ClientIncludePrefixes {
    fn into_prefixes(self) -> Vec<IncludePrefix> {
        match self {
            ClientIncludePrefixes::List(list) => list,
            ClientIncludePrefixes::Map(map) => map
                .into_iter()
                .filter_map(|(prefix, path)| Some(IncludePrefix::new(prefix, path.as_str()?)))
                .collect(),
        }
    }
}

impl Settings {
    pub fn new(root_dir: &Path) -> anyhow::Result<Settings> {
        let expanded = shellexpand::tilde("~/.config/cfgdex/settings");
        let settings = Config::builder()
            .add_source(File::with_name(&expanded).required(false))
            .add_source(
                File::with_name(&format!(
                    "{}/.cfgdex",
                    root_dir
                        .to_str()
                        .ok_or(anyhow!("Can't convert root_dir to str"))?
                ))
                .required(false),
            )
            .set_default("description_files", Vec::<String>::new())?
            .set_default("discover_description_files", true)?
            .set_default("exclude", Vec::<String>::new())?
            .set_default("include_prefixes", Vec::<String>::new())?
            .set_default("docstrings", true)?
            .set_default("reparse_delay_ms", DEFAULT_REPARSE_DELAY_MS)?
            .build()
            .map_err(|err| anyhow!("Build err: {err}"))?;

        let settings = settings.try_deserialize::<Settings>()?;

        anyhow::Ok(settings)
    }

    /// Merge editor settings (`initializationOptions` or a
    /// `workspace/didChangeConfiguration` payload) onto these settings.
    ///
    /// The payload may be nested under a `cfgdex` key. Unknown keys are
    /// ignored; a payload that does not deserialize leaves the settings as
    /// they were.
    pub fn merge_client_settings(&mut self, value: &serde_json::Value) -> anyhow::Result<()> {
        let value = value.get("cfgdex").unwrap_or(value);
        if value.is_null() {
            return Ok(());
        }

        let client: ClientSettings = serde_json::from_value(value.clone())?;

        if let Some(files) = client.description_files {
            self.description_files = files;
        }
        if let Some(discover) = client.discover_description_files {
            self.discover_description_files = discover;
        }
        if let Some(exclude) = client.exclude {
            self.exclude = exclude;
        }
        if let Some(prefixes) = client.include_prefixes {
            self.include_prefixes = prefixes.into_prefixes();
        }
        if let Some(docstrings) = client.docstrings {
            self.docstrings = docstrings;
        }
        if let Some(delay) = client.reparse_delay_ms {
            self.reparse_delay_ms = delay;
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            description_files: vec![],
            discover_description_files: true,
            exclude: vec![],
            include_prefixes: vec![],
            docstrings: true,
            reparse_delay_ms: DEFAULT_REPARSE_DELAY_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    /// Settings built from an empty workspace equal the built-in defaults.
    #[test]
    fn test_settings_defaults_without_files() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings::new(temp_dir.path()).expect("settings should build");
        assert!(settings.discover_description_files);
        assert_eq!(settings.reparse_delay_ms, DEFAULT_REPARSE_DELAY_MS);
        assert!(settings.include_prefixes.is_empty());
        assert!(settings.description_files.is_empty());
    }

    /// A workspace `.cfgdex.toml` overrides the defaults.
    #[test]
    fn test_settings_from_workspace_file() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(".cfgdex.toml"),
            r#"
discover_description_files = false
exclude = ["**/node_modules/**"]

[[include_prefixes]]
prefix = '\x\cba'
path = "deps/cba"
"#,
        )
        .unwrap();

        let settings = Settings::new(temp_dir.path()).expect("settings should build");
        assert!(!settings.discover_description_files);
        assert_eq!(settings.exclude, vec!["**/node_modules/**".to_string()]);
        assert_eq!(
            settings.include_prefixes,
            vec![IncludePrefix::new(r"\x\cba", "deps/cba")]
        );
    }

    /// Editor settings only override the keys they carry.
    #[test]
    fn test_merge_client_settings_partial() {
        let mut settings = Settings::default();
        settings
            .merge_client_settings(&json!({
                "cfgdex": {
                    "discoverDescriptionFiles": false,
                    "descriptionFiles": ["mission/description.ext"]
                }
            }))
            .unwrap();

        assert!(!settings.discover_description_files);
        assert_eq!(settings.description_files, vec!["mission/description.ext"]);
        assert!(settings.docstrings);
    }

    /// Include prefixes sent as an object keep their declaration order.
    #[test]
    fn test_merge_client_include_prefix_map() {
        let mut settings = Settings::default();
        settings
            .merge_client_settings(&json!({
                "includePrefixes": { "\\A3\\": "C:/Data" }
            }))
            .unwrap();

        assert_eq!(
            settings.include_prefixes,
            vec![IncludePrefix::new("\\A3\\", "C:/Data")]
        );
    }

    /// A malformed payload is rejected and the settings are untouched.
    #[test]
    fn test_merge_client_settings_rejects_bad_types() {
        let mut settings = Settings::default();
        let result = settings.merge_client_settings(&json!({ "docstrings": "yes" }));
        assert!(result.is_err());
        assert_eq!(settings, Settings::default());
    }
}
