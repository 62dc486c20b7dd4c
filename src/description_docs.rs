//! Documentation for `description.ext` properties.
//!
//! The table ships with the binary (`data/description_ext.json`) and is loaded
//! once, on first use. Keys are lower-cased on load.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use serde::Deserialize;
use tracing::error;

static BUNDLED: &str = include_str!("../data/description_ext.json");

static DESCRIPTION_DOCS: Lazy<DescriptionDocs> =
    Lazy::new(|| match DescriptionDocs::from_json(BUNDLED) {
        Ok(docs) => docs,
        Err(err) => {
            error!("Bundled description.ext documentation is malformed: {err}");
            DescriptionDocs::default()
        }
    });

/// The process-wide documentation table.
pub fn description_docs() -> &'static DescriptionDocs {
    &DESCRIPTION_DOCS
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DocumentationEntry {
    pub name: String,
    /// Free-form type label (`String`, `Number`, `Array of Strings`, `Class`).
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub link: String,
}

impl DocumentationEntry {
    /// Text inserted when the property is completed, chosen by its type label.
    pub fn insert_text(&self) -> String {
        let kind = self.kind.to_lowercase();
        let name = &self.name;
        if kind == "string" {
            format!("{name} = \"")
        } else if kind.contains("array") || kind.ends_with("[]") {
            format!("{name}[] = {{")
        } else if kind == "class" {
            format!("class {name}\n{{\n")
        } else {
            format!("{name} = ")
        }
    }
}

#[derive(Debug, Default)]
pub struct DescriptionDocs {
    entries: BTreeMap<String, DocumentationEntry>,
}

impl DescriptionDocs {
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let raw: BTreeMap<String, DocumentationEntry> = serde_json::from_str(text)?;
        let entries = raw
            .into_iter()
            .map(|(key, entry)| (key.to_lowercase(), entry))
            .collect();
        Ok(DescriptionDocs { entries })
    }

    /// Case-insensitive lookup.
    pub fn get(&self, key: &str) -> Option<&DocumentationEntry> {
        self.entries.get(&key.to_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DocumentationEntry)> {
        self.entries.iter().map(|(key, entry)| (key.as_str(), entry))
    }

    /// Entries whose key starts with `prefix`, compared on the lower-cased key.
    pub fn starting_with<'a>(
        &'a self,
        prefix: &str,
    ) -> impl Iterator<Item = &'a DocumentationEntry> + 'a {
        let prefix = prefix.to_lowercase();
        self.entries
            .iter()
            .filter(move |(key, _)| key.starts_with(&prefix))
            .map(|(_, entry)| entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
