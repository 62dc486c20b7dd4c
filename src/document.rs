//! What kind of document a request comes from, and the word under the cursor.

use std::path::Path;

use tower_lsp::lsp_types::{Position, Url};

use crate::workspace::ROOT_FILE_NAME;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// A script (`.sqf`) that calls functions.
    Function,
    /// A mission root file.
    Description,
    Other,
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> DocumentKind {
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            return DocumentKind::Other;
        };

        if name.eq_ignore_ascii_case(ROOT_FILE_NAME) {
            DocumentKind::Description
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("sqf"))
        {
            DocumentKind::Function
        } else {
            DocumentKind::Other
        }
    }

    pub fn from_uri(uri: &Url) -> DocumentKind {
        uri.to_file_path()
            .map(|path| DocumentKind::from_path(&path))
            .unwrap_or(DocumentKind::Other)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Number of chars in `line` before the UTF-16 offset `character`.
fn char_offset(line: &str, character: usize) -> usize {
    let mut units = 0;
    line.chars()
        .take_while(|c| {
            units += c.len_utf16();
            units <= character
        })
        .count()
}

/// The identifier ending at the cursor, possibly empty.
///
/// `character` is an LSP column, counted in UTF-16 code units.
pub fn word_before(line: &str, character: usize) -> String {
    let before: Vec<char> = line.chars().take(char_offset(line, character)).collect();
    let start = before
        .iter()
        .rposition(|c| !is_word_char(*c))
        .map(|i| i + 1)
        .unwrap_or(0);
    before[start..].iter().collect()
}

/// The whole identifier the cursor is on, if any.
pub fn word_at(line: &str, character: usize) -> Option<String> {
    let after: String = line
        .chars()
        .skip(char_offset(line, character))
        .take_while(|c| is_word_char(*c))
        .collect();
    let word = word_before(line, character) + &after;
    (!word.is_empty()).then_some(word)
}

/// Text of the line at `position`.
pub fn line_at(text: &str, position: Position) -> Option<&str> {
    text.lines().nth(position.line as usize)
}
