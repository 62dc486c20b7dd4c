//! Virtual path resolution.
//!
//! Function files and `#include` targets are written as game-virtual paths
//! (`\x\cba\addons\main\fnc.sqf`, `functions\misc\fn_foo.sqf`). The user maps
//! virtual prefixes to local directories; everything else is relative to the
//! declaring file's directory.
//!
//! Prefixes are tried in declaration order and the first match wins. Longest
//! match is deliberately not attempted.

use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::IncludePrefix;

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Absolute on this platform, rooted with a separator, or carrying a drive letter.
pub fn is_absolute_like(path: &str) -> bool {
    static DRIVE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z]:([\\/]|$)").unwrap());

    Path::new(path).is_absolute() || path.starts_with(is_separator) || DRIVE.is_match(path)
}

/// Rewrites both separator styles to the platform separator.
pub fn normalize_separators(path: &str) -> String {
    path.chars()
        .map(|c| if is_separator(c) { MAIN_SEPARATOR } else { c })
        .collect()
}

/// Strips `prefix` from `path` if it matches on a separator boundary.
///
/// The comparison ignores ASCII case and trailing separators on the prefix.
/// The returned remainder keeps its leading separator.
fn strip_virtual_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches(is_separator);
    if prefix.is_empty() {
        return None;
    }

    let head = path.get(..prefix.len())?;
    let same = head
        .chars()
        .zip(prefix.chars())
        .all(|(a, b)| a.eq_ignore_ascii_case(&b) || (is_separator(a) && is_separator(b)));
    if !same {
        return None;
    }

    let rest = &path[prefix.len()..];
    (rest.is_empty() || rest.starts_with(is_separator)).then_some(rest)
}

/// Resolves a declared path against the include prefixes, falling back to
/// `base_dir`.
///
/// On a prefix match the mapped value is concatenated verbatim with the rest
/// of the path; an absolute mapped value is returned as-is, a relative one is
/// joined under `base_dir`.
pub fn resolve_virtual_path(path: &str, prefixes: &[IncludePrefix], base_dir: &Path) -> PathBuf {
    for include in prefixes {
        if let Some(rest) = strip_virtual_prefix(path, &include.prefix) {
            let mapped = format!("{}{}", include.path, rest);
            if is_absolute_like(&include.path) {
                return PathBuf::from(mapped);
            }
            return join_relative(base_dir, &mapped);
        }
    }

    join_relative(base_dir, path)
}

fn join_relative(base_dir: &Path, path: &str) -> PathBuf {
    let normalized = normalize_separators(path);
    base_dir.join(normalized.trim_start_matches(MAIN_SEPARATOR))
}
