//! Function header comments.
//!
//! A function file may open with a block comment documenting it. Two layouts
//! are common and both are understood:
//!
//! ```text
//! /*
//!  * Author: someone
//!  * Heals a unit.
//!  *
//!  * Arguments:
//!  * 0: The unit <OBJECT>
//!  * 1: Amount <NUMBER> (default: 1)
//!  *
//!  * Return Value:
//!  * Success <BOOL>
//!  */
//! ```
//!
//! and the `Description:` / `Parameter(s):` / `Returns:` layout with
//! `0: OBJECT - the unit` argument lines. JSDoc tags (`@param {TYPE} name`,
//! `@returns {TYPE}`) are accepted anywhere.
//!
//! Nothing here fails: a comment that cannot be understood yields an info with
//! every field absent.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FunctionInfo {
    pub description: Option<String>,
    pub params: Vec<FunctionParam>,
    pub returns: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FunctionParam {
    pub name: Option<String>,
    pub type_label: Option<String>,
    pub description: Option<String>,
    pub optional: bool,
    pub default_value: Option<String>,
}

/// Extract and parse the header comment of a function file.
pub fn extract_function_info(text: &str) -> Option<FunctionInfo> {
    extract_leading_comment(text).map(parse_comment)
}

/// The interior of the block comment that precedes any code.
///
/// Whitespace, `//` comments and preprocessor lines may come first.
pub fn extract_leading_comment(text: &str) -> Option<&str> {
    let mut rest = text.trim_start_matches('\u{feff}');
    loop {
        rest = rest.trim_start();
        if rest.starts_with("//") || rest.starts_with('#') {
            rest = rest.split_once('\n').map(|(_, tail)| tail).unwrap_or("");
            continue;
        }

        let body = rest.strip_prefix("/*")?;
        let end = body.find("*/")?;
        return Some(&body[..end]);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Description,
    Arguments,
    Returns,
    Ignored,
}

static HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?P<heading>description|arguments?|parameters?|parameter\(s\)|params|return values?|return value\(s\)|returns?|authors?|author\(s\)|examples?|example\(s\)|public|file|notes?|license)\s*:\s*(?P<rest>.*)$",
    )
    .unwrap()
});

/// `0: The unit <OBJECT> (default: player)`
static TYPED_ARG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<index>\d+)\s*:\s*(?P<text>.*?)\s*<(?P<type>[^>]+)>\s*(?P<tail>.*)$").unwrap()
});

/// `1 (Optional): NUMBER - amount` or `_this select 0: OBJECT - unit`
static DASHED_ARG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:_this\s+select\s+)?(?P<index>\d+)\s*(?P<optional>\(optional\))?\s*:\s*(?P<type>[^-]+?)\s+-\s*(?P<desc>.*)$",
    )
    .unwrap()
});

/// `_unit: OBJECT - the unit`
static NAMED_ARG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<name>_\w+)\s*(?:\((?P<optional>(?i)optional)\))?\s*:\s*(?P<type>[^-]+?)\s+-\s*(?P<desc>.*)$")
        .unwrap()
});

/// `@param {NUMBER} [amount=1] description`
static JSDOC_PARAM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^@param\s+(?:\{(?P<type>[^}]*)\}\s*)?(?:\[(?P<optname>[\w$]+)(?:=(?P<default>[^\]]*))?\]|(?P<name>[\w$]+))?\s*(?:-\s*)?(?P<desc>.*)$",
    )
    .unwrap()
});

/// `@returns {BOOL} description`
static JSDOC_RETURNS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^@returns?\s+(?:\{(?P<type>[^}]*)\})?\s*(?P<desc>.*)$").unwrap()
});

static DEFAULT_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\(?default:\s*(?P<value>[^)]*?)\s*\)?\s*$").unwrap());

static OPTIONAL_MARK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\(optional\)").unwrap());

static TYPE_IN_ANGLES: Lazy<Regex> = Lazy::new(|| Regex::new(r"<(?P<type>[^>]+)>").unwrap());

/// Parse the interior of a header comment.
pub fn parse_comment(body: &str) -> FunctionInfo {
    let mut info = FunctionInfo::default();
    let mut section = Section::Preamble;
    let mut preamble = vec![];
    let mut description = vec![];
    let mut returns = vec![];

    for raw in body.lines() {
        let line = strip_gutter(raw);

        if let Some(tag) = line.strip_prefix('@') {
            jsdoc_tag(&mut info, &mut description, tag, line);
            continue;
        }

        if let Some(caps) = HEADING.captures(line) {
            let heading = caps["heading"].to_lowercase();
            let rest = caps["rest"].trim();
            section = section_for(&heading);
            match section {
                Section::Description | Section::Returns if !rest.is_empty() => {
                    let target = match section {
                        Section::Description => &mut description,
                        _ => &mut returns,
                    };
                    target.push(rest.to_string());
                }
                // single-line headings hand control back to the free text
                Section::Ignored if !heading.starts_with("example") && !heading.starts_with("note") => {
                    section = Section::Preamble;
                }
                _ => {}
            }
            continue;
        }

        match section {
            Section::Preamble => preamble.push(line.to_string()),
            Section::Description => description.push(line.to_string()),
            Section::Arguments => argument_line(&mut info.params, line),
            Section::Returns => returns.push(line.to_string()),
            Section::Ignored => {}
        }
    }

    if info.description.is_none() {
        info.description = join_paragraph(&description).or_else(|| join_paragraph(&preamble));
    }
    if info.returns.is_none() {
        info.returns = returns
            .iter()
            .map(|line| line.trim())
            .find(|line| !line.is_empty())
            .and_then(return_type);
    }

    info
}

fn section_for(heading: &str) -> Section {
    if heading == "description" {
        Section::Description
    } else if heading.starts_with("argument") || heading.starts_with("param") {
        Section::Arguments
    } else if heading.starts_with("return") {
        Section::Returns
    } else {
        Section::Ignored
    }
}

/// Drop indentation and the `*` gutter of a comment line.
fn strip_gutter(line: &str) -> &str {
    let line = line.trim_start();
    let line = line.trim_start_matches('*');
    line.strip_prefix(' ').unwrap_or(line).trim_end()
}

fn join_paragraph(lines: &[String]) -> Option<String> {
    let text = lines.join("\n");
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn non_empty(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn jsdoc_tag(info: &mut FunctionInfo, description: &mut Vec<String>, tag: &str, line: &str) {
    if let Some(caps) = JSDOC_PARAM.captures(line) {
        let optional_name = caps.name("optname").map(|m| m.as_str().to_string());
        info.params.push(FunctionParam {
            optional: optional_name.is_some(),
            name: optional_name.or_else(|| caps.name("name").map(|m| m.as_str().to_string())),
            type_label: caps.name("type").and_then(|m| non_empty(m.as_str())),
            description: caps.name("desc").and_then(|m| non_empty(m.as_str())),
            default_value: caps.name("default").and_then(|m| non_empty(m.as_str())),
        });
    } else if let Some(caps) = JSDOC_RETURNS.captures(line) {
        info.returns = caps
            .name("type")
            .and_then(|m| non_empty(m.as_str()))
            .or_else(|| caps.name("desc").and_then(|m| non_empty(m.as_str())));
    } else if let Some(text) = tag.strip_prefix("description") {
        description.push(text.trim().to_string());
    }
}

fn argument_line(params: &mut Vec<FunctionParam>, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    if let Some(caps) = TYPED_ARG.captures(line) {
        let tail = &caps["tail"];
        let mut param = FunctionParam {
            type_label: non_empty(&caps["type"]),
            description: non_empty(&caps["text"]),
            ..Default::default()
        };
        apply_optionality(&mut param, tail);
        params.push(param);
    } else if let Some(caps) = DASHED_ARG.captures(line) {
        let desc = &caps["desc"];
        let mut param = FunctionParam {
            type_label: non_empty(&caps["type"]),
            description: non_empty(strip_default(desc)),
            optional: caps.name("optional").is_some(),
            ..Default::default()
        };
        apply_optionality(&mut param, desc);
        params.push(param);
    } else if let Some(caps) = NAMED_ARG.captures(line) {
        let desc = &caps["desc"];
        let mut param = FunctionParam {
            name: Some(caps["name"].to_string()),
            type_label: non_empty(&caps["type"]),
            description: non_empty(strip_default(desc)),
            optional: caps.name("optional").is_some(),
            ..Default::default()
        };
        apply_optionality(&mut param, desc);
        params.push(param);
    } else if let Some(last) = params.last_mut() {
        // continuation of the previous argument's description
        let joined = match last.description.take() {
            Some(existing) => format!("{existing} {line}"),
            None => line.to_string(),
        };
        last.description = Some(joined);
    }
}

fn apply_optionality(param: &mut FunctionParam, text: &str) {
    if OPTIONAL_MARK.is_match(text) {
        param.optional = true;
    }
    if let Some(caps) = DEFAULT_VALUE.captures(text) {
        param.optional = true;
        param.default_value = non_empty(&caps["value"]);
    }
}

fn strip_default(text: &str) -> &str {
    match DEFAULT_VALUE.find(text) {
        Some(m) => text[..m.start()].trim_end(),
        None => text,
    }
}

/// `Success <BOOL>` → `BOOL`, `BOOL - true on success` → `BOOL`.
fn return_type(line: &str) -> Option<String> {
    if let Some(caps) = TYPE_IN_ANGLES.captures(line) {
        return non_empty(&caps["type"]);
    }

    let label = line.split(" - ").next().unwrap_or(line).trim();
    match label.to_lowercase().as_str() {
        "" | "none" | "nothing" | "-" => None,
        _ => Some(label.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Leading comments are found after blank lines, line comments and includes.
    #[test]
    fn test_extract_leading_comment_skips_preamble() {
        let text = "\n// header\n#include \"script_component.hpp\"\n/* body */\ncode;";
        assert_eq!(extract_leading_comment(text), Some(" body "));
    }

    /// Code before the comment means there is no header.
    #[test]
    fn test_no_comment_after_code() {
        assert_eq!(extract_leading_comment("params [\"_a\"];\n/* late */"), None);
        assert_eq!(extract_leading_comment("/* unterminated"), None);
        assert_eq!(extract_function_info("hint \"hi\";"), None);
    }

    /// The starred layout with typed, defaulted and optional arguments.
    #[test]
    fn test_starred_layout() {
        let info = extract_function_info(
            r#"/*
 * Author: someone
 * Heals a unit.
 *
 * Arguments:
 * 0: The unit <OBJECT>
 * 1: Amount <NUMBER> (default: 1)
 * 2: Silent <BOOL> (Optional)
 *
 * Return Value:
 * Success <BOOL>
 *
 * Example:
 * [player] call tag_fnc_heal
 *
 * Public: Yes
 */
params ["_unit"];
"#,
        )
        .unwrap();

        assert_eq!(info.description.as_deref(), Some("Heals a unit."));
        assert_eq!(info.returns.as_deref(), Some("BOOL"));
        assert_eq!(info.params.len(), 3);
        assert_eq!(
            info.params[0],
            FunctionParam {
                type_label: Some("OBJECT".into()),
                description: Some("The unit".into()),
                ..Default::default()
            }
        );
        assert!(info.params[1].optional);
        assert_eq!(info.params[1].default_value.as_deref(), Some("1"));
        assert!(info.params[2].optional);
        assert_eq!(info.params[2].default_value, None);
    }

    /// The Description / Parameter(s) / Returns layout.
    #[test]
    fn test_sectioned_layout() {
        let info = parse_comment(
            r"
	Author: someone

	Description:
	Spawns a group
	at a position.

	Parameter(s):
		0: ARRAY - position
		1 (Optional): SIDE - side of the group
		_count: NUMBER - number of units (default: 4)

	Returns:
	GROUP - the new group
",
        );

        assert_eq!(
            info.description.as_deref(),
            Some("Spawns a group\nat a position.")
        );
        assert_eq!(info.returns.as_deref(), Some("GROUP"));
        assert_eq!(info.params.len(), 3);
        assert_eq!(info.params[0].type_label.as_deref(), Some("ARRAY"));
        assert!(!info.params[0].optional);
        assert!(info.params[1].optional);
        assert_eq!(info.params[2].name.as_deref(), Some("_count"));
        assert_eq!(info.params[2].default_value.as_deref(), Some("4"));
        assert_eq!(
            info.params[2].description.as_deref(),
            Some("number of units")
        );
    }

    /// JSDoc tags fill params and the return type.
    #[test]
    fn test_jsdoc_tags() {
        let info = parse_comment(
            "*\n * Adds two numbers.\n * @param {NUMBER} a - first\n * @param {NUMBER} [b=0] second\n * @returns {NUMBER} the sum\n ",
        );

        assert_eq!(info.description.as_deref(), Some("Adds two numbers."));
        assert_eq!(info.returns.as_deref(), Some("NUMBER"));
        assert_eq!(info.params[0].name.as_deref(), Some("a"));
        assert_eq!(info.params[0].description.as_deref(), Some("first"));
        assert_eq!(info.params[1].name.as_deref(), Some("b"));
        assert!(info.params[1].optional);
        assert_eq!(info.params[1].default_value.as_deref(), Some("0"));
    }

    /// Unrecognisable comments yield an empty info.
    #[test]
    fn test_malformed_comment_is_empty() {
        let info = parse_comment("\n * \n *   \n");
        assert_eq!(info, FunctionInfo::default());

        let info = parse_comment("Arguments:\n ??? <<>> ::\nReturns:\nNone");
        assert!(info.params.is_empty());
        assert_eq!(info.returns, None);
    }

    /// Lines that do not start an argument continue the previous one.
    #[test]
    fn test_argument_continuation() {
        let info = parse_comment("Arguments:\n0: The unit <OBJECT>\n   that gets healed\n");
        assert_eq!(
            info.params[0].description.as_deref(),
            Some("The unit that gets healed")
        );
    }
}
