//! SKILL.md header parsing.
//!
//! The file opens with a fenced block of `key: value` lines; everything
//! after the closing fence is the SOP body:
//!
//! ````text
//! ```
//! name: pdf-tools
//! description: Split, merge and inspect PDF files
//! entrypoint: main.py
//! ```
//! # Standard Operating Procedure
//! ...
//! ````

use std::collections::HashMap;

/// Parsed skill metadata. `extras` carries any keys beyond the two
/// required ones (`entrypoint`, `version`, ...).
#[derive(Debug, Clone, Default)]
pub struct SkillHeader {
    pub name: String,
    pub description: String,
    pub extras: HashMap<String, String>,
}

/// Split a SKILL.md document into its header and SOP body.
///
/// Returns `None` when the document does not start with a fence. A header
/// without a `name` key is still accepted; callers fall back to the
/// directory name.
pub fn parse_skill_md(content: &str) -> Option<(SkillHeader, String)> {
    let mut lines = content.lines();

    // The fence must be the first non-blank line; a language tag after
    // the backticks is tolerated.
    let opening = loop {
        match lines.next() {
            Some(line) if line.trim().is_empty() => continue,
            Some(line) => break line,
            None => return None,
        }
    };
    if !opening.trim_start().starts_with("```") {
        return None;
    }

    let mut header = SkillHeader::default();
    let mut closed = false;
    for line in lines.by_ref() {
        if line.trim_start().starts_with("```") {
            closed = true;
            break;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim().to_owned();
        match key.as_str() {
            "name" => header.name = value,
            "description" => header.description = value,
            _ => {
                header.extras.insert(key, value);
            }
        }
    }
    if !closed {
        return None;
    }

    let body: String = lines.collect::<Vec<_>>().join("\n");
    Some((header, body.trim_start().to_owned()))
}
