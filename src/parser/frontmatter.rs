//! Markdown documents with a YAML frontmatter header
//!
//! ```text
//! ---
//! id: feature-20260301-1a2b3c4d
//! current_phase: design
//! ---
//! # feature-20260301-1a2b3c4d
//! ```
//!
//! The header opens on the first line and closes at the next line that is
//! exactly `---` at column 0. Indented `---` lines, as in block scalars, are
//! header content.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{EngineError, EngineResult};

const DELIMITER: &str = "---";

/// Split a document into its YAML header and markdown body.
pub fn split_frontmatter(content: &str) -> EngineResult<(&str, &str)> {
    let mut lines = content.split_inclusive('\n');
    let opening = lines.next().unwrap_or_default();
    if opening.trim_end() != DELIMITER {
        return Err(EngineError::serialization(
            "frontmatter",
            "document does not start with a --- header",
        ));
    }

    let header_start = opening.len();
    let mut offset = header_start;
    for line in lines {
        if line.trim_end_matches(['\r', '\n']) == DELIMITER {
            let header = &content[header_start..offset];
            let body = &content[offset + line.len()..];
            return Ok((header, body.trim_start_matches(['\r', '\n'])));
        }
        offset += line.len();
    }

    Err(EngineError::serialization(
        "frontmatter",
        "header is never closed with ---",
    ))
}

/// Parsed YAML header of a document.
pub fn extract_yaml_frontmatter(content: &str) -> EngineResult<serde_yaml::Value> {
    let (header, _) = split_frontmatter(content)?;
    serde_yaml::from_str(header).map_err(|e| EngineError::serialization("frontmatter", e))
}

/// Deserialize `T` from a document's header. `what` names the type in errors.
pub fn parse_from_markdown<T: DeserializeOwned>(content: &str, what: &str) -> EngineResult<T> {
    let (header, _) = split_frontmatter(content)?;
    serde_yaml::from_str(header).map_err(|e| EngineError::serialization(what, e))
}

/// Render `value` as the header of a document with the given body.
pub fn render_markdown<T: Serialize>(value: &T, what: &str, body: &str) -> EngineResult<String> {
    let yaml = serde_yaml::to_string(value).map_err(|e| EngineError::serialization(what, e))?;

    let mut out = format!("{DELIMITER}\n{yaml}");
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(DELIMITER);
    out.push('\n');
    if !body.is_empty() {
        out.push('\n');
        out.push_str(body);
        if !body.ends_with('\n') {
            out.push('\n');
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_split_header_and_body() {
        let content = "---\nstatus: active\nname: Design\n---\n\n# Design\nnotes\n";
        let (header, body) = split_frontmatter(content).unwrap();
        assert_eq!(header, "status: active\nname: Design\n");
        assert_eq!(body, "# Design\nnotes\n");

        let yaml = extract_yaml_frontmatter(content).unwrap();
        assert_eq!(yaml["status"].as_str(), Some("active"));
    }

    #[test]
    fn test_missing_delimiters() {
        let err = split_frontmatter("# Just markdown\n").unwrap_err();
        assert!(err.to_string().contains("does not start"));

        let err = split_frontmatter("---\nstatus: active\n# no close").unwrap_err();
        assert!(err.to_string().contains("never closed"));

        assert!(split_frontmatter("").is_err());
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(extract_yaml_frontmatter("---\ninvalid: yaml: syntax: error\n---\n").is_err());
    }

    #[test]
    fn test_indented_delimiter_stays_in_header() {
        let content = "---\nid: review\nfeedback: |\n  split this:\n  ---\n  part two\nstatus: pending\n---\n# Body";
        let yaml = extract_yaml_frontmatter(content).unwrap();
        assert_eq!(yaml["status"].as_str(), Some("pending"));
        assert!(yaml["feedback"].as_str().unwrap().contains("---"));
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: String,
        text: String,
    }

    #[test]
    fn test_render_then_parse() {
        let note = Note {
            id: "n1".into(),
            text: "line one\n---\nline three".into(),
        };
        let rendered = render_markdown(&note, "note", "# Note\n\nbody").unwrap();
        assert!(rendered.starts_with("---\n"));
        assert!(rendered.ends_with("body\n"));

        let back: Note = parse_from_markdown(&rendered, "note").unwrap();
        assert_eq!(back, note);
        assert_eq!(split_frontmatter(&rendered).unwrap().1, "# Note\n\nbody\n");
    }
}
