//! Build marker injection.
//!
//! The artifact carries exactly one line of the shape
//! `BOT_LAST_UPDATED = "<value>"`. Injection swaps the quoted value and
//! leaves every other byte of the file untouched.

use std::ops::Range;

use regex::Regex;
use serde::Serialize;

use crate::error::{Error, Result};

pub const DEFAULT_MARKER_KEY: &str = "BOT_LAST_UPDATED";

/// Compiled matcher for one marker key.
#[derive(Debug, Clone)]
pub struct Marker {
    key: String,
    pattern: Regex,
}

/// The single marker line found in an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerLine {
    /// 1-based line number.
    pub line: usize,
    pub value: String,
    #[serde(skip)]
    pub value_range: Range<usize>,
}

impl Marker {
    pub fn new(key: &str) -> Result<Self> {
        let key = key.trim();
        let is_identifier = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !key.starts_with(|c: char| c.is_ascii_digit());

        if !is_identifier {
            return Err(Error::config_invalid_value(
                "artifact.marker_key",
                Some(key.to_string()),
                "Marker key must be an identifier (letters, digits, underscore)",
            ));
        }

        // The closing quote must end the statement; only a comment may follow.
        let pattern = Regex::new(&format!(
            r#"(?m)^{} = "(?P<value>[^"\r\n]*)"[ \t]*(?:#[^\r\n]*)?\r?$"#,
            regex::escape(key)
        ))
        .map_err(|e| Error::internal_unexpected(format!("marker pattern: {}", e)))?;

        Ok(Self {
            key: key.to_string(),
            pattern,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Find the marker line. Zero or several matches are errors.
    pub fn locate(&self, text: &str) -> Result<MarkerLine> {
        let mut found: Vec<MarkerLine> = self
            .pattern
            .captures_iter(text)
            .filter_map(|caps| caps.name("value"))
            .map(|value| MarkerLine {
                line: line_number(text, value.start()),
                value: value.as_str().to_string(),
                value_range: value.range(),
            })
            .collect();

        if found.len() > 1 {
            return Err(Error::marker_ambiguous(
                &self.key,
                found.iter().map(|m| m.line).collect(),
            ));
        }

        found.pop().ok_or_else(|| Error::marker_not_found(&self.key))
    }

    /// Return `text` with the marker value replaced by `stamp`.
    pub fn inject(&self, text: &str, stamp: &str) -> Result<String> {
        if stamp.contains(['"', '\r', '\n']) {
            return Err(Error::validation_invalid_argument(
                "stamp",
                "Marker value cannot contain quotes or line breaks",
                Some(stamp.to_string()),
                None,
            ));
        }

        let marker = self.locate(text)?;

        let mut stamped = String::with_capacity(text.len() + stamp.len());
        stamped.push_str(&text[..marker.value_range.start]);
        stamped.push_str(stamp);
        stamped.push_str(&text[marker.value_range.end..]);
        Ok(stamped)
    }
}

impl Default for Marker {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER_KEY).expect("default marker key is a valid identifier")
    }
}

fn line_number(text: &str, offset: usize) -> usize {
    text[..offset].matches('\n').count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "BOT_VERSION = \"1.0.0\"\nBOT_LAST_UPDATED = \"Not deployed yet\"  # This will be replaced during deployment\n\nprint(BOT_LAST_UPDATED)\n";

    #[test]
    fn inject_replaces_only_the_quoted_value() {
        let stamped = Marker::default()
            .inject(SOURCE, "2024-06-01 12:34 UTC")
            .unwrap();

        assert_eq!(
            stamped,
            "BOT_VERSION = \"1.0.0\"\nBOT_LAST_UPDATED = \"2024-06-01 12:34 UTC\"  # This will be replaced during deployment\n\nprint(BOT_LAST_UPDATED)\n"
        );
    }

    #[test]
    fn inject_twice_keeps_a_single_marker_with_latest_value() {
        let marker = Marker::default();
        let first = marker.inject(SOURCE, "2024-06-01 12:34 UTC").unwrap();
        let second = marker.inject(&first, "2024-06-02 08:00 UTC").unwrap();

        let found = marker.locate(&second).unwrap();
        assert_eq!(found.value, "2024-06-02 08:00 UTC");
        assert_eq!(second.matches("BOT_LAST_UPDATED = ").count(), 1);
        assert_eq!(second.len(), SOURCE.len() - "Not deployed yet".len() + 20);
    }

    #[test]
    fn inject_preserves_crlf_line_endings() {
        let text = "a = 1\r\nBOT_LAST_UPDATED = \"old\"\r\nb = 2\r\n";
        let stamped = Marker::default().inject(text, "new").unwrap();
        assert_eq!(stamped, "a = 1\r\nBOT_LAST_UPDATED = \"new\"\r\nb = 2\r\n");
    }

    #[test]
    fn locate_reports_line_number() {
        let found = Marker::default().locate(SOURCE).unwrap();
        assert_eq!(found.line, 2);
        assert_eq!(found.value, "Not deployed yet");
    }

    #[test]
    fn missing_marker_is_an_error() {
        let err = Marker::default()
            .inject("print('hi')\n", "2024-06-01 12:34 UTC")
            .unwrap_err();
        assert_eq!(err.code.as_str(), "marker.not_found");
    }

    #[test]
    fn duplicate_marker_is_an_error() {
        let text = "BOT_LAST_UPDATED = \"a\"\nx = 1\nBOT_LAST_UPDATED = \"b\"\n";
        let err = Marker::default().inject(text, "c").unwrap_err();
        assert_eq!(err.code.as_str(), "marker.ambiguous");
        assert_eq!(err.details["lines"], serde_json::json!([1, 3]));
    }

    #[test]
    fn indented_or_reformatted_lines_do_not_match() {
        let marker = Marker::default();
        for text in [
            "    BOT_LAST_UPDATED = \"x\"\n",
            "BOT_LAST_UPDATED=\"x\"\n",
            "BOT_LAST_UPDATED = 'x'\n",
            "MY_BOT_LAST_UPDATED = \"x\"\n",
            "BOT_LAST_UPDATED_AT = \"x\"\n",
        ] {
            assert_eq!(
                marker.locate(text).unwrap_err().code.as_str(),
                "marker.not_found",
                "unexpected match in {:?}",
                text
            );
        }
    }

    #[test]
    fn lines_that_continue_past_the_closing_quote_do_not_match() {
        let marker = Marker::default();
        for text in [
            "BOT_LAST_UPDATED = \"say \\\"hi\\\"\"\n",
            "BOT_LAST_UPDATED = \"a\" + b\n",
            "BOT_LAST_UPDATED = \"a\".upper()\n",
        ] {
            assert_eq!(
                marker.inject(text, "2024-06-01 12:34 UTC").unwrap_err().code.as_str(),
                "marker.not_found",
                "unexpected match in {:?}",
                text
            );
        }
    }

    #[test]
    fn marker_on_last_line_without_newline_matches() {
        let stamped = Marker::default()
            .inject("x = 1\nBOT_LAST_UPDATED = \"old\"\t# stamp", "new")
            .unwrap();
        assert_eq!(stamped, "x = 1\nBOT_LAST_UPDATED = \"new\"\t# stamp");
    }

    #[test]
    fn custom_key_is_escaped_and_matched() {
        let marker = Marker::new("DEPLOYED_AT").unwrap();
        let stamped = marker.inject("DEPLOYED_AT = \"\"\n", "now").unwrap();
        assert_eq!(stamped, "DEPLOYED_AT = \"now\"\n");
    }

    #[test]
    fn invalid_key_is_rejected() {
        assert!(Marker::new("").is_err());
        assert!(Marker::new("BOT.LAST").is_err());
        assert!(Marker::new("1ST").is_err());
    }

    #[test]
    fn stamp_with_quote_is_rejected() {
        let err = Marker::default().inject(SOURCE, "bad\"value").unwrap_err();
        assert_eq!(err.code.as_str(), "validation.invalid_argument");
    }
}
