//! Inline citation markers.
//!
//! Prompts ask the model to cite passages as `[Source: <name>]`. The markers are stripped
//! from the text shown to students; the reported sources come from the retrieved passages.

use once_cell::sync::Lazy;
use regex::Regex;

static CITATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[\s*source\s*:\s*([^\]]*)\]").expect("citation pattern"));
static SPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").expect("space pattern"));
static SPACE_BEFORE_PUNCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]+([.,;:!?)])").expect("punctuation pattern"));
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("newline pattern"));

pub fn citation_marker(source_id: &str) -> String {
    format!("[Source: {source_id}]")
}

/// Removes every citation marker and tidies the whitespace left behind.
pub fn strip_citations(text: &str) -> String {
    let stripped = CITATION.replace_all(text, "");
    let lines: Vec<String> = stripped
        .lines()
        .map(|line| {
            let line = SPACE_RUN.replace_all(line, " ");
            let line = SPACE_BEFORE_PUNCT.replace_all(&line, "$1");
            line.trim_end().to_string()
        })
        .collect();
    let joined = lines.join("\n");
    BLANK_LINES.replace_all(&joined, "\n\n").trim().to_string()
}

/// Names cited in `text`, first appearance first.
pub fn cited_sources(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for cap in CITATION.captures_iter(text) {
        let name = cap.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        if !name.is_empty() && !out.iter().any(|s| s == name) {
            out.push(name.to_string());
        }
    }
    out
}
