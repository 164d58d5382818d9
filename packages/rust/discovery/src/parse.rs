//! Structured-answer parsing with a tolerant fallback.
//!
//! The chat surface does not guarantee machine-parseable output, so parsing
//! is two-tiered: a strict JSON extraction first, and a heuristic reduction
//! of the free text when that fails. Discovery never hard-fails on format.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

/// Maximum length of a heuristically derived board name.
const NAME_LIMIT: usize = 60;

/// Maximum length of a heuristically derived description.
const DESCRIPTION_LIMIT: usize = 200;

/// Matches a fenced code block, optionally tagged `json`.
static FENCED_JSON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("fenced json regex")
});

// ---------------------------------------------------------------------------
// BoardFacts
// ---------------------------------------------------------------------------

/// Structured board metadata extracted from an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardFacts {
    pub name: String,
    pub description: String,
    pub topics: Vec<String>,
}

/// Wire shape the structured prompt asks the board to produce.
#[derive(Debug, Deserialize)]
struct RawFacts {
    name: String,
    description: String,
    #[serde(default)]
    topics: Vec<String>,
}

// ---------------------------------------------------------------------------
// Strict parse
// ---------------------------------------------------------------------------

/// Attempt a strict-format parse of an answer into [`BoardFacts`].
///
/// Accepts a fenced ```json block or a bare JSON object embedded in prose.
/// Returns `None` on any mismatch — the caller degrades, never errors.
pub fn parse_structured(answer: &str) -> Option<BoardFacts> {
    let json = extract_json_object(answer)?;
    let raw: RawFacts = serde_json::from_str(&json).ok()?;

    let name = raw.name.trim();
    let description = raw.description.trim();
    if name.is_empty() || description.is_empty() {
        return None;
    }

    Some(BoardFacts {
        name: name.to_string(),
        description: description.to_string(),
        topics: raw
            .topics
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
    })
}

/// Pull the most plausible JSON object out of an answer.
fn extract_json_object(answer: &str) -> Option<String> {
    if let Some(caps) = FENCED_JSON_RE.captures(answer) {
        return Some(caps[1].to_string());
    }

    // Bare object: widest brace span, so prose before/after is ignored.
    let start = answer.find('{')?;
    let end = answer.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(answer[start..=end].to_string())
}

// ---------------------------------------------------------------------------
// Heuristic fallback
// ---------------------------------------------------------------------------

/// Reduce a free-text summary to usable facts: first line as the name, the
/// collapsed text as the description, no topics.
pub fn fallback_facts(summary: &str) -> BoardFacts {
    let name = summary
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("Untitled board");

    let description: String = summary.split_whitespace().collect::<Vec<_>>().join(" ");

    BoardFacts {
        name: truncate(name, NAME_LIMIT),
        description: truncate(&description, DESCRIPTION_LIMIT),
        topics: Vec::new(),
    }
}

/// Truncate on a character boundary, appending an ellipsis when shortened.
fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(limit.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_json() {
        let answer = "Sure! Here you go:\n```json\n{\"name\": \"Rust Docs\", \"description\": \"Language documentation.\", \"topics\": [\"rust\", \"docs\"]}\n```\nAnything else?";
        let facts = parse_structured(answer).expect("should parse");
        assert_eq!(facts.name, "Rust Docs");
        assert_eq!(facts.topics, vec!["rust", "docs"]);
    }

    #[test]
    fn parses_bare_json_with_surrounding_prose() {
        let answer = "Here is the summary you asked for: {\"name\": \"Gardening\", \"description\": \"Plants and soil.\"} Hope that helps!";
        let facts = parse_structured(answer).expect("should parse");
        assert_eq!(facts.name, "Gardening");
        assert!(facts.topics.is_empty());
    }

    #[test]
    fn rejects_malformed_or_empty_fields() {
        assert!(parse_structured("no json here at all").is_none());
        assert!(parse_structured("{\"name\": \"\", \"description\": \"x\"}").is_none());
        assert!(parse_structured("{\"name\": \"x\"}").is_none());
        assert!(parse_structured("{ not json }").is_none());
    }

    #[test]
    fn topics_are_trimmed_and_non_empty() {
        let answer = "{\"name\": \"A\", \"description\": \"B\", \"topics\": [\" x \", \"\", \"y\"]}";
        let facts = parse_structured(answer).unwrap();
        assert_eq!(facts.topics, vec!["x", "y"]);
    }

    #[test]
    fn fallback_uses_first_line_and_collapses_whitespace() {
        let summary = "\n  This board collects Rust notes.  \nIt covers async,\nownership, and tooling.";
        let facts = fallback_facts(summary);
        assert_eq!(facts.name, "This board collects Rust notes.");
        assert_eq!(
            facts.description,
            "This board collects Rust notes. It covers async, ownership, and tooling."
        );
        assert!(facts.topics.is_empty());
    }

    #[test]
    fn fallback_truncates_on_char_boundaries() {
        let long_line = "é".repeat(100);
        let facts = fallback_facts(&long_line);
        assert_eq!(facts.name.chars().count(), 60);
        assert!(facts.name.ends_with('…'));
    }

    #[test]
    fn fallback_on_empty_summary_still_yields_a_name() {
        let facts = fallback_facts("");
        assert_eq!(facts.name, "Untitled board");
    }
}
