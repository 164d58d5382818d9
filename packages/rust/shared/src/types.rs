//! Core domain types for the YouMind client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// Current schema version for the persisted library format.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// BoardId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for board identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoardId(pub Uuid);

impl BoardId {
    /// Generate a new time-sortable board identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for BoardId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BoardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for BoardId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// BoardRecord / Library
// ---------------------------------------------------------------------------

/// One board known to the local library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardRecord {
    /// Unique identifier for this board.
    pub id: BoardId,
    /// The board's chat URL.
    pub url: String,
    /// Human-readable name.
    pub name: String,
    /// Short description of what the board covers.
    pub description: String,
    /// Topic keywords, in the order they were discovered.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<String>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the board was last targeted by a query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

/// The `library.json` root structure.
///
/// `active_id` is the library's default query target; at most one record is
/// active at any time, and only `activate`/`remove` move the pointer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    /// Schema version for forward compatibility.
    pub schema_version: u32,
    /// All boards, in insertion order.
    #[serde(default)]
    pub boards: Vec<BoardRecord>,
    /// The active board, if one is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_id: Option<BoardId>,
}

impl Default for Library {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            boards: Vec::new(),
            active_id: None,
        }
    }
}

// ---------------------------------------------------------------------------
// BoardTarget
// ---------------------------------------------------------------------------

/// How a caller refers to the board a query should run against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardTarget {
    /// A library record, by id.
    Id(BoardId),
    /// An explicit board URL, bypassing the library.
    Url(Url),
    /// The library's active board.
    Active,
}

// ---------------------------------------------------------------------------
// Auth artifact
// ---------------------------------------------------------------------------

/// Freshness state of the persisted auth artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthStatus {
    /// No artifact on disk.
    Absent,
    /// An artifact exists but no probe has confirmed it recently.
    PresentUnvalidated,
    /// A probe within the freshness bound confirmed the artifact works.
    PresentValid,
}

impl std::fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuthStatus::Absent => "absent",
            AuthStatus::PresentUnvalidated => "present-unvalidated",
            AuthStatus::PresentValid => "present-valid",
        };
        write!(f, "{s}")
    }
}

/// One browser cookie in the persisted session state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    /// Unix expiry timestamp; session cookies omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
}

fn default_cookie_path() -> String {
    "/".into()
}

/// The persisted authenticated-session state (`state.json`).
///
/// Cookies carry the authentication; `origins` preserves any exported origin
/// storage verbatim so older or richer snapshots survive a round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthArtifact {
    /// Session cookies captured at login.
    #[serde(default)]
    pub cookies: Vec<Cookie>,
    /// Opaque per-origin storage snapshot, kept as-is.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub origins: serde_json::Value,
    /// When the artifact was captured.
    pub captured_at: DateTime<Utc>,
    /// When a probe last confirmed the artifact, if ever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_validated_at: Option<DateTime<Utc>>,
}

impl AuthArtifact {
    /// Build a fresh artifact from captured cookies.
    pub fn new(cookies: Vec<Cookie>) -> Self {
        Self {
            cookies,
            origins: serde_json::Value::Null,
            captured_at: Utc::now(),
            last_validated_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_id_roundtrip() {
        let id = BoardId::new();
        let s = id.to_string();
        let parsed: BoardId = s.parse().expect("parse BoardId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn library_serialization() {
        let lib = Library {
            schema_version: CURRENT_SCHEMA_VERSION,
            boards: vec![BoardRecord {
                id: BoardId::new(),
                url: "https://youmind.com/boards/abc".into(),
                name: "Docs".into(),
                description: "Documentation board".into(),
                topics: vec!["rust".into(), "tooling".into()],
                created_at: Utc::now(),
                last_used_at: None,
            }],
            active_id: None,
        };

        let json = serde_json::to_string_pretty(&lib).expect("serialize");
        let parsed: Library = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(parsed.boards.len(), 1);
        assert_eq!(parsed.boards[0].topics.len(), 2);
    }

    #[test]
    fn library_load_tolerates_missing_optional_fields() {
        // lastUsedAt, topics, and active_id may be absent in older files.
        let json = r#"{
            "schema_version": 1,
            "boards": [{
                "id": "0193c5c0-0000-7000-8000-000000000000",
                "url": "https://youmind.com/boards/abc",
                "name": "Docs",
                "description": "desc",
                "created_at": "2026-01-01T00:00:00Z"
            }]
        }"#;
        let parsed: Library = serde_json::from_str(json).expect("deserialize");
        assert!(parsed.boards[0].topics.is_empty());
        assert!(parsed.boards[0].last_used_at.is_none());
        assert!(parsed.active_id.is_none());
    }

    #[test]
    fn artifact_tolerates_minimal_state() {
        let json = r#"{ "captured_at": "2026-01-01T00:00:00Z" }"#;
        let parsed: AuthArtifact = serde_json::from_str(json).expect("deserialize");
        assert!(parsed.cookies.is_empty());
        assert!(parsed.origins.is_null());
        assert!(parsed.last_validated_at.is_none());
    }
}
