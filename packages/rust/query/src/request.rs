//! Request and outcome types for a single query transaction.

use std::time::Duration;

use url::Url;

/// One question to run against a board. Immutable once issued.
///
/// The board reference is resolved to a concrete URL before a request is
/// constructed (explicit URL, library id, or the active pointer — see the
/// library crate's `resolve_target`).
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// The question, submitted verbatim.
    pub question: String,
    /// The board's chat surface.
    pub board_url: Url,
    /// Per-request knobs.
    pub options: QueryOptions,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>, board_url: Url) -> Self {
        Self {
            question: question.into(),
            board_url,
            options: QueryOptions::default(),
        }
    }
}

/// Per-request execution options.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Show the browser window (debugging).
    pub visible: bool,
    /// Per-request deadline override for known-slow boards; the engine
    /// default applies when unset.
    pub timeout: Option<Duration>,
    /// Keep a material focus embedded in the board URL instead of stripping
    /// it for a context-free question.
    pub keep_material_context: bool,
}

/// Tagged outcome of one transaction. Exactly one variant holds per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResult {
    /// The board answered; `text` is the newly rendered response.
    Answered { text: String },
    /// No terminal signal appeared before the deadline. An expected outcome,
    /// not an error — callers may re-ask with a longer timeout.
    TimedOut,
    /// A UI-layer fault ended the transaction.
    Failed { reason: FailureReason },
}

/// Which protocol step failed, with detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The chat surface did not load (or bounced to sign-in).
    Navigation(String),
    /// No chat input appeared within the bounded wait.
    InputNotFound(String),
    /// The rendered answer was empty or unreadable.
    Extraction(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Navigation(detail) => write!(f, "navigation failed: {detail}"),
            FailureReason::InputNotFound(detail) => write!(f, "chat input not found: {detail}"),
            FailureReason::Extraction(detail) => write!(f, "answer extraction failed: {detail}"),
        }
    }
}

/// A completed transaction: the result plus how long it took.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub result: QueryResult,
    pub elapsed: Duration,
}
