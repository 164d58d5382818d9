//! Query execution engine: one question-answer transaction against a board's
//! chat surface.
//!
//! Every invocation opens a fresh session, runs the Navigate → Submit →
//! AwaitCompletion → Extract protocol, and closes the session exactly once on
//! every path. The engine never retries — retry and backoff policy belong to
//! its callers.

mod engine;
mod request;

pub use engine::{EngineConfig, execute};
pub use request::{FailureReason, QueryOptions, QueryOutcome, QueryRequest, QueryResult};
