//! Metadata discovery by querying a board about itself.
//!
//! Single-pass asks for structured output directly; two-pass first asks for
//! a free-text summary, then runs an independent structured-extraction
//! transaction seeded with that summary. Both converge on a usable
//! [`DiscoveryReport`] even under malformed output.

use std::time::Duration;

use tracing::{debug, info, instrument};
use url::Url;

use youmind_browser::SessionFactory;
use youmind_query::{EngineConfig, QueryRequest, QueryResult, execute};
use youmind_shared::{AuthArtifact, Result, YoumindError};

use crate::parse::{BoardFacts, parse_structured};

/// Free-text summarization prompt (pass 1 of two-pass).
const SUMMARY_PROMPT: &str = "Summarize what this board is about in a few sentences. \
     Mention the main topics and kinds of material it contains.";

/// Structured-extraction preamble; the JSON contract the parser expects.
const STRUCTURED_PROMPT: &str = "Reply with a single JSON object and nothing else, shaped as \
     {\"name\": \"...\", \"description\": \"...\", \"topics\": [\"...\"]}. \
     name: a short title for this board, at most six words. \
     description: one or two sentences describing what the board covers. \
     topics: three to eight short topic keywords.";

// ---------------------------------------------------------------------------
// Options / report
// ---------------------------------------------------------------------------

/// How many transactions discovery spends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMode {
    /// One structured transaction; cheapest, lower field quality.
    SinglePass,
    /// Summary transaction first, then structured extraction seeded with it.
    TwoPass,
}

impl DiscoveryMode {
    /// Map a configured pass count onto a mode; anything above one means two.
    pub fn from_passes(passes: u8) -> Self {
        if passes <= 1 {
            DiscoveryMode::SinglePass
        } else {
            DiscoveryMode::TwoPass
        }
    }
}

/// Knobs forwarded to the underlying transactions.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    pub visible: bool,
    pub timeout: Option<Duration>,
}

/// What discovery learned about a board. Derived, never persisted directly —
/// it feeds the construction of a library record.
#[derive(Debug, Clone)]
pub struct DiscoveryReport {
    /// The board's own account of itself.
    pub summary_text: String,
    /// Strictly parsed facts, when the board produced them.
    pub structured: Option<BoardFacts>,
    /// How many transactions were spent.
    pub passes_used: u8,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Infer a board's metadata from its own chat answers.
///
/// Transaction failures (timeout, UI faults) surface as errors; *parse*
/// failures never do — the report degrades to free text instead.
#[instrument(skip_all, fields(board = %board_url, mode = ?mode))]
pub async fn discover(
    factory: &dyn SessionFactory,
    artifact: Option<&AuthArtifact>,
    board_url: &Url,
    mode: DiscoveryMode,
    opts: &DiscoveryOptions,
    engine: &EngineConfig,
) -> Result<DiscoveryReport> {
    match mode {
        DiscoveryMode::SinglePass => {
            let answer = ask(factory, artifact, board_url, STRUCTURED_PROMPT, opts, engine).await?;
            let structured = parse_structured(&answer);
            if structured.is_none() {
                debug!("structured parse failed; falling back to free text");
            }

            info!(structured = structured.is_some(), "discovery completed");
            Ok(DiscoveryReport {
                summary_text: answer,
                structured,
                passes_used: 1,
            })
        }
        DiscoveryMode::TwoPass => {
            let summary =
                ask(factory, artifact, board_url, SUMMARY_PROMPT, opts, engine).await?;

            // Independent second transaction, seeded with the summary to
            // lift structured-field quality.
            let prompt = format!(
                "Here is a summary of this board:\n\n{summary}\n\n{STRUCTURED_PROMPT}"
            );
            let answer = ask(factory, artifact, board_url, &prompt, opts, engine).await?;

            let structured = parse_structured(&answer);
            if structured.is_none() {
                debug!("structured pass unparseable; keeping pass-1 summary only");
            }

            info!(structured = structured.is_some(), "discovery completed");
            Ok(DiscoveryReport {
                summary_text: summary,
                structured,
                passes_used: 2,
            })
        }
    }
}

/// Run one transaction and demand an answer.
async fn ask(
    factory: &dyn SessionFactory,
    artifact: Option<&AuthArtifact>,
    board_url: &Url,
    prompt: &str,
    opts: &DiscoveryOptions,
    engine: &EngineConfig,
) -> Result<String> {
    let mut request = QueryRequest::new(prompt, board_url.clone());
    request.options.visible = opts.visible;
    request.options.timeout = opts.timeout;

    let outcome = execute(factory, artifact, &request, engine).await?;
    match outcome.result {
        QueryResult::Answered { text } => Ok(text),
        QueryResult::TimedOut => Err(YoumindError::query(
            "discovery query timed out — retry with a longer timeout",
        )),
        QueryResult::Failed { reason } => Err(YoumindError::query(reason.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedFactory;

    fn board_url() -> Url {
        Url::parse("https://youmind.com/boards/abc").unwrap()
    }

    fn engine() -> EngineConfig {
        EngineConfig::from_app(&youmind_shared::AppConfig::default())
    }

    const GOOD_JSON: &str = "{\"name\": \"Rust Docs\", \"description\": \"Language documentation board.\", \"topics\": [\"rust\", \"docs\"]}";

    #[tokio::test(start_paused = true)]
    async fn single_pass_parses_structured_answer() {
        let factory = ScriptedFactory::new(vec![GOOD_JSON.into()]);

        let report = discover(
            &factory,
            Some(&ScriptedFactory::artifact()),
            &board_url(),
            DiscoveryMode::SinglePass,
            &DiscoveryOptions::default(),
            &engine(),
        )
        .await
        .unwrap();

        assert_eq!(report.passes_used, 1);
        let facts = report.structured.expect("structured facts");
        assert_eq!(facts.name, "Rust Docs");
        assert_eq!(factory.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn single_pass_degrades_to_free_text() {
        let factory =
            ScriptedFactory::new(vec!["This board is mostly about gardening.".into()]);

        let report = discover(
            &factory,
            Some(&ScriptedFactory::artifact()),
            &board_url(),
            DiscoveryMode::SinglePass,
            &DiscoveryOptions::default(),
            &engine(),
        )
        .await
        .unwrap();

        assert!(report.structured.is_none());
        assert_eq!(report.summary_text, "This board is mostly about gardening.");
    }

    #[tokio::test(start_paused = true)]
    async fn two_pass_seeds_structured_prompt_with_summary() {
        let factory = ScriptedFactory::new(vec![
            "A board about sourdough baking.".into(),
            GOOD_JSON.into(),
        ]);

        let report = discover(
            &factory,
            Some(&ScriptedFactory::artifact()),
            &board_url(),
            DiscoveryMode::TwoPass,
            &DiscoveryOptions::default(),
            &engine(),
        )
        .await
        .unwrap();

        assert_eq!(report.passes_used, 2);
        assert_eq!(report.summary_text, "A board about sourdough baking.");
        assert!(report.structured.is_some());

        // Each pass was its own session, and pass 2 embedded the summary.
        assert_eq!(factory.opens(), 2);
        let questions = factory.questions();
        assert!(questions[1].contains("sourdough"));
        assert!(questions[1].contains("single JSON object"));
    }

    #[tokio::test(start_paused = true)]
    async fn two_pass_keeps_summary_when_structured_pass_is_malformed() {
        let factory = ScriptedFactory::new(vec![
            "A board about sourdough baking.".into(),
            "Sorry, I can't produce JSON right now.".into(),
        ]);

        let report = discover(
            &factory,
            Some(&ScriptedFactory::artifact()),
            &board_url(),
            DiscoveryMode::TwoPass,
            &DiscoveryOptions::default(),
            &engine(),
        )
        .await
        .unwrap();

        // Degrades, never raises: summary survives, structured is none.
        assert!(!report.summary_text.is_empty());
        assert_eq!(report.summary_text, "A board about sourdough baking.");
        assert!(report.structured.is_none());
        assert_eq!(report.passes_used, 2);
    }

    #[test]
    fn mode_from_pass_count() {
        assert_eq!(DiscoveryMode::from_passes(1), DiscoveryMode::SinglePass);
        assert_eq!(DiscoveryMode::from_passes(2), DiscoveryMode::TwoPass);
        assert_eq!(DiscoveryMode::from_passes(0), DiscoveryMode::SinglePass);
    }
}
