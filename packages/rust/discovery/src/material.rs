//! Material-add flow: ask the board to ingest a URL and classify the reply.

use tracing::{info, instrument};
use url::Url;

use youmind_browser::SessionFactory;
use youmind_query::{EngineConfig, QueryRequest, QueryResult, execute};
use youmind_shared::{AuthArtifact, Result, YoumindError};

use crate::pipeline::DiscoveryOptions;

/// Marker words that count the reply as a completed ingestion.
const SUCCESS_MARKERS: &[&str] = &["added", "saved", "imported", "done", "complete", "success"];

/// Outcome of one material-add transaction.
///
/// A reply without a success marker is *ambiguous*, not failed — the board
/// may well have ingested the URL and answered in prose. Whether to re-ask
/// for confirmation is caller policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterialOutcome {
    /// The reply carried a success marker.
    Added { answer: String },
    /// The reply carried no marker; ingestion state is unknown.
    Ambiguous { answer: String },
}

/// Ask the board to add `material_url` and classify the reply.
#[instrument(skip_all, fields(board = %board_url, material = %material_url))]
pub async fn add_material(
    factory: &dyn SessionFactory,
    artifact: Option<&AuthArtifact>,
    board_url: &Url,
    material_url: &Url,
    opts: &DiscoveryOptions,
    engine: &EngineConfig,
) -> Result<MaterialOutcome> {
    let prompt = format!(
        "Add this material to the board: {material_url} . \
         Once it has been added, reply with exactly one word: added."
    );

    let mut request = QueryRequest::new(prompt, board_url.clone());
    request.options.visible = opts.visible;
    request.options.timeout = opts.timeout;

    let outcome = execute(factory, artifact, &request, engine).await?;
    let answer = match outcome.result {
        QueryResult::Answered { text } => text,
        QueryResult::TimedOut => {
            return Err(YoumindError::query(
                "material-add timed out — the board may still be ingesting",
            ));
        }
        QueryResult::Failed { reason } => return Err(YoumindError::query(reason.to_string())),
    };

    let classified = classify(&answer);
    info!(
        added = matches!(classified, MaterialOutcome::Added { .. }),
        "material-add completed"
    );
    Ok(classified)
}

fn classify(answer: &str) -> MaterialOutcome {
    let lowered = answer.to_lowercase();
    if SUCCESS_MARKERS.iter().any(|m| lowered.contains(m)) {
        MaterialOutcome::Added {
            answer: answer.to_string(),
        }
    } else {
        MaterialOutcome::Ambiguous {
            answer: answer.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedFactory;
    use youmind_shared::AppConfig;

    fn board_url() -> Url {
        Url::parse("https://youmind.com/boards/abc").unwrap()
    }

    fn material_url() -> Url {
        Url::parse("https://example.com/articles/sourdough").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn marker_in_reply_classifies_as_added() {
        let factory = ScriptedFactory::new(vec!["Added.".into()]);

        let outcome = add_material(
            &factory,
            Some(&ScriptedFactory::artifact()),
            &board_url(),
            &material_url(),
            &DiscoveryOptions::default(),
            &EngineConfig::from_app(&AppConfig::default()),
        )
        .await
        .unwrap();

        assert!(matches!(outcome, MaterialOutcome::Added { .. }));

        // The prompt embedded the material URL.
        let questions = factory.questions();
        assert!(questions[0].contains("example.com/articles/sourdough"));
    }

    #[tokio::test(start_paused = true)]
    async fn markerless_reply_is_ambiguous_not_failed() {
        let factory = ScriptedFactory::new(vec![
            "I'm looking at that link — it talks about bread baking techniques.".into(),
        ]);

        let outcome = add_material(
            &factory,
            Some(&ScriptedFactory::artifact()),
            &board_url(),
            &material_url(),
            &DiscoveryOptions::default(),
            &EngineConfig::from_app(&AppConfig::default()),
        )
        .await
        .unwrap();

        match outcome {
            MaterialOutcome::Ambiguous { answer } => assert!(answer.contains("bread")),
            other => panic!("expected ambiguous, got {other:?}"),
        }
    }

    #[test]
    fn classification_is_case_insensitive() {
        assert!(matches!(
            classify("DONE — the material is on the board."),
            MaterialOutcome::Added { .. }
        ));
        assert!(matches!(
            classify("Let me think about that."),
            MaterialOutcome::Ambiguous { .. }
        ));
    }
}
