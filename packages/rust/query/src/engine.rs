//! The transaction state machine.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::time::Instant as TokioInstant;
use tracing::{debug, info, instrument, warn};
use url::Url;

use youmind_browser::{BrowserSession, SessionFactory, SessionGuard};
use youmind_shared::{AppConfig, AuthArtifact, Result, SelectorsConfig};

use crate::request::{FailureReason, QueryOutcome, QueryRequest, QueryResult};

/// Delay between pressing Enter and the send-button fallback; some editors
/// insert a newline on Enter instead of submitting.
const SUBMIT_SETTLE: Duration = Duration::from_millis(600);

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Engine tuning, derived from the application config.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Chat surface selectors.
    pub selectors: SelectorsConfig,
    /// Sign-in page path, for detecting an expired session mid-transaction.
    pub sign_in_path: String,
    /// Deadline when the request carries no override.
    pub default_timeout: Duration,
    /// Bounded wait for the chat input to appear.
    pub input_wait: Duration,
    /// Completion poll cadence.
    pub poll_interval: Duration,
    /// Consecutive identical polls before an answer counts as final.
    pub stability_polls: u32,
}

impl EngineConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            selectors: config.selectors.clone(),
            sign_in_path: config.service.sign_in_path.clone(),
            default_timeout: config.timeouts.query_timeout(),
            input_wait: config.timeouts.input_wait(),
            poll_interval: config.timeouts.poll_interval(),
            stability_polls: config.timeouts.stability_polls,
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Run exactly one question-answer transaction.
///
/// Opens one isolated session from `factory`, drives the protocol, and closes
/// the session exactly once whatever the outcome. UI-layer faults and the
/// deadline come back as [`QueryResult`] variants; only pre-session failures
/// (no auth artifact, context creation) surface as `Err`.
#[instrument(skip_all, fields(board = %request.board_url))]
pub async fn execute(
    factory: &dyn SessionFactory,
    artifact: Option<&AuthArtifact>,
    request: &QueryRequest,
    config: &EngineConfig,
) -> Result<QueryOutcome> {
    let started = Instant::now();

    info!(question = %request.question, "starting query transaction");

    let session = factory.open(artifact, request.options.visible).await?;
    let mut guard = SessionGuard::new(session);

    let result = run_transaction(guard.session(), request, config).await;

    // Close unconditionally; a close failure must not mask the outcome.
    if let Err(e) = guard.dispose().await {
        warn!(error = %e, "failed to close session");
    }

    let elapsed = started.elapsed();
    match &result {
        QueryResult::Answered { text } => {
            info!(chars = text.len(), elapsed_ms = elapsed.as_millis(), "answered")
        }
        QueryResult::TimedOut => info!(elapsed_ms = elapsed.as_millis(), "timed out"),
        QueryResult::Failed { reason } => {
            info!(%reason, elapsed_ms = elapsed.as_millis(), "failed")
        }
    }

    Ok(QueryOutcome { result, elapsed })
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

async fn run_transaction(
    session: &mut dyn BrowserSession,
    request: &QueryRequest,
    config: &EngineConfig,
) -> QueryResult {
    // --- Navigate ---
    let target = navigation_url(&request.board_url, request.options.keep_material_context);
    if let Err(e) = session.navigate(&target).await {
        return fail(FailureReason::Navigation(e.to_string()));
    }

    match session.current_url().await {
        Ok(landed) => {
            if off_board(&landed, &request.board_url, &config.sign_in_path) {
                return fail(FailureReason::Navigation(format!(
                    "redirected to {landed}; session may be expired"
                )));
            }
        }
        Err(e) => return fail(FailureReason::Navigation(e.to_string())),
    }

    // --- Snapshot: only output that appears after submit counts ---
    let snapshot = ResponseSnapshot::capture(session, &config.selectors.response).await;

    // --- Submit ---
    let input_selector = match session
        .wait_for_visible(&config.selectors.query_input, config.input_wait)
        .await
    {
        Ok(Some(selector)) => selector,
        Ok(None) => {
            return fail(FailureReason::InputNotFound(
                "no chat input matched any selector".into(),
            ));
        }
        Err(e) => return fail(FailureReason::InputNotFound(e.to_string())),
    };
    debug!(selector = %input_selector, "found chat input");

    if let Err(e) = session.type_text(&input_selector, &request.question).await {
        return fail(FailureReason::InputNotFound(e.to_string()));
    }
    if let Err(e) = session.press_enter().await {
        return fail(FailureReason::InputNotFound(e.to_string()));
    }

    tokio::time::sleep(SUBMIT_SETTLE).await;
    for selector in &config.selectors.send_button {
        match session.click(selector).await {
            Ok(true) => break,
            _ => continue,
        }
    }

    // --- AwaitCompletion + Extract ---
    let timeout = request.options.timeout.unwrap_or(config.default_timeout);
    await_completion(session, config, &snapshot, timeout).await
}

fn fail(reason: FailureReason) -> QueryResult {
    QueryResult::Failed { reason }
}

/// Poll for a terminal answer until `timeout`.
///
/// A candidate is a response whose occurrence count grew since the snapshot
/// (or a trailing response that changed in place). It must hold steady across
/// `stability_polls` consecutive polls before it counts as final — streamed
/// answers keep mutating until generation finishes.
async fn await_completion(
    session: &mut dyn BrowserSession,
    config: &EngineConfig,
    snapshot: &ResponseSnapshot,
    timeout: Duration,
) -> QueryResult {
    let deadline = TokioInstant::now() + timeout;
    let mut last_candidate: Option<String> = None;
    let mut stable_polls: u32 = 0;

    loop {
        let responses = collect_responses(session, &config.selectors.response).await;

        if let Some(candidate) = snapshot.new_response(&responses) {
            if last_candidate.as_deref() == Some(candidate) {
                stable_polls += 1;
                if stable_polls >= config.stability_polls {
                    let text = candidate.trim();
                    if text.is_empty() {
                        return fail(FailureReason::Extraction(
                            "rendered answer was empty".into(),
                        ));
                    }
                    return QueryResult::Answered {
                        text: text.to_string(),
                    };
                }
            } else {
                last_candidate = Some(candidate.to_string());
                stable_polls = 1;
            }
        }

        for selector in &config.selectors.thinking {
            if session.is_any_visible(selector).await.unwrap_or(false) {
                debug!("board still generating");
                break;
            }
        }

        if TokioInstant::now() >= deadline {
            return QueryResult::TimedOut;
        }
        tokio::time::sleep(config.poll_interval).await;
    }
}

// ---------------------------------------------------------------------------
// Response collection
// ---------------------------------------------------------------------------

/// Response texts from the first selector that yields any, in DOM order.
/// Selector errors are treated as a miss — the DOM churns while the board
/// renders, and the next poll retries.
async fn collect_responses(
    session: &mut dyn BrowserSession,
    selectors: &[String],
) -> Vec<String> {
    for selector in selectors {
        match session.collect_texts(selector).await {
            Ok(texts) if !texts.is_empty() => return texts,
            Ok(_) => continue,
            Err(e) => {
                debug!(selector = %selector, error = %e, "response selector failed");
                continue;
            }
        }
    }
    Vec::new()
}

/// Pre-submit view of the chat transcript.
struct ResponseSnapshot {
    texts: Vec<String>,
    counts: HashMap<String, usize>,
}

impl ResponseSnapshot {
    async fn capture(session: &mut dyn BrowserSession, selectors: &[String]) -> Self {
        let texts = collect_responses(session, selectors).await;
        let mut counts: HashMap<String, usize> = HashMap::new();
        for text in &texts {
            *counts.entry(text.clone()).or_default() += 1;
        }
        Self { texts, counts }
    }

    /// The response that is new relative to the snapshot, if any.
    fn new_response<'a>(&self, current: &'a [String]) -> Option<&'a str> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for text in current {
            *counts.entry(text.as_str()).or_default() += 1;
        }

        // A text whose occurrence grew is new output (repeated answers to
        // identical questions are common, so equality alone is not enough).
        for text in current.iter().rev() {
            if counts[text.as_str()] > self.counts.get(text.as_str()).copied().unwrap_or(0) {
                return Some(text);
            }
        }

        // Fallback: the trailing response was updated in place.
        if let (Some(last), Some(previous_last)) = (current.last(), self.texts.last()) {
            if last != previous_last && current != &self.texts[..] {
                return Some(last);
            }
        }

        None
    }
}

// ---------------------------------------------------------------------------
// URL handling
// ---------------------------------------------------------------------------

/// The URL to drive for a context-free question. A stored board URL may
/// embed a material focus in its query string; unless the caller opts to
/// keep it, strip it so the whole board answers.
fn navigation_url(board_url: &Url, keep_material_context: bool) -> Url {
    if keep_material_context {
        return board_url.clone();
    }
    let mut url = board_url.clone();
    url.set_query(None);
    url.set_fragment(None);
    url
}

/// Off the board we asked for: bounced to another host or the sign-in page.
fn off_board(landed: &Url, board_url: &Url, sign_in_path: &str) -> bool {
    landed.host_str() != board_url.host_str() || landed.path().starts_with(sign_in_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use youmind_shared::{Cookie, YoumindError};

    use crate::request::QueryOptions;

    fn board_url() -> Url {
        Url::parse("https://youmind.com/boards/abc").unwrap()
    }

    fn test_config() -> EngineConfig {
        let mut config = EngineConfig::from_app(&AppConfig::default());
        config.default_timeout = Duration::from_secs(5);
        config
    }

    fn artifact() -> AuthArtifact {
        AuthArtifact::new(vec![Cookie {
            name: "sid".into(),
            value: "abc".into(),
            domain: "youmind.com".into(),
            path: "/".into(),
            expires: None,
            http_only: true,
            secure: true,
        }])
    }

    // -----------------------------------------------------------------------
    // Fault-injected session double
    // -----------------------------------------------------------------------

    /// What the fake board does at each step of the transaction.
    #[derive(Clone, Default)]
    struct Script {
        /// Error out of `navigate`.
        fail_navigate: bool,
        /// URL reported after navigation; defaults to the board URL.
        landed_url: Option<Url>,
        /// No input ever becomes visible.
        hide_input: bool,
        /// Transcript returned before submit.
        existing: Vec<String>,
        /// Transcript returned on each completion poll, last repeated forever.
        polls: Vec<Vec<String>>,
        /// Error on every `collect_texts` call after submit.
        fail_collect: bool,
    }

    /// Counts opens and closes across every session the factory produced.
    #[derive(Default)]
    struct Counters {
        opens: AtomicUsize,
        closes: AtomicUsize,
        visible: Mutex<Option<bool>>,
    }

    struct FakeSession {
        script: Script,
        counters: Arc<Counters>,
        submitted: bool,
        poll_idx: usize,
    }

    #[async_trait]
    impl BrowserSession for FakeSession {
        async fn navigate(&mut self, _url: &Url) -> youmind_shared::Result<()> {
            if self.script.fail_navigate {
                return Err(YoumindError::webdriver("net::ERR_CONNECTION_REFUSED"));
            }
            Ok(())
        }

        async fn current_url(&mut self) -> youmind_shared::Result<Url> {
            Ok(self.script.landed_url.clone().unwrap_or_else(board_url))
        }

        async fn wait_for_visible(
            &mut self,
            selectors: &[String],
            _wait: Duration,
        ) -> youmind_shared::Result<Option<String>> {
            if self.script.hide_input {
                return Ok(None);
            }
            Ok(selectors.first().cloned())
        }

        async fn click(&mut self, _selector: &str) -> youmind_shared::Result<bool> {
            Ok(false)
        }

        async fn type_text(&mut self, _selector: &str, _text: &str) -> youmind_shared::Result<()> {
            Ok(())
        }

        async fn press_enter(&mut self) -> youmind_shared::Result<()> {
            self.submitted = true;
            Ok(())
        }

        async fn collect_texts(&mut self, _selector: &str) -> youmind_shared::Result<Vec<String>> {
            if !self.submitted {
                return Ok(self.script.existing.clone());
            }
            if self.script.fail_collect {
                return Err(YoumindError::webdriver("stale element reference"));
            }
            if self.script.polls.is_empty() {
                return Ok(self.script.existing.clone());
            }
            let idx = self.poll_idx.min(self.script.polls.len() - 1);
            self.poll_idx += 1;
            Ok(self.script.polls[idx].clone())
        }

        async fn is_any_visible(&mut self, _selector: &str) -> youmind_shared::Result<bool> {
            Ok(false)
        }

        async fn export_cookies(&mut self) -> youmind_shared::Result<Vec<Cookie>> {
            Ok(Vec::new())
        }

        async fn close(&mut self) -> youmind_shared::Result<()> {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeFactory {
        script: Script,
        counters: Arc<Counters>,
    }

    impl FakeFactory {
        fn new(script: Script) -> (Self, Arc<Counters>) {
            let counters = Arc::new(Counters::default());
            (
                Self {
                    script,
                    counters: counters.clone(),
                },
                counters,
            )
        }
    }

    #[async_trait]
    impl SessionFactory for FakeFactory {
        async fn open(
            &self,
            artifact: Option<&AuthArtifact>,
            visible: bool,
        ) -> youmind_shared::Result<Box<dyn BrowserSession>> {
            youmind_browser::require_artifact(artifact)?;
            self.counters.opens.fetch_add(1, Ordering::SeqCst);
            *self.counters.visible.lock().unwrap() = Some(visible);
            Ok(Box::new(FakeSession {
                script: self.script.clone(),
                counters: self.counters.clone(),
                submitted: false,
                poll_idx: 0,
            }))
        }

        async fn open_blank(
            &self,
            _visible: bool,
        ) -> youmind_shared::Result<Box<dyn BrowserSession>> {
            unreachable!("engine never opens blank sessions")
        }
    }

    async fn run(script: Script, options: QueryOptions) -> (QueryResult, Arc<Counters>) {
        let (factory, counters) = FakeFactory::new(script);
        let mut request = QueryRequest::new("What is this board about?", board_url());
        request.options = options;

        let outcome = execute(&factory, Some(&artifact()), &request, &test_config())
            .await
            .unwrap();
        (outcome.result, counters)
    }

    // -----------------------------------------------------------------------
    // Outcome branches — each must close the session exactly once
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn answered_when_a_new_response_stabilizes() {
        let script = Script {
            existing: vec!["old answer".into()],
            polls: vec![
                vec!["old answer".into()],
                vec!["old answer".into(), "typing…".into()],
                vec!["old answer".into(), "the new answer".into()],
            ],
            ..Script::default()
        };

        let (result, counters) = run(script, QueryOptions::default()).await;

        assert_eq!(
            result,
            QueryResult::Answered {
                text: "the new answer".into()
            }
        );
        assert_eq!(counters.opens.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_answer_detected_by_occurrence_count() {
        // The board gives the same literal answer twice; only the count
        // change reveals the second one is new.
        let script = Script {
            existing: vec!["42".into()],
            polls: vec![vec!["42".into(), "42".into()]],
            ..Script::default()
        };

        let (result, _) = run(script, QueryOptions::default()).await;
        assert_eq!(result, QueryResult::Answered { text: "42".into() });
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_no_terminal_signal_appears() {
        let script = Script {
            existing: vec!["old answer".into()],
            polls: vec![vec!["old answer".into()]],
            ..Script::default()
        };

        let options = QueryOptions {
            timeout: Some(Duration::from_secs(1)),
            ..QueryOptions::default()
        };
        let (result, counters) = run(script, options).await;

        // A distinguishable outcome, not a Failed.
        assert_eq!(result, QueryResult::TimedOut);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_error_closes_session() {
        let script = Script {
            fail_navigate: true,
            ..Script::default()
        };

        let (result, counters) = run(script, QueryOptions::default()).await;

        assert!(matches!(
            result,
            QueryResult::Failed {
                reason: FailureReason::Navigation(_)
            }
        ));
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sign_in_redirect_is_a_navigation_failure() {
        let script = Script {
            landed_url: Some(Url::parse("https://youmind.com/sign-in").unwrap()),
            ..Script::default()
        };

        let (result, counters) = run(script, QueryOptions::default()).await;

        match result {
            QueryResult::Failed {
                reason: FailureReason::Navigation(detail),
            } => assert!(detail.contains("sign-in")),
            other => panic!("expected navigation failure, got {other:?}"),
        }
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_input_closes_session() {
        let script = Script {
            hide_input: true,
            ..Script::default()
        };

        let (result, counters) = run(script, QueryOptions::default()).await;

        assert!(matches!(
            result,
            QueryResult::Failed {
                reason: FailureReason::InputNotFound(_)
            }
        ));
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn collect_faults_degrade_to_timeout_not_panic() {
        let script = Script {
            fail_collect: true,
            ..Script::default()
        };

        let options = QueryOptions {
            timeout: Some(Duration::from_secs(1)),
            ..QueryOptions::default()
        };
        let (result, counters) = run(script, options).await;

        assert_eq!(result, QueryResult::TimedOut);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_stable_answer_is_an_extraction_failure() {
        let script = Script {
            existing: vec![],
            polls: vec![vec!["   ".into()]],
            ..Script::default()
        };

        let (result, counters) = run(script, QueryOptions::default()).await;

        assert!(matches!(
            result,
            QueryResult::Failed {
                reason: FailureReason::Extraction(_)
            }
        ));
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_artifact_fails_before_any_open() {
        let (factory, counters) = FakeFactory::new(Script::default());
        let request = QueryRequest::new("anything", board_url());

        let err = execute(&factory, None, &request, &test_config())
            .await
            .unwrap_err();

        assert!(matches!(err, YoumindError::Unauthenticated));
        assert_eq!(counters.opens.load(Ordering::SeqCst), 0);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn visible_flag_reaches_the_factory() {
        let script = Script {
            polls: vec![vec!["answer".into()]],
            ..Script::default()
        };
        let (factory, counters) = FakeFactory::new(script);
        let mut request = QueryRequest::new("q", board_url());
        request.options.visible = true;

        execute(&factory, Some(&artifact()), &request, &test_config())
            .await
            .unwrap();

        assert_eq!(*counters.visible.lock().unwrap(), Some(true));
    }

    // -----------------------------------------------------------------------
    // URL handling
    // -----------------------------------------------------------------------

    #[test]
    fn material_context_is_stripped_unless_kept() {
        let url = Url::parse("https://youmind.com/boards/abc?material=m-1#frag").unwrap();

        let stripped = navigation_url(&url, false);
        assert_eq!(stripped.as_str(), "https://youmind.com/boards/abc");

        let kept = navigation_url(&url, true);
        assert_eq!(kept.as_str(), url.as_str());
    }

    #[test]
    fn off_board_detection() {
        let board = board_url();
        let sign_in = Url::parse("https://youmind.com/sign-in?next=x").unwrap();
        let elsewhere = Url::parse("https://accounts.example.com/login").unwrap();
        let on_board = Url::parse("https://youmind.com/boards/abc").unwrap();

        assert!(off_board(&sign_in, &board, "/sign-in"));
        assert!(off_board(&elsewhere, &board, "/sign-in"));
        assert!(!off_board(&on_board, &board, "/sign-in"));
    }
}
