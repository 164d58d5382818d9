//! Browser capability boundary.
//!
//! These traits are the seam between the query/auth layers and the real
//! browser. The core never touches the wire protocol directly; it drives a
//! [`BrowserSession`] obtained from a [`SessionFactory`] and every concrete
//! automation backend (WebDriver in production, scripted fakes in tests)
//! lives behind them.

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use youmind_shared::{AuthArtifact, Cookie, Result, YoumindError};

/// One isolated, disposable browser context, used for exactly one transaction.
///
/// A session is never shared between callers and never reused for a second
/// question. Callers own its full lifecycle and must call [`close`] exactly
/// once on every path — see [`crate::SessionGuard`].
///
/// [`close`]: BrowserSession::close
#[async_trait]
pub trait BrowserSession: Send {
    /// Load a URL and wait for the document to be ready.
    async fn navigate(&mut self, url: &Url) -> Result<()>;

    /// The URL the session is currently on (after any redirects).
    async fn current_url(&mut self) -> Result<Url>;

    /// Wait up to `wait` for any of `selectors` to have a visible match.
    /// Returns the first selector that matched, in candidate order.
    async fn wait_for_visible(
        &mut self,
        selectors: &[String],
        wait: Duration,
    ) -> Result<Option<String>>;

    /// Best-effort click on the first visible match. Returns whether a click
    /// happened; a missing or unclickable element is not an error.
    async fn click(&mut self, selector: &str) -> Result<bool>;

    /// Focus the first match of `selector` and type `text` into it, paced
    /// like a human typist.
    async fn type_text(&mut self, selector: &str, text: &str) -> Result<()>;

    /// Press the Enter key in the focused element.
    async fn press_enter(&mut self) -> Result<()>;

    /// Inner text of every element matching `selector`, in DOM order.
    /// Empty and whitespace-only texts are dropped.
    async fn collect_texts(&mut self, selector: &str) -> Result<Vec<String>>;

    /// Whether any element matching `selector` is currently visible.
    async fn is_any_visible(&mut self, selector: &str) -> Result<bool>;

    /// Export the context's cookies (for persisting an auth artifact).
    async fn export_cookies(&mut self) -> Result<Vec<Cookie>>;

    /// Release all underlying browser resources. Idempotent.
    async fn close(&mut self) -> Result<()>;
}

/// Produces one fresh, isolated [`BrowserSession`] per call.
///
/// Contexts from two calls never share cookie jars, caches, or in-memory
/// state; a stale DOM or a failure in one session cannot leak into another.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Open an authenticated context seeded with the artifact's cookies.
    ///
    /// Fails with [`YoumindError::Unauthenticated`] before any browser
    /// resource is allocated when `artifact` is `None`.
    async fn open(
        &self,
        artifact: Option<&AuthArtifact>,
        visible: bool,
    ) -> Result<Box<dyn BrowserSession>>;

    /// Open a blank, unauthenticated context. Only the interactive login
    /// flow uses this.
    async fn open_blank(&self, visible: bool) -> Result<Box<dyn BrowserSession>>;
}

/// Shared `open` precondition: reject a missing artifact before touching the
/// browser backend.
pub fn require_artifact(artifact: Option<&AuthArtifact>) -> Result<&AuthArtifact> {
    artifact.ok_or(YoumindError::Unauthenticated)
}
