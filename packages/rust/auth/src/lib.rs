//! Auth state store: persists, validates, and refreshes the session artifact
//! used to open authenticated browser contexts.
//!
//! The store is the sole owner of `state.json`. Validity is established by a
//! lightweight HTTP probe of the signed-in overview page (an expired session
//! redirects to sign-in) and cached for a bounded freshness window — never
//! indefinitely.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use tracing::{debug, info, instrument, warn};
use url::Url;

use youmind_browser::{SessionFactory, SessionGuard};
use youmind_shared::{
    AppConfig, AuthArtifact, AuthStatus, Cookie, Result, YoumindError, auth_state_path,
};

/// Timeout for the validity probe request.
const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Cadence of the login-completion poll during `setup`.
const LOGIN_POLL: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// AuthStore
// ---------------------------------------------------------------------------

/// Owns the persisted auth artifact and its lifecycle operations.
pub struct AuthStore {
    state_path: PathBuf,
    sign_in_url: Url,
    overview_url: Url,
    freshness: chrono::Duration,
    client: Client,
}

impl AuthStore {
    /// Build a store over the default state path (`~/.youmind/data/state.json`).
    pub fn new(config: &AppConfig) -> Result<Self> {
        let path = auth_state_path()?;
        Self::with_state_path(config, path)
    }

    /// Build a store over an explicit state path.
    pub fn with_state_path(config: &AppConfig, state_path: PathBuf) -> Result<Self> {
        let client = Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .map_err(|e| YoumindError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            state_path,
            sign_in_url: config.service.sign_in_url()?,
            overview_url: config.service.overview_url()?,
            freshness: chrono::Duration::seconds(config.timeouts.auth_freshness_secs as i64),
            client,
        })
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Load the persisted artifact, if any. Tolerates missing optional fields.
    pub fn load(&self) -> Result<Option<AuthArtifact>> {
        if !self.state_path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.state_path)
            .map_err(|e| YoumindError::io(&self.state_path, e))?;
        let artifact: AuthArtifact = serde_json::from_str(&content).map_err(|e| {
            YoumindError::validation(format!(
                "corrupt auth state at {}: {e}",
                self.state_path.display()
            ))
        })?;
        Ok(Some(artifact))
    }

    /// Persist the artifact via write-temp-then-rename so an interrupted
    /// write never leaves a partial file.
    fn save(&self, artifact: &AuthArtifact) -> Result<()> {
        if let Some(parent) = self.state_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| YoumindError::io(parent, e))?;
        }

        let temp_path = self.state_path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(artifact)
            .map_err(|e| YoumindError::validation(format!("serialize auth state: {e}")))?;
        std::fs::write(&temp_path, content).map_err(|e| YoumindError::io(&temp_path, e))?;
        std::fs::rename(&temp_path, &self.state_path)
            .map_err(|e| YoumindError::io(&self.state_path, e))?;
        Ok(())
    }

    /// Delete the persisted artifact. Idempotent.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.state_path) {
            Ok(()) => {
                info!(path = %self.state_path.display(), "auth state cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(YoumindError::io(&self.state_path, e)),
        }
    }

    // -----------------------------------------------------------------------
    // Status and validation
    // -----------------------------------------------------------------------

    /// Report the artifact's freshness state.
    ///
    /// `PresentValid` is only reported off a probe result newer than the
    /// freshness bound; past the bound the store re-probes and records the
    /// outcome. An unreachable service downgrades to `PresentUnvalidated`
    /// rather than claiming validity.
    pub async fn status(&self) -> Result<AuthStatus> {
        let Some(mut artifact) = self.load()? else {
            return Ok(AuthStatus::Absent);
        };

        if let Some(validated_at) = artifact.last_validated_at {
            if Utc::now() - validated_at < self.freshness {
                return Ok(AuthStatus::PresentValid);
            }
        }

        match self.probe(&artifact).await {
            Ok(true) => {
                artifact.last_validated_at = Some(Utc::now());
                self.save(&artifact)?;
                Ok(AuthStatus::PresentValid)
            }
            Ok(false) => Ok(AuthStatus::PresentUnvalidated),
            Err(e) => {
                debug!(error = %e, "validity probe unreachable");
                Ok(AuthStatus::PresentUnvalidated)
            }
        }
    }

    /// Probe whether the persisted artifact still opens an authenticated
    /// session. Never mutates the artifact.
    pub async fn validate(&self) -> Result<bool> {
        let artifact = self.load()?.ok_or(YoumindError::Unauthenticated)?;
        self.probe(&artifact).await
    }

    /// GET the overview page with the artifact's cookies; an expired session
    /// lands on the sign-in page instead.
    async fn probe(&self, artifact: &AuthArtifact) -> Result<bool> {
        let cookie_header = artifact
            .cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");

        let response = self
            .client
            .get(self.overview_url.clone())
            .header(reqwest::header::COOKIE, cookie_header)
            .send()
            .await
            .map_err(|e| YoumindError::session(format!("auth probe: {e}")))?;

        let landed_on_sign_in = response.url().path().starts_with(self.sign_in_url.path());
        let ok = response.status().is_success() && !landed_on_sign_in;

        debug!(
            status = %response.status(),
            final_url = %response.url(),
            valid = ok,
            "auth probe completed"
        );
        Ok(ok)
    }

    // -----------------------------------------------------------------------
    // Interactive setup
    // -----------------------------------------------------------------------

    /// Drive an interactive login: open a visible blank session on the
    /// sign-in page, wait until the operator lands back on the service
    /// signed in, then capture and persist the session cookies.
    ///
    /// Fails with [`YoumindError::AuthSetupAborted`] when `wait` elapses
    /// first. The session is closed on every path.
    #[instrument(skip_all, fields(wait_secs = wait.as_secs()))]
    pub async fn setup(&self, factory: &dyn SessionFactory, wait: Duration) -> Result<AuthArtifact> {
        info!(url = %self.sign_in_url, "opening sign-in page; complete the login in the browser");

        let mut guard = SessionGuard::new(factory.open_blank(true).await?);
        let outcome = self.drive_login(guard.session(), wait).await;

        if let Err(e) = guard.dispose().await {
            warn!(error = %e, "failed to close login session");
        }

        let cookies = outcome?;
        let artifact = AuthArtifact::new(cookies);
        self.save(&artifact)?;
        info!(cookies = artifact.cookies.len(), "auth artifact captured");
        Ok(artifact)
    }

    /// Discard the current artifact and run `setup` again.
    pub async fn reauth(
        &self,
        factory: &dyn SessionFactory,
        wait: Duration,
    ) -> Result<AuthArtifact> {
        self.clear()?;
        self.setup(factory, wait).await
    }

    async fn drive_login(
        &self,
        session: &mut dyn youmind_browser::BrowserSession,
        wait: Duration,
    ) -> Result<Vec<Cookie>> {
        session.navigate(&self.sign_in_url).await?;

        let deadline = tokio::time::Instant::now() + wait;
        loop {
            tokio::time::sleep(LOGIN_POLL).await;

            match session.current_url().await {
                Ok(url) if self.is_signed_in(&url) => {
                    debug!(%url, "login detected");
                    return session.export_cookies().await;
                }
                Ok(url) => debug!(%url, "still waiting for login"),
                // The page may be mid-navigation (OAuth hops); keep polling.
                Err(e) => debug!(error = %e, "could not read current URL"),
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(YoumindError::AuthSetupAborted {
                    waited_secs: wait.as_secs(),
                });
            }
        }
    }

    /// Signed in means back on the service host and off the sign-in page.
    fn is_signed_in(&self, url: &Url) -> bool {
        url.host_str() == self.overview_url.host_str()
            && !url.path().starts_with(self.sign_in_url.path())
    }
}

/// Convenience: build a store plus the configured sign-in wait.
pub fn login_wait(config: &AppConfig) -> Duration {
    Duration::from_secs(config.timeouts.login_wait_secs)
}
