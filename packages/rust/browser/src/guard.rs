//! Scoped acquisition/release for browser sessions.

use crate::port::BrowserSession;
use youmind_shared::Result;

/// Wraps a session so release happens exactly once on every exit path.
///
/// The engine takes the guard by value and calls [`dispose`] on each branch;
/// a guard dropped without disposal logs a warning (async close cannot run
/// in `Drop`), which the resource-safety tests treat as a leak.
///
/// [`dispose`]: SessionGuard::dispose
pub struct SessionGuard {
    session: Option<Box<dyn BrowserSession>>,
}

impl SessionGuard {
    pub fn new(session: Box<dyn BrowserSession>) -> Self {
        Self {
            session: Some(session),
        }
    }

    /// Access the guarded session.
    pub fn session(&mut self) -> &mut dyn BrowserSession {
        self.session
            .as_mut()
            .expect("session accessed after dispose")
            .as_mut()
    }

    /// Close the session, consuming the guard.
    pub async fn dispose(mut self) -> Result<()> {
        match self.session.take() {
            Some(mut session) => session.close().await,
            None => Ok(()),
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.session.is_some() {
            tracing::warn!("browser session dropped without dispose; leaking context");
        }
    }
}
