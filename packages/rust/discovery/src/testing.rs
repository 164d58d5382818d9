//! Scripted engine doubles shared by the discovery and material tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use youmind_browser::{BrowserSession, SessionFactory, require_artifact};
use youmind_shared::{AuthArtifact, Cookie, Result};

/// A factory whose sessions answer from a fixed script, one answer per
/// transaction, and record every question they were asked.
pub struct ScriptedFactory {
    answers: Mutex<VecDeque<String>>,
    questions: Arc<Mutex<Vec<String>>>,
    opens: AtomicUsize,
}

impl ScriptedFactory {
    pub fn new(answers: Vec<String>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            questions: Arc::new(Mutex::new(Vec::new())),
            opens: AtomicUsize::new(0),
        }
    }

    pub fn artifact() -> AuthArtifact {
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

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Questions asked so far, in transaction order.
    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    async fn open(
        &self,
        artifact: Option<&AuthArtifact>,
        _visible: bool,
    ) -> Result<Box<dyn BrowserSession>> {
        require_artifact(artifact)?;
        self.opens.fetch_add(1, Ordering::SeqCst);

        let answer = self
            .answers
            .lock()
            .unwrap()
            .pop_front()
            .expect("script ran out of answers");

        Ok(Box::new(ScriptedSession {
            answer,
            questions: self.questions.clone(),
            submitted: false,
        }))
    }

    async fn open_blank(&self, _visible: bool) -> Result<Box<dyn BrowserSession>> {
        unreachable!("discovery never opens blank sessions")
    }
}

struct ScriptedSession {
    answer: String,
    questions: Arc<Mutex<Vec<String>>>,
    submitted: bool,
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn navigate(&mut self, _url: &Url) -> Result<()> {
        Ok(())
    }

    async fn current_url(&mut self) -> Result<Url> {
        Ok(Url::parse("https://youmind.com/boards/abc").unwrap())
    }

    async fn wait_for_visible(
        &mut self,
        selectors: &[String],
        _wait: Duration,
    ) -> Result<Option<String>> {
        Ok(selectors.first().cloned())
    }

    async fn click(&mut self, _selector: &str) -> Result<bool> {
        Ok(false)
    }

    async fn type_text(&mut self, _selector: &str, text: &str) -> Result<()> {
        self.questions.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn press_enter(&mut self) -> Result<()> {
        self.submitted = true;
        Ok(())
    }

    async fn collect_texts(&mut self, _selector: &str) -> Result<Vec<String>> {
        if self.submitted {
            Ok(vec![self.answer.clone()])
        } else {
            Ok(Vec::new())
        }
    }

    async fn is_any_visible(&mut self, _selector: &str) -> Result<bool> {
        Ok(false)
    }

    async fn export_cookies(&mut self) -> Result<Vec<Cookie>> {
        Ok(Vec::new())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
