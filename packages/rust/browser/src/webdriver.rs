//! W3C WebDriver backend (chromedriver).
//!
//! The WebDriver protocol is plain HTTP+JSON, so the client is a thin
//! `reqwest` wrapper: one driver session per [`BrowserSession`], created on
//! `open` and deleted on `close`. Cookie injection requires the active
//! document's domain to match, so `open` first navigates to the service
//! origin, then replays the artifact's cookies.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;

use youmind_shared::{AuthArtifact, Cookie, Result, WebDriverConfig, YoumindError};

use crate::port::{BrowserSession, SessionFactory, require_artifact};

/// W3C element identifier key in find-element responses.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// WebDriver key code for Enter.
const ENTER_KEY: &str = "\u{E007}";

/// Re-check cadence while waiting for a selector to become visible.
const VISIBILITY_POLL: Duration = Duration::from_millis(250);

/// Per-character typing delay. ~270 words per minute at 5 chars per word,
/// matching the pacing the chat surface tolerates.
const TYPE_DELAY: Duration = Duration::from_millis(44);

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Opens isolated chromedriver sessions, one per transaction.
pub struct WebDriverFactory {
    endpoint: String,
    user_agent: String,
    browser_args: Vec<String>,
    /// Navigated to before cookie injection so domains match.
    home_url: Url,
    client: Client,
}

impl WebDriverFactory {
    /// Create a factory for the configured chromedriver endpoint.
    pub fn new(config: &WebDriverConfig, home_url: Url) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| YoumindError::webdriver(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            user_agent: config.user_agent.clone(),
            browser_args: config.browser_args.clone(),
            home_url,
            client,
        })
    }

    fn capabilities(&self, visible: bool) -> Value {
        let mut args: Vec<String> = self.browser_args.clone();
        args.push(format!("--user-agent={}", self.user_agent));
        if !visible {
            args.push("--headless=new".into());
        }

        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": args,
                        "excludeSwitches": ["enable-automation"],
                    }
                }
            }
        })
    }

    async fn create_session(&self, visible: bool) -> Result<WebDriverSession> {
        let value = wire_post(
            &self.client,
            &format!("{}/session", self.endpoint),
            self.capabilities(visible),
        )
        .await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| YoumindError::webdriver("new session response had no sessionId"))?;

        debug!(session_id, visible, "webdriver session created");

        Ok(WebDriverSession {
            client: self.client.clone(),
            base: format!("{}/session/{}", self.endpoint, session_id),
            closed: false,
        })
    }
}

#[async_trait]
impl SessionFactory for WebDriverFactory {
    async fn open(
        &self,
        artifact: Option<&AuthArtifact>,
        visible: bool,
    ) -> Result<Box<dyn BrowserSession>> {
        let artifact = require_artifact(artifact)?;

        let mut session = self.create_session(visible).await?;

        // Land on the service origin, then replay cookies for that domain.
        if let Err(e) = session.navigate(&self.home_url).await {
            let _ = session.close().await;
            return Err(e);
        }
        for cookie in &artifact.cookies {
            if let Err(e) = session.add_cookie(cookie).await {
                // A single stale cookie is not fatal; the probe or the
                // in-transaction sign-in check catches a dead session.
                warn!(name = %cookie.name, error = %e, "could not inject cookie");
            }
        }

        Ok(Box::new(session))
    }

    async fn open_blank(&self, visible: bool) -> Result<Box<dyn BrowserSession>> {
        Ok(Box::new(self.create_session(visible).await?))
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

struct WebDriverSession {
    client: Client,
    /// `{endpoint}/session/{id}`
    base: String,
    closed: bool,
}

impl WebDriverSession {
    async fn get(&self, path: &str) -> Result<Value> {
        wire_get(&self.client, &format!("{}{path}", self.base)).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        wire_post(&self.client, &format!("{}{path}", self.base), body).await
    }

    /// Element ids matching a CSS selector; empty when nothing matches.
    async fn find_elements(&self, selector: &str) -> Result<Vec<String>> {
        let value = self
            .post(
                "/elements",
                json!({ "using": "css selector", "value": selector }),
            )
            .await?;

        let ids = value
            .as_array()
            .map(|els| {
                els.iter()
                    .filter_map(|el| el.get(ELEMENT_KEY))
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(ids)
    }

    async fn is_displayed(&self, element_id: &str) -> Result<bool> {
        let value = self.get(&format!("/element/{element_id}/displayed")).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// First visible element matching `selector`, if any.
    async fn first_visible(&self, selector: &str) -> Result<Option<String>> {
        for id in self.find_elements(selector).await? {
            if self.is_displayed(&id).await.unwrap_or(false) {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    async fn add_cookie(&self, cookie: &Cookie) -> Result<()> {
        let mut body = json!({
            "name": cookie.name,
            "value": cookie.value,
            "domain": cookie.domain,
            "path": cookie.path,
            "httpOnly": cookie.http_only,
            "secure": cookie.secure,
        });
        if let Some(expires) = cookie.expires {
            body["expiry"] = json!(expires as i64);
        }
        self.post("/cookie", json!({ "cookie": body })).await?;
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn navigate(&mut self, url: &Url) -> Result<()> {
        self.post("/url", json!({ "url": url.as_str() })).await?;
        Ok(())
    }

    async fn current_url(&mut self) -> Result<Url> {
        let value = self.get("/url").await?;
        let raw = value
            .as_str()
            .ok_or_else(|| YoumindError::webdriver("current URL response was not a string"))?;
        Url::parse(raw).map_err(|e| YoumindError::webdriver(format!("bad current URL {raw}: {e}")))
    }

    async fn wait_for_visible(
        &mut self,
        selectors: &[String],
        wait: Duration,
    ) -> Result<Option<String>> {
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            for selector in selectors {
                if self.first_visible(selector).await?.is_some() {
                    return Ok(Some(selector.clone()));
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(VISIBILITY_POLL).await;
        }
    }

    async fn click(&mut self, selector: &str) -> Result<bool> {
        let Some(id) = self.first_visible(selector).await? else {
            return Ok(false);
        };
        match self.post(&format!("/element/{id}/click"), json!({})).await {
            Ok(_) => Ok(true),
            Err(e) => {
                debug!(selector, error = %e, "click failed");
                Ok(false)
            }
        }
    }

    async fn type_text(&mut self, selector: &str, text: &str) -> Result<()> {
        let id = self
            .first_visible(selector)
            .await?
            .ok_or_else(|| YoumindError::session(format!("no visible element for {selector}")))?;

        // Focus first; contenteditable surfaces drop keys without it.
        let _ = self.post(&format!("/element/{id}/click"), json!({})).await;

        for ch in text.chars() {
            self.post(
                &format!("/element/{id}/value"),
                json!({ "text": ch.to_string() }),
            )
            .await?;
            tokio::time::sleep(TYPE_DELAY).await;
        }
        Ok(())
    }

    async fn press_enter(&mut self) -> Result<()> {
        self.post(
            "/actions",
            json!({
                "actions": [{
                    "type": "key",
                    "id": "keyboard",
                    "actions": [
                        { "type": "keyDown", "value": ENTER_KEY },
                        { "type": "keyUp", "value": ENTER_KEY },
                    ]
                }]
            }),
        )
        .await?;
        Ok(())
    }

    async fn collect_texts(&mut self, selector: &str) -> Result<Vec<String>> {
        let mut texts = Vec::new();
        for id in self.find_elements(selector).await? {
            let value = self.get(&format!("/element/{id}/text")).await?;
            if let Some(text) = value.as_str() {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    texts.push(trimmed.to_string());
                }
            }
        }
        Ok(texts)
    }

    async fn is_any_visible(&mut self, selector: &str) -> Result<bool> {
        Ok(self.first_visible(selector).await?.is_some())
    }

    async fn export_cookies(&mut self) -> Result<Vec<Cookie>> {
        let value = self.get("/cookie").await?;
        let cookies = value
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|c| {
                        Some(Cookie {
                            name: c.get("name")?.as_str()?.to_string(),
                            value: c.get("value")?.as_str()?.to_string(),
                            domain: c
                                .get("domain")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                            path: c
                                .get("path")
                                .and_then(Value::as_str)
                                .unwrap_or("/")
                                .to_string(),
                            expires: c.get("expiry").and_then(Value::as_f64),
                            http_only: c
                                .get("httpOnly")
                                .and_then(Value::as_bool)
                                .unwrap_or(false),
                            secure: c.get("secure").and_then(Value::as_bool).unwrap_or(false),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(cookies)
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let response = self
            .client
            .delete(&self.base)
            .send()
            .await
            .map_err(|e| YoumindError::session(format!("delete session: {e}")))?;

        if !response.status().is_success() {
            return Err(YoumindError::session(format!(
                "delete session: HTTP {}",
                response.status()
            )));
        }
        debug!("webdriver session deleted");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Wire helpers
// ---------------------------------------------------------------------------

/// Unwrap a WebDriver response envelope, surfacing protocol errors.
fn unwrap_value(url: &str, status: reqwest::StatusCode, body: Value) -> Result<Value> {
    let value = body.get("value").cloned().unwrap_or(Value::Null);

    if !status.is_success() {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| value.get("error").and_then(Value::as_str))
            .unwrap_or("unknown webdriver error");
        return Err(YoumindError::webdriver(format!(
            "{url}: HTTP {status}: {message}"
        )));
    }
    Ok(value)
}

async fn wire_get(client: &Client, url: &str) -> Result<Value> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| YoumindError::webdriver(format!("{url}: {e}")))?;
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| YoumindError::webdriver(format!("{url}: bad JSON: {e}")))?;
    unwrap_value(url, status, body)
}

async fn wire_post(client: &Client, url: &str, body: Value) -> Result<Value> {
    let response = client
        .post(url)
        .json(&body)
        .send()
        .await
        .map_err(|e| YoumindError::webdriver(format!("{url}: {e}")))?;
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| YoumindError::webdriver(format!("{url}: bad JSON: {e}")))?;
    unwrap_value(url, status, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use youmind_shared::AuthArtifact;

    fn test_config(endpoint: &str) -> WebDriverConfig {
        WebDriverConfig {
            endpoint: endpoint.into(),
            ..WebDriverConfig::default()
        }
    }

    async fn mock_new_session(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": { "sessionId": "sess-1", "capabilities": {} }
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn open_requires_artifact() {
        let factory = WebDriverFactory::new(
            &test_config("http://localhost:9515"),
            Url::parse("https://youmind.com").unwrap(),
        )
        .unwrap();

        // No artifact → fails before any HTTP traffic (endpoint is not live).
        let result = factory.open(None, false).await;
        assert!(matches!(result, Err(YoumindError::Unauthenticated)));
    }

    #[tokio::test]
    async fn open_creates_session_and_injects_cookies() {
        let server = MockServer::start().await;
        mock_new_session(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/sess-1/url"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/session/sess-1/cookie"))
            .and(body_partial_json(json!({ "cookie": { "name": "sid" } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .expect(1)
            .mount(&server)
            .await;

        let factory = WebDriverFactory::new(
            &test_config(&server.uri()),
            Url::parse("https://youmind.com").unwrap(),
        )
        .unwrap();

        let artifact = AuthArtifact::new(vec![Cookie {
            name: "sid".into(),
            value: "abc".into(),
            domain: ".youmind.com".into(),
            path: "/".into(),
            expires: None,
            http_only: true,
            secure: true,
        }]);

        let session = factory.open(Some(&artifact), false).await.unwrap();
        drop(session);
    }

    #[test]
    fn headless_flag_follows_visible() {
        let factory = WebDriverFactory::new(
            &test_config("http://localhost:9515"),
            Url::parse("https://youmind.com").unwrap(),
        )
        .unwrap();

        let caps = factory.capabilities(false);
        let args = caps["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["args"]
            .as_array()
            .unwrap();
        assert!(args.iter().any(|a| a.as_str() == Some("--headless=new")));

        let caps = factory.capabilities(true);
        let args = caps["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["args"]
            .as_array()
            .unwrap();
        assert!(!args.iter().any(|a| a.as_str() == Some("--headless=new")));
    }

    #[tokio::test]
    async fn collect_texts_reads_matching_elements() {
        let server = MockServer::start().await;
        mock_new_session(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/sess-1/elements"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    { "element-6066-11e4-a52e-4f735466cecf": "el-1" },
                    { "element-6066-11e4-a52e-4f735466cecf": "el-2" },
                ]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/session/sess-1/element/el-1/text"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "value": "  first answer  " })),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/session/sess-1/element/el-2/text"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": "" })))
            .mount(&server)
            .await;

        let factory = WebDriverFactory::new(
            &test_config(&server.uri()),
            Url::parse("https://youmind.com").unwrap(),
        )
        .unwrap();
        let mut session = factory.open_blank(false).await.unwrap();

        let texts = session.collect_texts("div.message-blocks").await.unwrap();
        assert_eq!(texts, vec!["first answer".to_string()]);
    }

    #[tokio::test]
    async fn wait_for_visible_returns_none_when_nothing_matches() {
        let server = MockServer::start().await;
        mock_new_session(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/sess-1/elements"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [] })))
            .mount(&server)
            .await;

        let factory = WebDriverFactory::new(
            &test_config(&server.uri()),
            Url::parse("https://youmind.com").unwrap(),
        )
        .unwrap();
        let mut session = factory.open_blank(false).await.unwrap();

        let found = session
            .wait_for_visible(
                &["textarea[placeholder*='Ask']".to_string()],
                Duration::from_millis(50),
            )
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn close_deletes_session_and_is_idempotent() {
        let server = MockServer::start().await;
        mock_new_session(&server).await;

        Mock::given(method("DELETE"))
            .and(path("/session/sess-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .expect(1)
            .mount(&server)
            .await;

        let factory = WebDriverFactory::new(
            &test_config(&server.uri()),
            Url::parse("https://youmind.com").unwrap(),
        )
        .unwrap();
        let mut session = factory.open_blank(false).await.unwrap();

        session.close().await.unwrap();
        // Second close is a no-op, not a second DELETE.
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn protocol_error_surfaces_message() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "value": { "error": "session not created", "message": "chrome not reachable" }
            })))
            .mount(&server)
            .await;

        let factory = WebDriverFactory::new(
            &test_config(&server.uri()),
            Url::parse("https://youmind.com").unwrap(),
        )
        .unwrap();

        let err = match factory.open_blank(false).await {
            Ok(_) => panic!("expected open_blank to fail"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("chrome not reachable"));
    }
}
