//! Remote browser page source
//!
//! Drives a W3C WebDriver endpoint (safaridriver, chromedriver,
//! geckodriver, a Selenium grid) so that pages which render their listings
//! with JavaScript can be crawled with the same rules as static ones.
//!
//! One browser session is created lazily on the first page and reused for
//! every later page. A session is a single tab, so page loads are
//! serialized behind a mutex.

use crate::config::BrowserConfig;
use crate::crawler::fetcher::{PageSource, SourceError};
use crate::HarvestError;
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use url::Url;

/// Interval between `document.readyState` polls
const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Page source backed by a remote WebDriver session
#[derive(Debug)]
pub struct BrowserSource {
    client: Client,
    endpoint: String,
    config: BrowserConfig,
    session: Mutex<Option<String>>,
}

impl BrowserSource {
    pub fn new(client: Client, config: BrowserConfig) -> Self {
        Self {
            client,
            endpoint: config.webdriver_url.trim_end_matches('/').to_string(),
            config,
            session: Mutex::new(None),
        }
    }

    pub fn from_config(config: &BrowserConfig) -> Result<Self, HarvestError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.command_timeout_secs))
            .build()?;
        Ok(Self::new(client, config.clone()))
    }

    /// Sends one WebDriver command and unwraps its `value`
    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, SourceError> {
        let url = format!("{}{}", self.endpoint, path);
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let payload: Value = response.json().await.map_err(|e| {
            SourceError::Browser(format!("unreadable WebDriver response from {}: {}", path, e))
        })?;

        if !status.is_success() {
            let value = &payload["value"];
            let error = value["error"].as_str().unwrap_or("unknown error");
            let message = value["message"].as_str().unwrap_or("");
            return Err(SourceError::Browser(format!(
                "{} failed with {}: {} {}",
                path,
                status.as_u16(),
                error,
                message
            )));
        }

        Ok(payload.get("value").cloned().unwrap_or(Value::Null))
    }

    async fn execute(&self, session_id: &str, script: &str) -> Result<Value, SourceError> {
        self.command(
            Method::POST,
            &format!("/session/{}/execute/sync", session_id),
            Some(json!({ "script": script, "args": [] })),
        )
        .await
    }

    /// Returns the live session id, creating a session if needed
    async fn ensure_session(&self, slot: &mut Option<String>) -> Result<String, SourceError> {
        if let Some(id) = slot.as_ref() {
            return Ok(id.clone());
        }

        let value = self
            .command(
                Method::POST,
                "/session",
                Some(json!({
                    "capabilities": {
                        "alwaysMatch": { "browserName": self.config.browser_name }
                    }
                })),
            )
            .await?;

        let id = value["sessionId"]
            .as_str()
            .ok_or_else(|| SourceError::Browser("session response has no sessionId".to_string()))?
            .to_string();

        tracing::info!(
            "Started {} WebDriver session {}",
            self.config.browser_name,
            id
        );
        *slot = Some(id.clone());
        Ok(id)
    }

    /// Polls until the document reports complete; a slow page is logged, not failed
    async fn wait_until_ready(&self, session_id: &str, url: &Url) -> Result<(), SourceError> {
        let deadline = Instant::now() + Duration::from_secs(self.config.page_load_timeout_secs);

        loop {
            let state = self
                .execute(session_id, "return document.readyState;")
                .await?;
            if state.as_str() == Some("complete") {
                return Ok(());
            }

            if Instant::now() >= deadline {
                tracing::warn!("Timed out waiting for {} to load, continuing anyway", url);
                return Ok(());
            }

            sleep(READY_POLL_INTERVAL).await;
        }
    }

    async fn load(&self, session_id: &str, url: &Url) -> Result<String, SourceError> {
        self.command(
            Method::POST,
            &format!("/session/{}/url", session_id),
            Some(json!({ "url": url.as_str() })),
        )
        .await?;

        self.wait_until_ready(session_id, url).await?;
        sleep(Duration::from_millis(self.config.render_wait_ms)).await;

        let steps = self.config.scroll_steps;
        for step in 1..=steps {
            let script = format!(
                "window.scrollTo(0, document.body.scrollHeight * {} / {});",
                step, steps
            );
            self.execute(session_id, &script).await?;
            sleep(Duration::from_millis(self.config.scroll_pause_ms)).await;
        }

        let source = self
            .command(Method::GET, &format!("/session/{}/source", session_id), None)
            .await?;

        match source {
            Value::String(html) => Ok(html),
            other => Err(SourceError::Browser(format!(
                "page source was not a string: {}",
                other
            ))),
        }
    }
}

#[async_trait]
impl PageSource for BrowserSource {
    async fn get_page(&self, url: &Url) -> Result<String, SourceError> {
        let mut slot = self.session.lock().await;
        let session_id = self.ensure_session(&mut slot).await?;

        let result = self.load(&session_id, url).await;
        if let Err(SourceError::Browser(message)) = &result {
            if message.contains("invalid session id") {
                tracing::warn!("WebDriver session {} is gone, a new one will be started", session_id);
                *slot = None;
            }
        }
        result
    }

    fn name(&self) -> &'static str {
        "browser"
    }

    async fn close(&self) -> Result<(), SourceError> {
        let Some(id) = self.session.lock().await.take() else {
            return Ok(());
        };

        tracing::info!("Closing WebDriver session {}", id);
        self.command(Method::DELETE, &format!("/session/{}", id), None)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn browser_config(endpoint: &str) -> BrowserConfig {
        BrowserConfig {
            webdriver_url: endpoint.to_string(),
            browser_name: "safari".to_string(),
            page_load_timeout_secs: 1,
            render_wait_ms: 0,
            scroll_steps: 2,
            scroll_pause_ms: 0,
            command_timeout_secs: 5,
        }
    }

    async fn mount_session(server: &MockServer, page: &str) {
        Mock::given(method("POST"))
            .and(path("/session"))
            .and(body_partial_json(json!({
                "capabilities": { "alwaysMatch": { "browserName": "safari" } }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": { "sessionId": "s-1", "capabilities": {} }
            })))
            .expect(1)
            .mount(server)
            .await;

        Mock::given(method("POST"))
            .and(path("/session/s-1/url"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .mount(server)
            .await;

        Mock::given(method("POST"))
            .and(path("/session/s-1/execute/sync"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "value": "complete" })),
            )
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/session/s-1/source"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": page })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_get_page_reuses_session() {
        let server = MockServer::start().await;
        mount_session(&server, "<html><body>rendered</body></html>").await;

        let source = BrowserSource::from_config(&browser_config(&server.uri())).unwrap();
        let url = Url::parse("https://example.com/board").unwrap();

        let first = source.get_page(&url).await.unwrap();
        let second = source.get_page(&url).await.unwrap();

        assert_eq!(first, "<html><body>rendered</body></html>");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_navigates_to_requested_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session/s-1/url"))
            .and(body_partial_json(json!({ "url": "https://example.com/topic/7" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .expect(1)
            .mount(&server)
            .await;
        mount_session(&server, "<html></html>").await;

        let source = BrowserSource::from_config(&browser_config(&server.uri())).unwrap();
        let url = Url::parse("https://example.com/topic/7").unwrap();
        source.get_page(&url).await.unwrap();
    }

    #[tokio::test]
    async fn test_session_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "value": {
                    "error": "session not created",
                    "message": "Could not create a session: remote automation is off"
                }
            })))
            .mount(&server)
            .await;

        let source = BrowserSource::from_config(&browser_config(&server.uri())).unwrap();
        let url = Url::parse("https://example.com/").unwrap();

        match source.get_page(&url).await {
            Err(SourceError::Browser(message)) => {
                assert!(message.contains("session not created"));
                assert!(message.contains("remote automation is off"));
            }
            other => panic!("expected browser error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_slow_page_still_returns_source() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session/s-1/execute/sync"))
            .and(body_partial_json(json!({ "script": "return document.readyState;" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "value": "interactive" })),
            )
            .mount(&server)
            .await;
        mount_session(&server, "<html>partial</html>").await;

        let source = BrowserSource::from_config(&browser_config(&server.uri())).unwrap();
        let url = Url::parse("https://example.com/").unwrap();

        assert_eq!(source.get_page(&url).await.unwrap(), "<html>partial</html>");
    }

    #[tokio::test]
    async fn test_close_deletes_session() {
        let server = MockServer::start().await;
        mount_session(&server, "<html></html>").await;
        Mock::given(method("DELETE"))
            .and(path("/session/s-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .expect(1)
            .mount(&server)
            .await;

        let source = BrowserSource::from_config(&browser_config(&server.uri())).unwrap();
        source
            .get_page(&Url::parse("https://example.com/").unwrap())
            .await
            .unwrap();

        source.close().await.unwrap();
        // second close has no session left to delete
        source.close().await.unwrap();
    }
}
