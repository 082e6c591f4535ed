//! Headless-browser coordinate lookup for map pages that do not carry
//! coordinates in their URL.
//!
//! Talks to a remote WebDriver hub over the W3C JSON wire protocol. Each
//! lookup opens its own session and always deletes it afterwards.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use orgscout_core::config::BrowserConfig;
use orgscout_core::types::GeoPoint;

/// Key under which W3C WebDriver returns element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const CONSENT_BUTTON_XPATH: &str = "//div[contains(@class,'gdpr-popup-v3-button')]";
const SHARE_BUTTON_XPATH: &str = "//button[contains(., 'Baham ko‘rish')] \
| //button[contains(., 'Поделиться')] \
| //button[contains(., 'Share')]";
const SHARE_TEXT_CSS: &str = "div.card-share-view__text";
const SHARE_LINK_CSS: &str = "input.card-share-view__link-input";

#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("webdriver request failed: {0}")]
    Request(String),
    #[error("webdriver returned {status}: {message}")]
    Protocol { status: u16, message: String },
    #[error("element not found: {0}")]
    NoSuchElement(String),
    #[error("no coordinates on share panel")]
    NoCoordinates,
    #[error("lookup timed out after {0:?}")]
    Timeout(Duration),
}

/// Resolves a map page URL to a coordinate pair.
#[async_trait]
pub trait BrowserCoordinates: Send + Sync {
    async fn resolve_coordinates(&self, url: &str) -> Result<GeoPoint, BrowserError>;
}

/// Parse the share panel text, `"lat, lng"`.
pub fn parse_share_text(text: &str) -> Option<GeoPoint> {
    let (lat, lng) = text.trim().split_once(',')?;
    let latitude = lat.trim().parse::<f64>().ok()?;
    let longitude = lng.trim().parse::<f64>().ok()?;
    GeoPoint::checked(latitude, longitude)
}

/// Parse a generated share link carrying `ll=lng,lat`. Note the swapped
/// order relative to the panel text.
pub fn parse_share_link(link: &str) -> Option<GeoPoint> {
    let parsed = url::Url::parse(link).ok()?;
    let (_, ll) = parsed.query_pairs().find(|(k, _)| k == "ll")?;
    let (lng, lat) = ll.split_once(',')?;
    let longitude = lng.trim().parse::<f64>().ok()?;
    let latitude = lat.trim().parse::<f64>().ok()?;
    GeoPoint::checked(latitude, longitude)
}

/// [`BrowserCoordinates`] backed by a remote WebDriver hub.
pub struct WebDriverResolver {
    client: reqwest::Client,
    hub: String,
    implicit_wait: Duration,
    timeout: Duration,
}

impl WebDriverResolver {
    pub fn new(config: &BrowserConfig) -> Result<Self, BrowserError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| BrowserError::Request(e.to_string()))?;
        Ok(Self {
            client,
            hub: config.webdriver_url.trim_end_matches('/').to_string(),
            implicit_wait: Duration::from_millis(config.implicit_wait_ms),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
        })
    }

    async fn call(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, BrowserError> {
        let mut request = self.client.request(method, format!("{}{}", self.hub, path));
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| BrowserError::Request(e.to_string()))?;
        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| BrowserError::Request(e.to_string()))?;

        if status.is_success() {
            return Ok(payload.get("value").cloned().unwrap_or(Value::Null));
        }
        let error = payload
            .pointer("/value/error")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if error == "no such element" {
            return Err(BrowserError::NoSuchElement(path.to_string()));
        }
        let message = payload
            .pointer("/value/message")
            .and_then(Value::as_str)
            .unwrap_or(error)
            .to_string();
        Err(BrowserError::Protocol {
            status: status.as_u16(),
            message,
        })
    }

    async fn open_session(&self) -> Result<String, BrowserError> {
        let caps = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": ["--headless=new", "--no-sandbox", "--disable-dev-shm-usage"]
                    }
                }
            }
        });
        let value = self.call(reqwest::Method::POST, "/session", Some(caps)).await?;
        value
            .get("sessionId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| BrowserError::Protocol {
                status: 200,
                message: "session response has no sessionId".to_string(),
            })
    }

    async fn close_session(&self, session: &str) {
        let path = format!("/session/{}", session);
        if let Err(e) = self.call(reqwest::Method::DELETE, &path, None).await {
            warn!(error = %e, "Failed to delete WebDriver session");
        }
    }

    async fn find(&self, session: &str, using: &str, selector: &str) -> Result<String, BrowserError> {
        let value = self
            .call(
                reqwest::Method::POST,
                &format!("/session/{}/element", session),
                Some(json!({ "using": using, "value": selector })),
            )
            .await?;
        value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| BrowserError::NoSuchElement(selector.to_string()))
    }

    async fn click(&self, session: &str, element: &str) -> Result<(), BrowserError> {
        self.call(
            reqwest::Method::POST,
            &format!("/session/{}/element/{}/click", session, element),
            Some(json!({})),
        )
        .await
        .map(|_| ())
    }

    async fn element_string(
        &self,
        session: &str,
        element: &str,
        what: &str,
    ) -> Result<String, BrowserError> {
        let value = self
            .call(
                reqwest::Method::GET,
                &format!("/session/{}/element/{}/{}", session, element, what),
                None,
            )
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn lookup(&self, session: &str, url: &str) -> Result<GeoPoint, BrowserError> {
        self.call(
            reqwest::Method::POST,
            &format!("/session/{}/timeouts", session),
            Some(json!({ "implicit": self.implicit_wait.as_millis() as u64 })),
        )
        .await?;
        self.call(
            reqwest::Method::POST,
            &format!("/session/{}/url", session),
            Some(json!({ "url": url })),
        )
        .await?;

        // Consent dialog and share button are both optional.
        if let Ok(button) = self.find(session, "xpath", CONSENT_BUTTON_XPATH).await {
            if let Err(e) = self.click(session, &button).await {
                debug!(error = %e, "Consent dialog not dismissed");
            }
        }
        if let Ok(button) = self.find(session, "xpath", SHARE_BUTTON_XPATH).await {
            if let Err(e) = self.click(session, &button).await {
                debug!(error = %e, "Share button not clicked");
            }
        }

        if let Ok(panel) = self.find(session, "css selector", SHARE_TEXT_CSS).await {
            let text = self.element_string(session, &panel, "text").await?;
            if let Some(point) = parse_share_text(&text) {
                return Ok(point);
            }
        }

        let input = self.find(session, "css selector", SHARE_LINK_CSS).await?;
        let link = self
            .element_string(session, &input, "property/value")
            .await?;
        parse_share_link(&link).ok_or(BrowserError::NoCoordinates)
    }
}

#[async_trait]
impl BrowserCoordinates for WebDriverResolver {
    async fn resolve_coordinates(&self, url: &str) -> Result<GeoPoint, BrowserError> {
        let session = tokio::time::timeout(self.timeout, self.open_session())
            .await
            .map_err(|_| BrowserError::Timeout(self.timeout))??;

        let result = tokio::time::timeout(self.timeout, self.lookup(&session, url))
            .await
            .map_err(|_| BrowserError::Timeout(self.timeout))
            .and_then(|r| r);

        self.close_session(&session).await;
        result
    }
}
