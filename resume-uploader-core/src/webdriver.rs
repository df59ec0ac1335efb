//! [`Browser`] over the W3C WebDriver HTTP protocol.
//!
//! Talks JSON to a running `chromedriver` or `geckodriver`. The context is
//! opened with the portal-friendly settings the uploader has always used: a
//! fixed 1366x850 viewport, a desktop Chrome user agent, `en-US`, and the
//! automation banner/`navigator.webdriver` flag switched off where the driver
//! allows it.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::DisplayMode;
use crate::contract::{Browser, LaunchOptions};
use crate::error::BrowserError;
use crate::portal::Locator;
use crate::session::{Cookie, OriginStorage, SessionState};

pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";

pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36";

const VIEWPORT: (u32, u32) = (1366, 850);

/// W3C web element identifier key.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const ENTER_KEY: &str = "\u{E007}";

/// Extra time allowed on top of the page-load timeout for the HTTP round trip.
const NAVIGATION_SLACK: Duration = Duration::from_secs(5);

const CAPTURE_STORAGE_JS: &str = "return { origin: window.location.origin, \
localStorage: Object.entries(window.localStorage).map(([name, value]) => ({ name, value })) };";

const RESTORE_STORAGE_JS: &str =
    "for (const e of arguments[0]) { window.localStorage.setItem(e.name, e.value); }";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chrome,
    Firefox,
}

pub struct WebDriverBrowser {
    client: Client,
    endpoint: String,
    kind: BrowserKind,
    /// Page to load before injecting cookies; cookies only stick to the
    /// current document's domain.
    origin: String,
    session: Mutex<Option<String>>,
}

impl WebDriverBrowser {
    pub fn new(
        endpoint: &str,
        kind: BrowserKind,
        origin: &str,
        request_timeout: Duration,
    ) -> Result<Self, BrowserError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(WebDriverBrowser {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            kind,
            origin: origin.to_string(),
            session: Mutex::new(None),
        })
    }

    fn session_id(&self) -> Result<String, BrowserError> {
        let guard = self
            .session
            .lock()
            .map_err(|_| BrowserError::Protocol("session lock poisoned".to_string()))?;
        guard
            .clone()
            .ok_or_else(|| BrowserError::Protocol("browser not launched".to_string()))
    }

    fn set_session_id(&self, id: Option<String>) -> Option<String> {
        match self.session.lock() {
            Ok(mut guard) => std::mem::replace(&mut *guard, id),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), id),
        }
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, BrowserError> {
        let mut request = self.client.request(method, url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let payload: Value = response.json().await.map_err(transport_error)?;
        if status.is_success() {
            Ok(payload.get("value").cloned().unwrap_or(Value::Null))
        } else {
            Err(protocol_error(&payload))
        }
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, BrowserError> {
        let id = self.session_id()?;
        let url = format!("{}/session/{}/{}", self.endpoint, id, path);
        self.send(method, &url, body, None).await
    }

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        let id = self.session_id()?;
        let endpoint = format!("{}/session/{}/url", self.endpoint, id);
        debug!(url = %url, "[BROWSER] Navigating");
        self.send(
            Method::POST,
            &endpoint,
            Some(json!({ "url": url })),
            Some(timeout + NAVIGATION_SLACK),
        )
        .await
        .map(|_| ())
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<String>, BrowserError> {
        let (using, value) = webdriver_locator(locator);
        let found = self
            .command(
                Method::POST,
                "elements",
                Some(json!({ "using": using, "value": value })),
            )
            .await?;
        Ok(element_ids(&found))
    }

    async fn find_first(&self, locator: &Locator) -> Result<String, BrowserError> {
        self.find_all(locator)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BrowserError::ElementNotFound(locator.to_string()))
    }

    async fn send_keys(&self, element: &str, text: &str) -> Result<(), BrowserError> {
        self.command(
            Method::POST,
            &format!("element/{element}/value"),
            Some(json!({ "text": text })),
        )
        .await
        .map(|_| ())
    }

    async fn restore(&self, state: &SessionState, timeout: Duration) -> Result<(), BrowserError> {
        self.navigate(&self.origin, timeout).await?;

        let mut restored = 0usize;
        for cookie in &state.cookies {
            match self
                .command(Method::POST, "cookie", Some(json!({ "cookie": cookie })))
                .await
            {
                Ok(_) => restored += 1,
                Err(e) => warn!(cookie = %cookie.name, error = %e, "[BROWSER] Could not restore cookie"),
            }
        }

        for storage in state.origins.iter().filter(|o| !o.local_storage.is_empty()) {
            if storage.origin.trim_end_matches('/') != self.origin.trim_end_matches('/') {
                self.navigate(&storage.origin, timeout).await?;
            }
            let script = json!({ "script": RESTORE_STORAGE_JS, "args": [storage.local_storage] });
            if let Err(e) = self.command(Method::POST, "execute/sync", Some(script)).await {
                warn!(origin = %storage.origin, error = %e, "[BROWSER] Could not restore localStorage");
            }
        }

        info!(
            cookies = restored,
            origins = state.origins.len(),
            "[BROWSER] Restored stored session into the browser context"
        );
        Ok(())
    }
}

#[async_trait]
impl Browser for WebDriverBrowser {
    async fn launch(&self, options: LaunchOptions) -> Result<(), BrowserError> {
        let caps = capabilities(self.kind, options.display);
        let url = format!("{}/session", self.endpoint);
        let created = self
            .send(
                Method::POST,
                &url,
                Some(json!({ "capabilities": { "alwaysMatch": caps } })),
                None,
            )
            .await?;
        let id = created
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Protocol("new session response has no sessionId".to_string()))?
            .to_string();
        info!(session = %id, browser = ?self.kind, display = ?options.display, "[BROWSER] Browser context opened");
        self.set_session_id(Some(id));

        let page_load_ms = u64::try_from(options.page_load_timeout.as_millis()).unwrap_or(u64::MAX);
        self.command(Method::POST, "timeouts", Some(json!({ "pageLoad": page_load_ms })))
            .await?;

        if let Some(state) = &options.state {
            self.restore(state, options.page_load_timeout).await?;
        }
        Ok(())
    }

    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        self.navigate(url, timeout).await
    }

    async fn exists(&self, locator: &Locator) -> Result<bool, BrowserError> {
        Ok(!self.find_all(locator).await?.is_empty())
    }

    async fn fill(&self, locator: &Locator, text: &str) -> Result<(), BrowserError> {
        let element = self.find_first(locator).await?;
        self.command(Method::POST, &format!("element/{element}/clear"), Some(json!({})))
            .await?;
        self.send_keys(&element, text).await
    }

    async fn click(&self, locator: &Locator) -> Result<(), BrowserError> {
        let element = self.find_first(locator).await?;
        self.command(Method::POST, &format!("element/{element}/click"), Some(json!({})))
            .await
            .map(|_| ())
    }

    async fn press_enter(&self, locator: &Locator) -> Result<(), BrowserError> {
        let element = self.find_first(locator).await?;
        self.send_keys(&element, ENTER_KEY).await
    }

    async fn set_file(&self, locator: &Locator, path: &Path) -> Result<(), BrowserError> {
        // The driver reads the file itself, so it needs an absolute path.
        let absolute = std::fs::canonicalize(path).map_err(|e| {
            BrowserError::Protocol(format!("cannot resolve {}: {e}", path.display()))
        })?;
        let element = self.find_first(locator).await?;
        self.send_keys(&element, &absolute.to_string_lossy()).await
    }

    async fn content(&self) -> Result<String, BrowserError> {
        let source = self.command(Method::GET, "source", None).await?;
        Ok(source.as_str().unwrap_or_default().to_string())
    }

    async fn storage_state(&self) -> Result<SessionState, BrowserError> {
        let cookies: Vec<Cookie> = serde_json::from_value(self.command(Method::GET, "cookie", None).await?)
            .map_err(|e| BrowserError::Protocol(format!("unexpected cookie payload: {e}")))?;
        let snapshot = self
            .command(
                Method::POST,
                "execute/sync",
                Some(json!({ "script": CAPTURE_STORAGE_JS, "args": [] })),
            )
            .await?;
        let origin: OriginStorage = serde_json::from_value(snapshot)
            .map_err(|e| BrowserError::Protocol(format!("unexpected localStorage payload: {e}")))?;
        debug!(cookies = cookies.len(), origin = %origin.origin, "[BROWSER] Captured storage state");
        Ok(SessionState::new(cookies, vec![origin]))
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let Some(id) = self.set_session_id(None) else {
            return Ok(());
        };
        let url = format!("{}/session/{}", self.endpoint, id);
        self.send(Method::DELETE, &url, None, None).await?;
        info!(session = %id, "[BROWSER] Browser context closed");
        Ok(())
    }
}

/// `alwaysMatch` capabilities for a new session.
///
/// Firefox has no off-screen window switch, so `Background` opens a normal
/// headed window there.
pub fn capabilities(kind: BrowserKind, display: DisplayMode) -> Value {
    let (width, height) = VIEWPORT;
    match kind {
        BrowserKind::Chrome => {
            let mut args = vec![
                "--disable-blink-features=AutomationControlled".to_string(),
                format!("--window-size={width},{height}"),
                "--lang=en-US".to_string(),
                format!("--user-agent={DESKTOP_USER_AGENT}"),
            ];
            match display {
                DisplayMode::Headless => args.push("--headless=new".to_string()),
                DisplayMode::Background => args.push("--window-position=-32000,-32000".to_string()),
                DisplayMode::Headed => {}
            }
            json!({
                "browserName": "chrome",
                "goog:chromeOptions": {
                    "args": args,
                    "excludeSwitches": ["enable-automation"],
                },
            })
        }
        BrowserKind::Firefox => {
            let mut args = vec![format!("--width={width}"), format!("--height={height}")];
            if display == DisplayMode::Headless {
                args.push("-headless".to_string());
            }
            json!({
                "browserName": "firefox",
                "moz:firefoxOptions": {
                    "args": args,
                    "prefs": {
                        "intl.accept_languages": "en-US",
                        "general.useragent.override": DESKTOP_USER_AGENT,
                        "dom.webdriver.enabled": false,
                    },
                },
            })
        }
    }
}

/// Maps a [`Locator`] to a WebDriver `(using, value)` pair.
pub fn webdriver_locator(locator: &Locator) -> (&'static str, String) {
    const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";
    match locator {
        Locator::Css(selector) => ("css selector", selector.clone()),
        Locator::ButtonText(text) => (
            "xpath",
            format!(
                "//button[contains(translate(normalize-space(.), '{UPPER}', '{LOWER}'), {})]",
                xpath_literal(&text.to_lowercase())
            ),
        ),
    }
}

/// Quotes `s` as an XPath 1.0 string literal.
pub fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        format!("'{s}'")
    } else if !s.contains('"') {
        format!("\"{s}\"")
    } else {
        let parts: Vec<String> = s.split('\'').map(|p| format!("'{p}'")).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

/// Element references from a "Find Elements" response value.
pub fn element_ids(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get(ELEMENT_KEY).and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Converts a WebDriver error payload into a [`BrowserError`].
pub fn protocol_error(payload: &Value) -> BrowserError {
    let value = payload.get("value").unwrap_or(payload);
    let error = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
    let message = value.get("message").and_then(Value::as_str).unwrap_or_default();
    match error {
        "no such element" => BrowserError::ElementNotFound(message.to_string()),
        "timeout" | "script timeout" => BrowserError::Timeout(message.to_string()),
        _ => BrowserError::Protocol(format!("{error}: {message}")),
    }
}

fn transport_error(e: reqwest::Error) -> BrowserError {
    if e.is_timeout() {
        BrowserError::Timeout(e.to_string())
    } else {
        BrowserError::Transport(e)
    }
}
