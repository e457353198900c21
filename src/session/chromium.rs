//! Chromium-backed rendering session using chromiumoxide.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::EventResponseReceived;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use log::{debug, warn};
use serde_json::Value;
use tokio::task::JoinHandle;

use super::{RenderSession, SessionCookie};
use crate::config::BrowserOptions;
use crate::error::DownloadError;

/// Injected into every new document before site scripts run: hides the
/// automation flag and neuters the devtools-detection timer some readers use.
const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
const originalSetInterval = window.setInterval;
window.setInterval = (handler, timeout, ...args) => {
    const source = handler.toString();
    if (source.includes('isSuspend') && source.includes('detect')) {
        return null;
    }
    return originalSetInterval(handler, timeout, ...args);
};
"#;

pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    listener: JoinHandle<()>,
    responses: Arc<Mutex<Vec<String>>>,
    page_timeout: Duration,
}

impl ChromiumSession {
    /// Launches a browser with a single tab and starts recording responses.
    pub async fn launch(headless: bool, options: &BrowserOptions, page_timeout: Duration) -> Result<Self, DownloadError> {
        let mut builder = BrowserConfig::builder()
            .window_size(1920, 1080)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--log-level=3");
        if !headless {
            builder = builder.with_head();
        }
        if let Some(path) = &options.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| DownloadError::SessionUnavailable(format!("invalid browser configuration: {}", e)))?;

        let (mut browser, mut events) = Browser::launch(config).await.map_err(|e| {
            DownloadError::SessionUnavailable(format!(
                "{}. Check that Google Chrome or Chromium is installed, or pass --browser-path",
                e
            ))
        })?;

        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let _ = event;
            }
        });

        match Self::open_page(&browser).await {
            Ok((page, listener, responses)) => Ok(Self {
                browser,
                page,
                handler,
                listener,
                responses,
                page_timeout,
            }),
            Err(e) => {
                let _ = browser.close().await;
                handler.abort();
                Err(DownloadError::SessionUnavailable(format!("could not open a browser tab: {}", e)))
            }
        }
    }

    async fn open_page(browser: &Browser) -> Result<(Page, JoinHandle<()>, Arc<Mutex<Vec<String>>>), DownloadError> {
        let page = browser.new_page("about:blank").await?;
        page.evaluate_on_new_document(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await?;

        let mut received = page.event_listener::<EventResponseReceived>().await?;
        let responses = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&responses);
        let listener = tokio::spawn(async move {
            while let Some(event) = received.next().await {
                if let Ok(mut urls) = sink.lock() {
                    urls.push(event.response.url.clone());
                }
            }
        });

        Ok((page, listener, responses))
    }
}

#[async_trait]
impl RenderSession for ChromiumSession {
    async fn navigate(&self, url: &str) -> Result<(), DownloadError> {
        debug!("navigating to {}", url);
        match tokio::time::timeout(self.page_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(DownloadError::Timeout(format!(
                "navigation to {} did not finish within {}s",
                url,
                self.page_timeout.as_secs()
            ))),
        }
    }

    async fn current_url(&self) -> Result<String, DownloadError> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn content(&self) -> Result<String, DownloadError> {
        Ok(self.page.content().await?)
    }

    async fn evaluate(&self, script: &str) -> Result<Value, DownloadError> {
        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(DownloadError::BrowserError)?;
        let result = self.page.evaluate_expression(params).await?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn cookies(&self) -> Result<Vec<SessionCookie>, DownloadError> {
        Ok(self
            .page
            .get_cookies()
            .await?
            .into_iter()
            .map(|cookie| SessionCookie {
                name: cookie.name,
                value: cookie.value,
                domain: cookie.domain,
            })
            .collect())
    }

    async fn take_network_log(&self) -> Result<Vec<String>, DownloadError> {
        let mut urls = self
            .responses
            .lock()
            .map_err(|_| DownloadError::BrowserError(String::from("network log listener panicked")))?;
        Ok(std::mem::take(&mut *urls))
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<(), DownloadError> {
        let element = self.page.find_element(selector).await?;
        element.click().await?;
        element.type_str(text).await?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), DownloadError> {
        let ChromiumSession {
            mut browser,
            page,
            handler,
            listener,
            ..
        } = *self;

        listener.abort();
        if let Err(e) = page.close().await {
            debug!("tab did not close cleanly: {}", e);
        }
        let closed = browser.close().await;
        if let Err(e) = browser.wait().await {
            warn!("browser process did not exit cleanly: {}", e);
        }
        handler.abort();
        closed?;
        Ok(())
    }
}
