//! Acquisition sessions: the rendering browser and the plain HTTP client a
//! site adapter talks through, plus the bounded waits built on top of them.

pub mod chromium;
pub mod http;

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace, warn};
use serde_json::Value;
use tokio::time::{Instant, sleep};

use crate::config::Settings;
use crate::dom::{self, ElementSnapshot};
use crate::error::DownloadError;

pub use chromium::ChromiumSession;
pub use http::HttpSession;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// DOM condition a wait can require of the first element matching a selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Condition {
    Present = 1,
    Visible = 2,
    Clickable = 3,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Present => write!(f, "present"),
            Condition::Visible => write!(f, "visible"),
            Condition::Clickable => write!(f, "clickable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
}

/// A controllable rendering context (one browser tab).
///
/// Implementors provide the primitive operations; the element-level helpers
/// have default bodies expressed through `evaluate` and `content`.
#[async_trait]
pub trait RenderSession: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), DownloadError>;

    async fn current_url(&self) -> Result<String, DownloadError>;

    /// Serialized DOM of the current page, as rendered.
    async fn content(&self) -> Result<String, DownloadError>;

    /// Evaluates `script` and awaits its result if it is a promise.
    async fn evaluate(&self, script: &str) -> Result<Value, DownloadError>;

    async fn cookies(&self) -> Result<Vec<SessionCookie>, DownloadError>;

    /// URLs of every network response received since the previous call.
    async fn take_network_log(&self) -> Result<Vec<String>, DownloadError>;

    async fn close(self: Box<Self>) -> Result<(), DownloadError>;

    /// Highest condition the first element matching `selector` satisfies.
    async fn probe(&self, selector: &str) -> Result<Option<Condition>, DownloadError> {
        let level = self.evaluate(&probe_script(selector)).await?.as_u64().unwrap_or(0);
        Ok(match level {
            1 => Some(Condition::Present),
            2 => Some(Condition::Visible),
            3 => Some(Condition::Clickable),
            _ => None,
        })
    }

    async fn count(&self, selector: &str) -> Result<usize, DownloadError> {
        let script = format!("document.querySelectorAll({}).length", js_string(selector));
        Ok(self.evaluate(&script).await?.as_u64().unwrap_or(0) as usize)
    }

    /// Script-driven click on the first element matching `selector`.
    async fn click(&self, selector: &str) -> Result<(), DownloadError> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; el.click(); return true; }})()",
            js_string(selector)
        );
        match self.evaluate(&script).await?.as_bool() {
            Some(true) => Ok(()),
            _ => Err(DownloadError::ElementNotFound(selector.to_string())),
        }
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<(), DownloadError> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; el.focus(); el.value = {}; \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); el.dispatchEvent(new Event('change', {{ bubbles: true }})); return true; }})()",
            js_string(selector),
            js_string(text)
        );
        match self.evaluate(&script).await?.as_bool() {
            Some(true) => Ok(()),
            _ => Err(DownloadError::ElementNotFound(selector.to_string())),
        }
    }

    /// Snapshots of every element matching `selector` in the current DOM.
    async fn snapshot(&self, selector: &str) -> Result<Vec<ElementSnapshot>, DownloadError> {
        dom::snapshot(&self.content().await?, selector)
    }

    async fn attribute_values(&self, selector: &str, attribute: &str) -> Result<Vec<Option<String>>, DownloadError> {
        Ok(self
            .snapshot(selector)
            .await?
            .iter()
            .map(|element| element.attr(attribute).map(str::to_string))
            .collect())
    }

    async fn text_of(&self, selector: &str) -> Result<Option<String>, DownloadError> {
        dom::first_text(&self.content().await?, selector)
    }
}

/// Quotes `value` as a JavaScript string literal.
pub fn js_string(value: &str) -> String {
    Value::from(value).to_string()
}

fn probe_script(selector: &str) -> String {
    format!(
        r#"(() => {{
    const el = document.querySelector({});
    if (!el) return 0;
    const style = window.getComputedStyle(el);
    const rect = el.getBoundingClientRect();
    if (style.display === 'none' || style.visibility === 'hidden' || (rect.width === 0 && rect.height === 0)) return 1;
    if (el.disabled || style.pointerEvents === 'none') return 2;
    return 3;
}})()"#,
        js_string(selector)
    )
}

/// Polls until the first element matching `selector` satisfies `condition`.
///
/// Returns `Ok(false)` when `timeout` elapses; probe errors during the wait
/// (a page mid-navigation, say) count as "not yet".
pub async fn wait_for(
    session: &dyn RenderSession,
    selector: &str,
    condition: Condition,
    timeout: Duration,
) -> Result<bool, DownloadError> {
    let deadline = Instant::now() + timeout;
    loop {
        match session.probe(selector).await {
            Ok(Some(state)) if state >= condition => return Ok(true),
            Ok(_) => {}
            Err(e) => trace!("probe of {} failed: {}", selector, e),
        }
        if Instant::now() >= deadline {
            debug!("{} not {} within {:?}", selector, condition, timeout);
            return Ok(false);
        }
        sleep(POLL_INTERVAL.min(timeout)).await;
    }
}

/// Like [`wait_for`], but a timeout is an error.
pub async fn require(
    session: &dyn RenderSession,
    selector: &str,
    condition: Condition,
    timeout: Duration,
) -> Result<(), DownloadError> {
    if wait_for(session, selector, condition, timeout).await? {
        Ok(())
    } else {
        Err(DownloadError::Timeout(format!(
            "{} was not {} after {:.1}s",
            selector,
            condition,
            timeout.as_secs_f64()
        )))
    }
}

/// Polls until more than `previous` elements match `selector`.
pub async fn wait_for_count_above(
    session: &dyn RenderSession,
    selector: &str,
    previous: usize,
    timeout: Duration,
) -> Result<bool, DownloadError> {
    let deadline = Instant::now() + timeout;
    loop {
        if session.count(selector).await.unwrap_or(0) > previous {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        sleep(POLL_INTERVAL.min(timeout)).await;
    }
}

/// Polls until the current URL satisfies `accept`.
pub async fn wait_for_url<F>(session: &dyn RenderSession, accept: F, timeout: Duration) -> Result<bool, DownloadError>
where
    F: Fn(&str) -> bool + Send + Sync,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(url) = session.current_url().await {
            if accept(&url) {
                return Ok(true);
            }
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        sleep(POLL_INTERVAL.min(timeout)).await;
    }
}

/// Which kind of session a site needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRequirement {
    Http,
    Rendering { headless: bool },
}

/// Lifetime of an adapter's one-time flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagScope {
    /// Flags start cleared for every work.
    PerWork,
    /// Flags survive from one work to the next for the whole run.
    PerProcess,
}

/// One-time actions already performed in this session (a login, a reader
/// mode switch), keyed by adapter-defined names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionFlags {
    set: HashSet<&'static str>,
}

impl SessionFlags {
    pub fn is_set(&self, flag: &'static str) -> bool {
        self.set.contains(flag)
    }

    pub fn set(&mut self, flag: &'static str) {
        self.set.insert(flag);
    }

    pub fn clear(&mut self, flag: &'static str) {
        self.set.remove(flag);
    }
}

/// Everything an adapter uses to reach its site during one work.
pub struct AcquisitionSession {
    http: HttpSession,
    browser: Option<Box<dyn RenderSession>>,
    pub flags: SessionFlags,
}

impl AcquisitionSession {
    pub fn new(http: HttpSession, browser: Option<Box<dyn RenderSession>>, flags: SessionFlags) -> Self {
        Self { http, browser, flags }
    }

    /// Builds the HTTP client and, when required, launches the browser.
    pub async fn acquire(
        requirement: SessionRequirement,
        headers: &[(&str, &str)],
        settings: &Settings,
        flags: SessionFlags,
    ) -> Result<Self, DownloadError> {
        let http = HttpSession::new(headers, settings.timing.request_timeout)?;
        let browser: Option<Box<dyn RenderSession>> = match requirement {
            SessionRequirement::Http => None,
            SessionRequirement::Rendering { headless } => {
                let headless = headless || settings.browser.force_headless;
                println!("Starting the browser ({})", if headless { "headless" } else { "visible window" });
                let session = ChromiumSession::launch(headless, &settings.browser, settings.timing.page_timeout).await?;
                Some(Box::new(session))
            }
        };
        Ok(Self::new(http, browser, flags))
    }

    pub fn http(&self) -> &HttpSession {
        &self.http
    }

    pub fn browser(&self) -> Result<&dyn RenderSession, DownloadError> {
        self.browser
            .as_deref()
            .ok_or_else(|| DownloadError::SessionUnavailable(String::from("this site needs a browser session")))
    }

    /// The browser together with the flags, for adapters that record a
    /// one-time action while driving the page.
    pub fn browser_and_flags(&mut self) -> Result<(&dyn RenderSession, &mut SessionFlags), DownloadError> {
        let browser = self
            .browser
            .as_deref()
            .ok_or_else(|| DownloadError::SessionUnavailable(String::from("this site needs a browser session")))?;
        Ok((browser, &mut self.flags))
    }

    /// Closes the browser, if any, and hands back the flags.
    pub async fn release(self) -> SessionFlags {
        if let Some(browser) = self.browser {
            println!("Closing the browser...");
            if let Err(e) = browser.close().await {
                warn!("browser did not shut down cleanly: {}", e);
            }
        }
        self.flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_string_escapes_quotes() {
        assert_eq!(js_string(r#"a[href*="/chapter/"]"#), r#""a[href*=\"/chapter/\"]""#);
    }

    #[test]
    fn test_condition_ordering() {
        assert!(Condition::Clickable > Condition::Visible);
        assert!(Condition::Visible > Condition::Present);
    }

    #[test]
    fn test_session_flags() {
        let mut flags = SessionFlags::default();
        assert!(!flags.is_set("reader.scroll"));
        flags.set("reader.scroll");
        assert!(flags.is_set("reader.scroll"));
        flags.clear("reader.scroll");
        assert!(!flags.is_set("reader.scroll"));
    }
}
