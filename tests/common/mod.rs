//! Scripted stand-in for the browser, shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;

use manga_harvester::config::{Settings, Timing};
use manga_harvester::dom;
use manga_harvester::error::DownloadError;
use manga_harvester::session::{AcquisitionSession, Condition, HttpSession, RenderSession, SessionCookie, SessionFlags};

#[derive(Default)]
struct FakeState {
    pages: HashMap<String, String>,
    redirects: HashMap<String, String>,
    current_url: String,
    html: String,
    clicks: HashMap<String, VecDeque<String>>,
    click_targets: HashMap<String, String>,
    traffic: HashMap<String, Vec<String>>,
    network_log: Vec<String>,
    fetches: HashMap<String, Value>,
    cookies: Vec<SessionCookie>,
    hidden: HashSet<String>,
    heights: VecDeque<f64>,
    scrolls: Vec<String>,
    navigations: Vec<String>,
    clicked: Vec<String>,
    typed: Vec<(String, String)>,
    closed: bool,
}

/// A page-per-URL browser. Clicking a selector swaps the page for the next
/// HTML queued for that selector; script fetches answer from a URL table.
#[derive(Clone, Default)]
pub struct FakeBrowser {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, html: &str) -> Self {
        self.state.lock().unwrap().pages.insert(url.to_string(), html.to_string());
        self
    }

    /// The first navigation to `from` lands on `to`.
    pub fn redirect(self, from: &str, to: &str) -> Self {
        self.state.lock().unwrap().redirects.insert(from.to_string(), to.to_string());
        self
    }

    /// The next click on `selector` replaces the current page with `html`.
    pub fn on_click(self, selector: &str, html: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .clicks
            .entry(selector.to_string())
            .or_default()
            .push_back(html.to_string());
        self
    }

    /// Clicking `selector` navigates to `url`.
    pub fn click_navigates(self, selector: &str, url: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .click_targets
            .insert(selector.to_string(), url.to_string());
        self
    }

    /// Responses logged while loading `url`.
    pub fn traffic(self, url: &str, responses: &[&str]) -> Self {
        self.state
            .lock()
            .unwrap()
            .traffic
            .insert(url.to_string(), responses.iter().map(|r| r.to_string()).collect());
        self
    }

    /// A script fetch of `url` resolves to an image data URL of `bytes`.
    pub fn image(self, url: &str, bytes: &[u8]) -> Self {
        let data_url = format!("data:image/jpeg;base64,{}", STANDARD.encode(bytes));
        self.fetch(url, Value::String(data_url))
    }

    pub fn fetch(self, url: &str, value: Value) -> Self {
        self.state.lock().unwrap().fetches.insert(url.to_string(), value);
        self
    }

    pub fn cookie(self, name: &str, value: &str, domain: &str) -> Self {
        self.state.lock().unwrap().cookies.push(SessionCookie {
            name: name.to_string(),
            value: value.to_string(),
            domain: domain.to_string(),
        });
        self
    }

    /// `selector` is in the DOM but never becomes visible.
    pub fn hidden(self, selector: &str) -> Self {
        self.state.lock().unwrap().hidden.insert(selector.to_string());
        self
    }

    /// Successive reads of `document.body.scrollHeight`; the last one repeats.
    pub fn growing_page(self, heights: &[f64]) -> Self {
        self.state.lock().unwrap().heights = heights.iter().copied().collect();
        self
    }

    /// Every `window.scrollTo` script evaluated, in order.
    pub fn scrolls(&self) -> Vec<String> {
        self.state.lock().unwrap().scrolls.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn clicked(&self) -> Vec<String> {
        self.state.lock().unwrap().clicked.clone()
    }

    pub fn typed(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().typed.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    fn matches(&self, selector: &str) -> Result<usize, DownloadError> {
        let html = self.state.lock().unwrap().html.clone();
        Ok(dom::snapshot(&html, selector)?.len())
    }
}

/// The URL a script fetch was asked for, read back out of the script.
fn fetched_url(script: &str) -> Option<String> {
    let start = script.find("fetch(")? + "fetch(".len();
    let end = start + script[start..].find(')')?;
    serde_json::from_str::<String>(&script[start..end]).ok()
}

#[async_trait]
impl RenderSession for FakeBrowser {
    async fn navigate(&self, url: &str) -> Result<(), DownloadError> {
        let mut state = self.state.lock().unwrap();
        state.navigations.push(url.to_string());
        let target = state.redirects.remove(url).unwrap_or_else(|| url.to_string());
        let html = state
            .pages
            .get(&target)
            .cloned()
            .ok_or_else(|| DownloadError::BrowserError(format!("no page scripted for {}", target)))?;
        if let Some(traffic) = state.traffic.get(url).cloned() {
            state.network_log.extend(traffic);
        }
        state.current_url = target;
        state.html = html;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, DownloadError> {
        Ok(self.state.lock().unwrap().current_url.clone())
    }

    async fn content(&self) -> Result<String, DownloadError> {
        Ok(self.state.lock().unwrap().html.clone())
    }

    async fn evaluate(&self, script: &str) -> Result<Value, DownloadError> {
        if script.contains("FileReader") {
            let url = fetched_url(script).unwrap_or_default();
            return Ok(self.state.lock().unwrap().fetches.get(&url).cloned().unwrap_or(Value::Null));
        }
        if script.trim() == "window.screen.height" {
            return Ok(Value::from(1000));
        }
        if script.trim() == "document.body.scrollHeight" {
            let mut state = self.state.lock().unwrap();
            let height = if state.heights.len() > 1 {
                state.heights.pop_front()
            } else {
                state.heights.front().copied()
            };
            return Ok(Value::from(height.unwrap_or(800.0)));
        }
        if script.starts_with("window.scrollTo") {
            self.state.lock().unwrap().scrolls.push(script.to_string());
        }
        Ok(Value::Null)
    }

    async fn cookies(&self) -> Result<Vec<SessionCookie>, DownloadError> {
        Ok(self.state.lock().unwrap().cookies.clone())
    }

    async fn take_network_log(&self) -> Result<Vec<String>, DownloadError> {
        Ok(std::mem::take(&mut self.state.lock().unwrap().network_log))
    }

    async fn close(self: Box<Self>) -> Result<(), DownloadError> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }

    async fn probe(&self, selector: &str) -> Result<Option<Condition>, DownloadError> {
        if self.matches(selector)? == 0 {
            return Ok(None);
        }
        if self.state.lock().unwrap().hidden.contains(selector) {
            return Ok(Some(Condition::Present));
        }
        Ok(Some(Condition::Clickable))
    }

    async fn count(&self, selector: &str) -> Result<usize, DownloadError> {
        self.matches(selector)
    }

    async fn click(&self, selector: &str) -> Result<(), DownloadError> {
        if self.matches(selector)? == 0 {
            return Err(DownloadError::ElementNotFound(selector.to_string()));
        }
        let mut state = self.state.lock().unwrap();
        state.clicked.push(selector.to_string());
        let next = state.clicks.get_mut(selector).and_then(|queue| queue.pop_front());
        if let Some(html) = next {
            state.html = html;
        }
        if let Some(url) = state.click_targets.get(selector).cloned() {
            if let Some(html) = state.pages.get(&url).cloned() {
                state.html = html;
            }
            state.current_url = url;
        }
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<(), DownloadError> {
        if self.matches(selector)? == 0 {
            return Err(DownloadError::ElementNotFound(selector.to_string()));
        }
        self.state
            .lock()
            .unwrap()
            .typed
            .push((selector.to_string(), text.to_string()));
        Ok(())
    }
}

/// Settings with every pause and timeout shrunk for tests.
pub fn test_settings(output_dir: &std::path::Path) -> Settings {
    Settings {
        output_dir: output_dir.to_path_buf(),
        timing: Timing::instant(),
        ..Settings::default()
    }
}

pub fn http_session() -> AcquisitionSession {
    let http = HttpSession::new(&[], Duration::from_secs(5)).unwrap();
    AcquisitionSession::new(http, None, SessionFlags::default())
}

pub fn browser_session(browser: &FakeBrowser) -> AcquisitionSession {
    let http = HttpSession::new(&[], Duration::from_secs(5)).unwrap();
    AcquisitionSession::new(http, Some(Box::new(browser.clone())), SessionFlags::default())
}
