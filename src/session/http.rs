use std::time::Duration;

use log::trace;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, COOKIE, HeaderMap, HeaderName, HeaderValue, REFERER, USER_AGENT};
use reqwest::redirect::Policy;
use serde::de::DeserializeOwned;

use super::SessionCookie;
use crate::error::DownloadError;

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/140.0.0.0 Safari/537.36";

/// Plain HTTP client context with a site's fixed headers baked in.
#[derive(Debug, Clone)]
pub struct HttpSession {
    client: reqwest::Client,
    /// Same headers, but redirects are answers rather than detours.
    probe_client: reqwest::Client,
}

impl HttpSession {
    pub fn new(headers: &[(&str, &str)], timeout: Duration) -> Result<Self, DownloadError> {
        let mut defaults = HeaderMap::new();
        defaults.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| DownloadError::ParsingError(format!("Invalid header name: {}", name)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| DownloadError::ParsingError(format!("Invalid value for header {}", name)))?;
            defaults.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(defaults.clone())
            .timeout(timeout)
            .build()?;
        let probe_client = reqwest::Client::builder()
            .default_headers(defaults)
            .timeout(timeout)
            .redirect(Policy::none())
            .build()?;
        Ok(Self { client, probe_client })
    }

    /// GET that fails on any non-2xx status.
    pub async fn get(&self, url: &str, extra: HeaderMap) -> Result<reqwest::Response, DownloadError> {
        trace!("GET {}", url);
        let response = self.client.get(url).headers(extra).send().await?;
        Ok(response.error_for_status()?)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, DownloadError> {
        let response = self.get(url, HeaderMap::new()).await?;
        Ok(response.json::<T>().await?)
    }

    /// Body of `url` when it answers 200 itself, `None` for any other status,
    /// for a redirect, or for a text/markup placeholder served with 200.
    pub async fn probe(&self, url: &str) -> Result<Option<Vec<u8>>, DownloadError> {
        let response = self.probe_client.get(url).send().await?;
        if response.status() != StatusCode::OK {
            trace!("probe {} -> {}", url, response.status());
            return Ok(None);
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if is_markup(content_type) {
            trace!("probe {} -> 200 {}", url, content_type);
            return Ok(None);
        }
        Ok(Some(response.bytes().await?.to_vec()))
    }
}

/// Headers that make a plain GET look like it came from the browser tab:
/// the page as Referer and the cookies whose domain covers `url`.
pub fn transfer_headers(url: &str, referer: Option<&str>, cookies: &[SessionCookie]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(value) = referer.and_then(|r| HeaderValue::from_str(r).ok()) {
        headers.insert(REFERER, value);
    }

    let host = url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();
    let pairs = cookies
        .iter()
        .filter(|cookie| cookie_matches(&cookie.domain, &host))
        .map(|cookie| format!("{}={}", cookie.name, cookie.value))
        .collect::<Vec<_>>();
    if !pairs.is_empty() {
        if let Ok(value) = HeaderValue::from_str(&pairs.join("; ")) {
            headers.insert(COOKIE, value);
        }
    }
    headers
}

fn is_markup(content_type: &str) -> bool {
    let mime = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    mime.starts_with("text/") || mime.ends_with("json") || mime.ends_with("xml")
}

fn cookie_matches(domain: &str, host: &str) -> bool {
    let domain = domain.trim_start_matches('.');
    !domain.is_empty() && (host == domain || host.ends_with(&format!(".{}", domain)))
}
