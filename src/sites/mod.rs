//! Site strategy selection: a registry of adapters, each bound to a set of
//! domains and able to list a work's chapters and resolve a chapter's images.

pub mod batoto;
pub mod comick;
pub mod loverstoon;
pub mod mangalivre;
pub mod manhastro;
pub mod mediocretoons;
pub mod sakuramangas;
pub mod sussytoons;

use async_trait::async_trait;
use log::debug;
use regex::Regex;
use serde_json::Value;

use crate::catalog::{ChapterNumber, ChapterRef, WorkCatalog};
use crate::config::Timing;
use crate::dom::ElementSnapshot;
use crate::error::DownloadError;
use crate::resolver::{Resolution, join_url};
use crate::session::{self, AcquisitionSession, Condition, FlagScope, RenderSession, SessionRequirement};

pub use batoto::Batoto;
pub use comick::Comick;
pub use loverstoon::Loverstoon;
pub use mangalivre::MangaLivre;
pub use manhastro::Manhastro;
pub use mediocretoons::MediocreToons;
pub use sakuramangas::SakuraMangas;
pub use sussytoons::SussyToons;

/// The capability set every site exposes.
#[async_trait]
pub trait SiteAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Domain fragments that identify this site in a work URL.
    fn domains(&self) -> &'static [&'static str];

    fn matches(&self, url: &str) -> bool {
        self.domains().iter().any(|domain| url.contains(domain))
    }

    fn requirement(&self) -> SessionRequirement;

    /// Headers sent with every plain HTTP request to this site.
    fn default_headers(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }

    /// Whether one-time flags survive from one work to the next.
    fn flag_scope(&self) -> FlagScope {
        FlagScope::PerWork
    }

    async fn fetch_catalog(&self, work_url: &str, session: &mut AcquisitionSession)
    -> Result<WorkCatalog, DownloadError>;

    async fn resolve_chapter(
        &self,
        chapter: &ChapterRef,
        session: &mut AcquisitionSession,
    ) -> Result<Resolution, DownloadError>;
}

/// Ordered table of adapters; the first whose domains match a URL wins.
#[derive(Default)]
pub struct SiteRegistry {
    adapters: Vec<Box<dyn SiteAdapter>>,
}

impl SiteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every adapter this crate ships with.
    pub fn builtin(timing: Timing) -> Self {
        let mut registry = Self::new();
        registry.register(SussyToons::new());
        registry.register(MediocreToons::new());
        registry.register(MangaLivre::new(timing));
        registry.register(SakuraMangas::new(timing));
        registry.register(Manhastro::new(timing));
        registry.register(Loverstoon::new(timing));
        registry.register(Batoto::new(timing));
        registry.register(Comick::new(timing));
        registry
    }

    pub fn register(&mut self, adapter: impl SiteAdapter + 'static) -> &mut Self {
        self.adapters.push(Box::new(adapter));
        self
    }

    pub fn select(&self, url: &str) -> Result<&dyn SiteAdapter, DownloadError> {
        let url = url.trim();
        let adapter = self
            .adapters
            .iter()
            .find(|adapter| adapter.matches(url))
            .map(|adapter| adapter.as_ref())
            .ok_or_else(|| DownloadError::UnsupportedSite(url.to_string()))?;
        debug!("{} handled by {}", url, adapter.name());
        Ok(adapter)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|adapter| adapter.name()).collect()
    }
}

/// Waits for `selector` and returns its text, or `fallback` when it is blank.
pub(crate) async fn read_title(
    browser: &dyn RenderSession,
    selector: &str,
    condition: Condition,
    timing: &Timing,
    fallback: &str,
) -> Result<String, DownloadError> {
    session::require(browser, selector, condition, timing.page_timeout).await?;
    Ok(browser
        .text_of(selector)
        .await?
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| fallback.to_string()))
}

/// A listing link read as a chapter: the number comes from `label`, the
/// href is joined against `base`. Links without either are dropped.
pub(crate) fn chapter_from_link(
    link: &ElementSnapshot,
    label: &str,
    base: &str,
    pattern: Option<&Regex>,
) -> Option<ChapterRef> {
    let number = match pattern {
        Some(pattern) => ChapterNumber::parse_with(label, pattern),
        None => ChapterNumber::parse(label),
    }?;
    let href = join_url(base, link.attr("href")?);
    if href.is_empty() {
        return None;
    }
    Some(ChapterRef::new(number, href))
}

/// First capture of `pattern` in `url`, e.g. a numeric work id.
pub(crate) fn capture_id(url: &str, pattern: &Regex) -> Result<String, DownloadError> {
    pattern
        .captures(url)
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_string())
        .ok_or_else(|| DownloadError::ParsingError(format!("could not find the work id in {}", url)))
}

/// A JSON number, or a string holding one.
pub(crate) fn json_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A positive integer id, numeric or string-encoded.
pub(crate) fn json_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|id| *id > 0)
}

/// A boolean flag sent as `true`/`false`, `0`/`1` or a string of either.
/// Missing or unreadable values count as set.
pub(crate) fn json_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !matches!(s.trim(), "0" | "false"),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_number_accepts_strings() {
        assert_eq!(json_number(&json!(5.1)), Some(5.1));
        assert_eq!(json_number(&json!("12")), Some(12.0));
        assert_eq!(json_number(&json!(null)), None);
    }

    #[test]
    fn test_json_id_rejects_zero() {
        assert_eq!(json_id(&json!(42)), Some(42));
        assert_eq!(json_id(&json!("7")), Some(7));
        assert_eq!(json_id(&json!(0)), None);
    }

    #[test]
    fn test_json_flag_defaults_to_set() {
        assert!(json_flag(&json!(null)));
        assert!(json_flag(&json!(true)));
        assert!(json_flag(&json!(1)));
        assert!(!json_flag(&json!(false)));
        assert!(!json_flag(&json!(0)));
        assert!(!json_flag(&json!("false")));
    }

    #[test]
    fn test_chapter_from_link() {
        let link = ElementSnapshot {
            text: "Capítulo 7.5".into(),
            attributes: vec![("href".into(), "/manga/x/capitulo-7-5/".into())],
            inner_html: String::new(),
        };
        let chapter = chapter_from_link(&link, &link.text, "https://mangalivre.tv/manga/x/", None).unwrap();
        assert_eq!(chapter.number.value(), 7.5);
        assert_eq!(chapter.url, "https://mangalivre.tv/manga/x/capitulo-7-5/");

        let no_href = ElementSnapshot {
            text: "Capítulo 8".into(),
            ..ElementSnapshot::default()
        };
        assert!(chapter_from_link(&no_href, &no_href.text, "https://mangalivre.tv/", None).is_none());
        assert!(chapter_from_link(&link, "Extra", "https://mangalivre.tv/", None).is_none());
    }

    #[test]
    fn test_capture_id() {
        let pattern = Regex::new(r"/obra/(\d+)").unwrap();
        assert_eq!(capture_id("https://www.sussytoons.wtf/obra/1234/nome", &pattern).unwrap(), "1234");
        assert!(capture_id("https://www.sussytoons.wtf/", &pattern).is_err());
    }
}
