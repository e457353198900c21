//! Asset resolution: turning an API payload, a rendered page or a network log
//! into the ordered list of image locations of one chapter.

use std::cmp::Ordering;
use std::collections::HashSet;

use log::{debug, trace};
use serde::Deserialize;
use tokio::time::sleep;
use url::Url;

use crate::config::Timing;
use crate::error::DownloadError;
use crate::session::{self, Condition, RenderSession};

pub const FALLBACK_EXTENSION: &str = ".jpg";

/// Extensions accepted when reading one from a URL.
const KNOWN_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "avif", "bmp"];

/// One image of a chapter, in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRef {
    /// 1-based position within the chapter.
    pub index: u32,
    /// Absolute URL; empty when the page exposed no usable source.
    pub source: String,
    /// Extension with its leading dot.
    pub extension: String,
}

impl AssetRef {
    pub fn file_name(&self, width: usize) -> String {
        format!("{:0width$}{}", self.index, self.extension, width = width)
    }
}

/// How resolved bytes leave the site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transfer {
    /// Plain streamed GET, optionally dressed as the browser tab.
    Http { referer: Option<String>, forward_cookies: bool },
    /// Same-origin fetch run inside the rendering session.
    Script,
}

impl Transfer {
    pub fn plain() -> Self {
        Transfer::Http {
            referer: None,
            forward_cookies: false,
        }
    }
}

/// Assets whose total is known up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetList {
    pub assets: Vec<AssetRef>,
    pub transfer: Transfer,
    /// Zero padding of saved file names.
    pub name_width: usize,
}

/// A candidate file name shape for sequential inference, e.g. `{:02}.jpg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFormat {
    pub width: usize,
    pub extension: String,
}

impl CandidateFormat {
    pub fn new(width: usize, extension: &str) -> Self {
        Self {
            width,
            extension: extension.to_string(),
        }
    }

    pub fn file_name(&self, index: u32) -> String {
        format!("{:0width$}{}", index, self.extension, width = self.width)
    }
}

/// How inference checks that a guessed URL exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    /// Plain GET answering 200.
    Http,
    /// Script fetch inside the session returning an image payload.
    Script,
}

/// A URL template to walk when the number of assets is unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencePlan {
    /// Everything before the file name, ending in '/'.
    pub base_url: String,
    /// Tried in order for every index.
    pub formats: Vec<CandidateFormat>,
    pub start_index: u32,
    pub name_width: usize,
    pub probe: ProbeKind,
}

impl SequencePlan {
    pub fn candidate_url(&self, index: u32, format: &CandidateFormat) -> String {
        format!("{}{}", self.base_url, format.file_name(index))
    }

    /// Saved file name: 1-based position padded to `name_width`.
    pub fn saved_name(&self, index: u32, format: &CandidateFormat) -> String {
        let position = index.saturating_sub(self.start_index) + 1;
        format!("{:0width$}{}", position, format.extension, width = self.name_width)
    }
}

/// What an adapter hands the chapter downloader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Assets(AssetList),
    Sequence(SequencePlan),
}

/// Extension of the file named by `url`, ignoring query and fragment.
pub fn infer_extension(url: &str, fallback: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let file = path.rsplit('/').next().unwrap_or_default();
    match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && KNOWN_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) => {
            format!(".{}", ext.to_ascii_lowercase())
        }
        _ => fallback.to_string(),
    }
}

/// Numbers `sources` 1..n in order, inferring each extension.
pub fn assets_from_sources<I>(sources: I, fallback_extension: &str) -> Vec<AssetRef>
where
    I: IntoIterator<Item = Option<String>>,
{
    sources
        .into_iter()
        .enumerate()
        .map(|(i, source)| {
            let source = source.map(|s| s.trim().to_string()).unwrap_or_default();
            let extension = if source.is_empty() {
                fallback_extension.to_string()
            } else {
                infer_extension(&source, fallback_extension)
            };
            AssetRef {
                index: i as u32 + 1,
                source,
                extension,
            }
        })
        .collect()
}

/// Resolves `reference` against `base`; absolute references pass through.
pub fn join_url(base: &str, reference: &str) -> String {
    let reference = reference.trim();
    if reference.is_empty() {
        return String::new();
    }
    match Url::parse(base).and_then(|b| b.join(reference)) {
        Ok(joined) => joined.to_string(),
        Err(_) => reference.to_string(),
    }
}

/// Collapses repeated slashes in the path part of a URL.
pub fn collapse_slashes(url: &str) -> String {
    let (scheme, rest) = match url.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, url),
    };
    let mut collapsed = String::with_capacity(rest.len());
    let mut previous_slash = false;
    for c in rest.chars() {
        if c == '/' && previous_slash {
            continue;
        }
        previous_slash = c == '/';
        collapsed.push(c);
    }
    match scheme {
        Some(scheme) => format!("{}://{}", scheme, collapsed),
        None => collapsed,
    }
}

/// One page entry of a chapter API response.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct PayloadPage {
    #[serde(default)]
    pub src: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

/// Asset URL for one API page entry.
///
/// Old payloads carry an absolute upload path in `src`; newer ones carry a
/// bare file name in `src` and its directory in `path`. Entries missing the
/// fields their shape needs yield `None`.
pub fn payload_asset_url(cdn: &str, page: &PayloadPage) -> Option<String> {
    let src = page.src.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
    let url = if src.starts_with('/') {
        format!("{}/wp-content/uploads/WP-manga/data{}", cdn, src)
    } else {
        let path = page.path.as_deref().map(str::trim).filter(|p| !p.is_empty())?;
        format!("{}{}/{}", cdn, path, src)
    };
    Some(collapse_slashes(&url))
}

/// Keeps log entries containing `marker`, de-duplicated and naturally ordered.
pub fn mine_network_log(urls: &[String], marker: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut found: Vec<String> = urls
        .iter()
        .filter(|url| url.contains(marker))
        .filter(|url| seen.insert(url.as_str()))
        .cloned()
        .collect();
    found.sort_by(|a, b| natural_cmp(a, b));
    debug!("{} of {} logged responses matched '{}'", found.len(), urls.len(), marker);
    found
}

/// Numeric-aware string ordering: "2.jpg" < "10.jpg".
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();
    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let l_run = take_digits(&mut left);
                let r_run = take_digits(&mut right);
                let l_trimmed = l_run.trim_start_matches('0');
                let r_trimmed = r_run.trim_start_matches('0');
                let ordering = l_trimmed
                    .len()
                    .cmp(&r_trimmed.len())
                    .then_with(|| l_trimmed.cmp(r_trimmed))
                    .then_with(|| l_run.len().cmp(&r_run.len()));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(l), Some(r)) => {
                if l != r {
                    return l.cmp(&r);
                }
                left.next();
                right.next();
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        run.push(c);
        chars.next();
    }
    run
}

/// Template recovered from one observed asset URL such as
/// `https://host/imagens/ab12/001.jpg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceSeed {
    pub base_url: String,
    /// Digits in the sample's file name; guessed names use the same padding.
    pub width: usize,
    pub extension: String,
}

impl SequenceSeed {
    /// `None` unless the last path segment is `<digits>.<ext>`.
    pub fn from_sample(url: &str) -> Option<Self> {
        let clean = url.split(['?', '#']).next()?;
        let (base, file) = clean.rsplit_once('/')?;
        let (stem, ext) = file.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() || !stem.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        Some(Self {
            base_url: format!("{}/", base),
            width: stem.len(),
            extension: format!(".{}", ext),
        })
    }

    /// Plan probing from index 1 with the sample's own shape.
    pub fn into_plan(self, probe: ProbeKind) -> SequencePlan {
        SequencePlan {
            base_url: self.base_url,
            formats: vec![CandidateFormat::new(self.width, &self.extension)],
            start_index: 1,
            name_width: self.width,
            probe,
        }
    }
}

/// How a progressive scroll drain decides the page is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollMode {
    /// Step one screen height at a time until the offset passes the document height.
    ByViewport,
    /// Jump to the bottom until the document height stops changing.
    ToBottom,
}

/// Upper bound on scroll steps for one page.
pub const MAX_SCROLL_STEPS: u32 = 400;

async fn number_of(session: &dyn RenderSession, script: &str) -> Result<f64, DownloadError> {
    Ok(session.evaluate(script).await?.as_f64().unwrap_or(0.0))
}

/// Scrolls until lazily loaded content stops appearing; returns the steps taken.
pub async fn drain_scroll(session: &dyn RenderSession, mode: ScrollMode, timing: &Timing) -> Result<u32, DownloadError> {
    let mut steps = 0;
    match mode {
        ScrollMode::ByViewport => {
            let mut screen = number_of(session, "window.screen.height").await?;
            if screen <= 0.0 {
                screen = 1080.0;
            }
            while steps < MAX_SCROLL_STEPS {
                steps += 1;
                let offset = screen * f64::from(steps);
                session.evaluate(&format!("window.scrollTo(0, {})", offset)).await?;
                sleep(timing.scroll_pause).await;
                let height = number_of(session, "document.body.scrollHeight").await?;
                trace!("scrolled to {} of {}", offset, height);
                if offset > height {
                    break;
                }
            }
        }
        ScrollMode::ToBottom => {
            let mut last = number_of(session, "document.body.scrollHeight").await?;
            while steps < MAX_SCROLL_STEPS {
                steps += 1;
                session
                    .evaluate("window.scrollTo(0, document.body.scrollHeight)")
                    .await?;
                sleep(timing.scroll_pause).await;
                let height = number_of(session, "document.body.scrollHeight").await?;
                trace!("page height {} -> {}", last, height);
                if height == last {
                    break;
                }
                last = height;
            }
        }
    }
    debug!("scroll drain finished after {} steps", steps);
    Ok(steps)
}

/// Static DOM scrape: waits for `container` to be visible, then reads the
/// first non-blank attribute of `attributes` on every `images` match.
///
/// Relative sources are joined against `base`. Elements without any source
/// are kept as assets with an empty `source` so they count as failures.
pub async fn scrape_images(
    session: &dyn RenderSession,
    container: &str,
    images: &str,
    attributes: &[&str],
    base: &str,
    timing: &Timing,
) -> Result<Vec<AssetRef>, DownloadError> {
    session::require(session, container, Condition::Visible, timing.page_timeout).await?;
    sleep(timing.settle).await;
    collect_images(session, images, attributes, base).await
}

/// DOM scrape without the visibility wait, for pages already drained.
pub async fn collect_images(
    session: &dyn RenderSession,
    images: &str,
    attributes: &[&str],
    base: &str,
) -> Result<Vec<AssetRef>, DownloadError> {
    let sources = session
        .snapshot(images)
        .await?
        .iter()
        .map(|element| element.first_attr(attributes).map(|src| join_url(base, src)))
        .collect::<Vec<_>>();
    debug!("{} image elements matched '{}'", sources.len(), images);
    Ok(assets_from_sources(sources, FALLBACK_EXTENSION))
}
