//! Work catalogs: chapter numbering, de-duplication, ordering and range selection.

use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

use log::{debug, info};
use regex::Regex;

use crate::config::Timing;
use crate::error::DownloadError;
use crate::session::{self, Condition, RenderSession};

/// Upper bound on "load more" clicks, in case a listing never stops growing.
const MAX_LOAD_MORE_CLICKS: usize = 500;

fn re_chapter_number() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)").unwrap())
}

/// A possibly fractional chapter number (5, 5.1, 12.5).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct ChapterNumber(f64);

impl ChapterNumber {
    /// `None` for negative or non-finite values.
    pub fn new(value: f64) -> Option<Self> {
        if value.is_finite() && value >= 0.0 {
            Some(Self(value))
        } else {
            None
        }
    }

    /// First number found in `text` ("Capítulo 12.5 - Fim" gives 12.5).
    pub fn parse(text: &str) -> Option<Self> {
        Self::parse_with(text, re_chapter_number())
    }

    /// First capture group of `pattern` in `text`, read as a number.
    pub fn parse_with(text: &str, pattern: &Regex) -> Option<Self> {
        let captures = pattern.captures(text)?;
        let raw = captures.get(1).or_else(|| captures.get(0))?;
        raw.as_str().parse::<f64>().ok().and_then(Self::new)
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Shortest decimal form: "7", "7.5".
    pub fn plain(self) -> String {
        format!("{}", self.0)
    }

    /// Destination folder name: "Chapter 07", "Chapter 07.5".
    pub fn folder_name(self) -> String {
        let plain = self.plain();
        match plain.split_once('.') {
            Some((integer, fraction)) => format!("Chapter {:0>2}.{}", integer, fraction),
            None => format!("Chapter {:0>2}", plain),
        }
    }

    fn key(self) -> u64 {
        // 0.0 and -0.0 must collide
        (self.0 + 0.0).to_bits()
    }
}

impl fmt::Display for ChapterNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One chapter entry of a work's listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterRef {
    pub number: ChapterNumber,
    /// Reader page URL; API-backed sites still fill in the public chapter URL.
    pub url: String,
    /// Numeric id used by API-backed sites.
    pub id: Option<u64>,
    /// Parent work id, when the site needs it to build asset URLs.
    pub work_id: Option<String>,
    /// False when the listing marks the chapter as locked.
    pub available: bool,
}

impl ChapterRef {
    pub fn new(number: ChapterNumber, url: impl Into<String>) -> Self {
        Self {
            number,
            url: url.into(),
            id: None,
            work_id: None,
            available: true,
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_work_id(mut self, work_id: impl Into<String>) -> Self {
        self.work_id = Some(work_id.into());
        self
    }

    pub fn with_availability(mut self, available: bool) -> Self {
        self.available = available;
        self
    }
}

/// A work's name and its chapters in ascending, unique number order.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkCatalog {
    pub name: String,
    chapters: Vec<ChapterRef>,
}

impl WorkCatalog {
    pub fn chapters(&self) -> &[ChapterRef] {
        &self.chapters
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }
}

/// Collects chapter entries as a listing is read, newest first, dropping
/// numbers already seen (paginated listings repeat entries across pages).
#[derive(Debug, Default)]
pub struct CatalogAccumulator {
    seen: HashSet<u64>,
    listing: Vec<ChapterRef>,
}

impl CatalogAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the number was already collected.
    pub fn push(&mut self, chapter: ChapterRef) -> bool {
        if !self.seen.insert(chapter.number.key()) {
            return false;
        }
        self.listing.push(chapter);
        true
    }

    /// Pushes one page of a listing; returns how many entries were new.
    pub fn push_page(&mut self, page: impl IntoIterator<Item = ChapterRef>) -> usize {
        let mut added = 0;
        for chapter in page {
            if self.push(chapter) {
                added += 1;
            }
        }
        added
    }

    pub fn len(&self) -> usize {
        self.listing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listing.is_empty()
    }

    /// Reverses the newest-first listing into ascending order.
    ///
    /// The stable sort afterwards only matters for listings that were not
    /// strictly newest-first to begin with.
    pub fn finish(mut self, name: impl Into<String>) -> Result<WorkCatalog, DownloadError> {
        let name = name.into();
        if self.listing.is_empty() {
            return Err(DownloadError::CatalogUnavailable(format!("no chapters found for '{}'", name)));
        }
        self.listing.reverse();
        self.listing
            .sort_by(|a, b| a.number.value().total_cmp(&b.number.value()));
        info!("Catalog for '{}' has {} chapters", name, self.listing.len());
        Ok(WorkCatalog {
            name,
            chapters: self.listing,
        })
    }
}

/// How the upper bound of a chapter range is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum RangePolicy {
    /// `start <= n <= end`
    #[default]
    Inclusive,
    /// `start <= n < end + 1`, so a range ending at 5 also takes 5.1 and 5.5.
    ThroughNextInteger,
}

impl RangePolicy {
    pub fn contains(self, number: ChapterNumber, start: f64, end: f64) -> bool {
        let n = number.value();
        match self {
            RangePolicy::Inclusive => start <= n && n <= end,
            RangePolicy::ThroughNextInteger => start <= n && n < end + 1.0,
        }
    }
}

/// Chapters of `catalog` whose numbers fall in `[start, end]` under `policy`.
pub fn select_range(catalog: &WorkCatalog, start: f64, end: f64, policy: RangePolicy) -> Vec<ChapterRef> {
    catalog
        .chapters()
        .iter()
        .filter(|chapter| policy.contains(chapter.number, start, end))
        .cloned()
        .collect()
}

/// Clicks a "load more" control until the number of `items` stops growing.
///
/// A missing control, a failed click, or no growth within
/// `timing.growth_timeout` all mean the listing is complete.
/// Returns the final item count.
pub async fn drain_load_more(
    session: &dyn RenderSession,
    trigger: &str,
    items: &str,
    timing: &Timing,
) -> Result<usize, DownloadError> {
    for clicks in 0..MAX_LOAD_MORE_CLICKS {
        if !session::wait_for(session, trigger, Condition::Present, timing.probe_timeout).await? {
            debug!("'{}' gone after {} clicks", trigger, clicks);
            break;
        }
        let before = session.count(items).await?;
        if let Err(e) = session.click(trigger).await {
            debug!("could not click '{}': {}", trigger, e);
            break;
        }
        println!("Loading more chapters... ({} so far)", before);
        if !session::wait_for_count_above(session, items, before, timing.growth_timeout).await? {
            debug!("no new chapters after clicking '{}'", trigger);
            break;
        }
    }
    session.count(items).await
}
