use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use super::{SiteAdapter, chapter_from_link, read_title};
use crate::catalog::{CatalogAccumulator, ChapterRef, WorkCatalog};
use crate::config::Timing;
use crate::error::DownloadError;
use crate::progress;
use crate::resolver::{self, AssetList, Resolution, Transfer};
use crate::session::{self, AcquisitionSession, Condition, SessionRequirement};

const TITLE: &str = "h3.item-title a";
const CHAPTER_LINKS: &str = "a.visited.chapt";
const PAGES: &str = "div#viewer img.page-img";

fn re_chapter_label() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"(?i)(?:Capítulo|Chapter|Cap)\.?\s*(\d+(?:\.\d+)?)").unwrap())
}

pub struct Batoto {
    timing: Timing,
}

impl Batoto {
    pub fn new(timing: Timing) -> Self {
        Self { timing }
    }
}

#[async_trait]
impl SiteAdapter for Batoto {
    fn name(&self) -> &'static str {
        "Batoto"
    }

    fn domains(&self) -> &'static [&'static str] {
        &["bato.to"]
    }

    fn requirement(&self) -> SessionRequirement {
        SessionRequirement::Rendering { headless: true }
    }

    async fn fetch_catalog(
        &self,
        work_url: &str,
        session: &mut AcquisitionSession,
    ) -> Result<WorkCatalog, DownloadError> {
        let browser = session.browser()?;
        let spinner = progress::spinner("Opening the work page...");
        browser.navigate(work_url).await?;
        let title = read_title(browser, TITLE, Condition::Visible, &self.timing, "").await;
        let listed = session::require(browser, CHAPTER_LINKS, Condition::Present, self.timing.page_timeout).await;
        spinner.finish_and_clear();
        let title = title?;
        listed?;

        let mut catalog = CatalogAccumulator::new();
        for link in browser.snapshot(CHAPTER_LINKS).await? {
            if let Some(chapter) = chapter_from_link(&link, &link.text, work_url, Some(re_chapter_label())) {
                catalog.push(chapter);
            }
        }
        catalog.finish(title)
    }

    async fn resolve_chapter(
        &self,
        chapter: &ChapterRef,
        session: &mut AcquisitionSession,
    ) -> Result<Resolution, DownloadError> {
        let browser = session.browser()?;
        browser.navigate(&chapter.url).await?;
        let assets = resolver::scrape_images(browser, PAGES, PAGES, &["src", "data-src"], &chapter.url, &self.timing).await?;
        Ok(Resolution::Assets(AssetList {
            assets,
            transfer: Transfer::Http {
                referer: Some(chapter.url.clone()),
                forward_cookies: true,
            },
            name_width: 3,
        }))
    }
}
