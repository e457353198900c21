use async_trait::async_trait;
use log::debug;
use tokio::time::sleep;

use super::{SiteAdapter, chapter_from_link, read_title};
use crate::catalog::{CatalogAccumulator, ChapterRef, WorkCatalog};
use crate::config::Timing;
use crate::error::DownloadError;
use crate::progress;
use crate::resolver::{self, AssetList, Resolution, Transfer, join_url};
use crate::session::{self, AcquisitionSession, Condition, SessionRequirement};

const TITLE: &str = "div.post-title h1";
const CHAPTER_LIST: &str = "div.listing-chapters_wrap ul.version-chap";
const SHOW_MORE: &str = "span.chapter-readmore";
const CHAPTER_LINKS: &str = "div.listing-chapters_wrap ul.version-chap li.wp-manga-chapter a";
const READER_LINK: &str = "div.reading-content a";
const PLAYER: &str = "div#player";
const PAGES: &str = "div#player img";

/// The chapter page only links to a separate player page holding the images.
pub struct Loverstoon {
    timing: Timing,
}

impl Loverstoon {
    pub fn new(timing: Timing) -> Self {
        Self { timing }
    }
}

#[async_trait]
impl SiteAdapter for Loverstoon {
    fn name(&self) -> &'static str {
        "Loverstoon"
    }

    fn domains(&self) -> &'static [&'static str] {
        &["loverstoon.com"]
    }

    fn requirement(&self) -> SessionRequirement {
        SessionRequirement::Rendering { headless: false }
    }

    async fn fetch_catalog(
        &self,
        work_url: &str,
        session: &mut AcquisitionSession,
    ) -> Result<WorkCatalog, DownloadError> {
        let browser = session.browser()?;
        let spinner = progress::spinner("Opening the work page...");
        browser.navigate(work_url).await?;
        let title = read_title(browser, TITLE, Condition::Present, &self.timing, "").await;
        let listed = session::require(browser, CHAPTER_LIST, Condition::Visible, self.timing.page_timeout).await;
        spinner.finish_and_clear();
        let title = title?;
        listed?;

        // One click reveals the whole list
        if session::wait_for(browser, SHOW_MORE, Condition::Clickable, self.timing.growth_timeout).await? {
            match browser.click(SHOW_MORE).await {
                Ok(()) => sleep(self.timing.settle).await,
                Err(e) => debug!("could not expand the chapter list: {}", e),
            }
        }

        let mut catalog = CatalogAccumulator::new();
        for link in browser.snapshot(CHAPTER_LINKS).await? {
            if let Some(chapter) = chapter_from_link(&link, &link.text, work_url, None) {
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

        session::require(browser, READER_LINK, Condition::Present, self.timing.page_timeout).await?;
        let player_url = browser
            .attribute_values(READER_LINK, "href")
            .await?
            .into_iter()
            .flatten()
            .map(|href| join_url(&chapter.url, &href))
            .find(|href| !href.is_empty())
            .ok_or_else(|| DownloadError::ElementNotFound(format!("{} has no href", READER_LINK)))?;

        debug!("following reader link to {}", player_url);
        browser.navigate(&player_url).await?;
        session::require(browser, PLAYER, Condition::Present, self.timing.page_timeout).await?;
        sleep(self.timing.settle).await;

        let referer = browser.current_url().await?;
        let assets = resolver::collect_images(browser, PAGES, &["src", "data-src"], &referer).await?;
        Ok(Resolution::Assets(AssetList {
            assets,
            transfer: Transfer::Http {
                referer: Some(referer),
                forward_cookies: true,
            },
            name_width: 2,
        }))
    }
}
