use async_trait::async_trait;
use log::debug;

use super::{SiteAdapter, chapter_from_link, read_title};
use crate::catalog::{CatalogAccumulator, ChapterRef, WorkCatalog};
use crate::config::Timing;
use crate::error::DownloadError;
use crate::progress;
use crate::resolver::{self, AssetList, Resolution, Transfer};
use crate::session::{self, AcquisitionSession, Condition, SessionRequirement};

const TITLE: &str = "div.post-title h1";
const CHAPTER_LIST: &str = "ul.version-chap";
const CHAPTER_LINKS: &str = "ul.version-chap a";
const PAGES: &str = "div.chapter-images img.wp-manga-chapter-img";

/// Madara-style reader; the chapter list ships with the page.
pub struct MangaLivre {
    timing: Timing,
}

impl MangaLivre {
    pub fn new(timing: Timing) -> Self {
        Self { timing }
    }
}

#[async_trait]
impl SiteAdapter for MangaLivre {
    fn name(&self) -> &'static str {
        "MangaLivre"
    }

    fn domains(&self) -> &'static [&'static str] {
        &["mangalivre.tv"]
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
        spinner.set_message("Reading the chapter list...");
        let listed = session::require(browser, CHAPTER_LIST, Condition::Present, self.timing.page_timeout).await;
        spinner.finish_and_clear();
        let title = title?;
        listed?;

        let mut catalog = CatalogAccumulator::new();
        for link in browser.snapshot(CHAPTER_LINKS).await? {
            match chapter_from_link(&link, &link.text, work_url, None) {
                Some(chapter) => {
                    catalog.push(chapter);
                }
                None => debug!("ignoring listing entry '{}'", link.text),
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
                forward_cookies: false,
            },
            name_width: 2,
        }))
    }
}
