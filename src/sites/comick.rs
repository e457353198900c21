use async_trait::async_trait;
use log::debug;
use tokio::time::sleep;

use super::{SiteAdapter, chapter_from_link, read_title};
use crate::catalog::{CatalogAccumulator, ChapterRef, WorkCatalog};
use crate::config::Timing;
use crate::error::DownloadError;
use crate::progress;
use crate::resolver::{self, AssetList, Resolution, ScrollMode, Transfer, join_url};
use crate::session::{self, AcquisitionSession, Condition, SessionRequirement};

const SITE_BASE: &str = "https://comick.io";
const LISTING: &str = r#"div[class*="2xl:min-w-6xl"]"#;
const TITLE: &str = r#"div[class*="justify-between"] h1"#;
const CHAPTER_LINKS: &str = r#"div[class*="2xl:min-w-6xl"] table tbody tr a"#;
/// The link right after the highlighted page number.
const NEXT_PAGE: &str = "a[aria-current='page'] ~ a";
const PAGE_BLOCK: &str = "div[id^='page']";
const PAGES: &str = "div[id^='page'] img";

const MAX_LISTING_PAGES: usize = 200;

/// Paginated chapter table; pages repeat entries, so numbers are
/// de-duplicated across the whole walk.
pub struct Comick {
    timing: Timing,
}

impl Comick {
    pub fn new(timing: Timing) -> Self {
        Self { timing }
    }

    /// Listing filtered to Portuguese chapters unless a language is given.
    pub fn listing_url(work_url: &str) -> String {
        if work_url.contains("?lang") || work_url.contains("&lang") {
            work_url.to_string()
        } else if work_url.contains('?') {
            format!("{}&lang=pt-br", work_url)
        } else {
            format!("{}?lang=pt-br", work_url)
        }
    }
}

#[async_trait]
impl SiteAdapter for Comick {
    fn name(&self) -> &'static str {
        "Comick"
    }

    fn domains(&self) -> &'static [&'static str] {
        &["comick.io"]
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
        let url = Self::listing_url(work_url);
        let spinner = progress::spinner("Opening the work page...");
        browser.navigate(&url).await?;
        let listed = session::require(browser, LISTING, Condition::Visible, self.timing.page_timeout).await;
        let title = read_title(browser, TITLE, Condition::Visible, &self.timing, "").await;
        let title = match (listed, title) {
            (Ok(()), Ok(title)) => title,
            (Err(e), _) | (_, Err(e)) => {
                spinner.finish_and_clear();
                return Err(e);
            }
        };

        let mut catalog = CatalogAccumulator::new();
        for page in 1..=MAX_LISTING_PAGES {
            spinner.set_message(format!("Reading listing page {}...", page));
            sleep(self.timing.settle).await;

            let entries = browser
                .snapshot(CHAPTER_LINKS)
                .await?
                .iter()
                .filter(|link| !link.text.is_empty())
                .filter_map(|link| chapter_from_link(link, &link.text, SITE_BASE, None))
                .collect::<Vec<_>>();
            let added = catalog.push_page(entries);
            debug!("listing page {} added {} chapters", page, added);
            if added == 0 {
                break;
            }

            if !session::wait_for(browser, NEXT_PAGE, Condition::Present, self.timing.probe_timeout).await? {
                break;
            }
            if let Err(e) = browser.click(NEXT_PAGE).await {
                debug!("could not open the next listing page: {}", e);
                break;
            }
        }
        spinner.finish_and_clear();
        catalog.finish(title)
    }

    async fn resolve_chapter(
        &self,
        chapter: &ChapterRef,
        session: &mut AcquisitionSession,
    ) -> Result<Resolution, DownloadError> {
        let browser = session.browser()?;
        let url = join_url(SITE_BASE, &chapter.url);
        browser.navigate(&url).await?;
        session::require(browser, PAGE_BLOCK, Condition::Present, self.timing.page_timeout).await?;
        sleep(self.timing.settle).await;

        resolver::drain_scroll(browser, ScrollMode::ToBottom, &self.timing).await?;
        let assets = resolver::collect_images(browser, PAGES, &["src", "data-src"], SITE_BASE).await?;
        Ok(Resolution::Assets(AssetList {
            assets,
            transfer: Transfer::Script,
            name_width: 2,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_url_adds_language_once() {
        assert_eq!(Comick::listing_url("https://comick.io/comic/x"), "https://comick.io/comic/x?lang=pt-br");
        assert_eq!(Comick::listing_url("https://comick.io/comic/x?lang=en"), "https://comick.io/comic/x?lang=en");
        assert_eq!(
            Comick::listing_url("https://comick.io/comic/x?tab=1"),
            "https://comick.io/comic/x?tab=1&lang=pt-br"
        );
    }
}
