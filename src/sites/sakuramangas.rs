use async_trait::async_trait;
use log::debug;
use tokio::time::sleep;

use super::{SiteAdapter, chapter_from_link, read_title};
use crate::catalog::{self, CatalogAccumulator, ChapterRef, WorkCatalog};
use crate::config::Timing;
use crate::error::DownloadError;
use crate::progress;
use crate::resolver::{self, AssetList, ProbeKind, Resolution, ScrollMode, SequenceSeed, Transfer};
use crate::session::{self, AcquisitionSession, Condition, FlagScope, RenderSession, SessionFlags, SessionRequirement};

const TITLE: &str = "h1.h1-titulo";
const LOAD_MORE: &str = "#ver-mais";
const CHAPTER_LINKS: &str = "div.capitulo-lista span.num-capitulo a";
const IMAGE_MARKER: &str = "sakuramangas.org/imagens/";
const SCROLL_MODE_BUTTON: &str = "span.div-modo.div-scroll";
/// Inline highlight the reader gives the active mode button.
const SCROLL_MODE_ACTIVE: &str = "rgb(255, 160, 226)";
const PAGES: &str = "#paginas .pag-item img";

/// Set once the reader has been switched to continuous scrolling; the
/// choice is stored site-side, so it holds for the rest of the run.
pub const SCROLL_MODE_FLAG: &str = "sakuramangas.scroll-mode";

/// Reader that never exposes its page list. Image URLs are recovered from
/// the network traffic of the chapter page and extended by guessing.
pub struct SakuraMangas {
    timing: Timing,
}

impl SakuraMangas {
    pub fn new(timing: Timing) -> Self {
        Self { timing }
    }

    async fn ensure_scroll_mode(&self, browser: &dyn RenderSession, flags: &mut SessionFlags) -> Result<(), DownloadError> {
        if flags.is_set(SCROLL_MODE_FLAG) {
            return Ok(());
        }
        if !session::wait_for(browser, SCROLL_MODE_BUTTON, Condition::Present, self.timing.growth_timeout).await? {
            println!("  Scroll mode button not found, continuing in the current mode");
            return Ok(());
        }

        let active = browser
            .attribute_values(SCROLL_MODE_BUTTON, "style")
            .await?
            .into_iter()
            .flatten()
            .any(|style| style.contains(SCROLL_MODE_ACTIVE));
        if active {
            debug!("scroll mode already active");
        } else {
            browser.click(SCROLL_MODE_BUTTON).await?;
            println!("  Switched the reader to scroll mode");
            sleep(self.timing.settle).await;
        }
        flags.set(SCROLL_MODE_FLAG);
        Ok(())
    }
}

#[async_trait]
impl SiteAdapter for SakuraMangas {
    fn name(&self) -> &'static str {
        "SakuraMangas"
    }

    fn domains(&self) -> &'static [&'static str] {
        &["sakuramangas.org"]
    }

    fn requirement(&self) -> SessionRequirement {
        SessionRequirement::Rendering { headless: true }
    }

    fn flag_scope(&self) -> FlagScope {
        FlagScope::PerProcess
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
        spinner.finish_and_clear();
        let title = title?;

        let loaded = catalog::drain_load_more(browser, LOAD_MORE, CHAPTER_LINKS, &self.timing).await?;
        debug!("{} chapter links after loading the full list", loaded);

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
        let (browser, flags) = session.browser_and_flags()?;

        // Drop responses left over from earlier pages
        browser.take_network_log().await?;
        println!("  Opening chapter {} and watching network traffic...", chapter.number);
        browser.navigate(&chapter.url).await?;
        sleep(self.timing.network_settle).await;

        let seen = resolver::mine_network_log(&browser.take_network_log().await?, IMAGE_MARKER);
        if let Some(seed) = seen.iter().find_map(|url| SequenceSeed::from_sample(url)) {
            println!("  Image URL pattern found in {} logged responses", seen.len());
            return Ok(Resolution::Sequence(seed.into_plan(ProbeKind::Script)));
        }

        println!("  No image requests captured, scrolling the reader instead");
        self.ensure_scroll_mode(browser, flags).await?;
        resolver::drain_scroll(browser, ScrollMode::ByViewport, &self.timing).await?;
        let assets = resolver::collect_images(browser, PAGES, &["data-src", "src"], &chapter.url).await?;
        Ok(Resolution::Assets(AssetList {
            assets,
            transfer: Transfer::Script,
            name_width: 2,
        }))
    }
}
