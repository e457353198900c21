use async_trait::async_trait;
use log::{debug, info};
use tokio::time::sleep;

use super::{SiteAdapter, chapter_from_link, read_title};
use crate::catalog::{CatalogAccumulator, ChapterRef, WorkCatalog};
use crate::config::Timing;
use crate::error::DownloadError;
use crate::progress;
use crate::resolver::{self, AssetList, Resolution, Transfer};
use crate::session::{self, AcquisitionSession, Condition, RenderSession, SessionFlags, SessionRequirement};

const HOME: &str = "https://manhastro.net/";
const LOGIN_PATH: &str = "/login";
const LOGIN_USER_INPUT: &str = r#"input[placeholder="Email ou usuário"]"#;
const LOGIN_PASSWORD_INPUT: &str = r#"input[placeholder="Senha"]"#;
const LOGIN_REMEMBER: &str = "#rememberMe";
const LOGIN_SUBMIT: &str = r#"button[type="submit"]"#;
/// Shared reader account; the site gates listings behind any login.
const CREDENTIALS: (&str, &str) = ("Teste123", "Teste123");

const TITLE: &str = "h1.text-3xl.font-bold.text-white";
const CHAPTER_LINKS: &str = r#"a[href*="/chapter/"]"#;
const CHAPTER_LABEL: &str = "span.text-white";
const PAGE_CONTAINER: &str = "div.w-full.flex.flex-col";
const PAGES: &str = "div.w-full.flex.flex-col img";

pub const LOGIN_FLAG: &str = "manhastro.logged-in";

pub struct Manhastro {
    timing: Timing,
}

impl Manhastro {
    pub fn new(timing: Timing) -> Self {
        Self { timing }
    }

    /// Logs in when the site bounced us to its login form, then reopens `url`.
    async fn open(&self, browser: &dyn RenderSession, flags: &mut SessionFlags, url: &str) -> Result<(), DownloadError> {
        browser.navigate(url).await?;
        sleep(self.timing.settle / 2).await;
        if !browser.current_url().await?.contains(LOGIN_PATH) {
            return Ok(());
        }
        if flags.is_set(LOGIN_FLAG) {
            debug!("redirected to the login form again, the session expired");
            flags.clear(LOGIN_FLAG);
        }
        self.login(browser, flags).await?;
        browser.navigate(url).await
    }

    async fn login(&self, browser: &dyn RenderSession, flags: &mut SessionFlags) -> Result<(), DownloadError> {
        println!("Login required, signing in...");
        session::require(browser, LOGIN_USER_INPUT, Condition::Present, self.timing.page_timeout).await?;
        let (user, password) = CREDENTIALS;
        browser.type_text(LOGIN_USER_INPUT, user).await?;
        browser.type_text(LOGIN_PASSWORD_INPUT, password).await?;
        if let Err(e) = browser.click(LOGIN_REMEMBER).await {
            debug!("no remember-me box: {}", e);
        }
        browser.click(LOGIN_SUBMIT).await?;

        let home = HOME.trim_end_matches('/');
        let landed = session::wait_for_url(
            browser,
            |url: &str| url.trim_end_matches('/') == home,
            self.timing.page_timeout,
        )
        .await?;
        if !landed {
            return Err(DownloadError::Timeout(String::from("login did not reach the home page")));
        }
        info!("logged in to {}", HOME);
        flags.set(LOGIN_FLAG);
        Ok(())
    }
}

#[async_trait]
impl SiteAdapter for Manhastro {
    fn name(&self) -> &'static str {
        "Manhastro"
    }

    fn domains(&self) -> &'static [&'static str] {
        &["manhastro.net"]
    }

    fn requirement(&self) -> SessionRequirement {
        SessionRequirement::Rendering { headless: false }
    }

    async fn fetch_catalog(
        &self,
        work_url: &str,
        session: &mut AcquisitionSession,
    ) -> Result<WorkCatalog, DownloadError> {
        let (browser, flags) = session.browser_and_flags()?;
        self.open(browser, flags, work_url).await?;

        let spinner = progress::spinner("Reading the chapter list...");
        let title = read_title(browser, TITLE, Condition::Visible, &self.timing, "").await;
        let listed = session::require(browser, CHAPTER_LINKS, Condition::Visible, self.timing.page_timeout).await;
        spinner.finish_and_clear();
        let title = title?;
        listed?;
        sleep(self.timing.settle / 2).await;

        let mut catalog = CatalogAccumulator::new();
        for link in browser.snapshot(CHAPTER_LINKS).await? {
            let Some(label) = link.child_text(CHAPTER_LABEL)? else {
                continue;
            };
            if let Some(chapter) = chapter_from_link(&link, &label, work_url, None) {
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
        self.open(browser, flags, &chapter.url).await?;

        session::require(browser, PAGE_CONTAINER, Condition::Present, self.timing.page_timeout).await?;
        sleep(self.timing.settle * 2).await;
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
