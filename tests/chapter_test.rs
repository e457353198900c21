mod common;

use std::fs;

use async_trait::async_trait;
use serde_json::Value;

use common::FakeBrowser;
use manga_harvester::archive::ArchiveKind;
use manga_harvester::catalog::{CatalogAccumulator, ChapterNumber, ChapterRef, WorkCatalog};
use manga_harvester::chapter::ChapterDownloader;
use manga_harvester::error::DownloadError;
use manga_harvester::resolver::{AssetList, Resolution, Transfer, assets_from_sources};
use manga_harvester::run::{self, FixedAnswers, FlagStore, OutputFormat, Runner, Selection};
use manga_harvester::session::{AcquisitionSession, FlagScope, SessionFlags, SessionRequirement};
use manga_harvester::sites::{SiteAdapter, SiteRegistry};

/// Lists the given chapters and resolves each one to the same asset list.
struct StaticSite {
    name: String,
    numbers: Vec<f64>,
    sources: Vec<Option<String>>,
    transfer: Transfer,
}

impl StaticSite {
    fn new(name: &str, numbers: &[f64], sources: Vec<Option<String>>, transfer: Transfer) -> Self {
        Self {
            name: name.to_string(),
            numbers: numbers.to_vec(),
            sources,
            transfer,
        }
    }
}

#[async_trait]
impl SiteAdapter for StaticSite {
    fn name(&self) -> &'static str {
        "Static"
    }

    fn domains(&self) -> &'static [&'static str] {
        &["static.test"]
    }

    fn requirement(&self) -> SessionRequirement {
        SessionRequirement::Http
    }

    async fn fetch_catalog(&self, _work_url: &str, _session: &mut AcquisitionSession) -> Result<WorkCatalog, DownloadError> {
        let mut acc = CatalogAccumulator::new();
        for &n in &self.numbers {
            acc.push(ChapterRef::new(ChapterNumber::new(n).unwrap(), format!("https://static.test/{}", n)));
        }
        acc.finish(self.name.clone())
    }

    async fn resolve_chapter(&self, _chapter: &ChapterRef, _session: &mut AcquisitionSession) -> Result<Resolution, DownloadError> {
        Ok(Resolution::Assets(AssetList {
            assets: assets_from_sources(self.sources.clone(), ".jpg"),
            transfer: self.transfer.clone(),
            name_width: 2,
        }))
    }
}

fn chapter(n: f64) -> ChapterRef {
    ChapterRef::new(ChapterNumber::new(n).unwrap(), format!("https://static.test/{}", n))
}

#[tokio::test]
async fn test_one_missing_asset_is_counted_not_fatal() {
    let mut server = mockito::Server::new_async().await;
    let mut mocks = Vec::new();
    for page in ["01", "02", "04"] {
        let mock = server
            .mock("GET", format!("/img/{}.jpg", page).as_str())
            .with_status(200)
            .with_body(format!("image {}", page))
            .create_async()
            .await;
        mocks.push(mock);
    }
    mocks.push(server.mock("GET", "/img/03.jpg").with_status(404).create_async().await);

    let sources = ["01", "02", "03", "04"]
        .iter()
        .map(|page| Some(format!("{}/img/{}.jpg", server.url(), page)))
        .collect();
    let site = StaticSite::new("Work", &[1.0], sources, Transfer::plain());
    let dir = tempfile::tempdir().unwrap();
    let settings = common::test_settings(dir.path());
    let mut session = common::http_session();

    let outcome = ChapterDownloader::new(&settings)
        .download(&site, &chapter(1.0), &mut session, dir.path())
        .await;

    assert_eq!(outcome.downloaded, 3);
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.downloaded + outcome.failed, 4);
    assert_eq!(outcome.summary(), "3/4 images downloaded successfully");

    let folder = dir.path().join("Chapter 01");
    assert_eq!(fs::read(folder.join("04.jpg")).unwrap(), b"image 04");
    assert!(!folder.join("03.jpg").exists());
}

#[tokio::test]
async fn test_blank_sources_count_as_failures() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server.mock("GET", "/img/01.png").with_status(200).with_body("png").create_async().await;

    let sources = vec![Some(format!("{}/img/01.png", server.url())), None];
    let site = StaticSite::new("Work", &[4.5], sources, Transfer::plain());
    let dir = tempfile::tempdir().unwrap();
    let settings = common::test_settings(dir.path());
    let mut session = common::http_session();

    let outcome = ChapterDownloader::new(&settings)
        .download(&site, &chapter(4.5), &mut session, dir.path())
        .await;

    assert_eq!((outcome.downloaded, outcome.failed), (1, 1));
    assert!(dir.path().join("Chapter 04.5").join("01.png").exists());
}

#[tokio::test]
async fn test_empty_asset_list_aborts_the_chapter() {
    let site = StaticSite::new("Work", &[1.0], Vec::new(), Transfer::plain());
    let dir = tempfile::tempdir().unwrap();
    let settings = common::test_settings(dir.path());
    let mut session = common::http_session();

    let outcome = ChapterDownloader::new(&settings)
        .download(&site, &chapter(1.0), &mut session, dir.path())
        .await;

    assert_eq!((outcome.downloaded, outcome.failed), (0, 1));
}

#[tokio::test]
async fn test_script_fetch_of_error_page_is_a_failed_asset() {
    let browser = FakeBrowser::new()
        .image("https://cdn.test/01.jpg", b"\xff\xd8\xff first page")
        .fetch(
            "https://cdn.test/02.jpg",
            Value::String("data:application/xml;base64,PEVycm9yPkFjY2Vzc0RlbmllZDwvRXJyb3I+".into()),
        );
    let sources = vec![
        Some("https://cdn.test/01.jpg".to_string()),
        Some("https://cdn.test/02.jpg".to_string()),
        Some("https://cdn.test/03.jpg".to_string()),
    ];
    let site = StaticSite::new("Work", &[2.0], sources, Transfer::Script);
    let dir = tempfile::tempdir().unwrap();
    let settings = common::test_settings(dir.path());
    let mut session = common::browser_session(&browser);

    let outcome = ChapterDownloader::new(&settings)
        .download(&site, &chapter(2.0), &mut session, dir.path())
        .await;

    assert_eq!(outcome.downloaded, 1);
    assert_eq!(outcome.failed, 2);
    let folder = dir.path().join("Chapter 02");
    assert_eq!(fs::read(folder.join("01.jpg")).unwrap(), b"\xff\xd8\xff first page");
    assert!(!folder.join("02.jpg").exists());
    assert!(!folder.join("03.jpg").exists());
}

#[tokio::test]
async fn test_forwarded_cookies_reach_the_image_host() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/img/01.jpg")
        .match_header("cookie", "cf_clearance=abc")
        .match_header("referer", "https://reader.test/chapter/1")
        .with_status(200)
        .with_body("ok")
        .create_async()
        .await;

    let browser = FakeBrowser::new()
        .cookie("cf_clearance", "abc", "127.0.0.1")
        .cookie("unrelated", "x", "example.org");
    let site = StaticSite::new(
        "Work",
        &[1.0],
        vec![Some(format!("{}/img/01.jpg", server.url()))],
        Transfer::Http {
            referer: Some("https://reader.test/chapter/1".to_string()),
            forward_cookies: true,
        },
    );
    let dir = tempfile::tempdir().unwrap();
    let settings = common::test_settings(dir.path());
    let mut session = common::browser_session(&browser);

    let outcome = ChapterDownloader::new(&settings)
        .download(&site, &chapter(1.0), &mut session, dir.path())
        .await;

    mock.assert_async().await;
    assert_eq!(outcome.downloaded, 1);
}

#[tokio::test]
async fn test_harvest_packages_and_skips_finished_chapters() {
    let mut server = mockito::Server::new_async().await;
    let _images = server
        .mock("GET", mockito::Matcher::Regex(r"^/img/\d+\.jpg$".to_string()))
        .with_status(200)
        .with_body("not really a jpeg")
        .expect_at_least(1)
        .create_async()
        .await;

    let sources = vec![Some(format!("{}/img/1.jpg", server.url())), Some(format!("{}/img/2.jpg", server.url()))];
    let site = StaticSite::new("Work: Part/One", &[1.0, 2.0, 3.0], sources, Transfer::plain());
    let dir = tempfile::tempdir().unwrap();
    let settings = common::test_settings(dir.path());
    let mut answers = FixedAnswers {
        format: OutputFormat::Cbz,
        delete_raw: true,
        selection: Selection::Range { start: 1.0, end: 2.0 },
    };

    // Chapter 2 was packaged by an earlier run
    let work_dir = dir.path().join("Work PartOne");
    fs::create_dir_all(&work_dir).unwrap();
    fs::write(work_dir.join("Chapter 02.cbz"), b"earlier").unwrap();

    let mut session = common::http_session();
    let summary = run::harvest(&settings, &site, "https://static.test/work", &mut session, &mut answers)
        .await
        .unwrap();

    assert_eq!(summary.work_dir, work_dir);
    assert_eq!(summary.chapters, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.downloaded, 2);
    assert_eq!(summary.failed, 0);

    let chapter_one = work_dir.join("Chapter 01");
    assert!(ArchiveKind::Cbz.target(&chapter_one).exists());
    assert!(!chapter_one.exists(), "raw folder should be removed after packaging");
    assert_eq!(fs::read(work_dir.join("Chapter 02.cbz")).unwrap(), b"earlier");
    assert!(!work_dir.join("Chapter 03").exists());
}

#[tokio::test]
async fn test_harvest_rejects_unusable_work_name() {
    let site = StaticSite::new("???", &[1.0], Vec::new(), Transfer::plain());
    let dir = tempfile::tempdir().unwrap();
    let settings = common::test_settings(dir.path());
    let mut answers = FixedAnswers {
        format: OutputFormat::ImagesOnly,
        delete_raw: false,
        selection: Selection::All,
    };
    let mut session = common::http_session();

    let result = run::harvest(&settings, &site, "https://static.test/work", &mut session, &mut answers).await;

    assert!(matches!(result, Err(DownloadError::ParsingError(_))));
}

#[test]
fn test_flag_store_keeps_only_per_process_flags() {
    struct Scoped(FlagScope, &'static str);

    #[async_trait]
    impl SiteAdapter for Scoped {
        fn name(&self) -> &'static str {
            self.1
        }
        fn domains(&self) -> &'static [&'static str] {
            &[]
        }
        fn requirement(&self) -> SessionRequirement {
            SessionRequirement::Http
        }
        fn flag_scope(&self) -> FlagScope {
            self.0
        }
        async fn fetch_catalog(&self, _: &str, _: &mut AcquisitionSession) -> Result<WorkCatalog, DownloadError> {
            unreachable!()
        }
        async fn resolve_chapter(&self, _: &ChapterRef, _: &mut AcquisitionSession) -> Result<Resolution, DownloadError> {
            unreachable!()
        }
    }

    let per_process = Scoped(FlagScope::PerProcess, "sticky");
    let per_work = Scoped(FlagScope::PerWork, "fresh");
    let mut store = FlagStore::new();
    let mut flags = SessionFlags::default();
    flags.set("mode-switched");

    store.store(&per_process, flags.clone());
    store.store(&per_work, flags);

    assert!(store.checkout(&per_process).is_set("mode-switched"));
    assert!(!store.checkout(&per_work).is_set("mode-switched"));
}

#[tokio::test]
async fn test_failed_session_start_keeps_per_process_flags() {
    /// Sticky flags, but headers the HTTP client refuses to build.
    struct Broken;

    #[async_trait]
    impl SiteAdapter for Broken {
        fn name(&self) -> &'static str {
            "Broken"
        }
        fn domains(&self) -> &'static [&'static str] {
            &["broken.test"]
        }
        fn requirement(&self) -> SessionRequirement {
            SessionRequirement::Http
        }
        fn flag_scope(&self) -> FlagScope {
            FlagScope::PerProcess
        }
        fn default_headers(&self) -> &'static [(&'static str, &'static str)] {
            &[("not a header", "x")]
        }
        async fn fetch_catalog(&self, _: &str, _: &mut AcquisitionSession) -> Result<WorkCatalog, DownloadError> {
            unreachable!()
        }
        async fn resolve_chapter(&self, _: &ChapterRef, _: &mut AcquisitionSession) -> Result<Resolution, DownloadError> {
            unreachable!()
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let mut registry = SiteRegistry::new();
    registry.register(Broken);
    let mut runner = Runner::new(common::test_settings(dir.path()), registry);

    let mut flags = SessionFlags::default();
    flags.set("mode-switched");
    runner.flags_mut().store(&Broken, flags);

    let mut answers = FixedAnswers {
        format: OutputFormat::ImagesOnly,
        delete_raw: false,
        selection: Selection::All,
    };
    let result = runner.process_work("https://broken.test/work/1", &mut answers).await;

    assert!(matches!(result, Err(DownloadError::ParsingError(_))));
    assert!(runner.flags_mut().checkout(&Broken).is_set("mode-switched"));
}
