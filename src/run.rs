//! Run orchestration: one work at a time, from URL to packaged chapters.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use tokio::time::sleep;

use crate::archive::{self, ArchiveKind, PackageStatus};
use crate::catalog::{ChapterRef, WorkCatalog, select_range};
use crate::chapter::ChapterDownloader;
use crate::config::Settings;
use crate::downloader::{build_chapter_path, ensure_dir_exists, sanitize_filename};
use crate::error::DownloadError;
use crate::session::{AcquisitionSession, FlagScope, SessionFlags};
use crate::sites::{SiteAdapter, SiteRegistry};

/// What to produce from each downloaded chapter folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    ImagesOnly,
    Pdf,
    Cbz,
    PdfAndCbz,
}

impl OutputFormat {
    /// Menu choice `1`..`4`.
    pub fn from_choice(choice: &str) -> Option<Self> {
        match choice.trim() {
            "1" => Some(OutputFormat::ImagesOnly),
            "2" => Some(OutputFormat::Pdf),
            "3" => Some(OutputFormat::Cbz),
            "4" => Some(OutputFormat::PdfAndCbz),
            _ => None,
        }
    }

    pub fn kinds(self) -> Vec<ArchiveKind> {
        match self {
            OutputFormat::ImagesOnly => Vec::new(),
            OutputFormat::Pdf => vec![ArchiveKind::Pdf],
            OutputFormat::Cbz => vec![ArchiveKind::Cbz],
            OutputFormat::PdfAndCbz => vec![ArchiveKind::Pdf, ArchiveKind::Cbz],
        }
    }
}

/// Which chapters of a catalog to fetch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Selection {
    All,
    Range { start: f64, end: f64 },
}

/// The questions asked once per work, after its catalog is known.
pub trait Prompter {
    fn output_format(&mut self) -> Result<OutputFormat, DownloadError>;

    /// Only asked when at least one archive kind was chosen.
    fn delete_raw(&mut self) -> Result<bool, DownloadError>;

    fn selection(&mut self, catalog: &WorkCatalog) -> Result<Selection, DownloadError>;
}

/// Answers fixed up front, for `--all` runs and tests.
#[derive(Debug, Clone)]
pub struct FixedAnswers {
    pub format: OutputFormat,
    pub delete_raw: bool,
    pub selection: Selection,
}

impl Prompter for FixedAnswers {
    fn output_format(&mut self) -> Result<OutputFormat, DownloadError> {
        Ok(self.format)
    }

    fn delete_raw(&mut self) -> Result<bool, DownloadError> {
        Ok(self.delete_raw)
    }

    fn selection(&mut self, _catalog: &WorkCatalog) -> Result<Selection, DownloadError> {
        Ok(self.selection)
    }
}

/// Flags of adapters whose one-time actions outlive a single work.
#[derive(Debug, Default)]
pub struct FlagStore {
    by_adapter: HashMap<&'static str, SessionFlags>,
}

impl FlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flags a new session for `adapter` starts with.
    pub fn checkout(&mut self, adapter: &dyn SiteAdapter) -> SessionFlags {
        match adapter.flag_scope() {
            FlagScope::PerWork => SessionFlags::default(),
            FlagScope::PerProcess => self.by_adapter.remove(adapter.name()).unwrap_or_default(),
        }
    }

    /// Keeps the flags of a released session when the adapter wants them back.
    pub fn store(&mut self, adapter: &dyn SiteAdapter, flags: SessionFlags) {
        if adapter.flag_scope() == FlagScope::PerProcess {
            self.by_adapter.insert(adapter.name(), flags);
        }
    }
}

/// Totals for one processed work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkSummary {
    pub work_dir: PathBuf,
    pub chapters: usize,
    /// Chapters whose requested archives were already on disk.
    pub skipped: usize,
    pub downloaded: u32,
    pub failed: u32,
}

pub struct Runner {
    settings: Settings,
    registry: SiteRegistry,
    flags: FlagStore,
}

impl Runner {
    pub fn new(settings: Settings, registry: SiteRegistry) -> Self {
        Self {
            settings,
            registry,
            flags: FlagStore::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &SiteRegistry {
        &self.registry
    }

    /// Flags carried between works for per-process adapters.
    pub fn flags_mut(&mut self) -> &mut FlagStore {
        &mut self.flags
    }

    /// Processes the work at `url`. The session is always released, and
    /// per-process flags are kept for the next work on the same site.
    pub async fn process_work(&mut self, url: &str, prompter: &mut dyn Prompter) -> Result<WorkSummary, DownloadError> {
        let adapter = self.registry.select(url)?;
        println!("Site: {}", adapter.name());

        let flags = self.flags.checkout(adapter);
        let acquired = AcquisitionSession::acquire(
            adapter.requirement(),
            adapter.default_headers(),
            &self.settings,
            flags.clone(),
        )
        .await;
        let mut session = match acquired {
            Ok(session) => session,
            Err(e) => {
                self.flags.store(adapter, flags);
                return Err(e);
            }
        };

        let result = harvest(&self.settings, adapter, url.trim(), &mut session, prompter).await;

        let flags = session.release().await;
        self.flags.store(adapter, flags);
        result
    }
}

/// Catalog, prompts, then every selected chapter in ascending order.
pub async fn harvest(
    settings: &Settings,
    adapter: &dyn SiteAdapter,
    work_url: &str,
    session: &mut AcquisitionSession,
    prompter: &mut dyn Prompter,
) -> Result<WorkSummary, DownloadError> {
    let catalog = adapter.fetch_catalog(work_url, session).await?;
    println!("Work: {}", catalog.name);
    println!("{} chapters available", catalog.len());

    let folder_name = sanitize_filename(&catalog.name);
    if folder_name.is_empty() {
        return Err(DownloadError::ParsingError(format!(
            "the work name '{}' leaves nothing usable as a folder name",
            catalog.name
        )));
    }
    let work_dir = settings.output_dir.join(&folder_name);
    ensure_dir_exists(&work_dir)?;

    let kinds = prompter.output_format()?.kinds();
    let delete_raw = !kinds.is_empty() && prompter.delete_raw()?;
    let chapters: Vec<ChapterRef> = match prompter.selection(&catalog)? {
        Selection::All => catalog.chapters().to_vec(),
        Selection::Range { start, end } => select_range(&catalog, start, end, settings.range_policy),
    };

    let mut summary = WorkSummary {
        work_dir: work_dir.clone(),
        chapters: chapters.len(),
        ..WorkSummary::default()
    };
    if chapters.is_empty() {
        println!("No chapters match the selection");
        return Ok(summary);
    }
    info!("processing {} chapters of '{}'", chapters.len(), catalog.name);

    let downloader = ChapterDownloader::new(settings);
    for (i, chapter) in chapters.iter().enumerate() {
        let folder = build_chapter_path(&work_dir, chapter.number);
        if archive::all_exist(&folder, &kinds) {
            println!("[{}/{}] Chapter {} already packaged, skipping", i + 1, chapters.len(), chapter.number);
            summary.skipped += 1;
            continue;
        }

        println!("[{}/{}] Chapter {}", i + 1, chapters.len(), chapter.number);
        let outcome = downloader.download(adapter, chapter, session, &work_dir).await;
        summary.downloaded += outcome.downloaded;
        summary.failed += outcome.failed;

        if !kinds.is_empty() {
            if outcome.downloaded > 0 {
                package(&folder, &kinds, delete_raw);
            } else {
                debug!("nothing to package for chapter {}", chapter.number);
            }
        }

        if i + 1 < chapters.len() {
            sleep(settings.timing.chapter_pause).await;
        }
    }

    println!(
        "Finished '{}': {} images downloaded, {} failed, {} chapters skipped",
        catalog.name, summary.downloaded, summary.failed, summary.skipped
    );
    Ok(summary)
}

fn package(folder: &Path, kinds: &[ArchiveKind], delete_raw: bool) {
    let report = archive::package_chapter(folder, kinds);
    for (kind, result) in &report.results {
        match result {
            Ok(PackageStatus::Created) => println!("  ✓ {} created", kind.extension().to_uppercase()),
            Ok(PackageStatus::Skipped) => println!("  {} already exists", kind.extension().to_uppercase()),
            Err(e) => eprintln!("  ✗ Failed to create {}: {}", kind.extension().to_uppercase(), e),
        }
    }

    if delete_raw {
        if report.complete() {
            if let Err(e) = archive::remove_raw_folder(folder) {
                warn!("could not remove {}: {}", folder.display(), e);
            }
        } else {
            println!("  Keeping the raw images because packaging failed");
        }
    }
}
