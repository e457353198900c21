//! Chapter unit downloader: resolve one chapter, fetch its assets one at a
//! time, and report a tally. Nothing below the chapter aborts the run.

use std::path::Path;

use log::{debug, warn};
use tokio::time::sleep;

use crate::catalog::ChapterRef;
use crate::config::Settings;
use crate::downloader::{self, build_chapter_path, ensure_dir_exists};
use crate::error::DownloadError;
use crate::inference::{AssetProbe, HttpProbe, ScriptProbe, SequentialInference};
use crate::progress;
use crate::resolver::{AssetList, ProbeKind, Resolution, SequencePlan, Transfer};
use crate::session::AcquisitionSession;
use crate::session::http::transfer_headers;
use crate::sites::SiteAdapter;

/// Downloaded and failed asset counts for one chapter.
///
/// When the total came from sequential inference it was never known, so
/// `failed` is 0 and `downloaded` is whatever was found before the stop rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolutionOutcome {
    pub downloaded: u32,
    pub failed: u32,
    pub inferred: bool,
}

impl ResolutionOutcome {
    /// The whole chapter could not be processed.
    pub fn aborted() -> Self {
        Self {
            downloaded: 0,
            failed: 1,
            inferred: false,
        }
    }

    pub fn total(&self) -> u32 {
        self.downloaded + self.failed
    }

    pub fn summary(&self) -> String {
        let line = format!("{}/{} images downloaded successfully", self.downloaded, self.total());
        if self.inferred {
            format!("{} (inferred)", line)
        } else {
            line
        }
    }
}

pub struct ChapterDownloader<'a> {
    settings: &'a Settings,
}

impl<'a> ChapterDownloader<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    /// Resolves `chapter` with `adapter` and saves its images under
    /// `<work_dir>/Chapter NN[.F]`. Existing files are overwritten.
    pub async fn download(
        &self,
        adapter: &dyn SiteAdapter,
        chapter: &ChapterRef,
        session: &mut AcquisitionSession,
        work_dir: &Path,
    ) -> ResolutionOutcome {
        let folder = build_chapter_path(work_dir, chapter.number);
        let label = chapter.number.folder_name();

        let outcome = match self.process(adapter, chapter, session, &folder).await {
            Ok(outcome) => outcome,
            Err(e) => {
                eprintln!("  {} failed: {}", label, e);
                ResolutionOutcome::aborted()
            }
        };

        println!("  {}: {}", label, outcome.summary());
        outcome
    }

    async fn process(
        &self,
        adapter: &dyn SiteAdapter,
        chapter: &ChapterRef,
        session: &mut AcquisitionSession,
        folder: &Path,
    ) -> Result<ResolutionOutcome, DownloadError> {
        ensure_dir_exists(folder)?;
        println!("  Resolving chapter {}...", chapter.number);

        match adapter.resolve_chapter(chapter, session).await? {
            Resolution::Assets(list) if list.assets.is_empty() => {
                println!("  No images found for chapter {}", chapter.number);
                Ok(ResolutionOutcome::aborted())
            }
            Resolution::Assets(list) => Ok(self.fetch_assets(&list, session, folder).await),
            Resolution::Sequence(plan) => self.infer(&plan, session, folder, &chapter.number.folder_name()).await,
        }
    }

    async fn fetch_assets(
        &self,
        list: &AssetList,
        session: &AcquisitionSession,
        folder: &Path,
    ) -> ResolutionOutcome {
        let mut outcome = ResolutionOutcome::default();
        let bar = progress::chapter_bar(list.assets.len() as u64, &format!("{} images", list.assets.len()));

        let cookies = match &list.transfer {
            Transfer::Http {
                forward_cookies: true, ..
            } => match session.browser() {
                Ok(browser) => browser.cookies().await.unwrap_or_else(|e| {
                    warn!("could not read browser cookies: {}", e);
                    Vec::new()
                }),
                Err(e) => {
                    warn!("{}", e);
                    Vec::new()
                }
            },
            _ => Vec::new(),
        };

        for asset in &list.assets {
            if asset.source.is_empty() {
                bar.println(format!("    -> image {} has no source, skipping", asset.index));
                outcome.failed += 1;
                bar.inc(1);
                continue;
            }

            let path = folder.join(asset.file_name(list.name_width));
            let result = match &list.transfer {
                Transfer::Http { referer, .. } => {
                    let headers = transfer_headers(&asset.source, referer.as_deref(), &cookies);
                    downloader::download_image(session.http(), &asset.source, &path, headers).await
                }
                Transfer::Script => match session.browser() {
                    Ok(browser) => {
                        downloader::download_image_via_session(
                            browser,
                            &asset.source,
                            &path,
                            self.settings.timing.script_timeout,
                        )
                        .await
                    }
                    Err(e) => Err(e),
                },
            };

            match result {
                Ok(bytes) => {
                    debug!("saved {} ({} bytes)", path.display(), bytes);
                    outcome.downloaded += 1;
                }
                Err(e) => {
                    bar.println(format!("    -> image {} failed: {}", asset.index, e));
                    outcome.failed += 1;
                }
            }
            bar.inc(1);
            sleep(self.settings.timing.asset_pause).await;
        }

        bar.finish_and_clear();
        outcome
    }

    async fn infer(
        &self,
        plan: &SequencePlan,
        session: &AcquisitionSession,
        folder: &Path,
        label: &str,
    ) -> Result<ResolutionOutcome, DownloadError> {
        println!("  Page count unknown, probing {}", plan.base_url);
        let engine = SequentialInference::new(&self.settings.inference, self.settings.timing.asset_pause);
        let spinner = progress::inference_spinner(label);

        let http_probe;
        let script_probe;
        let probe: &dyn AssetProbe = match plan.probe {
            ProbeKind::Http => {
                http_probe = HttpProbe(session.http());
                &http_probe
            }
            ProbeKind::Script => {
                script_probe = ScriptProbe {
                    session: session.browser()?,
                    timeout: self.settings.timing.script_timeout,
                };
                &script_probe
            }
        };

        let report = engine.run(plan, probe, folder, Some(&spinner)).await;
        spinner.finish_and_clear();

        if report.downloaded == 0 {
            println!("  No image found by probing {}", plan.base_url);
            return Ok(ResolutionOutcome::aborted());
        }
        Ok(ResolutionOutcome {
            downloaded: report.downloaded,
            failed: 0,
            inferred: true,
        })
    }
}
