//! Sequential inference: walking a URL template when a chapter's page count
//! is unknown.
//!
//! Indices are probed in order with every candidate format until
//! `failure_threshold` consecutive indices yield nothing. The stop rule
//! assumes pages are contiguous; a real gap of `failure_threshold` or more
//! missing pages ends the chapter early, and nothing after the gap is fetched.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use indicatif::ProgressBar;
use log::{debug, trace, warn};
use tokio::time::sleep;

use crate::config::InferenceSettings;
use crate::downloader;
use crate::error::DownloadError;
use crate::resolver::{CandidateFormat, SequencePlan};
use crate::session::{HttpSession, RenderSession};

/// Checks whether a guessed URL exists, returning its bytes when it does.
#[async_trait]
pub trait AssetProbe: Send + Sync {
    /// `Ok(None)` means "not there"; errors are treated the same way by the engine.
    async fn fetch(&self, url: &str) -> Result<Option<Vec<u8>>, DownloadError>;
}

/// Plain GET, accepted only on a direct HTTP 200 that is not a text page.
pub struct HttpProbe<'a>(pub &'a HttpSession);

#[async_trait]
impl AssetProbe for HttpProbe<'_> {
    async fn fetch(&self, url: &str) -> Result<Option<Vec<u8>>, DownloadError> {
        self.0.probe(url).await
    }
}

/// Same-origin fetch through the rendering session; non-image payloads miss.
pub struct ScriptProbe<'a> {
    pub session: &'a dyn RenderSession,
    pub timeout: Duration,
}

#[async_trait]
impl AssetProbe for ScriptProbe<'_> {
    async fn fetch(&self, url: &str) -> Result<Option<Vec<u8>>, DownloadError> {
        match downloader::fetch_via_session(self.session, url, self.timeout).await {
            Err(DownloadError::NotAnImage(header)) => {
                trace!("{} answered {}", url, header);
                Ok(None)
            }
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InferenceReport {
    /// Assets saved before the stop rule triggered.
    pub downloaded: u32,
    /// Indices probed, including the trailing misses.
    pub probed: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct SequentialInference {
    failure_threshold: u32,
    lock_format: bool,
    max_indices: u32,
    pause: Duration,
}

impl SequentialInference {
    pub fn new(settings: &InferenceSettings, pause: Duration) -> Self {
        Self {
            failure_threshold: settings.failure_threshold.max(1),
            lock_format: settings.lock_format,
            max_indices: settings.max_indices,
            pause,
        }
    }

    /// Probes `plan` index by index, saving every hit into `dest`.
    pub async fn run(
        &self,
        plan: &SequencePlan,
        probe: &dyn AssetProbe,
        dest: &Path,
        progress: Option<&ProgressBar>,
    ) -> InferenceReport {
        let mut report = InferenceReport::default();
        let mut consecutive_failures = 0;
        let mut locked: Option<&CandidateFormat> = None;
        let mut index = plan.start_index;

        while consecutive_failures < self.failure_threshold {
            if report.probed >= self.max_indices {
                warn!("stopped inference at {} probed indices under {}", report.probed, plan.base_url);
                break;
            }
            report.probed += 1;

            let candidates: Vec<&CandidateFormat> = match locked {
                Some(format) => vec![format],
                None => plan.formats.iter().collect(),
            };

            let mut hit = None;
            for format in candidates {
                let url = plan.candidate_url(index, format);
                match probe.fetch(&url).await {
                    Ok(Some(bytes)) => {
                        hit = Some((format, bytes));
                        break;
                    }
                    Ok(None) => trace!("miss {}", url),
                    Err(e) => debug!("probe of {} failed: {}", url, e),
                }
            }

            match hit {
                Some((format, bytes)) => {
                    let path = dest.join(plan.saved_name(index, format));
                    match tokio::fs::write(&path, &bytes).await {
                        Ok(()) => {
                            report.downloaded += 1;
                            consecutive_failures = 0;
                            if self.lock_format {
                                locked = Some(format);
                            }
                            if let Some(bar) = progress {
                                bar.inc(1);
                            }
                        }
                        Err(e) => {
                            warn!("could not write {}: {}", path.display(), e);
                            consecutive_failures += 1;
                        }
                    }
                }
                None => {
                    consecutive_failures += 1;
                    if let Some(bar) = progress {
                        bar.set_message(format!(
                            "page {} not found ({} of {} misses)",
                            index, consecutive_failures, self.failure_threshold
                        ));
                    }
                }
            }

            index += 1;
            sleep(self.pause).await;
        }

        debug!(
            "inference under {} saved {} of {} probed indices",
            plan.base_url, report.downloaded, report.probed
        );
        report
    }
}
