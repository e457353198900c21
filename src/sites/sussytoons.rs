use std::sync::OnceLock;

use async_trait::async_trait;
use log::{debug, warn};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::{SiteAdapter, capture_id, json_flag, json_id, json_number};
use crate::catalog::{CatalogAccumulator, ChapterNumber, ChapterRef, WorkCatalog};
use crate::error::DownloadError;
use crate::progress;
use crate::resolver::{
    AssetList, CandidateFormat, FALLBACK_EXTENSION, PayloadPage, ProbeKind, Resolution, SequencePlan, Transfer,
    assets_from_sources, payload_asset_url,
};
use crate::session::{AcquisitionSession, SessionRequirement};

const API_BASE: &str = "https://api.sussytoons.wtf";
const CDN_BASE: &str = "https://cdn.sussytoons.site";
const SITE_BASE: &str = "https://www.sussytoons.wtf";

/// Page file extensions tried, in order, when guessing a locked chapter.
const GUESS_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".webp", ".png"];

fn re_work_id() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"/obra/(\d+)").unwrap())
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    resultado: Option<T>,
}

#[derive(Debug, Deserialize)]
struct WorkPayload {
    obr_nome: Option<String>,
    #[serde(default)]
    capitulos: Vec<ChapterEntry>,
}

#[derive(Debug, Deserialize)]
struct ChapterEntry {
    #[serde(default)]
    cap_id: Value,
    #[serde(default)]
    cap_numero: Value,
    #[serde(default)]
    cap_disponivel: Value,
}

#[derive(Debug, Deserialize)]
struct ChapterPayload {
    #[serde(default)]
    cap_paginas: Vec<PayloadPage>,
}

/// REST-backed site. Locked chapters come back without pages and are
/// recovered by guessing file names under the chapter's CDN folder.
pub struct SussyToons {
    api_base: String,
    cdn_base: String,
    site_base: String,
}

impl Default for SussyToons {
    fn default() -> Self {
        Self::new()
    }
}

impl SussyToons {
    pub fn new() -> Self {
        Self::with_endpoints(API_BASE, CDN_BASE, SITE_BASE)
    }

    pub fn with_endpoints(api_base: &str, cdn_base: &str, site_base: &str) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            cdn_base: cdn_base.trim_end_matches('/').to_string(),
            site_base: site_base.trim_end_matches('/').to_string(),
        }
    }

    /// Zero-based, two-digit page names under `/scans/1/obras/{work}/capitulos/{n}/`,
    /// where a fractional chapter 5.1 becomes `5_1`.
    pub fn guess_plan(&self, work_id: &str, number: ChapterNumber) -> SequencePlan {
        let part = number.plain().replace('.', "_");
        SequencePlan {
            base_url: format!("{}/scans/1/obras/{}/capitulos/{}/", self.cdn_base, work_id, part),
            formats: GUESS_EXTENSIONS
                .iter()
                .map(|extension| CandidateFormat::new(2, extension))
                .collect(),
            start_index: 0,
            name_width: 3,
            probe: ProbeKind::Http,
        }
    }

    async fn chapter_pages(&self, id: u64, session: &AcquisitionSession) -> Result<Vec<PayloadPage>, DownloadError> {
        let url = format!("{}/capitulos/{}", self.api_base, id);
        let envelope: Envelope<ChapterPayload> = session.http().get_json(&url).await?;
        if !envelope.success {
            debug!("chapter {} answered success=false: {:?}", id, envelope.message);
            return Ok(Vec::new());
        }
        Ok(envelope.resultado.map(|r| r.cap_paginas).unwrap_or_default())
    }
}

#[async_trait]
impl SiteAdapter for SussyToons {
    fn name(&self) -> &'static str {
        "SussyToons"
    }

    fn domains(&self) -> &'static [&'static str] {
        &["sussytoons.wtf", "sussytoons.site"]
    }

    fn requirement(&self) -> SessionRequirement {
        SessionRequirement::Http
    }

    async fn fetch_catalog(
        &self,
        work_url: &str,
        session: &mut AcquisitionSession,
    ) -> Result<WorkCatalog, DownloadError> {
        let work_id = capture_id(work_url, re_work_id())?;
        let spinner = progress::spinner("Fetching chapter list from the API...");

        let url = format!("{}/obras/{}", self.api_base, work_id);
        let envelope: Envelope<WorkPayload> = match session.http().get_json(&url).await {
            Ok(envelope) => envelope,
            Err(e) => {
                spinner.finish_and_clear();
                return Err(e);
            }
        };
        spinner.finish_and_clear();

        let work = match envelope.resultado {
            Some(work) if envelope.success => work,
            _ => {
                return Err(DownloadError::CatalogUnavailable(
                    envelope.message.unwrap_or_else(|| String::from("the API reported an error")),
                ));
            }
        };

        let mut catalog = CatalogAccumulator::new();
        for entry in &work.capitulos {
            let (Some(id), Some(number)) = (
                json_id(&entry.cap_id),
                json_number(&entry.cap_numero).and_then(ChapterNumber::new),
            ) else {
                debug!("skipping chapter entry without id or number: {:?}", entry);
                continue;
            };
            catalog.push(
                ChapterRef::new(number, format!("{}/capitulo/{}", self.site_base, id))
                    .with_id(id)
                    .with_work_id(work_id.as_str())
                    .with_availability(json_flag(&entry.cap_disponivel)),
            );
        }

        let name = work.obr_nome.unwrap_or_else(|| format!("obra_{}", work_id));
        catalog.finish(name)
    }

    async fn resolve_chapter(
        &self,
        chapter: &ChapterRef,
        session: &mut AcquisitionSession,
    ) -> Result<Resolution, DownloadError> {
        let pages = match chapter.id {
            Some(_) if !chapter.available => {
                println!("  Chapter {} is locked", chapter.number);
                Vec::new()
            }
            Some(id) => match self.chapter_pages(id, session).await {
                Ok(pages) => pages,
                Err(e) => {
                    warn!("chapter API failed for {}: {}", chapter.number, e);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        if !pages.is_empty() {
            println!("  Found {} images through the API", pages.len());
            let sources = pages.iter().map(|page| payload_asset_url(&self.cdn_base, page));
            return Ok(Resolution::Assets(AssetList {
                assets: assets_from_sources(sources, FALLBACK_EXTENSION),
                transfer: Transfer::plain(),
                name_width: 3,
            }));
        }

        let work_id = chapter
            .work_id
            .as_deref()
            .ok_or_else(|| DownloadError::ParsingError(format!("chapter {} has no work id", chapter.number)))?;
        println!("  The API listed no pages, guessing file names instead");
        Ok(Resolution::Sequence(self.guess_plan(work_id, chapter.number)))
    }
}
