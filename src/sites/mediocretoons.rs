use std::sync::OnceLock;

use async_trait::async_trait;
use log::debug;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::{SiteAdapter, capture_id, json_id, json_number};
use crate::catalog::{CatalogAccumulator, ChapterNumber, ChapterRef, WorkCatalog};
use crate::error::DownloadError;
use crate::progress;
use crate::resolver::{AssetList, Resolution, Transfer, assets_from_sources};
use crate::session::{AcquisitionSession, SessionRequirement};

const API_BASE: &str = "https://api.mediocretoons.com";
const CDN_BASE: &str = "https://cdn.mediocretoons.com";
const SITE_BASE: &str = "https://mediocretoons.com";

/// Pages are served as WebP when the file name carries no extension.
const DEFAULT_EXTENSION: &str = ".webp";

/// The API rejects requests that do not look like they come from the web app.
const APP_HEADERS: &[(&str, &str)] = &[
    ("Accept", "*/*"),
    ("Authorization", "Bearer null"),
    ("Origin", "https://mediocretoons.com"),
    ("Referer", "https://mediocretoons.com/"),
    ("X-App-Key", "toons-mediocre-app"),
    ("Sec-Fetch-Dest", "empty"),
    ("Sec-Fetch-Mode", "cors"),
    ("Sec-Fetch-Site", "same-site"),
];

fn re_work_id() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"/work/(\d+)").unwrap())
}

#[derive(Debug, Deserialize)]
struct WorkPayload {
    nome: Option<String>,
    #[serde(default)]
    capitulos: Vec<ChapterEntry>,
}

#[derive(Debug, Deserialize)]
struct ChapterEntry {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    numero: Value,
}

#[derive(Debug, Deserialize)]
struct ChapterPayload {
    #[serde(default)]
    paginas: Vec<PageEntry>,
}

#[derive(Debug, Deserialize)]
struct PageEntry {
    src: Option<String>,
}

pub struct MediocreToons {
    api_base: String,
    cdn_base: String,
    site_base: String,
}

impl Default for MediocreToons {
    fn default() -> Self {
        Self::new()
    }
}

impl MediocreToons {
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

    fn image_url(&self, work_id: &str, number: ChapterNumber, src: &str) -> String {
        format!("{}/obras/{}/capitulos/{}/{}", self.cdn_base, work_id, number.plain(), src)
    }
}

#[async_trait]
impl SiteAdapter for MediocreToons {
    fn name(&self) -> &'static str {
        "MediocreToons"
    }

    fn domains(&self) -> &'static [&'static str] {
        &["mediocretoons.com"]
    }

    fn requirement(&self) -> SessionRequirement {
        SessionRequirement::Http
    }

    fn default_headers(&self) -> &'static [(&'static str, &'static str)] {
        APP_HEADERS
    }

    async fn fetch_catalog(
        &self,
        work_url: &str,
        session: &mut AcquisitionSession,
    ) -> Result<WorkCatalog, DownloadError> {
        let work_id = capture_id(work_url, re_work_id())?;
        let spinner = progress::spinner("Fetching chapter list from the API...");
        let work: Result<WorkPayload, _> = session
            .http()
            .get_json(&format!("{}/obras/{}", self.api_base, work_id))
            .await;
        spinner.finish_and_clear();
        let work = work?;

        let mut catalog = CatalogAccumulator::new();
        for entry in &work.capitulos {
            let (Some(id), Some(number)) = (json_id(&entry.id), json_number(&entry.numero).and_then(ChapterNumber::new))
            else {
                debug!("skipping chapter entry without id or number: {:?}", entry);
                continue;
            };
            catalog.push(
                ChapterRef::new(number, format!("{}/chapter/{}", self.site_base, id))
                    .with_id(id)
                    .with_work_id(work_id.as_str()),
            );
        }

        catalog.finish(work.nome.unwrap_or_else(|| format!("obra_{}", work_id)))
    }

    async fn resolve_chapter(
        &self,
        chapter: &ChapterRef,
        session: &mut AcquisitionSession,
    ) -> Result<Resolution, DownloadError> {
        let (Some(id), Some(work_id)) = (chapter.id, chapter.work_id.as_deref()) else {
            return Err(DownloadError::ParsingError(format!(
                "chapter {} is missing its API ids",
                chapter.number
            )));
        };

        let payload: ChapterPayload = session
            .http()
            .get_json(&format!("{}/capitulos/{}", self.api_base, id))
            .await?;
        println!("  Found {} images through the API", payload.paginas.len());

        let sources = payload.paginas.iter().map(|page| {
            page.src
                .as_deref()
                .map(str::trim)
                .filter(|src| !src.is_empty())
                .map(|src| self.image_url(work_id, chapter.number, src))
        });
        Ok(Resolution::Assets(AssetList {
            assets: assets_from_sources(sources, DEFAULT_EXTENSION),
            transfer: Transfer::plain(),
            name_width: 3,
        }))
    }
}
