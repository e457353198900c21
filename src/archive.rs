//! Packaging of downloaded chapter folders into CBZ and PDF files.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use zip::CompressionMethod;
use zip::write::FileOptions;

use crate::error::DownloadError;
use crate::pdf;
use crate::resolver::natural_cmp;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "avif", "gif"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveKind {
    Pdf,
    Cbz,
}

impl ArchiveKind {
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveKind::Pdf => "pdf",
            ArchiveKind::Cbz => "cbz",
        }
    }

    /// `<work>/Chapter 07.5.cbz` for the folder `<work>/Chapter 07.5`.
    pub fn target(self, chapter_folder: &Path) -> PathBuf {
        let name = chapter_folder
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        chapter_folder.with_file_name(format!("{}.{}", name, self.extension()))
    }
}

/// Result of one packaging step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageStatus {
    Created,
    /// The target already existed; nothing was written.
    Skipped,
}

/// True when every requested archive of `chapter_folder` already exists.
pub fn all_exist(chapter_folder: &Path, kinds: &[ArchiveKind]) -> bool {
    !kinds.is_empty() && kinds.iter().all(|kind| kind.target(chapter_folder).exists())
}

/// Image files directly inside `folder`, in natural file-name order.
pub fn collect_images(folder: &Path) -> Result<Vec<PathBuf>, DownloadError> {
    let mut images = Vec::new();
    for entry in fs::read_dir(folder)? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if path.is_file() && is_image {
            images.push(path);
        }
    }
    images.sort_by(|a, b| natural_cmp(&a.to_string_lossy(), &b.to_string_lossy()));
    Ok(images)
}

/// Zips `images` into `output`.
///
/// Entries carry a fixed timestamp, so the same images always give the same
/// bytes. An existing `output` is left untouched.
pub fn create_cbz(images: &[PathBuf], output: &Path) -> Result<PackageStatus, DownloadError> {
    if output.exists() {
        debug!("{} exists, skipping", output.display());
        return Ok(PackageStatus::Skipped);
    }
    if images.is_empty() {
        return Err(DownloadError::ArchiveError(String::from("no images to archive")));
    }

    let result = write_cbz(images, output);
    if result.is_err() {
        let _ = fs::remove_file(output);
    }
    result?;
    info!("CBZ created with {} pages", images.len());
    Ok(PackageStatus::Created)
}

fn write_cbz(images: &[PathBuf], output: &Path) -> Result<(), DownloadError> {
    let mut zip = zip::ZipWriter::new(File::create(output)?);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());

    for image in images {
        let name = image
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| DownloadError::ArchiveError(format!("bad image path {}", image.display())))?;
        zip.start_file(name, options)?;
        io::copy(&mut File::open(image)?, &mut zip)?;
    }
    zip.finish()?;
    Ok(())
}

/// Per-archive outcome of packaging one chapter.
#[derive(Debug, Default)]
pub struct PackagingReport {
    pub results: Vec<(ArchiveKind, Result<PackageStatus, DownloadError>)>,
}

impl PackagingReport {
    /// Every requested archive now exists.
    pub fn complete(&self) -> bool {
        self.results.iter().all(|(_, result)| result.is_ok())
    }
}

/// Builds every archive in `kinds` next to `chapter_folder`.
pub fn package_chapter(chapter_folder: &Path, kinds: &[ArchiveKind]) -> PackagingReport {
    let mut report = PackagingReport::default();
    let images = match collect_images(chapter_folder) {
        Ok(images) => images,
        Err(e) => {
            for &kind in kinds {
                report
                    .results
                    .push((kind, Err(DownloadError::ArchiveError(format!("cannot read chapter folder: {}", e)))));
            }
            return report;
        }
    };

    for &kind in kinds {
        let target = kind.target(chapter_folder);
        let result = match kind {
            ArchiveKind::Cbz => create_cbz(&images, &target),
            ArchiveKind::Pdf => pdf::create_pdf_from_images(&images, &target),
        };
        report.results.push((kind, result));
    }
    report
}

/// Removes the raw image folder once its archives are safe.
pub fn remove_raw_folder(chapter_folder: &Path) -> Result<(), DownloadError> {
    match fs::remove_dir_all(chapter_folder) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!("{} was already gone", chapter_folder.display());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
