use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use genpdf::fonts::{FontData, FontFamily};
use log::{debug, info, trace, warn};

use crate::archive::PackageStatus;
use crate::error::DownloadError;

/// A4 width in millimetres.
const PAGE_WIDTH_MM: f64 = 210.0;
const HORIZONTAL_MARGIN_MM: f64 = 12.0;
/// Resolution assumed when converting pixels to millimetres.
const ASSUMED_DPI: f64 = 300.0;

/// One image per A4 page, each scaled to the page width.
///
/// An existing `output_path` is left untouched.
pub fn create_pdf_from_images(
    image_paths: &[impl AsRef<Path>],
    output_path: &Path,
) -> Result<PackageStatus, DownloadError> {
    if output_path.exists() {
        debug!("{} exists, skipping", output_path.display());
        return Ok(PackageStatus::Skipped);
    }
    if image_paths.is_empty() {
        return Err(DownloadError::PdfGenerationError(String::from("Cannot create PDF: no images provided")));
    }

    debug!("Creating PDF from {} images", image_paths.len());
    trace!("Output path: {:?}", output_path);

    // genpdf needs a font even for an image-only document
    let font_family = find_system_font().map_err(|e| DownloadError::PdfGenerationError(format!("Failed to load font: {}", e)))?;

    let mut doc = genpdf::Document::new(font_family);
    doc.set_title(
        output_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default(),
    );
    doc.set_paper_size(genpdf::PaperSize::A4);

    for (i, path) in image_paths.iter().enumerate() {
        trace!("Processing image {}/{}", i + 1, image_paths.len());
        let scale_factor = fit_width_scale(path.as_ref())?;

        let img = genpdf::elements::Image::from_path(path.as_ref())
            .map_err(|e| DownloadError::ImageProcessingError(format!("Failed to load image {}: {}", path.as_ref().display(), e)))?
            .with_alignment(genpdf::Alignment::Center)
            .with_scale(genpdf::Scale::new(scale_factor, scale_factor));
        doc.push(img);

        if i + 1 < image_paths.len() {
            doc.push(genpdf::elements::PageBreak::new());
        }
    }

    if let Err(e) = doc.render_to_file(output_path) {
        let _ = fs::remove_file(output_path);
        return Err(e.into());
    }
    info!("PDF created successfully with {} pages", image_paths.len());
    Ok(PackageStatus::Created)
}

/// Scale that makes the image span the printable page width.
fn fit_width_scale(path: &Path) -> Result<f64, DownloadError> {
    let (width, height) = image::image_dimensions(path)
        .map_err(|e| DownloadError::ImageProcessingError(format!("Failed to read {}: {}", path.display(), e)))?;
    let width_mm = f64::from(width.max(1)) * 25.4 / ASSUMED_DPI;
    let scale = (PAGE_WIDTH_MM - HORIZONTAL_MARGIN_MM) / width_mm;
    trace!("Image dimensions: {}x{}, scale factor: {:.2}", width, height, scale);
    Ok(scale)
}

/// Any regular TTF from the usual system locations, used for every style.
fn find_system_font() -> Result<FontFamily<FontData>, String> {
    for path in font_candidates() {
        let Ok(bytes) = fs::read(&path) else {
            trace!("Font file not found or not readable: {}", path.display());
            continue;
        };
        match FontData::new(bytes, None) {
            Ok(font_data) => {
                debug!("Using font {}", path.display());
                return Ok(FontFamily {
                    regular: font_data.clone(),
                    bold: font_data.clone(),
                    italic: font_data.clone(),
                    bold_italic: font_data,
                });
            }
            Err(e) => trace!("Failed to load font {}: {}", path.display(), e),
        }
    }

    warn!("Could not load any suitable font");
    Err("no usable TrueType font found on this system".to_string())
}

/// Platform font files to try, most reliable first. TTC collections are
/// left out because the font parser rejects most of them.
fn font_candidates() -> Vec<PathBuf> {
    let system: &[&str] = match env::consts::OS {
        "macos" => &[
            "/System/Library/Fonts/Geneva.ttf",
            "/System/Library/Fonts/Monaco.ttf",
            "/Library/Fonts/Arial.ttf",
        ],
        "windows" => &[
            "C:\\Windows\\Fonts\\arial.ttf",
            "C:\\Windows\\Fonts\\verdana.ttf",
            "C:\\Windows\\Fonts\\tahoma.ttf",
            "C:\\Windows\\Fonts\\times.ttf",
            "C:\\Windows\\Fonts\\calibri.ttf",
            "C:\\Windows\\Fonts\\segoeui.ttf",
        ],
        "linux" => &[
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
            "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
            "/usr/share/fonts/TTF/DejaVuSans.ttf",
            "/usr/share/fonts/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/truetype/ubuntu/Ubuntu-R.ttf",
            "/usr/share/fonts/noto/NotoSans-Regular.ttf",
            "/usr/share/fonts/truetype/noto/NotoSans-Regular.ttf",
        ],
        _ => &["/usr/local/share/fonts/Arial.ttf"],
    };
    let mut paths: Vec<PathBuf> = system.iter().map(PathBuf::from).collect();

    if let Some(home) = dirs::home_dir() {
        let user_fonts = match env::consts::OS {
            "macos" => Some(home.join("Library/Fonts")),
            "windows" => Some(home.join("AppData\\Local\\Microsoft\\Windows\\Fonts")),
            "linux" => Some(home.join(".local/share/fonts")),
            _ => None,
        };
        if let Some(dir) = user_fonts {
            for name in ["DejaVuSans.ttf", "LiberationSans-Regular.ttf", "Arial.ttf", "arial.ttf"] {
                paths.push(dir.join(name));
            }
        }
    }
    if let Some(data) = dirs::font_dir() {
        paths.push(data.join("DejaVuSans.ttf"));
    }

    paths.push(PathBuf::from("assets/fonts/LiberationSans-Regular.ttf"));
    paths
}
