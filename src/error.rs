use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum DownloadError {
    RequestFailed(reqwest::Error),
    IoError(std::io::Error),
    ParsingError(String),
    SelectorError(String),
    ElementNotFound(String),
    Timeout(String),
    UnsupportedSite(String),
    CatalogUnavailable(String),
    SessionUnavailable(String),
    BrowserError(String),
    NotAnImage(String),
    ImageProcessingError(String),
    PdfGenerationError(String),
    ArchiveError(String),
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadError::RequestFailed(e) => write!(f, "Failed to make HTTP request: {}", e),
            DownloadError::IoError(e) => write!(f, "IO operation failed: {}", e),
            DownloadError::ParsingError(msg) => write!(f, "Failed to parse response: {}", msg),
            DownloadError::SelectorError(msg) => write!(f, "Invalid CSS selector: {}", msg),
            DownloadError::ElementNotFound(msg) => write!(f, "Element not found: {}", msg),
            DownloadError::Timeout(msg) => write!(f, "Timed out: {}", msg),
            DownloadError::UnsupportedSite(url) => write!(f, "Unsupported site: {}", url),
            DownloadError::CatalogUnavailable(msg) => write!(f, "Chapter list unavailable: {}", msg),
            DownloadError::SessionUnavailable(msg) => write!(f, "Could not start the browser session: {}", msg),
            DownloadError::BrowserError(msg) => write!(f, "Browser error: {}", msg),
            DownloadError::NotAnImage(header) => write!(f, "Payload is not an image ({})", header),
            DownloadError::ImageProcessingError(msg) => write!(f, "Image processing error: {}", msg),
            DownloadError::PdfGenerationError(msg) => write!(f, "PDF generation error: {}", msg),
            DownloadError::ArchiveError(msg) => write!(f, "Archive error: {}", msg),
        }
    }
}

impl Error for DownloadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DownloadError::RequestFailed(e) => Some(e),
            DownloadError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(err: reqwest::Error) -> Self {
        DownloadError::RequestFailed(err)
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(err: std::io::Error) -> Self {
        DownloadError::IoError(err)
    }
}

impl From<serde_json::Error> for DownloadError {
    fn from(err: serde_json::Error) -> Self {
        DownloadError::ParsingError(err.to_string())
    }
}

impl From<base64::DecodeError> for DownloadError {
    fn from(err: base64::DecodeError) -> Self {
        DownloadError::ImageProcessingError(format!("invalid base64 payload: {}", err))
    }
}

impl From<genpdf::error::Error> for DownloadError {
    fn from(err: genpdf::error::Error) -> Self {
        DownloadError::PdfGenerationError(err.to_string())
    }
}

impl From<zip::result::ZipError> for DownloadError {
    fn from(err: zip::result::ZipError) -> Self {
        DownloadError::ArchiveError(err.to_string())
    }
}

impl From<chromiumoxide::error::CdpError> for DownloadError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        DownloadError::BrowserError(err.to_string())
    }
}
