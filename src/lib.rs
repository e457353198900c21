// Expose modules for integration testing
pub mod archive;
pub mod catalog;
pub mod chapter;
pub mod config;
pub mod dom;
pub mod downloader;
pub mod error;
pub mod inference;
pub mod pdf;
pub mod progress;
pub mod resolver;
pub mod run;
pub mod session;
pub mod sites;

// Re-export important types for easier use in tests
pub use catalog::{ChapterNumber, ChapterRef, RangePolicy, WorkCatalog};
pub use chapter::{ChapterDownloader, ResolutionOutcome};
pub use config::Settings;
pub use error::DownloadError;
pub use run::Runner;
pub use sites::{SiteAdapter, SiteRegistry};
