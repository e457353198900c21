use std::path::PathBuf;
use std::time::Duration;

use crate::catalog::RangePolicy;

/// Pauses and timeouts used while talking to a site.
///
/// Every wait in the crate is bounded by one of these values; adapters copy
/// the struct at construction so tests can shrink all of them at once.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    /// Upper bound for navigation and for "element appears" waits.
    pub page_timeout: Duration,
    /// Short bound used to probe optional controls ("load more", "next page").
    pub probe_timeout: Duration,
    /// Bound for the growth check after triggering "load more".
    pub growth_timeout: Duration,
    /// Bound for a script-driven fetch inside the rendering session.
    pub script_timeout: Duration,
    /// Bound for a single plain HTTP request.
    pub request_timeout: Duration,
    /// Pause after a page reports ready, letting late scripts finish.
    pub settle: Duration,
    /// Pause after navigation while passively collecting network responses.
    pub network_settle: Duration,
    /// Pause between scroll increments.
    pub scroll_pause: Duration,
    /// Pause after each asset fetch.
    pub asset_pause: Duration,
    /// Pause after each chapter.
    pub chapter_pause: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            page_timeout: Duration::from_secs(20),
            probe_timeout: Duration::from_secs(3),
            growth_timeout: Duration::from_secs(5),
            script_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            settle: Duration::from_secs(2),
            network_settle: Duration::from_secs(5),
            scroll_pause: Duration::from_secs(1),
            asset_pause: Duration::from_millis(200),
            chapter_pause: Duration::from_secs(1),
        }
    }
}

impl Timing {
    /// Millisecond-scale timings for tests against local fakes.
    pub fn instant() -> Self {
        Self {
            page_timeout: Duration::from_millis(200),
            probe_timeout: Duration::from_millis(50),
            growth_timeout: Duration::from_millis(50),
            script_timeout: Duration::from_millis(500),
            request_timeout: Duration::from_secs(5),
            settle: Duration::ZERO,
            network_settle: Duration::ZERO,
            scroll_pause: Duration::ZERO,
            asset_pause: Duration::ZERO,
            chapter_pause: Duration::ZERO,
        }
    }
}

/// Options for launching the rendering browser.
#[derive(Debug, Clone, Default)]
pub struct BrowserOptions {
    /// Run every adapter headless, even the ones that prefer a visible window.
    pub force_headless: bool,
    /// Explicit Chromium executable; detected automatically when `None`.
    pub executable: Option<PathBuf>,
}

/// Sequential inference tuning.
#[derive(Debug, Clone, Copy)]
pub struct InferenceSettings {
    /// Consecutive missing indices that end a sequence.
    pub failure_threshold: u32,
    /// Try only the last successful candidate format after the first hit.
    pub lock_format: bool,
    /// Hard cap on probed indices per chapter.
    pub max_indices: u32,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            lock_format: true,
            max_indices: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub output_dir: PathBuf,
    pub timing: Timing,
    pub inference: InferenceSettings,
    pub browser: BrowserOptions,
    pub range_policy: RangePolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            timing: Timing::default(),
            inference: InferenceSettings::default(),
            browser: BrowserOptions::default(),
            range_policy: RangePolicy::Inclusive,
        }
    }
}
