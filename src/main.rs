use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use log::debug;

use manga_harvester::catalog::RangePolicy;
use manga_harvester::config::{BrowserOptions, InferenceSettings, Settings, Timing};
use manga_harvester::error::DownloadError;
use manga_harvester::run::{FixedAnswers, OutputFormat, Prompter, Runner, Selection};
use manga_harvester::sites::SiteRegistry;
use manga_harvester::WorkCatalog;

/// Download manga and webtoon chapters from the supported reading sites
#[derive(Debug, Parser)]
#[command(
    version,
    about,
    long_about = "Download manga and webtoon chapters from the supported reading sites, optionally packaged as PDF or CBZ"
)]
pub struct Args {
    /// The output directory
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Consecutive misses that end a guessed page sequence
    #[arg(long, default_value = "3")]
    pub failure_threshold: u32,

    /// Keep trying every file format after one has matched
    #[arg(long)]
    pub no_format_lock: bool,

    /// Pause after each image, in milliseconds
    #[arg(long, default_value = "200")]
    pub asset_pause_ms: u64,

    /// Pause after each chapter, in milliseconds
    #[arg(long, default_value = "1000")]
    pub chapter_pause_ms: u64,

    /// How long to wait for a page or element, in seconds
    #[arg(long, default_value = "20")]
    pub page_timeout_secs: u64,

    /// How long an in-browser image fetch may take, in seconds
    #[arg(long, default_value = "30")]
    pub script_timeout_secs: u64,

    /// How the upper bound of a chapter range is read
    #[arg(long, value_enum, default_value_t = RangePolicy::Inclusive)]
    pub range_policy: RangePolicy,

    /// Run the browser headless even for sites that normally show it
    #[arg(long)]
    pub headless: bool,

    /// Chromium or Chrome executable to use
    #[arg(long)]
    pub browser_path: Option<PathBuf>,

    /// Download all chapters as plain images without prompting
    #[arg(short, long)]
    pub all: bool,
}

impl Args {
    fn settings(&self) -> Settings {
        let timing = Timing {
            page_timeout: Duration::from_secs(self.page_timeout_secs),
            script_timeout: Duration::from_secs(self.script_timeout_secs),
            asset_pause: Duration::from_millis(self.asset_pause_ms),
            chapter_pause: Duration::from_millis(self.chapter_pause_ms),
            ..Timing::default()
        };
        Settings {
            output_dir: self.output_dir.clone(),
            timing,
            inference: InferenceSettings {
                failure_threshold: self.failure_threshold,
                lock_format: !self.no_format_lock,
                ..InferenceSettings::default()
            },
            browser: BrowserOptions {
                force_headless: self.headless,
                executable: self.browser_path.clone(),
            },
            range_policy: self.range_policy,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), DownloadError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let settings = args.settings();
    debug!("{:?}", settings);

    let registry = SiteRegistry::builtin(settings.timing);
    println!("Supported sites: {}", registry.names().join(", "));
    let mut runner = Runner::new(settings, registry);

    loop {
        // End of input quits like an empty answer
        let url = ask("\nWork URL (empty to quit): ").unwrap_or_default();
        if url.is_empty() {
            break;
        }

        let result = if args.all {
            let mut answers = FixedAnswers {
                format: OutputFormat::ImagesOnly,
                delete_raw: false,
                selection: Selection::All,
            };
            runner.process_work(&url, &mut answers).await
        } else {
            runner.process_work(&url, &mut ConsolePrompter).await
        };

        if let Err(e) = result {
            eprintln!("✗ {}", e);
        }
    }

    println!("Bye");
    Ok(())
}

/// Reads the per-work answers from stdin.
struct ConsolePrompter;

impl Prompter for ConsolePrompter {
    fn output_format(&mut self) -> Result<OutputFormat, DownloadError> {
        println!("\nOutput format:");
        println!("  1) Images only");
        println!("  2) PDF");
        println!("  3) CBZ");
        println!("  4) PDF and CBZ");
        loop {
            match OutputFormat::from_choice(&ask("> ")?) {
                Some(format) => return Ok(format),
                None => eprintln!("Please answer 1, 2, 3 or 4"),
            }
        }
    }

    fn delete_raw(&mut self) -> Result<bool, DownloadError> {
        let answer = ask("Delete the raw images after packaging? [y/N] ")?;
        Ok(matches!(answer.to_lowercase().as_str(), "y" | "yes" | "s" | "sim"))
    }

    fn selection(&mut self, catalog: &WorkCatalog) -> Result<Selection, DownloadError> {
        if let (Some(first), Some(last)) = (catalog.chapters().first(), catalog.chapters().last()) {
            println!("Chapters {} to {}", first.number, last.number);
        }
        let answer = ask("Download all chapters? [Y/n] ")?;
        if !matches!(answer.to_lowercase().as_str(), "n" | "no" | "nao" | "não") {
            return Ok(Selection::All);
        }

        let start = ask_number("First chapter: ")?;
        let end = ask_number("Last chapter: ")?;
        if start > end {
            eprintln!("Warning: the range {}-{} is reversed, swapping", start, end);
            return Ok(Selection::Range { start: end, end: start });
        }
        Ok(Selection::Range { start, end })
    }
}

fn ask(prompt: &str) -> Result<String, DownloadError> {
    print!("{}", prompt);
    io::stdout().flush().map_err(DownloadError::IoError)?;

    let mut input = String::new();
    if io::stdin().read_line(&mut input).map_err(DownloadError::IoError)? == 0 {
        return Err(DownloadError::IoError(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "standard input was closed",
        )));
    }
    Ok(input.trim().to_string())
}

fn ask_number(prompt: &str) -> Result<f64, DownloadError> {
    loop {
        let answer = ask(prompt)?;
        match answer.replace(',', ".").parse::<f64>() {
            Ok(value) if value.is_finite() => return Ok(value),
            _ => eprintln!("Warning: '{}' is not a chapter number", answer),
        }
    }
}
