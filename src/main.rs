//! # Article Enhancer
//!
//! Takes the oldest articles of a blog, finds comparable articles elsewhere on
//! the web, and rewrites each original with an LLM, appending a citation block
//! that lists the references it was compared against.
//!
//! ## Usage
//!
//! ```sh
//! article_enhancer --storage-url http://localhost:8000/api -s ./runs -m ./enhanced
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Discovery**: Find the last listing page and select the oldest article links
//! 2. **Scraping**: Extract each article through a headless Chrome session
//! 3. **Storage**: Publish scraped articles to the storage API
//! 4. **Enhancement**: Search for references, scrape them, rewrite the original
//!    with the LLM and publish the result linked to its original
//! 5. **Output**: Write a JSON run summary and optional Markdown renderings
//!
//! Everything runs sequentially through one shared browser, which is closed
//! once at the end of the run.

use awful_aj::{config, config_dir, template};
use clap::Parser;
use std::error::Error;
use std::path::PathBuf;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod batch;
mod browser;
mod cli;
mod enhance;
mod error;
mod extract;
mod models;
mod outputs;
mod pipeline;
mod scrapers;
mod search;
mod selectors;
mod storage;
mod utils;

use api::AskFnWrapper;
use browser::chrome::ChromeBrowser;
use cli::Cli;
use enhance::Enhancer;
use outputs::{json, markdown};
use pipeline::Pipeline;
use selectors::SelectorTable;
use storage::{HttpStore, MemoryStore};
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("article_enhancer starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args.summary_dir, ?args.markdown_dir, ?args.storage_url, "Parsed CLI arguments");

    // Early check: ensure output dirs are writable
    for dir in [&args.summary_dir, &args.markdown_dir].into_iter().flatten() {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(
                path = %dir,
                error = %e,
                "Output directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
    }

    // ---- Load selectors, template & config ----
    let selectors = SelectorTable::load(args.selectors.as_deref()).await?;
    let template = template::load_template(&args.template).await?;
    info!(template = %args.template, "Loaded template");

    let conf_file = match &args.config {
        Some(path) => PathBuf::from(path),
        None => config_dir()?.join("config.yaml"),
    };
    let config_path = conf_file.to_str().ok_or("Not a valid config filename")?;
    let mut config = config::load_config(config_path)?;
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    info!(config_path, model = %config.model, "Loaded configuration");

    let http_store = args.storage_url.as_deref().map(HttpStore::new).transpose()?;

    let enhancer = Enhancer::new(AskFnWrapper { config, template }, args.retry_policy());
    let pipeline = Pipeline::new(args.pipeline_config(), selectors, args.search_config(), enhancer);

    // ---- Run ----
    let browser = ChromeBrowser::new(args.browser_settings());
    let report = match &http_store {
        Some(store) => pipeline.run(&browser, store).await,
        None => {
            warn!("No storage URL configured; results are kept in memory for this run only");
            let store = MemoryStore::new();
            let report = pipeline.run(&browser, &store).await;
            info!(
                articles = store.articles().await.len(),
                enhanced = store.enhanced_count().await,
                "Dry run kept results in memory"
            );
            report
        }
    };
    browser.close().await;

    let summary = &report.summary;
    for failure in &summary.failures {
        warn!(stage = ?failure.stage, id = %failure.id, error = %failure.error, "Item failed");
    }

    // ---- Outputs ----
    if let Some(dir) = &args.summary_dir {
        match json::write_summary(summary, dir).await {
            Ok(path) => info!(path = %path.display(), "Run summary written"),
            Err(e) => error!(error = %e, "Failed to write run summary"),
        }
    }

    if let Some(dir) = &args.markdown_dir {
        if let Err(e) = markdown::write_enhanced(&report.enhanced, dir).await {
            error!(error = %e, "Failed to write Markdown output");
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        discovered = summary.discovered,
        scraped = summary.scraped,
        stored = summary.stored,
        enhanced = summary.enhanced,
        failed = summary.failures.len(),
        "Execution complete"
    );

    Ok(())
}
