//! Command-line interface definitions for the article enhancer.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Every option can also be provided through an environment variable.

use crate::api::RetryPolicy;
use crate::browser::chrome::BrowserSettings;
use crate::pipeline::PipelineConfig;
use crate::search::SearchConfig;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for the article enhancer.
///
/// # Examples
///
/// ```sh
/// # Dry run against the default blog, keeping results in memory
/// article_enhancer --summary-dir ./runs
///
/// # Publish to the storage API and render Markdown
/// article_enhancer --storage-url http://localhost:8000/api -m ./enhanced
///
/// # Ten oldest articles, ignoring a second domain in search results
/// ARTICLE_COUNT=10 article_enhancer --excluded-domain beyondchats.com,example.org
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Blog listing page to take the oldest articles from
    #[arg(long, env = "LISTING_URL", default_value = "https://beyondchats.com/blogs/")]
    pub listing_url: String,

    /// Number of oldest articles to process
    #[arg(short = 'n', long, env = "ARTICLE_COUNT", default_value_t = 5)]
    pub article_count: usize,

    /// Per-navigation timeout in seconds
    #[arg(long, env = "NAVIGATION_TIMEOUT_SECS", default_value_t = 30)]
    pub navigation_timeout_secs: u64,

    /// Maximum number of reference articles per original
    #[arg(long, env = "MAX_SEARCH_RESULTS", default_value_t = 2)]
    pub max_search_results: usize,

    /// Domains never used as references (repeatable or comma separated)
    #[arg(
        long = "excluded-domain",
        env = "EXCLUDED_DOMAINS",
        value_delimiter = ',',
        default_value = "beyondchats.com"
    )]
    pub excluded_domains: Vec<String>,

    /// Override the model named in the LLM config
    #[arg(long, env = "GENERATION_MODEL")]
    pub model: Option<String>,

    /// Total generation attempts per article
    #[arg(long, env = "MAX_GENERATION_ATTEMPTS", default_value_t = 3)]
    pub max_attempts: usize,

    /// Base URL of the storage API; without it results stay in memory
    #[arg(long, env = "STORAGE_API_URL")]
    pub storage_url: Option<String>,

    /// Optional path to config.yaml file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Name of the chat template carrying the system prompt
    #[arg(long, env = "TEMPLATE_NAME", default_value = "article_enhancer")]
    pub template: String,

    /// YAML file overriding the built-in selector tables
    #[arg(long, env = "SELECTORS_FILE")]
    pub selectors: Option<String>,

    /// Chrome or Chromium executable; detected when omitted
    #[arg(long, env = "CHROME_PATH")]
    pub chrome_path: Option<PathBuf>,

    /// Run the browser with a visible window
    #[arg(long)]
    pub show_browser: bool,

    /// Output directory for the JSON run summary
    #[arg(short, long, env = "SUMMARY_DIR")]
    pub summary_dir: Option<String>,

    /// Output directory for Markdown renderings of enhanced articles
    #[arg(short, long, env = "MARKDOWN_DIR")]
    pub markdown_dir: Option<String>,
}

impl Cli {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            listing_url: self.listing_url.clone(),
            article_count: self.article_count,
        }
    }

    pub fn browser_settings(&self) -> BrowserSettings {
        BrowserSettings {
            navigation_timeout: Duration::from_secs(self.navigation_timeout_secs),
            chrome_path: self.chrome_path.clone(),
            headless: !self.show_browser,
        }
    }

    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            excluded_domains: self
                .excluded_domains
                .iter()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect(),
            max_results: self.max_search_results,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            ..RetryPolicy::default()
        }
    }
}
