//! Data models flowing through the acquisition and enhancement pipeline.
//!
//! This module defines the core data structures used throughout the application:
//! - [`ExtractedArticle`]: An article scraped from the primary listing site
//! - [`ReferenceDocument`]: A third-party article used as comparative input
//! - [`SearchHit`]: A transient search engine result
//! - [`EnhancedDocument`]: The LLM rewrite of an article plus its citation block
//! - [`BatchOutcome`]: Paired successes and failures of a batch run
//! - [`RunSummary`]: The per-run report handed to the presentation layer
//!
//! Field names serialize as camelCase to match the storage API's JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An article extracted from the primary source.
///
/// `title`, `body` and `source_url` are never empty: the scrapers report a
/// failure instead of building a partially populated value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedArticle {
    /// The article headline.
    pub title: String,
    /// The article body with navigation chrome removed.
    pub body: String,
    /// The byline, when the page exposes one.
    pub author: Option<String>,
    /// Best-effort publication date string; not guaranteed to parse.
    pub published_at: Option<String>,
    /// Absolute URL the article was scraped from.
    pub source_url: String,
}

/// A third-party article fetched to give the model comparison material.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceDocument {
    pub title: String,
    /// Body text, capped at [`crate::scrapers::reference::MAX_BODY_CHARS`].
    pub body: String,
    pub source_url: String,
}

/// A single result parsed from a search engine results page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: Option<String>,
}

/// The model's rewrite of an article with its deterministic citation block.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedDocument {
    /// Generated text followed by the reference section (if any references).
    pub enhanced_body: String,
    /// Reference URLs in the order they were handed to the enhancer.
    pub reference_urls: Vec<String>,
}

/// An article as returned by the storage API after creation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredArticle {
    pub id: i64,
    #[serde(flatten)]
    pub article: ExtractedArticle,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An enhanced record as returned by the storage API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEnhancement {
    pub id: i64,
    pub original_id: i64,
    #[serde(flatten)]
    pub document: EnhancedDocument,
}

/// One item that did not make it through a batch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BatchFailure {
    /// Identifier of the input item, usually its URL or storage id.
    pub id: String,
    /// Human readable reason.
    pub error: String,
}

/// Result of running an operation over many items independently.
///
/// Every input identifier lands in exactly one of the two lists, and both
/// lists keep input order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BatchOutcome<T> {
    pub succeeded: Vec<T>,
    pub failed: Vec<BatchFailure>,
}

impl<T> BatchOutcome<T> {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

impl<T> Default for BatchOutcome<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

/// Which part of the run an item failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Discover,
    Scrape,
    Store,
    Enhance,
}

/// A failed item tagged with the stage it failed in.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub id: String,
    pub error: String,
}

/// Everything a caller needs to know about a finished run.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub listing_url: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Links selected from the listing.
    pub discovered: usize,
    pub scraped: usize,
    pub stored: usize,
    pub enhanced: usize,
    pub failures: Vec<StageFailure>,
}

impl RunSummary {
    pub fn new(listing_url: &str) -> Self {
        Self {
            listing_url: listing_url.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            discovered: 0,
            scraped: 0,
            stored: 0,
            enhanced: 0,
            failures: Vec::new(),
        }
    }

    /// Record every failure of a batch under `stage`.
    pub fn record_failures(&mut self, stage: Stage, failed: &[BatchFailure]) {
        self.failures.extend(failed.iter().map(|f| StageFailure {
            stage,
            id: f.id.clone(),
            error: f.error.clone(),
        }));
    }

    pub fn failed_in(&self, stage: Stage) -> usize {
        self.failures.iter().filter(|f| f.stage == stage).count()
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}
