//! Scraper for third-party reference articles.
//!
//! Reference pages come from anywhere on the web, so extraction is lenient:
//! broad selectors first, then the whole `<body>` minus navigation chrome.
//! Bodies are capped at [`MAX_BODY_CHARS`]. A reference that cannot be
//! scraped is logged and dropped; it never fails the article it was found for.

use crate::batch::run_batch;
use crate::browser::{Browser, load_and_evaluate};
use crate::error::{PipelineError, Result};
use crate::extract::{FieldKind, document_body_text, extract_field};
use crate::models::ReferenceDocument;
use crate::selectors::FieldSelectors;
use crate::utils::truncate_chars;
use scraper::Html;
use tracing::{info, instrument, warn};

/// Upper bound on a reference body, in characters.
pub const MAX_BODY_CHARS: usize = 10_000;

/// Shortest selector match accepted as a body before falling back to the whole page.
const MIN_CANDIDATE_CHARS: usize = 100;

pub struct ReferenceScraper {
    fields: FieldSelectors,
}

impl ReferenceScraper {
    pub fn new(fields: FieldSelectors) -> Self {
        Self { fields }
    }

    #[instrument(level = "info", skip(self, browser))]
    pub async fn scrape_one<B: Browser>(&self, browser: &B, url: &str) -> Result<ReferenceDocument> {
        let fields = &self.fields;
        let doc = load_and_evaluate(browser, url, |doc| extract_reference(doc, fields, url)).await??;
        info!(title = %doc.title, body_chars = doc.body.chars().count(), "Scraped reference");
        Ok(doc)
    }

    /// Scrape `urls` in order, keeping only the pages that succeeded.
    #[instrument(level = "info", skip_all, fields(count = urls.len()))]
    pub async fn scrape_many<B: Browser>(&self, browser: &B, urls: Vec<String>) -> Vec<ReferenceDocument> {
        let outcome = run_batch("references", urls, |u| u.clone(), |url| async move {
            self.scrape_one(browser, &url).await
        })
        .await;

        for failure in &outcome.failed {
            warn!(url = %failure.id, error = %failure.error, "Dropping unreachable reference");
        }
        outcome.succeeded
    }
}

/// Read title and body from an arbitrary article page.
pub fn extract_reference(doc: &Html, fields: &FieldSelectors, url: &str) -> Result<ReferenceDocument> {
    let title = extract_field(doc, FieldKind::Title, &fields.title, None).ok_or_else(|| {
        PipelineError::Extraction {
            url: url.to_string(),
            reason: "no title found by any selector".to_string(),
        }
    })?;

    let body = extract_field(doc, FieldKind::Body, &fields.body, Some(MIN_CANDIDATE_CHARS))
        .or_else(|| document_body_text(doc))
        .ok_or_else(|| PipelineError::Extraction {
            url: url.to_string(),
            reason: "page has no readable text".to_string(),
        })?;

    Ok(ReferenceDocument {
        title,
        body: truncate_chars(&body, MAX_BODY_CHARS),
        source_url: url.to_string(),
    })
}
