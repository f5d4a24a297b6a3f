//! Article enhancement: prompt construction, the retried generation call and
//! the citation block.
//!
//! The model is asked to rewrite the original using the references as
//! comparison material. Whatever comes back, the reference list is appended
//! here, deterministically, instead of trusting the model to cite.

use crate::api::{AskAsync, RetryAsk, RetryPolicy};
use crate::error::{PipelineError, Result};
use crate::models::{EnhancedDocument, ExtractedArticle, ReferenceDocument};
use crate::utils::{normalize_inline, truncate_chars, truncate_for_log};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Write;
use tracing::{debug, info, instrument};

/// Characters of each reference body quoted in the prompt.
pub const REFERENCE_EXCERPT_CHARS: usize = 2_000;

/// Heading of the appended citation block.
pub const REFERENCES_HEADER: &str = "## References";

/// Separator between the generated text and the citation block.
const SECTION_SEPARATOR: &str = "\n\n---\n\n";

/// A line that opens a references section written by the model itself.
static MODEL_REFERENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*(?:#{1,6}\s*|\*\*)(?:references|sources|citations):?(?:\*\*)?:?\s*$").unwrap()
});

/// Any markdown heading line.
static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*#{1,6}\s").unwrap());

/// Build the user prompt for one article.
///
/// The original title and body are embedded verbatim; each reference
/// contributes its title, URL and a body excerpt of at most
/// [`REFERENCE_EXCERPT_CHARS`] characters.
pub fn build_prompt(original: &ExtractedArticle, references: &[ReferenceDocument]) -> String {
    let mut prompt = String::new();

    prompt.push_str(
        "You are an experienced editor. Improve the blog article below so it reads as well as \
         the best articles currently published on the same topic.\n\n",
    );

    prompt.push_str("=== ORIGINAL ARTICLE ===\n");
    let _ = writeln!(prompt, "Title: {}\n", original.title);
    prompt.push_str(&original.body);
    prompt.push_str("\n\n");

    prompt.push_str("=== REFERENCE ARTICLES ===\n");
    if references.is_empty() {
        prompt.push_str("No reference articles are available. Improve the article on its own merits.\n\n");
    } else {
        prompt.push_str(
            "These articles cover the same topic. Study their structure, depth and formatting. \
             Do not copy sentences from them.\n\n",
        );
        for (i, reference) in references.iter().enumerate() {
            let _ = writeln!(prompt, "--- Reference {} ---", i + 1);
            let _ = writeln!(prompt, "Title: {}", reference.title);
            let _ = writeln!(prompt, "URL: {}", reference.source_url);
            prompt.push_str(&truncate_chars(&reference.body, REFERENCE_EXCERPT_CHARS));
            prompt.push_str("\n\n");
        }
    }

    prompt.push_str("=== INSTRUCTIONS ===\n");
    prompt.push_str(
        "1. Restructure and clarify the original article. Keep its topic, facts and intent.\n\
         2. Match the depth and formatting of the reference articles where it helps the reader.\n\
         3. Use markdown: ## headings for sections, short paragraphs, lists where appropriate.\n\
         4. Do not invent statistics, quotes, names or sources.\n\
         5. Do not add a references or sources section. Citations are added separately.\n\
         6. Return only the article body. No title line, no preamble, no notes about what you changed.\n",
    );

    prompt
}

/// Cut a references section the model wrote on its own, but only when it is
/// the final section of `body`. A sources heading followed by further
/// headings is part of the article and stays.
fn strip_trailing_references(body: &str) -> &str {
    let trailing = MODEL_REFERENCES
        .find_iter(body)
        .find(|m| !HEADING.is_match(&body[m.end()..]));
    match trailing {
        Some(m) => body[..m.start()].trim_end().trim_end_matches("---").trim_end(),
        None => body,
    }
}

/// Strip wrapping code fences the model sometimes puts around its answer,
/// then any trailing references section it wrote despite the instructions.
pub fn clean_generated(text: &str) -> String {
    let mut text = text.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // drop the info string (`markdown`, `md`, ...) on the fence line
        text = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
        text = text.trim_end().strip_suffix("```").unwrap_or(text);
    }
    strip_trailing_references(text.trim()).trim().to_string()
}

/// Append the citation block for `references` to `body`.
///
/// With no references the trimmed body comes back unchanged. Otherwise the
/// result is the body, a separator, [`REFERENCES_HEADER`] and one numbered
/// markdown link per reference in list order, numbered from 1. `body` is
/// expected to have been through [`clean_generated`] already.
pub fn attach_citations(body: &str, references: &[ReferenceDocument]) -> String {
    let body = body.trim();
    if references.is_empty() {
        return body.to_string();
    }

    let mut out = String::with_capacity(body.len() + 128 * references.len());
    out.push_str(body);
    out.push_str(SECTION_SEPARATOR);
    out.push_str(REFERENCES_HEADER);
    out.push_str("\n\n");
    for (i, reference) in references.iter().enumerate() {
        let title = normalize_inline(&reference.title);
        let title = if title.is_empty() { reference.source_url.clone() } else { title };
        let _ = writeln!(out, "{}. [{}]({})", i + 1, title, reference.source_url);
    }
    out.trim_end().to_string()
}

/// Prompt, call with retry, clean, cite.
pub struct Enhancer<A> {
    client: RetryAsk<A>,
}

impl<A: AskAsync> Enhancer<A> {
    pub fn new(client: A, policy: RetryPolicy) -> Self {
        Self {
            client: RetryAsk::new(client, policy),
        }
    }

    /// Produce the enhanced document for `original`.
    ///
    /// Fails with [`PipelineError::Generation`] once the retry budget is spent;
    /// the caller decides whether that stops anything beyond this article.
    #[instrument(level = "info", skip_all, fields(url = %original.source_url, references = references.len()))]
    pub async fn enhance(
        &self,
        original: &ExtractedArticle,
        references: &[ReferenceDocument],
    ) -> Result<EnhancedDocument> {
        let prompt = build_prompt(original, references);
        let generated = self.client.ask_with_retry(&prompt).await?;
        debug!(response_preview = %truncate_for_log(&generated, 300), "Model response");

        let cleaned = clean_generated(&generated);
        if cleaned.is_empty() {
            return Err(PipelineError::Generation {
                attempts: 1,
                reason: "response contained no article text".to_string(),
            });
        }

        let enhanced_body = attach_citations(&cleaned, references);
        info!(
            original_chars = original.body.chars().count(),
            enhanced_chars = enhanced_body.chars().count(),
            "Enhanced article"
        );

        Ok(EnhancedDocument {
            enhanced_body,
            reference_urls: references.iter().map(|r| r.source_url.clone()).collect(),
        })
    }
}
