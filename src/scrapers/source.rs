//! Scraper for the primary blog.
//!
//! The blog lists articles newest first across numbered pages, so the oldest
//! articles sit at the tail of the last page. Scraping runs through four
//! stages:
//!
//! ```text
//! Idle -> FoundLastPage -> LinksExtracted -> Completed
//! ```
//!
//! 1. [`SourceScraper::locate_last_page`] reads the pagination control of the
//!    listing root (no pagination means the root is the last page)
//! 2. [`SourceScraper::extract_article_links`] collects article links from a
//!    listing page and keeps the last `count`
//! 3. [`SourceScraper::scrape_batch`] extracts every article independently

use crate::batch::run_batch;
use crate::browser::{Browser, load_and_evaluate};
use crate::error::{PipelineError, Result};
use crate::extract::{FieldKind, extract_field};
use crate::models::{BatchOutcome, ExtractedArticle};
use crate::selectors::{FieldSelectors, ListingSelectors};
use crate::utils::normalize_inline;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Minimum body length, in characters, for a primary article.
pub const MIN_BODY_CHARS: usize = 100;

static PAGE_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(?:page\s*)?(\d+)$").unwrap());
static PAGE_IN_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(/page/|[?&](?:page|paged|p)=)(\d+)").unwrap());
static ARTICLE_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/(?:blogs?|articles?|posts?|news)/[^/?#]+/?$").unwrap());
static NON_ARTICLE_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/(?:page|tag|tags|category|categories|author)/").unwrap());

/// Where the scraper is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeStage {
    Idle,
    FoundLastPage,
    LinksExtracted,
    Completed,
}

/// The last listing page and, when pagination exposed it, its number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastPage {
    pub url: String,
    pub number: Option<u32>,
}

pub struct SourceScraper {
    listing_url: String,
    listing: ListingSelectors,
    fields: FieldSelectors,
    stage: ScrapeStage,
}

impl SourceScraper {
    pub fn new(listing_url: &str, listing: ListingSelectors, fields: FieldSelectors) -> Self {
        Self {
            listing_url: listing_url.to_string(),
            listing,
            fields,
            stage: ScrapeStage::Idle,
        }
    }

    pub fn stage(&self) -> ScrapeStage {
        self.stage
    }

    fn advance(&mut self, next: ScrapeStage) {
        debug!(from = ?self.stage, to = ?next, "Scrape stage transition");
        self.stage = next;
    }

    /// Find the highest-numbered listing page.
    #[instrument(level = "info", skip_all, fields(listing_url = %self.listing_url))]
    pub async fn locate_last_page<B: Browser>(&mut self, browser: &B) -> Result<LastPage> {
        let base = parse_url(&self.listing_url)?;
        let listing = &self.listing;
        let found = load_and_evaluate(browser, &self.listing_url, |doc| {
            find_last_page(doc, &base, listing)
        })
        .await?;

        let last = found.unwrap_or_else(|| {
            info!("No pagination found; the listing root is the last page");
            LastPage {
                url: self.listing_url.clone(),
                number: None,
            }
        });
        info!(url = %last.url, number = ?last.number, "Located last listing page");
        self.advance(ScrapeStage::FoundLastPage);
        Ok(last)
    }

    /// Article links on `page_url`, keeping the last `count` in document order.
    #[instrument(level = "info", skip(self, browser))]
    pub async fn extract_article_links<B: Browser>(
        &mut self,
        browser: &B,
        page_url: &str,
        count: usize,
    ) -> Result<Vec<String>> {
        let links = self.page_links(browser, page_url).await?;
        let links = keep_last(links, count);
        self.advance(ScrapeStage::LinksExtracted);
        Ok(links)
    }

    /// The `count` oldest article links of the whole listing.
    ///
    /// Starts from the last page and, while it holds fewer than `count`
    /// links, prepends the tail of the page before it. Returns fewer links
    /// only when the listing runs out or earlier page URLs cannot be derived.
    #[instrument(level = "info", skip(self, browser))]
    pub async fn discover_oldest<B: Browser>(&mut self, browser: &B, count: usize) -> Result<Vec<String>> {
        let last = self.locate_last_page(browser).await?;
        let mut links = self.extract_article_links(browser, &last.url, count).await?;

        if let Some(mut number) = last.number {
            while links.len() < count && number > 1 {
                number -= 1;
                let Some(previous) = sibling_page_url(&last.url, number) else {
                    warn!(url = %last.url, "Cannot derive earlier page URL; returning fewer links");
                    break;
                };
                let mut earlier = match self.page_links(browser, &previous).await {
                    Ok(earlier) => earlier,
                    Err(e) => {
                        warn!(url = %previous, error = %e, "Backfill page failed; returning fewer links");
                        break;
                    }
                };
                earlier.retain(|l| !links.contains(l));
                info!(url = %previous, found = earlier.len(), "Backfilling from earlier page");
                earlier.append(&mut links);
                links = earlier;
            }
        }

        if links.len() < count {
            warn!(requested = count, found = links.len(), "Listing holds fewer articles than requested");
        }
        let links = keep_last(links, count);
        info!(count = links.len(), "Selected oldest article links");
        Ok(links)
    }

    async fn page_links<B: Browser>(&self, browser: &B, page_url: &str) -> Result<Vec<String>> {
        let base = parse_url(page_url)?;
        let listing = &self.listing;
        let links = load_and_evaluate(browser, page_url, |doc| {
            collect_article_links(doc, &base, listing)
        })
        .await?;
        debug!(%page_url, count = links.len(), "Collected article links");
        Ok(links)
    }

    /// Scrape a single article page.
    #[instrument(level = "info", skip(self, browser))]
    pub async fn scrape_one<B: Browser>(&self, browser: &B, url: &str) -> Result<ExtractedArticle> {
        let fields = &self.fields;
        let article = load_and_evaluate(browser, url, |doc| extract_article(doc, fields, url)).await??;
        info!(title = %article.title, body_chars = article.body.chars().count(), "Scraped article");
        Ok(article)
    }

    /// Scrape every link, isolating failures per page.
    #[instrument(level = "info", skip_all, fields(count = links.len()))]
    pub async fn scrape_batch<B: Browser>(
        &mut self,
        browser: &B,
        links: Vec<String>,
    ) -> BatchOutcome<ExtractedArticle> {
        let this = &*self;
        let outcome = run_batch("scrape", links, |url| url.clone(), move |url| async move {
            this.scrape_one(browser, &url).await
        })
        .await;
        self.advance(ScrapeStage::Completed);
        outcome
    }
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| PipelineError::Navigation {
        url: url.to_string(),
        reason: format!("invalid URL: {e}"),
    })
}

fn keep_last(links: Vec<String>, count: usize) -> Vec<String> {
    let skip = links.len().saturating_sub(count);
    links.into_iter().skip(skip).collect()
}

/// Read title, body, author and date from an article page.
pub fn extract_article(doc: &Html, fields: &FieldSelectors, url: &str) -> Result<ExtractedArticle> {
    let missing = |what: &str| PipelineError::Extraction {
        url: url.to_string(),
        reason: format!("no {what} found by any selector"),
    };

    let title = extract_field(doc, FieldKind::Title, &fields.title, None).ok_or_else(|| missing("title"))?;
    let body = extract_field(doc, FieldKind::Body, &fields.body, Some(MIN_BODY_CHARS))
        .ok_or_else(|| missing(&format!("body of at least {MIN_BODY_CHARS} characters")))?;

    Ok(ExtractedArticle {
        title,
        body,
        author: extract_field(doc, FieldKind::Author, &fields.author, None),
        published_at: extract_field(doc, FieldKind::Date, &fields.date, None),
        source_url: url.to_string(),
    })
}

fn parse_selector(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(s) => Some(s),
        Err(e) => {
            warn!(%selector, error = ?e, "Skipping unparsable selector");
            None
        }
    }
}

fn resolve(base: &Url, anchor: ElementRef<'_>) -> Option<Url> {
    let href = anchor.value().attr("href")?.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let url = base.join(href).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

fn is_last_marker(anchor: ElementRef<'_>, label: &str) -> bool {
    let el = anchor.value();
    let aria = el.attr("aria-label").unwrap_or_default().to_lowercase();
    let class = el.attr("class").unwrap_or_default().to_lowercase();
    let label = label.to_lowercase();
    label.contains("last") || aria.contains("last") || class.split_whitespace().any(|c| c == "last") || label == "»»"
}

/// Page number encoded in a listing URL (`/page/7/`, `?page=7`, `?paged=7`).
pub fn page_number_from_url(url: &str) -> Option<u32> {
    PAGE_IN_URL
        .captures_iter(url)
        .last()
        .and_then(|c| c.get(2))
        .and_then(|m| m.as_str().parse().ok())
}

/// `url` with its page number replaced by `page`.
pub fn sibling_page_url(url: &str, page: u32) -> Option<String> {
    let caps = PAGE_IN_URL.captures_iter(url).last()?;
    let digits = caps.get(2)?;
    Some(format!("{}{}{}", &url[..digits.start()], page, &url[digits.end()..]))
}

/// Locate the last listing page from the pagination control.
///
/// Within the first pagination container that yields anything, an explicit
/// "last" link wins outright; otherwise the highest numeric label wins.
pub fn find_last_page(doc: &Html, base: &Url, listing: &ListingSelectors) -> Option<LastPage> {
    let anchor_sel = parse_selector("a[href]")?;

    for candidate in &listing.pagination {
        let Some(selector) = parse_selector(candidate) else {
            continue;
        };
        let Some(container) = doc.select(&selector).next() else {
            continue;
        };

        let mut highest: Option<(u32, Url)> = None;
        for anchor in container.select(&anchor_sel) {
            let Some(url) = resolve(base, anchor) else {
                continue;
            };
            let label = normalize_inline(&anchor.text().collect::<String>());

            if is_last_marker(anchor, &label) {
                debug!(%url, "Pagination has an explicit last-page link");
                return Some(LastPage {
                    number: page_number_from_url(url.as_str()),
                    url: url.to_string(),
                });
            }

            let Some(n) = PAGE_LABEL
                .captures(&label)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<u32>().ok())
            else {
                continue;
            };
            if highest.as_ref().is_none_or(|(best, _)| n > *best) {
                highest = Some((n, url));
            }
        }

        if let Some((number, url)) = highest {
            return Some(LastPage {
                url: url.to_string(),
                number: Some(number),
            });
        }
    }
    None
}

/// Absolute article links of a listing page, in document order, deduplicated.
///
/// Tries each article grouping selector in turn; if none matches, scans the
/// first fallback region for anchors whose path looks like an article.
pub fn collect_article_links(doc: &Html, base: &Url, listing: &ListingSelectors) -> Vec<String> {
    let link_selectors: Vec<Selector> = listing.group_link.iter().filter_map(|s| parse_selector(s)).collect();

    for candidate in &listing.article_groups {
        let Some(selector) = parse_selector(candidate) else {
            continue;
        };
        let links: Vec<String> = doc
            .select(&selector)
            .filter_map(|group| {
                link_selectors
                    .iter()
                    .find_map(|ls| group.select(ls).find_map(|a| resolve(base, a)))
            })
            .map(|u| u.to_string())
            .unique()
            .collect();
        if !links.is_empty() {
            debug!(selector = %candidate, count = links.len(), "Article groups matched");
            return links;
        }
    }

    let Some(anchor_sel) = parse_selector("a[href]") else {
        return Vec::new();
    };
    for region in &listing.fallback_regions {
        let Some(selector) = parse_selector(region) else {
            continue;
        };
        let Some(root) = doc.select(&selector).next() else {
            continue;
        };
        let links: Vec<String> = root
            .select(&anchor_sel)
            .filter_map(|a| resolve(base, a))
            .filter(|u| u.host_str() == base.host_str())
            .filter(|u| ARTICLE_PATH.is_match(u.path()) && !NON_ARTICLE_PATH.is_match(u.path()))
            .filter(|u| u.path().trim_end_matches('/') != base.path().trim_end_matches('/'))
            .map(|u| u.to_string())
            .unique()
            .collect();
        debug!(region = %region, count = links.len(), "Fell back to scanning anchors");
        return links;
    }
    Vec::new()
}
