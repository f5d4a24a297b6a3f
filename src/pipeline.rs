//! End-to-end run: discover, scrape, store, then enhance each stored article.
//!
//! ```text
//! listing ──► SourceScraper ──► store.create_article
//!                                    │
//!                   ┌────────────────┘ per stored article
//!                   ▼
//!         SearchDiscovery ──► ReferenceScraper ──► Enhancer ──► store.create_enhanced
//! ```
//!
//! Every multi-item step goes through [`run_batch`], so one bad page, one
//! duplicate record or one exhausted generation call costs exactly that
//! item. Only a listing that cannot be read at all ends the run early, and
//! even then a [`RunSummary`] is returned.

use crate::api::AskAsync;
use crate::batch::run_batch;
use crate::browser::Browser;
use crate::enhance::Enhancer;
use crate::error::Result;
use crate::models::{RunSummary, Stage, StageFailure, StoredArticle, StoredEnhancement};
use crate::scrapers::reference::ReferenceScraper;
use crate::scrapers::source::SourceScraper;
use crate::search::{SearchConfig, SearchDiscovery};
use crate::selectors::SelectorTable;
use crate::storage::ArticleStore;
use tracing::{debug, error, info, instrument};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub listing_url: String,
    /// How many of the oldest articles to process.
    pub article_count: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            listing_url: "https://beyondchats.com/blogs/".to_string(),
            article_count: 5,
        }
    }
}

/// An original article together with its stored enhancement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnhancedRecord {
    pub original: StoredArticle,
    pub enhancement: StoredEnhancement,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub summary: RunSummary,
    pub enhanced: Vec<EnhancedRecord>,
}

pub struct Pipeline<A> {
    config: PipelineConfig,
    selectors: SelectorTable,
    discovery: SearchDiscovery,
    references: ReferenceScraper,
    enhancer: Enhancer<A>,
}

impl<A: AskAsync> Pipeline<A> {
    pub fn new(config: PipelineConfig, selectors: SelectorTable, search: SearchConfig, enhancer: Enhancer<A>) -> Self {
        Self {
            discovery: SearchDiscovery::new(selectors.search.clone(), search),
            references: ReferenceScraper::new(selectors.reference.clone()),
            config,
            selectors,
            enhancer,
        }
    }

    #[instrument(level = "info", skip_all, fields(listing_url = %self.config.listing_url, count = self.config.article_count))]
    pub async fn run<B: Browser, S: ArticleStore>(&self, browser: &B, store: &S) -> RunReport {
        let mut summary = RunSummary::new(&self.config.listing_url);
        let mut scraper = SourceScraper::new(
            &self.config.listing_url,
            self.selectors.listing.clone(),
            self.selectors.source.clone(),
        );

        let links = match scraper.discover_oldest(browser, self.config.article_count).await {
            Ok(links) => links,
            Err(e) => {
                error!(error = %e, "Could not read the listing; nothing to do");
                summary.failures.push(StageFailure {
                    stage: Stage::Discover,
                    id: self.config.listing_url.clone(),
                    error: e.to_string(),
                });
                summary.finish();
                return RunReport {
                    summary,
                    enhanced: Vec::new(),
                };
            }
        };
        summary.discovered = links.len();

        let scraped = scraper.scrape_batch(browser, links).await;
        debug!(stage = ?scraper.stage(), "Source scraping finished");
        summary.scraped = scraped.succeeded.len();
        summary.record_failures(Stage::Scrape, &scraped.failed);

        let stored = run_batch(
            "store",
            scraped.succeeded,
            |a| a.source_url.clone(),
            |article| async move { store.create_article(&article).await },
        )
        .await;
        summary.stored = stored.succeeded.len();
        summary.record_failures(Stage::Store, &stored.failed);

        let enhanced = run_batch(
            "enhance",
            stored.succeeded,
            |s| s.article.source_url.clone(),
            |original| async move { self.enhance_one(browser, store, original).await },
        )
        .await;
        summary.enhanced = enhanced.succeeded.len();
        summary.record_failures(Stage::Enhance, &enhanced.failed);

        summary.finish();
        info!(
            discovered = summary.discovered,
            scraped = summary.scraped,
            stored = summary.stored,
            enhanced = summary.enhanced,
            scrape_failed = summary.failed_in(Stage::Scrape),
            store_failed = summary.failed_in(Stage::Store),
            enhance_failed = summary.failed_in(Stage::Enhance),
            "Run complete"
        );
        RunReport {
            summary,
            enhanced: enhanced.succeeded,
        }
    }

    /// Find references for one stored article, rewrite it and store the result.
    #[instrument(level = "info", skip_all, fields(id = original.id, title = %original.article.title))]
    async fn enhance_one<B: Browser, S: ArticleStore>(
        &self,
        browser: &B,
        store: &S,
        original: StoredArticle,
    ) -> Result<EnhancedRecord> {
        let hits = self.discovery.search_and_filter(browser, &original.article.title).await;
        let urls = hits.into_iter().map(|h| h.url).collect();
        let references = self.references.scrape_many(browser, urls).await;

        let document = self.enhancer.enhance(&original.article, &references).await?;
        let enhancement = store.create_enhanced(original.id, &document).await?;
        Ok(EnhancedRecord {
            original,
            enhancement,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RetryPolicy;
    use crate::api::tests::ScriptedAsk;
    use crate::browser::fixture::FixtureBrowser;
    use crate::enhance::REFERENCES_HEADER;
    use crate::scrapers::source::tests::{ROOT, article_page, listing_page};
    use crate::search::search_url;
    use crate::search::tests::results_page;
    use crate::storage::MemoryStore;
    use std::time::Duration;

    fn post(slug: &str) -> String {
        format!("{ROOT}{slug}/")
    }

    fn pipeline(client: &ScriptedAsk, count: usize) -> Pipeline<&ScriptedAsk> {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
        };
        Pipeline::new(
            PipelineConfig {
                listing_url: ROOT.to_string(),
                article_count: count,
            },
            SelectorTable::default(),
            SearchConfig::default(),
            Enhancer::new(client, policy),
        )
    }

    fn site() -> FixtureBrowser {
        FixtureBrowser::new()
            .with_page(ROOT, listing_page(&["a", "b", "c", "d"], ""))
            .with_page(&post("a"), article_page("Post a"))
            .with_page(&post("b"), article_page("Post b"))
            .with_failure(&post("c"), "timed out after 30s")
            .with_page(&post("d"), article_page("Post d"))
            .with_page(
                &search_url("Post a"),
                results_page(&[post("a").as_str(), "https://ref.com/pricing", "https://ref.com/blog/a1"]),
            )
            .with_page("https://ref.com/blog/a1", article_page("Reference A1"))
            .with_page(&search_url("Post d"), results_page(&["https://gone.com/blog/d1"]))
    }

    #[tokio::test]
    async fn test_run_isolates_every_kind_of_failure() {
        let browser = site();
        let store = MemoryStore::new();
        // a succeeds first try, b exhausts its retries, d succeeds
        let client = ScriptedAsk::new(vec![
            Ok("Enhanced A"),
            Err("503"),
            Err("503"),
            Err("503"),
            Ok("Enhanced D"),
        ]);

        let report = pipeline(&client, 4).run(&browser, &store).await;
        let summary = &report.summary;

        assert_eq!(summary.discovered, 4);
        assert_eq!(summary.scraped, 3);
        assert_eq!(summary.stored, 3);
        assert_eq!(summary.enhanced, 2);
        assert_eq!(summary.failed_in(Stage::Scrape), 1);
        assert_eq!(summary.failed_in(Stage::Enhance), 1);
        assert_eq!(summary.failures[0].id, post("c"));
        assert_eq!(summary.failures[1].id, post("b"));
        assert!(summary.failures[1].error.contains("after 3 attempt"));
        assert!(summary.finished_at.is_some());
        assert_eq!(client.calls(), 5);
        assert_eq!(browser.open_pages(), 0);

        let with_refs = &report.enhanced[0];
        assert_eq!(with_refs.original.article.title, "Post a");
        let body = store.get_enhanced(with_refs.original.id).await.unwrap().enhanced_body;
        assert!(body.starts_with("Enhanced A"));
        assert_eq!(body.matches(REFERENCES_HEADER).count(), 1);
        assert!(body.contains("[Reference A1](https://ref.com/blog/a1)"));
        assert_eq!(with_refs.enhancement.document.reference_urls, vec!["https://ref.com/blog/a1"]);

        let without_refs = &report.enhanced[1];
        assert_eq!(without_refs.original.article.title, "Post d");
        assert_eq!(without_refs.enhancement.document.enhanced_body, "Enhanced D");
        assert!(without_refs.enhancement.document.reference_urls.is_empty());
    }

    #[tokio::test]
    async fn test_rerun_hits_storage_conflicts() {
        let browser = site();
        let store = MemoryStore::new();
        let client = ScriptedAsk::new(vec![Ok("A"), Ok("B"), Ok("D")]);
        let p = pipeline(&client, 4);

        let first = p.run(&browser, &store).await;
        assert_eq!(first.summary.enhanced, 3);

        let second = p.run(&browser, &store).await;
        assert_eq!(second.summary.scraped, 3);
        assert_eq!(second.summary.stored, 0);
        assert_eq!(second.summary.failed_in(Stage::Store), 3);
        assert_eq!(second.summary.enhanced, 0);
        assert_eq!(client.calls(), 3);
        assert_eq!(store.articles().await.len(), 3);
    }

    #[tokio::test]
    async fn test_unreadable_listing_still_reports() {
        let browser = FixtureBrowser::new().with_failure(ROOT, "net::ERR_CONNECTION_RESET");
        let store = MemoryStore::new();
        let client = ScriptedAsk::default();

        let report = pipeline(&client, 5).run(&browser, &store).await;
        assert_eq!(report.summary.discovered, 0);
        assert_eq!(report.summary.failures.len(), 1);
        assert_eq!(report.summary.failures[0].stage, Stage::Discover);
        assert!(report.enhanced.is_empty());
        assert_eq!(client.calls(), 0);
    }
}
