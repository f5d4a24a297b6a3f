//! Reference discovery through a web search engine.
//!
//! Queries go to DuckDuckGo's HTML endpoint through the shared browser.
//! Result blocks are parsed with the layouts in [`crate::selectors`], then
//! [`filter_hits`] drops excluded domains and obviously transactional pages
//! and keeps the first few survivors.
//!
//! Search never fails the run: any navigation or parsing problem degrades to
//! an empty hit list.

use crate::browser::{Browser, load_and_evaluate};
use crate::error::{PipelineError, Result};
use crate::models::SearchHit;
use crate::selectors::ResultLayout;
use crate::utils::normalize_inline;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

pub const SEARCH_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

/// Path fragments that mark a page as an article.
const CONTENT_MARKERS: &[&str] = &[
    "/blog", "/article", "/news", "/post", "/guide", "/insights", "/resources", "/learn", "/stories",
];

/// Path fragments that mark a page as a shop or account page.
const TRANSACTIONAL_MARKERS: &[&str] = &[
    "/product", "/pricing", "/login", "/signup", "/sign-up", "/cart", "/checkout",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
    /// Any hit whose URL contains one of these strings is dropped.
    pub excluded_domains: Vec<String>,
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            excluded_domains: vec!["beyondchats.com".to_string()],
            max_results: 2,
        }
    }
}

/// Results page URL for `query`.
pub fn search_url(query: &str) -> String {
    format!("{SEARCH_ENDPOINT}?q={}", urlencoding::encode(query))
}

/// Resolve a result link, unwrapping DuckDuckGo's `/l/?uddg=` redirect.
pub fn resolve_result_link(href: &str) -> Option<String> {
    let base = Url::parse(SEARCH_ENDPOINT).ok()?;
    let url = base.join(href.trim()).ok()?;

    let is_ddg = url.host_str().is_some_and(|h| h.ends_with("duckduckgo.com"));
    if is_ddg && url.path().starts_with("/l/") {
        return url
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned());
    }
    // ads and internal links point back at the engine
    if is_ddg {
        return None;
    }
    Some(url.to_string())
}

/// Parse result blocks with the first layout that yields any hit.
pub fn parse_results(doc: &Html, layouts: &[ResultLayout]) -> Vec<SearchHit> {
    for layout in layouts {
        let (Ok(block), Ok(title_sel), Ok(link_sel), Ok(snippet_sel)) = (
            Selector::parse(&layout.block),
            Selector::parse(&layout.title),
            Selector::parse(&layout.link),
            Selector::parse(&layout.snippet),
        ) else {
            warn!(block = %layout.block, "Skipping search layout with unparsable selector");
            continue;
        };

        let hits: Vec<SearchHit> = doc
            .select(&block)
            .filter_map(|result| {
                let url = result
                    .select(&link_sel)
                    .next()
                    .and_then(|a| a.value().attr("href"))
                    .and_then(resolve_result_link)?;
                let title = result
                    .select(&title_sel)
                    .next()
                    .map(|t| normalize_inline(&t.text().collect::<String>()))
                    .filter(|t| !t.is_empty())?;
                let snippet = result
                    .select(&snippet_sel)
                    .next()
                    .map(|s| normalize_inline(&s.text().collect::<String>()))
                    .filter(|s| !s.is_empty());
                Some(SearchHit { title, url, snippet })
            })
            .collect();

        if !hits.is_empty() {
            debug!(block = %layout.block, count = hits.len(), "Search layout matched");
            return hits;
        }
    }
    Vec::new()
}

fn is_content_like(path: &str) -> bool {
    let path = path.to_lowercase();
    CONTENT_MARKERS.iter().any(|m| path.contains(m)) || !TRANSACTIONAL_MARKERS.iter().any(|m| path.contains(m))
}

/// Keep at most `max_results` plausible article hits, in their original order.
///
/// Exclusion is checked first and always wins. Of the rest, a hit is kept if
/// its path has a content marker or has no transactional marker.
pub fn filter_hits(hits: Vec<SearchHit>, config: &SearchConfig) -> Vec<SearchHit> {
    let excluded: Vec<String> = config
        .excluded_domains
        .iter()
        .map(|d| d.trim().to_lowercase())
        .filter(|d| !d.is_empty())
        .collect();

    hits.into_iter()
        .filter(|hit| {
            let lowered = hit.url.to_lowercase();
            !excluded.iter().any(|d| lowered.contains(d.as_str()))
        })
        .filter(|hit| match Url::parse(&hit.url) {
            Ok(url) => matches!(url.scheme(), "http" | "https") && is_content_like(url.path()),
            Err(_) => false,
        })
        .take(config.max_results)
        .collect()
}

pub struct SearchDiscovery {
    layouts: Vec<ResultLayout>,
    config: SearchConfig,
}

impl SearchDiscovery {
    pub fn new(layouts: Vec<ResultLayout>, config: SearchConfig) -> Self {
        Self { layouts, config }
    }

    async fn try_search<B: Browser>(&self, browser: &B, query: &str) -> Result<Vec<SearchHit>> {
        let layouts = &self.layouts;
        load_and_evaluate(browser, &search_url(query), |doc| parse_results(doc, layouts))
            .await
            .map_err(|e| PipelineError::Search {
                query: query.to_string(),
                reason: e.to_string(),
            })
    }

    /// Raw hits for `query`; empty on any failure.
    #[instrument(level = "info", skip(self, browser))]
    pub async fn search<B: Browser>(&self, browser: &B, query: &str) -> Vec<SearchHit> {
        match self.try_search(browser, query).await {
            Ok(hits) => {
                info!(count = hits.len(), "Search returned hits");
                hits
            }
            Err(e) => {
                warn!(error = %e, "Search failed; continuing without references");
                Vec::new()
            }
        }
    }

    pub fn filter(&self, hits: Vec<SearchHit>) -> Vec<SearchHit> {
        filter_hits(hits, &self.config)
    }

    /// Search for an article title and filter the hits down to references.
    #[instrument(level = "info", skip(self, browser))]
    pub async fn search_and_filter<B: Browser>(&self, browser: &B, title: &str) -> Vec<SearchHit> {
        let hits = self.search(browser, title).await;
        let total = hits.len();
        let kept = self.filter(hits);
        if kept.is_empty() {
            warn!(total, "No usable references after filtering");
        } else {
            info!(total, kept = kept.len(), "Selected references");
            for hit in &kept {
                debug!(url = %hit.url, title = %hit.title, snippet = ?hit.snippet, "Reference candidate");
            }
        }
        kept
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::browser::fixture::FixtureBrowser;
    use crate::selectors::SelectorTable;

    fn hit(url: &str) -> SearchHit {
        SearchHit {
            title: format!("Title for {url}"),
            url: url.to_string(),
            snippet: None,
        }
    }

    /// A DuckDuckGo HTML results page linking to `urls` through redirects.
    pub fn results_page(urls: &[&str]) -> String {
        let blocks: String = urls
            .iter()
            .enumerate()
            .map(|(i, u)| {
                format!(
                    r##"<div class="result results_links web-result">
                        <h2 class="result__title"><a class="result__a" href="//duckduckgo.com/l/?uddg={}&amp;rut=abc">Result {i}</a></h2>
                        <a class="result__snippet" href="#">Snippet {i}</a>
                    </div>"##,
                    urlencoding::encode(u)
                )
            })
            .collect();
        format!("<html><body><div id='links'>{blocks}</div></body></html>")
    }

    #[test]
    fn test_filter_excludes_and_bounds() {
        let hits = vec![
            hit("https://beyondchats.com/blogs/a"),
            hit("https://www.beyondchats.com/"),
            hit("https://zendesk.com/blog/chatbots"),
            hit("https://beyondchats.com/pricing"),
            hit("https://beyondchats.com/blogs/b"),
            hit("https://intercom.com/learn/ai"),
            hit("https://beyondchats.com/about"),
            hit("https://hubspot.com/resources/bots"),
            hit("https://beyondchats.com/blogs/c"),
            hit("https://drift.com/articles/x"),
        ];
        let out = filter_hits(hits, &SearchConfig::default());
        let urls: Vec<_> = out.iter().map(|h| h.url.as_str()).collect();
        assert_eq!(urls, vec!["https://zendesk.com/blog/chatbots", "https://intercom.com/learn/ai"]);
    }

    #[test]
    fn test_filter_transactional_rules() {
        let config = SearchConfig {
            excluded_domains: vec![],
            max_results: 10,
        };
        let hits = vec![
            hit("https://shop.com/pricing"),
            hit("https://shop.com/blog/pricing-models"),
            hit("https://shop.com/about-us"),
            hit("https://shop.com/signup"),
            hit("ftp://files.com/blog/x"),
        ];
        let urls: Vec<_> = filter_hits(hits, &config).into_iter().map(|h| h.url).collect();
        assert_eq!(urls, vec!["https://shop.com/blog/pricing-models", "https://shop.com/about-us"]);
    }

    #[test]
    fn test_filter_never_returns_excluded() {
        let config = SearchConfig::default();
        for n in 0..12 {
            let hits: Vec<_> = (0..n)
                .map(|i| {
                    if i % 2 == 0 {
                        hit(&format!("https://beyondchats.com/blogs/{i}"))
                    } else {
                        hit(&format!("https://site{i}.com/blog/{i}"))
                    }
                })
                .collect();
            let out = filter_hits(hits, &config);
            assert!(out.len() <= 2);
            assert!(out.iter().all(|h| !h.url.contains("beyondchats.com")));
        }
    }

    #[test]
    fn test_resolve_result_link() {
        assert_eq!(
            resolve_result_link("//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fblog%2Fa%3Fx%3D1&rut=z").as_deref(),
            Some("https://example.com/blog/a?x=1")
        );
        assert_eq!(
            resolve_result_link("https://example.com/post").as_deref(),
            Some("https://example.com/post")
        );
        assert_eq!(resolve_result_link("https://duckduckgo.com/y.js?ad_domain=x"), None);
    }

    #[test]
    fn test_parse_results_html_layout() {
        let doc = Html::parse_document(&results_page(&["https://a.com/blog/1", "https://b.com/guide/2"]));
        let hits = parse_results(&doc, &SelectorTable::default().search);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://a.com/blog/1");
        assert_eq!(hits[0].title, "Result 0");
        assert_eq!(hits[1].snippet.as_deref(), Some("Snippet 1"));
    }

    #[test]
    fn test_parse_results_falls_back_to_second_layout() {
        let html = r#"<html><body>
            <article data-testid="result"><h2><a href="https://c.com/news/x">C news</a></h2>
            <div data-result="snippet">About C</div></article>
        </body></html>"#;
        let hits = parse_results(&Html::parse_document(html), &SelectorTable::default().search);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://c.com/news/x");
    }

    #[tokio::test]
    async fn test_search_failure_degrades_to_empty() {
        let browser = FixtureBrowser::new().with_failure(&search_url("chatbots"), "net::ERR_TIMED_OUT");
        let discovery = SearchDiscovery::new(SelectorTable::default().search, SearchConfig::default());
        assert!(discovery.search(&browser, "chatbots").await.is_empty());
        assert!(discovery.search_and_filter(&browser, "chatbots").await.is_empty());
        assert_eq!(browser.open_pages(), 0);
    }

    #[tokio::test]
    async fn test_search_and_filter_through_browser() {
        let query = "Why chatbots fail";
        let browser = FixtureBrowser::new().with_page(
            &search_url(query),
            results_page(&[
                "https://beyondchats.com/blogs/why-chatbots-fail/",
                "https://acme.com/pricing",
                "https://a.com/blog/1",
                "https://b.com/guide/2",
                "https://c.com/blog/3",
            ]),
        );
        let discovery = SearchDiscovery::new(SelectorTable::default().search, SearchConfig::default());
        let hits = discovery.search_and_filter(&browser, query).await;
        let urls: Vec<_> = hits.iter().map(|h| h.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.com/blog/1", "https://b.com/guide/2"]);
    }
}
