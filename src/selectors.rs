//! Ordered selector candidates for every field the scrapers extract.
//!
//! Heuristics live here as data rather than as branches in the scrapers, so a
//! new site layout is supported by adding a selector to a list. Lists are
//! walked front to back and the first non-empty match wins.
//!
//! The built-in tables can be replaced wholesale or partially from a YAML
//! file passed with `--selectors`:
//!
//! ```yaml
//! source:
//!   title: ["h1.entry-title", "h1"]
//! search:
//!   - block: "div.result"
//!     title: "a.result__a"
//!     link: "a.result__a"
//!     snippet: ".result__snippet"
//! ```

use serde::{Deserialize, Serialize};
use std::error::Error;
use tracing::{info, instrument};

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Candidate selectors for the logical fields of an article page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSelectors {
    pub title: Vec<String>,
    pub body: Vec<String>,
    pub author: Vec<String>,
    pub date: Vec<String>,
}

impl FieldSelectors {
    /// Selectors tuned for the primary blog.
    pub fn source() -> Self {
        Self {
            title: owned(&[
                "h1.entry-title",
                "h1.elementor-heading-title",
                "article h1",
                ".post-title",
                "h1",
                "meta[property='og:title']",
            ]),
            body: owned(&[
                ".entry-content",
                ".elementor-widget-theme-post-content",
                ".post-content",
                ".blog-content",
                "article .content",
                "article",
            ]),
            author: owned(&[
                ".author-name",
                ".elementor-post-info__item--type-author",
                "[rel='author']",
                ".byline .author",
                ".author",
                "meta[name='author']",
            ]),
            date: owned(&[
                "time[datetime]",
                "meta[property='article:published_time']",
                ".elementor-post-info__item--type-date",
                ".published",
                ".post-date",
                ".date",
                "time",
            ]),
        }
    }

    /// Broader selectors for arbitrary third-party pages.
    pub fn reference() -> Self {
        Self {
            title: owned(&[
                "h1.entry-title",
                "h1.post-title",
                "article h1",
                "main h1",
                "h1",
                "meta[property='og:title']",
                "title",
            ]),
            body: owned(&[
                ".entry-content",
                ".post-content",
                ".article-content",
                ".article-body",
                "[itemprop='articleBody']",
                ".blog-content",
                ".content-body",
                "article",
                "main",
                "[role='main']",
            ]),
            author: owned(&[
                "[rel='author']",
                ".author-name",
                ".author",
                "meta[name='author']",
            ]),
            date: owned(&[
                "time[datetime]",
                "meta[property='article:published_time']",
                ".published",
                "time",
            ]),
        }
    }
}

/// Candidates for locating the pagination control and article groupings of
/// the listing page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ListingSelectors {
    /// Containers that hold page-number links.
    pub pagination: Vec<String>,
    /// Containers that each wrap a single article teaser.
    pub article_groups: Vec<String>,
    /// Link inside a teaser, most specific first.
    pub group_link: Vec<String>,
    /// Regions scanned for article-looking anchors when no grouping matches.
    pub fallback_regions: Vec<String>,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            pagination: owned(&[
                ".pagination",
                "nav.elementor-pagination",
                ".page-numbers",
                ".nav-links",
                "nav[aria-label*='agination']",
                ".wp-pagenavi",
            ]),
            article_groups: owned(&[
                "article.elementor-post",
                "article.post",
                ".blog-post",
                ".post-card",
                "article",
                ".entry",
                ".card",
            ]),
            group_link: owned(&[
                ".elementor-post__title a[href]",
                ".entry-title a[href]",
                "h2 a[href]",
                "h3 a[href]",
                "a[href]",
            ]),
            fallback_regions: owned(&["main", "#content", ".content", "body"]),
        }
    }
}

/// One search results page layout.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ResultLayout {
    pub block: String,
    pub title: String,
    pub link: String,
    pub snippet: String,
}

fn default_search_layouts() -> Vec<ResultLayout> {
    vec![
        // DuckDuckGo HTML endpoint
        ResultLayout {
            block: "div.result".to_string(),
            title: "a.result__a".to_string(),
            link: "a.result__a".to_string(),
            snippet: ".result__snippet".to_string(),
        },
        // DuckDuckGo React frontend
        ResultLayout {
            block: "article[data-testid='result']".to_string(),
            title: "h2 > a".to_string(),
            link: "h2 > a".to_string(),
            snippet: "div[data-result='snippet']".to_string(),
        },
    ]
}

/// A YAML section overriding some fields of a [`FieldSelectors`].
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FieldOverrides {
    title: Option<Vec<String>>,
    body: Option<Vec<String>>,
    author: Option<Vec<String>>,
    date: Option<Vec<String>>,
}

impl FieldOverrides {
    /// Replace the fields of `base` that this section lists.
    fn apply(self, base: FieldSelectors) -> FieldSelectors {
        FieldSelectors {
            title: self.title.unwrap_or(base.title),
            body: self.body.unwrap_or(base.body),
            author: self.author.unwrap_or(base.author),
            date: self.date.unwrap_or(base.date),
        }
    }
}

/// The YAML file as written, before merging over the built-in tables.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct TableOverrides {
    source: FieldOverrides,
    reference: FieldOverrides,
    listing: ListingSelectors,
    search: Option<Vec<ResultLayout>>,
}

impl From<TableOverrides> for SelectorTable {
    fn from(overrides: TableOverrides) -> Self {
        Self {
            source: overrides.source.apply(FieldSelectors::source()),
            reference: overrides.reference.apply(FieldSelectors::reference()),
            listing: overrides.listing,
            search: overrides.search.unwrap_or_else(default_search_layouts),
        }
    }
}

/// Every selector table the pipeline uses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "TableOverrides")]
pub struct SelectorTable {
    pub source: FieldSelectors,
    pub reference: FieldSelectors,
    pub listing: ListingSelectors,
    pub search: Vec<ResultLayout>,
}

impl Default for SelectorTable {
    fn default() -> Self {
        Self {
            source: FieldSelectors::source(),
            reference: FieldSelectors::reference(),
            listing: ListingSelectors::default(),
            search: default_search_layouts(),
        }
    }
}

impl SelectorTable {
    /// Parse a YAML override. Missing sections keep their built-in defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Load the table from `path`, or the defaults when `path` is `None`.
    #[instrument(level = "info")]
    pub async fn load(path: Option<&str>) -> Result<Self, Box<dyn Error>> {
        match path {
            None => Ok(Self::default()),
            Some(path) => {
                let yaml = tokio::fs::read_to_string(path).await?;
                let table = Self::from_yaml(&yaml)?;
                info!(path, "Loaded selector overrides");
                Ok(table)
            }
        }
    }
}
