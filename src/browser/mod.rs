//! Page sessions over an automated browser.
//!
//! The scrapers never talk to Chrome directly. They see two traits:
//!
//! - [`Browser`]: a shared process handle that hands out isolated pages
//! - [`Page`]: one page context that can navigate, run a pure extraction
//!   function against its DOM, and be disposed
//!
//! A page is a scoped resource. Whoever calls [`Browser::new_page`] must
//! call [`Page::dispose`] before returning, on the success path and on every
//! error path.
//!
//! [`chrome::ChromeBrowser`] is the production implementation; tests use an
//! in-process fixture serving static HTML.

pub mod chrome;
#[cfg(test)]
pub mod fixture;

use crate::error::Result;
use scraper::Html;

/// User agent sent by every page.
pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 ArticleEnhancer/0.1";

/// Viewport every page is created with.
pub const VIEWPORT: (u32, u32) = (1920, 1080);

/// Element whose presence marks a page as usable after navigation.
pub const BASELINE_SELECTOR: &str = "body";

/// A single page context.
pub trait Page {
    /// Load `url` and wait until the page has settled.
    ///
    /// Fails with [`crate::error::PipelineError::Navigation`] on network
    /// failure or when the navigation timeout elapses.
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Serialized DOM of the loaded page.
    async fn content(&self) -> Result<String>;

    /// Run a pure extraction function against the loaded DOM.
    ///
    /// Arguments are passed by capturing them in the closure.
    async fn evaluate<F, T>(&self, extract: F) -> Result<T>
    where
        F: FnOnce(&Html) -> T,
    {
        let html = self.content().await?;
        let doc = Html::parse_document(&html);
        Ok(extract(&doc))
    }

    /// Close the page. Safe to call more than once.
    async fn dispose(&mut self);
}

/// A browser process handing out pages.
pub trait Browser {
    type Page: Page;

    /// Open an isolated page configured with [`USER_AGENT`], [`VIEWPORT`]
    /// and the navigation timeout.
    async fn new_page(&self) -> Result<Self::Page>;
}

/// Navigate a fresh page to `url`, run `extract` on it and dispose the page.
///
/// The page is disposed whether navigation, evaluation or extraction fails.
pub async fn load_and_evaluate<B, F, T>(browser: &B, url: &str, extract: F) -> Result<T>
where
    B: Browser,
    F: FnOnce(&Html) -> T,
{
    let mut page = browser.new_page().await?;
    let result = match page.navigate(url).await {
        Ok(()) => page.evaluate(extract).await,
        Err(e) => Err(e),
    };
    page.dispose().await;
    result
}
