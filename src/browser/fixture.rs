//! In-process browser serving canned HTML, for tests.

use super::{Browser, Page};
use crate::error::{PipelineError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
enum Response {
    Html(String),
    Fail(String),
}

/// Browser whose pages resolve URLs from a fixed table.
///
/// Unknown URLs fail navigation. Open pages are counted so tests can assert
/// that every page handed out was disposed.
#[derive(Debug, Default, Clone)]
pub struct FixtureBrowser {
    responses: HashMap<String, Response>,
    open_pages: Arc<AtomicUsize>,
    pages_created: Arc<AtomicUsize>,
    visits: Arc<Mutex<Vec<String>>>,
}

impl FixtureBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, html: impl Into<String>) -> Self {
        self.responses.insert(url.to_string(), Response::Html(html.into()));
        self
    }

    pub fn with_failure(mut self, url: &str, reason: &str) -> Self {
        self.responses
            .insert(url.to_string(), Response::Fail(reason.to_string()));
        self
    }

    pub fn open_pages(&self) -> usize {
        self.open_pages.load(Ordering::SeqCst)
    }

    pub fn pages_created(&self) -> usize {
        self.pages_created.load(Ordering::SeqCst)
    }

    /// URLs navigated to, in order.
    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }
}

impl Browser for FixtureBrowser {
    type Page = FixturePage;

    async fn new_page(&self) -> Result<FixturePage> {
        self.open_pages.fetch_add(1, Ordering::SeqCst);
        self.pages_created.fetch_add(1, Ordering::SeqCst);
        Ok(FixturePage {
            browser: self.clone(),
            loaded: None,
            disposed: false,
        })
    }
}

pub struct FixturePage {
    browser: FixtureBrowser,
    loaded: Option<String>,
    disposed: bool,
}

impl Page for FixturePage {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.browser.visits.lock().unwrap().push(url.to_string());
        match self.browser.responses.get(url) {
            Some(Response::Html(html)) => {
                self.loaded = Some(html.clone());
                Ok(())
            }
            Some(Response::Fail(reason)) => Err(PipelineError::Navigation {
                url: url.to_string(),
                reason: reason.clone(),
            }),
            None => Err(PipelineError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            }),
        }
    }

    async fn content(&self) -> Result<String> {
        self.loaded
            .clone()
            .ok_or_else(|| PipelineError::Browser("nothing loaded".to_string()))
    }

    async fn dispose(&mut self) {
        if !self.disposed {
            self.disposed = true;
            self.browser.open_pages.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
