//! The storage collaborator that persists scraped and enhanced articles.
//!
//! The pipeline only needs three calls, captured by [`ArticleStore`]:
//!
//! | Call | HTTP | Failure signals |
//! |------|------|-----------------|
//! | [`ArticleStore::create_article`] | `POST /articles` | `409` duplicate `sourceUrl` |
//! | [`ArticleStore::create_enhanced`] | `POST /articles/{id}/enhanced` | `404` unknown original, `409` already enhanced |
//! | [`ArticleStore::get_enhanced`] | `GET /articles/{id}/enhanced` | `404` |
//!
//! [`HttpStore`] talks to the REST API; [`MemoryStore`] keeps everything in
//! process with the same contract and backs dry runs.

use crate::error::StorageError;
use crate::models::{EnhancedDocument, ExtractedArticle, StoredArticle, StoredEnhancement};
use chrono::Utc;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

pub type StorageResult<T> = std::result::Result<T, StorageError>;

pub trait ArticleStore {
    /// Persist a scraped article. Conflicts if its `sourceUrl` is already stored.
    async fn create_article(&self, article: &ExtractedArticle) -> StorageResult<StoredArticle>;

    /// Attach an enhanced document to the article with id `original_id`.
    async fn create_enhanced(
        &self,
        original_id: i64,
        document: &EnhancedDocument,
    ) -> StorageResult<StoredEnhancement>;

    async fn get_enhanced(&self, original_id: i64) -> StorageResult<EnhancedDocument>;
}

/// Client for the storage REST API.
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    base_url: String,
}

impl HttpStore {
    pub fn new(base_url: &str) -> StorageResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("article_enhancer/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map error statuses to [`StorageError`] and decode the body otherwise.
    async fn decode<T: DeserializeOwned>(resp: Response, subject: String) -> StorageResult<T> {
        let status = resp.status();
        match status {
            StatusCode::CONFLICT => Err(StorageError::Conflict(subject)),
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(subject)),
            s if !s.is_success() => {
                let body = resp.text().await.unwrap_or_default();
                Err(StorageError::Api {
                    status: s.as_u16(),
                    message: body,
                })
            }
            _ => Ok(resp.json::<T>().await?),
        }
    }
}

impl ArticleStore for HttpStore {
    #[instrument(level = "info", skip_all, fields(url = %article.source_url))]
    async fn create_article(&self, article: &ExtractedArticle) -> StorageResult<StoredArticle> {
        let resp = self
            .client
            .post(self.endpoint("/articles"))
            .json(article)
            .send()
            .await?;
        let stored: StoredArticle = Self::decode(resp, format!("article {}", article.source_url)).await?;
        info!(id = stored.id, "Stored article");
        Ok(stored)
    }

    #[instrument(level = "info", skip(self, document))]
    async fn create_enhanced(
        &self,
        original_id: i64,
        document: &EnhancedDocument,
    ) -> StorageResult<StoredEnhancement> {
        let resp = self
            .client
            .post(self.endpoint(&format!("/articles/{original_id}/enhanced")))
            .json(document)
            .send()
            .await?;
        let stored: StoredEnhancement =
            Self::decode(resp, format!("enhanced version of article {original_id}")).await?;
        info!(id = stored.id, "Stored enhanced article");
        Ok(stored)
    }

    #[instrument(level = "info", skip(self))]
    async fn get_enhanced(&self, original_id: i64) -> StorageResult<EnhancedDocument> {
        let resp = self
            .client
            .get(self.endpoint(&format!("/articles/{original_id}/enhanced")))
            .send()
            .await?;
        Self::decode(resp, format!("enhanced version of article {original_id}")).await
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    articles: Vec<StoredArticle>,
    enhanced: HashMap<i64, StoredEnhancement>,
}

impl MemoryState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-process store with the same conflict and not-found rules as the API.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored articles in insertion order.
    pub async fn articles(&self) -> Vec<StoredArticle> {
        self.state.lock().await.articles.clone()
    }

    pub async fn enhanced_count(&self) -> usize {
        self.state.lock().await.enhanced.len()
    }
}

impl ArticleStore for MemoryStore {
    async fn create_article(&self, article: &ExtractedArticle) -> StorageResult<StoredArticle> {
        let mut state = self.state.lock().await;
        if state.articles.iter().any(|a| a.article.source_url == article.source_url) {
            return Err(StorageError::Conflict(format!("article {}", article.source_url)));
        }

        let now = Utc::now();
        let stored = StoredArticle {
            id: state.allocate_id(),
            article: article.clone(),
            created_at: now,
            updated_at: now,
        };
        state.articles.push(stored.clone());
        debug!(id = stored.id, url = %article.source_url, "Stored article in memory");
        Ok(stored)
    }

    async fn create_enhanced(
        &self,
        original_id: i64,
        document: &EnhancedDocument,
    ) -> StorageResult<StoredEnhancement> {
        let mut state = self.state.lock().await;
        if !state.articles.iter().any(|a| a.id == original_id) {
            return Err(StorageError::NotFound(format!("article {original_id}")));
        }
        if state.enhanced.contains_key(&original_id) {
            return Err(StorageError::Conflict(format!(
                "enhanced version of article {original_id}"
            )));
        }

        let stored = StoredEnhancement {
            id: state.allocate_id(),
            original_id,
            document: document.clone(),
        };
        state.enhanced.insert(original_id, stored.clone());
        Ok(stored)
    }

    async fn get_enhanced(&self, original_id: i64) -> StorageResult<EnhancedDocument> {
        self.state
            .lock()
            .await
            .enhanced
            .get(&original_id)
            .map(|e| e.document.clone())
            .ok_or_else(|| StorageError::NotFound(format!("enhanced version of article {original_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn article(url: &str) -> ExtractedArticle {
        ExtractedArticle {
            title: "Chatbots".to_string(),
            body: "Body text".to_string(),
            author: None,
            published_at: None,
            source_url: url.to_string(),
        }
    }

    fn document() -> EnhancedDocument {
        EnhancedDocument {
            enhanced_body: "Better body".to_string(),
            reference_urls: vec!["https://a.com/blog/1".to_string()],
        }
    }

    #[tokio::test]
    async fn test_memory_store_conflicts_on_duplicate_url() {
        let store = MemoryStore::new();
        let first = store.create_article(&article("https://x.com/1")).await.unwrap();
        let second = store.create_article(&article("https://x.com/2")).await.unwrap();
        assert_ne!(first.id, second.id);

        let err = store.create_article(&article("https://x.com/1")).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
        assert_eq!(store.articles().await.len(), 2);
    }

    #[tokio::test]
    async fn test_memory_store_enhanced_contract() {
        let store = MemoryStore::new();
        let err = store.create_enhanced(42, &document()).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));

        let original = store.create_article(&article("https://x.com/1")).await.unwrap();
        assert!(matches!(
            store.get_enhanced(original.id).await,
            Err(StorageError::NotFound(_))
        ));

        let stored = store.create_enhanced(original.id, &document()).await.unwrap();
        assert_eq!(stored.original_id, original.id);
        assert_eq!(store.get_enhanced(original.id).await.unwrap(), document());

        let err = store.create_enhanced(original.id, &document()).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
        assert_eq!(store.enhanced_count().await, 1);
    }

    #[tokio::test]
    async fn test_http_create_article() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/articles")
            .match_body(Matcher::PartialJson(json!({"sourceUrl": "https://x.com/1"})))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "id": 7,
                    "title": "Chatbots",
                    "body": "Body text",
                    "author": null,
                    "publishedAt": null,
                    "sourceUrl": "https://x.com/1",
                    "createdAt": "2024-05-01T10:00:00Z",
                    "updatedAt": "2024-05-01T10:00:00Z"
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let store = HttpStore::new(&format!("{}/", server.url())).unwrap();
        let stored = store.create_article(&article("https://x.com/1")).await.unwrap();
        assert_eq!(stored.id, 7);
        assert_eq!(stored.article.title, "Chatbots");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_status_mapping() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/articles")
            .with_status(409)
            .with_body(r#"{"error":"duplicate"}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/articles/3/enhanced")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/articles/5/enhanced")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let store = HttpStore::new(&server.url()).unwrap();
        assert!(matches!(
            store.create_article(&article("https://x.com/1")).await,
            Err(StorageError::Conflict(_))
        ));
        assert!(matches!(
            store.create_enhanced(3, &document()).await,
            Err(StorageError::NotFound(_))
        ));
        match store.get_enhanced(5).await {
            Err(StorageError::Api { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_http_get_enhanced() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/articles/9/enhanced")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "id": 12,
                    "originalId": 9,
                    "enhancedBody": "Better body",
                    "referenceUrls": ["https://a.com/blog/1"]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let store = HttpStore::new(&server.url()).unwrap();
        assert_eq!(store.get_enhanced(9).await.unwrap(), document());
    }
}
