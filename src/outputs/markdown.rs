//! Markdown rendering of enhanced articles.
//!
//! Each enhanced article becomes `{markdown_dir}/{slug}.md`: a title heading,
//! a line linking the original, then the enhanced body with its citation
//! block. A slug already used in the same run gets the original id appended.

use crate::pipeline::EnhancedRecord;
use crate::utils::slugify_title;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::Write;
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, instrument};

pub fn file_stem(record: &EnhancedRecord) -> String {
    let slug = slugify_title(&record.original.article.title);
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        format!("article-{}", record.original.id)
    } else {
        slug.to_string()
    }
}

pub fn render_markdown(record: &EnhancedRecord) -> String {
    let article = &record.original.article;
    let mut md = String::new();

    let _ = writeln!(md, "# {}\n", article.title);

    let mut byline = format!("*Original: [{}]({})", article.source_url, article.source_url);
    if let Some(author) = &article.author {
        let _ = write!(byline, " by {author}");
    }
    if let Some(date) = &article.published_at {
        let _ = write!(byline, ", {date}");
    }
    byline.push('*');
    let _ = writeln!(md, "{byline}\n");

    md.push_str(record.enhancement.document.enhanced_body.trim());
    md.push('\n');
    md
}

/// Write every record to `markdown_dir`, returning the paths written.
#[instrument(level = "info", skip_all, fields(%markdown_dir, count = records.len()))]
pub async fn write_enhanced(records: &[EnhancedRecord], markdown_dir: &str) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    fs::create_dir_all(markdown_dir).await?;

    let mut written = Vec::with_capacity(records.len());
    let mut used = HashSet::new();
    for record in records {
        let mut stem = file_stem(record);
        if !used.insert(stem.clone()) {
            stem = format!("{stem}-{}", record.original.id);
            used.insert(stem.clone());
        }
        let path = PathBuf::from(markdown_dir).join(format!("{stem}.md"));
        fs::write(&path, render_markdown(record)).await?;
        info!(path = %path.display(), "Wrote enhanced article Markdown");
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EnhancedDocument, ExtractedArticle, StoredArticle, StoredEnhancement};
    use chrono::Utc;

    fn record(title: &str) -> EnhancedRecord {
        let now = Utc::now();
        EnhancedRecord {
            original: StoredArticle {
                id: 3,
                article: ExtractedArticle {
                    title: title.to_string(),
                    body: "Old body".to_string(),
                    author: Some("Jane Doe".to_string()),
                    published_at: Some("2022-03-01".to_string()),
                    source_url: "https://beyondchats.com/blogs/x/".to_string(),
                },
                created_at: now,
                updated_at: now,
            },
            enhancement: StoredEnhancement {
                id: 4,
                original_id: 3,
                document: EnhancedDocument {
                    enhanced_body: "New body\n\n---\n\n## References\n\n1. [R](https://r.com/blog)\n".to_string(),
                    reference_urls: vec!["https://r.com/blog".to_string()],
                },
            },
        }
    }

    #[test]
    fn test_render_markdown() {
        let md = render_markdown(&record("Why Chatbots Fail"));
        assert!(md.starts_with("# Why Chatbots Fail\n\n"));
        assert!(md.contains(
            "*Original: [https://beyondchats.com/blogs/x/](https://beyondchats.com/blogs/x/) by Jane Doe, 2022-03-01*"
        ));
        assert!(md.ends_with("1. [R](https://r.com/blog)\n"));
    }

    #[test]
    fn test_file_stem_falls_back_to_id() {
        assert_eq!(file_stem(&record("Why Chatbots Fail")), "why-chatbots-fail");
        assert_eq!(file_stem(&record("???")), "article-3");
    }

    #[tokio::test]
    async fn test_write_enhanced() {
        let dir = std::env::temp_dir().join(format!("article_enhancer_md_{}", std::process::id()));
        let dir = dir.to_string_lossy().to_string();

        let paths = write_enhanced(&[record("First Post")], &dir).await.unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].ends_with("first-post.md"));
        let raw = tokio::fs::read_to_string(&paths[0]).await.unwrap();
        assert!(raw.contains("New body"));

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_write_enhanced_keeps_articles_with_same_slug() {
        let dir = std::env::temp_dir().join(format!("article_enhancer_md_dupes_{}", std::process::id()));
        let dir = dir.to_string_lossy().to_string();

        let first = record("Chatbots: A Guide");
        let mut second = record("Chatbots, a guide");
        second.original.id = 9;
        second.enhancement.document.enhanced_body = "Second body".to_string();

        let paths = write_enhanced(&[first, second], &dir).await.unwrap();
        assert_eq!(paths.len(), 2);
        assert_ne!(paths[0], paths[1]);
        assert!(paths[0].ends_with("chatbots-a-guide.md"));
        assert!(paths[1].ends_with("chatbots-a-guide-9.md"));
        assert!(tokio::fs::read_to_string(&paths[0]).await.unwrap().contains("New body"));
        assert!(tokio::fs::read_to_string(&paths[1]).await.unwrap().contains("Second body"));

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
