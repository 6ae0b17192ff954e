use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{ContentItem, SourceType};
use crate::{scraper, youtube};

/// Produces the full text of a discovered item.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(&self, item: &ContentItem) -> Result<String>;
}

/// Scrapes articles and downloads video transcripts.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebExtractor;

#[async_trait]
impl ContentExtractor for WebExtractor {
    async fn extract(&self, item: &ContentItem) -> Result<String> {
        match item.source_type {
            SourceType::Article => {
                let article = scraper::scrape_article(&item.url).await?;
                tracing::debug!("Scraped {} words from {}", article.word_count(), item.url);
                Ok(article.content)
            }
            SourceType::Youtube => youtube::transcript_text(&item.url).await,
            other => Err(AppError::Validation(format!(
                "Automatic extraction is not supported for {} items",
                other
            ))),
        }
    }
}
