//! Content discovery: topic → queries → candidates → relevant, unseen items → summaries.

use chrono::{Duration, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::llm::{self, LanguageModel};
use crate::models::{ContentItem, Ratings, SourceType, Summary, User, UserId};
use crate::scraper::truncate_chars;
use crate::search::SearchSource;
use crate::store::Store;

pub mod balance;
pub mod dedup;
pub mod extract;

pub use extract::{ContentExtractor, WebExtractor};

use dedup::normalize_url;

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub queries_per_topic: usize,
    pub min_content_chars: usize,
    pub max_stored_chars: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            queries_per_topic: 3,
            min_content_chars: 50,
            max_stored_chars: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ItemOutcome {
    Created(Summary),
    /// Another user's summary of the same URL, now linked to this user.
    Reused(Summary),
    /// Already in this user's history.
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchReport {
    pub success: bool,
    pub message: String,
    pub summaries: Vec<Summary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_items: Vec<String>,
    pub skipped: usize,
}

impl FetchReport {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            summaries: Vec::new(),
            failed_items: Vec::new(),
            skipped: 0,
        }
    }
}

pub struct ContentFetcher {
    store: Arc<dyn Store>,
    llm: Arc<dyn LanguageModel>,
    sources: Vec<Arc<dyn SearchSource>>,
    extractor: Arc<dyn ContentExtractor>,
    options: FetchOptions,
}

impl ContentFetcher {
    pub fn new(
        store: Arc<dyn Store>,
        llm: Arc<dyn LanguageModel>,
        sources: Vec<Arc<dyn SearchSource>>,
        extractor: Arc<dyn ContentExtractor>,
    ) -> Self {
        Self {
            store,
            llm,
            sources,
            extractor,
            options: FetchOptions::default(),
        }
    }

    pub fn with_options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Runs every search source for every query; failing sources contribute nothing.
    pub async fn search_all(&self, queries: &[String], window: Duration, max_results: usize) -> Vec<ContentItem> {
        let searches = queries.iter().flat_map(move |query| {
            self.sources.iter().map(move |source| async move {
                match source.search(query, window, max_results).await {
                    Ok(items) => {
                        tracing::debug!("{} returned {} items for '{}'", source.name(), items.len(), query);
                        items
                    }
                    Err(e) => {
                        tracing::warn!("{} search failed for '{}': {}", source.name(), query, e);
                        Vec::new()
                    }
                }
            })
        });

        join_all(searches).await.into_iter().flatten().collect()
    }

    /// Candidate items for one topic, relevance-filtered and balanced by type.
    pub async fn discover(&self, topic: &str, window: Duration, per_topic: usize) -> Vec<ContentItem> {
        let queries = llm::expand_queries(self.llm.as_ref(), topic, self.options.queries_per_topic).await;
        tracing::info!("Searching '{}' with {} queries", topic, queries.len());

        let found = self.search_all(&queries, window, per_topic).await;
        let unique = dedup::unique_by_url(found);
        let not_before = Utc::now() - window;
        let fresh = balance::within_window(unique, not_before);
        if fresh.is_empty() {
            tracing::info!("No fresh candidates for '{}'", topic);
            return fresh;
        }

        let selected = llm::filter_relevant(self.llm.as_ref(), topic, &fresh, not_before).await;
        let relevant: Vec<ContentItem> = selected.into_iter().map(|i| fresh[i].clone()).collect();
        tracing::info!("{} of {} candidates judged relevant for '{}'", relevant.len(), fresh.len(), topic);

        balance::interleave_by_type(relevant)
    }

    /// Normalized URLs of everything the user already owns or has saved.
    async fn history(&self, user: &User) -> Result<HashSet<String>> {
        let summaries = self.store.summaries_for_user(user.id).await?;
        Ok(summaries.iter().map(|s| normalize_url(&s.source_url)).collect())
    }

    pub async fn process_item(&self, user: &User, item: &ContentItem) -> ItemOutcome {
        match self.try_process_item(user, item).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Error processing content item {}: {}", item.url, e);
                ItemOutcome::Failed(e.to_string())
            }
        }
    }

    async fn try_process_item(&self, user: &User, item: &ContentItem) -> Result<ItemOutcome> {
        if let Some(existing) = self.store.find_summary_by_url(&item.url).await? {
            let linked = self.store.link_saved_summary(user.id, existing.id).await?;
            if existing.user_id == user.id || !linked {
                return Ok(ItemOutcome::Skipped);
            }
            tracing::debug!("Reusing summary {} for {}", existing.id, item.url);
            return Ok(ItemOutcome::Reused(existing));
        }

        let original = self.extractor.extract(item).await?;
        let original = original.trim();
        if original.chars().count() < self.options.min_content_chars {
            tracing::warn!("Insufficient content from {}", item.url);
            return Ok(ItemOutcome::Failed("insufficient content".to_string()));
        }

        let length = user.preferences.summary_length;
        let summary_text = llm::summarize(self.llm.as_ref(), original, length).await?;
        let topics = llm::detect_topics(self.llm.as_ref(), original).await;

        let summary = self
            .store
            .insert_summary(Summary {
                id: Uuid::new_v4(),
                user_id: user.id,
                title: item.title.clone(),
                original_content: truncate_chars(original, self.options.max_stored_chars),
                summary: summary_text,
                source_url: item.url.clone(),
                source_type: item.source_type,
                topics,
                ratings: Ratings::default(),
                created_at: Utc::now(),
            })
            .await?;
        self.store.link_saved_summary(user.id, summary.id).await?;

        Ok(ItemOutcome::Created(summary))
    }

    /// Summarizes a URL the user submitted directly, reusing any existing summary of it.
    pub async fn summarize_url(
        &self,
        user_id: UserId,
        url: &str,
        source_type: SourceType,
        title: Option<String>,
    ) -> Result<Summary> {
        let parsed = url::Url::parse(url.trim())
            .map_err(|_| AppError::Validation(format!("Invalid URL: {}", url)))?;
        let user = self.store.get_user(user_id).await?;
        let item = ContentItem {
            title: title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| parsed.to_string()),
            url: parsed.to_string(),
            snippet: String::new(),
            published_at: Utc::now(),
            source_type,
        };

        match self.try_process_item(&user, &item).await? {
            ItemOutcome::Created(summary) | ItemOutcome::Reused(summary) => Ok(summary),
            ItemOutcome::Skipped => self
                .store
                .find_summary_by_url(&item.url)
                .await?
                .ok_or_else(|| AppError::NotFound("Summary".into())),
            ItemOutcome::Failed(reason) => Err(AppError::Validation(format!(
                "Could not summarize {}: {}",
                item.url, reason
            ))),
        }
    }

    pub async fn fetch_for_user(&self, user_id: UserId) -> Result<FetchReport> {
        let user = self.store.get_user(user_id).await?;
        if !user.has_topics() {
            return Ok(FetchReport::failure("No topics found for user"));
        }

        let per_topic = user.preferences.items_per_topic();
        let window = user.preferences.delivery_frequency.window();
        let mut seen = self.history(&user).await?;

        let mut summaries = Vec::new();
        let mut failed_items = Vec::new();
        let mut skipped = 0;

        for topic in &user.preferences.topics {
            let candidates = self.discover(topic, window, per_topic).await;
            let mut taken = 0;

            for item in candidates {
                if taken >= per_topic {
                    break;
                }
                // Also suppresses the same URL surfacing under two topics
                if !seen.insert(normalize_url(&item.url)) {
                    skipped += 1;
                    continue;
                }

                match self.process_item(&user, &item).await {
                    ItemOutcome::Created(summary) | ItemOutcome::Reused(summary) => {
                        summaries.push(summary);
                        taken += 1;
                    }
                    ItemOutcome::Skipped => skipped += 1,
                    ItemOutcome::Failed(_) => failed_items.push(item.url.clone()),
                }
            }
        }

        if summaries.is_empty() {
            return Ok(FetchReport {
                success: false,
                message: "No new content could be processed".to_string(),
                summaries,
                failed_items,
                skipped,
            });
        }

        tracing::info!(
            "Processed {} items for user {} ({} failed, {} skipped)",
            summaries.len(),
            user.id,
            failed_items.len(),
            skipped
        );
        Ok(FetchReport {
            success: true,
            message: format!("Successfully processed {} items", summaries.len()),
            summaries,
            failed_items,
            skipped,
        })
    }
}
