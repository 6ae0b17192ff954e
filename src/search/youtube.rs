use async_trait::async_trait;
use chrono::{Duration, SecondsFormat, Utc};
use reqwest::Client;
use serde_json::Value;

use super::{parse_timestamp, SearchSource};
use crate::error::{AppError, Result};
use crate::models::{ContentItem, SourceType};
use crate::youtube::watch_url;

const ENDPOINT: &str = "https://www.googleapis.com/youtube/v3/search";

/// YouTube Data API video search.
pub struct YouTubeSearch {
    http: Client,
    api_key: String,
}

impl YouTubeSearch {
    pub fn new(http: Client, api_key: impl Into<String>) -> Self {
        Self { http, api_key: api_key.into() }
    }
}

pub fn parse_response(body: &Value) -> Vec<ContentItem> {
    let Some(items) = body["items"].as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let video_id = item["id"]["videoId"].as_str()?;
            let snippet = &item["snippet"];
            Some(ContentItem {
                title: snippet["title"].as_str().unwrap_or(video_id).to_string(),
                url: watch_url(video_id),
                snippet: snippet["description"].as_str().unwrap_or_default().to_string(),
                published_at: parse_timestamp(snippet["publishedAt"].as_str()).unwrap_or_else(Utc::now),
                source_type: SourceType::Youtube,
            })
        })
        .collect()
}

#[async_trait]
impl SearchSource for YouTubeSearch {
    fn name(&self) -> &str {
        "youtube"
    }

    async fn search(&self, query: &str, window: Duration, max_results: usize) -> Result<Vec<ContentItem>> {
        let published_after = (Utc::now() - window).to_rfc3339_opts(SecondsFormat::Secs, true);
        let max = max_results.clamp(1, 50).to_string();
        let res = self
            .http
            .get(ENDPOINT)
            .query(&[
                ("key", self.api_key.as_str()),
                ("q", query),
                ("part", "snippet"),
                ("type", "video"),
                ("order", "date"),
                ("maxResults", max.as_str()),
                ("publishedAfter", published_after.as_str()),
            ])
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(AppError::FetchError(format!("YouTube search returned {}", res.status())));
        }

        let body: Value = res.json().await?;
        Ok(parse_response(&body))
    }
}
