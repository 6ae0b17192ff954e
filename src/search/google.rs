use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::Client;
use serde_json::Value;

use super::{parse_timestamp, SearchSource};
use crate::config::GoogleSearchConfig;
use crate::error::{AppError, Result};
use crate::models::{ContentItem, SourceType};

const ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

/// Google Custom Search, used for articles.
pub struct GoogleSearch {
    http: Client,
    config: GoogleSearchConfig,
}

impl GoogleSearch {
    pub fn new(http: Client, config: GoogleSearchConfig) -> Self {
        Self { http, config }
    }
}

/// Maps a lookback window onto the API's `dateRestrict` values.
pub fn date_restrict(window: Duration) -> &'static str {
    match window.num_days() {
        d if d <= 1 => "d1",
        d if d <= 7 => "w1",
        _ => "m1",
    }
}

pub fn parse_response(body: &Value) -> Vec<ContentItem> {
    let Some(items) = body["items"].as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let url = item["link"].as_str()?.to_string();
            let published = item["pagemap"]["metatags"][0]["article:published_time"].as_str();
            Some(ContentItem {
                title: item["title"].as_str().unwrap_or(&url).to_string(),
                snippet: item["snippet"].as_str().unwrap_or_default().to_string(),
                published_at: parse_timestamp(published).unwrap_or_else(Utc::now),
                source_type: SourceType::Article,
                url,
            })
        })
        .collect()
}

#[async_trait]
impl SearchSource for GoogleSearch {
    fn name(&self) -> &str {
        "google"
    }

    async fn search(&self, query: &str, window: Duration, max_results: usize) -> Result<Vec<ContentItem>> {
        let num = max_results.clamp(1, 10).to_string();
        let res = self
            .http
            .get(ENDPOINT)
            .query(&[
                ("key", self.config.api_key.as_str()),
                ("cx", self.config.search_engine_id.as_str()),
                ("q", query),
                ("dateRestrict", date_restrict(window)),
                ("sort", "date"),
                ("num", num.as_str()),
            ])
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(AppError::FetchError(format!("Google search returned {}", res.status())));
        }

        let body: Value = res.json().await?;
        Ok(parse_response(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_date_restrict() {
        assert_eq!(date_restrict(Duration::days(1)), "d1");
        assert_eq!(date_restrict(Duration::days(7)), "w1");
        assert_eq!(date_restrict(Duration::days(30)), "m1");
    }

    #[test]
    fn test_parse_response() {
        let body = json!({
            "items": [
                {
                    "title": "Rust 2.0 announced",
                    "link": "https://blog.example.com/rust",
                    "snippet": "Big news",
                    "pagemap": {"metatags": [{"article:published_time": "2026-10-18T09:00:00Z"}]}
                },
                {"title": "No link"},
                {"link": "https://example.com/untitled"}
            ]
        });

        let items = parse_response(&body);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Rust 2.0 announced");
        assert_eq!(items[0].published_at.to_rfc3339(), "2026-10-18T09:00:00+00:00");
        assert_eq!(items[1].title, "https://example.com/untitled");
        assert_eq!(items[1].source_type, SourceType::Article);
    }

    #[test]
    fn test_parse_empty_response() {
        assert!(parse_response(&json!({"searchInformation": {}})).is_empty());
    }
}
