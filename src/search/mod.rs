//! Search sources that turn a query into candidate content items.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::Result;
use crate::models::ContentItem;

pub mod brave;
pub mod google;
pub mod youtube;

pub use brave::BraveMcpSearch;
pub use google::GoogleSearch;
pub use youtube::YouTubeSearch;

#[async_trait]
pub trait SearchSource: Send + Sync {
    fn name(&self) -> &str;

    /// Up to `max_results` items for `query`, published within `window` where the API supports it.
    async fn search(&self, query: &str, window: Duration, max_results: usize) -> Result<Vec<ContentItem>>;
}

pub(crate) fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v.trim()).ok())
        .map(|d| d.with_timezone(&Utc))
}
