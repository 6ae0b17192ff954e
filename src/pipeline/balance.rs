use chrono::{DateTime, Utc};

use crate::models::{ContentItem, SourceType};

const ORDER: [SourceType; 4] = [
    SourceType::Article,
    SourceType::Youtube,
    SourceType::Podcast,
    SourceType::Document,
];

/// Drops items published before `not_before`.
pub fn within_window(items: Vec<ContentItem>, not_before: DateTime<Utc>) -> Vec<ContentItem> {
    items.into_iter().filter(|i| i.published_at >= not_before).collect()
}

/// Newest-first per source type, then round-robin across types so that a
/// truncated list keeps a mix of articles and videos.
pub fn interleave_by_type(items: Vec<ContentItem>) -> Vec<ContentItem> {
    let mut buckets: Vec<Vec<ContentItem>> = ORDER
        .iter()
        .map(|t| items.iter().filter(|i| i.source_type == *t).cloned().collect())
        .collect();

    for bucket in &mut buckets {
        // Reverse-sorted so pop() yields the newest
        bucket.sort_by(|a, b| a.published_at.cmp(&b.published_at));
    }

    let mut out = Vec::with_capacity(items.len());
    loop {
        let mut took = false;
        for bucket in &mut buckets {
            if let Some(item) = bucket.pop() {
                out.push(item);
                took = true;
            }
        }
        if !took {
            break;
        }
    }
    out
}
