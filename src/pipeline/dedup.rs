use std::collections::HashSet;
use url::Url;

use crate::models::ContentItem;

/// Canonical form used to compare URLs: lower-case scheme and host, no
/// fragment, no `utm_*` parameters, no trailing slash.
pub fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();
    let Ok(mut url) = Url::parse(raw) else {
        return raw.trim_end_matches('/').to_ascii_lowercase();
    };

    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !k.starts_with("utm_"))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    let mut normalized = url.to_string();
    if url.query().is_none() {
        while normalized.ends_with('/') && normalized.len() > url.scheme().len() + 3 {
            normalized.pop();
        }
    }
    normalized
}

/// Keeps the first item for each normalized URL.
pub fn unique_by_url(items: Vec<ContentItem>) -> Vec<ContentItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(normalize_url(&item.url)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;
    use chrono::Utc;

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("HTTPS://Example.COM/Path/"), "https://example.com/Path");
        assert_eq!(normalize_url("https://example.com/a#section"), "https://example.com/a");
        assert_eq!(
            normalize_url("https://example.com/a?utm_source=x&id=3&utm_medium=y"),
            "https://example.com/a?id=3"
        );
        assert_eq!(normalize_url("https://example.com/"), "https://example.com");
        assert_eq!(
            normalize_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        );
    }

    #[test]
    fn test_unique_by_url_keeps_first() {
        let item = |title: &str, url: &str| ContentItem {
            title: title.into(),
            url: url.into(),
            snippet: String::new(),
            published_at: Utc::now(),
            source_type: SourceType::Article,
        };
        let items = vec![
            item("first", "https://a.io/post"),
            item("second", "https://a.io/post/?utm_campaign=rss"),
            item("third", "https://b.io/post"),
        ];
        let unique = unique_by_url(items);
        assert_eq!(unique.iter().map(|i| i.title.as_str()).collect::<Vec<_>>(), vec!["first", "third"]);
    }
}
