use reqwest::{Client, ClientBuilder};
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use once_cell::sync::Lazy;
use crate::error::{AppError, Result};

// Create a static client to reuse connections
pub static CLIENT: Lazy<Client> = Lazy::new(|| {
    ClientBuilder::new()
        .timeout(Duration::from_secs(10))
        .connect_timeout(Duration::from_secs(5))
        .pool_max_idle_per_host(10)
        .user_agent("Mozilla/5.0 (compatible; ConciselyBot/0.1)")
        .build()
        .expect("Failed to build HTTP client")
});

static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("title").expect("Failed to parse title selector")
});
static H1_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("h1").expect("Failed to parse h1 selector")
});
static ARTICLE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("article").expect("Failed to parse article selector")
});
static MAIN_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("main").expect("Failed to parse main selector")
});
static P_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("p").expect("Failed to parse p selector")
});

const EXCLUDED_TAGS: &[&str] = &["script", "style", "nav", "footer", "header", "aside", "noscript"];
const EXCLUDED_CLASSES: &[&str] = &["ads", "comments"];

#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedArticle {
    pub title: String,
    pub content: String,
}

impl ScrapedArticle {
    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }
}

pub async fn fetch_html(url: &str) -> Result<String> {
    let response = CLIENT.get(url).send().await?;
    if !response.status().is_success() {
        return Err(AppError::FetchError(format!("{} returned {}", url, response.status())));
    }
    let html = response.text().await?;
    Ok(html)
}

pub async fn scrape_article(url: &str) -> Result<ScrapedArticle> {
    let html = fetch_html(url).await?;
    let article = extract_article(&html);
    if article.content.is_empty() {
        return Err(AppError::ParseError(format!("No readable content found at {}", url)));
    }
    Ok(article)
}

/// Pulls the title and readable body text out of a page.
pub fn extract_article(html: &str) -> ScrapedArticle {
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE_SELECTOR)
        .chain(document.select(&H1_SELECTOR))
        .map(|e| collapse_spaces(&visible_text(e)))
        .find(|t| !t.is_empty())
        .unwrap_or_default();

    let content = if let Some(article) = document.select(&ARTICLE_SELECTOR).next() {
        format_text(&visible_text(article))
    } else if let Some(main) = document.select(&MAIN_SELECTOR).next() {
        join_paragraphs(main.select(&P_SELECTOR))
    } else {
        join_paragraphs(document.select(&P_SELECTOR))
    };

    ScrapedArticle { title, content }
}

fn join_paragraphs<'a>(paragraphs: impl Iterator<Item = ElementRef<'a>>) -> String {
    paragraphs
        .map(|p| collapse_spaces(&visible_text(p)))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Text under `root`, skipping anything inside boilerplate elements.
fn visible_text(root: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value().as_element().is_some_and(|e| {
                EXCLUDED_TAGS.contains(&e.name()) || e.classes().any(|c| EXCLUDED_CLASSES.contains(&c))
            })
        });
        if !hidden {
            out.push_str(text);
        }
    }
    out
}

fn collapse_spaces(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn format_text(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut last_was_whitespace = true;

    for line in text.lines() {
        let trimmed = collapse_spaces(line);
        if !trimmed.is_empty() {
            if !last_was_whitespace {
                result.push('\n');
            }
            result.push_str(&trimmed);
            last_was_whitespace = false;
        }
    }

    result
}

/// Cuts `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
