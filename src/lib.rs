pub mod api;
pub mod config;
pub mod error;
pub mod llm;
pub mod logging;
pub mod mailer;
pub mod mcp;
pub mod models;
pub mod newsletter;
pub mod pipeline;
pub mod scheduler;
pub mod scraper;
pub mod search;
pub mod store;
pub mod youtube;

use std::sync::Arc;
use config::Config;
use newsletter::NewsletterService;
use pipeline::ContentFetcher;
use store::Store;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub fetcher: Arc<ContentFetcher>,
    pub newsletters: Arc<NewsletterService>,
}
