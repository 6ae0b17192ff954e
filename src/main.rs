use std::sync::Arc;
use tokio::net::TcpListener;
use concisely::{
    api::routes::create_router,
    config::Config,
    llm::ChatClient,
    logging::init_logging,
    mailer::LogMailer,
    mcp::McpClient,
    newsletter::NewsletterService,
    pipeline::{ContentFetcher, WebExtractor},
    scheduler::start_scheduler,
    scraper::CLIENT,
    search::{BraveMcpSearch, GoogleSearch, SearchSource, YouTubeSearch},
    store::MemoryStore,
    AppState,
};

/// Builds every search source the configuration has credentials for.
async fn build_sources(config: &Config) -> (Vec<Arc<dyn SearchSource>>, Option<Arc<McpClient>>) {
    let mut sources: Vec<Arc<dyn SearchSource>> = Vec::new();
    let mut mcp = None;

    match &config.google {
        Some(google) => sources.push(Arc::new(GoogleSearch::new(CLIENT.clone(), google.clone()))),
        None => tracing::warn!("Google search disabled: GOOGLE_API_KEY or GOOGLE_SEARCH_ENGINE_ID not set"),
    }

    match &config.youtube_api_key {
        Some(key) => sources.push(Arc::new(YouTubeSearch::new(CLIENT.clone(), key.clone()))),
        None => tracing::warn!("YouTube search disabled: YOUTUBE_API_KEY not set"),
    }

    match &config.brave_mcp {
        Some(brave) => match BraveMcpSearch::connect(brave).await {
            Ok(search) => {
                mcp = Some(search.client().clone());
                sources.push(Arc::new(search));
            }
            Err(e) => tracing::warn!("Brave search disabled: {}", e),
        },
        None => tracing::warn!("Brave search disabled: BRAVE_MCP_COMMAND not set"),
    }

    (sources, mcp)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = Config::load()?;
    let server_addr = config.server_addr;
    tracing::info!("Loaded configuration: {:?}", config);

    let llm = Arc::new(ChatClient::with_timeout(
        config.openai_api_key.clone(),
        config.openai_base_url.clone(),
        config.openai_model.clone(),
        config.openai_timeout,
    )?);
    tracing::info!("Using chat model {}", llm.model());
    let (sources, mcp) = build_sources(&config).await;
    if sources.is_empty() {
        tracing::warn!("No search sources configured; content fetches will find nothing");
    }

    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(ContentFetcher::new(
        store.clone(),
        llm.clone(),
        sources,
        Arc::new(WebExtractor),
    ));
    tracing::info!("Search sources: {:?}", fetcher.source_names());

    let newsletters = Arc::new(NewsletterService::new(
        store.clone(),
        llm,
        Arc::new(LogMailer::new()),
        fetcher.clone(),
        config.email_from.clone(),
        config.app_url.clone(),
    ));

    let mut scheduler = if config.scheduler_enabled {
        Some(start_scheduler(newsletters.clone()).await?)
    } else {
        tracing::info!("Scheduler disabled");
        None
    };

    let app_state = AppState {
        config: Arc::new(config),
        store,
        fetcher,
        newsletters,
    };
    let app = create_router(app_state);

    let listener = TcpListener::bind(server_addr).await?;
    tracing::info!("Listening on {}", server_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down");
    if let Some(scheduler) = scheduler.as_mut() {
        scheduler.shutdown().await?;
    }
    if let Some(mcp) = mcp {
        mcp.shutdown().await;
    }

    Ok(())
}
