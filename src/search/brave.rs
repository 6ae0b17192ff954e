use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use super::SearchSource;
use crate::config::BraveMcpConfig;
use crate::error::Result;
use crate::mcp::McpClient;
use crate::models::{ContentItem, SourceType};

const TOOL: &str = "brave_web_search";

/// Brave web search through its MCP tool server.
pub struct BraveMcpSearch {
    client: Arc<McpClient>,
}

impl BraveMcpSearch {
    pub fn new(client: Arc<McpClient>) -> Self {
        Self { client }
    }

    pub async fn connect(config: &BraveMcpConfig) -> Result<Self> {
        let mut env = HashMap::new();
        if let Some(key) = &config.api_key {
            env.insert("BRAVE_API_KEY".to_string(), key.clone());
        }
        let client = McpClient::spawn(&config.command, &config.args, &env).await?;

        let tools = client.list_tools().await?;
        if !tools.iter().any(|t| t.name == TOOL) {
            tracing::warn!("MCP server does not advertise {}", TOOL);
        }
        Ok(Self::new(Arc::new(client)))
    }

    pub fn client(&self) -> &Arc<McpClient> {
        &self.client
    }
}

/// Parses the `Title:` / `Description:` / `URL:` blocks the Brave tool returns.
pub fn parse_results(text: &str) -> Vec<ContentItem> {
    let mut items = Vec::new();
    let mut title = String::new();
    let mut description = String::new();

    for line in text.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("Title:") {
            title = rest.trim().to_string();
            description.clear();
        } else if let Some(rest) = line.strip_prefix("Description:") {
            description = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("URL:") {
            let url = rest.trim();
            if url.starts_with("http") {
                items.push(ContentItem {
                    title: if title.is_empty() { url.to_string() } else { std::mem::take(&mut title) },
                    url: url.to_string(),
                    snippet: std::mem::take(&mut description),
                    published_at: Utc::now(),
                    source_type: SourceType::Article,
                });
            }
            title.clear();
            description.clear();
        }
    }
    items
}

#[async_trait]
impl SearchSource for BraveMcpSearch {
    fn name(&self) -> &str {
        "brave"
    }

    async fn search(&self, query: &str, _window: Duration, max_results: usize) -> Result<Vec<ContentItem>> {
        let count = max_results.clamp(1, 20);
        let text = self
            .client
            .call_tool(TOOL, json!({"query": query, "count": count}))
            .await?;
        Ok(parse_results(&text))
    }
}
