use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;
use crate::error::{AppError, Result};

/// Google Custom Search credentials.
#[derive(Clone, Debug)]
pub struct GoogleSearchConfig {
    pub api_key: String,
    pub search_engine_id: String,
}

/// How to launch the Brave Search MCP server.
#[derive(Clone, Debug)]
pub struct BraveMcpConfig {
    pub command: String,
    pub args: Vec<String>,
    pub api_key: Option<String>,
}

#[derive(Clone)]
pub struct Config {
    pub server_addr: SocketAddr,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    /// Whole-request timeout for chat completions.
    pub openai_timeout: Duration,
    pub google: Option<GoogleSearchConfig>,
    pub youtube_api_key: Option<String>,
    pub brave_mcp: Option<BraveMcpConfig>,
    pub app_url: String,
    pub email_from: String,
    pub scheduler_enabled: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("server_addr", &self.server_addr)
            .field("openai_api_key", &"<redacted>")
            .field("openai_base_url", &self.openai_base_url)
            .field("openai_model", &self.openai_model)
            .field("openai_timeout", &self.openai_timeout)
            .field("google", &self.google.is_some())
            .field("youtube", &self.youtube_api_key.is_some())
            .field("brave_mcp", &self.brave_mcp.as_ref().map(|b| &b.command))
            .field("scheduler_enabled", &self.scheduler_enabled)
            .finish()
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let openai_api_key = lookup("OPENAI_API_KEY")
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::ConfigError("OPENAI_API_KEY is not set".to_string()))?;

        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = lookup("PORT").unwrap_or_else(|| "3000".to_string());
        let port = port.parse::<u16>().map_err(|e| AppError::ConfigError(format!("Invalid port: {}", e)))?;
        let ip = IpAddr::from_str(&host).map_err(|e| AppError::ConfigError(format!("Invalid host address: {}", e)))?;

        let server_addr = SocketAddr::new(ip, port);

        let google = match (lookup("GOOGLE_API_KEY"), lookup("GOOGLE_SEARCH_ENGINE_ID")) {
            (Some(api_key), Some(search_engine_id)) => Some(GoogleSearchConfig { api_key, search_engine_id }),
            _ => None,
        };

        let brave_mcp = lookup("BRAVE_MCP_COMMAND").map(|command| BraveMcpConfig {
            command,
            args: lookup("BRAVE_MCP_ARGS")
                .map(|a| a.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            api_key: lookup("BRAVE_API_KEY"),
        });

        let openai_timeout = match lookup("OPENAI_TIMEOUT_SECS") {
            Some(v) => match v.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => return Err(AppError::ConfigError(format!("Invalid OPENAI_TIMEOUT_SECS: {}", v))),
            },
            None => crate::llm::DEFAULT_TIMEOUT,
        };

        let scheduler_enabled = match lookup("SCHEDULER_ENABLED") {
            Some(v) => parse_bool(&v)?,
            None => true,
        };

        Ok(Config {
            server_addr,
            openai_api_key,
            openai_base_url: lookup("OPENAI_BASE_URL").unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            openai_model: lookup("OPENAI_MODEL").unwrap_or_else(|| "gpt-4.1-mini".to_string()),
            openai_timeout,
            google,
            youtube_api_key: lookup("YOUTUBE_API_KEY"),
            brave_mcp,
            app_url: lookup("APP_URL").unwrap_or_else(|| format!("http://{}", server_addr)),
            email_from: lookup("EMAIL_FROM").unwrap_or_else(|| "noreply@concisely.app".to_string()),
            scheduler_enabled,
        })
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(AppError::ConfigError(format!("Invalid boolean: {}", other))),
    }
}
