//! Minimal Model Context Protocol client.
//!
//! Speaks newline-delimited JSON-RPC 2.0 with a tool server, normally a child
//! process talking over its stdin/stdout. Only the calls the search pipeline
//! needs are implemented: the initialize handshake, `tools/list` and
//! `tools/call`.

use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::error::{AppError, Result};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type Reader = Lines<BufReader<Box<dyn AsyncRead + Unpin + Send>>>;
type Writer = Box<dyn AsyncWrite + Unpin + Send>;

struct Transport {
    reader: Reader,
    writer: Writer,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Value,
}

pub struct McpClient {
    transport: Mutex<Transport>,
    next_id: AtomicU64,
    child: Mutex<Option<Child>>,
}

impl McpClient {
    /// Spawns `command` and performs the initialize handshake.
    pub async fn spawn(command: &str, args: &[String], env: &HashMap<String, String>) -> Result<Self> {
        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::McpError(format!("failed to start {}: {}", command, e)))?;

        let stdin = child.stdin.take().ok_or_else(|| AppError::McpError("child stdin unavailable".into()))?;
        let stdout = child.stdout.take().ok_or_else(|| AppError::McpError("child stdout unavailable".into()))?;

        let client = Self::from_streams(stdout, stdin);
        *client.child.lock().await = Some(child);
        client.initialize().await?;
        tracing::info!("Connected to MCP server '{}'", command);
        Ok(client)
    }

    /// Wraps an already-connected stream pair. The caller runs `initialize`.
    pub fn from_streams<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let reader: Box<dyn AsyncRead + Unpin + Send> = Box::new(reader);
        Self {
            transport: Mutex::new(Transport {
                reader: BufReader::new(reader).lines(),
                writer: Box::new(writer),
            }),
            next_id: AtomicU64::new(1),
            child: Mutex::new(None),
        }
    }

    pub async fn initialize(&self) -> Result<Value> {
        let result = self
            .request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {"name": env!("CARGO_PKG_NAME"), "version": env!("CARGO_PKG_VERSION")}
                }),
            )
            .await?;
        self.notify("notifications/initialized", json!({})).await?;
        Ok(result)
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        let result = self.request("tools/list", json!({})).await?;
        let tools = serde_json::from_value(result["tools"].clone())?;
        Ok(tools)
    }

    /// Calls a tool and joins the text parts of its result.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<String> {
        let result = self
            .request("tools/call", json!({"name": name, "arguments": arguments}))
            .await?;

        let text = result["content"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter(|p| p["type"] == "text")
                    .filter_map(|p| p["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();

        if result["isError"].as_bool().unwrap_or(false) {
            return Err(AppError::McpError(format!("tool {} failed: {}", name, text)));
        }
        Ok(text)
    }

    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let message = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});

        // The transport stays locked until the matching response arrives.
        let mut transport = self.transport.lock().await;
        write_message(&mut transport.writer, &message).await?;

        let response = tokio::time::timeout(REQUEST_TIMEOUT, read_response(&mut transport.reader, id))
            .await
            .map_err(|_| AppError::McpError(format!("{} timed out", method)))??;

        if let Some(error) = response.get("error") {
            let message = error["message"].as_str().unwrap_or("unknown error");
            return Err(AppError::McpError(format!("{} failed: {}", method, message)));
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    pub async fn notify(&self, method: &str, params: Value) -> Result<()> {
        let message = json!({"jsonrpc": "2.0", "method": method, "params": params});
        let mut transport = self.transport.lock().await;
        write_message(&mut transport.writer, &message).await
    }

    pub async fn shutdown(&self) {
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                tracing::warn!("Failed to stop MCP server: {}", e);
            } else {
                tracing::info!("MCP server stopped");
            }
        }
    }
}

async fn write_message(writer: &mut Writer, message: &Value) -> Result<()> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

async fn read_response(reader: &mut Reader, id: u64) -> Result<Value> {
    loop {
        let Some(line) = reader.next_line().await? else {
            return Err(AppError::McpError("server closed the connection".into()));
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(_) => {
                tracing::debug!("Ignoring non-JSON MCP output: {}", line);
                continue;
            }
        };
        // Notifications and server-initiated requests are not ours
        if value.get("id").and_then(Value::as_u64) == Some(id)
            && (value.get("result").is_some() || value.get("error").is_some())
        {
            return Ok(value);
        }
    }
}
