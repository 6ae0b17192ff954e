use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::{ContentItem, SummaryLength};

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// A single prompt sent to a chat model.
#[derive(Debug, Clone, Default)]
pub struct Prompt {
    pub system: Option<String>,
    pub user: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl Prompt {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            user: content.into(),
            ..Default::default()
        }
    }

    pub fn system(mut self, content: impl Into<String>) -> Self {
        self.system = Some(content.into());
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: Prompt) -> Result<String>;
}

/// Newsletter generation over a long digest routinely takes tens of seconds.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for any OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct ChatClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl ChatClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Self::with_timeout(api_key, base_url, model, DEFAULT_TIMEOUT)
    }

    /// Like [`ChatClient::new`] with a whole-request timeout other than the default.
    pub fn with_timeout(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LanguageModel for ChatClient {
    async fn complete(&self, prompt: Prompt) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = prompt.system {
            messages.push(Message { role: "system".into(), content: system });
        }
        messages.push(Message { role: "user".into(), content: prompt.user });

        let body = ChatRequest {
            model: self.model.clone(),
            messages,
            max_tokens: prompt.max_tokens,
            temperature: prompt.temperature,
        };

        let res = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::LlmError(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(AppError::LlmError(format!("{}: {}", status, text)));
        }

        let json: ChatResponse = res.json().await.map_err(|e| AppError::LlmError(e.to_string()))?;
        json.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::LlmError("Invalid response format from LLM".to_string()))
    }
}

/// Returns the first complete JSON array in a model reply, if any.
///
/// Brackets inside strings are fine; stray `[` in prose before the array is skipped.
pub fn extract_json_array(text: &str) -> Option<&str> {
    for (start, _) in text.match_indices('[') {
        let rest = &text[start..];
        let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<serde_json::Value>();
        if let Some(Ok(serde_json::Value::Array(_))) = stream.next() {
            return Some(&rest[..stream.byte_offset()]);
        }
    }
    None
}

pub async fn expand_queries(llm: &dyn LanguageModel, topic: &str, count: usize) -> Vec<String> {
    let topic = topic.trim();
    let mut queries = vec![topic.to_string()];
    if count <= 1 {
        return queries;
    }

    let prompt = Prompt::user(format!(
        "Topic: {}\n\nWrite {} distinct web search queries that would find the newest articles and videos about this topic. \
         Return only a JSON array of strings.",
        topic, count
    ))
    .system("You write concise, specific search engine queries.")
    .max_tokens(200)
    .temperature(0.7);

    match llm.complete(prompt).await {
        Ok(reply) => match extract_json_array(&reply).map(serde_json::from_str::<Vec<String>>) {
            Some(Ok(generated)) => {
                for q in generated {
                    let q = q.trim().to_string();
                    if q.is_empty() || queries.iter().any(|e| e.eq_ignore_ascii_case(&q)) {
                        continue;
                    }
                    queries.push(q);
                }
            }
            _ => tracing::warn!("Could not parse expanded queries for '{}'", topic),
        },
        Err(e) => tracing::warn!("Query expansion failed for '{}': {}", topic, e),
    }

    queries.truncate(count);
    queries
}

/// Indices of `items` the model judged relevant and fresh. Fails open.
pub async fn filter_relevant(
    llm: &dyn LanguageModel,
    topic: &str,
    items: &[ContentItem],
    not_before: DateTime<Utc>,
) -> Vec<usize> {
    if items.is_empty() {
        return Vec::new();
    }
    let all = || (0..items.len()).collect::<Vec<_>>();

    let mut listing = String::new();
    for (i, item) in items.iter().enumerate() {
        listing.push_str(&format!(
            "{}. [{}] {} ({})\n   {}\n",
            i,
            item.source_type,
            item.title,
            item.published_at.format("%Y-%m-%d"),
            item.snippet.replace('\n', " ")
        ));
    }

    let prompt = Prompt::user(format!(
        "Topic: {}\nOnly content published after {} counts as fresh.\n\nCandidates:\n{}\n\
         Return a JSON array with the numbers of the candidates that are clearly about the topic and fresh. \
         Return [] if none qualify.",
        topic,
        not_before.format("%Y-%m-%d"),
        listing
    ))
    .system("You select relevant, recent content for a personalised newsletter.")
    .max_tokens(200)
    .temperature(0.0);

    let reply = match llm.complete(prompt).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!("Relevance filter failed for '{}', keeping all items: {}", topic, e);
            return all();
        }
    };

    let parsed = extract_json_array(&reply).map(serde_json::from_str::<Vec<serde_json::Value>>);
    let values = match parsed {
        Some(Ok(values)) => values,
        _ => {
            tracing::warn!("Unparseable relevance reply for '{}', keeping all items", topic);
            return all();
        }
    };

    let mut selected = Vec::new();
    for value in values {
        let index = match &value {
            serde_json::Value::Number(n) => n.as_u64().map(|n| n as usize),
            serde_json::Value::String(s) => s.trim().parse::<usize>().ok(),
            _ => None,
        };
        if let Some(i) = index {
            if i < items.len() && !selected.contains(&i) {
                selected.push(i);
            }
        }
    }
    selected
}

pub async fn summarize(llm: &dyn LanguageModel, content: &str, length: SummaryLength) -> Result<String> {
    let max_tokens = length.max_tokens();
    let prompt = Prompt::user(content)
        .system(format!(
            "You are a helpful assistant that creates concise summaries of content. \
             Summarize the provided content in approximately {} tokens. \
             Focus on the key points, main arguments, and important details.",
            max_tokens
        ))
        .max_tokens(max_tokens)
        .temperature(0.3);

    let summary = llm.complete(prompt).await?;
    let summary = summary.trim();
    if summary.is_empty() {
        return Err(AppError::LlmError("Empty summary".to_string()));
    }
    Ok(summary.to_string())
}

pub async fn detect_topics(llm: &dyn LanguageModel, content: &str) -> Vec<String> {
    let prompt = Prompt::user(content)
        .system(
            "You are a helpful assistant that analyzes content and identifies the key topics. \
             Return exactly 3-5 topic tags as a JSON array of strings. The topics should be \
             single words or short phrases.",
        )
        .max_tokens(100)
        .temperature(0.3);

    let reply = match llm.complete(prompt).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!("Topic detection failed: {}", e);
            return Vec::new();
        }
    };

    extract_json_array(&reply)
        .and_then(|json| serde_json::from_str::<Vec<String>>(json).ok())
        .map(|topics| {
            topics
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .take(5)
                .collect()
        })
        .unwrap_or_default()
}

pub async fn generate_newsletter(llm: &dyn LanguageModel, combined: &str, topics: &[String]) -> Result<String> {
    let prompt = Prompt::user(format!(
        "Topics: {}\n\nSummaries:\n\n{}",
        topics.join(", "),
        combined
    ))
    .system(
        "You are an editor writing an engaging email newsletter in Markdown. \
         Open with a short introduction, group the summaries under headings per topic, \
         keep each item to a few sentences and close with a one-line sign-off.",
    )
    .max_tokens(1500)
    .temperature(0.5);

    let content = llm.complete(prompt).await?;
    if content.trim().is_empty() {
        return Err(AppError::LlmError("Empty newsletter content".to_string()));
    }
    Ok(content.trim().to_string())
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies are matched by a keyword in the system prompt, falling back to a queue.
    #[derive(Default)]
    pub struct ScriptedModel {
        rules: Vec<(String, std::result::Result<String, String>)>,
        queue: Mutex<VecDeque<String>>,
        pub prompts: Mutex<Vec<Prompt>>,
    }

    impl ScriptedModel {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn on(mut self, keyword: &str, reply: &str) -> Self {
            self.rules.push((keyword.to_string(), Ok(reply.to_string())));
            self
        }

        pub fn fail_on(mut self, keyword: &str) -> Self {
            self.rules.push((keyword.to_string(), Err("scripted failure".to_string())));
            self
        }

        pub fn then(self, reply: &str) -> Self {
            self.queue.lock().unwrap().push_back(reply.to_string());
            self
        }

        pub fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, prompt: Prompt) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.clone());
            let system = prompt.system.clone().unwrap_or_default();
            for (keyword, reply) in &self.rules {
                if system.contains(keyword.as_str()) {
                    return reply.clone().map_err(AppError::LlmError);
                }
            }
            self.queue
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| AppError::LlmError("no scripted reply".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedModel;
    use super::*;
    use crate::models::SourceType;

    fn item(title: &str) -> ContentItem {
        ContentItem {
            title: title.into(),
            url: format!("https://example.com/{}", title),
            snippet: "snippet".into(),
            published_at: Utc::now(),
            source_type: SourceType::Article,
        }
    }

    #[test]
    fn test_extract_json_array() {
        assert_eq!(extract_json_array("Sure! [\"a\", \"b\"] done"), Some("[\"a\", \"b\"]"));
        assert_eq!(extract_json_array("nothing here"), None);
        assert_eq!(
            extract_json_array("Queries: [\"rust news [2026]\", \"tokio\"] ok"),
            Some("[\"rust news [2026]\", \"tokio\"]")
        );
        assert_eq!(extract_json_array("[note] [\"a\"]"), Some("[\"a\"]"));
        assert_eq!(extract_json_array("[[0, 1], [2]] trailing"), Some("[[0, 1], [2]]"));
        assert_eq!(extract_json_array("[unterminated"), None);
    }

    #[test]
    fn test_chat_client_timeout() {
        let client = ChatClient::with_timeout("k", "https://llm.local/v1/", "small", Duration::from_secs(10)).unwrap();
        assert_eq!(client.model(), "small");
        assert_eq!(client.base_url, "https://llm.local/v1");
        assert_eq!(DEFAULT_TIMEOUT, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_expand_queries_keeps_topic_first_and_dedups() {
        let llm = ScriptedModel::new().then(r#"["Rust async", "rust ASYNC", "tokio 1.40 release", "rust"]"#);
        let queries = expand_queries(&llm, "rust async", 3).await;
        assert_eq!(queries, vec!["rust async", "tokio 1.40 release", "rust"]);
    }

    #[tokio::test]
    async fn test_expand_queries_falls_back_to_topic() {
        let llm = ScriptedModel::new().then("I cannot help with that");
        assert_eq!(expand_queries(&llm, " climate ", 3).await, vec!["climate"]);

        let failing = ScriptedModel::new();
        assert_eq!(expand_queries(&failing, "climate", 3).await, vec!["climate"]);
    }

    #[tokio::test]
    async fn test_filter_relevant_drops_bad_indices() {
        let items = vec![item("a"), item("b"), item("c")];
        let llm = ScriptedModel::new().then("[2, \"0\", 7, 2]");
        let selected = filter_relevant(&llm, "topic", &items, Utc::now()).await;
        assert_eq!(selected, vec![2, 0]);
    }

    #[tokio::test]
    async fn test_filter_relevant_fails_open() {
        let items = vec![item("a"), item("b")];
        let llm = ScriptedModel::new();
        assert_eq!(filter_relevant(&llm, "topic", &items, Utc::now()).await, vec![0, 1]);

        let garbage = ScriptedModel::new().then("no idea");
        assert_eq!(filter_relevant(&garbage, "topic", &items, Utc::now()).await, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_filter_relevant_empty_selection() {
        let items = vec![item("a")];
        let llm = ScriptedModel::new().then("[]");
        assert!(filter_relevant(&llm, "topic", &items, Utc::now()).await.is_empty());
    }

    #[tokio::test]
    async fn test_summarize_uses_length_budget() {
        let llm = ScriptedModel::new().then("  A summary.  ");
        let out = summarize(&llm, "long content", SummaryLength::Long).await.unwrap();
        assert_eq!(out, "A summary.");
        let prompts = llm.prompts.lock().unwrap();
        assert_eq!(prompts[0].max_tokens, Some(500));
        assert!(prompts[0].system.as_ref().unwrap().contains("500 tokens"));
    }

    #[tokio::test]
    async fn test_detect_topics() {
        let llm = ScriptedModel::new().then("Topics: [\"AI\", \" chips \", \"\"]");
        assert_eq!(detect_topics(&llm, "text").await, vec!["AI", "chips"]);

        let failing = ScriptedModel::new();
        assert!(detect_topics(&failing, "text").await.is_empty());
    }
}
