//! Generative insight over the top search hits
//!
//! Augmentation is best-effort: callers treat any error as "no insight".

use crate::config::AugmentConfig;
use crate::error::{Error, Result};
use crate::models::{Insight, SearchHit};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

const SYSTEM_PROMPT: &str =
    "You are an AI search analyst. Provide concise, helpful analysis of search results.";

/// Produces a short narrative about a result list
#[async_trait]
pub trait ResultAugmenter: Send + Sync {
    async fn augment(&self, query: &str, hits: &[SearchHit]) -> Result<Insight>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Augmenter backed by an OpenAI-compatible `/chat/completions` endpoint
pub struct HttpAugmenter {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    model: String,
    top_n: usize,
    excerpt_chars: usize,
    max_tokens: u32,
    temperature: f32,
}

impl HttpAugmenter {
    pub fn new(config: &AugmentConfig, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(&config.url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base
            .join("chat/completions")
            .map_err(|e| Error::Config(format!("Invalid augment URL: {}", e)))?;

        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            endpoint,
            api_key: config.api_key(),
            model: config.model.clone(),
            top_n: config.top_n,
            excerpt_chars: config.excerpt_chars,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn build_prompt(&self, query: &str, hits: &[SearchHit]) -> String {
        let mut context = format!("Query: {}\n\nTop results:\n", query);
        for (i, hit) in hits.iter().take(self.top_n).enumerate() {
            let excerpt: String = hit.text.chars().take(self.excerpt_chars).collect();
            context.push_str(&format!("{}. {}...\n", i + 1, excerpt));
        }

        format!(
            "Analyze the search results for the query: \"{query}\"\n\n\
             Context:\n{context}\n\
             Provide insights on:\n\
             1. How well the results answer the query\n\
             2. Any gaps in the information\n\
             3. Suggested follow-up questions\n\
             4. Overall relevance assessment\n\n\
             Format as JSON with keys: analysis, gaps, follow_up_questions, relevance_score"
        )
    }
}

#[async_trait]
impl ResultAugmenter for HttpAugmenter {
    async fn augment(&self, query: &str, hits: &[SearchHit]) -> Result<Insight> {
        if hits.is_empty() {
            return Err(Error::Validation("nothing to augment".to_string()));
        }

        debug!("Requesting insight for {} hits via {}", hits.len(), self.endpoint);

        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: self.build_prompt(query, hits),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let mut request = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Augment(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Augment(format!(
                "Completion endpoint returned {}: {}",
                status,
                body.trim()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Augment(format!("Malformed completion response: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Augment("Completion response has no choices".to_string()))?;

        Ok(parse_insight(&content))
    }
}

/// Read a model reply as an [`Insight`]; anything that is not a JSON
/// object is kept verbatim in `raw`
pub fn parse_insight(reply: &str) -> Insight {
    let body = strip_code_fence(reply.trim());
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => Insight {
            analysis: map.get("analysis").and_then(text_of),
            gaps: map.get("gaps").and_then(text_of),
            follow_up_questions: map
                .get("follow_up_questions")
                .map(list_of)
                .unwrap_or_default(),
            relevance_score: map.get("relevance_score").and_then(number_of),
            raw: None,
        },
        _ => Insight {
            raw: Some(reply.to_string()),
            ..Default::default()
        },
    }
}

fn strip_code_fence(text: &str) -> &str {
    text.strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(text)
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(text_of).collect();
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn list_of(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(text_of).collect(),
        other => text_of(other).into_iter().collect(),
    }
}

fn number_of(value: &Value) -> Option<f32> {
    match value {
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
