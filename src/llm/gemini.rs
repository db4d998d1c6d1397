//! Google Gemini API provider.

use crate::error::{EngineError, Result};
use crate::llm::{CompletionProvider, Embedding, EmbeddingProvider};
use crate::prompt::{Prompt, Role};
use async_trait::async_trait;
use serde_json::Value;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";

#[derive(Clone)]
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    model: String,
    embedding_model: String,
    temperature: f32,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            temperature: 0.2,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_embedding_model(mut self, model: String) -> Self {
        self.embedding_model = model;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// System text goes to `systemInstruction`; assistant turns become `model` turns.
    fn request_body(&self, prompt: &Prompt) -> Value {
        let system: Vec<&str> = prompt
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let contents: Vec<Value> = prompt
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                let role = if m.role == Role::Assistant { "model" } else { "user" };
                serde_json::json!({"role": role, "parts": [{"text": m.content}]})
            })
            .collect();

        // generateContent rejects empty contents; a system-only prompt becomes the user turn.
        if contents.is_empty() {
            return serde_json::json!({
                "contents": [{"role": "user", "parts": [{"text": system.join("\n\n")}]}],
                "generationConfig": {"temperature": self.temperature},
            });
        }

        let mut body = serde_json::json!({
            "contents": contents,
            "generationConfig": {"temperature": self.temperature},
        });
        if !system.is_empty() {
            body["systemInstruction"] = serde_json::json!({"parts": [{"text": system.join("\n\n")}]});
        }
        body
    }

    async fn post(&self, url: String, body: &Value, what: &str) -> Result<Value> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| EngineError::Llm(format!("gemini {} call failed: {}", what, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(EngineError::Llm(format!("gemini {} error ({}): {}", what, status, error_text)));
        }

        response
            .json()
            .await
            .map_err(|e| EngineError::Llm(format!("Failed to parse gemini {} response: {}", what, e)))
    }
}

pub(crate) fn parse_response(json: &Value) -> Result<String> {
    json.pointer("/candidates/0/content/parts/0/text")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| EngineError::Llm("Missing candidates[0].content.parts[0].text".to_string()))
}

pub(crate) fn parse_embeddings(json: &Value, expected: usize) -> Result<Vec<Embedding>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| EngineError::Embedding("No embeddings in gemini response".to_string()))?;

    let vectors: Vec<Embedding> = embeddings
        .iter()
        .map(|item| {
            item.get("values")
                .and_then(|v| v.as_array())
                .map(|values| values.iter().filter_map(|v| v.as_f64().map(|f| f as f32)).collect())
                .ok_or_else(|| EngineError::Embedding("Embedding without values".to_string()))
        })
        .collect::<Result<_>>()?;

    if vectors.len() != expected {
        return Err(EngineError::Embedding(format!(
            "Expected {} embeddings, got {}",
            expected,
            vectors.len()
        )));
    }
    Ok(vectors)
}

#[async_trait]
impl CompletionProvider for GeminiClient {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let json = self.post(url, &self.request_body(prompt), "completion").await?;
        parse_response(&json)
    }

    fn name(&self) -> &str {
        "google"
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = format!("models/{}", self.embedding_model);
        let requests: Vec<Value> = texts
            .iter()
            .map(|text| serde_json::json!({"model": model, "content": {"parts": [{"text": text}]}}))
            .collect();
        let url = format!("{}/{}:batchEmbedContents", self.base_url, model);
        let json = self
            .post(url, &serde_json::json!({ "requests": requests }), "embedding")
            .await
            .map_err(|e| match e {
                EngineError::Llm(message) => EngineError::Embedding(message),
                other => other,
            })?;
        parse_embeddings(&json, texts.len())
    }

    fn name(&self) -> &str {
        "google"
    }
}
