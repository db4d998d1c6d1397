//! OpenAI-compatible chat completions and embeddings.

use crate::error::{EngineError, Result};
use crate::llm::{CompletionProvider, Embedding, EmbeddingProvider};
use crate::prompt::Prompt;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

#[derive(Clone)]
pub struct OpenAiClient {
    api_key: String,
    base_url: String,
    model: String,
    embedding_model: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenAiClient {
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

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, prompt: &Prompt) -> Value {
        serde_json::json!({
            "model": self.model,
            "messages": prompt.messages,
            "temperature": self.temperature,
        })
    }

    async fn post(&self, path: &str, body: &Value, what: &str) -> Result<Value> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, path))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| EngineError::Llm(format!("{} API call failed: {}", what, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(EngineError::Llm(format!("{} API error ({}): {}", what, status, error_text)));
        }

        response
            .json()
            .await
            .map_err(|e| EngineError::Llm(format!("Failed to parse {} response: {}", what, e)))
    }
}

pub(crate) fn parse_completion(response_json: &Value) -> Result<String> {
    response_json["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| EngineError::Llm("No content in LLM response".to_string()))
}

pub(crate) fn parse_embeddings(response_json: &Value, expected: usize) -> Result<Vec<Embedding>> {
    let data = response_json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| EngineError::Embedding("No embedding data in response".to_string()))?;

    let mut indexed: Vec<(usize, Embedding)> = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding: Embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| EngineError::Embedding("No embedding vector in response".to_string()))?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();
        indexed.push((index, embedding));
    }

    if indexed.len() != expected {
        return Err(EngineError::Embedding(format!(
            "Expected {} embeddings, got {}",
            expected,
            indexed.len()
        )));
    }
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, embedding)| embedding).collect())
}

#[async_trait]
impl CompletionProvider for OpenAiClient {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        let body = self.request_body(prompt);
        debug!("OpenAI completion request with {} messages", prompt.messages.len());
        let response_json = self.post("chat/completions", &body, "LLM").await?;
        parse_completion(&response_json)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.embedding_model,
            "input": texts,
        });
        let response_json = self
            .post("embeddings", &body, "Embedding")
            .await
            .map_err(|e| match e {
                EngineError::Llm(message) => EngineError::Embedding(message),
                other => other,
            })?;
        parse_embeddings(&response_json, texts.len())
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::Role;

    #[test]
    fn test_request_body_serializes_roles() {
        let client = OpenAiClient::new("key".to_string(), "gpt-4o-mini".to_string(), DEFAULT_BASE_URL.to_string());
        let mut prompt = Prompt::default();
        prompt.push(Role::System, "rules");
        prompt.push(Role::User, "question");
        let body = client.request_body(&prompt);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "question");
    }

    #[test]
    fn test_parse_completion() {
        let raw = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "SELECT 42"}}]
        });
        assert_eq!(parse_completion(&raw).unwrap(), "SELECT 42");
        assert!(parse_completion(&serde_json::json!({"choices": []})).is_err());
    }

    #[test]
    fn test_parse_embeddings_restores_input_order() {
        let raw = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let embeddings = parse_embeddings(&raw, 2).unwrap();
        assert_eq!(embeddings[0], vec![1.0, 0.0]);
        assert_eq!(embeddings[1], vec![0.0, 1.0]);
        assert!(parse_embeddings(&raw, 3).is_err());
    }
}
