//! Completion and embedding capabilities
//!
//! One implementation per provider, picked once at startup from configuration
//! and injected as a trait object. Nothing downstream branches on the provider.

pub mod gemini;
pub mod openai;

use crate::error::{EngineError, Result};
use crate::prompt::Prompt;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub use gemini::GeminiClient;
pub use openai::OpenAiClient;

/// Vector embedding (simple f32 vector)
pub type Embedding = Vec<f32>;

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Produce the completion text for a structured prompt.
    async fn generate(&self, prompt: &Prompt) -> Result<String>;

    fn name(&self) -> &str;
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProviderKind {
    OpenAi,
    Google,
}

impl FromStr for LlmProviderKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(LlmProviderKind::OpenAi),
            "google" | "google-genai" | "gemini" => Ok(LlmProviderKind::Google),
            other => Err(EngineError::Config(format!("Unsupported LLM_PROVIDER: {}", other))),
        }
    }
}

impl fmt::Display for LlmProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmProviderKind::OpenAi => write!(f, "openai"),
            LlmProviderKind::Google => write!(f, "google"),
        }
    }
}

/// Provider settings resolved from configuration.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub provider: LlmProviderKind,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub embedding_model: Option<String>,
    pub embeddings_enabled: bool,
    pub temperature: f32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::OpenAi,
            api_key: None,
            model: None,
            base_url: None,
            embedding_model: None,
            embeddings_enabled: true,
            temperature: 0.2,
        }
    }
}

/// The capabilities injected into the workflow.
#[derive(Clone)]
pub struct Providers {
    pub completion: Arc<dyn CompletionProvider>,
    pub embedding: Option<Arc<dyn EmbeddingProvider>>,
}

pub fn build_providers(settings: &LlmSettings) -> Result<Providers> {
    let api_key = settings
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| {
            EngineError::Config(format!(
                "LLM_API_KEY not set; cannot initialize the {} provider",
                settings.provider
            ))
        })?;

    match settings.provider {
        LlmProviderKind::OpenAi => {
            let mut client = OpenAiClient::new(
                api_key,
                settings.model.clone().unwrap_or_else(|| openai::DEFAULT_MODEL.to_string()),
                settings.base_url.clone().unwrap_or_else(|| openai::DEFAULT_BASE_URL.to_string()),
            )
            .with_temperature(settings.temperature);
            if let Some(model) = &settings.embedding_model {
                client = client.with_embedding_model(model.clone());
            }
            let client = Arc::new(client);
            Ok(Providers {
                completion: client.clone(),
                embedding: settings
                    .embeddings_enabled
                    .then(|| client as Arc<dyn EmbeddingProvider>),
            })
        }
        LlmProviderKind::Google => {
            let mut client = GeminiClient::new(
                api_key,
                settings.model.clone().unwrap_or_else(|| gemini::DEFAULT_MODEL.to_string()),
                settings.base_url.clone().unwrap_or_else(|| gemini::DEFAULT_BASE_URL.to_string()),
            )
            .with_temperature(settings.temperature);
            if let Some(model) = &settings.embedding_model {
                client = client.with_embedding_model(model.clone());
            }
            let client = Arc::new(client);
            Ok(Providers {
                completion: client.clone(),
                embedding: settings
                    .embeddings_enabled
                    .then(|| client as Arc<dyn EmbeddingProvider>),
            })
        }
    }
}
