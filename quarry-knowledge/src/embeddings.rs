use std::str::FromStr;

use quarry_core::RetrievalSettings;
use serde::Deserialize;

use crate::errors::{KnowledgeError, KnowledgeResult};

/// Recognized embedding providers.
///
/// A config naming anything else fails activation with
/// [`KnowledgeError::UnsupportedProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Local Ollama endpoint (`POST /api/embed`).
    Ollama,
    /// OpenAI-compatible endpoint (`POST /v1/embeddings`).
    OpenAi,
}

impl EmbeddingProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
        }
    }
}

impl FromStr for EmbeddingProvider {
    type Err = KnowledgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            other => Err(KnowledgeError::UnsupportedProvider(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    provider: EmbeddingProvider,
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl EmbeddingClient {
    pub fn new(
        provider_name: &str,
        model: &str,
        settings: &RetrievalSettings,
        api_key: Option<String>,
    ) -> KnowledgeResult<Self> {
        let provider = provider_name.parse()?;
        Ok(Self {
            provider,
            base_url: settings.embedding_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            client: reqwest::Client::new(),
        })
    }

    pub fn provider(&self) -> EmbeddingProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn embed_batch(&self, inputs: &[String]) -> KnowledgeResult<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        match self.provider {
            EmbeddingProvider::Ollama => self.embed_ollama(inputs).await,
            EmbeddingProvider::OpenAi => self.embed_openai(inputs).await,
        }
    }

    async fn embed_ollama(&self, inputs: &[String]) -> KnowledgeResult<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.base_url);
        let body = OllamaRequest {
            model: self.model.clone(),
            input: inputs.to_vec(),
        };

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(KnowledgeError::Embedding(format!(
                "embedding request failed: {status} {text}"
            )));
        }

        let payload: OllamaResponse = response.json().await?;

        if let Some(embeddings) = payload.embeddings {
            return Ok(embeddings);
        }

        if let Some(embedding) = payload.embedding {
            return Ok(vec![embedding]);
        }

        Err(KnowledgeError::Embedding(
            "embedding response missing vectors".to_string(),
        ))
    }

    async fn embed_openai(&self, inputs: &[String]) -> KnowledgeResult<Vec<Vec<f32>>> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = OpenAiRequest {
            model: self.model.clone(),
            input: inputs.to_vec(),
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(KnowledgeError::Embedding(format!(
                "embedding request failed: {status} {text}"
            )));
        }

        let payload: OpenAiResponse = response.json().await?;
        let mut data = payload.data;
        // the API does not guarantee input order
        data.sort_by_key(|entry| entry.index);
        Ok(data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[derive(Debug, Clone, serde::Serialize)]
struct OllamaRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OllamaResponse {
    embeddings: Option<Vec<Vec<f32>>>,
    embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, serde::Serialize)]
struct OpenAiRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiEmbedding {
    index: usize,
    embedding: Vec<f32>,
}
