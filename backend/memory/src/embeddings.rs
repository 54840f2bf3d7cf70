/// Embedding providers for project search.
///
/// Supports: OpenAI, Replicate (`all-mpnet-base-v2`)
/// All providers implement the `EmbeddingProvider` trait.
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    /// Embed a batch of texts (default: sequential).
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// OpenAI
// ---------------------------------------------------------------------------

pub struct OpenAIEmbeddings {
    api_key: String,
    model: String,
    client: Client,
}

impl OpenAIEmbeddings {
    pub fn new(api_key: String, model: Option<String>) -> Self {
        let model = model.unwrap_or_else(|| "text-embedding-3-small".to_string());
        Self { api_key, model, client: Client::new() }
    }
}

#[derive(Serialize)]
struct OpenAIEmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct OpenAIEmbedResponse {
    data: Vec<OpenAIEmbedData>,
}

#[derive(Deserialize)]
struct OpenAIEmbedData {
    embedding: Vec<f32>,
}

impl OpenAIEmbeddings {
    async fn request(&self, input: Vec<&str>) -> Result<Vec<Vec<f32>>> {
        let body = OpenAIEmbedRequest { model: &self.model, input };
        let res: OpenAIEmbedResponse = self.client
            .post("https://api.openai.com/v1/embeddings")
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(res.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.request(vec![text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Empty OpenAI embedding response"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.request(texts.to_vec()).await
    }
}

// ---------------------------------------------------------------------------
// Replicate
// ---------------------------------------------------------------------------

const MPNET_VERSION: &str = "b6b7585c9640cd7a9572c6e129c9549d79c9c31f0d3fdce7baac7c67ca38f305";

/// Sentence embeddings from `replicate/all-mpnet-base-v2` (768 dimensions).
pub struct ReplicateEmbeddings {
    api_token: String,
    version: String,
    client: Client,
}

impl ReplicateEmbeddings {
    /// `model` may be a bare version hash or `owner/name:version`.
    pub fn new(api_token: String, model: Option<String>) -> Self {
        let version = model
            .as_deref()
            .map(|m| m.rsplit(':').next().unwrap_or(m).to_string())
            .unwrap_or_else(|| MPNET_VERSION.to_string());
        Self { api_token, version, client: Client::new() }
    }
}

#[derive(Deserialize)]
struct Prediction {
    status: String,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    error: Value,
    urls: Option<PredictionUrls>,
}

#[derive(Deserialize)]
struct PredictionUrls {
    get: Option<String>,
}

#[async_trait]
impl EmbeddingProvider for ReplicateEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut prediction: Prediction = self.client
            .post("https://api.replicate.com/v1/predictions")
            .bearer_auth(&self.api_token)
            .header("Prefer", "wait")
            .json(&json!({ "version": self.version, "input": { "text": text } }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        while matches!(prediction.status.as_str(), "starting" | "processing") {
            let Some(url) = prediction.urls.as_ref().and_then(|u| u.get.clone()) else {
                bail!("embedding prediction has no poll url");
            };
            tokio::time::sleep(Duration::from_millis(500)).await;
            prediction = self.client
                .get(&url)
                .bearer_auth(&self.api_token)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
        }

        if prediction.status != "succeeded" {
            bail!("embedding prediction {}: {}", prediction.status, prediction.error);
        }
        parse_mpnet_output(&prediction.output)
    }
}

/// Output shape is `[{"embedding": [f32, ...]}]`.
fn parse_mpnet_output(output: &Value) -> Result<Vec<f32>> {
    let embedding = output
        .get(0)
        .and_then(|first| first.get("embedding"))
        .ok_or_else(|| anyhow!("Unexpected Replicate embedding output"))?;
    Ok(serde_json::from_value(embedding.clone())?)
}

// ---------------------------------------------------------------------------
// Factory from config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum EmbeddingBackend {
    OpenAI { api_key: String, model: Option<String> },
    Replicate { api_token: String, model: Option<String> },
}

pub fn create_provider(kind: EmbeddingBackend) -> Box<dyn EmbeddingProvider> {
    match kind {
        EmbeddingBackend::OpenAI { api_key, model } => Box::new(OpenAIEmbeddings::new(api_key, model)),
        EmbeddingBackend::Replicate { api_token, model } => {
            Box::new(ReplicateEmbeddings::new(api_token, model))
        }
    }
}
