//! Replicate predictions API: Llama 3 text completion and Stable Diffusion images.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use chatitp_core::{ImageGenerator, ImageOutcome, LlmProvider, LlmRequest, LlmResponse};

use crate::llama3;

const DEFAULT_BASE_URL: &str = "https://api.replicate.com/v1";
const POLL_INTERVAL: Duration = Duration::from_millis(750);

const NSFW_MARKER: &str = "NSFW content detected";
pub const NSFW_MESSAGE: &str = "NSFW content detected. Please try a different prompt.";
pub const UNEXPECTED_OUTPUT_MESSAGE: &str = "Unexpected output format from Replicate API";
pub const GENERIC_IMAGE_FAILURE: &str =
    "Failed to generate image. Please try again or use a different prompt.";

/// Thin client over `POST /models/{owner}/{name}/predictions`.
pub struct ReplicateClient {
    client: Client,
    api_token: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    error: Value,
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    get: Option<String>,
}

impl ReplicateClient {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_token: api_token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Run a prediction to completion and return its raw `output`.
    ///
    /// Uses `Prefer: wait` and falls back to polling the prediction while it is still running.
    pub async fn run(&self, model: &str, input: Value) -> Result<Value> {
        let url = format!("{}/models/{}/predictions", self.base_url, model);
        debug!(model = %model, "Creating Replicate prediction");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .header("Prefer", "wait")
            .json(&json!({ "input": input }))
            .send()
            .await
            .context("Replicate HTTP request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Replicate returned {}: {}", status, body);
        }

        let mut prediction: Prediction = response
            .json()
            .await
            .context("Failed to parse Replicate prediction")?;

        while matches!(prediction.status.as_str(), "starting" | "processing") {
            let Some(get_url) = prediction.urls.as_ref().and_then(|u| u.get.clone()) else {
                bail!("prediction {} is {} but has no poll url", prediction.id, prediction.status);
            };
            tokio::time::sleep(POLL_INTERVAL).await;
            prediction = self
                .client
                .get(&get_url)
                .bearer_auth(&self.api_token)
                .send()
                .await
                .context("Replicate poll request failed")?
                .error_for_status()?
                .json()
                .await
                .context("Failed to parse Replicate prediction")?;
        }

        match prediction.status.as_str() {
            "succeeded" => Ok(prediction.output),
            other => bail!(
                "prediction {} {}: {}",
                prediction.id,
                other,
                error_text(&prediction.error)
            ),
        }
    }
}

fn error_text(error: &Value) -> String {
    match error {
        Value::Null => "no error detail".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Text completion
// ---------------------------------------------------------------------------

/// Llama 3 instruct text completion on Replicate.
pub struct ReplicateProvider {
    client: Arc<ReplicateClient>,
    model: String,
}

impl ReplicateProvider {
    pub fn new(client: Arc<ReplicateClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    fn input(&self, request: &LlmRequest) -> Value {
        json!({
            "prompt": llama3::format_prompt(&request.system_prompt, &request.user_prompt),
            // The prompt is already framed; stop the model wrapper from framing it again.
            "prompt_template": "{prompt}",
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        })
    }
}

#[async_trait]
impl LlmProvider for ReplicateProvider {
    fn name(&self) -> &str {
        "replicate"
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let start = Instant::now();
        let output = self.client.run(&self.model, self.input(request)).await?;
        Ok(LlmResponse {
            output,
            provider: "replicate".to_string(),
            model: self.model.clone(),
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}

// ---------------------------------------------------------------------------
// Image generation
// ---------------------------------------------------------------------------

/// Stable Diffusion image generation on Replicate.
pub struct ReplicateImageGenerator {
    client: Arc<ReplicateClient>,
    model: String,
}

impl ReplicateImageGenerator {
    pub fn new(client: Arc<ReplicateClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl ImageGenerator for ReplicateImageGenerator {
    async fn generate_image(&self, prompt: &str, width: u32, height: u32) -> ImageOutcome {
        let input = json!({
            "output_format": "png",
            "width": width,
            "height": height,
            "prompt": prompt,
            "num_outputs": 1,
            "cfg": 4.5,
            "output_quality": 79,
        });
        debug!(model = %self.model, width, height, "Generating image");
        image_outcome(self.client.run(&self.model, input).await)
    }
}

/// Map a prediction result onto the user-facing outcome.
pub fn image_outcome(result: Result<Value>) -> ImageOutcome {
    match result {
        Ok(Value::Array(items)) => match items.first() {
            Some(Value::String(url)) => ImageOutcome::success(url.clone()),
            _ => ImageOutcome::failure(UNEXPECTED_OUTPUT_MESSAGE),
        },
        Ok(_) => ImageOutcome::failure(UNEXPECTED_OUTPUT_MESSAGE),
        Err(e) => {
            warn!(error = %e, "Image generation failed");
            if format!("{:#}", e).contains(NSFW_MARKER) {
                ImageOutcome::failure(NSFW_MESSAGE)
            } else {
                ImageOutcome::failure(GENERIC_IMAGE_FAILURE)
            }
        }
    }
}
