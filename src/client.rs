//! Client for the remote call surface.
//!
//! Each call blocks the caller until the worker answers; there is no
//! cancellation beyond dropping the future and no retry.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::FunctionSpec;
use crate::request::{GenerationRequest, GenerationResult, TrainingRequest, TrainingResult};
use crate::server::GenerateBody;
use crate::{Error, Result};

/// Wait granted past the worker's training cap so its timeout error arrives first.
pub const TRAINING_SLACK: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct RemoteClient {
    base_url: String,
    http: reqwest::Client,
    timeout: Option<Duration>,
}

impl RemoteClient {
    /// `timeout` bounds each whole request.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Self::build(base_url.into(), Some(timeout))
    }

    /// Client sized to outlast `train_lora`'s cap on the worker. An uncapped
    /// function gets an uncapped client.
    pub fn for_training(base_url: impl Into<String>, train_lora: &FunctionSpec) -> Result<Self> {
        Self::build(base_url.into(), train_lora.timeout().map(|limit| limit + TRAINING_SLACK))
    }

    fn build(base_url: String, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: builder.build()?,
            timeout,
        })
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub async fn generate_music(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        let body = GenerateBody {
            prompt: request.prompt.clone(),
            duration: Some(request.options.duration),
            style: Some(request.options.style.clone()),
            lyrics: request.options.lyrics.clone(),
        };
        self.post("/functions/generate_music", &body).await
    }

    pub async fn train_lora(&self, request: &TrainingRequest) -> Result<TrainingResult> {
        self.post("/functions/train_lora", request).await
    }

    /// Go through the public endpoint, defaults and all.
    pub async fn api_generate(&self, body: &GenerateBody) -> Result<GenerationResult> {
        self.post("/api/generate", body).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        tracing::debug!(%url, "remote call");
        let response = self.http.post(&url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_owned))
                .unwrap_or(text);
            return Err(Error::Remote(format!("{path} returned {status}: {message}")));
        }
        Ok(response.json::<T>().await?)
    }
}
