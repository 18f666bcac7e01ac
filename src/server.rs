//! HTTP surface.
//!
//! - `POST /api/generate`: the public endpoint. Missing `duration` and
//!   `style` take the configured defaults. `lyrics` is dropped unless
//!   `server.forward_lyrics` is set.
//! - `POST /functions/generate_music`, `POST /functions/train_lora`: the
//!   remote call surface with full argument sets.
//! - `GET /health`
//!
//! No authentication, rate limiting or input sanitization happens here.

use std::net::SocketAddr;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::functions::Deployment;
use crate::request::{
    GenerationOptions, GenerationRequest, GenerationResult, TrainingRequest, TrainingResult,
};
use crate::{Error, Result};

/// Body accepted by both generation routes.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GenerateBody {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyrics: Option<String>,
}

impl GenerateBody {
    /// Fill omitted options from `defaults`; keep `lyrics` only when asked to.
    pub fn resolve(self, defaults: &GenerationOptions, forward_lyrics: bool) -> GenerationRequest {
        let lyrics = if forward_lyrics {
            self.lyrics.or_else(|| defaults.lyrics.clone())
        } else {
            None
        };
        GenerationRequest {
            prompt: self.prompt,
            options: GenerationOptions {
                duration: self.duration.unwrap_or(defaults.duration),
                style: self.style.unwrap_or_else(|| defaults.style.clone()),
                lyrics,
            },
        }
    }
}

/// Error response: `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

pub fn router(deployment: Deployment) -> Router {
    Router::new()
        .route("/api/generate", post(api_generate))
        .route("/functions/generate_music", post(generate_music))
        .route("/functions/train_lora", post(train_lora))
        .route("/health", get(health))
        .with_state(deployment)
}

async fn api_generate(
    State(deployment): State<Deployment>,
    Json(body): Json<GenerateBody>,
) -> std::result::Result<Json<GenerationResult>, ApiError> {
    let config = deployment.config();
    let request = body.resolve(&config.generation, config.server.forward_lyrics);
    Ok(Json(deployment.generate_music(request).await?))
}

async fn generate_music(
    State(deployment): State<Deployment>,
    Json(body): Json<GenerateBody>,
) -> std::result::Result<Json<GenerationResult>, ApiError> {
    let request = body.resolve(&deployment.config().generation, true);
    Ok(Json(deployment.generate_music(request).await?))
}

async fn train_lora(
    State(deployment): State<Deployment>,
    Json(request): Json<TrainingRequest>,
) -> std::result::Result<Json<TrainingResult>, ApiError> {
    Ok(Json(deployment.train_lora(request).await?))
}

#[derive(Serialize, Deserialize)]
struct HealthResponse {
    status: String,
    app: String,
    warm: bool,
    cold_starts: u64,
}

async fn health(State(deployment): State<Deployment>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".into(),
        app: deployment.config().app.name.clone(),
        warm: deployment.manager().is_warm(),
        cold_starts: deployment.manager().cold_starts(),
    })
}

/// Serve until Ctrl+C, then drain in-flight requests.
pub async fn serve(deployment: Deployment, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router(deployment))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutdown signal received");
        })
        .await?;
    Ok(())
}
