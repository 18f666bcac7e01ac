//! Generation manager: keeps the pipeline warm between requests.
//!
//! The manager owns at most one loaded [`MusicPipeline`]. Callers submit
//! inputs which are processed one at a time on a blocking thread. The
//! first request pays the cold load from the model volume; the pipeline
//! then stays resident until no request has arrived for the idle window,
//! after which it is dropped and the next request loads it again.
//!
//! Failures from loading or generating go back to the caller that
//! triggered them, untouched. Nothing is retried. A failed load leaves the
//! manager cold.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use mindwave_inference::backend::{PipelineInput, daemon::DaemonLoader};
//! use mindwave_inference::manager::{GenerationManager, ManagerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let loader = Arc::new(DaemonLoader::new("/tmp/ace-step-gen.sock", Duration::from_secs(600)));
//!     let manager = GenerationManager::start(loader, ManagerConfig::new("/models/ace-step-1.5"));
//!     let input = PipelineInput {
//!         prompt: "deep bass".into(),
//!         style: "electronic".into(),
//!         lyrics: String::new(),
//!         duration_s: 30.0,
//!     };
//!     let audio = manager.generate(input).await.unwrap();
//! }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};

use crate::backend::{GeneratedAudio, MusicPipeline, PipelineInput, PipelineLoader};
use crate::config::DEFAULT_IDLE_TIMEOUT_SECS;
use crate::{Error, Result};

/// Requests allowed to wait behind the one being served.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Pretrained weights handed to the loader on every cold start.
    pub model_dir: PathBuf,

    /// Keep-warm window. `None` keeps the pipeline loaded forever.
    ///
    /// Default: 60 seconds.
    pub idle_timeout: Option<Duration>,

    pub queue_depth: usize,
}

impl ManagerConfig {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            idle_timeout: Some(Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS)),
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}

struct PendingRequest {
    input: PipelineInput,
    reply: oneshot::Sender<Result<GeneratedAudio>>,
}

#[derive(Default)]
struct ManagerState {
    warm: AtomicBool,
    cold_starts: AtomicU64,
}

type Served = (Result<GeneratedAudio>, Option<Box<dyn MusicPipeline>>);

/// Handle for submitting generation requests to a running manager.
#[derive(Clone)]
pub struct GenerationManager {
    tx: mpsc::Sender<PendingRequest>,
    state: Arc<ManagerState>,
}

impl GenerationManager {
    /// Spawn the manager task. Nothing is loaded until the first request.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(loader: Arc<dyn PipelineLoader>, config: ManagerConfig) -> Self {
        let (tx, rx) = mpsc::channel::<PendingRequest>(config.queue_depth.max(1));
        let state = Arc::new(ManagerState::default());
        tokio::spawn(run_manager(loader, config, rx, state.clone()));
        Self { tx, state }
    }

    /// Submit a generation request and wait for the result.
    pub async fn generate(&self, input: PipelineInput) -> Result<GeneratedAudio> {
        let (reply_tx, reply_rx) = oneshot::channel::<Result<GeneratedAudio>>();
        self.tx
            .send(PendingRequest {
                input,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::Manager("manager has shut down".into()))?;

        reply_rx
            .await
            .map_err(|_| Error::Manager("manager dropped reply channel".into()))?
    }

    /// Whether a pipeline is currently resident.
    pub fn is_warm(&self) -> bool {
        self.state.warm.load(Ordering::Acquire)
    }

    /// Number of pipeline loads attempted so far.
    pub fn cold_starts(&self) -> u64 {
        self.state.cold_starts.load(Ordering::Acquire)
    }
}

/// The manager loop. Ends when every handle has been dropped.
async fn run_manager(
    loader: Arc<dyn PipelineLoader>,
    config: ManagerConfig,
    mut rx: mpsc::Receiver<PendingRequest>,
    state: Arc<ManagerState>,
) {
    let mut pipeline: Option<Box<dyn MusicPipeline>> = None;

    loop {
        let next = match (pipeline.is_some(), config.idle_timeout) {
            (true, Some(idle)) => match tokio::time::timeout(idle, rx.recv()).await {
                Ok(next) => next,
                Err(_) => {
                    tracing::info!(idle_secs = idle.as_secs_f64(), "idle window elapsed, unloading pipeline");
                    pipeline = None;
                    state.warm.store(false, Ordering::Release);
                    continue;
                }
            },
            _ => rx.recv().await,
        };
        let Some(request) = next else { break };

        let (result, kept) = serve(
            loader.clone(),
            config.model_dir.clone(),
            pipeline.take(),
            request.input,
            state.clone(),
        )
        .await;
        pipeline = kept;
        state.warm.store(pipeline.is_some(), Ordering::Release);

        // Ignore send errors, the caller may have gone away.
        let _ = request.reply.send(result);
    }
    tracing::info!("generation manager shut down");
}

/// Run one request on a blocking thread, loading first if cold.
///
/// Returns the result and the pipeline to keep, if any.
async fn serve(
    loader: Arc<dyn PipelineLoader>,
    model_dir: PathBuf,
    pipeline: Option<Box<dyn MusicPipeline>>,
    input: PipelineInput,
    state: Arc<ManagerState>,
) -> Served {
    let task = tokio::task::spawn_blocking(move || -> Served {
        let mut pipeline = match pipeline {
            Some(pipeline) => pipeline,
            None => {
                state.cold_starts.fetch_add(1, Ordering::AcqRel);
                let started = Instant::now();
                tracing::info!(model_dir = %model_dir.display(), "cold start: loading pipeline");
                match loader.load(&model_dir) {
                    Ok(pipeline) => {
                        tracing::info!(
                            load_ms = started.elapsed().as_millis() as u64,
                            "pipeline loaded"
                        );
                        pipeline
                    }
                    Err(error) => {
                        tracing::error!(%error, "pipeline load failed");
                        return (Err(error), None);
                    }
                }
            }
        };

        let started = Instant::now();
        let result = pipeline.generate(&input);
        match &result {
            Ok(audio) => tracing::debug!(
                generate_ms = started.elapsed().as_millis() as u64,
                audio_secs = audio.duration_secs(),
                "generation finished"
            ),
            Err(error) => tracing::warn!(%error, "generation failed"),
        }
        (result, Some(pipeline))
    });

    match task.await {
        Ok(served) => served,
        // The pipeline went down with the panicking thread; next request reloads.
        Err(join_error) => (
            Err(Error::Manager(format!("generation task panicked: {join_error}"))),
            None,
        ),
    }
}
