//! MindWave worker. Serves `generate_music`, `train_lora` and the public
//! `/api/generate` endpoint over HTTP.
//!
//! Generation goes to a resident ACE-Step daemon on a Unix socket; training
//! runs an external trainer process. The pipeline is loaded on the first
//! request and dropped again after the idle window.
//!
//! # Configuration
//!
//! `mindwave.toml` in the working directory (or `--config`), overridden by
//! `MINDWAVE_*` environment variables, overridden by the flags below.
//!
//! # Example
//!
//! ```sh
//! mindwave-server --bind 0.0.0.0:8000 --socket /tmp/ace-step-gen.sock
//! curl -X POST localhost:8000/api/generate -d '{"prompt":"deep bass"}' \
//!   -H 'content-type: application/json'
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use mindwave_inference::{
    backend::{command::CommandTrainer, daemon::DaemonLoader},
    config::DeploymentConfig,
    functions::Deployment,
    server,
};

#[derive(Parser, Debug)]
#[command(
    name = "mindwave-server",
    about = "MindWave worker: ACE-Step generation and LoRA training over HTTP"
)]
struct Args {
    /// Deployment config file.
    #[arg(long, env = "MINDWAVE_CONFIG", default_value = "mindwave.toml")]
    config: PathBuf,

    /// Address to listen on (overrides `server.bind_address`).
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Generation daemon socket (overrides `backend.daemon_socket`).
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Model volume mount (overrides `volume.mount`).
    #[arg(long)]
    models: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = DeploymentConfig::load_from(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    if let Some(socket) = args.socket {
        config.backend.daemon_socket = socket;
    }
    if let Some(models) = args.models {
        config.volume.mount = models;
    }

    config
        .volume
        .ensure_mounted()
        .context("model volume unavailable")?;
    if !config.volume.has_pretrained() {
        // Not fatal: the weights may land on the volume before the first request.
        tracing::warn!(
            path = %config.volume.pretrained_dir().display(),
            "pretrained model not on the volume yet; generation will fail until it is"
        );
    }

    let loader = Arc::new(DaemonLoader::new(
        &config.backend.daemon_socket,
        Duration::from_secs(config.backend.daemon_timeout_secs),
    ));
    let trainer = Arc::new(
        CommandTrainer::new(&config.backend.trainer_program)
            .with_args(config.backend.trainer_args.iter().cloned()),
    );

    tracing::info!(
        app = %config.app.name,
        image = %config.image.tag(),
        volume = %config.volume.name,
        mount = %config.volume.mount.display(),
        idle_timeout_secs = ?config.functions.generate_music.idle_timeout_secs,
        train_timeout_secs = ?config.functions.train_lora.timeout_secs,
        "starting worker"
    );

    let addr = config.server.bind_address;
    let deployment = Deployment::start(Arc::new(config), loader, trainer);
    server::serve(deployment, addr).await?;

    tracing::info!("worker stopped");
    Ok(())
}
