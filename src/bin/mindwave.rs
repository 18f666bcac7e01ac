//! Command-line client for a MindWave worker.
//!
//! # Usage
//!
//! ```sh
//! # Smoke test: one short generation, print a summary.
//! mindwave run
//!
//! # Generate and save the clip:
//! mindwave generate --prompt "lofi hip hop, rainy night" --duration 20 --output /tmp/lofi.mp3
//!
//! # Train a LoRA adapter:
//! mindwave train --dataset /data/lofi.json --model-name lofi-v1 --epochs 50
//!
//! # Print the execution image:
//! mindwave image
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::{Parser, Subcommand};
use mindwave_inference::{
    client::RemoteClient,
    config::DeploymentConfig,
    request::{DEFAULT_DURATION_SECS, DEFAULT_EPOCHS, DEFAULT_STYLE, GenerationRequest, TrainingRequest},
};

#[derive(Parser)]
#[command(name = "mindwave", about = "Talk to a MindWave worker")]
struct Args {
    /// Worker base URL.
    #[arg(long, env = "MINDWAVE_URL", default_value = "http://127.0.0.1:8000")]
    url: String,

    /// Seconds to wait for a generation (training uses the training cap).
    #[arg(long, default_value_t = 300)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate one short clip and print what came back.
    Run,

    /// Generate a clip.
    Generate {
        #[arg(long)]
        prompt: String,

        /// Duration in seconds.
        #[arg(long, default_value_t = DEFAULT_DURATION_SECS)]
        duration: u32,

        #[arg(long, default_value = DEFAULT_STYLE)]
        style: String,

        /// Lyrics with [verse]/[chorus] tags; omit for instrumental.
        #[arg(long)]
        lyrics: Option<String>,

        /// Where to write the MP3. Omit to only print the summary.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Fine-tune a LoRA adapter.
    Train {
        /// Dataset path as seen by the worker.
        #[arg(long)]
        dataset: String,

        #[arg(long)]
        model_name: String,

        #[arg(long, default_value_t = DEFAULT_EPOCHS)]
        epochs: u32,

        /// Deployment config the worker runs with; sizes the wait to its training cap.
        #[arg(long, env = "MINDWAVE_CONFIG", default_value = "mindwave.toml")]
        config: PathBuf,
    },

    /// Print the execution image as a Containerfile.
    Image {
        /// Deployment config file.
        #[arg(long, env = "MINDWAVE_CONFIG", default_value = "mindwave.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let generation_timeout = Duration::from_secs(args.timeout_secs);

    match args.command {
        Command::Run => {
            eprintln!("testing MindWave generation at {}...", args.url);
            let client = RemoteClient::new(&args.url, generation_timeout)?;
            let request = GenerationRequest::new("Electronic music with deep bass").with_duration(10);
            let result = client
                .generate_music(&request)
                .await
                .context("smoke generation failed")?;
            println!("generated {}s of music", result.duration);
            println!("cost: {}", result.cost);
        }
        Command::Generate {
            prompt,
            duration,
            style,
            lyrics,
            output,
        } => {
            let client = RemoteClient::new(&args.url, generation_timeout)?;
            let mut request = GenerationRequest::new(prompt).with_duration(duration).with_style(style);
            if let Some(lyrics) = lyrics {
                request = request.with_lyrics(lyrics);
            }
            let result = client.generate_music(&request).await.context("generation failed")?;
            let bytes = STANDARD
                .decode(&result.audio_base64)
                .context("worker returned invalid base64")?;

            match output {
                Some(path) => {
                    if let Some(parent) = path.parent()
                        && !parent.as_os_str().is_empty()
                    {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &bytes)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    eprintln!("generated {}s of audio → {}", result.duration, path.display());
                    println!("{}", path.display());
                }
                None => eprintln!("generated {}s of audio ({} bytes of MP3)", result.duration, bytes.len()),
            }
            eprintln!("cost: {}", result.cost);
        }
        Command::Train {
            dataset,
            model_name,
            epochs,
            config,
        } => {
            let config = DeploymentConfig::load_from(&config)
                .with_context(|| format!("failed to load {}", config.display()))?;
            let client = RemoteClient::for_training(&args.url, &config.functions.train_lora)?;
            let request = TrainingRequest::new(dataset, model_name).with_epochs(epochs);
            let result = client.train_lora(&request).await.context("training failed")?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Image { config } => {
            let config = DeploymentConfig::load_from(&config)
                .with_context(|| format!("failed to load {}", config.display()))?;
            for package in config.image.unpinned_packages() {
                tracing::warn!(%package, "unpinned package, image is not reproducible");
            }
            print!("{}", config.image.render());
            eprintln!("tag: {}:{}", config.app.name, config.image.tag());
        }
    }

    Ok(())
}
