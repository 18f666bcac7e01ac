//! The remote operations: `generate_music` and `train_lora`.
//!
//! A [`Deployment`] binds the immutable [`DeploymentConfig`] to a running
//! generation manager and a trainer. Every call is a single stateless
//! request/response; results are returned inline and never stored.

use std::path::Path;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::backend::{LORA_LEARNING_RATE, LoraTrainer, PipelineInput, PipelineLoader, TrainingJob};
use crate::config::DeploymentConfig;
use crate::manager::{GenerationManager, ManagerConfig};
use crate::request::{CostEstimate, GenerationRequest, GenerationResult, TrainingRequest, TrainingResult};
use crate::{Error, Result, audio};

#[derive(Clone)]
pub struct Deployment {
    config: Arc<DeploymentConfig>,
    manager: GenerationManager,
    trainer: Arc<dyn LoraTrainer>,
}

impl Deployment {
    /// Start the generation manager and bind everything together.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: Arc<DeploymentConfig>,
        loader: Arc<dyn PipelineLoader>,
        trainer: Arc<dyn LoraTrainer>,
    ) -> Self {
        let manager_config = ManagerConfig::new(config.volume.pretrained_dir())
            .with_idle_timeout(config.functions.generate_music.idle_timeout());
        let manager = GenerationManager::start(loader, manager_config);
        Self {
            config,
            manager,
            trainer,
        }
    }

    pub fn config(&self) -> &DeploymentConfig {
        &self.config
    }

    pub fn manager(&self) -> &GenerationManager {
        &self.manager
    }

    /// Generate a clip and return it inline as base64 MP3.
    pub async fn generate_music(&self, request: GenerationRequest) -> Result<GenerationResult> {
        request.options.validate()?;
        let GenerationRequest { prompt, options } = request;

        tracing::info!(
            prompt = %prompt,
            duration = options.duration,
            style = %options.style,
            has_lyrics = options.lyrics.is_some(),
            "generate_music"
        );

        let input = PipelineInput {
            prompt: prompt.clone(),
            style: options.style,
            lyrics: options.lyrics.unwrap_or_default(),
            duration_s: f64::from(options.duration),
        };
        let generated = self.manager.generate(input).await?;

        let audio_base64 = tokio::task::spawn_blocking(move || -> Result<String> {
            let mp3 = tempfile::Builder::new()
                .prefix("mindwave-")
                .suffix(".mp3")
                .tempfile()?;
            let written = audio::write_mp3_to(
                mp3.as_file(),
                &generated.samples,
                generated.sample_rate,
                generated.channels,
            )?;
            tracing::debug!(path = %mp3.path().display(), bytes = written, "encoded mp3");
            encode_file(mp3.path())
        })
        .await
        .map_err(|e| Error::Manager(format!("encoding task panicked: {e}")))??;

        Ok(GenerationResult {
            audio_base64,
            duration: options.duration,
            prompt,
            cost: CostEstimate::generation(),
        })
    }

    /// Fine-tune a LoRA adapter on the base model.
    ///
    /// The dataset is read and parsed in full before training starts. The
    /// run is cut off at the function's timeout with no checkpoint.
    pub async fn train_lora(&self, request: TrainingRequest) -> Result<TrainingResult> {
        request.validate()?;
        let output_dir = self.config.volume.lora_dir(&request.model_name)?;

        let raw = tokio::fs::read(&request.dataset_path).await?;
        let dataset: serde_json::Value = serde_json::from_slice(&raw)?;

        tracing::info!(
            model_name = %request.model_name,
            epochs = request.epochs,
            output_dir = %output_dir.display(),
            "train_lora"
        );
        // Same-name runs are not serialized; the last writer wins.
        tracing::debug!(exists = output_dir.exists(), "lora output directory");

        let job = TrainingJob {
            base_model: self.config.volume.pretrained_dir(),
            output_dir: output_dir.clone(),
            dataset,
            epochs: request.epochs,
            learning_rate: LORA_LEARNING_RATE,
        };

        let run = self.trainer.train(job);
        match self.config.functions.train_lora.timeout() {
            Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| {
                tracing::error!(model_name = %request.model_name, limit_secs = limit.as_secs(), "training timed out");
                Error::Timeout {
                    function: "train_lora",
                    limit,
                }
            })??,
            None => run.await?,
        }

        Ok(TrainingResult {
            model_name: request.model_name,
            path: output_dir.to_string_lossy().into_owned(),
            epochs: request.epochs,
            cost: CostEstimate::training(request.epochs),
        })
    }
}

fn encode_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeLoader, FakeTrainer};
    use crate::volume::ModelVolume;
    use std::time::Duration;

    fn deployment(
        config: DeploymentConfig,
        loader: Arc<FakeLoader>,
        trainer: Arc<FakeTrainer>,
    ) -> Deployment {
        Deployment::start(Arc::new(config), loader, trainer)
    }

    fn write_dataset(dir: &Path) -> String {
        let path = dir.join("dataset.json");
        std::fs::write(&path, r#"[{"audio":"a.wav","caption":"lofi"}]"#).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_generate_returns_decodable_audio() {
        let loader = Arc::new(FakeLoader::default());
        let deployment = deployment(DeploymentConfig::default(), loader.clone(), Arc::default());

        let result = deployment
            .generate_music(GenerationRequest::new("test").with_duration(5))
            .await
            .unwrap();

        assert_eq!(result.duration, 5);
        assert_eq!(result.prompt, "test");
        assert_eq!(result.cost, CostEstimate::generation());
        let bytes = STANDARD.decode(&result.audio_base64).unwrap();
        assert!(!bytes.is_empty());

        let seen = loader.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].duration_s, 5.0);
        assert_eq!(seen[0].style, "electronic");
    }

    #[tokio::test]
    async fn test_generate_forwards_lyrics() {
        let loader = Arc::new(FakeLoader::default());
        let deployment = deployment(DeploymentConfig::default(), loader.clone(), Arc::default());

        deployment
            .generate_music(GenerationRequest::new("test").with_duration(1).with_lyrics("[verse]\nla la"))
            .await
            .unwrap();
        assert_eq!(loader.seen()[0].lyrics, "[verse]\nla la");
    }

    #[tokio::test]
    async fn test_generate_rejects_zero_duration_before_loading() {
        let loader = Arc::new(FakeLoader::default());
        let deployment = deployment(DeploymentConfig::default(), loader.clone(), Arc::default());

        let err = deployment
            .generate_music(GenerationRequest::new("test").with_duration(0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert_eq!(loader.loads(), 0);
    }

    #[tokio::test]
    async fn test_train_lora_result() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = Arc::new(FakeTrainer::default());
        let deployment = deployment(DeploymentConfig::default(), Arc::default(), trainer.clone());

        let request = TrainingRequest::new(write_dataset(dir.path()), "m1").with_epochs(10);
        let result = deployment.train_lora(request).await.unwrap();

        assert_eq!(result.model_name, "m1");
        assert_eq!(result.path, "/models/lora/m1");
        assert_eq!(result.epochs, 10);
        assert_eq!(result.cost.to_string(), "~$0.2 (estimated)");

        let jobs = trainer.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].base_model, Path::new("/models/ace-step-1.5"));
        assert_eq!(jobs[0].learning_rate, 1e-4);
        assert_eq!(jobs[0].dataset[0]["caption"], "lofi");
    }

    #[tokio::test]
    async fn test_train_lora_bad_dataset_aborts_before_training() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = Arc::new(FakeTrainer::default());
        let deployment = deployment(DeploymentConfig::default(), Arc::default(), trainer.clone());

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{not json").unwrap();
        let err = deployment
            .train_lora(TrainingRequest::new(broken.to_string_lossy(), "m1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Json(_)));

        let missing = dir.path().join("missing.json");
        let err = deployment
            .train_lora(TrainingRequest::new(missing.to_string_lossy(), "m1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));

        assert!(trainer.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_train_lora_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DeploymentConfig {
            volume: ModelVolume::at(dir.path()),
            ..DeploymentConfig::default()
        };
        config.functions.train_lora.timeout_secs = Some(1);
        let trainer = Arc::new(FakeTrainer::slow(Duration::from_secs(30)));
        let deployment = deployment(config, Arc::default(), trainer);

        let request = TrainingRequest::new(write_dataset(dir.path()), "slow");
        let err = deployment.train_lora(request).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { function: "train_lora", .. }));
    }

    #[tokio::test]
    async fn test_train_lora_failure_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = Arc::new(FakeTrainer::failing("CUDA error: out of memory"));
        let deployment = deployment(DeploymentConfig::default(), Arc::default(), trainer);

        let err = deployment
            .train_lora(TrainingRequest::new(write_dataset(dir.path()), "m1"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "backend: CUDA error: out of memory");
    }

    #[tokio::test]
    async fn test_train_lora_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let deployment = deployment(DeploymentConfig::default(), Arc::default(), Arc::default());
        let err = deployment
            .train_lora(TrainingRequest::new(write_dataset(dir.path()), "../etc"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }
}
