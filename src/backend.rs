//! Seams to the inference and training collaborators.
//!
//! The model itself lives outside this crate. A [`PipelineLoader`] turns
//! the pretrained weights on the model volume into a [`MusicPipeline`]
//! (the cold-load step); a [`LoraTrainer`] runs one fine-tuning job to
//! completion. Both are black boxes: whatever they return, success or
//! failure, is passed to the caller unchanged.
//!
//! - [`daemon`]: generation through a resident ACE-Step daemon on a Unix socket
//! - [`command`]: LoRA training through an external trainer process

pub mod command;
pub mod daemon;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::Result;

/// Learning rate handed to every training run.
pub const LORA_LEARNING_RATE: f64 = 1e-4;

/// Arguments for one generation call into the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineInput {
    pub prompt: String,
    pub style: String,
    /// Empty for instrumental.
    pub lyrics: String,
    pub duration_s: f64,
}

/// Raw generated audio.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAudio {
    /// Interleaved f32 samples in [-1, 1].
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl GeneratedAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }
}

/// A loaded, ready-to-run generation pipeline.
///
/// Calls block; the manager runs them on a blocking thread. Output is
/// stochastic, so identical inputs may yield different audio.
pub trait MusicPipeline: Send {
    fn generate(&mut self, input: &PipelineInput) -> Result<GeneratedAudio>;
}

/// Loads a pipeline from pretrained weights.
pub trait PipelineLoader: Send + Sync {
    fn load(&self, model_dir: &Path) -> Result<Box<dyn MusicPipeline>>;
}

/// One LoRA fine-tuning run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingJob {
    pub base_model: PathBuf,
    pub output_dir: PathBuf,
    /// The whole dataset, already parsed.
    pub dataset: serde_json::Value,
    pub epochs: u32,
    pub learning_rate: f64,
}

#[async_trait]
pub trait LoraTrainer: Send + Sync {
    /// Train to completion. Dropping the future must stop the run.
    async fn train(&self, job: TrainingJob) -> Result<()>;
}
