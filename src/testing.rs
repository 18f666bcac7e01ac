//! In-process fakes for the backend seams.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::backend::{
    GeneratedAudio, LoraTrainer, MusicPipeline, PipelineInput, PipelineLoader, TrainingJob,
};
use crate::{Error, Result};

pub const SAMPLE_RATE: u32 = 48000;

pub fn sample_input(duration_s: f64) -> PipelineInput {
    PipelineInput {
        prompt: "test".into(),
        style: "electronic".into(),
        lyrics: String::new(),
        duration_s,
    }
}

/// Loader whose pipelines render a quiet stereo sine of the requested length.
#[derive(Default)]
pub struct FakeLoader {
    loads: AtomicUsize,
    failures_left: AtomicUsize,
    seen: Arc<Mutex<Vec<PipelineInput>>>,
}

impl FakeLoader {
    /// Prompt that makes the pipeline fail.
    pub const FAIL_PROMPT: &'static str = "__fail__";

    pub fn failing_loads(count: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(count),
            ..Self::default()
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Every input any pipeline from this loader has received.
    pub fn seen(&self) -> Vec<PipelineInput> {
        self.seen.lock().unwrap().clone()
    }
}

impl PipelineLoader for FakeLoader {
    fn load(&self, model_dir: &Path) -> Result<Box<dyn MusicPipeline>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::Volume(format!(
                "pretrained model not found at {}",
                model_dir.display()
            )));
        }
        Ok(Box::new(FakePipeline {
            seen: self.seen.clone(),
        }))
    }
}

struct FakePipeline {
    seen: Arc<Mutex<Vec<PipelineInput>>>,
}

impl MusicPipeline for FakePipeline {
    fn generate(&mut self, input: &PipelineInput) -> Result<GeneratedAudio> {
        self.seen.lock().unwrap().push(input.clone());
        if input.prompt == FakeLoader::FAIL_PROMPT {
            return Err(Error::Backend("out of memory".into()));
        }
        let frames = (input.duration_s * SAMPLE_RATE as f64) as usize;
        let samples = (0..frames)
            .flat_map(|i| {
                let s = (i as f32 * 440.0 * std::f32::consts::TAU / SAMPLE_RATE as f32).sin() * 0.2;
                [s, s]
            })
            .collect();
        Ok(GeneratedAudio {
            samples,
            sample_rate: SAMPLE_RATE,
            channels: 2,
        })
    }
}

/// Trainer that records jobs, optionally sleeping or failing.
#[derive(Default)]
pub struct FakeTrainer {
    delay: Option<Duration>,
    fail_with: Option<String>,
    jobs: Mutex<Vec<TrainingJob>>,
}

impl FakeTrainer {
    /// Sleeps for `delay` before reporting success.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn failing(msg: impl Into<String>) -> Self {
        Self {
            fail_with: Some(msg.into()),
            ..Self::default()
        }
    }

    pub fn jobs(&self) -> Vec<TrainingJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl LoraTrainer for FakeTrainer {
    async fn train(&self, job: TrainingJob) -> Result<()> {
        self.jobs.lock().unwrap().push(job);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.fail_with {
            Some(msg) => Err(Error::Backend(msg.clone())),
            None => Ok(()),
        }
    }
}
