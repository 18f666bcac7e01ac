//! LoRA training through an external trainer process.
//!
//! The trainer is invoked as
//!
//! ```text
//! <program> [extra args] --base-model <dir> --output-dir <dir> --epochs <n> --learning-rate <lr>
//! ```
//!
//! with the dataset written to its stdin as one JSON document. A zero exit
//! status means the adapter is in the output directory; anything else is a
//! failed run with no guarantee about partial output.

use std::collections::VecDeque;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use super::{LoraTrainer, TrainingJob};
use crate::{Error, Result};

/// Lines of trainer stderr kept in the error message.
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Clone)]
pub struct CommandTrainer {
    program: String,
    args: Vec<String>,
}

impl CommandTrainer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    fn command(&self, job: &TrainingJob) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg("--base-model")
            .arg(&job.base_model)
            .arg("--output-dir")
            .arg(&job.output_dir)
            .arg("--epochs")
            .arg(job.epochs.to_string())
            .arg("--learning-rate")
            .arg(job.learning_rate.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            // A timed-out call drops the future; take the child down with it.
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl LoraTrainer for CommandTrainer {
    async fn train(&self, job: TrainingJob) -> Result<()> {
        let dataset = serde_json::to_vec(&job.dataset)?;

        let mut child = self.command(&job).spawn().map_err(|e| {
            Error::Backend(format!("failed to start trainer '{}': {e}", self.program))
        })?;
        tracing::info!(
            program = %self.program,
            pid = ?child.id(),
            output_dir = %job.output_dir.display(),
            epochs = job.epochs,
            "trainer started"
        );

        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                // A trainer that exits early closes the pipe; its exit status tells the story.
                if let Err(e) = stdin.write_all(&dataset).await {
                    tracing::warn!(error = %e, "trainer stopped reading the dataset");
                }
            }
        };
        let stderr = child.stderr.take();
        let drain = async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(target: "trainer", "{line}");
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
            tail
        };

        let ((), tail, status) = tokio::join!(feed, drain, child.wait());
        let status = status?;
        if status.success() {
            return Ok(());
        }

        let tail = Vec::from(tail).join("\n");
        Err(Error::Backend(format!(
            "trainer exited with {status}: {}",
            tail.trim()
        )))
    }
}
