//! Generation through a resident ACE-Step daemon.
//!
//! The daemon keeps the diffusion pipeline on the GPU and speaks one JSON
//! line per connection over a Unix socket:
//!
//! ```json
//! {"caption": "deep bass, electronic", "lyrics": "", "metas": "", "duration_s": 30.0, "output": "/tmp/x/0.wav"}
//! ```
//!
//! answered by either
//!
//! ```json
//! {"ok": true, "path": "/tmp/x/0.wav", "duration_s": 30.0, "sample_rate": 48000, "channels": 2}
//! {"ok": false, "error": "generation failed: ..."}
//! ```
//!
//! The pipeline asks for WAV in a private scratch directory and reads it
//! back; the file is removed as soon as it has been decoded.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use super::{GeneratedAudio, MusicPipeline, PipelineInput, PipelineLoader};
use crate::audio::read_wav;
use crate::{Error, Result};

#[derive(Debug, Serialize)]
struct DaemonRequest<'a> {
    caption: String,
    lyrics: &'a str,
    /// Structured hints (`bpm: 120, key: C`); none are collected, so always empty.
    metas: &'a str,
    duration_s: f64,
    output: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DaemonResponse {
    Success(SuccessResponse),
    Failure(FailureResponse),
}

#[derive(Debug, Deserialize)]
struct SuccessResponse {
    ok: bool,
    path: String,
}

#[derive(Debug, Deserialize)]
struct FailureResponse {
    #[allow(dead_code)]
    ok: bool,
    error: String,
}

/// Connects pipelines to the daemon at `socket`.
#[derive(Debug, Clone)]
pub struct DaemonLoader {
    socket: PathBuf,
    timeout: Duration,
}

impl DaemonLoader {
    pub fn new(socket: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            socket: socket.into(),
            timeout,
        }
    }
}

impl PipelineLoader for DaemonLoader {
    fn load(&self, model_dir: &Path) -> Result<Box<dyn MusicPipeline>> {
        if !model_dir.is_dir() {
            return Err(Error::Volume(format!(
                "pretrained model not found at {}",
                model_dir.display()
            )));
        }

        // Probe once so a dead daemon fails the cold load rather than the first request.
        UnixStream::connect(&self.socket).map_err(|e| {
            Error::Backend(format!(
                "generation daemon unreachable at {}: {e}",
                self.socket.display()
            ))
        })?;

        let scratch = tempfile::Builder::new().prefix("mindwave-gen-").tempdir()?;
        tracing::debug!(
            socket = %self.socket.display(),
            model_dir = %model_dir.display(),
            scratch = %scratch.path().display(),
            "daemon pipeline ready"
        );

        Ok(Box::new(DaemonPipeline {
            socket: self.socket.clone(),
            timeout: self.timeout,
            scratch,
            counter: 0,
        }))
    }
}

pub struct DaemonPipeline {
    socket: PathBuf,
    timeout: Duration,
    scratch: TempDir,
    counter: u64,
}

impl DaemonPipeline {
    fn next_output(&mut self) -> PathBuf {
        self.counter += 1;
        self.scratch.path().join(format!("{}.wav", self.counter))
    }

    fn round_trip(&self, request_line: &str) -> Result<String> {
        let stream = UnixStream::connect(&self.socket).map_err(|e| {
            Error::Backend(format!("failed to connect to {}: {e}", self.socket.display()))
        })?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;

        let mut writer = &stream;
        writer.write_all(request_line.as_bytes())?;
        writer.flush()?;
        // Signal EOF so the daemon knows the request is complete.
        stream.shutdown(std::net::Shutdown::Write)?;

        let mut response_line = String::new();
        BufReader::new(&stream).read_line(&mut response_line)?;
        if response_line.trim().is_empty() {
            return Err(Error::Backend(
                "daemon closed connection without sending a response".into(),
            ));
        }
        Ok(response_line)
    }
}

/// Style goes after the free-text prompt, the way ACE-Step captions read.
fn caption_for(input: &PipelineInput) -> String {
    let style = input.style.trim();
    if style.is_empty() {
        input.prompt.clone()
    } else {
        format!("{}, {style}", input.prompt)
    }
}

impl MusicPipeline for DaemonPipeline {
    fn generate(&mut self, input: &PipelineInput) -> Result<GeneratedAudio> {
        let output = self.next_output();
        let request = DaemonRequest {
            caption: caption_for(input),
            lyrics: &input.lyrics,
            metas: "",
            duration_s: input.duration_s,
            output: output.to_string_lossy().into_owned(),
        };
        let request_line = serde_json::to_string(&request)? + "\n";

        let response_line = self.round_trip(&request_line)?;
        let response: DaemonResponse = serde_json::from_str(response_line.trim())
            .map_err(|e| Error::Backend(format!("unparseable daemon response: {e}")))?;

        let path = match response {
            DaemonResponse::Success(r) if r.ok => PathBuf::from(r.path),
            DaemonResponse::Success(r) => {
                return Err(Error::Backend(format!(
                    "daemon returned ok=false without an error (path: {})",
                    r.path
                )));
            }
            DaemonResponse::Failure(r) => return Err(Error::Backend(r.error)),
        };

        let decoded = read_wav(&path)?;
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::warn!(path = %path.display(), error = %e, "could not remove daemon output");
        }

        Ok(GeneratedAudio {
            samples: decoded.samples,
            sample_rate: decoded.sample_rate,
            channels: decoded.channels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::write_wav;
    use std::os::unix::net::UnixListener;

    fn input() -> PipelineInput {
        PipelineInput {
            prompt: "deep bass".into(),
            style: "electronic".into(),
            lyrics: String::new(),
            duration_s: 2.0,
        }
    }

    /// Serve exactly `connections` requests, rendering audio or failing as told.
    fn spawn_fake_daemon(
        socket: PathBuf,
        connections: usize,
        fail_with: Option<&'static str>,
    ) -> std::thread::JoinHandle<Vec<serde_json::Value>> {
        let listener = UnixListener::bind(&socket).unwrap();
        std::thread::spawn(move || {
            let mut seen = Vec::new();
            for stream in listener.incoming().take(connections) {
                let mut stream = stream.unwrap();
                let mut line = String::new();
                if BufReader::new(&stream).read_line(&mut line).unwrap() == 0 {
                    continue; // loader probe
                }
                let request: serde_json::Value = serde_json::from_str(&line).unwrap();
                let reply = match fail_with {
                    Some(error) => serde_json::json!({"ok": false, "error": error}),
                    None => {
                        let path = request["output"].as_str().unwrap().to_string();
                        let secs = request["duration_s"].as_f64().unwrap();
                        let frames = (secs * 8000.0) as usize;
                        write_wav(&path, &vec![0.1f32; frames * 2], 8000, 2).unwrap();
                        serde_json::json!({
                            "ok": true, "path": path, "duration_s": secs,
                            "sample_rate": 8000, "channels": 2
                        })
                    }
                };
                seen.push(request);
                stream.write_all(format!("{reply}\n").as_bytes()).unwrap();
            }
            seen
        })
    }

    #[test]
    fn test_load_requires_model_dir() {
        let dir = tempfile::tempdir().unwrap();
        let loader = DaemonLoader::new(dir.path().join("gen.sock"), Duration::from_secs(5));
        let result = loader.load(&dir.path().join("missing-model"));
        assert!(matches!(result, Err(Error::Volume(_))));
    }

    #[test]
    fn test_load_requires_running_daemon() {
        let dir = tempfile::tempdir().unwrap();
        let loader = DaemonLoader::new(dir.path().join("gen.sock"), Duration::from_secs(5));
        let result = loader.load(dir.path());
        assert!(matches!(result, Err(Error::Backend(_))));
    }

    #[test]
    fn test_generate_reads_back_daemon_audio() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("gen.sock");
        // One probe from load, one generation.
        let daemon = spawn_fake_daemon(socket.clone(), 2, None);

        let loader = DaemonLoader::new(&socket, Duration::from_secs(5));
        let mut pipeline = loader.load(dir.path()).unwrap();
        let audio = pipeline.generate(&input()).unwrap();

        assert_eq!(audio.sample_rate, 8000);
        assert_eq!(audio.channels, 2);
        assert!((audio.duration_secs() - 2.0).abs() < 1e-6);

        let seen = daemon.join().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["caption"], "deep bass, electronic");
        assert_eq!(seen[0]["lyrics"], "");
        assert_eq!(seen[0]["metas"], "");
        let output = PathBuf::from(seen[0]["output"].as_str().unwrap());
        assert!(!output.exists(), "daemon output should be removed after decoding");
    }

    #[test]
    fn test_daemon_error_is_passed_through() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("gen.sock");
        let daemon = spawn_fake_daemon(socket.clone(), 2, Some("CUDA out of memory"));

        let loader = DaemonLoader::new(&socket, Duration::from_secs(5));
        let mut pipeline = loader.load(dir.path()).unwrap();
        let err = pipeline.generate(&input()).unwrap_err();
        assert_eq!(err.to_string(), "backend: CUDA out of memory");
        daemon.join().unwrap();
    }

    #[test]
    fn test_caption_without_style() {
        let mut input = input();
        input.style = "  ".into();
        assert_eq!(caption_for(&input), "deep bass");
    }
}
