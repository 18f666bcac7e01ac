//! MindWave inference deployment for ACE-Step.
//!
//! Declares where and how the ACE-Step music model runs (execution image,
//! model cache volume, per-function resource sizing) and hosts the two
//! remote operations on top of it: text-to-music generation and LoRA
//! fine-tuning. The model itself is an external collaborator reached
//! through the [`backend`] traits.
//!
//! ## Architecture
//!
//! ```text
//! POST /api/generate ──────────┐
//! POST /functions/generate_music ─→ Deployment::generate_music
//!                                     │
//!                                     ├→ GenerationManager (warm pipeline, idle eviction)
//!                                     │     └→ MusicPipeline  (ACE-Step daemon)
//!                                     └→ MP3 encode → temp file → base64
//!
//! POST /functions/train_lora ────→ Deployment::train_lora
//!                                     ├→ dataset JSON (read in full)
//!                                     └→ LoraTrainer (external process, hard timeout)
//! ```
//!
//! ## Modules
//!
//! - [`config`]: the deployment descriptor, layered TOML + environment
//! - [`image`]: execution image declaration, rendered as a Containerfile
//! - [`volume`]: model cache volume paths
//! - [`request`]: request/result types and cost estimates
//! - [`backend`]: pipeline and trainer seams plus their implementations
//! - [`manager`]: keeps one pipeline warm and serializes generation
//! - [`functions`]: `generate_music` and `train_lora`
//! - [`server`]: HTTP routes
//! - [`client`]: remote invocation

pub mod audio;
pub mod backend;
pub mod client;
pub mod config;
pub mod functions;
pub mod image;
pub mod manager;
pub mod request;
pub mod server;
pub mod volume;

mod error;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
