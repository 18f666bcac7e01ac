//! Request and result types for the remote operations.
//!
//! Everything here is ephemeral: built per call, returned to the caller and
//! never persisted. Defaults for the generation options live in
//! [`GenerationOptions::default`] and are applied once at the boundary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Error, Result};

/// Default clip length in seconds.
pub const DEFAULT_DURATION_SECS: u32 = 30;

/// Default style tag.
pub const DEFAULT_STYLE: &str = "electronic";

/// Default number of LoRA training epochs.
pub const DEFAULT_EPOCHS: u32 = 100;

/// Longest clip the pipeline is asked to produce.
pub const MAX_DURATION_SECS: u32 = 600;

/// Flat per-second estimate for generation.
pub const GENERATION_COST_PER_SECOND_USD: f64 = 0.001;

/// Flat per-epoch estimate for LoRA training.
pub const TRAINING_COST_PER_EPOCH_USD: f64 = 0.02;

/// Recognized generation options with their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    /// Clip length in whole seconds.
    pub duration: u32,
    /// Free-form style tag, e.g. "electronic" or "ambient piano".
    pub style: String,
    /// Lyrics with `[verse]`/`[chorus]` tags; `None` for instrumental.
    pub lyrics: Option<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            duration: DEFAULT_DURATION_SECS,
            style: DEFAULT_STYLE.to_string(),
            lyrics: None,
        }
    }
}

impl GenerationOptions {
    pub fn validate(&self) -> Result<()> {
        if self.duration == 0 || self.duration > MAX_DURATION_SECS {
            return Err(Error::InvalidRequest(format!(
                "duration must be between 1 and {MAX_DURATION_SECS} seconds, got {}",
                self.duration
            )));
        }
        Ok(())
    }
}

/// Arguments of `generate_music`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(flatten)]
    pub options: GenerationOptions,
}

impl GenerationRequest {
    /// Request with default options.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            options: GenerationOptions::default(),
        }
    }

    pub fn with_duration(mut self, duration: u32) -> Self {
        self.options.duration = duration;
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.options.style = style.into();
        self
    }

    pub fn with_lyrics(mut self, lyrics: impl Into<String>) -> Self {
        self.options.lyrics = Some(lyrics.into());
        self
    }
}

/// Result of `generate_music`.
///
/// Serializes to exactly `{audio_base64, duration, prompt, cost}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    /// MP3 bytes, standard base64 alphabet with padding.
    pub audio_base64: String,
    pub duration: u32,
    pub prompt: String,
    pub cost: CostEstimate,
}

/// Arguments of `train_lora`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRequest {
    /// Path to a JSON dataset readable by the training process.
    pub dataset_path: String,
    /// Namespaces the adapter output under the volume's LoRA prefix.
    pub model_name: String,
    #[serde(default = "default_epochs")]
    pub epochs: u32,
}

fn default_epochs() -> u32 {
    DEFAULT_EPOCHS
}

impl TrainingRequest {
    pub fn new(dataset_path: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            dataset_path: dataset_path.into(),
            model_name: model_name.into(),
            epochs: DEFAULT_EPOCHS,
        }
    }

    pub fn with_epochs(mut self, epochs: u32) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::InvalidRequest("epochs must be at least 1".into()));
        }
        if self.dataset_path.trim().is_empty() {
            return Err(Error::InvalidRequest("dataset_path must not be empty".into()));
        }
        Ok(())
    }
}

/// Result of `train_lora`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingResult {
    pub model_name: String,
    /// Adapter output directory on the model volume.
    pub path: String,
    pub epochs: u32,
    pub cost: CostEstimate,
}

/// What a [`CostEstimate`] amount is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostBasis {
    /// Amount per second of generated audio.
    PerAudioSecond,
    /// Amount for the whole run.
    Total,
}

/// Rough USD cost estimate.
///
/// Kept numeric internally; the display text is only produced when the
/// value crosses the serialization boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostEstimate {
    pub amount_usd: f64,
    pub basis: CostBasis,
}

impl CostEstimate {
    /// Flat per-second generation rate.
    pub fn generation() -> Self {
        Self {
            amount_usd: GENERATION_COST_PER_SECOND_USD,
            basis: CostBasis::PerAudioSecond,
        }
    }

    /// Linear training estimate: `epochs * 0.02`.
    pub fn training(epochs: u32) -> Self {
        Self {
            amount_usd: epochs as f64 * TRAINING_COST_PER_EPOCH_USD,
            basis: CostBasis::Total,
        }
    }
}

/// Shortest round-trip decimal, but whole numbers keep one decimal place
/// (`2.0`, not `2`).
fn format_amount(amount: f64) -> String {
    if amount.is_finite() && amount.fract() == 0.0 {
        format!("{amount:.1}")
    } else {
        amount.to_string()
    }
}

impl fmt::Display for CostEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let amount = format_amount(self.amount_usd);
        match self.basis {
            CostBasis::PerAudioSecond => write!(f, "~${amount}/sec of audio"),
            CostBasis::Total => write!(f, "~${amount} (estimated)"),
        }
    }
}

impl FromStr for CostEstimate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidRequest(format!("unrecognized cost estimate '{s}'"));
        let rest = s.strip_prefix("~$").ok_or_else(invalid)?;
        let (amount, basis) = if let Some(amount) = rest.strip_suffix("/sec of audio") {
            (amount, CostBasis::PerAudioSecond)
        } else if let Some(amount) = rest.strip_suffix(" (estimated)") {
            (amount, CostBasis::Total)
        } else {
            return Err(invalid());
        };
        let amount_usd = amount.parse::<f64>().map_err(|_| invalid())?;
        Ok(Self { amount_usd, basis })
    }
}

impl Serialize for CostEstimate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CostEstimate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_defaults() {
        let opts = GenerationOptions::default();
        assert_eq!(opts.duration, 30);
        assert_eq!(opts.style, "electronic");
        assert!(opts.lyrics.is_none());
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let req: GenerationRequest = serde_json::from_str(r#"{"prompt":"deep bass"}"#).unwrap();
        assert_eq!(req.options.duration, DEFAULT_DURATION_SECS);
        assert_eq!(req.options.style, DEFAULT_STYLE);

        let req: GenerationRequest =
            serde_json::from_str(r#"{"prompt":"deep bass","duration":12}"#).unwrap();
        assert_eq!(req.options.duration, 12);
        assert_eq!(req.options.style, "electronic");
    }

    #[test]
    fn test_duration_bounds() {
        assert!(GenerationRequest::new("x").with_duration(0).options.validate().is_err());
        assert!(GenerationRequest::new("x").with_duration(601).options.validate().is_err());
        assert!(GenerationRequest::new("x").with_duration(1).options.validate().is_ok());
        assert!(GenerationRequest::new("x").with_duration(600).options.validate().is_ok());
    }

    #[test]
    fn test_training_defaults_and_validation() {
        let req: TrainingRequest =
            serde_json::from_str(r#"{"dataset_path":"/data/set.json","model_name":"m1"}"#).unwrap();
        assert_eq!(req.epochs, 100);
        assert!(req.validate().is_ok());
        assert!(req.clone().with_epochs(0).validate().is_err());
    }

    #[test]
    fn test_training_cost_text() {
        assert_eq!(CostEstimate::training(10).to_string(), "~$0.2 (estimated)");
        assert_eq!(CostEstimate::training(100).to_string(), "~$2.0 (estimated)");
        assert_eq!(CostEstimate::training(1).to_string(), "~$0.02 (estimated)");
    }

    #[test]
    fn test_generation_cost_text() {
        assert_eq!(CostEstimate::generation().to_string(), "~$0.001/sec of audio");
    }

    #[test]
    fn test_cost_parses_back() {
        let cost: CostEstimate = "~$0.2 (estimated)".parse().unwrap();
        assert_eq!(cost, CostEstimate::training(10));
        let cost: CostEstimate = "~$0.001/sec of audio".parse().unwrap();
        assert_eq!(cost, CostEstimate::generation());
        assert!("$5".parse::<CostEstimate>().is_err());
    }

    #[test]
    fn test_generation_result_keys() {
        let result = GenerationResult {
            audio_base64: "AAAA".into(),
            duration: 5,
            prompt: "test".into(),
            cost: CostEstimate::generation(),
        };
        let value = serde_json::to_value(&result).unwrap();
        let mut keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, ["audio_base64", "cost", "duration", "prompt"]);
        assert_eq!(value["cost"], "~$0.001/sec of audio");
    }
}
