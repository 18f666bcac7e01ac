//! Model cache volume.
//!
//! A persistent directory shared by every worker: read-mostly for the
//! pretrained weights, written once per training run for LoRA adapters.
//! Lifecycle, eviction and consistency belong to whatever provides the
//! mount. Two training runs with the same model name write the same
//! directory with no coordination.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const DEFAULT_VOLUME_NAME: &str = "mindwave-models";
pub const DEFAULT_MOUNT: &str = "/models";

/// Directory of the pretrained model, relative to the mount.
pub const PRETRAINED_SUBDIR: &str = "ace-step-1.5";

/// Prefix of LoRA adapter output, relative to the mount.
pub const LORA_SUBDIR: &str = "lora";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelVolume {
    pub name: String,
    pub mount: PathBuf,
    pub create_if_missing: bool,
}

impl Default for ModelVolume {
    fn default() -> Self {
        Self {
            name: DEFAULT_VOLUME_NAME.into(),
            mount: PathBuf::from(DEFAULT_MOUNT),
            create_if_missing: true,
        }
    }
}

impl ModelVolume {
    pub fn at(mount: impl Into<PathBuf>) -> Self {
        Self {
            mount: mount.into(),
            ..Self::default()
        }
    }

    pub fn pretrained_dir(&self) -> PathBuf {
        self.mount.join(PRETRAINED_SUBDIR)
    }

    /// Output directory for a LoRA adapter. The name must pass [`validate_model_name`].
    pub fn lora_dir(&self, model_name: &str) -> Result<PathBuf> {
        validate_model_name(model_name)?;
        Ok(self.mount.join(LORA_SUBDIR).join(model_name))
    }

    pub fn has_pretrained(&self) -> bool {
        self.pretrained_dir().is_dir()
    }

    /// Make sure the mount exists, creating it when allowed.
    pub fn ensure_mounted(&self) -> Result<()> {
        if self.mount.is_dir() {
            return Ok(());
        }
        if !self.create_if_missing {
            return Err(Error::Volume(format!(
                "volume '{}' is not mounted at {}",
                self.name,
                self.mount.display()
            )));
        }
        std::fs::create_dir_all(&self.mount)?;
        tracing::info!(volume = %self.name, mount = %self.mount.display(), "created volume mount");
        Ok(())
    }
}

/// A LoRA name becomes one path component under the LoRA prefix.
pub fn validate_model_name(model_name: &str) -> Result<()> {
    let bad = model_name.trim().is_empty()
        || model_name == "."
        || model_name == ".."
        || model_name.contains(['/', '\\'])
        || Path::new(model_name).is_absolute();
    if bad {
        return Err(Error::InvalidRequest(format!(
            "model_name '{model_name}' must be a single non-empty path component"
        )));
    }
    Ok(())
}
