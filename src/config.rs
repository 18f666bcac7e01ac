//! Deployment descriptor.
//!
//! One immutable [`DeploymentConfig`] is built at startup and handed to
//! every operation behind an `Arc`. Sources, later overriding earlier:
//!
//! 1. Built-in defaults (the values below)
//! 2. A TOML file, `mindwave.toml` unless told otherwise
//! 3. Environment variables prefixed with `MINDWAVE_`, `__` between levels
//!    (e.g. `MINDWAVE_FUNCTIONS__TRAIN_LORA__TIMEOUT_SECS=7200`)

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::image::ImageSpec;
use crate::request::GenerationOptions;
use crate::volume::ModelVolume;
use crate::Result;

pub const DEFAULT_CONFIG_FILE: &str = "mindwave.toml";
pub const ENV_PREFIX: &str = "MINDWAVE_";
pub const DEFAULT_APP_NAME: &str = "mindwave-inference";
pub const DEFAULT_GPU: &str = "A100";

/// Memory for inference workers (32 GiB).
pub const DEFAULT_GENERATE_MEMORY_MIB: u32 = 32 * 1024;

/// Memory for training workers (64 GiB).
pub const DEFAULT_TRAIN_MEMORY_MIB: u32 = 64 * 1024;

/// How long a warm pipeline survives without requests.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 60;

/// Hard cap on a training run.
pub const DEFAULT_TRAIN_TIMEOUT_SECS: u64 = 60 * 60;

pub const DEFAULT_BIND_PORT: u16 = 8000;
pub const DEFAULT_DAEMON_SOCKET: &str = "/tmp/ace-step-gen.sock";
pub const DEFAULT_TRAINER_PROGRAM: &str = "acestep-train-lora";

/// Seconds to wait for the daemon to answer one generation.
pub const DEFAULT_DAEMON_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentConfig {
    pub app: AppConfig,
    pub image: ImageSpec,
    pub volume: ModelVolume,
    pub functions: FunctionsConfig,
    pub server: ServerConfig,
    pub backend: BackendConfig,
    /// Defaults applied to generation requests that omit options.
    pub generation: GenerationOptions,
}

impl DeploymentConfig {
    /// Load from `mindwave.toml` in the current directory plus the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load from a specific file plus the environment. A missing file falls
    /// back to the defaults; a malformed one is an error.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = Self::figment(path.as_ref()).extract()?;
        tracing::debug!(path = %path.as_ref().display(), app = %config.app.name, "loaded deployment config");
        Ok(config)
    }

    /// Parse a TOML document over the defaults, ignoring the environment.
    pub fn parse(content: &str) -> Result<Self> {
        Ok(Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::string(content))
            .extract()?)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_APP_NAME.into(),
        }
    }
}

/// Resource sizing and time limits for one remote function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionSpec {
    /// Accelerator class, `None` for CPU-only.
    pub gpu: Option<String>,
    pub memory_mib: Option<u32>,
    /// Keep-warm window after the last request.
    pub idle_timeout_secs: Option<u64>,
    /// Hard wall-clock cap per invocation.
    pub timeout_secs: Option<u64>,
}

impl FunctionSpec {
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionsConfig {
    pub generate_music: FunctionSpec,
    pub train_lora: FunctionSpec,
    pub api_generate: FunctionSpec,
}

impl Default for FunctionsConfig {
    fn default() -> Self {
        Self {
            generate_music: FunctionSpec {
                gpu: Some(DEFAULT_GPU.into()),
                memory_mib: Some(DEFAULT_GENERATE_MEMORY_MIB),
                idle_timeout_secs: Some(DEFAULT_IDLE_TIMEOUT_SECS),
                timeout_secs: None,
            },
            train_lora: FunctionSpec {
                gpu: Some(DEFAULT_GPU.into()),
                memory_mib: Some(DEFAULT_TRAIN_MEMORY_MIB),
                idle_timeout_secs: None,
                timeout_secs: Some(DEFAULT_TRAIN_TIMEOUT_SECS),
            },
            api_generate: FunctionSpec::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: SocketAddr,
    /// Pass `lyrics` from the HTTP body through to `generate_music`.
    ///
    /// Off by default: the HTTP adapter has always dropped lyrics.
    pub forward_lyrics: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], DEFAULT_BIND_PORT)),
            forward_lyrics: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Unix socket of the resident ACE-Step generation daemon.
    pub daemon_socket: PathBuf,
    pub daemon_timeout_secs: u64,
    /// Trainer executable; receives the dataset on stdin.
    pub trainer_program: String,
    /// Extra arguments placed before the generated ones.
    pub trainer_args: Vec<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            daemon_socket: PathBuf::from(DEFAULT_DAEMON_SOCKET),
            daemon_timeout_secs: DEFAULT_DAEMON_TIMEOUT_SECS,
            trainer_program: DEFAULT_TRAINER_PROGRAM.into(),
            trainer_args: Vec::new(),
        }
    }
}
