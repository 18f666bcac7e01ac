//! Execution image declaration.
//!
//! Describes, once, the software environment every remote operation runs
//! in: base OS packages, interpreter, pinned libraries and a source
//! checkout of the inference library. Nothing is built here. [`ImageSpec::render`]
//! produces a Containerfile and [`ImageSpec::tag`] a content digest, both
//! deterministic for a given spec.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const DEFAULT_BASE_IMAGE: &str = "debian:bookworm-slim";
pub const DEFAULT_PYTHON_VERSION: &str = "3.10";

/// A git checkout installed into the image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCheckout {
    pub repository: String,
    /// Absolute path inside the image.
    pub destination: String,
    /// Run inside `destination` after cloning.
    pub install: String,
}

impl Default for SourceCheckout {
    fn default() -> Self {
        Self {
            repository: "https://github.com/TheMindExpansionNetwork/ACE-Step-1.5.git".into(),
            destination: "/root/acestep".into(),
            install: "pip install -e .".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSpec {
    pub base: String,
    pub python_version: String,
    pub apt_packages: Vec<String>,
    /// Requirement strings; `name==version` counts as pinned.
    pub pip_packages: Vec<String>,
    pub checkout: Option<SourceCheckout>,
    /// Extra `KEY=value` pairs, emitted in the given order.
    pub env: Vec<(String, String)>,
    /// Extra shell commands run last.
    pub commands: Vec<String>,
}

impl Default for ImageSpec {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_IMAGE, DEFAULT_PYTHON_VERSION)
            .apt_install(["git", "wget", "ffmpeg", "libsndfile1"])
            .pip_install([
                "torch==2.1.0",
                "torchaudio",
                "transformers",
                "accelerate",
                "diffusers",
                "soundfile",
                "librosa",
                "numpy",
                "scipy",
            ])
            .with_checkout(SourceCheckout::default())
    }
}

impl ImageSpec {
    /// An image with only the base OS and interpreter.
    pub fn new(base: impl Into<String>, python_version: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            python_version: python_version.into(),
            apt_packages: Vec::new(),
            pip_packages: Vec::new(),
            checkout: None,
            env: Vec::new(),
            commands: Vec::new(),
        }
    }

    pub fn apt_install<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.apt_packages.extend(packages.into_iter().map(Into::into));
        self
    }

    pub fn pip_install<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pip_packages.extend(packages.into_iter().map(Into::into));
        self
    }

    pub fn with_checkout(mut self, checkout: SourceCheckout) -> Self {
        self.checkout = Some(checkout);
        self
    }

    /// Pip requirements without an exact `==` pin.
    ///
    /// These make the image drift between builds.
    pub fn unpinned_packages(&self) -> Vec<&str> {
        self.pip_packages
            .iter()
            .filter(|p| !p.contains("=="))
            .map(String::as_str)
            .collect()
    }

    /// Render the spec as a Containerfile.
    pub fn render(&self) -> String {
        let mut out = String::new();
        // `write!` into a String cannot fail.
        let _ = writeln!(out, "FROM {}", self.base);
        let _ = writeln!(out);

        let mut apt = vec![format!("python{}", self.python_version), "python3-pip".into()];
        apt.extend(self.apt_packages.iter().cloned());
        let _ = writeln!(
            out,
            "RUN apt-get update \\\n    && apt-get install -y --no-install-recommends {} \\\n    && rm -rf /var/lib/apt/lists/*",
            apt.join(" ")
        );

        if !self.pip_packages.is_empty() {
            let _ = writeln!(
                out,
                "RUN python{} -m pip install --no-cache-dir {}",
                self.python_version,
                self.pip_packages.join(" ")
            );
        }

        if let Some(checkout) = &self.checkout {
            let _ = writeln!(
                out,
                "RUN git clone {} {} \\\n    && cd {} && {}",
                checkout.repository, checkout.destination, checkout.destination, checkout.install
            );
        }

        for (key, value) in &self.env {
            let _ = writeln!(out, "ENV {key}={value}");
        }
        for command in &self.commands {
            let _ = writeln!(out, "RUN {command}");
        }
        out
    }

    /// Content tag: first 12 hex chars of SHA-256 over the rendered file.
    pub fn tag(&self) -> String {
        let digest = Sha256::digest(self.render().as_bytes());
        digest.iter().take(6).fold(String::new(), |mut acc, byte| {
            let _ = write!(acc, "{byte:02x}");
            acc
        })
    }
}
