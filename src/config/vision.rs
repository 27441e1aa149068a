// src/config/vision.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

use super::{env_opt, env_secs};

pub const DEFAULT_VISION_CONFIG_PATH: &str = "config/vision.json";
pub const DEFAULT_VISION_MODEL: &str = "meta-llama/llama-4-maverick-17b-128e-instruct";
pub const DEFAULT_VISION_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_VISION_TIMEOUT_SECS: u64 = 30;

fn default_model() -> String {
    DEFAULT_VISION_MODEL.to_string()
}
fn default_base_url() -> String {
    DEFAULT_VISION_BASE_URL.to_string()
}
fn default_timeout_secs() -> u64 {
    DEFAULT_VISION_TIMEOUT_SECS
}

/// How the classifier is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisionMode {
    /// Real OpenAI-compatible endpoint.
    #[default]
    Live,
    /// Deterministic accepting verdict, no network.
    Mock,
    /// Always unavailable, no network. Exercises the fail-closed path.
    Error,
}

impl VisionMode {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" => Some(VisionMode::Live),
            "mock" => Some(VisionMode::Mock),
            "error" => Some(VisionMode::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    #[serde(default)]
    pub mode: VisionMode,
    /// "ENV" means: read from GROQ_API_KEY
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Upper bound on one classifier call, connect + response.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            mode: VisionMode::Live,
            api_key: String::new(),
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl VisionConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let mut cfg: VisionConfig = serde_json::from_str(&data)?;

        // Resolve api key if "ENV"
        if cfg.api_key.trim().eq_ignore_ascii_case("env") {
            cfg.api_key = env::var("GROQ_API_KEY")
                .map_err(|_| anyhow::anyhow!("Missing GROQ_API_KEY env var"))?;
        }

        cfg.sanitize();
        Ok(cfg)
    }

    /// File (if present) first, then env overrides on top.
    pub fn load() -> anyhow::Result<Self> {
        let path = env_opt("VISION_CONFIG_PATH")
            .unwrap_or_else(|| DEFAULT_VISION_CONFIG_PATH.to_string());
        let mut cfg = if Path::new(&path).exists() {
            Self::load_from_file(&path)?
        } else {
            Self::default()
        };
        cfg.apply_env();
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn apply_env(&mut self) {
        if let Some(mode) = env_opt("VISION_MODE") {
            match VisionMode::parse(&mode) {
                Some(m) => self.mode = m,
                None => tracing::warn!(%mode, "unknown VISION_MODE, keeping {:?}", self.mode),
            }
        }
        if let Some(key) = env_opt("GROQ_API_KEY") {
            self.api_key = key;
        }
        if let Some(model) = env_opt("GROQ_VISION_MODEL") {
            self.model = model;
        }
        if let Some(url) = env_opt("GROQ_BASE_URL") {
            self.base_url = url;
        }
        if let Some(secs) = env_secs("VISION_TIMEOUT_SECS") {
            self.timeout_secs = secs;
        }
    }

    fn sanitize(&mut self) {
        if self.timeout_secs == 0 {
            self.timeout_secs = default_timeout_secs();
        }
        if self.model.trim().is_empty() {
            self.model = default_model();
        }
        let trimmed = self.base_url.trim().trim_end_matches('/');
        self.base_url = if trimmed.is_empty() {
            default_base_url()
        } else {
            trimmed.to_string()
        };
    }
}
