//! Process configuration, read once at startup (after `dotenvy::dotenv()`).

pub mod vision;

use std::env;

pub use vision::{VisionConfig, VisionMode};

pub const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 45;
pub const DEFAULT_AUTH_TIMEOUT_SECS: u64 = 10;
/// Largest accepted image, matching the multipart limit.
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub vision: VisionConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    /// Expose `/metrics` (METRICS_ROUTE=1).
    pub metrics_route: bool,
    pub max_image_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            vision: VisionConfig::load()?,
            storage: StorageConfig::from_env(),
            auth: AuthConfig::from_env()?,
            metrics_route: env_flag("METRICS_ROUTE"),
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        })
    }
}

#[derive(Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

// Manual Debug so the secret never ends up in logs.
impl std::fmt::Debug for CloudinaryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudinaryConfig")
            .field("cloud_name", &self.cloud_name)
            .field("api_key_len", &self.api_key.len())
            .field("api_secret_len", &self.api_secret.len())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// `None` means in-memory storage (local/dev only).
    pub cloudinary: Option<CloudinaryConfig>,
    pub upload_timeout_secs: u64,
}

impl StorageConfig {
    pub fn from_env() -> Self {
        let cloudinary = match (
            env_opt("CLOUDINARY_CLOUD_NAME"),
            env_opt("CLOUDINARY_API_KEY"),
            env_opt("CLOUDINARY_API_SECRET"),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinaryConfig {
                cloud_name,
                api_key,
                api_secret,
            }),
            _ => None,
        };
        Self {
            cloudinary,
            upload_timeout_secs: env_secs("UPLOAD_TIMEOUT_SECS")
                .unwrap_or(DEFAULT_UPLOAD_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Firebase,
    Static,
}

#[derive(Clone, PartialEq, Eq)]
pub struct StaticToken {
    pub token: String,
    pub uid: String,
    pub email: Option<String>,
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticToken")
            .field("uid", &self.uid)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub mode: AuthMode,
    pub firebase_api_key: Option<String>,
    pub static_tokens: Vec<StaticToken>,
    pub timeout_secs: u64,
}

impl AuthConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let mode = match env_opt("AUTH_MODE")
            .unwrap_or_else(|| "firebase".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "firebase" => AuthMode::Firebase,
            "static" => AuthMode::Static,
            other => anyhow::bail!("Unsupported AUTH_MODE: {other}"),
        };
        let static_tokens = parse_static_tokens(&env_opt("AUTH_STATIC_TOKENS").unwrap_or_default())?;
        Ok(Self {
            mode,
            firebase_api_key: env_opt("FIREBASE_WEB_API_KEY"),
            static_tokens,
            timeout_secs: env_secs("AUTH_TIMEOUT_SECS").unwrap_or(DEFAULT_AUTH_TIMEOUT_SECS),
        })
    }
}

/// `token:uid[:email]` entries separated by commas.
pub fn parse_static_tokens(raw: &str) -> anyhow::Result<Vec<StaticToken>> {
    let mut out = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let mut parts = entry.splitn(3, ':').map(str::trim);
        let token = parts.next().unwrap_or_default();
        let uid = parts.next().unwrap_or_default();
        if token.is_empty() || uid.is_empty() {
            anyhow::bail!("AUTH_STATIC_TOKENS entry must be token:uid[:email]");
        }
        out.push(StaticToken {
            token: token.to_string(),
            uid: uid.to_string(),
            email: parts.next().filter(|e| !e.is_empty()).map(str::to_string),
        });
    }
    Ok(out)
}

/// Non-empty, trimmed env var.
pub(crate) fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Positive number of seconds; zero or garbage counts as unset.
pub(crate) fn env_secs(key: &str) -> Option<u64> {
    env_opt(key)
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v >= 1)
}

pub(crate) fn env_flag(key: &str) -> bool {
    env_opt(key).is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}
