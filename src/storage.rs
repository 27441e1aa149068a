//! Object storage collaborator: uploads report images and returns where they live.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::CloudinaryConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub url: String,
    pub storage_id: String,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("image upload timed out after {0}s")]
    Timeout(u64),
    #[error("image upload failed: {0}")]
    Failed(String),
}

#[async_trait::async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        folder: &str,
        desired_id: &str,
    ) -> Result<StoredImage, UploadError>;

    fn name(&self) -> &'static str;
}

pub type DynObjectStorage = Arc<dyn ObjectStorage>;

/// Signed upload to Cloudinary's image endpoint.
pub struct CloudinaryStorage {
    http: reqwest::Client,
    cfg: CloudinaryConfig,
    endpoint: String,
}

impl CloudinaryStorage {
    pub fn new(cfg: CloudinaryConfig, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("firewatch-backend/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        let endpoint = format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            cfg.cloud_name
        );
        Ok(Self { http, cfg, endpoint })
    }
}

/// Cloudinary signature: sorted `k=v` pairs joined by `&`, secret appended, SHA-256 hex.
pub fn sign_params(params: &[(&str, &str)], secret: &str) -> String {
    let mut sorted: Vec<_> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hasher.update(secret.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[derive(Deserialize)]
struct UploadResp {
    secure_url: Option<String>,
    public_id: Option<String>,
    error: Option<UploadErrBody>,
}

#[derive(Deserialize)]
struct UploadErrBody {
    message: String,
}

#[async_trait::async_trait]
impl ObjectStorage for CloudinaryStorage {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        folder: &str,
        desired_id: &str,
    ) -> Result<StoredImage, UploadError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign_params(
            &[
                ("folder", folder),
                ("public_id", desired_id),
                ("timestamp", &timestamp),
            ],
            &self.cfg.api_secret,
        );

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(desired_id.to_string()),
            )
            .text("api_key", self.cfg.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", folder.to_string())
            .text("public_id", desired_id.to_string())
            .text("signature_algorithm", "sha256")
            .text("signature", signature);

        let resp = self
            .http
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Failed(e.to_string()))?;
        let status = resp.status();
        let body: UploadResp = resp
            .json()
            .await
            .map_err(|e| UploadError::Failed(format!("unreadable response ({status}): {e}")))?;

        if let Some(err) = body.error {
            return Err(UploadError::Failed(err.message));
        }
        match (body.secure_url, body.public_id) {
            (Some(url), Some(storage_id)) if status.is_success() => {
                Ok(StoredImage { url, storage_id })
            }
            _ => Err(UploadError::Failed(format!(
                "unexpected response (HTTP {})",
                status.as_u16()
            ))),
        }
    }

    fn name(&self) -> &'static str {
        "cloudinary"
    }
}

/// Accepts uploads without keeping the bytes; for local runs and tests.
#[derive(Default)]
pub struct MemoryObjectStorage {
    uploads: AtomicUsize,
}

impl MemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn upload(
        &self,
        _bytes: Vec<u8>,
        folder: &str,
        desired_id: &str,
    ) -> Result<StoredImage, UploadError> {
        let storage_id = format!("{folder}/{desired_id}");
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(StoredImage {
            url: format!("memory://{storage_id}"),
            storage_id,
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Hard upper bound around any storage backend.
pub async fn upload_with_timeout(
    storage: &dyn ObjectStorage,
    bytes: Vec<u8>,
    folder: &str,
    desired_id: &str,
    timeout: Duration,
) -> Result<StoredImage, UploadError> {
    match tokio::time::timeout(timeout, storage.upload(bytes, folder, desired_id)).await {
        Ok(res) => res,
        Err(_) => Err(UploadError::Timeout(timeout.as_secs())),
    }
}
