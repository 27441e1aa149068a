//! Verification client: classifier abstraction, normalized verdict, and errors.
//!
//! The external classifier answers in free-form text that is *supposed* to be
//! JSON. Everything it says goes through [`normalize::parse_verdict`] before the
//! decision engine ever sees it.

pub mod client;
pub mod normalize;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::report::VerificationResult;

pub use client::{build_vision_client, GroqVisionClient, StaticVisionClient};
pub use normalize::parse_verdict;

/// Normalized classifier output. Confidences are always within `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub is_incident: bool,
    pub incident_confidence: f64,
    pub suspected_synthetic: bool,
    pub synthetic_confidence: f64,
    /// Short, ordered, at most [`normalize::MAX_REASONS`] entries.
    pub reasons: Vec<String>,
    pub model_id: String,
}

impl Verdict {
    pub fn new(
        is_incident: bool,
        incident_confidence: f64,
        suspected_synthetic: bool,
        synthetic_confidence: f64,
    ) -> Self {
        Self {
            is_incident,
            incident_confidence: normalize::clamp01(incident_confidence),
            suspected_synthetic,
            synthetic_confidence: normalize::clamp01(synthetic_confidence),
            reasons: Vec::new(),
            model_id: String::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        if self.reasons.len() < normalize::MAX_REASONS {
            self.reasons.push(reason.into());
        }
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Persistable form; `reasons` are supplied by the decision engine.
    pub fn to_result(&self, reasons: Vec<String>, checked_at: DateTime<Utc>) -> VerificationResult {
        VerificationResult {
            is_incident: self.is_incident,
            incident_confidence: self.incident_confidence,
            suspected_synthetic: self.suspected_synthetic,
            synthetic_confidence: self.synthetic_confidence,
            reasons,
            model: self.model_id.clone(),
            checked_at,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum VerificationError {
    /// Transport failure, timeout, or non-success status from the classifier.
    #[error("{0}")]
    Unavailable(String),

    /// The classifier answered, but not with something we can decode.
    #[error("{reason}: {snippet}")]
    Format { reason: String, snippet: String },
}

impl VerificationError {
    pub fn format(reason: impl Into<String>, raw: &str) -> Self {
        VerificationError::Format {
            reason: reason.into(),
            snippet: normalize::snippet(raw),
        }
    }

    /// Metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            VerificationError::Unavailable(_) => "unavailable",
            VerificationError::Format { .. } => "format",
        }
    }
}

/// Image classifier used by the verification task.
#[async_trait::async_trait]
pub trait VisionClient: Send + Sync {
    /// Classify the image at `image_url`. Implementations bound their own wait time.
    async fn analyze(&self, image_url: &str) -> Result<Verdict, VerificationError>;

    /// Model identifier recorded on results, including failed attempts.
    fn model_id(&self) -> &str;
}

pub type DynVisionClient = Arc<dyn VisionClient>;
