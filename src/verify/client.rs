//! Classifier clients: the OpenAI-compatible vision endpoint and a fixed-outcome stand-in.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{normalize, DynVisionClient, VerificationError, Verdict, VisionClient};
use crate::config::{VisionConfig, VisionMode};

const CLASSIFIER_PROMPT: &str = r#"You are a safety/validation classifier for an incident reporting app.
Given an image, decide:
1) Is there a visible fire, smoke, or other hazard consistent with a real incident?
2) Does the image look AI-generated or synthetic? (best-effort; uncertain allowed)

Return ONLY valid JSON with this schema:
{
  "isIncident": boolean,
  "incidentConfidence": number,
  "suspectedSynthetic": boolean,
  "syntheticConfidence": number,
  "reasons": string[]
}

Rules:
- Confidence is 0.0 to 1.0
- reasons should be short bullet-like strings
- If uncertain, lower confidence and explain."#;

/// Factory: build the classifier according to config.
///
/// * `mock`  → fixed accepting verdict.
/// * `error` → always unavailable.
/// * `live`  → real endpoint (a missing key fails each call, closed).
pub fn build_vision_client(cfg: &VisionConfig) -> anyhow::Result<DynVisionClient> {
    match cfg.mode {
        VisionMode::Mock => Ok(Arc::new(StaticVisionClient::accepting(&cfg.model))),
        VisionMode::Error => Ok(Arc::new(StaticVisionClient::failing(
            &cfg.model,
            VerificationError::Unavailable("classifier disabled (VISION_MODE=error)".to_string()),
        ))),
        VisionMode::Live => {
            if cfg.api_key.is_empty() {
                warn!(target: "verify", "GROQ_API_KEY missing; every verification will be rejected");
            }
            Ok(Arc::new(GroqVisionClient::new(cfg)?))
        }
    }
}

/// Chat-completions client with image input. Requires an API key.
pub struct GroqVisionClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    timeout: Duration,
}

impl GroqVisionClient {
    pub fn new(cfg: &VisionConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(cfg.timeout_secs);
        let http = reqwest::Client::builder()
            .user_agent(concat!("firewatch-backend/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5).min(timeout))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            endpoint: format!("{}/chat/completions", cfg.base_url),
            timeout,
        })
    }
}

#[derive(Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Part<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    temperature: f32,
    response_format: ResponseFormat,
    messages: Vec<Msg<'a>>,
}

#[derive(Deserialize)]
struct Resp {
    #[serde(default)]
    choices: Vec<Choice>,
}
#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}
#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait::async_trait]
impl VisionClient for GroqVisionClient {
    async fn analyze(&self, image_url: &str) -> Result<Verdict, VerificationError> {
        if self.api_key.is_empty() {
            return Err(VerificationError::Unavailable(
                "GROQ_API_KEY missing".to_string(),
            ));
        }

        let req = Req {
            model: &self.model,
            temperature: 0.0,
            response_format: ResponseFormat {
                kind: "json_object",
            },
            messages: vec![Msg {
                role: "user",
                content: vec![
                    Part::Text {
                        text: CLASSIFIER_PROMPT,
                    },
                    Part::ImageUrl {
                        image_url: ImageUrl { url: image_url },
                    },
                ],
            }],
        };

        let started = Instant::now();
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.transport_error(e))?;
        debug!(
            target: "verify",
            model = %self.model,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "classifier responded"
        );

        if !status.is_success() {
            return Err(VerificationError::Unavailable(format!(
                "classifier returned HTTP {}: {}",
                status.as_u16(),
                normalize::snippet(&body)
            )));
        }

        let parsed: Resp = serde_json::from_str(&body)
            .map_err(|_| VerificationError::format("unexpected classifier envelope", &body))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        normalize::parse_verdict(&content, &self.model)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

impl GroqVisionClient {
    fn transport_error(&self, e: reqwest::Error) -> VerificationError {
        if e.is_timeout() {
            VerificationError::Unavailable(format!(
                "classifier timed out after {}s",
                self.timeout.as_secs()
            ))
        } else {
            VerificationError::Unavailable(format!("classifier request failed: {e}"))
        }
    }
}

/// Returns the same outcome for every image; used for mock mode and tests.
#[derive(Clone)]
pub struct StaticVisionClient {
    model: String,
    outcome: Result<Verdict, VerificationError>,
}

impl StaticVisionClient {
    pub fn returning(verdict: Verdict) -> Self {
        Self {
            model: verdict.model_id.clone(),
            outcome: Ok(verdict),
        }
    }

    pub fn failing(model: &str, err: VerificationError) -> Self {
        Self {
            model: model.to_string(),
            outcome: Err(err),
        }
    }

    pub fn accepting(model: &str) -> Self {
        Self::returning(
            Verdict::new(true, 0.9, false, 0.05)
                .with_reason("Visible flames and smoke (mock)")
                .with_model(model),
        )
    }
}

#[async_trait::async_trait]
impl VisionClient for StaticVisionClient {
    async fn analyze(&self, _image_url: &str) -> Result<Verdict, VerificationError> {
        self.outcome.clone()
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
