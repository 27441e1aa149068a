//! Identity verifier collaborator: maps a bearer token to an owner id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::AppState;
use crate::config::{AuthConfig, AuthMode, StaticToken};
use crate::error::ReportError;

pub const FIREBASE_LOOKUP_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing Authorization Bearer token")]
    MissingToken,
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    #[error("identity service unavailable: {0}")]
    Unavailable(String),
}

#[async_trait::async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

pub type DynIdentityVerifier = Arc<dyn IdentityVerifier>;

pub fn build_identity_verifier(cfg: &AuthConfig) -> anyhow::Result<DynIdentityVerifier> {
    match cfg.mode {
        AuthMode::Static => {
            if cfg.static_tokens.is_empty() {
                tracing::warn!("AUTH_MODE=static with no AUTH_STATIC_TOKENS; every request will be rejected");
            }
            Ok(Arc::new(StaticTokenVerifier::new(cfg.static_tokens.clone())))
        }
        AuthMode::Firebase => {
            let key = cfg
                .firebase_api_key
                .clone()
                .ok_or_else(|| anyhow::anyhow!("Missing FIREBASE_WEB_API_KEY env var"))?;
            Ok(Arc::new(FirebaseLookupVerifier::new(
                key,
                Duration::from_secs(cfg.timeout_secs),
            )?))
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let raw = header.ok_or(AuthError::MissingToken)?.trim();
    let (scheme, token) = raw.split_once(' ').ok_or(AuthError::MissingToken)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(token)
}

/// Fixed token table; for local runs and demos.
pub struct StaticTokenVerifier {
    tokens: HashMap<String, Identity>,
}

impl StaticTokenVerifier {
    pub fn new(entries: Vec<StaticToken>) -> Self {
        let tokens = entries
            .into_iter()
            .map(|t| {
                (
                    t.token,
                    Identity {
                        uid: t.uid,
                        email: t.email,
                    },
                )
            })
            .collect();
        Self { tokens }
    }
}

#[async_trait::async_trait]
impl IdentityVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| AuthError::InvalidToken("unknown token".to_string()))
    }
}

/// Validates Firebase ID tokens via the Identity Toolkit `accounts:lookup` endpoint.
pub struct FirebaseLookupVerifier {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl FirebaseLookupVerifier {
    pub fn new(api_key: String, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_key,
            base_url: FIREBASE_LOOKUP_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupReq<'a> {
    id_token: &'a str,
}

#[derive(Deserialize)]
struct LookupResp {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
}

#[async_trait::async_trait]
impl IdentityVerifier for FirebaseLookupVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let resp = self
            .http
            .post(format!("{}/accounts:lookup", self.base_url))
            .query(&[("key", self.api_key.as_str())])
            .json(&LookupReq { id_token: token })
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if status.is_client_error() {
            return Err(AuthError::InvalidToken(format!("rejected (HTTP {})", status.as_u16())));
        }
        if !status.is_success() {
            return Err(AuthError::Unavailable(format!("HTTP {}", status.as_u16())));
        }

        let body: LookupResp = resp
            .json()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;
        let user = body
            .users
            .into_iter()
            .next()
            .ok_or_else(|| AuthError::InvalidToken("no user for token".to_string()))?;
        Ok(Identity {
            uid: user.local_id,
            email: user.email.filter(|e| !e.is_empty()),
        })
    }
}

/// Authenticated caller, resolved from the bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ReportError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let token = bearer_token(header)?;
        let identity = state.identity.verify(token).await.map_err(|e| {
            tracing::debug!(error = %e, "token verification failed");
            e
        })?;
        Ok(AuthUser(identity))
    }
}
