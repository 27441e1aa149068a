//! Report entity, status machine values and submission validation.
//!
//! A report is created at `PENDING_VERIFICATION`, resolved to `ACCEPTED` or
//! `REJECTED` by the verification task, and a `REJECTED` report may be
//! escalated to `ACCEPTED_OVERRIDE` by its owner. Nothing goes back to pending.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ReportError;

/// Reported incident severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Med,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Med => "MED",
            Severity::High => "HIGH",
        }
    }
}

impl FromStr for Severity {
    type Err = ReportError;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(Severity::Low),
            "MED" => Ok(Severity::Med),
            "HIGH" => Ok(Severity::High),
            _ => Err(ReportError::Validation(
                "severity must be LOW/MED/HIGH".to_string(),
            )),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status. Only `PendingVerification` has automatic outgoing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    PendingVerification,
    Rejected,
    Accepted,
    AcceptedOverride,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::PendingVerification => "PENDING_VERIFICATION",
            ReportStatus::Rejected => "REJECTED",
            ReportStatus::Accepted => "ACCEPTED",
            ReportStatus::AcceptedOverride => "ACCEPTED_OVERRIDE",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReportStatus::PendingVerification)
    }
}

impl FromStr for ReportStatus {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING_VERIFICATION" => Ok(ReportStatus::PendingVerification),
            "REJECTED" => Ok(ReportStatus::Rejected),
            "ACCEPTED" => Ok(ReportStatus::Accepted),
            "ACCEPTED_OVERRIDE" => Ok(ReportStatus::AcceptedOverride),
            other => Err(ReportError::Validation(format!("unknown status '{other}'"))),
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the image lives in object storage. Bytes are never kept on the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    pub url: String,
    pub storage_id: String,
}

/// Outcome of one verification attempt, as persisted on the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub is_incident: bool,
    pub incident_confidence: f64,
    pub suspected_synthetic: bool,
    pub synthetic_confidence: f64,
    pub reasons: Vec<String>,
    pub model: String,
    pub checked_at: DateTime<Utc>,
}

impl VerificationResult {
    /// Zeroed result recorded when the classifier could not be consulted.
    pub fn failed(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            is_incident: false,
            incident_confidence: 0.0,
            suspected_synthetic: false,
            synthetic_confidence: 0.0,
            reasons: vec![reason.into()],
            model: model.into(),
            checked_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideRecord {
    pub did_override: bool,
    pub consent_at: DateTime<Utc>,
}

/// Validated, typed submission metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportMetadata {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub lat: f64,
    pub lng: f64,
    pub device_name: String,
    /// Device-reported clock; kept verbatim.
    pub device_time: String,
}

impl ReportMetadata {
    /// Re-check an already typed value (e.g. built directly by a caller, not via a draft).
    pub fn validate(&self) -> Result<(), ReportError> {
        require_text("title", &self.title)?;
        require_text("description", &self.description)?;
        require_text("deviceName", &self.device_name)?;
        require_text("deviceTime", &self.device_time)?;
        check_coordinate("lat", self.lat, 90.0)?;
        check_coordinate("lng", self.lng, 180.0)?;
        Ok(())
    }
}

/// Raw submission fields as they arrive from the transport (all optional strings).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportDraft {
    pub title: Option<String>,
    pub description: Option<String>,
    pub severity: Option<String>,
    pub lat: Option<String>,
    pub lng: Option<String>,
    pub device_name: Option<String>,
    pub device_time: Option<String>,
}

impl ReportDraft {
    /// Set a field by its wire name. Unknown names are ignored.
    pub fn set(&mut self, name: &str, value: String) {
        let slot = match name {
            "title" => &mut self.title,
            "description" => &mut self.description,
            "severity" => &mut self.severity,
            "lat" => &mut self.lat,
            "lng" => &mut self.lng,
            "deviceName" => &mut self.device_name,
            "deviceTime" => &mut self.device_time,
            _ => return,
        };
        *slot = Some(value);
    }

    /// Turn the draft into typed metadata or explain what is missing.
    pub fn validate(&self) -> Result<ReportMetadata, ReportError> {
        let fields = [
            ("title", &self.title),
            ("description", &self.description),
            ("severity", &self.severity),
            ("lat", &self.lat),
            ("lng", &self.lng),
            ("deviceName", &self.device_name),
            ("deviceTime", &self.device_time),
        ];
        let missing: Vec<&str> = fields
            .iter()
            .filter(|(_, v)| v.as_deref().map_or(true, |s| s.trim().is_empty()))
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(ReportError::Validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        // All present past this point.
        let text = |v: &Option<String>| v.as_deref().unwrap_or_default().trim().to_string();

        let meta = ReportMetadata {
            title: text(&self.title),
            description: text(&self.description),
            severity: text(&self.severity).parse()?,
            lat: parse_number("lat", &text(&self.lat))?,
            lng: parse_number("lng", &text(&self.lng))?,
            device_name: text(&self.device_name),
            device_time: self.device_time.clone().unwrap_or_default(),
        };
        meta.validate()?;
        Ok(meta)
    }
}

fn require_text(name: &str, v: &str) -> Result<(), ReportError> {
    if v.trim().is_empty() {
        Err(ReportError::Validation(format!("{name} must not be empty")))
    } else {
        Ok(())
    }
}

fn parse_number(name: &str, raw: &str) -> Result<f64, ReportError> {
    raw.parse::<f64>()
        .map_err(|_| ReportError::Validation(format!("{name} must be a number")))
}

fn check_coordinate(name: &str, v: f64, bound: f64) -> Result<(), ReportError> {
    if !v.is_finite() || v.abs() > bound {
        return Err(ReportError::Validation(format!(
            "{name} must be within [-{bound}, {bound}]"
        )));
    }
    Ok(())
}

/// The persisted report record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    #[serde(rename = "reportId")]
    pub id: String,
    pub uid: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub lat: f64,
    pub lng: f64,
    pub device_name: String,
    pub device_time: String,
    pub image: ImageRef,
    pub status: ReportStatus,
    #[serde(rename = "verificationResult")]
    pub verification: Option<VerificationResult>,
    #[serde(rename = "override", skip_serializing_if = "Option::is_none", default)]
    pub override_record: Option<OverrideRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What the lifecycle hands to the store on creation; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReport {
    pub uid: String,
    pub metadata: ReportMetadata,
    pub image: ImageRef,
}

impl NewReport {
    pub fn into_report(self, id: String, now: DateTime<Utc>) -> Report {
        let m = self.metadata;
        Report {
            id,
            uid: self.uid,
            title: m.title,
            description: m.description,
            severity: m.severity,
            lat: m.lat,
            lng: m.lng,
            device_name: m.device_name,
            device_time: m.device_time,
            image: self.image,
            status: ReportStatus::PendingVerification,
            verification: None,
            override_record: None,
            created_at: now,
            updated_at: now,
        }
    }
}
