//! Report persistence contract.
//!
//! The store owns id and timestamp assignment. Every mutation is one
//! [`ReportPatch`] applied atomically to one record; no caller holds a lock
//! across store calls.

pub mod memory;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::report::{NewReport, OverrideRecord, Report, ReportStatus, Severity, VerificationResult};

pub use memory::InMemoryReportStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("report {0} not found")]
    NotFound(String),

    /// A conditional patch found the record in a different status.
    #[error("report {id} is {actual}, expected {expected}")]
    Conflict {
        id: String,
        expected: ReportStatus,
        actual: ReportStatus,
    },

    #[error("{0}")]
    Backend(String),
}

/// Field-level update applied to a single report.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportPatch {
    /// Outcome of a verification attempt. Last write wins on the result.
    Verification {
        status: ReportStatus,
        result: VerificationResult,
    },
    /// Owner consent. Only valid while the report is `REJECTED`.
    Override { consent_at: DateTime<Utc> },
}

impl ReportPatch {
    /// Shared patch semantics so every adapter enforces the same transitions.
    pub fn apply_to(&self, report: &mut Report, now: DateTime<Utc>) -> Result<(), StoreError> {
        match self {
            ReportPatch::Verification { status, result } => {
                // An overridden report keeps its status; the newer result is still recorded.
                if report.status != ReportStatus::AcceptedOverride {
                    report.status = *status;
                }
                report.verification = Some(result.clone());
            }
            ReportPatch::Override { consent_at } => {
                if report.status != ReportStatus::Rejected {
                    return Err(StoreError::Conflict {
                        id: report.id.clone(),
                        expected: ReportStatus::Rejected,
                        actual: report.status,
                    });
                }
                report.status = ReportStatus::AcceptedOverride;
                report.override_record = Some(OverrideRecord {
                    did_override: true,
                    consent_at: *consent_at,
                });
            }
        }
        report.updated_at = now;
        Ok(())
    }
}

/// Exact-match filter over status and severity; `None` matches anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportFilter {
    pub status: Option<ReportStatus>,
    pub severity: Option<Severity>,
}

impl ReportFilter {
    pub fn matches(&self, r: &Report) -> bool {
        self.status.map_or(true, |s| r.status == s)
            && self.severity.map_or(true, |s| r.severity == s)
    }
}

#[async_trait::async_trait]
pub trait ReportStore: Send + Sync {
    /// Persist a new report; assigns id and `created_at`.
    async fn insert(&self, new: NewReport) -> Result<Report, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Report>, StoreError>;

    /// Apply one patch atomically and return the updated record.
    async fn apply(&self, id: &str, patch: ReportPatch) -> Result<Report, StoreError>;

    /// Owner's reports, newest first.
    async fn list_by_owner(&self, uid: &str, limit: usize) -> Result<Vec<Report>, StoreError>;

    /// Filtered page, newest first, plus the total number of matches.
    async fn query(
        &self,
        filter: &ReportFilter,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Report>, usize), StoreError>;
}

pub type DynReportStore = Arc<dyn ReportStore>;
