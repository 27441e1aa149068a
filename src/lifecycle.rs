//! # Report Lifecycle
//! Orchestrates the report state machine:
//!
//! ```text
//! PENDING_VERIFICATION ──decide──▶ ACCEPTED
//!                      └─decide──▶ REJECTED ──owner consent──▶ ACCEPTED_OVERRIDE
//! ```
//!
//! Creation returns as soon as the report is persisted; verification runs in a
//! detached task whose only observable effect is a later store update. The
//! task is fail-closed: any classifier failure resolves the report to
//! `REJECTED` with the failure recorded as a reason.

use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::engine::decide;
use crate::error::ReportError;
use crate::metrics;
use crate::report::{
    ImageRef, NewReport, Report, ReportDraft, ReportMetadata, ReportStatus, VerificationResult,
};
use crate::storage::{upload_with_timeout, DynObjectStorage};
use crate::store::{DynReportStore, ReportFilter, ReportPatch};
use crate::verify::{normalize::clean_reason, DynVisionClient};

pub const DEFAULT_PAGE_LIMIT: usize = 20;
/// Cap for the public listing.
pub const MAX_LIST_LIMIT: usize = 200;
/// Cap for an owner's own listing.
pub const MAX_OWNER_LIMIT: usize = 50;

/// What the submitter gets back immediately.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    pub report_id: String,
    pub status: ReportStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportPage {
    pub items: Vec<Report>,
    pub pagination: Pagination,
}

/// `None` or anything below 1 means the default; above `max` is capped.
pub fn clamp_limit(raw: Option<i64>, max: usize) -> usize {
    match raw {
        Some(n) if n >= 1 => usize::try_from(n).unwrap_or(max).min(max),
        _ => DEFAULT_PAGE_LIMIT.min(max),
    }
}

/// 1-based page; anything below 1 is floored to 1.
pub fn clamp_page(raw: Option<i64>) -> usize {
    match raw {
        Some(n) if n >= 1 => usize::try_from(n).unwrap_or(usize::MAX),
        _ => 1,
    }
}

#[derive(Clone)]
pub struct Lifecycle {
    store: DynReportStore,
    vision: DynVisionClient,
    storage: DynObjectStorage,
    upload_timeout: Duration,
}

impl Lifecycle {
    pub fn new(
        store: DynReportStore,
        vision: DynVisionClient,
        storage: DynObjectStorage,
        upload_timeout: Duration,
    ) -> Self {
        Self {
            store,
            vision,
            storage,
            upload_timeout,
        }
    }

    pub fn store(&self) -> &DynReportStore {
        &self.store
    }

    /// Full intake: validate, upload the image, persist, start verification.
    ///
    /// Nothing is uploaded for an invalid draft, and nothing is persisted if the
    /// upload fails or times out.
    pub async fn submit(
        &self,
        owner: &str,
        draft: &ReportDraft,
        image: Vec<u8>,
    ) -> Result<SubmitReceipt, ReportError> {
        let metadata = draft.validate()?;
        if image.is_empty() {
            return Err(ReportError::Validation("Empty image file".to_string()));
        }

        let folder = format!("firewatch/reports/{owner}");
        let desired_id = format!("report_{}", Utc::now().timestamp_millis());
        let size = image.len();
        let stored = upload_with_timeout(
            self.storage.as_ref(),
            image,
            &folder,
            &desired_id,
            self.upload_timeout,
        )
        .await
        .map_err(|e| {
            metrics::record_upload("error");
            warn!(target: "storage", backend = self.storage.name(), error = %e, "image upload failed");
            e
        })?;
        metrics::record_upload("ok");
        info!(target: "storage", backend = self.storage.name(), size, storage_id = %stored.storage_id, "image stored");

        let report = self
            .create(
                owner,
                metadata,
                ImageRef {
                    url: stored.url,
                    storage_id: stored.storage_id,
                },
            )
            .await?;

        self.spawn_verification(report.id.clone());

        Ok(SubmitReceipt {
            report_id: report.id,
            status: report.status,
        })
    }

    /// Persist a report at `PENDING_VERIFICATION`. Does not wait for verification.
    pub async fn create(
        &self,
        owner: &str,
        metadata: ReportMetadata,
        image: ImageRef,
    ) -> Result<Report, ReportError> {
        if owner.trim().is_empty() {
            return Err(ReportError::Validation("owner id must not be empty".to_string()));
        }
        metadata.validate()?;
        if image.url.trim().is_empty() || image.storage_id.trim().is_empty() {
            return Err(ReportError::Validation(
                "image reference must have url and storage id".to_string(),
            ));
        }

        let report = self
            .store
            .insert(NewReport {
                uid: owner.to_string(),
                metadata,
                image,
            })
            .await?;

        metrics::record_created();
        info!(
            target: "lifecycle",
            report_id = %report.id,
            severity = %report.severity,
            "report created"
        );
        Ok(report)
    }

    /// Detach verification from the caller. No handle is returned.
    pub fn spawn_verification(&self, report_id: String) {
        let this = self.clone();
        tokio::spawn(async move {
            this.run_verification(&report_id).await;
        });
    }

    /// One verification attempt. Never fails outward: every error either ends
    /// in a terminal `REJECTED` or is logged (missing report, store failure).
    pub async fn run_verification(&self, report_id: &str) {
        let _in_flight = metrics::InFlight::start();
        let started = Instant::now();

        let report = match self.store.get(report_id).await {
            Ok(Some(r)) => r,
            Ok(None) => {
                warn!(target: "lifecycle", %report_id, "verification skipped: report not found");
                return;
            }
            Err(e) => {
                error!(target: "lifecycle", %report_id, error = %e, "verification skipped: store read failed");
                return;
            }
        };

        let (status, result) = match self.vision.analyze(&report.image.url).await {
            Ok(mut verdict) => {
                if verdict.model_id.is_empty() {
                    verdict.model_id = self.vision.model_id().to_string();
                }
                let decision = decide(&verdict);
                (
                    decision.status,
                    verdict.to_result(decision.reasons, Utc::now()),
                )
            }
            Err(e) => {
                metrics::record_verification_failure(e.kind());
                warn!(
                    target: "verify",
                    %report_id,
                    model = %self.vision.model_id(),
                    error = %e,
                    "verification failed; rejecting"
                );
                (
                    ReportStatus::Rejected,
                    VerificationResult::failed(
                        self.vision.model_id(),
                        clean_reason(&format!("Verification failed: {e}")),
                    ),
                )
            }
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        match self
            .store
            .apply(report_id, ReportPatch::Verification { status, result })
            .await
        {
            Ok(updated) => {
                metrics::record_verified(updated.status, elapsed_ms);
                info!(
                    target: "lifecycle",
                    %report_id,
                    status = %updated.status,
                    elapsed_ms = elapsed_ms as u64,
                    "verification applied"
                );
            }
            Err(e) => {
                error!(target: "lifecycle", %report_id, error = %e, "failed to persist verification");
            }
        }
    }

    /// Owner-consented escalation of a `REJECTED` report.
    pub async fn override_report(
        &self,
        report_id: &str,
        requester: &str,
        consent: bool,
    ) -> Result<Report, ReportError> {
        if !consent {
            return Err(ReportError::Validation("consent=true is required".to_string()));
        }
        let report = self.get(report_id).await?;
        if report.uid != requester {
            return Err(ReportError::Forbidden(
                "only the report owner can override".to_string(),
            ));
        }
        if report.status != ReportStatus::Rejected {
            return Err(ReportError::InvalidState(format!(
                "Override allowed only when status is REJECTED (current: {})",
                report.status
            )));
        }

        // Conditional write: loses cleanly (InvalidState) if the status moved meanwhile.
        let updated = self
            .store
            .apply(
                report_id,
                ReportPatch::Override {
                    consent_at: Utc::now(),
                },
            )
            .await?;

        metrics::record_override();
        info!(target: "lifecycle", %report_id, "report overridden by owner");
        Ok(updated)
    }

    pub async fn get(&self, report_id: &str) -> Result<Report, ReportError> {
        self.store
            .get(report_id)
            .await?
            .ok_or_else(|| ReportError::NotFound(format!("report {report_id} not found")))
    }

    pub async fn list_by_owner(
        &self,
        owner: &str,
        limit: Option<i64>,
    ) -> Result<Vec<Report>, ReportError> {
        let limit = clamp_limit(limit, MAX_OWNER_LIMIT);
        Ok(self.store.list_by_owner(owner, limit).await?)
    }

    pub async fn list_all(
        &self,
        filter: &ReportFilter,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> Result<ReportPage, ReportError> {
        let page = clamp_page(page);
        let limit = clamp_limit(limit, MAX_LIST_LIMIT);
        let offset = (page - 1).saturating_mul(limit);
        let (items, total) = self.store.query(filter, offset, limit).await?;
        Ok(ReportPage {
            items,
            pagination: Pagination {
                page,
                limit,
                total,
                total_pages: total.div_ceil(limit),
            },
        })
    }
}
