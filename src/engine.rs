//! # Decision Engine
//! Pure, testable logic that maps a normalized `Verdict` → terminal status + reasons.
//! No I/O, suitable for unit tests and offline evaluation.
//!
//! Policy: accept only a confident incident that is not suspected synthetic.
//! Confidence never outweighs the synthetic flag.

use crate::report::ReportStatus;
use crate::verify::Verdict;

/// Minimum incident confidence (inclusive) for acceptance.
pub const ACCEPT_CONFIDENCE: f64 = 0.70;

/// Supplied when a rejection comes with no explanation from the classifier.
pub const DEFAULT_REJECT_REASON: &str = "Image did not meet submission requirements";

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Always `Accepted` or `Rejected`.
    pub status: ReportStatus,
    pub reasons: Vec<String>,
}

pub fn decide(verdict: &Verdict) -> Decision {
    let accepted = verdict.is_incident
        && verdict.incident_confidence >= ACCEPT_CONFIDENCE
        && !verdict.suspected_synthetic;

    let mut reasons = verdict.reasons.clone();
    let status = if accepted {
        ReportStatus::Accepted
    } else {
        if reasons.is_empty() {
            reasons.push(DEFAULT_REJECT_REASON.to_string());
        }
        ReportStatus::Rejected
    };

    Decision { status, reasons }
}
