//! In-process report store. One write lock per mutation, never held across awaits
//! on anything else.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ReportFilter, ReportPatch, ReportStore, StoreError};
use crate::report::{NewReport, Report};

#[derive(Debug, Clone)]
struct Entry {
    // Insertion order breaks ties between equal `created_at` values.
    seq: u64,
    report: Report,
}

#[derive(Debug, Default)]
pub struct InMemoryReportStore {
    inner: RwLock<HashMap<String, Entry>>,
    next_seq: AtomicU64,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Matching entries sorted newest first.
    async fn sorted<F>(&self, keep: F) -> Vec<Report>
    where
        F: Fn(&Report) -> bool,
    {
        let map = self.inner.read().await;
        let mut rows: Vec<&Entry> = map.values().filter(|e| keep(&e.report)).collect();
        rows.sort_by(|a, b| {
            b.report
                .created_at
                .cmp(&a.report.created_at)
                .then(b.seq.cmp(&a.seq))
        });
        rows.into_iter().map(|e| e.report.clone()).collect()
    }
}

#[async_trait::async_trait]
impl ReportStore for InMemoryReportStore {
    async fn insert(&self, new: NewReport) -> Result<Report, StoreError> {
        let report = new.into_report(Uuid::new_v4().to_string(), Utc::now());
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let mut map = self.inner.write().await;
        map.insert(
            report.id.clone(),
            Entry {
                seq,
                report: report.clone(),
            },
        );
        Ok(report)
    }

    async fn get(&self, id: &str) -> Result<Option<Report>, StoreError> {
        Ok(self.inner.read().await.get(id).map(|e| e.report.clone()))
    }

    async fn apply(&self, id: &str, patch: ReportPatch) -> Result<Report, StoreError> {
        let mut map = self.inner.write().await;
        let entry = map
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        // Patch a copy so a rejected patch leaves the stored record untouched.
        let mut updated = entry.report.clone();
        patch.apply_to(&mut updated, Utc::now())?;
        entry.report = updated.clone();
        Ok(updated)
    }

    async fn list_by_owner(&self, uid: &str, limit: usize) -> Result<Vec<Report>, StoreError> {
        let mut rows = self.sorted(|r| r.uid == uid).await;
        rows.truncate(limit);
        Ok(rows)
    }

    async fn query(
        &self,
        filter: &ReportFilter,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Report>, usize), StoreError> {
        let rows = self.sorted(|r| filter.matches(r)).await;
        let total = rows.len();
        let page = rows.into_iter().skip(offset).take(limit).collect();
        Ok((page, total))
    }
}
