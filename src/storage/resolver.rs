//! Render-time signed URL resolution
//!
//! Every present asset reference in a batch of records is signed
//! concurrently. Results are written back by index as `signed_<field>`;
//! a failed signing turns into `null` for that one slot only.

use super::{SignedUrl, SignedUrlIssuer};
use crate::db::{Record, Table};
use crate::portfolio::{PortfolioSnapshot, PortfolioView, SectionView};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Shortest re-fetch interval handed to clients.
const MIN_REFRESH_SECS: i64 = 60;

struct Job {
    batch: usize,
    row: usize,
    signed_field: String,
    reference: String,
}

#[derive(Clone)]
pub struct BatchResolver {
    issuer: SignedUrlIssuer,
    ttl: Duration,
}

impl BatchResolver {
    pub fn new(issuer: SignedUrlIssuer, ttl: Duration) -> Self {
        Self { issuer, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issuer(&self) -> &SignedUrlIssuer {
        &self.issuer
    }

    /// Sign one reference, logging instead of failing.
    pub async fn resolve(&self, reference: &str) -> Option<SignedUrl> {
        match self.issuer.issue(reference, self.ttl).await {
            Ok(signed) => Some(signed),
            Err(e) => {
                warn!(reference, error = %e, "Could not resolve asset, rendering placeholder");
                None
            }
        }
    }

    /// Annotate one table's records. Returns the earliest expiry issued.
    pub async fn annotate(&self, table: Table, records: &mut [Record]) -> Option<DateTime<Utc>> {
        self.annotate_all(vec![(table, records)]).await
    }

    /// Annotate several batches with a single fan-out.
    pub async fn annotate_all(&self, mut batches: Vec<(Table, &mut [Record])>) -> Option<DateTime<Utc>> {
        let mut jobs = Vec::new();
        for (batch, (table, records)) in batches.iter().enumerate() {
            for (row, record) in records.iter().enumerate() {
                for slot in table.asset_slots() {
                    if let Some(reference) = slot.reference(record) {
                        jobs.push(Job {
                            batch,
                            row,
                            signed_field: slot.signed_field(),
                            reference: reference.to_string(),
                        });
                    }
                }
            }
        }

        // Slots with nothing stored still get an explicit null.
        for (table, records) in batches.iter_mut() {
            for record in records.iter_mut() {
                for slot in table.asset_slots() {
                    record.set(slot.signed_field(), Value::Null);
                }
            }
        }

        if jobs.is_empty() {
            return None;
        }
        debug!(count = jobs.len(), "Resolving signed URLs");

        let results = join_all(jobs.iter().map(|job| self.resolve(&job.reference))).await;

        let mut earliest: Option<DateTime<Utc>> = None;
        for (job, result) in jobs.into_iter().zip(results) {
            let Some(signed) = result else { continue };
            earliest = Some(earliest.map_or(signed.expires_at, |e| e.min(signed.expires_at)));
            if let Some(record) = batches[job.batch].1.get_mut(job.row) {
                record.set(job.signed_field, signed.url);
            }
        }
        earliest
    }

    /// Seconds until the earliest URL in a view should be re-fetched.
    pub fn refresh_after(&self, earliest: Option<DateTime<Utc>>) -> Option<u64> {
        let earliest = earliest?;
        let margin = chrono::Duration::from_std(self.issuer.cache().refresh_margin())
            .unwrap_or(chrono::Duration::zero());
        let secs = (earliest - margin - self.issuer.clock().now()).num_seconds();
        Some(secs.max(MIN_REFRESH_SECS) as u64)
    }

    pub async fn resolve_view(&self, mut snapshot: PortfolioSnapshot) -> PortfolioView {
        let earliest = self.annotate_all(snapshot.sections_mut()).await;
        PortfolioView {
            refresh_after_secs: self.refresh_after(earliest),
            snapshot,
        }
    }

    pub async fn resolve_section(&self, table: Table, mut records: Vec<Record>) -> SectionView {
        let earliest = self.annotate(table, &mut records).await;
        SectionView {
            section: table,
            records,
            refresh_after_secs: self.refresh_after(earliest),
        }
    }
}
