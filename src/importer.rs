//! The bulk import pipeline: stream the registry CSV, normalize and dedupe
//! each row, commit accepted records in fixed-size batches.
//!
//! Every committed batch is durable on its own, so an interrupted run can
//! simply be re-run from the start: already-imported rows fall out through
//! the duplicate-cin path and the store ends up identical to an
//! uninterrupted run.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::database_ops::companies::{CompanyRecord, CompanyStore};
use crate::normalization::company::{normalize, NormalizedOutcome, RawCompanyRow, SkipReason};
use crate::reader;

pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const DEFAULT_PROGRESS_EVERY: u64 = 10_000;
const PRELOAD_PAGE_SIZE: i64 = 50_000;

/// Tuning knobs for one import run.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Records per bulk insert.
    pub batch_size: usize,
    /// Normalize and dedupe without writing to the store.
    pub dry_run: bool,
    /// Emit a progress line every this many rows read.
    pub progress_every: u64,
    /// Known total row count of the dump, for percentage progress lines.
    pub expect_total: Option<u64>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            dry_run: false,
            progress_every: DEFAULT_PROGRESS_EVERY,
            expect_total: None,
        }
    }
}

/// Summary counters for a finished run. Serialized as-is by `--report-json`.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunReport {
    pub rows_read: u64,
    pub inserted: u64,
    pub duplicates_skipped: u64,
    pub missing_required_field: u64,
    pub malformed_rows: u64,
    /// Cins whose individual commit still failed after the batch fallback.
    pub failed_cins: Vec<String>,
    pub store_count: i64,
    pub dry_run: bool,
}

impl RunReport {
    /// Persist the report as pretty JSON for ops follow-up.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let body = serde_json::to_string_pretty(self)?;
        std::fs::write(path, body)
            .with_context(|| format!("writing report to {}", path.display()))
    }
}

/// Single-pass bulk importer over a [`CompanyStore`].
///
/// Owns the existing-key set and the current batch for the duration of a
/// run; instantiable any number of times within one process.
pub struct Importer<S> {
    store: S,
    config: ImportConfig,
}

impl<S: CompanyStore> Importer<S> {
    pub fn new(store: S, config: ImportConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run the pipeline over the CSV at `path`.
    ///
    /// Malformed rows, missing required fields and duplicate cins are
    /// counted and skipped. A bulk-insert failure degrades to per-record
    /// inserts for that batch. Only an unreadable source is fatal; partial
    /// progress committed before the failure stays valid.
    pub async fn run(&self, path: &Path) -> Result<RunReport> {
        let mut report = RunReport {
            dry_run: self.config.dry_run,
            ..Default::default()
        };

        let mut existing_cins = self
            .store
            .load_existing_cins(PRELOAD_PAGE_SIZE)
            .await
            .context("preloading existing cins")?;
        info!(
            path = %path.display(),
            existing = existing_cins.len(),
            batch_size = self.config.batch_size,
            dry_run = self.config.dry_run,
            "import starting"
        );

        let mut rdr = reader::open_csv(path)?;
        let mut batch: Vec<CompanyRecord> = Vec::with_capacity(self.config.batch_size);
        let progress_every = self.config.progress_every.max(1);

        for row in rdr.deserialize::<RawCompanyRow>() {
            report.rows_read += 1;
            match row {
                Ok(raw) => match normalize(&raw, &mut existing_cins) {
                    NormalizedOutcome::Accepted(record) => batch.push(record),
                    NormalizedOutcome::Skipped(SkipReason::DuplicateCin) => {
                        report.duplicates_skipped += 1;
                    }
                    NormalizedOutcome::Skipped(SkipReason::MissingRequiredField) => {
                        report.missing_required_field += 1;
                    }
                },
                Err(err) => {
                    if reader::is_fatal(&err) {
                        return Err(err).context("reading source csv");
                    }
                    report.malformed_rows += 1;
                }
            }

            if batch.len() >= self.config.batch_size {
                let full = std::mem::take(&mut batch);
                self.commit(full, &mut report).await;
            }

            if report.rows_read % progress_every == 0 {
                self.log_progress(&report);
            }
        }

        // Drain the final partial batch.
        if !batch.is_empty() {
            self.commit(batch, &mut report).await;
        }

        report.store_count = self
            .store
            .count()
            .await
            .context("counting stored companies")?;
        info!(
            rows = report.rows_read,
            inserted = report.inserted,
            duplicates = report.duplicates_skipped,
            missing_required = report.missing_required_field,
            malformed = report.malformed_rows,
            failed = report.failed_cins.len(),
            store_count = report.store_count,
            dry_run = report.dry_run,
            "import finished"
        );
        Ok(report)
    }

    /// Commit one batch: bulk first, per-record fallback on bulk failure so
    /// a single poisoned row costs one record, not the whole batch.
    async fn commit(&self, batch: Vec<CompanyRecord>, report: &mut RunReport) {
        if self.config.dry_run {
            report.inserted += batch.len() as u64;
            return;
        }
        match self.store.bulk_insert(&batch).await {
            Ok(n) => report.inserted += n,
            Err(err) => {
                warn!(
                    batch_len = batch.len(),
                    error = %err,
                    "bulk insert failed; retrying records individually"
                );
                for record in &batch {
                    match self.store.insert_one(record).await {
                        Ok(true) => report.inserted += 1,
                        Ok(false) => report.duplicates_skipped += 1,
                        Err(err) => {
                            warn!(cin = %record.cin, error = %err, "record commit failed");
                            report.failed_cins.push(record.cin.clone());
                        }
                    }
                }
            }
        }
    }

    fn log_progress(&self, report: &RunReport) {
        match self.config.expect_total {
            Some(total) if total > 0 => {
                let pct = report.rows_read as f64 * 100.0 / total as f64;
                info!(
                    rows = report.rows_read,
                    inserted = report.inserted,
                    duplicates = report.duplicates_skipped,
                    "progress {pct:.1}%"
                );
            }
            _ => {
                info!(
                    rows = report.rows_read,
                    inserted = report.inserted,
                    duplicates = report.duplicates_skipped,
                    "progress"
                );
            }
        }
    }
}
