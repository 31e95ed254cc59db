//! The fetch → compare → conditional-insert cycle.
//!
//! One call performs, strictly in order:
//!
//! 1. fetch the upstream head (validated by the source);
//! 2. read the latest stored record;
//! 3. stop if the SHAs match;
//! 4. otherwise insert `{sha, latest.number + 1 (or 0), now}` on the
//!    condition that the latest number has not moved.
//!
//! Any failure ends the call with nothing written. There are no retries; the
//! next scheduled call starts over.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use revwatch_core::RevisionRecord;
use revwatch_store::{InsertOutcome, RevisionStore};

use crate::error::ReconcileError;
use crate::fetcher::RevisionSource;

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Human-readable account of each step, in order. Rendered verbatim as the
/// HTTP trigger's `text/plain` body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Report {
    lines: Vec<String>,
}

impl Report {
    fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|line| line.contains(needle))
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Successful end states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Upstream head equals the latest stored record.
    Unchanged { record: RevisionRecord },
    /// A new record was appended.
    Created {
        record: RevisionRecord,
        previous: Option<RevisionRecord>,
    },
    /// The upstream SHA was already stored (by a concurrent writer, or as an
    /// older record the branch moved back to).
    AlreadyRecorded { record: RevisionRecord },
}

impl ReconcileOutcome {
    pub fn record(&self) -> &RevisionRecord {
        match self {
            ReconcileOutcome::Unchanged { record }
            | ReconcileOutcome::Created { record, .. }
            | ReconcileOutcome::AlreadyRecorded { record } => record,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Unchanged { .. } => "unchanged",
            ReconcileOutcome::Created { .. } => "created",
            ReconcileOutcome::AlreadyRecorded { .. } => "already_recorded",
        }
    }
}

/// Everything one reconciliation produced.
#[derive(Debug)]
pub struct Reconciliation {
    pub report: Report,
    pub result: Result<ReconcileOutcome, ReconcileError>,
}

impl Reconciliation {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

// ---------------------------------------------------------------------------
// reconcile
// ---------------------------------------------------------------------------

/// Reconcile using the current time.
pub fn reconcile(source: &dyn RevisionSource, store: &dyn RevisionStore) -> Reconciliation {
    reconcile_at(source, store, Utc::now())
}

/// Reconcile with an explicit creation timestamp for any new record.
pub fn reconcile_at(
    source: &dyn RevisionSource,
    store: &dyn RevisionStore,
    now: DateTime<Utc>,
) -> Reconciliation {
    let mut report = Report::default();
    let result = run(source, store, now, &mut report);
    match &result {
        Ok(outcome) => tracing::info!(
            outcome = outcome.label(),
            sha = %outcome.record().sha,
            number = outcome.record().number,
            "reconciliation finished",
        ),
        Err(err) => tracing::warn!(
            stage = err.stage(),
            error = %err,
            "reconciliation failed",
        ),
    }
    Reconciliation { report, result }
}

fn run(
    source: &dyn RevisionSource,
    store: &dyn RevisionStore,
    now: DateTime<Utc>,
    report: &mut Report,
) -> Result<ReconcileOutcome, ReconcileError> {
    let sha = source.fetch_latest().map_err(|err| {
        let err = ReconcileError::from(err);
        match &err {
            ReconcileError::InvalidIdentifier(_) => {
                report.push(format!("Got invalid SHA from GitHub: {err}"))
            }
            _ => report.push(format!("Got error fetching from GitHub: {err}")),
        }
        err
    })?;
    tracing::debug!(source = %source.describe(), sha = %sha, "fetched upstream head");

    let latest = store.latest().map_err(|err| {
        report.push(format!("Error fetching current revision: {err}"));
        ReconcileError::StorageQuery(err)
    })?;
    report.push(format!("GH SHA: {sha}"));

    match &latest {
        Some(previous) => {
            report.push(format!("Stored SHA: {}", previous.sha));
            if previous.sha == sha {
                report.push("SHAs match, stopping.");
                return Ok(ReconcileOutcome::Unchanged {
                    record: previous.clone(),
                });
            }
        }
        None => report.push("No current revision, creating first revision."),
    }

    report.push("Creating new revision.");
    let record = RevisionRecord::next_after(latest.as_ref(), sha, now);
    let expected = latest.as_ref().map(|previous| previous.number);

    match store.insert(&record, expected) {
        Ok(InsertOutcome::Inserted) => {
            report.push(format!("Created: {record}"));
            Ok(ReconcileOutcome::Created {
                record,
                previous: latest,
            })
        }
        Ok(InsertOutcome::AlreadyPresent(existing)) => {
            report.push(format!("Revision already recorded: {existing}"));
            Ok(ReconcileOutcome::AlreadyRecorded { record: existing })
        }
        Err(err) => {
            report.push(format!("Error writing revision: {err}"));
            Err(ReconcileError::StorageWrite(err))
        }
    }
}
