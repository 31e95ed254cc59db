//! Reconcile requests queued to the single processor task.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use revwatch_sync::Reconciliation;

use crate::error::DaemonError;

pub(crate) struct ReconcileJob {
    pub source: &'static str,
    pub respond_to: oneshot::Sender<RunSummary>,
}

/// What one daemon-run reconciliation did, as sent over the socket and kept
/// for `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Trigger: `scheduler`, `http`, or `socket`.
    pub source: String,
    pub ok: bool,
    /// `created`, `unchanged`, `already_recorded`, or `failed`.
    pub outcome: String,
    /// Failing step, when `ok` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub report: Vec<String>,
    pub finished_at_unix: u64,
    pub duration_ms: u128,
}

impl RunSummary {
    pub(crate) fn from_reconciliation(
        source: &str,
        run: &Reconciliation,
        finished_at_unix: u64,
        duration: Duration,
    ) -> Self {
        let (ok, outcome, stage, sha, number, error) = match &run.result {
            Ok(outcome) => (
                true,
                outcome.label().to_string(),
                None,
                Some(outcome.record().sha.to_string()),
                Some(outcome.record().number),
                None,
            ),
            Err(err) => (
                false,
                "failed".to_string(),
                Some(err.stage().to_string()),
                None,
                None,
                Some(err.to_string()),
            ),
        };
        Self {
            source: source.to_string(),
            ok,
            outcome,
            stage,
            sha,
            number,
            error,
            report: run.report.lines().to_vec(),
            finished_at_unix,
            duration_ms: duration.as_millis(),
        }
    }

    /// The report as a `text/plain` body.
    pub fn report_text(&self) -> String {
        let mut text = String::new();
        for line in &self.report {
            text.push_str(line);
            text.push('\n');
        }
        text
    }

    /// The store write itself failed.
    pub fn is_write_failure(&self) -> bool {
        self.stage.as_deref() == Some("write")
    }
}

pub(crate) async fn enqueue_reconcile(
    jobs: &mpsc::Sender<ReconcileJob>,
    source: &'static str,
) -> Result<RunSummary, DaemonError> {
    let (tx, rx) = oneshot::channel();
    jobs.send(ReconcileJob {
        source,
        respond_to: tx,
    })
    .await
    .map_err(|_| DaemonError::ChannelClosed("reconcile queue"))?;

    rx.await
        .map_err(|_| DaemonError::ChannelClosed("reconcile response"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use revwatch_sync::{ReconcileError, Report};

    #[test]
    fn closed_queue_is_reported() {
        let (tx, rx) = mpsc::channel::<ReconcileJob>(1);
        drop(rx);
        let err = tokio_test::block_on(enqueue_reconcile(&tx, "socket")).unwrap_err();
        assert!(matches!(err, DaemonError::ChannelClosed("reconcile queue")));
    }

    #[test]
    fn dropped_responder_is_reported() {
        let (tx, mut rx) = mpsc::channel::<ReconcileJob>(1);
        let err = tokio_test::block_on(async move {
            let pending = tokio::spawn(async move { enqueue_reconcile(&tx, "http").await });
            drop(rx.recv().await);
            pending.await.unwrap()
        })
        .unwrap_err();
        assert!(matches!(err, DaemonError::ChannelClosed("reconcile response")));
    }

    #[test]
    fn failed_run_summary_carries_stage() {
        let run = Reconciliation {
            report: Report::default(),
            result: Err(ReconcileError::UpstreamFetch {
                url: "http://127.0.0.1:9".to_string(),
                message: "connection refused".to_string(),
            }),
        };
        let summary =
            RunSummary::from_reconciliation("scheduler", &run, 10, Duration::from_millis(3));
        assert!(!summary.ok);
        assert_eq!(summary.outcome, "failed");
        assert_eq!(summary.stage.as_deref(), Some("fetch"));
        assert!(!summary.is_write_failure());
        assert_eq!(summary.report_text(), "");
    }
}
