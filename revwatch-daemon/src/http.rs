//! HTTP trigger: any method on the configured path runs one reconciliation
//! and answers with its report as `text/plain`.

use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use tokio::sync::mpsc;

use crate::jobs::{enqueue_reconcile, ReconcileJob};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

pub(crate) fn router(path: &str, jobs: mpsc::Sender<ReconcileJob>) -> Router {
    Router::new().route(path, any(trigger)).with_state(jobs)
}

async fn trigger(State(jobs): State<mpsc::Sender<ReconcileJob>>, method: Method) -> Response {
    tracing::debug!(%method, "http reconcile trigger");
    match enqueue_reconcile(&jobs, "http").await {
        Ok(summary) => {
            let status = if summary.is_write_failure() {
                StatusCode::INTERNAL_SERVER_ERROR
            } else {
                StatusCode::OK
            };
            (
                status,
                [(header::CONTENT_TYPE, TEXT_PLAIN)],
                summary.report_text(),
            )
                .into_response()
        }
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, TEXT_PLAIN)],
            format!("{err}\n"),
        )
            .into_response(),
    }
}
