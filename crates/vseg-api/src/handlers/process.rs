//! `POST /api/process`: run the segmentation pipeline for one URL.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};
use vseg_models::{AttemptOutcome, PipelineEvent, ProcessRequest, ProcessResponse};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Run a job and wait for its result.
///
/// The job is cancelled if the client goes away before it finishes.
pub async fn process_video(
    State(state): State<AppState>,
    payload: Result<Json<ProcessRequest>, JsonRejection>,
) -> ApiResult<Json<ProcessResponse>> {
    let Json(request) = payload.map_err(|e| {
        debug!("Rejected request body: {}", e);
        ApiError::bad_request("Invalid request body")
    })?;

    let mut handle = state.pipeline.start(request.url.as_ref())?;
    if let Some(events) = handle.take_events() {
        tokio::spawn(log_events(events));
    }

    let response = handle.wait().await?;
    Ok(Json(response))
}

async fn log_events(mut events: UnboundedReceiver<PipelineEvent>) {
    while let Some(event) = events.recv().await {
        match &event {
            PipelineEvent::StatusChanged { job_id, status, .. } => {
                debug!(job_id = %job_id, status = %status, "Job status changed");
            }
            PipelineEvent::DownloadAttempted { job_id, attempt } => match attempt.outcome {
                AttemptOutcome::Success => info!(
                    job_id = %job_id,
                    strategy = %attempt.strategy,
                    duration_ms = attempt.duration_ms,
                    "Download attempt succeeded"
                ),
                AttemptOutcome::Failure => warn!(
                    job_id = %job_id,
                    strategy = %attempt.strategy,
                    error_class = attempt.error_class.map(|c| c.as_str()).unwrap_or("unknown"),
                    duration_ms = attempt.duration_ms,
                    "Download attempt failed"
                ),
            },
            PipelineEvent::WindowFinished {
                job_id,
                index,
                produced,
            } => {
                debug!(job_id = %job_id, window = index, produced, "Window finished");
            }
            PipelineEvent::ScoringApplied { job_id, ai } => {
                debug!(job_id = %job_id, ai, "Scoring applied");
            }
            PipelineEvent::Completed { job_id, segments } => {
                info!(job_id = %job_id, segments, "Job completed");
            }
            PipelineEvent::Failed { job_id, message } => {
                warn!(job_id = %job_id, "Job failed: {}", message);
            }
        }
    }
}
