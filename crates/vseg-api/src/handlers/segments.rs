//! `GET /api/segments/:job_id/:file_name`: stream a produced segment.
//!
//! Segments are only available until the job's cleanup runs.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use tokio_util::io::ReaderStream;
use vseg_worker::resolve_segment;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn content_type(file_name: &str) -> &'static str {
    match file_name.rsplit('.').next() {
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("mov") => "video/quicktime",
        _ => "application/octet-stream",
    }
}

pub async fn get_segment(
    State(state): State<AppState>,
    Path((job_id, file_name)): Path<(String, String)>,
) -> ApiResult<Response> {
    let not_found = || ApiError::not_found("Segment not found");

    let path = resolve_segment(&state.pipeline.config().work_dir, &job_id, &file_name)
        .ok_or_else(not_found)?;
    let file = tokio::fs::File::open(&path).await.map_err(|_| not_found())?;
    let size = file.metadata().await.map_err(|_| not_found())?.len();

    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type(&file_name)),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    Ok(response)
}
