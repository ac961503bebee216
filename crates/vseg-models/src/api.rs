//! Request/response payloads for the process endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /api/process`.
///
/// `url` is kept as raw JSON so that a missing field, a non-string value and a
/// bad string can each be reported precisely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessRequest {
    #[serde(default)]
    pub url: Option<Value>,
}

/// One entry of the response segment list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentView {
    /// Whole seconds, rounded down
    pub start: u64,
    /// Whole seconds, rounded up
    pub end: u64,
    pub score: f64,
    pub category: String,
    /// Job-relative handle, e.g. `<job_id>/segment-1.mp4`
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Successful pipeline response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    pub success: bool,
    /// Job identifier; also the first component of every `filePath`
    pub video_id: String,
    /// Canonical platform identifier
    pub source_video_id: String,
    pub segments: Vec<SegmentView>,
    pub total_segments: usize,
    /// Size of the downloaded source media
    pub total_file_size_bytes: u64,
    pub ai_analysis_enabled: bool,
    pub summary: String,
}
