//! Builds the response payload from produced segments and their scores.

use vseg_models::{JobId, MediaJob, ProcessResponse, Segment, SegmentView};

use crate::scorer::{fallback_summary, heuristic_score, ScoringOutcome};

/// Apply scores to `segments` (in place) and build the response.
///
/// File paths are reported as `<job_id>/<file_name>` handles.
pub fn assemble(
    job: &MediaJob,
    segments: &mut [Segment],
    scoring: ScoringOutcome,
    window_secs: f64,
) -> ProcessResponse {
    segments.sort_by_key(|s| s.index);

    for (position, segment) in segments.iter_mut().enumerate() {
        let score = scoring
            .score_for(segment.index)
            .cloned()
            .unwrap_or_else(|| heuristic_score(position));
        segment.apply_score(score);
    }

    let views: Vec<SegmentView> = segments.iter().map(|s| view(&job.id, s)).collect();
    let summary = scoring
        .summary
        .clone()
        .unwrap_or_else(|| fallback_summary(views.len(), window_secs));

    ProcessResponse {
        success: true,
        video_id: job.id.to_string(),
        source_video_id: job.canonical_id.to_string(),
        total_segments: views.len(),
        segments: views,
        total_file_size_bytes: job.file_size_bytes,
        ai_analysis_enabled: scoring.ai_enabled(),
        summary,
    }
}

fn view(job_id: &JobId, segment: &Segment) -> SegmentView {
    let file_name = segment
        .file_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    SegmentView {
        start: segment.start_sec.max(0.0).floor() as u64,
        end: segment.end_sec.max(0.0).ceil() as u64,
        score: segment.score,
        category: segment.category.as_str().to_string(),
        file_path: format!("{}/{}", job_id, file_name),
        reason: segment.reason.clone(),
    }
}
