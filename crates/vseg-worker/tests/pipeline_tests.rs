//! End-to-end pipeline tests with in-process fakes for the external tools.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::watch;
use vseg_media::{
    DownloadRequest, MediaDownloader, MediaError, MediaInfo, MediaProber, MediaResult,
    ProbeFailurePolicy, SegmentExtractor,
};
use vseg_models::{
    AttemptOutcome, DownloadStrategy, FailureClass, JobStatus, PipelineEvent, SegmentCategory,
    SegmentScore, Window,
};
use vseg_worker::{
    resolve_segment, AnalyzerScores, CleanupScheduler, ContentAnalyzer, Pipeline, PipelineConfig,
    PipelineDeps, PipelineError, ScoringError,
};

const URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ&list=PL123";

#[derive(Default)]
struct FakeDownloader {
    primary_error: Option<&'static str>,
    fallback_error: Option<&'static str>,
    calls: AtomicUsize,
}

#[async_trait]
impl MediaDownloader for FakeDownloader {
    async fn download(&self, strategy: DownloadStrategy, request: &DownloadRequest) -> MediaResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let error = match strategy {
            DownloadStrategy::Primary => self.primary_error,
            DownloadStrategy::Fallback => self.fallback_error,
        };
        if let Some(message) = error {
            return Err(MediaError::download_failed(message));
        }
        let path = request
            .output_dir
            .join(format!("{}.mp4", request.file_stem));
        tokio::fs::write(path, vec![0u8; 2048]).await?;
        Ok(())
    }
}

struct FakeProber {
    duration: f64,
}

#[async_trait]
impl MediaProber for FakeProber {
    async fn probe(&self, _path: &Path) -> MediaResult<MediaInfo> {
        Ok(MediaInfo {
            duration: self.duration,
            has_video: true,
            has_audio: true,
            format_name: "mp4".to_string(),
        })
    }
}

#[derive(Default)]
struct FakeExtractor {
    failing: Vec<u32>,
    delay: Option<Duration>,
}

#[async_trait]
impl SegmentExtractor for FakeExtractor {
    async fn extract(&self, _input: &Path, window: &Window, output: &Path) -> MediaResult<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&window.index) {
            return Err(MediaError::ffmpeg_failed("fake failure", None, Some(1)));
        }
        tokio::fs::write(output, b"segment").await?;
        Ok(())
    }
}

/// Analyzer that answers after `delay` and ignores cancellation.
struct FakeAnalyzer {
    result: Result<AnalyzerScores, ()>,
    delay: Duration,
}

impl FakeAnalyzer {
    fn failing() -> Self {
        Self {
            result: Err(()),
            delay: Duration::ZERO,
        }
    }

    fn scoring(scores: HashMap<u32, SegmentScore>, summary: &str) -> Self {
        Self {
            result: Ok(AnalyzerScores {
                scores,
                summary: Some(summary.to_string()),
            }),
            delay: Duration::ZERO,
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            result: Ok(AnalyzerScores::default()),
            delay,
        }
    }
}

#[async_trait]
impl ContentAnalyzer for FakeAnalyzer {
    async fn analyze(
        &self,
        _media_path: &Path,
        _scratch_dir: &Path,
        _windows: &[Window],
        _cancel: Option<watch::Receiver<bool>>,
    ) -> Result<AnalyzerScores, ScoringError> {
        tokio::time::sleep(self.delay).await;
        self.result.clone().map_err(|_| ScoringError::Empty)
    }
}

struct Harness {
    root: TempDir,
    pipeline: Pipeline,
}

impl Harness {
    fn new(duration: f64, downloader: FakeDownloader, extractor: FakeExtractor) -> Self {
        Self::with_config(duration, downloader, extractor, |_| {})
    }

    fn with_config(
        duration: f64,
        downloader: FakeDownloader,
        extractor: FakeExtractor,
        tweak: impl FnOnce(&mut PipelineConfig),
    ) -> Self {
        Self::build(duration, downloader, extractor, None, tweak)
    }

    fn with_analyzer(
        duration: f64,
        extractor: FakeExtractor,
        analyzer: impl ContentAnalyzer + 'static,
    ) -> Self {
        let analyzer: Arc<dyn ContentAnalyzer> = Arc::new(analyzer);
        Self::build(
            duration,
            FakeDownloader::default(),
            extractor,
            Some(analyzer),
            |_| {},
        )
    }

    fn build(
        duration: f64,
        downloader: FakeDownloader,
        extractor: FakeExtractor,
        analyzer: Option<Arc<dyn ContentAnalyzer>>,
        tweak: impl FnOnce(&mut PipelineConfig),
    ) -> Self {
        let root = TempDir::new().unwrap();
        let mut config = PipelineConfig {
            work_dir: root.path().to_path_buf(),
            required_space_mb: 0,
            cleanup_grace: Duration::from_secs(60),
            ..Default::default()
        };
        tweak(&mut config);

        let cleanup = CleanupScheduler::start(root.path(), config.cleanup_grace);
        let deps = PipelineDeps {
            downloader: Arc::new(downloader),
            prober: Arc::new(FakeProber { duration }),
            extractor: Arc::new(extractor),
            analyzer,
        };

        Self {
            pipeline: Pipeline::new(config, deps, cleanup),
            root,
        }
    }

    fn job_dirs(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.root.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect()
    }
}

#[tokio::test]
async fn test_thirty_seconds_yields_three_segments() {
    let harness = Harness::new(30.0, FakeDownloader::default(), FakeExtractor::default());

    let response = harness.pipeline.process(Some(&json!(URL))).await.unwrap();

    assert!(response.success);
    assert_eq!(response.source_video_id, "dQw4w9WgXcQ");
    assert_eq!(response.total_segments, 3);
    assert_eq!(response.total_file_size_bytes, 2048);
    assert!(!response.ai_analysis_enabled);
    assert_eq!(response.summary, "Processed video into 3 segments of 10s each");

    let bounds: Vec<(u64, u64)> = response.segments.iter().map(|s| (s.start, s.end)).collect();
    assert_eq!(bounds, vec![(0, 10), (10, 20), (20, 30)]);
    assert_eq!(response.segments[0].category, "highlight");
    assert!(response
        .segments
        .windows(2)
        .all(|pair| pair[0].score >= pair[1].score));

    for segment in &response.segments {
        let (job_id, file_name) = segment.file_path.split_once('/').unwrap();
        assert_eq!(job_id, response.video_id);
        let path = resolve_segment(harness.root.path(), job_id, file_name).unwrap();
        assert!(path.exists(), "missing {}", path.display());
    }
}

#[tokio::test]
async fn test_short_media_yields_single_segment() {
    let harness = Harness::new(5.0, FakeDownloader::default(), FakeExtractor::default());

    let response = harness.pipeline.process(Some(&json!(URL))).await.unwrap();

    assert_eq!(response.total_segments, 1);
    assert_eq!((response.segments[0].start, response.segments[0].end), (0, 5));
}

#[tokio::test]
async fn test_repeated_runs_have_same_boundaries() {
    let harness = Harness::new(25.0, FakeDownloader::default(), FakeExtractor::default());

    let first = harness.pipeline.process(Some(&json!(URL))).await.unwrap();
    let second = harness
        .pipeline
        .process(Some(&json!("https://youtu.be/dQw4w9WgXcQ")))
        .await
        .unwrap();

    let bounds = |r: &vseg_models::ProcessResponse| {
        r.segments.iter().map(|s| (s.start, s.end)).collect::<Vec<_>>()
    };
    assert_eq!(bounds(&first), bounds(&second));
    assert_ne!(first.video_id, second.video_id);
    assert_eq!(first.source_video_id, second.source_video_id);
}

#[tokio::test]
async fn test_invalid_input_rejected_without_side_effects() {
    let downloader = FakeDownloader::default();
    let harness = Harness::new(30.0, downloader, FakeExtractor::default());

    assert!(matches!(
        harness.pipeline.start(None).map(|_| ()),
        Err(PipelineError::SourceRequired)
    ));
    assert!(matches!(
        harness.pipeline.start(Some(&json!("https://vimeo.com/12345"))).map(|_| ()),
        Err(PipelineError::InvalidSource(_))
    ));
    assert!(matches!(
        harness.pipeline.start(Some(&json!(42))).map(|_| ()),
        Err(PipelineError::InvalidSource(_))
    ));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(harness.job_dirs().is_empty());
}

#[tokio::test]
async fn test_fallback_after_primary_network_error() {
    let downloader = FakeDownloader {
        primary_error: Some("ERROR: Unable to download webpage: Connection reset by peer"),
        ..Default::default()
    };
    let harness = Harness::new(30.0, downloader, FakeExtractor::default());

    let mut handle = harness.pipeline.start(Some(&json!(URL))).unwrap();
    let mut events = handle.take_events().unwrap();
    let response = handle.wait().await.unwrap();
    assert_eq!(response.total_segments, 3);

    let mut attempts = Vec::new();
    let mut statuses = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            PipelineEvent::DownloadAttempted { attempt, .. } => attempts.push(attempt),
            PipelineEvent::StatusChanged { status, .. } => statuses.push(status),
            _ => {}
        }
    }

    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].strategy, DownloadStrategy::Primary);
    assert_eq!(attempts[0].outcome, AttemptOutcome::Failure);
    assert_eq!(attempts[0].error_class, Some(FailureClass::Network));
    assert_eq!(attempts[1].strategy, DownloadStrategy::Fallback);
    assert_eq!(attempts[1].outcome, AttemptOutcome::Success);

    assert!(statuses.contains(&JobStatus::Downloaded));
    assert_eq!(statuses.last(), Some(&JobStatus::Done));
}

#[tokio::test]
async fn test_acquisition_failure_removes_job_dir() {
    let downloader = FakeDownloader {
        primary_error: Some("ERROR: [youtube] dQw4w9WgXcQ: Private video"),
        fallback_error: Some("ERROR: [youtube] dQw4w9WgXcQ: Private video"),
        ..Default::default()
    };
    let harness = Harness::new(30.0, downloader, FakeExtractor::default());

    let err = harness.pipeline.process(Some(&json!(URL))).await.unwrap_err();

    match &err {
        PipelineError::AcquisitionFailed { class, attempts } => {
            assert_eq!(*class, FailureClass::Unavailable);
            assert_eq!(attempts.len(), 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.to_string(), "Video is unavailable or private");
    assert!(harness.job_dirs().is_empty());
}

#[tokio::test]
async fn test_insufficient_storage() {
    let harness = Harness::with_config(
        30.0,
        FakeDownloader::default(),
        FakeExtractor::default(),
        |config| {
            config.required_space_mb = u64::MAX;
            config.disk_probe_policy = ProbeFailurePolicy::FailClosed;
        },
    );

    let err = harness.pipeline.process(Some(&json!(URL))).await.unwrap_err();

    assert!(matches!(err, PipelineError::InsufficientStorage { .. }));
    assert!(harness.job_dirs().is_empty());
}

#[tokio::test]
async fn test_partial_window_failure_still_succeeds() {
    let extractor = FakeExtractor {
        failing: vec![2],
        ..Default::default()
    };
    let harness = Harness::new(30.0, FakeDownloader::default(), extractor);

    let response = harness.pipeline.process(Some(&json!(URL))).await.unwrap();

    assert_eq!(response.total_segments, 2);
    let starts: Vec<u64> = response.segments.iter().map(|s| s.start).collect();
    assert_eq!(starts, vec![0, 20]);
}

#[tokio::test]
async fn test_all_windows_failing_is_fatal() {
    let extractor = FakeExtractor {
        failing: vec![1, 2, 3],
        ..Default::default()
    };
    let harness = Harness::new(30.0, FakeDownloader::default(), extractor);

    let err = harness.pipeline.process(Some(&json!(URL))).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::SegmentationFailed { planned: 3, failed: 3 }
    ));
    assert!(harness.job_dirs().is_empty());
}

#[tokio::test]
async fn test_cancel_removes_job_dir() {
    let extractor = FakeExtractor {
        delay: Some(Duration::from_millis(100)),
        ..Default::default()
    };
    let harness = Harness::with_config(
        120.0,
        FakeDownloader::default(),
        extractor,
        |config| config.max_ffmpeg_processes = 1,
    );

    let handle = harness.pipeline.start(Some(&json!(URL))).unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    handle.cancel();

    let err = handle.wait().await.unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled));
    assert!(harness.job_dirs().is_empty());
}

#[tokio::test]
async fn test_dropped_handle_cancels_job() {
    let extractor = FakeExtractor {
        delay: Some(Duration::from_millis(100)),
        ..Default::default()
    };
    let harness = Harness::with_config(
        120.0,
        FakeDownloader::default(),
        extractor,
        |config| config.max_ffmpeg_processes = 1,
    );

    let mut handle = harness.pipeline.start(Some(&json!(URL))).unwrap();
    let mut events = handle.take_events().unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    drop(handle);

    let mut failed = false;
    while let Some(event) = events.recv().await {
        if let PipelineEvent::Failed { message, .. } = event {
            assert_eq!(message, "Job cancelled");
            failed = true;
        }
    }
    assert!(failed);
    assert!(harness.job_dirs().is_empty());
}

#[tokio::test]
async fn test_job_dir_removed_after_grace_period() {
    let harness = Harness::with_config(
        30.0,
        FakeDownloader::default(),
        FakeExtractor::default(),
        |config| config.cleanup_grace = Duration::from_millis(100),
    );

    let response = harness.pipeline.process(Some(&json!(URL))).await.unwrap();
    let job_dir = harness.root.path().join(&response.video_id);
    assert!(job_dir.exists());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!job_dir.exists());
    assert!(harness.job_dirs().is_empty());
}

#[tokio::test]
async fn test_unreachable_ai_still_scores_every_segment() {
    let harness = Harness::with_analyzer(30.0, FakeExtractor::default(), FakeAnalyzer::failing());

    let response = harness.pipeline.process(Some(&json!(URL))).await.unwrap();

    assert!(!response.ai_analysis_enabled);
    assert_eq!(response.total_segments, 3);
    assert_eq!(response.summary, "Processed video into 3 segments of 10s each");
    for segment in &response.segments {
        assert!(segment.score.is_finite() && segment.score > 0.0);
        assert!(!segment.category.is_empty());
    }
    assert_eq!(response.segments[0].category, "highlight");
}

#[tokio::test]
async fn test_ai_scores_merged_with_heuristic() {
    let mut scores = HashMap::new();
    scores.insert(
        2,
        SegmentScore::new(9.5, SegmentCategory::Trivia, Some("surprising fact".to_string())),
    );
    let harness = Harness::with_analyzer(
        30.0,
        FakeExtractor::default(),
        FakeAnalyzer::scoring(scores, "A short music video"),
    );

    let response = harness.pipeline.process(Some(&json!(URL))).await.unwrap();

    assert!(response.ai_analysis_enabled);
    assert_eq!(response.summary, "A short music video");

    let second = &response.segments[1];
    assert_eq!(second.score, 9.5);
    assert_eq!(second.category, "trivia");
    assert_eq!(second.reason.as_deref(), Some("surprising fact"));

    // Windows the analyzer skipped keep their positional defaults
    assert_eq!(response.segments[0].score, 8.0);
    assert_eq!(response.segments[0].category, "highlight");
    assert_eq!(response.segments[2].score, 6.0);
    assert!(response.segments[2].reason.is_none());
}

#[tokio::test]
async fn test_cancel_does_not_wait_for_slow_scoring() {
    let harness = Harness::with_analyzer(
        30.0,
        FakeExtractor::default(),
        FakeAnalyzer::slow(Duration::from_secs(5)),
    );

    let handle = harness.pipeline.start(Some(&json!(URL))).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let cancelled_at = Instant::now();
    handle.cancel();

    let err = handle.wait().await.unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled));
    assert!(cancelled_at.elapsed() < Duration::from_secs(1));
    assert!(harness.job_dirs().is_empty());
}

#[tokio::test]
async fn test_failed_split_does_not_wait_for_slow_scoring() {
    let extractor = FakeExtractor {
        failing: vec![1, 2, 3],
        ..Default::default()
    };
    let harness =
        Harness::with_analyzer(30.0, extractor, FakeAnalyzer::slow(Duration::from_secs(5)));

    let started = Instant::now();
    let err = harness.pipeline.process(Some(&json!(URL))).await.unwrap_err();

    assert!(matches!(err, PipelineError::SegmentationFailed { .. }));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(harness.job_dirs().is_empty());
}
