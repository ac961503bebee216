//! Fixed-window splitting.
//!
//! Windows are planned up front, then extracted with bounded parallelism.
//! A failed window is logged and skipped; the split only fails when no
//! window produced a non-empty file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};
use vseg_models::{Segment, Window};

use crate::command::{FfmpegCommand, Tool, ToolRunner};
use crate::error::{MediaError, MediaResult};

/// Plan contiguous windows of `width` seconds covering `duration`.
///
/// The last window is clipped to the media end; windows starting at or after
/// the end are never produced.
pub fn plan_windows(duration: f64, width: f64) -> Vec<Window> {
    if !(duration.is_finite() && width.is_finite()) || duration <= 0.0 || width <= 0.0 {
        return Vec::new();
    }

    let mut windows = Vec::new();
    let mut index: u32 = 0;
    loop {
        let start = index as f64 * width;
        if start >= duration {
            break;
        }
        index += 1;
        windows.push(Window {
            index,
            start_sec: start,
            end_sec: (start + width).min(duration),
        });
    }
    windows
}

/// File name of the segment produced for a window.
pub fn segment_file_name(index: u32, extension: &str) -> String {
    format!("segment-{}.{}", index, extension)
}

/// Extracts one window into a standalone file.
#[async_trait]
pub trait SegmentExtractor: Send + Sync {
    async fn extract(&self, input: &Path, window: &Window, output: &Path) -> MediaResult<()>;
}

/// Stream-copy extraction with ffmpeg.
#[derive(Debug, Clone, Default)]
pub struct FfmpegExtractor {
    timeout_secs: Option<u64>,
}

impl FfmpegExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn command(input: &Path, window: &Window, output: &Path) -> FfmpegCommand {
        FfmpegCommand::new(input, output)
            .seek(window.start_sec)
            .duration(window.duration())
            .stream_copy()
            .avoid_negative_ts("make_zero")
    }
}

#[async_trait]
impl SegmentExtractor for FfmpegExtractor {
    async fn extract(&self, input: &Path, window: &Window, output: &Path) -> MediaResult<()> {
        let args = Self::command(input, window, output).build_args()?;

        // No cancel signal: in-flight extractions are allowed to finish.
        let mut runner = ToolRunner::new();
        if let Some(secs) = self.timeout_secs {
            runner = runner.with_timeout(secs);
        }
        runner.run(Tool::Ffmpeg, &args).await.map(|_| ())
    }
}

/// Outcome of a split with at least one produced segment.
#[derive(Debug, Clone)]
pub struct SplitOutcome {
    /// Produced segments in window order
    pub segments: Vec<Segment>,
    pub planned: usize,
    /// Indices of windows that failed
    pub failed: Vec<u32>,
}

enum WindowResult {
    Produced(Segment),
    Failed(u32),
    Skipped,
}

/// Cuts media into fixed windows.
#[derive(Clone)]
pub struct Segmenter {
    extractor: Arc<dyn SegmentExtractor>,
    window_secs: f64,
    max_parallel: usize,
}

impl Segmenter {
    pub fn new(extractor: Arc<dyn SegmentExtractor>, window_secs: f64, max_parallel: usize) -> Self {
        Self {
            extractor,
            window_secs,
            max_parallel: max_parallel.max(1),
        }
    }

    pub fn window_secs(&self) -> f64 {
        self.window_secs
    }

    /// Split `input` (of `duration` seconds) into `out_dir`.
    ///
    /// Once `cancel` flips, windows that have not started are skipped and the
    /// call returns `Cancelled` after in-flight windows finish.
    pub async fn split<F>(
        &self,
        input: &Path,
        duration: f64,
        out_dir: &Path,
        cancel: Option<watch::Receiver<bool>>,
        on_window: F,
    ) -> MediaResult<SplitOutcome>
    where
        F: Fn(u32, bool) + Send + Sync,
    {
        let windows = plan_windows(duration, self.window_secs);
        let planned = windows.len();
        let extension = input
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
            .unwrap_or("mp4")
            .to_string();

        tokio::fs::create_dir_all(out_dir).await?;

        info!(
            windows = planned,
            window_secs = self.window_secs,
            max_parallel = self.max_parallel,
            "Splitting media"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let is_cancelled = |rx: &Option<watch::Receiver<bool>>| {
            rx.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
        };

        let tasks = windows.iter().map(|window| {
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let output: PathBuf = out_dir.join(segment_file_name(window.index, &extension));
            let on_window = &on_window;

            async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return WindowResult::Skipped;
                };
                if is_cancelled(&cancel) {
                    debug!(window = window.index, "Skipping window after cancel");
                    return WindowResult::Skipped;
                }

                let result = self.extract_window(input, window, &output).await;
                match result {
                    Ok(size) => {
                        on_window(window.index, true);
                        WindowResult::Produced(Segment::from_window(window, output, size))
                    }
                    Err(e) => {
                        warn!(
                            window = window.index,
                            start = window.start_sec,
                            end = window.end_sec,
                            "Window extraction failed: {}",
                            e
                        );
                        let _ = tokio::fs::remove_file(&output).await;
                        on_window(window.index, false);
                        WindowResult::Failed(window.index)
                    }
                }
            }
        });

        let results = join_all(tasks).await;

        let mut segments = Vec::new();
        let mut failed = Vec::new();
        for result in results {
            match result {
                WindowResult::Produced(segment) => segments.push(segment),
                WindowResult::Failed(index) => failed.push(index),
                WindowResult::Skipped => {}
            }
        }
        segments.sort_by_key(|s| s.index);
        failed.sort_unstable();

        metrics::counter!("vseg_segments_total", "outcome" => "produced")
            .increment(segments.len() as u64);
        metrics::counter!("vseg_segments_total", "outcome" => "failed")
            .increment(failed.len() as u64);

        if is_cancelled(&cancel) {
            return Err(MediaError::Cancelled);
        }

        if segments.is_empty() {
            return Err(MediaError::NoSegmentsProduced {
                planned,
                failed: failed.len(),
            });
        }

        info!(
            produced = segments.len(),
            failed = failed.len(),
            "Split complete"
        );

        Ok(SplitOutcome {
            segments,
            planned,
            failed,
        })
    }

    async fn extract_window(&self, input: &Path, window: &Window, output: &Path) -> MediaResult<u64> {
        self.extractor.extract(input, window, output).await?;

        let size = tokio::fs::metadata(output)
            .await
            .map_err(|_| MediaError::FileNotFound(output.to_path_buf()))?
            .len();
        if size == 0 {
            return Err(MediaError::EmptyOutput(output.to_path_buf()));
        }
        Ok(size)
    }
}
