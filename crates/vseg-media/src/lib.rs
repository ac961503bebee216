//! External tool plumbing for the vseg pipeline.
//!
//! This crate provides:
//! - Typed, validated command builders for ffmpeg and yt-dlp
//! - A tool runner with timeout and cancellation
//! - Media probing via ffprobe
//! - Source acquisition with primary/fallback strategies
//! - Fixed-window splitting with bounded parallelism
//! - Audio extraction and the scratch-space guard

pub mod audio;
pub mod command;
pub mod disk;
pub mod download;
pub mod error;
pub mod probe;
pub mod segment;

pub use audio::extract_audio;
pub use command::{check_tool, FfmpegCommand, Tool, ToolOutput, ToolRunner, YtDlpCommand};
pub use disk::{DiskGuard, DiskVerdict, ProbeFailurePolicy};
pub use download::{
    classify_failure, DownloadRequest, DownloadSettings, FetchedMedia, MediaDownloader,
    MediaFetcher, YtDlpDownloader, DEFAULT_USER_AGENT,
};
pub use error::{MediaError, MediaResult};
pub use probe::{FfprobeProber, MediaInfo, MediaProber};
pub use segment::{plan_windows, FfmpegExtractor, SegmentExtractor, Segmenter, SplitOutcome};
