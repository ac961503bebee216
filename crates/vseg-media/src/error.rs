//! Error types for media operations.

use std::path::PathBuf;

use thiserror::Error;
use vseg_models::{DownloadAttempt, FailureClass};

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("yt-dlp not found in PATH")]
    YtDlpNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    /// A single download strategy failed.
    #[error("Download failed: {message}")]
    DownloadFailed { message: String },

    /// Every download strategy failed.
    #[error("Acquisition failed ({class}): {message}")]
    AcquisitionFailed {
        class: FailureClass,
        message: String,
        attempts: Vec<DownloadAttempt>,
    },

    /// Rejected by a command builder before anything was spawned.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Output file is empty: {0}")]
    EmptyOutput(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Insufficient storage: {available_mb} MB available, {required_mb} MB required")]
    InsufficientStorage { required_mb: u64, available_mb: u64 },

    #[error("No segments could be created ({failed} of {planned} windows failed)")]
    NoSegmentsProduced { planned: usize, failed: usize },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a download failure error.
    pub fn download_failed(message: impl Into<String>) -> Self {
        Self::DownloadFailed {
            message: message.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Raw diagnostic text for failure classification.
    pub fn diagnostic_text(&self) -> String {
        match self {
            MediaError::FfmpegFailed { message, stderr, .. }
            | MediaError::FfprobeFailed { message, stderr } => match stderr {
                Some(stderr) => format!("{}\n{}", message, stderr),
                None => message.clone(),
            },
            other => other.to_string(),
        }
    }
}
