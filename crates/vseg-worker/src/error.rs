//! Pipeline error types.

use thiserror::Error;
use vseg_media::MediaError;
use vseg_models::{DownloadAttempt, FailureClass, JobTransitionError, SourceIdError};

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Source URL is required")]
    SourceRequired,

    #[error("Invalid source URL")]
    InvalidSource(#[source] SourceIdError),

    /// Both download strategies exhausted. The message is the class's
    /// user-facing text; tool output stays in the logs.
    #[error("{}", class.user_message())]
    AcquisitionFailed {
        class: FailureClass,
        attempts: Vec<DownloadAttempt>,
    },

    #[error("Insufficient storage space: {available_mb} MB available, {required_mb} MB required")]
    InsufficientStorage { required_mb: u64, available_mb: u64 },

    #[error("Invalid video format")]
    UnsupportedMedia(String),

    #[error("No segments could be created")]
    SegmentationFailed { planned: usize, failed: usize },

    #[error("Job cancelled")]
    Cancelled,

    #[error("Media error: {0}")]
    Media(MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The caller sent bad input (as opposed to the system failing).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineError::SourceRequired | PipelineError::InvalidSource(_)
        )
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::SourceRequired => "source_required",
            PipelineError::InvalidSource(_) => "invalid_source",
            PipelineError::AcquisitionFailed { .. } => "acquisition_failed",
            PipelineError::InsufficientStorage { .. } => "insufficient_storage",
            PipelineError::UnsupportedMedia(_) => "unsupported_media",
            PipelineError::SegmentationFailed { .. } => "segmentation_failed",
            PipelineError::Cancelled => "cancelled",
            PipelineError::Media(_) => "media",
            PipelineError::Io(_) => "io",
            PipelineError::Internal(_) => "internal",
        }
    }
}

impl From<SourceIdError> for PipelineError {
    fn from(e: SourceIdError) -> Self {
        if e.is_missing() {
            PipelineError::SourceRequired
        } else {
            PipelineError::InvalidSource(e)
        }
    }
}

impl From<JobTransitionError> for PipelineError {
    fn from(e: JobTransitionError) -> Self {
        PipelineError::Internal(e.to_string())
    }
}

impl From<MediaError> for PipelineError {
    fn from(e: MediaError) -> Self {
        match e {
            MediaError::AcquisitionFailed { class, attempts, .. } => {
                PipelineError::AcquisitionFailed { class, attempts }
            }
            MediaError::InsufficientStorage {
                required_mb,
                available_mb,
            } => PipelineError::InsufficientStorage {
                required_mb,
                available_mb,
            },
            MediaError::UnsupportedFormat(msg) => PipelineError::UnsupportedMedia(msg),
            MediaError::NoSegmentsProduced { planned, failed } => {
                PipelineError::SegmentationFailed { planned, failed }
            }
            MediaError::Cancelled => PipelineError::Cancelled,
            MediaError::Io(e) => PipelineError::Io(e),
            other => PipelineError::Media(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_errors() {
        assert!(matches!(
            PipelineError::from(SourceIdError::Missing),
            PipelineError::SourceRequired
        ));
        let err = PipelineError::from(SourceIdError::UnsupportedHost("vimeo.com".into()));
        assert_eq!(err.to_string(), "Invalid source URL");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_acquisition_message_hides_tool_output() {
        let err = PipelineError::from(MediaError::AcquisitionFailed {
            class: FailureClass::Unavailable,
            message: "yt-dlp failed: ERROR: /tmp/vseg/abc/source.mp4 Private video".to_string(),
            attempts: Vec::new(),
        });
        assert_eq!(err.to_string(), FailureClass::Unavailable.user_message());
        assert!(!err.to_string().contains("/tmp"));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_media_mapping() {
        assert!(matches!(
            PipelineError::from(MediaError::UnsupportedFormat("x".into())),
            PipelineError::UnsupportedMedia(_)
        ));
        assert!(matches!(
            PipelineError::from(MediaError::NoSegmentsProduced { planned: 3, failed: 3 }),
            PipelineError::SegmentationFailed { planned: 3, failed: 3 }
        ));
        assert!(matches!(
            PipelineError::from(MediaError::Cancelled),
            PipelineError::Cancelled
        ));
        assert_eq!(
            PipelineError::from(MediaError::FfmpegNotFound).kind(),
            "media"
        );
    }
}
