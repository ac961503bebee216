//! Media job lifecycle.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::SourceId;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the string is a well-formed job ID (a UUID).
    ///
    /// Job IDs double as scratch directory names, so anything else is refused
    /// before it reaches the filesystem.
    pub fn is_well_formed(s: &str) -> bool {
        Uuid::parse_str(s).is_ok()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Request accepted, nothing on disk yet
    #[default]
    Created,
    /// Download tool is writing the source file
    Downloading,
    /// Source file is on disk and non-empty
    Downloaded,
    /// Windows are being extracted
    Splitting,
    /// Segments produced and scored
    Done,
    /// Fatal pipeline error
    Failed,
    /// Scratch files removed
    CleanedUp,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::Downloading => "downloading",
            JobStatus::Downloaded => "downloaded",
            JobStatus::Splitting => "splitting",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
            JobStatus::CleanedUp => "cleaned_up",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::CleanedUp)
    }

    /// Whether a job in this status may reference a local media file.
    pub fn holds_local_file(&self) -> bool {
        matches!(
            self,
            JobStatus::Downloading | JobStatus::Downloaded | JobStatus::Splitting | JobStatus::Done
        )
    }

    fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Created, Downloading) => true,
            (Downloading, Downloaded) => true,
            (Downloaded, Splitting) => true,
            (Splitting, Done) => true,
            (Done, CleanedUp) | (Failed, CleanedUp) => true,
            (CleanedUp, _) => false,
            (Failed, _) => false,
            (_, Failed) => true,
            // Nothing to clean before the download starts.
            (Created, CleanedUp) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected status change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid job transition: {from} -> {to}")]
pub struct JobTransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// One request's worth of pipeline state.
///
/// `local_path` is only set while the status holds a local file
/// (downloading through done); every transition keeps that invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaJob {
    pub id: JobId,
    pub source_url: String,
    pub canonical_id: SourceId,
    local_path: Option<PathBuf>,
    pub file_size_bytes: u64,
    status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaJob {
    pub fn new(source_url: impl Into<String>, canonical_id: SourceId) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            source_url: source_url.into(),
            canonical_id,
            local_path: None,
            file_size_bytes: 0,
            status: JobStatus::Created,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn local_path(&self) -> Option<&Path> {
        self.local_path.as_deref()
    }

    /// Download started writing to `path`.
    pub fn start_download(&mut self, path: PathBuf) -> Result<(), JobTransitionError> {
        self.transition(JobStatus::Downloading)?;
        self.local_path = Some(path);
        Ok(())
    }

    /// Download finished; `path` is where the fetcher actually left the file.
    pub fn finish_download(&mut self, path: PathBuf, size_bytes: u64) -> Result<(), JobTransitionError> {
        self.transition(JobStatus::Downloaded)?;
        self.local_path = Some(path);
        self.file_size_bytes = size_bytes;
        Ok(())
    }

    pub fn start_splitting(&mut self) -> Result<(), JobTransitionError> {
        self.transition(JobStatus::Splitting)
    }

    pub fn finish(&mut self) -> Result<(), JobTransitionError> {
        self.transition(JobStatus::Done)
    }

    /// Fatal error. The local file is scheduled for immediate removal, so the
    /// path is dropped here.
    pub fn fail(&mut self) -> Result<(), JobTransitionError> {
        self.transition(JobStatus::Failed)?;
        self.local_path = None;
        Ok(())
    }

    pub fn mark_cleaned_up(&mut self) -> Result<(), JobTransitionError> {
        self.transition(JobStatus::CleanedUp)?;
        self.local_path = None;
        Ok(())
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), JobTransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(JobTransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}
