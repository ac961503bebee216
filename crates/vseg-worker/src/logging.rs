//! Structured job logging utilities.
//!
//! Provides consistent, structured logging for pipeline jobs with
//! tracing spans and contextual information.

use tracing::{error, info, warn, Span};
use vseg_models::{JobId, SourceId};

/// Job logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    source_id: String,
}

impl JobLogger {
    /// Create a new job logger for a job and its source.
    pub fn new(job_id: &JobId, source_id: &SourceId) -> Self {
        Self {
            job_id: job_id.to_string(),
            source_id: source_id.to_string(),
        }
    }

    /// Log the start of a job.
    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            source_id = %self.source_id,
            "Job started: {}", message
        );
    }

    /// Log a stage transition or other progress.
    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            source_id = %self.source_id,
            "Job progress: {}", message
        );
    }

    /// Log a recoverable problem.
    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            source_id = %self.source_id,
            "Job warning: {}", message
        );
    }

    /// Log a fatal job error.
    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            source_id = %self.source_id,
            "Job error: {}", message
        );
    }

    /// Log the completion of a job.
    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            source_id = %self.source_id,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Create a tracing span for this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            source_id = %self.source_id
        )
    }
}
