//! Per-job progress events.
//!
//! Each job owns its own channel; events never cross jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DownloadAttempt, JobId, JobStatus};

/// Progress notification emitted by a running job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    StatusChanged {
        job_id: JobId,
        status: JobStatus,
        timestamp: DateTime<Utc>,
    },
    DownloadAttempted {
        job_id: JobId,
        attempt: DownloadAttempt,
    },
    WindowFinished {
        job_id: JobId,
        index: u32,
        produced: bool,
    },
    ScoringApplied {
        job_id: JobId,
        ai: bool,
    },
    Completed {
        job_id: JobId,
        segments: usize,
    },
    Failed {
        job_id: JobId,
        message: String,
    },
}

impl PipelineEvent {
    pub fn status(job_id: &JobId, status: JobStatus) -> Self {
        PipelineEvent::StatusChanged {
            job_id: job_id.clone(),
            status,
            timestamp: Utc::now(),
        }
    }

    pub fn job_id(&self) -> &JobId {
        match self {
            PipelineEvent::StatusChanged { job_id, .. }
            | PipelineEvent::DownloadAttempted { job_id, .. }
            | PipelineEvent::WindowFinished { job_id, .. }
            | PipelineEvent::ScoringApplied { job_id, .. }
            | PipelineEvent::Completed { job_id, .. }
            | PipelineEvent::Failed { job_id, .. } => job_id,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(
            self,
            PipelineEvent::Completed { .. } | PipelineEvent::Failed { .. }
        )
    }
}
