//! Shared data models for the vseg segmentation pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Source URL validation and canonical identifiers
//! - Media jobs and their lifecycle
//! - Windows, segments and scores
//! - Download strategies and attempt records
//! - Process request/response payloads
//! - Per-job progress events

pub mod api;
pub mod download;
pub mod event;
pub mod job;
pub mod segment;
pub mod source;

// Re-export common types
pub use api::{ProcessRequest, ProcessResponse, SegmentView};
pub use download::{AttemptOutcome, DownloadAttempt, DownloadStrategy, FailureClass};
pub use event::PipelineEvent;
pub use job::{JobId, JobStatus, JobTransitionError, MediaJob};
pub use segment::{clamp_score, Segment, SegmentCategory, SegmentScore, Window};
pub use source::{SourceId, SourceIdError, SourceIdResult};
