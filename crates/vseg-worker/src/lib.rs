//! Segmentation pipeline worker.
//!
//! This crate provides:
//! - Job orchestration (fetch, disk guard, split, score, assemble)
//! - Content scoring through an AI service with a deterministic fallback
//! - Supervised cleanup of job scratch directories
//! - Per-job progress events and cancellation

pub mod ai;
pub mod assembler;
mod cancel;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod retry;
pub mod scorer;
pub mod workspace;

pub use ai::{AiClient, AiError};
pub use cleanup::CleanupScheduler;
pub use config::{PipelineConfig, ScorerConfig};
pub use error::{PipelineError, PipelineResult};
pub use logging::JobLogger;
pub use pipeline::{JobHandle, Pipeline, PipelineDeps};
pub use scorer::{
    AnalyzerScores, ContentAnalyzer, ContentScorer, ScoringError, ScoringOutcome, ScoringPath,
};
pub use workspace::{resolve_segment, JobWorkspace};
