//! Content scoring with an AI path and a deterministic fallback.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use vseg_media::{extract_audio, MediaError};
use vseg_models::{SegmentCategory, SegmentScore, Window};

use crate::ai::{AiClient, AiError};
use crate::cancel::until_cancelled;
use crate::config::ScorerConfig;

/// File name of the extracted audio inside the job directory.
pub const AUDIO_FILE_NAME: &str = "audio.mp3";

/// Which path produced the scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringPath {
    Ai,
    Heuristic,
}

impl ScoringPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoringPath::Ai => "ai",
            ScoringPath::Heuristic => "heuristic",
        }
    }
}

/// Reasons the AI path was unavailable. Always recovered by the scorer.
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("audio extraction failed: {0}")]
    Audio(#[from] MediaError),

    #[error(transparent)]
    Ai(#[from] AiError),

    #[error("analysis returned no usable scores")]
    Empty,

    #[error("scoring cancelled")]
    Cancelled,
}

/// Scores produced by an analyzer, keyed by window index.
#[derive(Debug, Clone, Default)]
pub struct AnalyzerScores {
    pub scores: HashMap<u32, SegmentScore>,
    pub summary: Option<String>,
}

/// External content analysis.
#[async_trait]
pub trait ContentAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        media_path: &Path,
        scratch_dir: &Path,
        windows: &[Window],
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<AnalyzerScores, ScoringError>;
}

/// Audio extraction, transcription and analysis through [`AiClient`].
pub struct OpenAiAnalyzer {
    client: AiClient,
    audio_timeout_secs: u64,
}

impl OpenAiAnalyzer {
    pub fn new(client: AiClient, audio_timeout_secs: u64) -> Self {
        Self {
            client,
            audio_timeout_secs,
        }
    }

    /// Build from config; `None` when no credential is configured.
    pub fn from_config(config: &ScorerConfig, audio_timeout_secs: u64) -> Option<Self> {
        if !config.is_configured() {
            return None;
        }
        match AiClient::new(config) {
            Ok(client) => Some(Self::new(client, audio_timeout_secs)),
            Err(e) => {
                warn!("AI client unavailable, scoring will use the heuristic: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl ContentAnalyzer for OpenAiAnalyzer {
    async fn analyze(
        &self,
        media_path: &Path,
        scratch_dir: &Path,
        windows: &[Window],
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<AnalyzerScores, ScoringError> {
        let audio_path = scratch_dir.join(AUDIO_FILE_NAME);
        extract_audio(media_path, &audio_path, self.audio_timeout_secs, cancel.clone()).await?;

        let transcript = until_cancelled(cancel.clone(), self.client.transcribe(&audio_path))
            .await
            .ok_or(ScoringError::Cancelled)??;
        let analysis = until_cancelled(cancel, self.client.analyze(&transcript, windows))
            .await
            .ok_or(ScoringError::Cancelled)??;

        let scores: HashMap<u32, SegmentScore> = analysis
            .segments
            .into_iter()
            .filter(|s| windows.iter().any(|w| w.index == s.index))
            .map(|s| {
                let reason = s.reason.filter(|r| !r.trim().is_empty());
                (
                    s.index,
                    SegmentScore::new(s.score, SegmentCategory::from_label(&s.category), reason),
                )
            })
            .collect();

        if scores.is_empty() {
            return Err(ScoringError::Empty);
        }

        Ok(AnalyzerScores {
            scores,
            summary: analysis.summary.filter(|s| !s.trim().is_empty()),
        })
    }
}

/// Scores for every window, in window order.
#[derive(Debug, Clone)]
pub struct ScoringOutcome {
    pub scores: Vec<(u32, SegmentScore)>,
    pub summary: Option<String>,
    pub path: ScoringPath,
}

impl ScoringOutcome {
    pub fn ai_enabled(&self) -> bool {
        self.path == ScoringPath::Ai
    }

    pub fn score_for(&self, index: u32) -> Option<&SegmentScore> {
        self.scores.iter().find(|(i, _)| *i == index).map(|(_, s)| s)
    }
}

/// Position-based default: earlier windows never score lower than later
/// ones, the first window is the highlight.
pub fn heuristic_score(position: usize) -> SegmentScore {
    let score = 8usize.saturating_sub(position).max(1) as f64;
    let category = if position == 0 {
        SegmentCategory::Highlight
    } else {
        SegmentCategory::Content
    };
    SegmentScore::new(score, category, None)
}

pub fn fallback_summary(segment_count: usize, window_secs: f64) -> String {
    format!(
        "Processed video into {} segments of {}s each",
        segment_count, window_secs
    )
}

/// Assigns a score to every window.
#[derive(Clone)]
pub struct ContentScorer {
    analyzer: Option<Arc<dyn ContentAnalyzer>>,
}

impl ContentScorer {
    pub fn new(analyzer: Option<Arc<dyn ContentAnalyzer>>) -> Self {
        Self { analyzer }
    }

    pub fn heuristic_only() -> Self {
        Self { analyzer: None }
    }

    fn select_path(&self) -> ScoringPath {
        match self.analyzer {
            Some(_) => ScoringPath::Ai,
            None => ScoringPath::Heuristic,
        }
    }

    /// Score `windows`. Never fails: AI problems fall back to the heuristic.
    pub async fn score(
        &self,
        media_path: &Path,
        scratch_dir: &Path,
        windows: &[Window],
        cancel: Option<watch::Receiver<bool>>,
    ) -> ScoringOutcome {
        let outcome = match (self.select_path(), &self.analyzer) {
            (ScoringPath::Ai, Some(analyzer)) => {
                match analyzer.analyze(media_path, scratch_dir, windows, cancel).await {
                    Ok(result) => merge_with_heuristic(windows, result),
                    Err(ScoringError::Cancelled) => {
                        debug!("AI scoring cancelled");
                        heuristic(windows)
                    }
                    Err(e) => {
                        warn!("AI scoring unavailable, using heuristic: {}", e);
                        heuristic(windows)
                    }
                }
            }
            _ => heuristic(windows),
        };

        metrics::counter!("vseg_scoring_path_total", "path" => outcome.path.as_str()).increment(1);
        info!(
            path = outcome.path.as_str(),
            windows = windows.len(),
            "Scoring complete"
        );
        outcome
    }
}

fn heuristic(windows: &[Window]) -> ScoringOutcome {
    ScoringOutcome {
        scores: windows
            .iter()
            .enumerate()
            .map(|(position, w)| (w.index, heuristic_score(position)))
            .collect(),
        summary: None,
        path: ScoringPath::Heuristic,
    }
}

fn merge_with_heuristic(windows: &[Window], mut result: AnalyzerScores) -> ScoringOutcome {
    let scores = windows
        .iter()
        .enumerate()
        .map(|(position, w)| {
            let score = result
                .scores
                .remove(&w.index)
                .unwrap_or_else(|| heuristic_score(position));
            (w.index, score)
        })
        .collect();

    ScoringOutcome {
        scores,
        summary: result.summary,
        path: ScoringPath::Ai,
    }
}
