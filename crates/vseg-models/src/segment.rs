//! Time windows, produced segments and their scores.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Segment category assigned by the scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SegmentCategory {
    Highlight,
    Educational,
    Entertainment,
    Trivia,
    #[default]
    #[serde(other)]
    Content,
}

impl SegmentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentCategory::Highlight => "highlight",
            SegmentCategory::Educational => "educational",
            SegmentCategory::Entertainment => "entertainment",
            SegmentCategory::Trivia => "trivia",
            SegmentCategory::Content => "content",
        }
    }

    /// Lenient parse for model output; unknown labels become `Content`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "highlight" | "highlights" => SegmentCategory::Highlight,
            "educational" | "education" => SegmentCategory::Educational,
            "entertainment" | "entertaining" => SegmentCategory::Entertainment,
            "trivia" => SegmentCategory::Trivia,
            _ => SegmentCategory::Content,
        }
    }
}

/// A nominal time range selected for extraction. `index` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub index: u32,
    pub start_sec: f64,
    pub end_sec: f64,
}

impl Window {
    pub fn duration(&self) -> f64 {
        self.end_sec - self.start_sec
    }
}

/// Score attached to one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentScore {
    /// Nominally 0-10
    pub score: f64,
    pub category: SegmentCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SegmentScore {
    pub fn new(score: f64, category: SegmentCategory, reason: Option<String>) -> Self {
        Self {
            score: clamp_score(score),
            category,
            reason,
        }
    }
}

/// Clamp a score into 0..=10; non-finite values become 0.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, 10.0)
    } else {
        0.0
    }
}

/// A produced segment file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// 1-based window index
    pub index: u32,
    pub start_sec: f64,
    pub end_sec: f64,
    pub file_path: PathBuf,
    pub file_size_bytes: u64,
    pub score: f64,
    pub category: SegmentCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Segment {
    /// Unscored segment for an extracted window.
    pub fn from_window(window: &Window, file_path: PathBuf, file_size_bytes: u64) -> Self {
        Self {
            index: window.index,
            start_sec: window.start_sec,
            end_sec: window.end_sec,
            file_path,
            file_size_bytes,
            score: 0.0,
            category: SegmentCategory::Content,
            reason: None,
        }
    }

    pub fn apply_score(&mut self, score: SegmentScore) {
        self.score = score.score;
        self.category = score.category;
        self.reason = score.reason;
    }

    pub fn duration(&self) -> f64 {
        self.end_sec - self.start_sec
    }
}
