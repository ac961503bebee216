//! Download strategies and attempt records.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of acquisition strategies, tried in `ALL` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStrategy {
    Primary,
    Fallback,
}

impl DownloadStrategy {
    pub const ALL: [DownloadStrategy; 2] = [DownloadStrategy::Primary, DownloadStrategy::Fallback];

    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStrategy::Primary => "primary",
            DownloadStrategy::Fallback => "fallback",
        }
    }
}

impl fmt::Display for DownloadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failure,
}

/// Why an acquisition failed, as far as the tool output tells us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Private, removed or otherwise missing
    Unavailable,
    /// Age-gated or region-blocked
    Restricted,
    /// Blocked on copyright grounds
    RightsRestricted,
    Network,
    Unknown,
}

impl FailureClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::Unavailable => "unavailable",
            FailureClass::Restricted => "restricted",
            FailureClass::RightsRestricted => "rights_restricted",
            FailureClass::Network => "network",
            FailureClass::Unknown => "unknown",
        }
    }

    /// Message safe to show the caller. Never includes tool output.
    pub fn user_message(&self) -> &'static str {
        match self {
            FailureClass::Unavailable => "Video is unavailable or private",
            FailureClass::Restricted => {
                "Video is age-restricted or not available in this region"
            }
            FailureClass::RightsRestricted => "Video is blocked on copyright grounds",
            FailureClass::Network => "Network error while downloading the video, please retry",
            FailureClass::Unknown => "Failed to download the video",
        }
    }

    /// Ranking used to pick the most informative class across attempts.
    pub fn specificity(&self) -> u8 {
        match self {
            FailureClass::Unknown => 0,
            FailureClass::Network => 1,
            FailureClass::Restricted | FailureClass::RightsRestricted => 2,
            FailureClass::Unavailable => 3,
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One strategy attempt. Diagnostics only, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadAttempt {
    pub strategy: DownloadStrategy,
    pub outcome: AttemptOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_class: Option<FailureClass>,
    pub duration_ms: u64,
}

impl DownloadAttempt {
    pub fn success(strategy: DownloadStrategy, duration_ms: u64) -> Self {
        Self {
            strategy,
            outcome: AttemptOutcome::Success,
            error_class: None,
            duration_ms,
        }
    }

    pub fn failure(strategy: DownloadStrategy, class: FailureClass, duration_ms: u64) -> Self {
        Self {
            strategy,
            outcome: AttemptOutcome::Failure,
            error_class: Some(class),
            duration_ms,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == AttemptOutcome::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_order() {
        assert_eq!(DownloadStrategy::ALL[0], DownloadStrategy::Primary);
        assert_eq!(DownloadStrategy::ALL[1], DownloadStrategy::Fallback);
    }

    #[test]
    fn test_attempt_serialization() {
        let attempt = DownloadAttempt::failure(DownloadStrategy::Primary, FailureClass::Network, 12);
        let json = serde_json::to_value(&attempt).unwrap();
        assert_eq!(json["strategy"], "primary");
        assert_eq!(json["outcome"], "failure");
        assert_eq!(json["error_class"], "network");

        let ok = serde_json::to_value(DownloadAttempt::success(DownloadStrategy::Fallback, 5)).unwrap();
        assert!(ok.get("error_class").is_none());
    }

    #[test]
    fn test_user_messages_are_distinct() {
        let classes = [
            FailureClass::Unavailable,
            FailureClass::Restricted,
            FailureClass::RightsRestricted,
            FailureClass::Network,
            FailureClass::Unknown,
        ];
        for (i, a) in classes.iter().enumerate() {
            for b in &classes[i + 1..] {
                assert_ne!(a.user_message(), b.user_message());
            }
        }
    }
}
