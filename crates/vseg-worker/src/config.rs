//! Pipeline and scorer configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use vseg_media::{ProbeFailurePolicy, DEFAULT_USER_AGENT};

use crate::cleanup::MAX_CLEANUP_DELAY;

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root for job-scoped scratch directories
    pub work_dir: PathBuf,
    /// Window width in seconds
    pub window_secs: f64,
    /// Maximum video height requested from the download tool
    pub max_height: u32,
    /// Only this many seconds of the source are downloaded
    pub max_duration_secs: u64,
    /// Disk guard threshold
    pub required_space_mb: u64,
    /// Disk guard behaviour when the probe errors
    pub disk_probe_policy: ProbeFailurePolicy,
    /// Delay between a successful response and scratch removal
    pub cleanup_grace: Duration,
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Maximum concurrent FFmpeg processes per job
    pub max_ffmpeg_processes: usize,
    /// Per-strategy download timeout
    pub download_timeout_secs: u64,
    /// Per-window extraction timeout
    pub segment_timeout_secs: u64,
    /// Client identity header for the download tool
    pub user_agent: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("vseg"),
            window_secs: 10.0,
            max_height: 480,
            max_duration_secs: 300,
            required_space_mb: 500,
            disk_probe_policy: ProbeFailurePolicy::FailOpen,
            cleanup_grace: Duration::from_secs(300), // 5 minutes
            max_concurrent_jobs: 4,
            max_ffmpeg_processes: 3,
            download_timeout_secs: 120,
            segment_timeout_secs: 60,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let window_secs = env_or("VSEG_WINDOW_SECS", defaults.window_secs);
        let window_secs = if window_secs.is_finite() && window_secs > 0.0 {
            window_secs
        } else {
            defaults.window_secs
        };

        Self {
            work_dir: std::env::var("VSEG_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            window_secs,
            max_height: env_or("VSEG_MAX_HEIGHT", defaults.max_height),
            max_duration_secs: env_or("VSEG_MAX_DURATION_SECS", defaults.max_duration_secs).max(1),
            required_space_mb: env_or("VSEG_REQUIRED_SPACE_MB", defaults.required_space_mb),
            disk_probe_policy: env_or("VSEG_DISK_PROBE_POLICY", defaults.disk_probe_policy),
            cleanup_grace: Duration::from_secs(env_or("VSEG_CLEANUP_GRACE_SECS", 300))
                .min(MAX_CLEANUP_DELAY),
            max_concurrent_jobs: env_or("VSEG_MAX_CONCURRENT_JOBS", defaults.max_concurrent_jobs).max(1),
            max_ffmpeg_processes: env_or("VSEG_MAX_FFMPEG_PROCESSES", defaults.max_ffmpeg_processes)
                .max(1),
            download_timeout_secs: env_or("VSEG_DOWNLOAD_TIMEOUT_SECS", defaults.download_timeout_secs),
            segment_timeout_secs: env_or("VSEG_SEGMENT_TIMEOUT_SECS", defaults.segment_timeout_secs),
            user_agent: std::env::var("VSEG_USER_AGENT")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.user_agent),
        }
    }
}

/// AI scorer configuration. Without an API key the scorer never calls out.
#[derive(Debug, Clone)]
pub struct ScorerConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub transcribe_model: String,
    pub analysis_model: String,
    /// Per-request timeout
    pub timeout_secs: u64,
    /// Retries per request (not counting the first attempt)
    pub max_retries: u32,
    pub language: Option<String>,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            transcribe_model: "whisper-1".to_string(),
            analysis_model: "gpt-4o-mini".to_string(),
            timeout_secs: 60,
            max_retries: 2,
            language: None,
        }
    }
}

impl ScorerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| std::env::var(key).ok().filter(|s| !s.trim().is_empty());

        Self {
            api_key: non_empty("OPENAI_API_KEY"),
            base_url: non_empty("OPENAI_BASE_URL")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            transcribe_model: non_empty("VSEG_TRANSCRIBE_MODEL").unwrap_or(defaults.transcribe_model),
            analysis_model: non_empty("VSEG_ANALYSIS_MODEL").unwrap_or(defaults.analysis_model),
            timeout_secs: env_or("VSEG_AI_TIMEOUT_SECS", defaults.timeout_secs),
            max_retries: env_or("VSEG_AI_MAX_RETRIES", defaults.max_retries),
            language: non_empty("VSEG_TRANSCRIPT_LANGUAGE"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}
