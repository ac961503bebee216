//! Media acquisition using yt-dlp.
//!
//! The fetcher walks the closed `DownloadStrategy` list in order: the first
//! strategy that leaves a non-empty file behind wins. Every attempt is
//! recorded and classified so callers can explain a failure without seeing
//! tool output.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use vseg_models::{DownloadAttempt, DownloadStrategy, FailureClass, SourceId};

use crate::command::{Tool, ToolRunner, YtDlpCommand};
use crate::error::{MediaError, MediaResult};

/// File stem of the downloaded source inside the job directory.
pub const SOURCE_FILE_STEM: &str = "source";

/// Default client identity sent to the platform.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Player client used by the fallback strategy.
const FALLBACK_PLAYER_CLIENT: &str = "youtube:player_client=android,web";

/// Suffixes yt-dlp leaves behind for unfinished downloads.
const PARTIAL_SUFFIXES: &[&str] = &[".part", ".ytdl", ".temp"];

/// Knobs shared by both strategies.
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    /// Maximum video height passed to the format selector
    pub max_height: u32,
    /// Only the first `max_duration_secs` of the media are fetched
    pub max_duration_secs: u64,
    pub user_agent: String,
    /// Per-strategy timeout
    pub timeout_secs: u64,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            max_height: 480,
            max_duration_secs: 300,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 120,
        }
    }
}

/// Where one download should land.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub output_dir: PathBuf,
    pub file_stem: String,
    pub cancel: Option<watch::Receiver<bool>>,
}

impl DownloadRequest {
    /// yt-dlp output template, extension chosen by the tool.
    pub fn output_template(&self) -> PathBuf {
        self.output_dir.join(format!("{}.%(ext)s", self.file_stem))
    }
}

/// One acquisition strategy implementation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    /// Run `strategy` once. Success only means the tool exited cleanly; the
    /// fetcher checks the output itself.
    async fn download(&self, strategy: DownloadStrategy, request: &DownloadRequest) -> MediaResult<()>;
}

/// `MediaDownloader` backed by the yt-dlp binary.
#[derive(Debug, Clone, Default)]
pub struct YtDlpDownloader {
    settings: DownloadSettings,
}

impl YtDlpDownloader {
    pub fn new(settings: DownloadSettings) -> Self {
        Self { settings }
    }

    /// Command line for a strategy. Both strategies share the same format
    /// constraint and duration window.
    pub fn command(&self, strategy: DownloadStrategy, request: &DownloadRequest) -> YtDlpCommand {
        let height = self.settings.max_height;
        let format = format!(
            "best[height<={h}][ext=mp4]/best[height<={h}]/best",
            h = height
        );

        let cmd = YtDlpCommand::new(request.url.clone(), request.output_template())
            .format(format)
            .user_agent(self.settings.user_agent.clone())
            .header("referer", "youtube.com")
            .max_duration(self.settings.max_duration_secs)
            .socket_timeout(30);

        match strategy {
            DownloadStrategy::Primary => cmd,
            DownloadStrategy::Fallback => cmd
                .extractor_args(FALLBACK_PLAYER_CLIENT)
                .skip_certificate_check(),
        }
    }
}

#[async_trait]
impl MediaDownloader for YtDlpDownloader {
    async fn download(&self, strategy: DownloadStrategy, request: &DownloadRequest) -> MediaResult<()> {
        let args = self.command(strategy, request).build_args()?;

        let mut runner = ToolRunner::new().with_timeout(self.settings.timeout_secs);
        if let Some(cancel) = &request.cancel {
            runner = runner.with_cancel(cancel.clone());
        }

        info!(
            strategy = strategy.as_str(),
            url = %request.url,
            "Downloading source media"
        );
        runner.run(Tool::YtDlp, &args).await.map(|_| ())
    }
}

/// Result of a successful acquisition.
#[derive(Debug, Clone)]
pub struct FetchedMedia {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub strategy: DownloadStrategy,
    pub attempts: Vec<DownloadAttempt>,
}

/// Runs the strategy chain against a job directory.
#[derive(Clone)]
pub struct MediaFetcher {
    downloader: Arc<dyn MediaDownloader>,
}

impl MediaFetcher {
    pub fn new(downloader: Arc<dyn MediaDownloader>) -> Self {
        Self { downloader }
    }

    /// Download `source` into `dir`, trying each strategy in order.
    ///
    /// `on_attempt` is called after every attempt, successful or not.
    pub async fn fetch<F>(
        &self,
        source: &SourceId,
        dir: &Path,
        cancel: Option<watch::Receiver<bool>>,
        mut on_attempt: F,
    ) -> MediaResult<FetchedMedia>
    where
        F: FnMut(&DownloadAttempt) + Send,
    {
        let request = DownloadRequest {
            url: source.watch_url(),
            output_dir: dir.to_path_buf(),
            file_stem: SOURCE_FILE_STEM.to_string(),
            cancel: cancel.clone(),
        };

        let mut attempts = Vec::with_capacity(DownloadStrategy::ALL.len());
        let mut worst_class = FailureClass::Unknown;
        let mut last_message = String::new();

        for strategy in DownloadStrategy::ALL {
            if cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false) {
                return Err(MediaError::Cancelled);
            }

            remove_source_files(dir, &request.file_stem).await;
            let started = Instant::now();

            let result = match self.downloader.download(strategy, &request).await {
                Ok(()) => locate_output(dir, &request.file_stem).await,
                Err(e) => Err(e),
            };
            let duration_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok((path, size_bytes)) => {
                    let attempt = DownloadAttempt::success(strategy, duration_ms);
                    record_attempt(&attempt);
                    on_attempt(&attempt);
                    attempts.push(attempt);

                    info!(
                        strategy = strategy.as_str(),
                        output = %path.display(),
                        size_mb = size_bytes as f64 / (1024.0 * 1024.0),
                        duration_ms,
                        "Downloaded source media"
                    );
                    return Ok(FetchedMedia {
                        path,
                        size_bytes,
                        strategy,
                        attempts,
                    });
                }
                Err(MediaError::Cancelled) => {
                    remove_source_files(dir, &request.file_stem).await;
                    return Err(MediaError::Cancelled);
                }
                Err(e) => {
                    let class = match &e {
                        MediaError::EmptyOutput(_) => FailureClass::Unknown,
                        other => classify_failure(&other.diagnostic_text()),
                    };
                    warn!(
                        strategy = strategy.as_str(),
                        error_class = class.as_str(),
                        duration_ms,
                        "Download strategy failed: {}",
                        e
                    );

                    let attempt = DownloadAttempt::failure(strategy, class, duration_ms);
                    record_attempt(&attempt);
                    on_attempt(&attempt);
                    attempts.push(attempt);

                    if class.specificity() >= worst_class.specificity() {
                        worst_class = class;
                    }
                    last_message = e.to_string();
                }
            }
        }

        remove_source_files(dir, &request.file_stem).await;
        Err(MediaError::AcquisitionFailed {
            class: worst_class,
            message: last_message,
            attempts,
        })
    }
}

fn record_attempt(attempt: &DownloadAttempt) {
    let outcome = if attempt.succeeded() { "success" } else { "failure" };
    metrics::counter!(
        "vseg_download_attempts_total",
        "strategy" => attempt.strategy.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}

fn is_partial(name: &str) -> bool {
    PARTIAL_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Find the finished output file and check it is non-empty.
async fn locate_output(dir: &Path, stem: &str) -> MediaResult<(PathBuf, u64)> {
    let prefix = format!("{}.", stem);
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with(&prefix) || is_partial(&name) {
            continue;
        }

        let path = entry.path();
        let size = entry.metadata().await?.len();
        if size == 0 {
            return Err(MediaError::EmptyOutput(path));
        }
        return Ok((path, size));
    }

    Err(MediaError::download_failed("Output file not created"))
}

/// Remove finished or partial source files left by an earlier attempt.
async fn remove_source_files(dir: &Path, stem: &str) {
    let prefix = format!("{}.", stem);
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return;
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_name().to_string_lossy().starts_with(&prefix) {
            if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                debug!("Failed to remove leftover {}: {}", entry.path().display(), e);
            }
        }
    }
}

/// Classify download tool output into a user-facing failure class.
pub fn classify_failure(text: &str) -> FailureClass {
    let text = text.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| text.contains(n));

    if has(&["copyright", "rights holder", "content id"]) {
        return FailureClass::RightsRestricted;
    }

    if has(&[
        "confirm your age",
        "age-restricted",
        "age restricted",
        "inappropriate for some users",
        "not available in your country",
        "blocked it in your country",
        "geo restricted",
        "geo-restricted",
        "members-only",
        "join this channel",
    ]) {
        return FailureClass::Restricted;
    }

    if has(&[
        "private video",
        "video unavailable",
        "this video is unavailable",
        "has been removed",
        "no longer available",
        "does not exist",
        "account associated with this video has been terminated",
        "is not a valid url",
        "incomplete youtube id",
    ]) {
        return FailureClass::Unavailable;
    }

    if has(&[
        "timed out",
        "timeout",
        "connection",
        "network",
        "unable to download webpage",
        "name resolution",
        "http error 5",
        "429",
        "too many requests",
        "not a bot",
        "rate limit",
    ]) {
        return FailureClass::Network;
    }

    FailureClass::Unknown
}
