//! Job orchestration.
//!
//! A job runs its stages in order: fetch, disk guard, probe, then split and
//! score concurrently, then assemble. Independent jobs run concurrently up
//! to the configured limit. Progress goes out on a channel owned by the job.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, Instrument};
use vseg_media::{
    plan_windows, DiskGuard, DownloadSettings, FfmpegExtractor, FfprobeProber, MediaDownloader,
    MediaFetcher, MediaProber, SegmentExtractor, Segmenter, YtDlpDownloader,
};
use vseg_models::{
    DownloadAttempt, JobId, JobStatus, MediaJob, PipelineEvent, ProcessResponse, SourceId,
};

use crate::assembler::assemble;
use crate::cancel::{check_cancelled, until_cancelled};
use crate::cleanup::CleanupScheduler;
use crate::config::{PipelineConfig, ScorerConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::logging::JobLogger;
use crate::scorer::{ContentAnalyzer, ContentScorer, OpenAiAnalyzer};
use crate::workspace::JobWorkspace;

/// External collaborators of the pipeline.
#[derive(Clone)]
pub struct PipelineDeps {
    pub downloader: Arc<dyn MediaDownloader>,
    pub prober: Arc<dyn MediaProber>,
    pub extractor: Arc<dyn SegmentExtractor>,
    /// `None` disables AI scoring.
    pub analyzer: Option<Arc<dyn ContentAnalyzer>>,
}

impl PipelineDeps {
    /// yt-dlp, ffprobe, ffmpeg and, when a key is configured, the AI service.
    pub fn production(config: &PipelineConfig, scorer: &ScorerConfig) -> Self {
        let downloader = YtDlpDownloader::new(DownloadSettings {
            max_height: config.max_height,
            max_duration_secs: config.max_duration_secs,
            user_agent: config.user_agent.clone(),
            timeout_secs: config.download_timeout_secs,
        });
        let analyzer = OpenAiAnalyzer::from_config(scorer, config.download_timeout_secs)
            .map(|a| Arc::new(a) as Arc<dyn ContentAnalyzer>);

        Self {
            downloader: Arc::new(downloader),
            prober: Arc::new(FfprobeProber::new().with_timeout(config.segment_timeout_secs)),
            extractor: Arc::new(FfmpegExtractor::new().with_timeout(config.segment_timeout_secs)),
            analyzer,
        }
    }
}

struct Inner {
    config: PipelineConfig,
    fetcher: MediaFetcher,
    prober: Arc<dyn MediaProber>,
    segmenter: Segmenter,
    scorer: ContentScorer,
    cleanup: CleanupScheduler,
    job_permits: Arc<Semaphore>,
}

/// Entry point for segmentation jobs.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, deps: PipelineDeps, cleanup: CleanupScheduler) -> Self {
        let segmenter = Segmenter::new(
            deps.extractor,
            config.window_secs,
            config.max_ffmpeg_processes,
        );
        let job_permits = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));

        Self {
            inner: Arc::new(Inner {
                fetcher: MediaFetcher::new(deps.downloader),
                prober: deps.prober,
                segmenter,
                scorer: ContentScorer::new(deps.analyzer),
                cleanup,
                job_permits,
                config,
            }),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    pub fn cleanup(&self) -> &CleanupScheduler {
        &self.inner.cleanup
    }

    /// Validate `url` and start a job for it.
    ///
    /// Validation errors are returned before anything is spawned or written.
    pub fn start(&self, url: Option<&Value>) -> PipelineResult<JobHandle> {
        let source = SourceId::from_value(url)?;
        let source_url = url.and_then(Value::as_str).unwrap_or_default().trim();
        let job = MediaJob::new(source_url, source);
        let job_id = job.id.clone();

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            let events = JobEvents {
                job_id: job.id.clone(),
                tx: events_tx,
            };
            inner.run(job, events, cancel_rx).await
        });

        Ok(JobHandle {
            job_id,
            events: Some(events_rx),
            cancel_tx,
            task,
            finished: false,
        })
    }

    /// Start a job and wait for its result.
    pub async fn process(&self, url: Option<&Value>) -> PipelineResult<ProcessResponse> {
        self.start(url)?.wait().await
    }

    /// Flush pending cleanups.
    pub async fn shutdown(&self) {
        self.inner.cleanup.shutdown().await;
    }
}

/// A running job.
///
/// Dropping the handle before the job finishes cancels it.
pub struct JobHandle {
    job_id: JobId,
    events: Option<mpsc::UnboundedReceiver<PipelineEvent>>,
    cancel_tx: watch::Sender<bool>,
    task: JoinHandle<PipelineResult<ProcessResponse>>,
    finished: bool,
}

impl JobHandle {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Take the job's event stream. Returns `None` on the second call.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<PipelineEvent>> {
        self.events.take()
    }

    /// Stop scheduling new work; the job fails with `Cancelled` and its
    /// directory is removed.
    pub fn cancel(&self) {
        // Fails only once the job task has dropped its receiver
        let _ = self.cancel_tx.send(true);
    }

    pub async fn wait(mut self) -> PipelineResult<ProcessResponse> {
        let result = (&mut self.task).await;
        self.finished = true;
        result.map_err(|e| PipelineError::internal(format!("job task failed: {}", e)))?
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        if !self.finished {
            // Fails only once the job task has dropped its receiver
            let _ = self.cancel_tx.send(true);
        }
    }
}

struct JobEvents {
    job_id: JobId,
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl JobEvents {
    fn send(&self, event: PipelineEvent) {
        // Nobody listening is fine.
        let _ = self.tx.send(event);
    }

    fn status(&self, status: JobStatus) {
        self.send(PipelineEvent::status(&self.job_id, status));
    }

    fn attempt(&self, attempt: &DownloadAttempt) {
        self.send(PipelineEvent::DownloadAttempted {
            job_id: self.job_id.clone(),
            attempt: attempt.clone(),
        });
    }
}

impl Inner {
    async fn run(
        self: Arc<Self>,
        mut job: MediaJob,
        events: JobEvents,
        cancel: watch::Receiver<bool>,
    ) -> PipelineResult<ProcessResponse> {
        let logger = JobLogger::new(&job.id, &job.canonical_id);
        let span = logger.create_span();

        async move {
            let started = Instant::now();
            let _permit = self
                .job_permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| PipelineError::internal("job limiter closed"))?;

            logger.log_start(&job.source_url);
            events.status(JobStatus::Created);

            let workspace = match check_cancelled(&cancel) {
                Ok(()) => JobWorkspace::create(&self.config.work_dir, &job.id).await,
                Err(e) => Err(e),
            };
            let workspace = match workspace {
                Ok(ws) => ws,
                Err(e) => {
                    self.finish_failed(&mut job, None, &events, &logger, &e, started).await;
                    return Err(e);
                }
            };

            match self.execute(&mut job, &workspace, &events, &logger, &cancel).await {
                Ok(response) => {
                    self.cleanup.schedule(workspace.dir());
                    events.send(PipelineEvent::Completed {
                        job_id: job.id.clone(),
                        segments: response.total_segments,
                    });
                    metrics::counter!("vseg_jobs_total", "outcome" => "success").increment(1);
                    metrics::histogram!("vseg_job_duration_seconds")
                        .record(started.elapsed().as_secs_f64());
                    logger.log_completion(&format!(
                        "{} segments in {:.1}s (ai: {})",
                        response.total_segments,
                        started.elapsed().as_secs_f64(),
                        response.ai_analysis_enabled
                    ));
                    Ok(response)
                }
                Err(e) => {
                    self.finish_failed(&mut job, Some(&workspace), &events, &logger, &e, started)
                        .await;
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        job: &mut MediaJob,
        workspace: &JobWorkspace,
        events: &JobEvents,
        logger: &JobLogger,
        cancel: &watch::Receiver<bool>,
    ) -> PipelineResult<ProcessResponse> {
        check_cancelled(cancel)?;
        job.start_download(workspace.dir().to_path_buf())?;
        events.status(JobStatus::Downloading);

        let fetched = self
            .fetcher
            .fetch(&job.canonical_id, workspace.dir(), Some(cancel.clone()), |attempt| {
                events.attempt(attempt)
            })
            .await?;
        job.finish_download(fetched.path.clone(), fetched.size_bytes)?;
        events.status(JobStatus::Downloaded);
        logger.log_progress(&format!(
            "downloaded {} bytes with {} strategy",
            fetched.size_bytes, fetched.strategy
        ));

        check_cancelled(cancel)?;
        DiskGuard::new(
            &self.config.work_dir,
            self.config.required_space_mb,
            self.config.disk_probe_policy,
        )
        .ensure()
        .await?;

        let info = self.prober.probe(&fetched.path).await?;
        check_cancelled(cancel)?;

        job.start_splitting()?;
        events.status(JobStatus::Splitting);

        let window_secs = self.segmenter.window_secs();
        let windows = plan_windows(info.duration, window_secs);
        logger.log_progress(&format!(
            "splitting {:.1}s into {} windows",
            info.duration,
            windows.len()
        ));

        let split = async {
            self.segmenter
                .split(
                    &fetched.path,
                    info.duration,
                    workspace.segments_dir(),
                    Some(cancel.clone()),
                    |index, produced| {
                        events.send(PipelineEvent::WindowFinished {
                            job_id: events.job_id.clone(),
                            index,
                            produced,
                        })
                    },
                )
                .await
                .map_err(PipelineError::from)
        };
        let scoring = async {
            let scoring = self.scorer.score(
                &fetched.path,
                workspace.dir(),
                &windows,
                Some(cancel.clone()),
            );
            Ok::<_, PipelineError>(until_cancelled(Some(cancel.clone()), scoring).await)
        };
        // A failed split drops the scoring future. Scoring stops at once on
        // cancel while the split lets in-flight windows finish.
        let (mut split, scoring) = tokio::try_join!(split, scoring)?;
        let scoring = scoring.ok_or(PipelineError::Cancelled)?;

        if !split.failed.is_empty() {
            logger.log_warning(&format!(
                "{} of {} windows failed: {:?}",
                split.failed.len(),
                split.planned,
                split.failed
            ));
        }

        events.send(PipelineEvent::ScoringApplied {
            job_id: job.id.clone(),
            ai: scoring.ai_enabled(),
        });

        job.finish()?;
        events.status(JobStatus::Done);

        Ok(assemble(job, &mut split.segments, scoring, window_secs))
    }

    async fn finish_failed(
        &self,
        job: &mut MediaJob,
        workspace: Option<&JobWorkspace>,
        events: &JobEvents,
        logger: &JobLogger,
        error: &PipelineError,
        started: Instant,
    ) {
        if job.fail().is_ok() {
            events.status(JobStatus::Failed);
        }
        if let Some(workspace) = workspace {
            self.cleanup.cleanup_now(workspace.dir()).await;
        }
        if job.mark_cleaned_up().is_ok() {
            events.status(JobStatus::CleanedUp);
        }

        events.send(PipelineEvent::Failed {
            job_id: job.id.clone(),
            message: error.to_string(),
        });
        metrics::counter!("vseg_jobs_total", "outcome" => error.kind()).increment(1);
        metrics::histogram!("vseg_job_duration_seconds").record(started.elapsed().as_secs_f64());

        match error {
            PipelineError::Cancelled => logger.log_warning("cancelled"),
            e => logger.log_error(&e.to_string()),
        }
        info!(status = %job.status(), "Job resources released");
    }
}
