//! Supervised removal of job scratch directories.
//!
//! A single task owns a [`DelayQueue`] of directories. Successful jobs are
//! scheduled after a grace period; failed jobs are removed immediately.
//! On start the task sweeps job directories left behind by a previous
//! process. Removal failures are logged and never reach the caller.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio_util::time::delay_queue::{DelayQueue, Key};
use tracing::{debug, info, warn};
use vseg_models::JobId;

/// Longest removal delay accepted. `DelayQueue` panics past roughly two years.
pub const MAX_CLEANUP_DELAY: Duration = Duration::from_secs(30 * 24 * 60 * 60);

enum Command {
    Schedule { dir: PathBuf, delay: Duration },
    Now { dir: PathBuf, done: oneshot::Sender<()> },
    Shutdown { done: oneshot::Sender<()> },
}

/// Handle to the cleanup task.
#[derive(Clone)]
pub struct CleanupScheduler {
    tx: mpsc::UnboundedSender<Command>,
    root: PathBuf,
    grace: Duration,
}

impl CleanupScheduler {
    /// Spawn the cleanup task for directories under `root`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(root: impl Into<PathBuf>, grace: Duration) -> Self {
        let root = root.into();
        let grace = grace.min(MAX_CLEANUP_DELAY);
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(run(root.clone(), grace, rx));

        Self { tx, root, grace }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Remove `dir` after the grace period.
    pub fn schedule(&self, dir: &Path) {
        self.schedule_after(dir, self.grace);
    }

    /// Remove `dir` after `delay`. Rescheduling replaces the earlier deadline.
    pub fn schedule_after(&self, dir: &Path, delay: Duration) {
        let command = Command::Schedule {
            dir: dir.to_path_buf(),
            delay: delay.min(MAX_CLEANUP_DELAY),
        };
        if self.tx.send(command).is_err() {
            warn!(dir = %dir.display(), "Cleanup task stopped; directory not scheduled");
        }
    }

    /// Remove `dir` now, cancelling any pending schedule for it.
    pub async fn cleanup_now(&self, dir: &Path) {
        let (done, wait) = oneshot::channel();
        let command = Command::Now {
            dir: dir.to_path_buf(),
            done,
        };
        if self.tx.send(command).is_err() || wait.await.is_err() {
            remove_job_dir(&self.root, dir).await;
        }
    }

    /// Remove everything still pending and stop the task.
    pub async fn shutdown(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(Command::Shutdown { done }).is_ok() {
            let _ = wait.await;
        }
    }
}

async fn run(root: PathBuf, grace: Duration, mut rx: mpsc::UnboundedReceiver<Command>) {
    if let Err(e) = tokio::fs::create_dir_all(&root).await {
        warn!(root = %root.display(), "Failed to create work directory: {}", e);
    }
    let swept = sweep_orphans(&root, grace).await;
    if swept > 0 {
        info!(count = swept, "Removed orphaned job directories");
    }

    let mut queue: DelayQueue<PathBuf> = DelayQueue::new();
    let mut keys: HashMap<PathBuf, Key> = HashMap::new();

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Schedule { dir, delay }) => {
                    if let Some(key) = keys.remove(&dir) {
                        queue.remove(&key);
                    }
                    debug!(dir = %dir.display(), delay_secs = delay.as_secs_f64(), "Cleanup scheduled");
                    let key = queue.insert(dir.clone(), delay);
                    keys.insert(dir, key);
                }
                Some(Command::Now { dir, done }) => {
                    if let Some(key) = keys.remove(&dir) {
                        queue.remove(&key);
                    }
                    remove_job_dir(&root, &dir).await;
                    let _ = done.send(());
                }
                Some(Command::Shutdown { done }) => {
                    let pending: Vec<PathBuf> = keys.drain().map(|(dir, _)| dir).collect();
                    queue.clear();
                    for dir in pending {
                        remove_job_dir(&root, &dir).await;
                    }
                    let _ = done.send(());
                    break;
                }
                None => break,
            },
            Some(expired) = queue.next(), if !queue.is_empty() => {
                let dir = expired.into_inner();
                keys.remove(&dir);
                remove_job_dir(&root, &dir).await;
            }
        }
    }

    debug!("Cleanup task stopped");
}

/// Remove a job directory. Only paths strictly below `root` are touched.
async fn remove_job_dir(root: &Path, dir: &Path) {
    if dir == root || !dir.starts_with(root) {
        warn!(dir = %dir.display(), "Refusing to remove directory outside the work root");
        metrics::counter!("vseg_cleanup_total", "outcome" => "refused").increment(1);
        return;
    }

    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {
            debug!(dir = %dir.display(), "Removed job directory");
            metrics::counter!("vseg_cleanup_total", "outcome" => "removed").increment(1);
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            warn!(dir = %dir.display(), "Failed to remove job directory: {}", e);
            metrics::counter!("vseg_cleanup_total", "outcome" => "error").increment(1);
        }
    }
}

/// Remove job directories under `root` last modified more than `max_age` ago.
///
/// Only entries named like a job id are considered. Returns the number removed.
pub async fn sweep_orphans(root: &Path, max_age: Duration) -> usize {
    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!(root = %root.display(), "Orphan sweep skipped: {}", e);
            return 0;
        }
    };

    let now = SystemTime::now();
    let mut removed = 0;

    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !JobId::is_well_formed(name) {
            continue;
        }
        let Ok(metadata) = entry.metadata().await else { continue };
        if !metadata.is_dir() {
            continue;
        }

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age < max_age {
            continue;
        }

        let path = entry.path();
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => removed += 1,
            Err(e) => warn!(dir = %path.display(), "Failed to remove orphaned directory: {}", e),
        }
    }

    if removed > 0 {
        metrics::counter!("vseg_cleanup_total", "outcome" => "orphan").increment(removed as u64);
    }
    removed
}
