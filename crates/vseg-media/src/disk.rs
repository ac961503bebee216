//! Scratch-space guard.
//!
//! A read-only free-space query, no reservation: races with concurrent
//! writers are tolerated. When the probe itself errors the configured
//! policy decides; the default is fail-open on probe error.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use sysinfo::Disks;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

const MB: u64 = 1024 * 1024;

/// What to do when free space cannot be measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeFailurePolicy {
    /// Assume there is enough space
    #[default]
    FailOpen,
    /// Treat as insufficient
    FailClosed,
}

impl ProbeFailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeFailurePolicy::FailOpen => "fail_open",
            ProbeFailurePolicy::FailClosed => "fail_closed",
        }
    }
}

impl FromStr for ProbeFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fail_open" | "open" => Ok(ProbeFailurePolicy::FailOpen),
            "fail_closed" | "closed" => Ok(ProbeFailurePolicy::FailClosed),
            other => Err(format!("unknown disk probe policy: {}", other)),
        }
    }
}

/// Result of one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskVerdict {
    Sufficient { available_mb: u64 },
    Insufficient { available_mb: u64 },
    /// Probe failed and the policy allowed the work anyway
    AssumedSufficient,
    /// Probe failed and the policy refused the work
    AssumedInsufficient,
}

impl DiskVerdict {
    pub fn is_sufficient(&self) -> bool {
        matches!(
            self,
            DiskVerdict::Sufficient { .. } | DiskVerdict::AssumedSufficient
        )
    }
}

/// Decide a verdict from a probe result.
pub fn evaluate(
    probe: Result<u64, String>,
    required_mb: u64,
    policy: ProbeFailurePolicy,
) -> DiskVerdict {
    match probe {
        Ok(available_mb) if available_mb >= required_mb => DiskVerdict::Sufficient { available_mb },
        Ok(available_mb) => DiskVerdict::Insufficient { available_mb },
        Err(e) => {
            warn!(
                policy = policy.as_str(),
                required_mb,
                "Disk space probe failed: {}",
                e
            );
            match policy {
                ProbeFailurePolicy::FailOpen => DiskVerdict::AssumedSufficient,
                ProbeFailurePolicy::FailClosed => DiskVerdict::AssumedInsufficient,
            }
        }
    }
}

/// Free space on the filesystem holding `path`, in MB.
///
/// The filesystem is the mount with the longest mount point that prefixes
/// the canonical path.
pub fn available_mb(path: &Path) -> Result<u64, String> {
    let path = path
        .canonicalize()
        .map_err(|e| format!("{}: {}", path.display(), e))?;
    let disks = Disks::new_with_refreshed_list();

    disks
        .list()
        .iter()
        .filter(|disk| path.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space() / MB)
        .ok_or_else(|| format!("no mounted filesystem found for {}", path.display()))
}

/// Checks a scratch directory against a space threshold.
#[derive(Debug, Clone)]
pub struct DiskGuard {
    path: PathBuf,
    required_mb: u64,
    policy: ProbeFailurePolicy,
}

impl DiskGuard {
    pub fn new(path: impl Into<PathBuf>, required_mb: u64, policy: ProbeFailurePolicy) -> Self {
        Self {
            path: path.into(),
            required_mb,
            policy,
        }
    }

    pub fn required_mb(&self) -> u64 {
        self.required_mb
    }

    /// Probe the filesystem and return a verdict.
    pub async fn check(&self) -> DiskVerdict {
        let path = self.path.clone();
        let probe = tokio::task::spawn_blocking(move || available_mb(&path))
            .await
            .unwrap_or_else(|e| Err(format!("probe task failed: {}", e)));

        let verdict = evaluate(probe, self.required_mb, self.policy);
        debug!(path = %self.path.display(), ?verdict, "Disk check");
        verdict
    }

    /// Fail with `InsufficientStorage` unless the verdict allows the work.
    pub async fn ensure(&self) -> MediaResult<()> {
        match self.check().await {
            DiskVerdict::Sufficient { .. } | DiskVerdict::AssumedSufficient => Ok(()),
            DiskVerdict::Insufficient { available_mb } => Err(MediaError::InsufficientStorage {
                required_mb: self.required_mb,
                available_mb,
            }),
            DiskVerdict::AssumedInsufficient => Err(MediaError::InsufficientStorage {
                required_mb: self.required_mb,
                available_mb: 0,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_evaluate_threshold() {
        assert_eq!(
            evaluate(Ok(600), 500, ProbeFailurePolicy::FailOpen),
            DiskVerdict::Sufficient { available_mb: 600 }
        );
        assert_eq!(
            evaluate(Ok(500), 500, ProbeFailurePolicy::FailOpen),
            DiskVerdict::Sufficient { available_mb: 500 }
        );
        assert_eq!(
            evaluate(Ok(100), 500, ProbeFailurePolicy::FailOpen),
            DiskVerdict::Insufficient { available_mb: 100 }
        );
    }

    #[test]
    fn test_evaluate_probe_failure_policy() {
        let open = evaluate(Err("EIO".into()), 500, ProbeFailurePolicy::FailOpen);
        assert_eq!(open, DiskVerdict::AssumedSufficient);
        assert!(open.is_sufficient());

        let closed = evaluate(Err("EIO".into()), 500, ProbeFailurePolicy::FailClosed);
        assert_eq!(closed, DiskVerdict::AssumedInsufficient);
        assert!(!closed.is_sufficient());
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("fail_open".parse::<ProbeFailurePolicy>(), Ok(ProbeFailurePolicy::FailOpen));
        assert_eq!("FAIL-CLOSED".parse::<ProbeFailurePolicy>(), Ok(ProbeFailurePolicy::FailClosed));
        assert!("sometimes".parse::<ProbeFailurePolicy>().is_err());
    }

    #[tokio::test]
    async fn test_guard_on_real_directory() {
        let dir = TempDir::new().unwrap();

        let guard = DiskGuard::new(dir.path(), 0, ProbeFailurePolicy::FailOpen);
        assert!(guard.ensure().await.is_ok());

        let guard = DiskGuard::new(dir.path(), u64::MAX / MB, ProbeFailurePolicy::FailClosed);
        assert!(matches!(
            guard.ensure().await,
            Err(MediaError::InsufficientStorage { .. })
        ));
    }

    #[tokio::test]
    async fn test_guard_missing_path_follows_policy() {
        let missing = PathBuf::from("/definitely/not/here/vseg");
        let open = DiskGuard::new(&missing, 500, ProbeFailurePolicy::FailOpen);
        assert!(open.ensure().await.is_ok());

        let closed = DiskGuard::new(&missing, 500, ProbeFailurePolicy::FailClosed);
        assert!(closed.ensure().await.is_err());
    }
}
