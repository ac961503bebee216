//! Job-scoped scratch directories.

use std::path::{Path, PathBuf};

use vseg_models::JobId;

use crate::error::PipelineResult;

const SEGMENTS_DIR: &str = "segments";

/// `<work_root>/<job_id>/` with a `segments/` subdirectory.
#[derive(Debug, Clone)]
pub struct JobWorkspace {
    dir: PathBuf,
    segments_dir: PathBuf,
}

impl JobWorkspace {
    /// Create the directory for `job_id`. Fails if it already exists.
    pub async fn create(work_root: &Path, job_id: &JobId) -> PipelineResult<Self> {
        tokio::fs::create_dir_all(work_root).await?;

        let dir = work_root.join(job_id.as_str());
        tokio::fs::create_dir(&dir).await?;

        let segments_dir = dir.join(SEGMENTS_DIR);
        tokio::fs::create_dir(&segments_dir).await?;

        Ok(Self { dir, segments_dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn segments_dir(&self) -> &Path {
        &self.segments_dir
    }
}

/// Map a `<job_id>/<file_name>` handle back to a segment file.
///
/// Returns `None` for anything that is not a job id followed by a
/// `segment-N.ext` name, so handles can never escape the work root.
pub fn resolve_segment(work_root: &Path, job_id: &str, file_name: &str) -> Option<PathBuf> {
    if !JobId::is_well_formed(job_id) || !is_segment_file_name(file_name) {
        return None;
    }
    Some(work_root.join(job_id).join(SEGMENTS_DIR).join(file_name))
}

fn is_segment_file_name(name: &str) -> bool {
    let Some(rest) = name.strip_prefix("segment-") else {
        return false;
    };
    let Some((index, ext)) = rest.split_once('.') else {
        return false;
    };

    !index.is_empty()
        && index.len() <= 6
        && index.bytes().all(|b| b.is_ascii_digit())
        && !ext.is_empty()
        && ext.len() <= 5
        && ext.bytes().all(|b| b.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_is_exclusive() {
        let root = TempDir::new().unwrap();
        let job_id = JobId::new();

        let ws = JobWorkspace::create(root.path(), &job_id).await.unwrap();
        assert!(ws.segments_dir().is_dir());
        assert!(ws.dir().ends_with(job_id.as_str()));

        assert!(JobWorkspace::create(root.path(), &job_id).await.is_err());
    }

    #[test]
    fn test_resolve_segment() {
        let root = Path::new("/work");
        let job_id = JobId::new();

        let path = resolve_segment(root, job_id.as_str(), "segment-3.mp4").unwrap();
        assert_eq!(
            path,
            root.join(job_id.as_str()).join("segments").join("segment-3.mp4")
        );

        assert!(resolve_segment(root, "..", "segment-1.mp4").is_none());
        assert!(resolve_segment(root, "not-a-job", "segment-1.mp4").is_none());
        assert!(resolve_segment(root, job_id.as_str(), "../source.mp4").is_none());
        assert!(resolve_segment(root, job_id.as_str(), "source.mp4").is_none());
        assert!(resolve_segment(root, job_id.as_str(), "segment-1.mp4/..").is_none());
        assert!(resolve_segment(root, job_id.as_str(), "segment-.mp4").is_none());
    }
}
