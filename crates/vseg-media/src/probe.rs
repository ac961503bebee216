//! FFprobe media information.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::command::{validate_path, Tool, ToolRunner};
use crate::error::{MediaError, MediaResult};

/// Media file information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Duration in seconds
    pub duration: f64,
    pub has_video: bool,
    pub has_audio: bool,
    /// Container format as reported by ffprobe
    pub format_name: String,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    format_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    duration: Option<String>,
}

/// Reads duration and stream layout from a media file.
#[async_trait]
pub trait MediaProber: Send + Sync {
    async fn probe(&self, path: &Path) -> MediaResult<MediaInfo>;
}

/// `MediaProber` backed by the ffprobe binary.
#[derive(Debug, Clone, Default)]
pub struct FfprobeProber {
    timeout_secs: Option<u64>,
}

impl FfprobeProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

#[async_trait]
impl MediaProber for FfprobeProber {
    async fn probe(&self, path: &Path) -> MediaResult<MediaInfo> {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }

        let args = vec![
            "-v".to_string(),
            "quiet".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_format".to_string(),
            "-show_streams".to_string(),
            validate_path("probe path", path)?,
        ];

        let mut runner = ToolRunner::new();
        if let Some(secs) = self.timeout_secs {
            runner = runner.with_timeout(secs);
        }

        let output = match runner.run(Tool::Ffprobe, &args).await {
            Ok(output) => output,
            // ffprobe exits non-zero on files it cannot demux.
            Err(MediaError::FfprobeFailed { .. }) => {
                return Err(MediaError::UnsupportedFormat(
                    "Invalid video format".to_string(),
                ))
            }
            Err(e) => return Err(e),
        };

        parse_probe_output(&output.stdout)
    }
}

/// Turn ffprobe JSON into `MediaInfo`, rejecting anything without a usable
/// duration and at least one audio or video stream.
pub fn parse_probe_output(json: &str) -> MediaResult<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_str(json)?;

    let has_video = probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("video"));
    let has_audio = probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    if !has_video && !has_audio {
        return Err(MediaError::UnsupportedFormat(
            "Invalid video format: no audio or video stream".to_string(),
        ));
    }

    // Container duration first, then the longest stream duration.
    let duration = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(parse_duration)
        .or_else(|| {
            probe
                .streams
                .iter()
                .filter_map(|s| s.duration.as_deref().and_then(parse_duration))
                .reduce(f64::max)
        })
        .ok_or_else(|| {
            MediaError::UnsupportedFormat("Invalid video format: unknown duration".to_string())
        })?;

    Ok(MediaInfo {
        duration,
        has_video,
        has_audio,
        format_name: probe
            .format
            .and_then(|f| f.format_name)
            .unwrap_or_default(),
    })
}

fn parse_duration(s: &str) -> Option<f64> {
    s.trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d > 0.0)
}
