//! Typed command builders and the external tool runner.
//!
//! Builders validate every path and numeric argument before producing an
//! argument vector. Tools are spawned directly with `Command::args`, never
//! through a shell.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};

/// External binaries the pipeline drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Ffmpeg,
    Ffprobe,
    YtDlp,
}

impl Tool {
    pub const ALL: [Tool; 3] = [Tool::Ffmpeg, Tool::Ffprobe, Tool::YtDlp];

    pub fn binary(&self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::Ffprobe => "ffprobe",
            Tool::YtDlp => "yt-dlp",
        }
    }

    /// Resolve the binary on PATH.
    pub fn locate(&self) -> MediaResult<PathBuf> {
        which::which(self.binary()).map_err(|_| self.not_found())
    }

    fn not_found(&self) -> MediaError {
        match self {
            Tool::Ffmpeg => MediaError::FfmpegNotFound,
            Tool::Ffprobe => MediaError::FfprobeNotFound,
            Tool::YtDlp => MediaError::YtDlpNotFound,
        }
    }

    fn failure(&self, stderr: String, exit_code: Option<i32>) -> MediaError {
        let last_line = last_meaningful_line(&stderr).unwrap_or("Unknown error").to_string();
        match self {
            Tool::Ffmpeg => MediaError::ffmpeg_failed(last_line, Some(stderr), exit_code),
            Tool::Ffprobe => MediaError::FfprobeFailed {
                message: last_line,
                stderr: Some(stderr),
            },
            // yt-dlp errors are classified from text, so keep the whole stderr.
            Tool::YtDlp => MediaError::download_failed(format!("yt-dlp failed: {}\n{}", last_line, stderr)),
        }
    }
}

fn last_meaningful_line(text: &str) -> Option<&str> {
    text.lines().rev().map(str::trim).find(|l| !l.is_empty())
}

/// Validate a filesystem path argument.
pub fn validate_path(label: &str, path: &Path) -> MediaResult<String> {
    let s = path
        .to_str()
        .ok_or_else(|| MediaError::invalid_argument(format!("{} is not valid UTF-8", label)))?;
    if s.is_empty() {
        return Err(MediaError::invalid_argument(format!("{} is empty", label)));
    }
    if s.starts_with('-') {
        return Err(MediaError::invalid_argument(format!("{} must not start with '-'", label)));
    }
    if s.contains('\0') {
        return Err(MediaError::invalid_argument(format!("{} contains NUL", label)));
    }
    Ok(s.to_string())
}

/// Validate a time offset in seconds and format it for the command line.
pub fn validate_seconds(label: &str, value: f64) -> MediaResult<String> {
    if !value.is_finite() || value < 0.0 {
        return Err(MediaError::invalid_argument(format!(
            "{} must be a finite, non-negative number (got {})",
            label, value
        )));
    }
    Ok(format!("{:.3}", value))
}

/// Validate a free-form token (codec name, header, format selector).
fn validate_token(label: &str, value: &str) -> MediaResult<()> {
    if value.is_empty() {
        return Err(MediaError::invalid_argument(format!("{} is empty", label)));
    }
    if value.chars().any(|c| c == '\0' || c == '\n' || c == '\r') {
        return Err(MediaError::invalid_argument(format!(
            "{} contains control characters",
            label
        )));
    }
    Ok(())
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    /// Seek offset applied before `-i`
    seek: Option<f64>,
    /// Duration applied before `-i`
    duration: Option<f64>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    overwrite: bool,
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            seek: None,
            duration: None,
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add an output argument (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Set seek position.
    pub fn seek(mut self, seconds: f64) -> Self {
        self.seek = Some(seconds);
        self
    }

    /// Set duration.
    pub fn duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }

    /// Copy all streams without re-encoding.
    pub fn stream_copy(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    /// Normalize timestamps so the first packet starts at zero.
    pub fn avoid_negative_ts(self, mode: impl Into<String>) -> Self {
        self.output_arg("-avoid_negative_ts").output_arg(mode)
    }

    /// Drop the video stream.
    pub fn no_video(self) -> Self {
        self.output_arg("-vn")
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-acodec").output_arg(codec)
    }

    /// Set audio bitrate.
    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-ab").output_arg(bitrate)
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Build the command arguments, validating every value first.
    pub fn build_args(&self) -> MediaResult<Vec<String>> {
        let input = validate_path("input path", &self.input)?;
        let output = validate_path("output path", &self.output)?;
        validate_token("log level", &self.log_level)?;
        for arg in &self.output_args {
            validate_token("output argument", arg)?;
        }

        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        if let Some(seek) = self.seek {
            args.push("-ss".to_string());
            args.push(validate_seconds("seek", seek)?);
        }

        if let Some(duration) = self.duration {
            if duration <= 0.0 {
                return Err(MediaError::invalid_argument("duration must be positive"));
            }
            args.push("-t".to_string());
            args.push(validate_seconds("duration", duration)?);
        }

        args.push("-i".to_string());
        args.push(input);

        args.extend(self.output_args.iter().cloned());

        args.push(output);

        Ok(args)
    }
}

/// Builder for yt-dlp invocations.
#[derive(Debug, Clone)]
pub struct YtDlpCommand {
    url: String,
    output: PathBuf,
    format: Option<String>,
    user_agent: Option<String>,
    headers: Vec<(String, String)>,
    extractor_args: Option<String>,
    /// Only fetch `[0, secs]` of the media
    max_duration: Option<u64>,
    socket_timeout: Option<u64>,
    skip_certificate_check: bool,
}

impl YtDlpCommand {
    pub fn new(url: impl Into<String>, output: impl AsRef<Path>) -> Self {
        Self {
            url: url.into(),
            output: output.as_ref().to_path_buf(),
            format: None,
            user_agent: None,
            headers: Vec::new(),
            extractor_args: None,
            max_duration: None,
            socket_timeout: None,
            skip_certificate_check: false,
        }
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn extractor_args(mut self, args: impl Into<String>) -> Self {
        self.extractor_args = Some(args.into());
        self
    }

    pub fn max_duration(mut self, secs: u64) -> Self {
        self.max_duration = Some(secs);
        self
    }

    pub fn socket_timeout(mut self, secs: u64) -> Self {
        self.socket_timeout = Some(secs);
        self
    }

    pub fn skip_certificate_check(mut self) -> Self {
        self.skip_certificate_check = true;
        self
    }

    /// Build the command arguments, validating every value first.
    pub fn build_args(&self) -> MediaResult<Vec<String>> {
        let lower = self.url.to_ascii_lowercase();
        if !(lower.starts_with("https://") || lower.starts_with("http://")) {
            return Err(MediaError::invalid_argument("url must be http(s)"));
        }
        if self.url.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(MediaError::invalid_argument("url contains whitespace"));
        }
        let output = validate_path("output path", &self.output)?;

        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--no-progress".to_string(),
        ];

        if self.skip_certificate_check {
            args.push("--no-check-certificates".to_string());
        }

        if let Some(ua) = &self.user_agent {
            validate_token("user agent", ua)?;
            args.push("--user-agent".to_string());
            args.push(ua.clone());
        }

        for (name, value) in &self.headers {
            validate_token("header name", name)?;
            validate_token("header value", value)?;
            if name.contains(':') {
                return Err(MediaError::invalid_argument("header name contains ':'"));
            }
            args.push("--add-header".to_string());
            args.push(format!("{}:{}", name, value));
        }

        if let Some(format) = &self.format {
            validate_token("format", format)?;
            args.push("-f".to_string());
            args.push(format.clone());
        }

        if let Some(extractor_args) = &self.extractor_args {
            validate_token("extractor args", extractor_args)?;
            args.push("--extractor-args".to_string());
            args.push(extractor_args.clone());
        }

        if let Some(secs) = self.max_duration {
            if secs == 0 {
                return Err(MediaError::invalid_argument("max duration must be positive"));
            }
            args.push("--download-sections".to_string());
            args.push(format!("*0-{}", secs));
        }

        if let Some(secs) = self.socket_timeout {
            args.push("--socket-timeout".to_string());
            args.push(secs.to_string());
        }

        args.push("-o".to_string());
        args.push(output);

        // Everything after `--` is positional.
        args.push("--".to_string());
        args.push(self.url.clone());

        Ok(args)
    }
}

/// Captured output of a finished tool.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runner for external tools with timeout and cancellation.
#[derive(Debug, Clone, Default)]
pub struct ToolRunner {
    /// Cancellation signal receiver
    cancel_rx: Option<watch::Receiver<bool>>,
    /// Timeout in seconds
    timeout_secs: Option<u64>,
}

impl ToolRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill the tool when the signal flips to `true`.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Set timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Run a tool to completion.
    pub async fn run(&self, tool: Tool, args: &[String]) -> MediaResult<ToolOutput> {
        let program = tool.locate()?;
        debug!("Running {} {}", tool.binary(), args.join(" "));

        let mut child = Command::new(&program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("stderr not captured"))?;
        let stdout_task = tokio::spawn(read_to_string(stdout));
        let stderr_task = tokio::spawn(read_to_string(stderr));

        let result = self.wait_for_completion(tool, &mut child).await;

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        let status = result?;
        if status.success() {
            Ok(ToolOutput { stdout, stderr })
        } else {
            Err(tool.failure(stderr, status.code()))
        }
    }

    /// Wait for child process with cancellation and timeout.
    async fn wait_for_completion(
        &self,
        tool: Tool,
        child: &mut Child,
    ) -> MediaResult<std::process::ExitStatus> {
        let timeout_secs = self.timeout_secs;
        let deadline = async move {
            match timeout_secs {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending::<()>().await,
            }
        };

        let cancel_rx = self.cancel_rx.clone();
        let cancelled = async move {
            match cancel_rx {
                Some(mut rx) => loop {
                    if *rx.borrow_and_update() {
                        break;
                    }
                    if rx.changed().await.is_err() {
                        // Sender gone without cancelling.
                        std::future::pending::<()>().await;
                    }
                },
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            status = child.wait() => Ok(status?),
            _ = deadline => {
                let secs = timeout_secs.unwrap_or_default();
                warn!("{} timed out after {} seconds, killing process", tool.binary(), secs);
                let _ = child.kill().await;
                Err(MediaError::Timeout(secs))
            }
            _ = cancelled => {
                info!("{} cancelled, killing process", tool.binary());
                let _ = child.kill().await;
                Err(MediaError::Cancelled)
            }
        }
    }
}

async fn read_to_string<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut buf = Vec::new();
    let _ = reader.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}

/// Check that a tool is available.
pub fn check_tool(tool: Tool) -> MediaResult<PathBuf> {
    tool.locate()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_command_args() {
        let args = FfmpegCommand::new("/work/job/source.mp4", "/work/job/segments/segment-2.mp4")
            .seek(10.0)
            .duration(10.0)
            .stream_copy()
            .avoid_negative_ts("make_zero")
            .build_args()
            .unwrap();

        assert_eq!(
            args,
            vec![
                "-y",
                "-v",
                "error",
                "-ss",
                "10.000",
                "-t",
                "10.000",
                "-i",
                "/work/job/source.mp4",
                "-c",
                "copy",
                "-avoid_negative_ts",
                "make_zero",
                "/work/job/segments/segment-2.mp4",
            ]
        );
    }

    #[test]
    fn test_ffmpeg_rejects_bad_arguments() {
        assert!(matches!(
            FfmpegCommand::new("-i", "out.mp4").build_args(),
            Err(MediaError::InvalidArgument(_))
        ));
        assert!(matches!(
            FfmpegCommand::new("in.mp4", "").build_args(),
            Err(MediaError::InvalidArgument(_))
        ));
        assert!(matches!(
            FfmpegCommand::new("in.mp4", "out.mp4").seek(-1.0).build_args(),
            Err(MediaError::InvalidArgument(_))
        ));
        assert!(matches!(
            FfmpegCommand::new("in.mp4", "out.mp4").seek(f64::NAN).build_args(),
            Err(MediaError::InvalidArgument(_))
        ));
        assert!(matches!(
            FfmpegCommand::new("in.mp4", "out.mp4").duration(0.0).build_args(),
            Err(MediaError::InvalidArgument(_))
        ));
        assert!(matches!(
            FfmpegCommand::new("in.mp4", "out.mp4")
                .output_arg("copy\nrm")
                .build_args(),
            Err(MediaError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_audio_command_args() {
        let args = FfmpegCommand::new("source.mp4", "audio.mp3")
            .no_video()
            .audio_codec("libmp3lame")
            .audio_bitrate("128k")
            .build_args()
            .unwrap();
        let joined = args.join(" ");
        assert!(joined.contains("-i source.mp4 -vn -acodec libmp3lame -ab 128k audio.mp3"));
    }

    #[test]
    fn test_ytdlp_command_args() {
        let args = YtDlpCommand::new("https://www.youtube.com/watch?v=dQw4w9WgXcQ", "/work/job/source.%(ext)s")
            .format("best[height<=480]/best")
            .user_agent("Mozilla/5.0 (X11; Linux x86_64)")
            .header("referer", "youtube.com")
            .max_duration(300)
            .build_args()
            .unwrap();

        assert_eq!(args[0], "--no-playlist");
        assert!(args.windows(2).any(|w| w[0] == "-f" && w[1] == "best[height<=480]/best"));
        assert!(args.windows(2).any(|w| w[0] == "--add-header" && w[1] == "referer:youtube.com"));
        assert!(args.windows(2).any(|w| w[0] == "--user-agent" && w[1].starts_with("Mozilla")));
        assert!(args.windows(2).any(|w| w[0] == "--download-sections" && w[1] == "*0-300"));
        assert!(!args.contains(&"--no-check-certificates".to_string()));
        assert_eq!(args[args.len() - 2], "--");
        assert_eq!(args[args.len() - 1], "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
    }

    #[test]
    fn test_ytdlp_rejects_bad_arguments() {
        assert!(YtDlpCommand::new("--exec rm", "out.mp4").build_args().is_err());
        assert!(YtDlpCommand::new("file:///etc/passwd", "out.mp4").build_args().is_err());
        assert!(YtDlpCommand::new("https://youtu.be/x y", "out.mp4").build_args().is_err());
        assert!(YtDlpCommand::new("https://youtu.be/dQw4w9WgXcQ", "out.mp4")
            .header("x-evil", "a\r\nb")
            .build_args()
            .is_err());
        assert!(YtDlpCommand::new("https://youtu.be/dQw4w9WgXcQ", "-o")
            .build_args()
            .is_err());
    }

    #[test]
    fn test_last_meaningful_line() {
        assert_eq!(
            last_meaningful_line("WARNING: x\nERROR: Private video\n\n"),
            Some("ERROR: Private video")
        );
        assert_eq!(last_meaningful_line(""), None);
    }

    #[test]
    fn test_tool_failure_mapping() {
        let err = Tool::YtDlp.failure("ERROR: Video unavailable".to_string(), Some(1));
        assert!(matches!(err, MediaError::DownloadFailed { .. }));
        assert!(err.to_string().contains("Video unavailable"));

        let err = Tool::Ffmpeg.failure("Invalid data found".to_string(), Some(1));
        assert!(matches!(err, MediaError::FfmpegFailed { exit_code: Some(1), .. }));
    }
}
