//! Audio track extraction for transcription.

use std::path::Path;

use tokio::sync::watch;
use tracing::info;

use crate::command::{FfmpegCommand, Tool, ToolRunner};
use crate::error::{MediaError, MediaResult};

/// Bitrate of the extracted audio track.
pub const AUDIO_BITRATE: &str = "128k";

pub fn audio_command(input: &Path, output: &Path) -> FfmpegCommand {
    FfmpegCommand::new(input, output)
        .no_video()
        .audio_codec("libmp3lame")
        .audio_bitrate(AUDIO_BITRATE)
}

/// Extract the audio track of `input` into an mp3 at `output`.
///
/// Returns the size of the written file.
pub async fn extract_audio(
    input: &Path,
    output: &Path,
    timeout_secs: u64,
    cancel: Option<watch::Receiver<bool>>,
) -> MediaResult<u64> {
    let args = audio_command(input, output).build_args()?;

    let mut runner = ToolRunner::new().with_timeout(timeout_secs);
    if let Some(cancel) = cancel {
        runner = runner.with_cancel(cancel);
    }
    runner.run(Tool::Ffmpeg, &args).await?;

    let size = tokio::fs::metadata(output).await?.len();
    if size == 0 {
        return Err(MediaError::EmptyOutput(output.to_path_buf()));
    }

    info!(
        output = %output.display(),
        size_kb = size / 1024,
        "Extracted audio track"
    );
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_command() {
        let args = audio_command(Path::new("/w/source.mp4"), Path::new("/w/audio.mp3"))
            .build_args()
            .unwrap();
        assert_eq!(
            args[args.len() - 6..].to_vec(),
            vec!["-vn", "-acodec", "libmp3lame", "-ab", "128k", "/w/audio.mp3"]
        );
    }
}
