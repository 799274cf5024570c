//! Media transcode pipeline: audio extraction, video → GIF, video → MP4.
//!
//! Parameter sets are plain values ([`MediaParams`]) so they can be checked
//! without a backend; [`FfmpegTranscoder`] renders them to ffmpeg arguments.
//!
//! | Target | Parameters                                                    |
//! |--------|---------------------------------------------------------------|
//! | mp3    | libmp3lame, 192 kbps, stereo, 44.1 kHz, video dropped         |
//! | gif    | first 10 s only, 10 fps, 480 px wide (lanczos), audio dropped |
//! | mp4    | libx264 `fast` CRF 23, `+faststart`, AAC audio                |

use crate::catalog::Category;
use crate::config::ConversionConfig;
use crate::error::ConvertError;
use crate::pipeline::backend::{probe, run_command, BackendError, MediaTranscoder};
use crate::pipeline::scratch;
use async_trait::async_trait;
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// What the backend should produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "target", rename_all = "lowercase")]
pub enum MediaParams {
    Mp3 {
        bitrate_kbps: u32,
        sample_rate: u32,
        channels: u32,
        /// Source is a video; keep the audio stream only.
        drop_video: bool,
    },
    Gif {
        /// Longer inputs are trimmed, not rejected.
        max_secs: u32,
        fps: u32,
        width: u32,
    },
    Mp4 {
        video_codec: String,
        preset: String,
        crf: u8,
        audio_codec: String,
    },
}

impl MediaParams {
    /// File extension of the produced artifact.
    pub fn extension(&self) -> &'static str {
        match self {
            MediaParams::Mp3 { .. } => "mp3",
            MediaParams::Gif { .. } => "gif",
            MediaParams::Mp4 { .. } => "mp4",
        }
    }
}

/// Parameter set for `target`, or `None` if this pipeline cannot produce it.
pub fn params_for(
    target: &str,
    source: Category,
    config: &ConversionConfig,
) -> Option<MediaParams> {
    match target {
        "mp3" => Some(MediaParams::Mp3 {
            bitrate_kbps: config.mp3_bitrate_kbps,
            sample_rate: config.mp3_sample_rate,
            channels: config.mp3_channels,
            drop_video: source == Category::Video,
        }),
        "gif" => Some(MediaParams::Gif {
            max_secs: config.gif_max_secs,
            fps: config.gif_fps,
            width: config.gif_width,
        }),
        "mp4" => Some(MediaParams::Mp4 {
            video_codec: config.mp4_video_codec.clone(),
            preset: config.mp4_preset.clone(),
            crf: config.mp4_crf,
            audio_codec: config.mp4_audio_codec.clone(),
        }),
        _ => None,
    }
}

/// ffmpeg argument vector for one job (program name excluded).
pub fn ffmpeg_args(input: &Path, output: &Path, params: &MediaParams) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-nostdin", "-y", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(input.as_os_str().to_owned());

    let mut push = |items: &[&str]| args.extend(items.iter().map(OsString::from));
    match params {
        MediaParams::Mp3 {
            bitrate_kbps,
            sample_rate,
            channels,
            drop_video,
        } => {
            if *drop_video {
                push(&["-vn"]);
            }
            push(&[
                "-c:a",
                "libmp3lame",
                "-b:a",
                &format!("{bitrate_kbps}k"),
                "-ac",
                &channels.to_string(),
                "-ar",
                &sample_rate.to_string(),
            ]);
        }
        MediaParams::Gif {
            max_secs,
            fps,
            width,
        } => {
            push(&[
                "-t",
                &max_secs.to_string(),
                "-vf",
                &format!("fps={fps},scale={width}:-1:flags=lanczos"),
                "-an",
            ]);
        }
        MediaParams::Mp4 {
            video_codec,
            preset,
            crf,
            audio_codec,
        } => {
            push(&[
                "-c:v",
                video_codec,
                "-preset",
                preset,
                "-crf",
                &crf.to_string(),
                "-movflags",
                "+faststart",
                "-c:a",
                audio_codec,
            ]);
        }
    }
    args.push(output.as_os_str().to_owned());
    args
}

/// The default media backend: an `ffmpeg` subprocess.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Whether the configured ffmpeg runs.
    pub async fn probe(&self) -> bool {
        probe(&self.program, "-version").await
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl MediaTranscoder for FfmpegTranscoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        params: &MediaParams,
    ) -> Result<(), BackendError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(ffmpeg_args(input, output, params));
        run_command(cmd, "ffmpeg").await.map(|_| ())
    }
}

/// Run one media job under `limit`.
///
/// On timeout the backend future is dropped (killing its process), the
/// partial output is removed and [`ConvertError::Timeout`] is returned. A
/// backend error also removes the partial output.
pub async fn transcode(
    backend: &dyn MediaTranscoder,
    input: &Path,
    output: &Path,
    params: &MediaParams,
    limit: Duration,
) -> Result<(), ConvertError> {
    let start = Instant::now();
    debug!(
        "{} job {:?}: {} → {}",
        backend.name(),
        params,
        input.display(),
        output.display()
    );

    match tokio::time::timeout(limit, backend.transcode(input, output, params)).await {
        Ok(Ok(())) => {
            let produced = tokio::fs::metadata(output)
                .await
                .map(|m| m.len())
                .unwrap_or(0);
            if produced == 0 {
                scratch::remove(output).await;
                return Err(ConvertError::BackendFailure {
                    backend: backend.name().to_string(),
                    message: "backend reported success but produced no output".into(),
                });
            }
            info!(
                "{} produced {} bytes in {}ms",
                backend.name(),
                produced,
                start.elapsed().as_millis()
            );
            Ok(())
        }
        Ok(Err(e)) => {
            scratch::remove(output).await;
            Err(e.into_convert_error(backend.name()))
        }
        Err(_) => {
            warn!(
                "{} exceeded {}s on {}; killed",
                backend.name(),
                limit.as_secs(),
                input.display()
            );
            scratch::remove(output).await;
            Err(ConvertError::Timeout {
                stage: "media",
                secs: limit.as_secs(),
            })
        }
    }
}
