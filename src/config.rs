//! Configuration types for file conversion.
//!
//! All limits and encoder parameters live in [`ConversionConfig`], built via
//! its [`ConversionConfigBuilder`]. The defaults are the documented contract
//! of the engine (20 MiB input ceiling, 30 s image timeout, 120 s backend
//! timeout, …) and are also exported as constants so callers can show them
//! to users without constructing a config.

use crate::error::ConvertError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

// ── Documented limits ────────────────────────────────────────────────────

/// Maximum accepted input size: 20 MiB.
pub const MAX_INPUT_BYTES: u64 = 20 * 1024 * 1024;
/// Outer wall-clock limit on image conversions.
pub const IMAGE_TIMEOUT_SECS: u64 = 30;
/// Wall-clock limit on media and document backends (one shared limit).
pub const BACKEND_TIMEOUT_SECS: u64 = 120;
/// Long-edge cap for image outputs.
pub const MAX_IMAGE_EDGE: u32 = 1080;
/// GIF outputs are trimmed to this many seconds.
pub const GIF_MAX_SECS: u32 = 10;
pub const GIF_FPS: u32 = 10;
pub const GIF_WIDTH: u32 = 480;
pub const MP3_BITRATE_KBPS: u32 = 192;
pub const MP3_SAMPLE_RATE: u32 = 44_100;
pub const MP3_CHANNELS: u32 = 2;

/// Configuration for a conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_fileconv::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .image_quality(80)
///     .scratch_dir("/var/tmp/fileconv")
///     .build()
///     .unwrap();
/// assert_eq!(config.image_quality, 80);
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Input size ceiling in bytes. Default: 20 MiB.
    pub max_input_bytes: u64,

    /// Outer timeout for image conversions, in seconds. Default: 30.
    ///
    /// Pixel work cannot be interrupted once started; expiry abandons the
    /// result, it does not stop the worker thread.
    pub image_timeout_secs: u64,

    /// Timeout for ffmpeg and office conversions, in seconds. Default: 120.
    ///
    /// Expiry kills the backend process.
    pub backend_timeout_secs: u64,

    /// Long-edge cap for image outputs in pixels. Default: 1080.
    pub max_image_edge: u32,

    /// Quality for JPEG and WebP outputs, 1–100. PNG is lossless and ignores it.
    /// Default: 90.
    pub image_quality: u8,

    /// Quality of the JPEG embedded in PDF outputs, 1–100. Default: 95.
    pub pdf_jpeg_quality: u8,

    /// GIF duration cap in seconds. Default: 10.
    pub gif_max_secs: u32,
    /// GIF frame rate. Default: 10.
    pub gif_fps: u32,
    /// GIF output width; height follows the aspect ratio. Default: 480.
    pub gif_width: u32,

    /// MP3 bitrate in kbps. Default: 192.
    pub mp3_bitrate_kbps: u32,
    /// MP3 sample rate in Hz. Default: 44100.
    pub mp3_sample_rate: u32,
    /// MP3 channel count. Default: 2.
    pub mp3_channels: u32,

    /// Video codec for MP4 outputs. Default: `libx264`.
    pub mp4_video_codec: String,
    /// Encoder speed/quality preset. Default: `fast`.
    pub mp4_preset: String,
    /// Constant-rate factor. Default: 23.
    pub mp4_crf: u8,
    /// Audio codec for MP4 outputs. Default: `aac`.
    pub mp4_audio_codec: String,

    /// Directory holding inputs, intermediates and artifacts.
    /// Default: `$TMPDIR/fileconv`.
    pub scratch_dir: PathBuf,

    /// ffmpeg executable. Default: `ffmpeg` (resolved on `PATH`).
    pub ffmpeg_path: PathBuf,

    /// LibreOffice executable. Default: `soffice`.
    pub soffice_path: PathBuf,

    /// Concurrent requests in [`crate::convert::convert_batch`]. Default: 4.
    pub concurrency: usize,

    /// Optional observer notified on state transitions.
    #[serde(skip)]
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            max_input_bytes: MAX_INPUT_BYTES,
            image_timeout_secs: IMAGE_TIMEOUT_SECS,
            backend_timeout_secs: BACKEND_TIMEOUT_SECS,
            max_image_edge: MAX_IMAGE_EDGE,
            image_quality: 90,
            pdf_jpeg_quality: 95,
            gif_max_secs: GIF_MAX_SECS,
            gif_fps: GIF_FPS,
            gif_width: GIF_WIDTH,
            mp3_bitrate_kbps: MP3_BITRATE_KBPS,
            mp3_sample_rate: MP3_SAMPLE_RATE,
            mp3_channels: MP3_CHANNELS,
            mp4_video_codec: "libx264".to_string(),
            mp4_preset: "fast".to_string(),
            mp4_crf: 23,
            mp4_audio_codec: "aac".to_string(),
            scratch_dir: std::env::temp_dir().join("fileconv"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            soffice_path: PathBuf::from("soffice"),
            concurrency: 4,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("max_input_bytes", &self.max_input_bytes)
            .field("image_timeout_secs", &self.image_timeout_secs)
            .field("backend_timeout_secs", &self.backend_timeout_secs)
            .field("max_image_edge", &self.max_image_edge)
            .field("image_quality", &self.image_quality)
            .field("pdf_jpeg_quality", &self.pdf_jpeg_quality)
            .field("gif", &(self.gif_max_secs, self.gif_fps, self.gif_width))
            .field(
                "mp3",
                &(self.mp3_bitrate_kbps, self.mp3_sample_rate, self.mp3_channels),
            )
            .field("mp4_video_codec", &self.mp4_video_codec)
            .field("mp4_preset", &self.mp4_preset)
            .field("mp4_crf", &self.mp4_crf)
            .field("mp4_audio_codec", &self.mp4_audio_codec)
            .field("scratch_dir", &self.scratch_dir)
            .field("ffmpeg_path", &self.ffmpeg_path)
            .field("soffice_path", &self.soffice_path)
            .field("concurrency", &self.concurrency)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_secs)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn max_input_bytes(mut self, bytes: u64) -> Self {
        self.config.max_input_bytes = bytes;
        self
    }

    pub fn image_timeout_secs(mut self, secs: u64) -> Self {
        self.config.image_timeout_secs = secs;
        self
    }

    pub fn backend_timeout_secs(mut self, secs: u64) -> Self {
        self.config.backend_timeout_secs = secs;
        self
    }

    pub fn max_image_edge(mut self, px: u32) -> Self {
        self.config.max_image_edge = px.max(16);
        self
    }

    pub fn image_quality(mut self, q: u8) -> Self {
        self.config.image_quality = q.clamp(1, 100);
        self
    }

    pub fn pdf_jpeg_quality(mut self, q: u8) -> Self {
        self.config.pdf_jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn gif(mut self, max_secs: u32, fps: u32, width: u32) -> Self {
        self.config.gif_max_secs = max_secs;
        self.config.gif_fps = fps;
        self.config.gif_width = width;
        self
    }

    pub fn mp3(mut self, bitrate_kbps: u32, sample_rate: u32, channels: u32) -> Self {
        self.config.mp3_bitrate_kbps = bitrate_kbps;
        self.config.mp3_sample_rate = sample_rate;
        self.config.mp3_channels = channels;
        self
    }

    pub fn mp4_video_codec(mut self, codec: impl Into<String>) -> Self {
        self.config.mp4_video_codec = codec.into();
        self
    }

    pub fn mp4_preset(mut self, preset: impl Into<String>) -> Self {
        self.config.mp4_preset = preset.into();
        self
    }

    pub fn mp4_crf(mut self, crf: u8) -> Self {
        self.config.mp4_crf = crf.min(51);
        self
    }

    pub fn mp4_audio_codec(mut self, codec: impl Into<String>) -> Self {
        self.config.mp4_audio_codec = codec.into();
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = dir.into();
        self
    }

    pub fn ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ffmpeg_path = path.into();
        self
    }

    pub fn soffice_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.soffice_path = path.into();
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, ConvertError> {
        let c = &self.config;
        if c.max_input_bytes == 0 {
            return Err(ConvertError::InvalidConfig(
                "max_input_bytes must be > 0".into(),
            ));
        }
        if c.image_timeout_secs == 0 || c.backend_timeout_secs == 0 {
            return Err(ConvertError::InvalidConfig(
                "Timeouts must be ≥ 1 second".into(),
            ));
        }
        if c.gif_max_secs == 0 || c.gif_fps == 0 || c.gif_width == 0 {
            return Err(ConvertError::InvalidConfig(format!(
                "GIF parameters must be positive, got {}s/{}fps/{}px",
                c.gif_max_secs, c.gif_fps, c.gif_width
            )));
        }
        if c.mp3_bitrate_kbps == 0 || c.mp3_sample_rate == 0 || c.mp3_channels == 0 {
            return Err(ConvertError::InvalidConfig(
                "MP3 parameters must be positive".into(),
            ));
        }
        if c.scratch_dir.as_os_str().is_empty() {
            return Err(ConvertError::InvalidConfig(
                "scratch_dir must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_limits() {
        let c = ConversionConfig::default();
        assert_eq!(c.max_input_bytes, 20 * 1024 * 1024);
        assert_eq!(c.image_timeout(), Duration::from_secs(30));
        assert_eq!(c.backend_timeout(), Duration::from_secs(120));
        assert_eq!(c.max_image_edge, 1080);
        assert_eq!(c.image_quality, 90);
        assert_eq!((c.gif_max_secs, c.gif_fps, c.gif_width), (10, 10, 480));
        assert_eq!(
            (c.mp3_bitrate_kbps, c.mp3_sample_rate, c.mp3_channels),
            (192, 44_100, 2)
        );
    }

    #[test]
    fn builder_clamps_quality() {
        let c = ConversionConfig::builder()
            .image_quality(0)
            .pdf_jpeg_quality(200)
            .build()
            .unwrap();
        assert_eq!(c.image_quality, 1);
        assert_eq!(c.pdf_jpeg_quality, 100);
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        let err = ConversionConfig::builder()
            .backend_timeout_secs(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConvertError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_zero_gif_fps() {
        assert!(ConversionConfig::builder().gif(10, 0, 480).build().is_err());
    }

    #[test]
    fn debug_hides_callback() {
        let s = format!("{:?}", ConversionConfig::default());
        assert!(s.contains("scratch_dir"));
        assert!(s.contains("progress_callback: None"));
    }
}
