//! Image transform pipeline: orient, strip, bound, encode.
//!
//! ## Steps
//!
//! ```text
//! header dims ─▶ decode + EXIF orientation ─▶ fit 1080² ─▶ encode
//!                                                       └─▶ pdf: PNG ─▶ JPEG ─▶ single-image PDF
//! ```
//!
//! Metadata is dropped by construction: pixels are decoded and re-encoded,
//! and none of the encoders used here copies EXIF, ICC or XMP segments.
//!
//! The work is CPU-bound and runs on the blocking pool. A timeout abandons
//! the wait only; the worker checks the shared `abandoned` flag between
//! steps and before touching the output so a late finish never leaves an
//! artifact behind.

use crate::config::ConversionConfig;
use crate::error::ConvertError;
use crate::pipeline::pdf;
use crate::pipeline::scratch::{self, ScratchFile};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use std::io::{BufWriter, Cursor};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Targets this pipeline can encode.
const TARGETS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "pdf"];

pub fn supports_target(target: &str) -> bool {
    TARGETS.contains(&target)
}

/// Dimensions after fitting inside `cap × cap` without enlarging.
///
/// The longer side becomes exactly `cap`; the shorter one is rounded and
/// never drops below 1.
pub fn fit_within(width: u32, height: u32, cap: u32) -> (u32, u32) {
    let long = width.max(height);
    if long <= cap {
        return (width, height);
    }
    let scale = |side: u32| -> u32 {
        let scaled = (u64::from(side) * u64::from(cap) + u64::from(long) / 2) / u64::from(long);
        (scaled as u32).max(1)
    };
    if width >= height {
        (cap, scale(height))
    } else {
        (scale(width), cap)
    }
}

/// One image conversion.
#[derive(Debug, Clone)]
pub struct ImageJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub target: String,
    pub quality: u8,
    pub pdf_jpeg_quality: u8,
    pub max_edge: u32,
    /// Where PDF intermediates are written.
    pub scratch_dir: PathBuf,
    /// Prefix for intermediate file names.
    pub owner: String,
    abandoned: Arc<AtomicBool>,
}

impl ImageJob {
    pub fn new(
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        target: impl Into<String>,
        owner: impl Into<String>,
        config: &ConversionConfig,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            target: target.into(),
            quality: config.image_quality,
            pdf_jpeg_quality: config.pdf_jpeg_quality,
            max_edge: config.max_image_edge,
            scratch_dir: config.scratch_dir.clone(),
            owner: owner.into(),
            abandoned: Arc::new(AtomicBool::new(false)),
        }
    }

    fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
    }

    fn bail_if_abandoned(&self) -> Result<(), ConvertError> {
        if self.is_abandoned() {
            return Err(ConvertError::Internal("image job abandoned".into()));
        }
        Ok(())
    }
}

/// Run `job` on the blocking pool, giving up after `limit`.
pub async fn transcode(job: ImageJob, limit: Duration) -> Result<(), ConvertError> {
    let abandoned = Arc::clone(&job.abandoned);
    let output = job.output.clone();
    let handle = tokio::task::spawn_blocking(move || convert_blocking(&job));

    match tokio::time::timeout(limit, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => {
            scratch::remove(&output).await;
            Err(ConvertError::Internal(format!("image task failed: {join}")))
        }
        Err(_) => {
            abandoned.store(true, Ordering::SeqCst);
            warn!(
                "Image conversion exceeded {}s; result abandoned",
                limit.as_secs()
            );
            scratch::remove(&output).await;
            Err(ConvertError::Timeout {
                stage: "image",
                secs: limit.as_secs(),
            })
        }
    }
}

/// Synchronous conversion. Removes any partial output on failure.
pub fn convert_blocking(job: &ImageJob) -> Result<(), ConvertError> {
    let start = Instant::now();
    let result = run(job);
    if result.is_err() || job.is_abandoned() {
        scratch::remove_blocking(&job.output);
    }
    if result.is_ok() {
        info!(
            "Image → {} in {}ms: {}",
            job.target,
            start.elapsed().as_millis(),
            job.output.display()
        );
    }
    result
}

fn run(job: &ImageJob) -> Result<(), ConvertError> {
    if !supports_target(&job.target) {
        return Err(ConvertError::UnsupportedFormat {
            mime: "image".into(),
            target: job.target.clone(),
        });
    }

    let (width, height) = open_reader(&job.input)?.into_dimensions()?;
    debug!("Source image {}x{}", width, height);

    let img = load_oriented(&job.input)?;
    job.bail_if_abandoned()?;

    let (w, h) = fit_within(img.width(), img.height(), job.max_edge);
    let img = if (w, h) != (img.width(), img.height()) {
        debug!("Resizing {}x{} → {}x{}", img.width(), img.height(), w, h);
        img.resize_exact(w, h, FilterType::Lanczos3)
    } else {
        img
    };
    job.bail_if_abandoned()?;

    let bytes = match job.target.as_str() {
        "jpg" | "jpeg" => encode_progressive_jpeg(&img, job.quality)?,
        "png" => encode_png(&img)?,
        "webp" => encode_webp(&img, job.quality)?,
        "gif" => encode_gif(&img)?,
        "pdf" => build_pdf(job, &img)?,
        other => {
            return Err(ConvertError::UnsupportedFormat {
                mime: "image".into(),
                target: other.to_string(),
            })
        }
    };
    job.bail_if_abandoned()?;

    std::fs::write(&job.output, &bytes)
        .map_err(|e| ConvertError::io(format!("write {}", job.output.display()), e))?;
    job.bail_if_abandoned()
}

fn open_reader(path: &Path) -> Result<ImageReader<std::io::BufReader<std::fs::File>>, ConvertError> {
    ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|source| ConvertError::FileUnreadable {
            path: path.to_path_buf(),
            source,
        })
}

/// Decode and apply the EXIF orientation, if any.
fn load_oriented(path: &Path) -> Result<DynamicImage, ConvertError> {
    let mut decoder = open_reader(path)?.into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut img = DynamicImage::from_decoder(decoder)?;
    img.apply_orientation(orientation);
    Ok(img)
}

fn encode_progressive_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, ConvertError> {
    let rgb = img.to_rgb8();
    let too_big = || ConvertError::Image {
        detail: format!("{}x{} exceeds JPEG limits", rgb.width(), rgb.height()),
    };
    let w = u16::try_from(rgb.width()).map_err(|_| too_big())?;
    let h = u16::try_from(rgb.height()).map_err(|_| too_big())?;

    let mut buf = Vec::new();
    let mut encoder = jpeg_encoder::Encoder::new(&mut buf, quality);
    encoder.set_progressive(true);
    encoder
        .encode(rgb.as_raw(), w, h, jpeg_encoder::ColorType::Rgb)
        .map_err(|e| ConvertError::Image {
            detail: format!("JPEG encoding failed: {e}"),
        })?;
    Ok(buf)
}

/// Maximum compression; PNG is lossless so quality has no effect here.
fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, ConvertError> {
    let mut buf = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut buf, CompressionType::Best, PngFilter::Adaptive);
    img.write_with_encoder(encoder)?;
    Ok(buf)
}

/// Lossy WebP through libwebp; the `image` encoder only writes lossless.
fn encode_webp(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, ConvertError> {
    let rgba = img.to_rgba8();
    let encoded = webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height())
        .encode_simple(false, f32::from(quality))
        .map_err(|e| ConvertError::Image {
            detail: format!("WebP encoding failed: {e:?}"),
        })?;
    Ok(encoded.to_vec())
}

fn encode_gif(img: &DynamicImage) -> Result<Vec<u8>, ConvertError> {
    let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
    let mut buf = Vec::new();
    rgba.write_to(&mut Cursor::new(&mut buf), ImageFormat::Gif)?;
    Ok(buf)
}

/// PNG intermediate → high-quality JPEG intermediate → one-page PDF.
/// Both intermediates are removed however this returns.
fn build_pdf(job: &ImageJob, img: &DynamicImage) -> Result<Vec<u8>, ConvertError> {
    let png = ScratchFile::new(scratch::output_path(&job.scratch_dir, &job.owner, "png"));
    let jpg = ScratchFile::new(scratch::output_path(&job.scratch_dir, &job.owner, "jpg"));

    std::fs::write(png.path(), encode_png(img)?)
        .map_err(|e| ConvertError::io(format!("write {}", png.path().display()), e))?;

    let lossless = image::open(png.path())?;
    let file = std::fs::File::create(jpg.path())
        .map_err(|e| ConvertError::io(format!("create {}", jpg.path().display()), e))?;
    let rgb = DynamicImage::ImageRgb8(lossless.to_rgb8());
    rgb.write_with_encoder(JpegEncoder::new_with_quality(
        BufWriter::new(file),
        job.pdf_jpeg_quality,
    ))?;

    let (width, height) = image::image_dimensions(jpg.path())?;
    let jpeg = std::fs::read(jpg.path())
        .map_err(|e| ConvertError::io(format!("read {}", jpg.path().display()), e))?;
    debug!(
        "PDF page from {}x{} JPEG, {} bytes",
        width,
        height,
        jpeg.len()
    );
    Ok(pdf::single_image_pdf(&jpeg, width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn job(dir: &Path, input: &Path, target: &str) -> ImageJob {
        let config = ConversionConfig::builder()
            .scratch_dir(dir)
            .build()
            .unwrap();
        ImageJob::new(input, dir.join(format!("out.{target}")), target, "t", &config)
    }

    fn write_png(dir: &Path, w: u32, h: u32) -> PathBuf {
        let p = dir.join(format!("src_{w}x{h}.png"));
        RgbaImage::from_pixel(w, h, Rgba([10, 200, 30, 255]))
            .save(&p)
            .unwrap();
        p
    }

    /// 2×1 JPEG carrying EXIF orientation 6 (rotate 90° clockwise).
    fn write_rotated_jpeg(dir: &Path) -> PathBuf {
        let exif: &[u8] = &[
            b'E', b'x', b'i', b'f', 0, 0, // header
            b'M', b'M', 0, 42, 0, 0, 0, 8, // big-endian TIFF, IFD at 8
            0, 1, // one entry
            0x01, 0x12, 0, 3, 0, 0, 0, 1, 0, 6, 0, 0, // Orientation = 6
            0, 0, 0, 0, // no next IFD
        ];
        let pixels = [255u8, 0, 0, 0, 0, 255];
        let mut buf = Vec::new();
        let mut enc = jpeg_encoder::Encoder::new(&mut buf, 95);
        enc.add_app_segment(1, exif).unwrap();
        enc.encode(&pixels, 2, 1, jpeg_encoder::ColorType::Rgb)
            .unwrap();
        let p = dir.join("rotated.jpg");
        std::fs::write(&p, buf).unwrap();
        p
    }

    #[test]
    fn fit_within_caps_long_edge() {
        assert_eq!(fit_within(4000, 3000, 1080), (1080, 810));
        assert_eq!(fit_within(3000, 4000, 1080), (810, 1080));
        assert_eq!(fit_within(5000, 1, 1080), (1080, 1));
    }

    #[test]
    fn fit_within_never_upscales() {
        assert_eq!(fit_within(1, 1, 1080), (1, 1));
        assert_eq!(fit_within(1080, 500, 1080), (1080, 500));
    }

    #[test]
    fn every_listed_target_is_supported() {
        for t in TARGETS {
            assert!(supports_target(t));
        }
        assert!(!supports_target("bmp"));
    }

    #[test]
    fn png_to_progressive_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let src = write_png(dir.path(), 8, 4);
        let job = job(dir.path(), &src, "jpg");
        convert_blocking(&job).unwrap();
        let bytes = std::fs::read(&job.output).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        // SOF2 marks a progressive DCT frame.
        assert!(bytes.windows(2).any(|w| w == [0xFF, 0xC2]));
        assert_eq!(image::image_dimensions(&job.output).unwrap(), (8, 4));
    }

    #[test]
    fn large_image_is_downscaled() {
        let dir = tempfile::tempdir().unwrap();
        let src = write_png(dir.path(), 2160, 1000);
        let job = job(dir.path(), &src, "png");
        convert_blocking(&job).unwrap();
        assert_eq!(image::image_dimensions(&job.output).unwrap(), (1080, 500));
    }

    #[test]
    fn exif_orientation_applied_and_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let src = write_rotated_jpeg(dir.path());
        let job = job(dir.path(), &src, "jpeg");
        convert_blocking(&job).unwrap();
        assert_eq!(image::image_dimensions(&job.output).unwrap(), (1, 2));
        let bytes = std::fs::read(&job.output).unwrap();
        assert!(!bytes.windows(4).any(|w| w == b"Exif"));
    }

    #[test]
    fn webp_and_gif_outputs_decode() {
        let dir = tempfile::tempdir().unwrap();
        let src = write_png(dir.path(), 5, 7);
        for target in ["webp", "gif"] {
            let job = job(dir.path(), &src, target);
            convert_blocking(&job).unwrap();
            let format = image::ImageReader::open(&job.output)
                .unwrap()
                .with_guessed_format()
                .unwrap()
                .format();
            let expected = if target == "webp" {
                ImageFormat::WebP
            } else {
                ImageFormat::Gif
            };
            assert_eq!(format, Some(expected));
            assert_eq!(image::image_dimensions(&job.output).unwrap(), (5, 7));
        }
    }

    #[test]
    fn webp_quality_changes_size() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("noise.png");
        RgbImage::from_fn(256, 256, |x, y| {
            let v = (x.wrapping_mul(2654435761) ^ y.wrapping_mul(40503)) as u8;
            Rgb([v, v.wrapping_add(x as u8), v ^ (y as u8)])
        })
        .save(&src)
        .unwrap();

        let size_at = |quality: u8| {
            let config = ConversionConfig::builder()
                .scratch_dir(dir.path())
                .image_quality(quality)
                .build()
                .unwrap();
            let out = dir.path().join(format!("q{quality}.webp"));
            let job = ImageJob::new(&src, &out, "webp", "t", &config);
            convert_blocking(&job).unwrap();
            std::fs::metadata(&out).unwrap().len()
        };
        let low = size_at(10);
        let high = size_at(95);
        assert!(low < high, "q10 = {low} bytes, q95 = {high} bytes");
    }

    #[test]
    fn pdf_output_is_consistent_and_intermediates_removed() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.png");
        RgbImage::from_pixel(300, 200, Rgb([1, 2, 3])).save(&src).unwrap();
        let job = job(dir.path(), &src, "pdf");
        convert_blocking(&job).unwrap();

        let pdf_bytes = std::fs::read(&job.output).unwrap();
        pdf::tests::assert_xref_consistent(&pdf_bytes);
        let text = String::from_utf8_lossy(&pdf_bytes);
        assert!(text.contains("/MediaBox [0 0 300.00 200.00]"));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| n.starts_with("t_"))
            .collect();
        assert!(leftovers.is_empty(), "intermediates left: {leftovers:?}");
    }

    #[test]
    fn undecodable_input_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("broken.png");
        std::fs::write(&src, b"\x89PNG\r\n\x1a\nnot really").unwrap();
        let job = job(dir.path(), &src, "png");
        assert!(convert_blocking(&job).is_err());
        assert!(!job.output.exists());
    }

    #[test]
    fn unknown_target_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let src = write_png(dir.path(), 2, 2);
        let err = convert_blocking(&job(dir.path(), &src, "tiff")).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn abandoned_job_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let src = write_png(dir.path(), 4, 4);
        let job = job(dir.path(), &src, "png");
        job.abandoned.store(true, Ordering::SeqCst);
        assert!(convert_blocking(&job).is_err());
        assert!(!job.output.exists());
    }

    #[tokio::test]
    async fn async_wrapper_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let src = write_png(dir.path(), 3, 3);
        let job = job(dir.path(), &src, "png");
        let out = job.output.clone();
        transcode(job, Duration::from_secs(30)).await.unwrap();
        assert!(out.exists());
    }

    #[test]
    fn timeout_fires_and_late_worker_leaves_no_output() {
        // One blocking thread: a marker task queued after the conversion
        // runs only once the abandoned worker has returned.
        let rt = tokio::runtime::Builder::new_current_thread()
            .max_blocking_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("big.png");
        RgbImage::from_fn(2400, 2400, |x, y| Rgb([x as u8, y as u8, (x ^ y) as u8]))
            .save(&src)
            .unwrap();
        let job = job(dir.path(), &src, "pdf");
        let output = job.output.clone();

        rt.block_on(async {
            let err = transcode(job, Duration::from_millis(1)).await.unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::Timeout);
            tokio::task::spawn_blocking(|| ()).await.unwrap();
        });

        assert!(!output.exists(), "abandoned worker wrote {}", output.display());
    }
}
