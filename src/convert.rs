//! Conversion router: the engine's public entry point.
//!
//! A request moves through `Validating → Dispatching → Converting` and ends
//! in `Done` (artifact path returned) or `Failed` (classified error). Nothing
//! is retried: one request is exactly one attempt.
//!
//! Validation (size, deny-list, allow-list) completes before an output path
//! is allocated or a backend is touched, so a rejected request leaves no
//! trace in scratch storage.

use crate::catalog::{self, Category};
use crate::config::ConversionConfig;
use crate::error::{ConvertError, ErrorKind};
use crate::output::{normalize_format, Artifact, ConversionOutcome, ConversionRequest, PendingInput};
use crate::pipeline::backend::{MediaTranscoder, OfficeConverter};
use crate::pipeline::document::{self, SofficeConverter};
use crate::pipeline::image::{self, ImageJob};
use crate::pipeline::media::{self, FfmpegTranscoder};
use crate::pipeline::{safety, scratch};
use crate::progress::ConversionState;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

/// A configured conversion engine.
///
/// Cheap to share behind an `Arc`; holds no per-request state. Backends
/// default to `ffmpeg` and `soffice` from the config and can be replaced
/// without touching the routing logic.
pub struct Converter {
    config: ConversionConfig,
    media: Arc<dyn MediaTranscoder>,
    office: Arc<dyn OfficeConverter>,
    scratch_ready: OnceCell<()>,
}

impl Converter {
    pub fn new(config: ConversionConfig) -> Self {
        let media = Arc::new(FfmpegTranscoder::new(config.ffmpeg_path.clone()));
        let office = Arc::new(SofficeConverter::new(config.soffice_path.clone()));
        Self {
            config,
            media,
            office,
            scratch_ready: OnceCell::new(),
        }
    }

    /// Replace the audio/video backend.
    pub fn with_media_backend(mut self, backend: Arc<dyn MediaTranscoder>) -> Self {
        self.media = backend;
        self
    }

    /// Replace the office-document backend.
    pub fn with_office_backend(mut self, backend: Arc<dyn OfficeConverter>) -> Self {
        self.office = backend;
        self
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Convert one request.
    ///
    /// On success the artifact at the returned path belongs to the caller,
    /// who also remains responsible for the input file.
    pub async fn convert(&self, request: &ConversionRequest) -> ConversionOutcome {
        let id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        let start = Instant::now();
        info!(
            "[{}] {} ({}) → {}",
            id,
            request.input.path().display(),
            request.input.mime(),
            request.target
        );

        let result = self.route(&id, request, start).await;

        match &result {
            Ok(artifact) => {
                info!(
                    "[{}] done: {} ({} bytes, {}ms)",
                    id,
                    artifact.path.display(),
                    artifact.size_bytes,
                    artifact.duration_ms
                );
                self.notify(&id, ConversionState::Done);
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_complete(&id, artifact);
                }
            }
            Err(e) => {
                let kind = e.kind();
                if kind == ErrorKind::Unknown {
                    error!("[{}] failed ({}): {:?}", id, kind, e);
                } else {
                    warn!("[{}] failed ({}): {}", id, kind, e);
                }
                self.notify(&id, ConversionState::Failed);
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_error(&id, kind, &e.detail());
                }
            }
        }
        result
    }

    async fn route(
        &self,
        id: &str,
        request: &ConversionRequest,
        start: Instant,
    ) -> ConversionOutcome {
        // ── Step 1: Validate ─────────────────────────────────────────────
        self.notify(id, ConversionState::Validating);
        let input = &request.input;
        let mime = input.mime();
        let target = normalize_format(&request.target);

        let size = safety::check_size(input.path(), self.config.max_input_bytes).await?;
        if let Some(declared) = input.declared_size() {
            if declared != size {
                debug!("[{}] declared size {} differs from measured {}", id, declared, size);
            }
        }

        if !safety::check_safety(mime, input.path(), input.display_name()) {
            return Err(ConvertError::UnsafeFileType {
                name: input
                    .display_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| input.path().display().to_string()),
                mime: mime.to_string(),
            });
        }

        let unsupported = || ConvertError::UnsupportedFormat {
            mime: mime.to_string(),
            target: target.clone(),
        };
        if !safety::is_allowed(mime, &target) {
            return Err(unsupported());
        }

        // ── Step 2: Dispatch ─────────────────────────────────────────────
        self.notify(id, ConversionState::Dispatching);
        let category = catalog::category_of(mime).ok_or_else(unsupported)?;
        self.ensure_scratch().await?;
        let output = scratch::output_path(&self.config.scratch_dir, &request.owner, &target);
        debug!("[{}] {} pipeline → {}", id, category, output.display());

        // ── Step 3: Convert ──────────────────────────────────────────────
        self.notify(id, ConversionState::Converting);
        match category {
            Category::Image => {
                let job = ImageJob::new(input.path(), &output, &target, &request.owner, &self.config);
                image::transcode(job, self.config.image_timeout()).await?;
            }
            Category::Video | Category::Audio => {
                let params =
                    media::params_for(&target, category, &self.config).ok_or_else(unsupported)?;
                media::transcode(
                    self.media.as_ref(),
                    input.path(),
                    &output,
                    &params,
                    self.config.backend_timeout(),
                )
                .await?;
            }
            Category::Document => {
                let source_ext = catalog::format_for_mime(mime).unwrap_or("bin");
                document::transcode(
                    self.office.as_ref(),
                    input.path(),
                    source_ext,
                    &output,
                    &target,
                    self.config.backend_timeout(),
                )
                .await?;
            }
        }

        let size_bytes = match tokio::fs::metadata(&output).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                scratch::remove(&output).await;
                return Err(ConvertError::io(
                    format!("stat artifact {}", output.display()),
                    e,
                ));
            }
        };

        Ok(Artifact {
            path: output,
            format: target,
            size_bytes,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn ensure_scratch(&self) -> Result<(), ConvertError> {
        self.scratch_ready
            .get_or_try_init(|| scratch::ensure_scratch_dir(&self.config.scratch_dir))
            .await
            .map(|_| ())
    }

    fn notify(&self, id: &str, state: ConversionState) {
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_state(id, state);
        }
    }
}

/// Convert the file at `input_path` (declared as `mime`) to `format`.
///
/// Convenience wrapper building a [`Converter`] with default backends.
///
/// # Example
/// ```rust,no_run
/// use edgequake_fileconv::{convert, remove, ConversionConfig};
///
/// # #[tokio::main]
/// # async fn main() {
/// let config = ConversionConfig::default();
/// match convert("/tmp/fileconv/42_photo.png", "image/png", ".JPG", &config).await {
///     Ok(artifact) => {
///         println!("{}", artifact.path.display());
///         remove(&artifact.path).await;
///     }
///     Err(e) => eprintln!("{}", e.kind().user_message()),
/// }
/// # }
/// ```
pub async fn convert(
    input_path: impl AsRef<Path>,
    mime: &str,
    format: &str,
    config: &ConversionConfig,
) -> ConversionOutcome {
    let request = ConversionRequest::new(PendingInput::new(input_path.as_ref(), mime), format);
    Converter::new(config.clone()).convert(&request).await
}

/// Convert several independent requests, at most `config.concurrency` at a
/// time. Outcomes are returned in request order.
pub async fn convert_batch(
    converter: &Converter,
    requests: &[ConversionRequest],
) -> Vec<ConversionOutcome> {
    stream::iter(requests.iter().map(|r| converter.convert(r)))
        .buffered(converter.config.concurrency.max(1))
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::backend::BackendError;
    use crate::pipeline::media::MediaParams;
    use async_trait::async_trait;
    use crate::progress::ConversionProgressCallback;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records every callback as a line, in call order.
    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl ConversionProgressCallback for Recorder {
        fn on_state(&self, _request_id: &str, state: ConversionState) {
            self.events.lock().unwrap().push(state.to_string());
        }

        fn on_complete(&self, _request_id: &str, artifact: &Artifact) {
            self.events
                .lock()
                .unwrap()
                .push(format!("complete {}", artifact.format));
        }

        fn on_error(&self, _request_id: &str, kind: ErrorKind, _detail: &str) {
            self.events.lock().unwrap().push(format!("error {kind}"));
        }
    }

    fn recorded_converter(dir: &Path, recorder: Arc<Recorder>) -> Converter {
        let config = ConversionConfig::builder()
            .scratch_dir(dir.join("scratch"))
            .progress_callback(recorder)
            .build()
            .unwrap();
        Converter::new(config).with_media_backend(Arc::new(CountingMedia::default()))
    }

    /// Counts calls; always succeeds by writing a few bytes.
    #[derive(Default)]
    struct CountingMedia {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MediaTranscoder for CountingMedia {
        fn name(&self) -> &str {
            "counting"
        }

        async fn transcode(
            &self,
            _input: &Path,
            output: &Path,
            _params: &MediaParams,
        ) -> Result<(), BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::fs::write(output, b"ID3").map_err(|e| BackendError::Output(e.to_string()))
        }
    }

    fn converter(dir: &Path, media: Arc<CountingMedia>) -> Converter {
        let config = ConversionConfig::builder()
            .scratch_dir(dir.join("scratch"))
            .build()
            .unwrap();
        Converter::new(config).with_media_backend(media)
    }

    fn staged(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let p = dir.join(name);
        std::fs::write(&p, bytes).unwrap();
        p
    }

    #[tokio::test]
    async fn audio_to_mp3_reaches_backend() {
        let dir = tempfile::tempdir().unwrap();
        let media = Arc::new(CountingMedia::default());
        let conv = converter(dir.path(), Arc::clone(&media));
        let input = staged(dir.path(), "voice.ogg", b"OggS");
        let req = ConversionRequest::new(PendingInput::new(&input, "audio/ogg"), "MP3")
            .with_owner("7");

        let artifact = conv.convert(&req).await.unwrap();
        assert_eq!(artifact.format, "mp3");
        assert_eq!(artifact.size_bytes, 3);
        assert!(artifact.path.starts_with(dir.path().join("scratch")));
        assert_eq!(media.calls.load(Ordering::SeqCst), 1);
        assert!(input.exists(), "input must not be touched");
    }

    #[tokio::test]
    async fn disallowed_pair_never_reaches_backend() {
        let dir = tempfile::tempdir().unwrap();
        let media = Arc::new(CountingMedia::default());
        let conv = converter(dir.path(), Arc::clone(&media));
        let input = staged(dir.path(), "voice.ogg", b"OggS");
        let req = ConversionRequest::new(PendingInput::new(&input, "audio/ogg"), "mp4");

        let err = conv.convert(&req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
        assert_eq!(media.calls.load(Ordering::SeqCst), 0);
        assert!(!dir.path().join("scratch").exists(), "no scratch writes before dispatch");
    }

    #[tokio::test]
    async fn unsafe_name_rejected_before_allow_list() {
        let dir = tempfile::tempdir().unwrap();
        let conv = converter(dir.path(), Arc::new(CountingMedia::default()));
        let input = staged(dir.path(), "upload.bin", b"MZ");
        let req = ConversionRequest::new(
            PendingInput::new(&input, "video/mp4").with_display_name("movie.mp4.exe"),
            "gif",
        );
        assert_eq!(
            conv.convert(&req).await.unwrap_err().kind(),
            ErrorKind::UnsafeFileType
        );
    }

    #[tokio::test]
    async fn missing_input_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let conv = converter(dir.path(), Arc::new(CountingMedia::default()));
        let req = ConversionRequest::new(
            PendingInput::new(dir.path().join("gone.png"), "image/png"),
            "jpg",
        );
        assert_eq!(
            conv.convert(&req).await.unwrap_err().kind(),
            ErrorKind::FileUnreadable
        );
    }

    #[tokio::test]
    async fn batch_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let conv = converter(dir.path(), Arc::new(CountingMedia::default()));
        let ok = staged(dir.path(), "a.wav", b"RIFF");
        let reqs = vec![
            ConversionRequest::new(PendingInput::new(&ok, "audio/wav"), "mp3"),
            ConversionRequest::new(PendingInput::new(&ok, "audio/wav"), "gif"),
            ConversionRequest::new(PendingInput::new(&ok, "audio/wav"), "mp3"),
        ];
        let outcomes = convert_batch(&conv, &reqs).await;
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_ok());
        assert_eq!(
            outcomes[1].as_ref().unwrap_err().kind(),
            ErrorKind::UnsupportedFormat
        );
        assert!(outcomes[2].is_ok());
        assert_ne!(
            outcomes[0].as_ref().unwrap().path,
            outcomes[2].as_ref().unwrap().path
        );
    }

    #[tokio::test]
    async fn success_walks_every_state_then_completes() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Arc::new(Recorder::default());
        let conv = recorded_converter(dir.path(), Arc::clone(&recorder));
        let input = staged(dir.path(), "song.flac", b"fLaC");
        let req = ConversionRequest::new(PendingInput::new(&input, "audio/flac"), "mp3");

        conv.convert(&req).await.unwrap();
        assert_eq!(
            recorder.events(),
            ["validating", "dispatching", "converting", "done", "complete mp3"]
        );
    }

    #[tokio::test]
    async fn rejection_fails_from_validating_with_its_kind() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Arc::new(Recorder::default());
        let conv = recorded_converter(dir.path(), Arc::clone(&recorder));
        let input = staged(dir.path(), "song.flac", b"fLaC");
        let req = ConversionRequest::new(PendingInput::new(&input, "audio/flac"), "gif");

        let err = conv.convert(&req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
        assert_eq!(
            recorder.events(),
            ["validating", "failed", "error unsupported_format"]
        );
    }

    #[tokio::test]
    async fn oversize_input_reports_file_too_large() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Arc::new(Recorder::default());
        let config = ConversionConfig::builder()
            .scratch_dir(dir.path().join("scratch"))
            .max_input_bytes(3)
            .progress_callback(Arc::clone(&recorder) as Arc<dyn ConversionProgressCallback>)
            .build()
            .unwrap();
        let conv = Converter::new(config);
        let input = staged(dir.path(), "song.flac", b"fLaC");
        let req = ConversionRequest::new(PendingInput::new(&input, "audio/flac"), "mp3");

        conv.convert(&req).await.unwrap_err();
        assert_eq!(
            recorder.events(),
            ["validating", "failed", "error file_too_large"]
        );
    }
}
