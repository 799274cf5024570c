//! # edgequake-fileconv
//!
//! Convert user-uploaded images, audio, video and office documents into a
//! small set of target formats, inside a safety envelope.
//!
//! ## Why this crate?
//!
//! Files arriving from a chat front-end are untrusted: they can be huge,
//! mislabelled, executable, or crafted to make a transcoder spin forever.
//! Every request here is size-checked, screened against a deny-list and an
//! allow-list, and run under a hard deadline. Failures come back as one of a
//! handful of [`ErrorKind`]s that map to a friendly message, and nothing is
//! left behind in scratch storage when a request fails.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload (path + declared MIME) + target token
//!  │
//!  ├─ 1. Validate  size ≤ 20 MiB, deny-list, allow-list
//!  ├─ 2. Dispatch  unique scratch path <owner>_<millis>_<uuid>.<ext>
//!  ├─ 3. Convert   image (in-process, 30 s) │ media (ffmpeg, 120 s)
//!  │               │ document (soffice, 120 s)
//!  └─ 4. Output    Artifact { path, size, duration } or ConvertError
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_fileconv::{remove, ConversionConfig, ConversionRequest, Converter, PendingInput};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let converter = Converter::new(ConversionConfig::default());
//!     let request = ConversionRequest::new(
//!         PendingInput::new("/tmp/fileconv/upload.mov", "video/quicktime"),
//!         "gif",
//!     )
//!     .with_owner("42");
//!
//!     match converter.convert(&request).await {
//!         Ok(artifact) => {
//!             println!("{} ({} bytes)", artifact.path.display(), artifact.size_bytes);
//!             remove(&artifact.path).await;
//!         }
//!         Err(e) => eprintln!("{}", e.kind().user_message()),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `fileconv` binary (clap + anyhow + tracing-subscriber + indicatif + mime_guess) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-fileconv = { version = "0.1", default-features = false }
//! ```
//!
//! ## Limits
//!
//! | Limit | Default | Config |
//! |-------|---------|--------|
//! | Input size | 20 MiB | `max_input_bytes` |
//! | Image deadline | 30 s | `image_timeout_secs` |
//! | ffmpeg / soffice deadline | 120 s | `backend_timeout_secs` |
//! | Image long edge | 1080 px | `max_image_edge` |
//! | GIF length | first 10 s | `gif(..)` |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod catalog;
pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use catalog::{format_for_mime, mime_for_token, targets_for, Category};
pub use config::{
    ConversionConfig, ConversionConfigBuilder, BACKEND_TIMEOUT_SECS, IMAGE_TIMEOUT_SECS,
    MAX_IMAGE_EDGE, MAX_INPUT_BYTES,
};
pub use convert::{convert, convert_batch, Converter};
pub use error::{ConvertError, ErrorKind};
pub use output::{normalize_format, Artifact, ConversionOutcome, ConversionRequest, PendingInput};
pub use pipeline::backend::{BackendError, MediaTranscoder, OfficeConverter};
pub use pipeline::document::SofficeConverter;
pub use pipeline::media::{FfmpegTranscoder, MediaParams};
pub use pipeline::scratch::remove;
pub use progress::{
    ConversionProgressCallback, ConversionState, NoopProgressCallback, ProgressCallback,
};
