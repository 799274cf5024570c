//! Error types for the edgequake-fileconv library.
//!
//! Two layers reflect two audiences:
//!
//! * [`ConvertError`]: the full failure, with paths, sizes and the backend's
//!   own message. This is what gets logged.
//!
//! * [`ErrorKind`]: the small, closed set of categories callers branch on
//!   and turn into a short localized message. Obtain it with
//!   [`ConvertError::kind`]. Raw backend output never needs to reach an end
//!   user: [`ErrorKind::user_message`] is safe to show as-is.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All failures returned by the conversion engine.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Validation errors ─────────────────────────────────────────────────
    /// Input exceeds the configured size ceiling.
    #[error("File '{path}' is {size} bytes, above the {limit}-byte limit")]
    FileTooLarge { path: PathBuf, size: u64, limit: u64 },

    /// Input could not be read from scratch storage.
    #[error("Cannot read '{path}': {source}")]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Extension or declared MIME is on the executable/script deny-list.
    #[error("File type not allowed: '{name}' ({mime})")]
    UnsafeFileType { name: String, mime: String },

    /// The (source MIME, target) pair is not in the allow-list, or the
    /// selected pipeline has no encoder for the target.
    #[error("Cannot convert {mime} to '{target}'")]
    UnsupportedFormat { mime: String, target: String },

    // ── Execution errors ──────────────────────────────────────────────────
    /// The governing wall-clock limit fired first.
    #[error("{stage} conversion timed out after {secs}s")]
    Timeout { stage: &'static str, secs: u64 },

    /// An external backend reported failure.
    #[error("{backend} failed: {message}")]
    BackendFailure { backend: String, message: String },

    /// In-process image decode/encode failed.
    #[error("Image processing failed: {detail}")]
    Image { detail: String },

    /// Scratch-storage I/O other than reading the input.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    /// Shorthand for an [`ConvertError::Io`] with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ConvertError::Io {
            context: context.into(),
            source,
        }
    }

    /// The category callers branch on.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::FileTooLarge { .. } => ErrorKind::FileTooLarge,
            ConvertError::FileUnreadable { .. } => ErrorKind::FileUnreadable,
            ConvertError::UnsafeFileType { .. } => ErrorKind::UnsafeFileType,
            ConvertError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            ConvertError::Timeout { .. } => ErrorKind::Timeout,
            ConvertError::BackendFailure { .. } => ErrorKind::BackendFailure,
            ConvertError::Image { .. }
            | ConvertError::Io { .. }
            | ConvertError::InvalidConfig(_)
            | ConvertError::Internal(_) => ErrorKind::Unknown,
        }
    }

    /// Diagnostic detail for logs. Same text as `Display`.
    pub fn detail(&self) -> String {
        self.to_string()
    }
}

impl From<image::ImageError> for ConvertError {
    fn from(e: image::ImageError) -> Self {
        match e {
            image::ImageError::Unsupported(u) => ConvertError::UnsupportedFormat {
                mime: "image".into(),
                target: u.to_string(),
            },
            other => ConvertError::Image {
                detail: other.to_string(),
            },
        }
    }
}

/// Failure categories surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    FileTooLarge,
    FileUnreadable,
    UnsafeFileType,
    UnsupportedFormat,
    Timeout,
    BackendFailure,
    Unknown,
}

impl ErrorKind {
    /// Stable machine-readable code.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::FileTooLarge => "file_too_large",
            ErrorKind::FileUnreadable => "file_unreadable",
            ErrorKind::UnsafeFileType => "unsafe_file_type",
            ErrorKind::UnsupportedFormat => "unsupported_format",
            ErrorKind::Timeout => "timeout",
            ErrorKind::BackendFailure => "backend_failure",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Short English message free of paths and backend output.
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorKind::FileTooLarge => "The file is too large (maximum 20 MB).",
            ErrorKind::FileUnreadable => "The file could not be read. Please send it again.",
            ErrorKind::UnsafeFileType => "This file type is not allowed.",
            ErrorKind::UnsupportedFormat => "This conversion is not supported.",
            ErrorKind::Timeout => "The conversion took too long and was stopped.",
            ErrorKind::BackendFailure => "The converter could not process this file.",
            ErrorKind::Unknown => "Something went wrong during conversion.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
