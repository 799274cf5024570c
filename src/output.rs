//! Request and result types.
//!
//! [`PendingInput`] describes a file the caller already staged in scratch
//! storage; [`ConversionRequest`] pairs it with a target token; a finished
//! conversion is an [`Artifact`]. The caller owns every path on both sides and
//! is responsible for handing them to [`crate::pipeline::scratch::remove`]
//! once the artifact has been delivered.

use crate::error::ConvertError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// An uploaded file staged in scratch storage. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInput {
    path: PathBuf,
    mime: String,
    display_name: Option<String>,
    declared_size: Option<u64>,
}

impl PendingInput {
    pub fn new(path: impl Into<PathBuf>, mime: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mime: mime.into(),
            display_name: None,
            declared_size: None,
        }
    }

    /// Original file name as sent by the user.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Size reported by the upload channel. Informational only; the size
    /// check always measures the file.
    pub fn with_declared_size(mut self, size: u64) -> Self {
        self.declared_size = Some(size);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn declared_size(&self) -> Option<u64> {
        self.declared_size
    }
}

/// One user action: convert `input` to `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub input: PendingInput,
    /// Normalized target token (lower-case, no leading dot).
    pub target: String,
    /// Prefix for scratch file names, typically the user id.
    pub owner: String,
}

impl ConversionRequest {
    pub fn new(input: PendingInput, target: impl AsRef<str>) -> Self {
        Self {
            input,
            target: normalize_format(target.as_ref()),
            owner: "anon".to_string(),
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }
}

/// Lower-case a requested format token and strip surrounding whitespace and
/// any leading dots (`".PNG"` → `"png"`).
pub fn normalize_format(raw: &str) -> String {
    raw.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// A finished conversion. The file at `path` now belongs to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: PathBuf,
    /// Target token the artifact was encoded as.
    pub format: String,
    pub size_bytes: u64,
    pub duration_ms: u64,
}

/// Either one artifact or one classified failure.
pub type ConversionOutcome = Result<Artifact, ConvertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_dot_and_case() {
        assert_eq!(normalize_format(".PNG"), "png");
        assert_eq!(normalize_format("  Jpeg "), "jpeg");
        assert_eq!(normalize_format("..mp3"), "mp3");
        assert_eq!(normalize_format("pdf"), "pdf");
    }

    #[test]
    fn request_normalizes_target() {
        let req = ConversionRequest::new(PendingInput::new("/tmp/a.png", "image/png"), ".WebP");
        assert_eq!(req.target, "webp");
        assert_eq!(req.owner, "anon");
        assert_eq!(req.with_owner("42").owner, "42");
    }

    #[test]
    fn pending_input_accessors() {
        let input = PendingInput::new("/tmp/x.docx", "application/msword")
            .with_display_name("report.docx")
            .with_declared_size(1234);
        assert_eq!(input.path(), Path::new("/tmp/x.docx"));
        assert_eq!(input.mime(), "application/msword");
        assert_eq!(input.display_name(), Some("report.docx"));
        assert_eq!(input.declared_size(), Some(1234));
    }
}
