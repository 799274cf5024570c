//! Format catalog: MIME → short token, and which targets each source
//! category may reach.
//!
//! This table is the single source of truth for the safety validator and
//! for any menu the caller builds. Every target listed for a category must
//! have an encoder branch in the matching pipeline; `tests::every_target_has_a_branch`
//! keeps the two in lockstep.
//!
//! | Category | Allowed targets                     |
//! |----------|-------------------------------------|
//! | image    | jpg, jpeg, png, webp, gif, pdf      |
//! | video    | mp3, mp4, gif                       |
//! | audio    | mp3                                 |
//! | document | pdf                                 |

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Source category, derived from the declared MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Image,
    Video,
    Audio,
    Document,
}

impl Category {
    /// Target tokens reachable from this category.
    pub fn targets(self) -> &'static [&'static str] {
        match self {
            Category::Image => &["jpg", "jpeg", "png", "webp", "gif", "pdf"],
            Category::Video => &["mp3", "mp4", "gif"],
            Category::Audio => &["mp3"],
            Category::Document => &["pdf"],
        }
    }

    pub fn allows(self, target: &str) -> bool {
        self.targets().contains(&target)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::Image => "image",
            Category::Video => "video",
            Category::Audio => "audio",
            Category::Document => "document",
        };
        f.write_str(s)
    }
}

/// (MIME, canonical token). The first entry for a token is its preferred MIME.
const MIME_TABLE: &[(&str, &str)] = &[
    // Images
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/pjpeg", "jpg"),
    ("image/png", "png"),
    ("image/webp", "webp"),
    ("image/gif", "gif"),
    ("image/bmp", "bmp"),
    ("image/x-ms-bmp", "bmp"),
    ("image/tiff", "tiff"),
    // Video
    ("video/mp4", "mp4"),
    ("video/quicktime", "mov"),
    ("video/x-matroska", "mkv"),
    ("video/webm", "webm"),
    ("video/x-msvideo", "avi"),
    ("video/mpeg", "mpeg"),
    ("video/3gpp", "3gp"),
    // Audio
    ("audio/mpeg", "mp3"),
    ("audio/mp3", "mp3"),
    ("audio/ogg", "ogg"),
    ("audio/opus", "opus"),
    ("audio/wav", "wav"),
    ("audio/x-wav", "wav"),
    ("audio/flac", "flac"),
    ("audio/x-flac", "flac"),
    ("audio/mp4", "m4a"),
    ("audio/x-m4a", "m4a"),
    ("audio/aac", "aac"),
    // Documents
    ("application/pdf", "pdf"),
    ("application/msword", "doc"),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "docx",
    ),
    ("application/vnd.oasis.opendocument.text", "odt"),
    ("application/rtf", "rtf"),
    ("text/rtf", "rtf"),
    ("application/vnd.ms-excel", "xls"),
    (
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xlsx",
    ),
    ("application/vnd.oasis.opendocument.spreadsheet", "ods"),
    ("application/vnd.ms-powerpoint", "ppt"),
    (
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "pptx",
    ),
    ("application/vnd.oasis.opendocument.presentation", "odp"),
    ("text/plain", "txt"),
];

/// Exact MIME types converted by the office backend.
const DOCUMENT_MIMES: &[&str] = &[
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.oasis.opendocument.text",
    "application/rtf",
    "text/rtf",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.oasis.opendocument.spreadsheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/vnd.oasis.opendocument.presentation",
    "text/plain",
];

static FORMAT_BY_MIME: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| MIME_TABLE.iter().copied().collect());

static MIME_BY_FORMAT: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for &(mime, token) in MIME_TABLE {
        map.entry(token).or_insert(mime);
    }
    map.insert("jpeg", "image/jpeg");
    map
});

/// Lower-cased MIME essence without parameters
/// (`"Text/Plain; charset=UTF-8"` → `"text/plain"`).
pub fn essence(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Categorize a declared MIME type. `None` means "not convertible".
pub fn category_of(mime: &str) -> Option<Category> {
    let mime = essence(mime);
    if mime.starts_with("image/") {
        Some(Category::Image)
    } else if mime.starts_with("video/") {
        Some(Category::Video)
    } else if mime.starts_with("audio/") {
        Some(Category::Audio)
    } else if DOCUMENT_MIMES.contains(&mime.as_str()) {
        Some(Category::Document)
    } else {
        None
    }
}

/// Canonical short token for a MIME type (`"image/jpeg"` → `"jpg"`).
pub fn format_for_mime(mime: &str) -> Option<&'static str> {
    FORMAT_BY_MIME.get(essence(mime).as_str()).copied()
}

/// Preferred MIME type for a target token (`"jpeg"` → `"image/jpeg"`).
pub fn mime_for_token(token: &str) -> Option<&'static str> {
    MIME_BY_FORMAT.get(token).copied()
}

/// Targets a caller should offer for this MIME type; empty when the
/// category is unknown.
pub fn targets_for(mime: &str) -> &'static [&'static str] {
    category_of(mime).map(Category::targets).unwrap_or(&[])
}
