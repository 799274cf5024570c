//! Safety validator: size ceiling, dangerous-type deny-list, allow-list.
//!
//! All three checks run before any output path is allocated or any process
//! is spawned. The deny-list is a filename/MIME check only; the declared MIME
//! is trusted for categorization everywhere else.

use crate::catalog::{self, essence};
use crate::error::ConvertError;
use std::path::Path;
use tracing::debug;

/// Executable and script extensions rejected regardless of declared MIME.
const BLOCKED_EXTENSIONS: &[&str] = &[
    "exe", "com", "bat", "cmd", "sh", "bash", "zsh", "ps1", "psm1", "vbs", "vbe", "js", "jse",
    "mjs", "wsf", "wsh", "hta", "jar", "msi", "msp", "scr", "pif", "cpl", "dll", "so", "dylib",
    "app", "apk", "deb", "rpm", "run", "elf", "reg", "lnk", "py", "pl", "rb", "php",
];

/// Declared MIME types naming executables or scripts.
const BLOCKED_MIMES: &[&str] = &[
    "application/x-msdownload",
    "application/x-msdos-program",
    "application/x-dosexec",
    "application/vnd.microsoft.portable-executable",
    "application/x-executable",
    "application/x-elf",
    "application/x-sharedlib",
    "application/x-mach-binary",
    "application/x-sh",
    "application/x-shellscript",
    "application/x-bat",
    "application/x-msi",
    "application/x-ms-installer",
    "application/java-archive",
    "application/x-java-archive",
    "application/javascript",
    "application/x-javascript",
    "text/javascript",
    "application/x-python-code",
    "text/x-python",
    "text/x-shellscript",
    "application/x-php",
    "application/vnd.android.package-archive",
];

/// Measure the file and reject it above `limit` bytes.
///
/// Returns the measured size. A failing `stat` is reported as
/// [`ConvertError::FileUnreadable`], never as a size failure.
pub async fn check_size(path: &Path, limit: u64) -> Result<u64, ConvertError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|source| ConvertError::FileUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
    if !meta.is_file() {
        return Err(ConvertError::FileUnreadable {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
        });
    }
    let size = meta.len();
    debug!("Input {} is {} bytes", path.display(), size);
    if size > limit {
        return Err(ConvertError::FileTooLarge {
            path: path.to_path_buf(),
            size,
            limit,
        });
    }
    Ok(size)
}

/// `false` if the path's extension, the display name's extension or the
/// declared MIME is on a deny-list.
pub fn check_safety(mime: &str, path: &Path, display_name: Option<&str>) -> bool {
    let blocked_ext = |p: &Path| {
        p.extension()
            .and_then(|e| e.to_str())
            .map(|e| BLOCKED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    };
    if blocked_ext(path) {
        return false;
    }
    if let Some(name) = display_name {
        if blocked_ext(Path::new(name)) {
            return false;
        }
    }
    !BLOCKED_MIMES.contains(&essence(mime).as_str())
}

/// Whether `target` is reachable from the category of `mime`.
pub fn is_allowed(mime: &str, target: &str) -> bool {
    catalog::category_of(mime)
        .map(|c| c.allows(target))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn size_within_limit_passes() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&[0u8; 100]).unwrap();
        assert_eq!(check_size(f.path(), 100).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn size_over_limit_fails_with_measured_size() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&[0u8; 101]).unwrap();
        match check_size(f.path(), 100).await {
            Err(ConvertError::FileTooLarge { size, limit, .. }) => {
                assert_eq!(size, 101);
                assert_eq!(limit, 100);
            }
            other => panic!("expected FileTooLarge, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_file_is_unreadable_not_too_large() {
        let err = check_size(Path::new("/definitely/not/here.png"), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::FileUnreadable { .. }));
    }

    #[tokio::test]
    async fn directory_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let err = check_size(dir.path(), 10).await.unwrap_err();
        assert!(matches!(err, ConvertError::FileUnreadable { .. }));
    }

    #[test]
    fn exe_rejected_even_with_image_mime() {
        assert!(!check_safety("image/png", Path::new("/tmp/photo.exe"), None));
        assert!(!check_safety("image/png", Path::new("/tmp/photo.EXE"), None));
    }

    #[test]
    fn display_name_extension_is_checked() {
        assert!(!check_safety(
            "application/pdf",
            Path::new("/tmp/42_1700000000000.bin.upload"),
            Some("invoice.pdf.bat")
        ));
    }

    #[test]
    fn script_mime_rejected() {
        assert!(!check_safety("application/x-sh", Path::new("/tmp/a.txt"), None));
        assert!(!check_safety(
            "Application/JavaScript; charset=utf-8",
            Path::new("/tmp/a.txt"),
            None
        ));
    }

    #[test]
    fn ordinary_files_pass() {
        assert!(check_safety("image/jpeg", Path::new("/tmp/cat.jpg"), Some("cat.jpg")));
        assert!(check_safety("video/mp4", Path::new("/tmp/clip"), None));
    }

    #[test]
    fn allow_list() {
        assert!(is_allowed("image/png", "pdf"));
        assert!(is_allowed("video/quicktime", "gif"));
        assert!(is_allowed("audio/ogg", "mp3"));
        assert!(is_allowed("application/msword", "pdf"));
        assert!(!is_allowed("audio/ogg", "mp4"));
        assert!(!is_allowed("image/png", "mp3"));
        assert!(!is_allowed("application/zip", "pdf"));
    }
}
