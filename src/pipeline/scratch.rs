//! Scratch storage: per-request file names and best-effort cleanup.
//!
//! The scratch directory is the only process-wide state. It is created
//! idempotently and never torn down here; only individual files come and go.
//! Names embed the owner, a millisecond timestamp and a random UUID so
//! concurrent requests never collide.

use crate::error::ConvertError;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Create the scratch directory if it does not exist yet.
pub async fn ensure_scratch_dir(dir: &Path) -> Result<(), ConvertError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| ConvertError::io(format!("create scratch dir {}", dir.display()), e))
}

/// A fresh, unique path `<dir>/<owner>_<millis>_<uuid>.<ext>`.
///
/// `owner` is reduced to `[A-Za-z0-9_-]` so it cannot escape `dir`.
pub fn output_path(dir: &Path, owner: &str, ext: &str) -> PathBuf {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let owner: String = owner
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .take(64)
        .collect();
    let owner = if owner.is_empty() { "anon".to_string() } else { owner };
    let id = uuid::Uuid::new_v4().simple();
    dir.join(format!("{owner}_{millis}_{id}.{ext}"))
}

/// Remove a scratch file. Never fails: a missing file is fine and any other
/// error is logged and swallowed.
pub async fn remove(path: impl AsRef<Path>) {
    let path = path.as_ref();
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {}", path.display(), e),
    }
}

/// Blocking variant of [`remove`] for drop guards and worker threads.
pub fn remove_blocking(path: impl AsRef<Path>) {
    let path = path.as_ref();
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {}", path.display(), e),
    }
}

/// Owns a scratch path and removes it on drop unless [`ScratchFile::keep`]
/// was called.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    keep: bool,
}

impl ScratchFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path, keep: false }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Disarm the guard and hand the path over.
    pub fn keep(mut self) -> PathBuf {
        self.keep = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if !self.keep {
            remove_blocking(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_paths_are_unique_and_namespaced() {
        let dir = Path::new("/scratch");
        let a = output_path(dir, "user42", "png");
        let b = output_path(dir, "user42", "png");
        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(dir));
        let name = a.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("user42_"), "got {name}");
        assert!(name.ends_with(".png"));
    }

    #[test]
    fn owner_cannot_escape_dir() {
        let p = output_path(Path::new("/scratch"), "../../etc/passwd", "pdf");
        assert_eq!(p.parent(), Some(Path::new("/scratch")));
        let p = output_path(Path::new("/scratch"), "", "pdf");
        assert!(p.file_name().unwrap().to_str().unwrap().starts_with("anon_"));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("x.bin");
        std::fs::write(&p, b"x").unwrap();
        remove(&p).await;
        assert!(!p.exists());
        remove(&p).await;
        remove(dir.path().join("never-existed")).await;
        remove_blocking(&p);
    }

    #[tokio::test]
    async fn ensure_scratch_dir_twice() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        ensure_scratch_dir(&nested).await.unwrap();
        ensure_scratch_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn guard_removes_unless_kept() {
        let dir = tempfile::tempdir().unwrap();
        let dropped = dir.path().join("dropped");
        let kept = dir.path().join("kept");
        std::fs::write(&dropped, b"1").unwrap();
        std::fs::write(&kept, b"2").unwrap();
        drop(ScratchFile::new(dropped.clone()));
        let out = ScratchFile::new(kept.clone()).keep();
        assert!(!dropped.exists());
        assert!(kept.exists());
        assert_eq!(out, kept);
    }
}
