//! Document transcode pipeline: office formats → PDF through LibreOffice.
//!
//! The whole input is read into memory and handed to the backend once.
//! Whichever resolves first, the backend or the timer, decides the outcome;
//! there is no retry.

use crate::error::ConvertError;
use crate::pipeline::backend::{probe, run_command, BackendError, OfficeConverter};
use crate::pipeline::scratch;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Targets the office backend is asked to produce.
const TARGETS: &[&str] = &["pdf"];

pub fn supports_target(target: &str) -> bool {
    TARGETS.contains(&target)
}

/// The default office backend: headless `soffice --convert-to`.
#[derive(Debug, Clone)]
pub struct SofficeConverter {
    program: PathBuf,
}

impl SofficeConverter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Whether the configured soffice runs.
    pub async fn probe(&self) -> bool {
        probe(&self.program, "--version").await
    }
}

impl Default for SofficeConverter {
    fn default() -> Self {
        Self::new("soffice")
    }
}

#[async_trait]
impl OfficeConverter for SofficeConverter {
    fn name(&self) -> &str {
        "soffice"
    }

    async fn convert(
        &self,
        document: Vec<u8>,
        source_ext: &str,
        target: &str,
    ) -> Result<Vec<u8>, BackendError> {
        // Private working dir: removed on drop, including when this future
        // is dropped by a timeout.
        let work = tempfile::Builder::new()
            .prefix("fileconv-office-")
            .tempdir()
            .map_err(|e| BackendError::Output(format!("temp dir: {e}")))?;
        let input = work.path().join(format!("source.{source_ext}"));
        tokio::fs::write(&input, &document)
            .await
            .map_err(|e| BackendError::Output(format!("stage input: {e}")))?;

        // A per-call profile dir lets concurrent conversions run side by side.
        let profile_url = user_installation_arg(&work.path().join("profile"))?;

        let mut cmd = Command::new(&self.program);
        cmd.arg(profile_url)
            .args(["--headless", "--norestore", "--convert-to", target, "--outdir"])
            .arg(work.path())
            .arg(&input);
        run_command(cmd, "soffice").await?;

        let produced = work.path().join(format!("source.{target}"));
        tokio::fs::read(&produced)
            .await
            .map_err(|e| BackendError::Output(format!("soffice produced no {target}: {e}")))
    }
}

/// `-env:UserInstallation=<file URL>` for a profile directory. The path is
/// percent-encoded, so spaces or `%` in `TMPDIR` are safe.
fn user_installation_arg(profile: &Path) -> Result<String, BackendError> {
    let url = url::Url::from_directory_path(profile).map_err(|_| {
        BackendError::Output(format!(
            "profile dir {} is not an absolute path",
            profile.display()
        ))
    })?;
    Ok(format!("-env:UserInstallation={url}"))
}

/// Convert `input` to `target` at `output` under `limit`.
pub async fn transcode(
    backend: &dyn OfficeConverter,
    input: &Path,
    source_ext: &str,
    output: &Path,
    target: &str,
    limit: Duration,
) -> Result<(), ConvertError> {
    if !supports_target(target) {
        return Err(ConvertError::UnsupportedFormat {
            mime: source_ext.to_string(),
            target: target.to_string(),
        });
    }

    let start = Instant::now();
    let document = tokio::fs::read(input)
        .await
        .map_err(|source| ConvertError::FileUnreadable {
            path: input.to_path_buf(),
            source,
        })?;
    debug!(
        "{}: {} bytes of .{} → {}",
        backend.name(),
        document.len(),
        source_ext,
        target
    );

    let converted = match tokio::time::timeout(limit, backend.convert(document, source_ext, target)).await
    {
        Ok(Ok(bytes)) if !bytes.is_empty() => bytes,
        Ok(Ok(_)) => {
            return Err(ConvertError::BackendFailure {
                backend: backend.name().to_string(),
                message: "backend returned an empty document".into(),
            })
        }
        Ok(Err(e)) => {
            scratch::remove(output).await;
            return Err(e.into_convert_error(backend.name()));
        }
        Err(_) => {
            warn!(
                "{} exceeded {}s on {}; abandoned",
                backend.name(),
                limit.as_secs(),
                input.display()
            );
            scratch::remove(output).await;
            return Err(ConvertError::Timeout {
                stage: "document",
                secs: limit.as_secs(),
            });
        }
    };

    if let Err(e) = tokio::fs::write(output, &converted).await {
        scratch::remove(output).await;
        return Err(ConvertError::io(
            format!("write {}", output.display()),
            e,
        ));
    }
    info!(
        "{} produced {} bytes in {}ms",
        backend.name(),
        converted.len(),
        start.elapsed().as_millis()
    );
    Ok(())
}
