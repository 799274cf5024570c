//! External backend plumbing: capability traits and the subprocess runner.
//!
//! Backends are opaque capability providers. The pipelines own the
//! wall-clock limit: they race the backend future against
//! `tokio::time::timeout` and drop it on expiry. Every subprocess is spawned
//! in its own process group with `kill_on_drop(true)`; dropping the future
//! kills the child and then the whole group, so a timed-out ffmpeg or
//! soffice (which forks `oosplash` and `soffice.bin`) never outlives its
//! request.

use crate::error::ConvertError;
use crate::pipeline::media::MediaParams;
use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::Path;
use std::process::{Output, Stdio};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Keep this much of a backend's stderr in error details.
const STDERR_TAIL_BYTES: usize = 2000;

/// Failure reported by a backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The executable could not be started.
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran and exited unsuccessfully.
    #[error("{program} exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: String,
        stderr: String,
    },

    /// The process succeeded but its result is unusable.
    #[error("{0}")]
    Output(String),
}

impl BackendError {
    pub(crate) fn into_convert_error(self, backend: &str) -> ConvertError {
        ConvertError::BackendFailure {
            backend: backend.to_string(),
            message: self.to_string(),
        }
    }
}

/// Audio/video transcoding capability.
#[async_trait]
pub trait MediaTranscoder: Send + Sync {
    /// Short name used in logs and error details.
    fn name(&self) -> &str;

    /// Transcode `input` into `output` according to `params`.
    ///
    /// May leave a partial `output` behind on failure; the pipeline removes it.
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        params: &MediaParams,
    ) -> Result<(), BackendError>;
}

/// Office-document conversion capability.
#[async_trait]
pub trait OfficeConverter: Send + Sync {
    fn name(&self) -> &str;

    /// Convert an in-memory document whose usual extension is `source_ext`
    /// to `target` (e.g. `"pdf"`), returning the converted bytes.
    async fn convert(
        &self,
        document: Vec<u8>,
        source_ext: &str,
        target: &str,
    ) -> Result<Vec<u8>, BackendError>;
}

/// Run `cmd` to completion, capturing output.
///
/// The child and everything it forked are killed if the returned future is
/// dropped before it resolves. Stragglers left in the group after a normal
/// exit are killed too.
pub async fn run_command(mut cmd: Command, program: &str) -> Result<Output, BackendError> {
    cmd.kill_on_drop(true)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    cmd.process_group(0);
    debug!("Running {:?}", cmd.as_std());

    let child = cmd.spawn().map_err(|source| BackendError::Spawn {
        program: program.to_string(),
        source,
    })?;
    let _group = GroupKill(child.id());

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| BackendError::Output(format!("waiting for {program}: {e}")))?;

    if !output.status.success() {
        return Err(BackendError::Exit {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: stderr_tail(&output.stderr),
        });
    }
    Ok(output)
}

/// Sends SIGKILL to a backend's process group when dropped.
///
/// The group id is the leader's pid (`process_group(0)`).
struct GroupKill(Option<u32>);

impl Drop for GroupKill {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            if let Some(pgid) = self.0.and_then(|p| libc::pid_t::try_from(p).ok()) {
                // SAFETY: killpg takes plain integers and touches no memory.
                let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
                if rc == 0 {
                    debug!("Killed process group {}", pgid);
                }
            }
        }
        #[cfg(not(unix))]
        let _ = self.0;
    }
}

/// Whether `program` runs and exits 0 with `version_flag`.
pub async fn probe(program: impl AsRef<OsStr>, version_flag: &str) -> bool {
    let mut cmd = Command::new(program);
    cmd.arg(version_flag);
    run_command(cmd, "probe").await.is_ok()
}

/// The last [`STDERR_TAIL_BYTES`] of stderr, trimmed, lossily decoded.
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_TAIL_BYTES {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_TAIL_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("…{}", &text[start..])
}
