//! Progress-callback trait for conversion state transitions.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to follow a
//! request through `Validating → Dispatching → Converting → Done | Failed`.
//! The chat layer can use it to edit a "converting…" message; the CLI drives
//! its spinner with it.
//!
//! # Example
//!
//! ```rust
//! use edgequake_fileconv::{ConversionConfig, ConversionProgressCallback, ConversionState};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl ConversionProgressCallback for Printer {
//!     fn on_state(&self, request_id: &str, state: ConversionState) {
//!         eprintln!("{request_id}: {state}");
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(Printer) as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::ErrorKind;
use crate::output::Artifact;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Router states. `Done` and `Failed` are terminal; nothing is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionState {
    Validating,
    Dispatching,
    Converting,
    Done,
    Failed,
}

impl ConversionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConversionState::Done | ConversionState::Failed)
    }
}

impl fmt::Display for ConversionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConversionState::Validating => "validating",
            ConversionState::Dispatching => "dispatching",
            ConversionState::Converting => "converting",
            ConversionState::Done => "done",
            ConversionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Called by the router as a request moves between states.
///
/// Implementations must be `Send + Sync`: independent requests run
/// concurrently and share one config. All methods default to no-ops.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called on every state transition, terminal ones included.
    fn on_state(&self, request_id: &str, state: ConversionState) {
        let _ = (request_id, state);
    }

    /// Called once after the artifact is written.
    fn on_complete(&self, request_id: &str, artifact: &Artifact) {
        let _ = (request_id, artifact);
    }

    /// Called once when the request fails.
    ///
    /// `detail` is diagnostic text; do not show it to end users.
    fn on_error(&self, request_id: &str, kind: ErrorKind, detail: &str) {
        let _ = (request_id, kind, detail);
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_state("r1", ConversionState::Validating);
        cb.on_error("r1", ErrorKind::Timeout, "slow");
    }

    #[test]
    fn only_done_and_failed_are_terminal() {
        assert!(ConversionState::Done.is_terminal());
        assert!(ConversionState::Failed.is_terminal());
        for s in [
            ConversionState::Validating,
            ConversionState::Dispatching,
            ConversionState::Converting,
        ] {
            assert!(!s.is_terminal(), "{s}");
        }
    }

    #[test]
    fn state_display() {
        assert_eq!(ConversionState::Converting.to_string(), "converting");
    }
}
