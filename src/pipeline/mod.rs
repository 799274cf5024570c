//! Pipeline stages for file conversion.
//!
//! Each submodule owns one concern so it can be tested on its own and a
//! backend can be swapped without touching the router.
//!
//! ## Data Flow
//!
//! ```text
//! safety ──▶ image    (in-process, blocking pool, 30 s outer limit)
//!        ├─▶ media    (ffmpeg subprocess, 120 s, killed on expiry)
//!        └─▶ document (soffice subprocess, 120 s, killed on expiry)
//! ```
//!
//! 1. [`safety`]: size ceiling, deny-list, allow-list
//! 2. [`image`]: orient, strip, fit, encode; [`pdf`] wraps a JPEG in a
//!    one-page PDF
//! 3. [`media`]: ffmpeg parameter sets and the timed media job
//! 4. [`document`]: office → PDF through LibreOffice
//! 5. [`backend`]: capability traits and the kill-on-drop process runner
//! 6. [`scratch`]: unique scratch paths and never-failing cleanup

pub mod backend;
pub mod document;
pub mod image;
pub mod media;
pub mod pdf;
pub mod safety;
pub mod scratch;
