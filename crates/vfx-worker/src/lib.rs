//! Transition render worker.
//!
//! This crate provides:
//! - The render coordinator driving normalize, concat, rasterize and composite
//! - Job bookkeeping: stages, leased workers, aggregate progress
//! - Render error taxonomy and configuration
//! - Manifest loading for the `vfx-render` command line tool

pub mod config;
pub mod coordinator;
pub mod error;
pub mod job;
pub mod logging;
pub mod manifest;
pub mod metrics;

pub use config::WorkerConfig;
pub use coordinator::{RenderCoordinator, RenderRequest};
pub use error::{RenderError, RenderResult};
pub use job::{ProgressCallback, ProgressTracker, RenderJob, WorkerLease};
pub use logging::JobLogger;
pub use manifest::{load_transition, ClipEntry, RecolorRule, RenderManifest, TransitionEntry, TrimSpec};
