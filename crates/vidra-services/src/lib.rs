//! Vidra Services Library
//!
//! Application-level services: the video service (intake, streaming info,
//! deletion, archival), the job dispatch context bridging the worker pool to
//! the processing pipeline, and orphaned-artifact cleanup.

pub mod cleanup;
pub mod dispatch;
pub mod telemetry;
pub mod video_service;

pub use cleanup::{CleanupService, OrphanRegistry};
pub use dispatch::ServiceContext;
pub use telemetry::init_telemetry;
pub use video_service::{StreamingInfo, VariantUrl, VideoService};
