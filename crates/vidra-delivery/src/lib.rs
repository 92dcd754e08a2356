//! Vidra Delivery Library
//!
//! Policy side of playback: the ordered access control engine, per-video DRM
//! configuration, and the directory traits the engine consults for account
//! status and course enrollment.

pub mod access;
pub mod directory;
pub mod drm;

pub use access::{AccessContext, AccessControlEngine, AccessDecision};
pub use directory::{
    EnrollmentChecker, InMemoryDirectory, UserDirectory,
};
pub use drm::{DrmConfig, DrmProvider};
