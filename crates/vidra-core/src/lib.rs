//! Vidra Core Library
//!
//! This crate provides the domain models, video lifecycle state machine,
//! error types, configuration, and repository traits shared across all
//! Vidra components.

pub mod config;
pub mod error;
pub mod events;
pub mod job_error;
pub mod models;
pub mod repository;
pub mod state;

// Re-export commonly used types
pub use config::{Config, SigningStrategy};
pub use error::AppError;
pub use events::{EventSink, NoopEventSink, VideoEvent};
pub use job_error::{JobError, JobResultExt};
pub use repository::{InMemoryVideoRepository, VideoRepository};
pub use state::{assert_ready_invariant, StateTransitionError};
