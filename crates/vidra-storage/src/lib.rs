//! Vidra Storage Library
//!
//! Object-store abstraction plus the Storage/CDN gateway: artifact publishing,
//! deletion with CDN invalidation, and signed-URL issuance.
//!
//! # Storage key format
//!
//! All artifacts for a video live under `videos/{video_id}/`:
//!
//! - source and video-level artifacts: `videos/{video_id}/{name}`
//! - per-quality artifacts: `videos/{video_id}/{quality}/{name}`
//!
//! Keys must not contain `..` or a leading `/`. Key generation is centralized
//! in the `keys` module so all backends and the gateway stay consistent.

pub mod gateway;
pub mod keys;
pub mod local;
pub mod memory;
pub mod signer;
pub mod traits;

// Re-export commonly used types
pub use gateway::{CdnGateway, PublishedArtifact};
pub use keys::artifact_key;
pub use local::LocalObjectStore;
pub use memory::InMemoryObjectStore;
pub use signer::{HmacUrlSigner, PolicyUrlSigner, SignedUrlOptions, UrlSigner};
pub use traits::{ObjectStore, StorageError, StorageResult};
