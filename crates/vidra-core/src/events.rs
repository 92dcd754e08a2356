//! Lifecycle and security event sink
//!
//! Components notify an [`EventSink`] of lifecycle and access-control events.
//! Delivery is fire-and-forget: control flow never blocks on, or fails
//! because of, event emission. The analytics layer implements this trait.

use async_trait::async_trait;
use uuid::Uuid;

/// Event emitted by the pipeline and the access control engine.
#[derive(Debug, Clone)]
pub enum VideoEvent {
    ProcessingStarted {
        video_id: Uuid,
        attempt: u32,
    },
    ProcessingCompleted {
        video_id: Uuid,
        completed_variants: usize,
    },
    ProcessingFailed {
        video_id: Uuid,
        errors: Vec<String>,
    },
    AccessGranted {
        video_id: Uuid,
        requester: Option<Uuid>,
    },
    AccessDenied {
        video_id: Uuid,
        requester: Option<Uuid>,
        reason: String,
    },
    VideoDeleted {
        video_id: Uuid,
    },
}

#[async_trait]
pub trait EventSink: Send + Sync {
    /// Record an event. Implementations must not block the caller for long;
    /// callers ignore the result.
    async fn record(&self, event: VideoEvent);
}

/// No-op sink for when analytics is disabled.
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn record(&self, _event: VideoEvent) {}
}

/// Sink that logs events through tracing; useful as a default and in tests.
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn record(&self, event: VideoEvent) {
        tracing::info!(?event, "video event");
    }
}
