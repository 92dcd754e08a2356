//! Video lifecycle state machine
//!
//! Legal transitions:
//! `UPLOADING → PROCESSING → {READY, FAILED}`; `READY → ARCHIVED`;
//! `FAILED → PROCESSING` (bounded retry). No transition skips PROCESSING.
//! The orchestrator consults this machine to advance state; the access
//! control engine requires READY for delivery.

use crate::models::{Video, VideoStatus};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StateTransitionError {
    #[error("illegal video state transition: {from} -> {to}")]
    Illegal { from: VideoStatus, to: VideoStatus },
    #[error("retry attempts exhausted ({attempts}/{max_attempts})")]
    AttemptsExhausted { attempts: u32, max_attempts: u32 },
    #[error("READY requires at least one completed variant")]
    NoCompletedVariant,
}

/// Whether `from -> to` is a legal edge of the lifecycle graph.
pub fn can_transition(from: VideoStatus, to: VideoStatus) -> bool {
    use VideoStatus::*;
    matches!(
        (from, to),
        (Uploading, Processing)
            | (Processing, Ready)
            | (Processing, Failed)
            | (Ready, Archived)
            | (Failed, Processing)
    )
}

/// Advance a video to `to`, enforcing the transition graph.
///
/// `Failed -> Processing` additionally requires remaining retry budget, and
/// `-> Ready` requires at least one completed variant.
pub fn transition(
    video: &mut Video,
    to: VideoStatus,
    max_attempts: u32,
) -> Result<(), StateTransitionError> {
    let from = video.status;
    if !can_transition(from, to) {
        return Err(StateTransitionError::Illegal { from, to });
    }
    if from == VideoStatus::Failed && to == VideoStatus::Processing {
        if video.attempts >= max_attempts {
            return Err(StateTransitionError::AttemptsExhausted {
                attempts: video.attempts,
                max_attempts,
            });
        }
    }
    if to == VideoStatus::Ready {
        assert_ready_invariant(video)?;
    }
    video.status = to;
    video.updated_at = chrono::Utc::now();
    Ok(())
}

/// READY invariant: at least one quality variant in state `completed`.
pub fn assert_ready_invariant(video: &Video) -> Result<(), StateTransitionError> {
    if video.completed_variants().is_empty() {
        return Err(StateTransitionError::NoCompletedVariant);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QualityVariant, VariantStatus, Visibility};
    use uuid::Uuid;

    fn video_in(status: VideoStatus) -> Video {
        let mut v = Video::new("t".into(), Visibility::Public, Uuid::new_v4());
        v.status = status;
        v
    }

    fn completed_variant(video_id: Uuid) -> QualityVariant {
        let mut variant = QualityVariant::new(video_id, "720p", 1280, 720, 2800);
        variant.status = VariantStatus::Completed;
        variant
    }

    #[test]
    fn legal_path_uploading_to_archived() {
        let mut v = video_in(VideoStatus::Uploading);
        transition(&mut v, VideoStatus::Processing, 3).unwrap();
        let completed = completed_variant(v.id);
        v.variants.push(completed);
        transition(&mut v, VideoStatus::Ready, 3).unwrap();
        transition(&mut v, VideoStatus::Archived, 3).unwrap();
    }

    #[test]
    fn skipping_processing_is_illegal() {
        let mut v = video_in(VideoStatus::Uploading);
        let err = transition(&mut v, VideoStatus::Ready, 3).unwrap_err();
        assert_eq!(
            err,
            StateTransitionError::Illegal {
                from: VideoStatus::Uploading,
                to: VideoStatus::Ready
            }
        );
    }

    #[test]
    fn failed_retries_until_attempts_exhausted() {
        let mut v = video_in(VideoStatus::Failed);
        v.attempts = 2;
        transition(&mut v, VideoStatus::Processing, 3).unwrap();

        let mut v = video_in(VideoStatus::Failed);
        v.attempts = 3;
        let err = transition(&mut v, VideoStatus::Processing, 3).unwrap_err();
        assert_eq!(
            err,
            StateTransitionError::AttemptsExhausted {
                attempts: 3,
                max_attempts: 3
            }
        );
    }

    #[test]
    fn ready_requires_a_completed_variant() {
        let mut v = video_in(VideoStatus::Processing);
        let err = transition(&mut v, VideoStatus::Ready, 3).unwrap_err();
        assert_eq!(err, StateTransitionError::NoCompletedVariant);

        let completed = completed_variant(v.id);
        v.variants.push(completed);
        transition(&mut v, VideoStatus::Ready, 3).unwrap();
        assert_eq!(v.status, VideoStatus::Ready);
    }

    #[test]
    fn archived_is_terminal() {
        assert!(!can_transition(VideoStatus::Archived, VideoStatus::Processing));
        assert!(!can_transition(VideoStatus::Archived, VideoStatus::Ready));
    }
}
