//! Shared key generation for storage backends.
//!
//! Key format: `videos/{video_id}/{artifact}` for video-level artifacts,
//! `videos/{video_id}/{quality}/{artifact}` for per-quality artifacts.

use uuid::Uuid;

/// Deterministic storage key for a video artifact.
///
/// The same (video, quality, name) always produces the same key, which is
/// what makes artifact publishing idempotent under job retries.
pub fn artifact_key(video_id: Uuid, quality: Option<&str>, name: &str) -> String {
    match quality {
        Some(quality) => format!("videos/{}/{}/{}", video_id, quality, name),
        None => format!("videos/{}/{}", video_id, name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_scheme_is_deterministic() {
        let id = Uuid::new_v4();
        assert_eq!(
            artifact_key(id, Some("720p"), "720p.mp4"),
            format!("videos/{}/720p/720p.mp4", id)
        );
        assert_eq!(
            artifact_key(id, None, "source"),
            format!("videos/{}/source", id)
        );
        assert_eq!(
            artifact_key(id, Some("720p"), "720p.mp4"),
            artifact_key(id, Some("720p"), "720p.mp4")
        );
    }
}
