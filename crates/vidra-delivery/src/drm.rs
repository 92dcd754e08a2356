//! Per-video DRM configuration.
//!
//! Key ids are derived deterministically from the video id and a platform
//! secret, so the same video always resolves to the same key without storing
//! key material per record. A video with DRM enabled but no usable platform
//! configuration is a configuration error, not a silent fallthrough to
//! unprotected delivery.

use sha2::{Digest, Sha256};

use vidra_core::models::Video;
use vidra_core::AppError;

const DEFAULT_PROVIDER: &str = "widevine";

/// DRM parameters handed to the player for one video.
#[derive(Debug, Clone, PartialEq)]
pub struct DrmConfig {
    pub provider: String,
    /// Hex-encoded deterministic key id.
    pub key_id: String,
    pub license_url: String,
    /// FairPlay needs an application certificate; other providers do not.
    pub certificate_url: Option<String>,
}

pub struct DrmProvider {
    secret: String,
    license_url: String,
    certificate_url: Option<String>,
}

impl DrmProvider {
    pub fn new(secret: String, license_url: String, certificate_url: Option<String>) -> Self {
        Self {
            secret,
            license_url,
            certificate_url,
        }
    }

    /// Resolve the DRM configuration for `video`.
    ///
    /// Returns `None` when the video does not use DRM, and a configuration
    /// error when it does but the platform secret or license URL is missing.
    pub fn config_for(&self, video: &Video) -> Result<Option<DrmConfig>, AppError> {
        if !video.security.drm_enabled {
            return Ok(None);
        }
        if self.secret.is_empty() || self.license_url.is_empty() {
            return Err(AppError::Configuration(
                "DRM is enabled but the platform has no DRM secret or license URL".into(),
            ));
        }

        let mut hasher = Sha256::new();
        hasher.update(video.id.as_bytes());
        hasher.update(self.secret.as_bytes());
        let key_id = hex::encode(hasher.finalize());

        Ok(Some(DrmConfig {
            provider: video
                .security
                .drm_provider
                .clone()
                .unwrap_or_else(|| DEFAULT_PROVIDER.to_string()),
            key_id,
            license_url: self.license_url.clone(),
            certificate_url: self.certificate_url.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use vidra_core::models::Visibility;

    fn drm_video() -> Video {
        let mut video = Video::new("t".into(), Visibility::Public, Uuid::new_v4());
        video.security.drm_enabled = true;
        video
    }

    fn provider() -> DrmProvider {
        DrmProvider::new(
            "platform-secret".into(),
            "https://license.vidra.local/v1".into(),
            None,
        )
    }

    #[test]
    fn disabled_drm_yields_none() {
        let video = Video::new("t".into(), Visibility::Public, Uuid::new_v4());
        assert_eq!(provider().config_for(&video).unwrap(), None);
    }

    #[test]
    fn key_id_is_deterministic_per_video() {
        let video = drm_video();
        let a = provider().config_for(&video).unwrap().unwrap();
        let b = provider().config_for(&video).unwrap().unwrap();
        assert_eq!(a.key_id, b.key_id);
        assert_eq!(a.key_id.len(), 64);
        assert_eq!(a.provider, "widevine");

        let other = provider().config_for(&drm_video()).unwrap().unwrap();
        assert_ne!(a.key_id, other.key_id);
    }

    #[test]
    fn explicit_provider_is_kept() {
        let mut video = drm_video();
        video.security.drm_provider = Some("fairplay".into());
        let config = provider().config_for(&video).unwrap().unwrap();
        assert_eq!(config.provider, "fairplay");
    }

    #[test]
    fn missing_platform_config_is_an_error() {
        let video = drm_video();
        let unconfigured = DrmProvider::new(String::new(), String::new(), None);
        let err = unconfigured.config_for(&video).unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }
}
