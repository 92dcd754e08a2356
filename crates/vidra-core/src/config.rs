//! Configuration module
//!
//! Env-driven configuration for the pipeline, worker pool, storage/CDN
//! gateway, URL signing, and DRM. Credentials and signing keys are read once
//! at startup and treated as read-only for the process lifetime.

use std::env;

const DEFAULT_SIGNED_URL_EXPIRY_SECS: u64 = 3600;
const DEFAULT_MAX_CONCURRENT_TRANSCODES: usize = 2;
const DEFAULT_TRANSCODE_TIMEOUT_SECS: u64 = 1800;
const DEFAULT_JOB_TIMEOUT_SECS: u64 = 3600;
const DEFAULT_JOB_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_WORKER_MAX_WORKERS: usize = 4;
const DEFAULT_WORKER_POLL_INTERVAL_MS: u64 = 500;

/// URL signing strategy for the Storage/CDN gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SigningStrategy {
    /// Platform time-limited signing: HMAC-SHA256 over key + expiry.
    Hmac,
    /// Public/private-key policy signing: base64 policy + RSA signature.
    Policy,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    // Storage / CDN
    pub local_storage_path: String,
    pub local_storage_base_url: String,
    pub cdn_domain: String,
    // URL signing
    pub signing_strategy: SigningStrategy,
    pub signing_hmac_secret: Option<String>,
    pub signing_private_key_pem: Option<String>,
    pub signing_key_pair_id: Option<String>,
    pub signed_url_expiry_secs: u64,
    // DRM
    pub drm_secret: Option<String>,
    pub drm_license_url: Option<String>,
    pub drm_certificate_url: Option<String>,
    // Processing
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub max_concurrent_transcodes: usize,
    pub transcode_timeout_secs: u64,
    pub thumbnail_offset_secs: f64,
    pub preview_duration_secs: u64,
    // Worker pool
    pub worker_max_workers: usize,
    pub worker_poll_interval_ms: u64,
    pub job_timeout_secs: u64,
    pub job_max_attempts: u32,
}

impl Config {
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let signing_strategy = match env_or("VIDRA_SIGNING_STRATEGY", "hmac").as_str() {
            "policy" => SigningStrategy::Policy,
            _ => SigningStrategy::Hmac,
        };

        let config = Self {
            environment: env_or("VIDRA_ENVIRONMENT", "development"),
            local_storage_path: env_or("VIDRA_STORAGE_PATH", "/var/lib/vidra/videos"),
            local_storage_base_url: env_or(
                "VIDRA_STORAGE_BASE_URL",
                "http://localhost:3000/videos",
            ),
            cdn_domain: env_or("VIDRA_CDN_DOMAIN", "cdn.vidra.local"),
            signing_strategy,
            signing_hmac_secret: env::var("VIDRA_SIGNING_HMAC_SECRET").ok(),
            signing_private_key_pem: env::var("VIDRA_SIGNING_PRIVATE_KEY_PEM").ok(),
            signing_key_pair_id: env::var("VIDRA_SIGNING_KEY_PAIR_ID").ok(),
            signed_url_expiry_secs: env_parse(
                "VIDRA_SIGNED_URL_EXPIRY_SECS",
                DEFAULT_SIGNED_URL_EXPIRY_SECS,
            ),
            drm_secret: env::var("VIDRA_DRM_SECRET").ok(),
            drm_license_url: env::var("VIDRA_DRM_LICENSE_URL").ok(),
            drm_certificate_url: env::var("VIDRA_DRM_CERTIFICATE_URL").ok(),
            ffmpeg_path: env_or("VIDRA_FFMPEG_PATH", "ffmpeg"),
            ffprobe_path: env_or("VIDRA_FFPROBE_PATH", "ffprobe"),
            max_concurrent_transcodes: env_parse(
                "VIDRA_MAX_CONCURRENT_TRANSCODES",
                DEFAULT_MAX_CONCURRENT_TRANSCODES,
            ),
            transcode_timeout_secs: env_parse(
                "VIDRA_TRANSCODE_TIMEOUT_SECS",
                DEFAULT_TRANSCODE_TIMEOUT_SECS,
            ),
            thumbnail_offset_secs: env_parse("VIDRA_THUMBNAIL_OFFSET_SECS", 1.0),
            preview_duration_secs: env_parse("VIDRA_PREVIEW_DURATION_SECS", 6),
            worker_max_workers: env_parse("VIDRA_WORKER_MAX_WORKERS", DEFAULT_WORKER_MAX_WORKERS),
            worker_poll_interval_ms: env_parse(
                "VIDRA_WORKER_POLL_INTERVAL_MS",
                DEFAULT_WORKER_POLL_INTERVAL_MS,
            ),
            job_timeout_secs: env_parse("VIDRA_JOB_TIMEOUT_SECS", DEFAULT_JOB_TIMEOUT_SECS),
            job_max_attempts: env_parse("VIDRA_JOB_MAX_ATTEMPTS", DEFAULT_JOB_MAX_ATTEMPTS),
        };

        Ok(config)
    }

    /// Fail fast on inconsistent configuration instead of at first use.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.cdn_domain.is_empty() {
            anyhow::bail!("VIDRA_CDN_DOMAIN must not be empty");
        }
        if self.signed_url_expiry_secs == 0 {
            anyhow::bail!("VIDRA_SIGNED_URL_EXPIRY_SECS must be positive");
        }
        match self.signing_strategy {
            SigningStrategy::Hmac => {
                if self.signing_hmac_secret.as_deref().unwrap_or("").is_empty() {
                    anyhow::bail!("hmac signing requires VIDRA_SIGNING_HMAC_SECRET");
                }
            }
            SigningStrategy::Policy => {
                if self.signing_private_key_pem.is_none() || self.signing_key_pair_id.is_none() {
                    anyhow::bail!(
                        "policy signing requires VIDRA_SIGNING_PRIVATE_KEY_PEM and VIDRA_SIGNING_KEY_PAIR_ID"
                    );
                }
            }
        }
        if self.max_concurrent_transcodes == 0 || self.worker_max_workers == 0 {
            anyhow::bail!("concurrency limits must be positive");
        }
        if self.job_max_attempts == 0 {
            anyhow::bail!("VIDRA_JOB_MAX_ATTEMPTS must be positive");
        }
        Ok(())
    }
}

impl Default for Config {
    /// Development defaults with a throwaway HMAC secret. Not for production.
    fn default() -> Self {
        Self {
            environment: "development".into(),
            local_storage_path: "/tmp/vidra/videos".into(),
            local_storage_base_url: "http://localhost:3000/videos".into(),
            cdn_domain: "cdn.vidra.local".into(),
            signing_strategy: SigningStrategy::Hmac,
            signing_hmac_secret: Some("dev-signing-secret".into()),
            signing_private_key_pem: None,
            signing_key_pair_id: None,
            signed_url_expiry_secs: DEFAULT_SIGNED_URL_EXPIRY_SECS,
            drm_secret: None,
            drm_license_url: None,
            drm_certificate_url: None,
            ffmpeg_path: "ffmpeg".into(),
            ffprobe_path: "ffprobe".into(),
            max_concurrent_transcodes: DEFAULT_MAX_CONCURRENT_TRANSCODES,
            transcode_timeout_secs: DEFAULT_TRANSCODE_TIMEOUT_SECS,
            thumbnail_offset_secs: 1.0,
            preview_duration_secs: 6,
            worker_max_workers: DEFAULT_WORKER_MAX_WORKERS,
            worker_poll_interval_ms: DEFAULT_WORKER_POLL_INTERVAL_MS,
            job_timeout_secs: DEFAULT_JOB_TIMEOUT_SECS,
            job_max_attempts: DEFAULT_JOB_MAX_ATTEMPTS,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = Config::default();
        config.validate().unwrap();
        assert!(!config.is_production());
    }

    #[test]
    fn policy_strategy_requires_key_material() {
        let config = Config {
            signing_strategy: SigningStrategy::Policy,
            signing_private_key_pem: None,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn hmac_strategy_requires_secret() {
        let config = Config {
            signing_hmac_secret: None,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
