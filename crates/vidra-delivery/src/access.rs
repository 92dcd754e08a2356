//! Access control engine.
//!
//! One deny is final: checks run in a fixed order and the first failure
//! short-circuits with its reason. Order: readiness, visibility, account
//! requirements, embedding domain, geo policy. Only a fully-passed request
//! yields an [`AccessToken`].

use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use vidra_core::models::{AccessToken, Video, VideoStatus, Visibility};
use vidra_core::{AppError, EventSink, VideoEvent};

use crate::directory::{EnrollmentChecker, UserDirectory};

/// Who is asking, and from where.
#[derive(Debug, Clone, Default)]
pub struct AccessContext {
    pub user_id: Option<Uuid>,
    /// Referring domain for embedded playback, e.g. "learn.example.com".
    pub domain: Option<String>,
    /// ISO 3166-1 alpha-2 country code resolved from the client address.
    pub country: Option<String>,
    pub ip: Option<String>,
}

/// Outcome of evaluating a delivery request.
#[derive(Debug, Clone)]
pub enum AccessDecision {
    Granted { token: AccessToken },
    Denied { reason: String },
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessDecision::Granted { .. })
    }

    pub fn denial_reason(&self) -> Option<&str> {
        match self {
            AccessDecision::Denied { reason } => Some(reason),
            AccessDecision::Granted { .. } => None,
        }
    }
}

pub struct AccessControlEngine {
    directory: Arc<dyn UserDirectory>,
    enrollment: Arc<dyn EnrollmentChecker>,
    events: Arc<dyn EventSink>,
}

impl AccessControlEngine {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        enrollment: Arc<dyn EnrollmentChecker>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            directory,
            enrollment,
            events,
        }
    }

    /// Evaluate a delivery request against the video's policy.
    ///
    /// Errors are reserved for infrastructure failures (directory lookups);
    /// policy outcomes always come back as a decision.
    pub async fn evaluate(
        &self,
        video: &Video,
        ctx: &AccessContext,
    ) -> Result<AccessDecision, AppError> {
        if let Some(reason) = self.first_denial(video, ctx).await? {
            tracing::info!(
                video_id = %video.id,
                requester = ?ctx.user_id,
                reason = %reason,
                "Access denied"
            );
            self.events
                .record(VideoEvent::AccessDenied {
                    video_id: video.id,
                    requester: ctx.user_id,
                    reason: reason.clone(),
                })
                .await;
            return Ok(AccessDecision::Denied { reason });
        }

        let token = issue_token(video, ctx);
        self.events
            .record(VideoEvent::AccessGranted {
                video_id: video.id,
                requester: ctx.user_id,
            })
            .await;
        Ok(AccessDecision::Granted { token })
    }

    async fn first_denial(
        &self,
        video: &Video,
        ctx: &AccessContext,
    ) -> Result<Option<String>, AppError> {
        if video.status != VideoStatus::Ready {
            return Ok(Some(format!(
                "video is not available for delivery (status {})",
                video.status
            )));
        }

        match video.visibility {
            Visibility::Public | Visibility::Unlisted => {}
            Visibility::Private => {
                if ctx.user_id != Some(video.uploader_id) {
                    return Ok(Some("video is private".into()));
                }
            }
            Visibility::CourseOnly => {
                let Some(user_id) = ctx.user_id else {
                    return Ok(Some("course video requires an authenticated viewer".into()));
                };
                let Some(course_id) = video.course_id else {
                    return Ok(Some("course video has no course association".into()));
                };
                if !self.enrollment.is_enrolled(user_id, course_id).await? {
                    return Ok(Some("viewer has no enrollment in this course".into()));
                }
            }
        }

        if video.security.require_auth {
            let Some(user_id) = ctx.user_id else {
                return Ok(Some("authentication required".into()));
            };
            if !self.directory.is_active(user_id).await? {
                return Ok(Some("account is not active".into()));
            }
        }

        if !video.security.allowed_domains.is_empty() {
            let allowed = ctx
                .domain
                .as_deref()
                .map(|domain| domain_allowed(domain, &video.security.allowed_domains))
                .unwrap_or(false);
            if !allowed {
                return Ok(Some("embedding domain is not allowed".into()));
            }
        }

        if let Some(country) = ctx.country.as_deref() {
            if video
                .security
                .geo_block
                .iter()
                .any(|c| c.eq_ignore_ascii_case(country))
            {
                return Ok(Some(format!("region {country} is blocked")));
            }
            if !video.security.geo_allow.is_empty()
                && !video
                    .security
                    .geo_allow
                    .iter()
                    .any(|c| c.eq_ignore_ascii_case(country))
            {
                return Ok(Some(format!("region {country} is not in the allow list")));
            }
        } else if !video.security.geo_allow.is_empty() {
            // Allow-list policy with unknown origin: fail closed.
            return Ok(Some("viewer region could not be determined".into()));
        }

        Ok(None)
    }
}

/// Exact match, or a subdomain of an allowed domain.
fn domain_allowed(domain: &str, allowed: &[String]) -> bool {
    allowed.iter().any(|entry| {
        domain.eq_ignore_ascii_case(entry)
            || domain
                .to_ascii_lowercase()
                .ends_with(&format!(".{}", entry.to_ascii_lowercase()))
    })
}

fn issue_token(video: &Video, ctx: &AccessContext) -> AccessToken {
    let mut permissions = vec!["view".to_string()];
    if video.security.allow_download {
        permissions.push("download".to_string());
    }
    AccessToken {
        video_id: video.id,
        requester: ctx.user_id,
        expires_at: Utc::now() + Duration::seconds(video.security.signed_url_expiry_secs as i64),
        permissions,
        ip: ctx.ip.clone(),
        domain: ctx.domain.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectory;
    use vidra_core::models::{QualityVariant, VariantStatus};
    use vidra_core::NoopEventSink;

    fn ready_video(visibility: Visibility) -> Video {
        let mut video = Video::new("t".into(), visibility, Uuid::new_v4());
        let mut variant = QualityVariant::new(video.id, "480p", 854, 480, 2500);
        variant.status = VariantStatus::Completed;
        video.variants.push(variant);
        video.status = VideoStatus::Ready;
        video
    }

    fn engine(dir: Arc<InMemoryDirectory>) -> AccessControlEngine {
        AccessControlEngine::new(dir.clone(), dir, Arc::new(NoopEventSink))
    }

    #[tokio::test]
    async fn public_ready_video_is_granted_anonymously() {
        let engine = engine(InMemoryDirectory::new());
        let video = ready_video(Visibility::Public);

        let decision = engine
            .evaluate(&video, &AccessContext::default())
            .await
            .unwrap();
        let AccessDecision::Granted { token } = decision else {
            panic!("expected grant");
        };
        assert_eq!(token.permissions, vec!["view"]);
        assert!(!token.is_expired());
    }

    #[tokio::test]
    async fn non_ready_video_is_denied_first() {
        let engine = engine(InMemoryDirectory::new());
        let mut video = ready_video(Visibility::Public);
        video.status = VideoStatus::Processing;

        let decision = engine
            .evaluate(&video, &AccessContext::default())
            .await
            .unwrap();
        assert!(decision
            .denial_reason()
            .unwrap()
            .contains("not available for delivery"));
    }

    #[tokio::test]
    async fn private_video_admits_only_the_uploader() {
        let engine = engine(InMemoryDirectory::new());
        let video = ready_video(Visibility::Private);

        let stranger = AccessContext {
            user_id: Some(Uuid::new_v4()),
            ..Default::default()
        };
        let decision = engine.evaluate(&video, &stranger).await.unwrap();
        assert_eq!(decision.denial_reason(), Some("video is private"));

        let owner = AccessContext {
            user_id: Some(video.uploader_id),
            ..Default::default()
        };
        assert!(engine.evaluate(&video, &owner).await.unwrap().is_granted());
    }

    #[tokio::test]
    async fn course_video_requires_enrollment() {
        let dir = InMemoryDirectory::new();
        let engine = engine(dir.clone());
        let mut video = ready_video(Visibility::CourseOnly);
        let course_id = Uuid::new_v4();
        video.course_id = Some(course_id);
        let user_id = Uuid::new_v4();

        let ctx = AccessContext {
            user_id: Some(user_id),
            ..Default::default()
        };
        let decision = engine.evaluate(&video, &ctx).await.unwrap();
        assert!(decision.denial_reason().unwrap().contains("enrollment"));

        dir.enroll(user_id, course_id).await;
        assert!(engine.evaluate(&video, &ctx).await.unwrap().is_granted());
    }

    #[tokio::test]
    async fn require_auth_checks_account_status() {
        let dir = InMemoryDirectory::new();
        let engine = engine(dir.clone());
        let mut video = ready_video(Visibility::Public);
        video.security.require_auth = true;

        let anonymous = engine
            .evaluate(&video, &AccessContext::default())
            .await
            .unwrap();
        assert_eq!(anonymous.denial_reason(), Some("authentication required"));

        let user_id = Uuid::new_v4();
        let ctx = AccessContext {
            user_id: Some(user_id),
            ..Default::default()
        };
        let suspended = engine.evaluate(&video, &ctx).await.unwrap();
        assert_eq!(suspended.denial_reason(), Some("account is not active"));

        dir.add_active_user(user_id).await;
        assert!(engine.evaluate(&video, &ctx).await.unwrap().is_granted());
    }

    #[tokio::test]
    async fn domain_allow_list_matches_subdomains() {
        let engine = engine(InMemoryDirectory::new());
        let mut video = ready_video(Visibility::Public);
        video.security.allowed_domains = vec!["example.com".into()];

        for (domain, expected) in [
            (Some("example.com"), true),
            (Some("learn.example.com"), true),
            (Some("evil-example.com"), false),
            (None, false),
        ] {
            let ctx = AccessContext {
                domain: domain.map(String::from),
                ..Default::default()
            };
            let decision = engine.evaluate(&video, &ctx).await.unwrap();
            assert_eq!(decision.is_granted(), expected, "domain {domain:?}");
        }
    }

    #[tokio::test]
    async fn geo_block_wins_over_allow() {
        let engine = engine(InMemoryDirectory::new());
        let mut video = ready_video(Visibility::Public);
        video.security.geo_allow = vec!["US".into(), "DE".into()];
        video.security.geo_block = vec!["DE".into()];

        let blocked = AccessContext {
            country: Some("de".into()),
            ..Default::default()
        };
        assert!(!engine.evaluate(&video, &blocked).await.unwrap().is_granted());

        let allowed = AccessContext {
            country: Some("US".into()),
            ..Default::default()
        };
        assert!(engine.evaluate(&video, &allowed).await.unwrap().is_granted());

        let elsewhere = AccessContext {
            country: Some("FR".into()),
            ..Default::default()
        };
        assert!(!engine.evaluate(&video, &elsewhere).await.unwrap().is_granted());

        // Allow-list set but origin unknown: fail closed.
        let unknown = AccessContext::default();
        assert!(!engine.evaluate(&video, &unknown).await.unwrap().is_granted());
    }

    #[tokio::test]
    async fn granted_token_reflects_download_permission() {
        let engine = engine(InMemoryDirectory::new());
        let mut video = ready_video(Visibility::Public);
        video.security.allow_download = true;

        let decision = engine
            .evaluate(&video, &AccessContext::default())
            .await
            .unwrap();
        let AccessDecision::Granted { token } = decision else {
            panic!("expected grant");
        };
        assert!(token.permissions.contains(&"download".to_string()));
    }
}
