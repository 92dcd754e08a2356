use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Short-lived credential authorizing a specific delivery request.
/// Always carries a non-null expiry; never valid past `expires_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub video_id: Uuid,
    pub requester: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
    pub permissions: Vec<String>,
    /// Restriction metadata recorded at issue time.
    pub ip: Option<String>,
    pub domain: Option<String>,
}

impl AccessToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn token_expires_exactly_at_expiry() {
        let expires_at = Utc::now() + Duration::seconds(60);
        let token = AccessToken {
            video_id: Uuid::new_v4(),
            requester: None,
            expires_at,
            permissions: vec!["view".into()],
            ip: None,
            domain: None,
        };
        assert!(!token.is_expired_at(expires_at - Duration::seconds(1)));
        assert!(token.is_expired_at(expires_at));
        assert!(token.is_expired_at(expires_at + Duration::seconds(1)));
    }
}
