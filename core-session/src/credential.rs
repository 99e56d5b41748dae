//! Session credential value type.

use chrono::{DateTime, Duration, Utc};

/// An opaque session token with its absolute expiry instant.
///
/// Issued tokens are short-lived (minutes, not hours), so expiry checks take
/// the current instant explicitly rather than sampling a clock themselves.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredential {
    /// Opaque bearer token.
    pub token: String,
    /// When the token stops being accepted (UTC).
    pub expires_at: DateTime<Utc>,
}

impl SessionCredential {
    pub fn new(token: String, expires_at: DateTime<Utc>) -> Self {
        Self { token, expires_at }
    }

    /// Whether the credential has reached its expiry at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether the credential is expired or will expire within
    /// `buffer_secs`. The buffer keeps a refresh ahead of in-flight requests
    /// that would otherwise race the expiry.
    pub fn is_expired_with_buffer(&self, now: DateTime<Utc>, buffer_secs: i64) -> bool {
        now + Duration::seconds(buffer_secs) >= self.expires_at
    }
}

// Token contents never appear in logs.
impl std::fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredential")
            .field("token_len", &self.token.len())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(seconds_from_now: i64) -> (SessionCredential, DateTime<Utc>) {
        let now = Utc::now();
        (
            SessionCredential::new(
                "eyJ-secret-session-token".to_string(),
                now + Duration::seconds(seconds_from_now),
            ),
            now,
        )
    }

    #[test]
    fn test_fresh_credential_not_expired() {
        let (cred, now) = credential(180);
        assert!(!cred.is_expired_at(now));
        assert!(!cred.is_expired_with_buffer(now, 10));
    }

    #[test]
    fn test_expired_credential() {
        let (cred, now) = credential(-1);
        assert!(cred.is_expired_at(now));
    }

    #[test]
    fn test_buffer_counts_as_expired() {
        let (cred, now) = credential(5);
        assert!(!cred.is_expired_at(now));
        assert!(cred.is_expired_with_buffer(now, 10));
    }

    #[test]
    fn test_debug_redacts_token() {
        let (cred, _) = credential(60);
        let rendered = format!("{:?}", cred);
        assert!(!rendered.contains("eyJ-secret-session-token"));
        assert!(rendered.contains("token_len"));
    }
}
