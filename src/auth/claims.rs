/// JWT Claims structure
///
/// Same shape for access and refresh tokens; only the expiry differs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    pub username: String,
    /// Issuer
    pub iss: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Unique token id, so two tokens minted in the same second differ
    pub jti: String,
}

impl Claims {
    /// Create claims for `username` expiring `expiry_seconds` from now
    pub fn new(username: &str, expiry_seconds: i64, issuer: &str) -> Self {
        let now = Utc::now().timestamp();
        Self {
            username: username.to_string(),
            iss: issuer.to_string(),
            exp: now + expiry_seconds,
            iat: now,
            jti: Uuid::new_v4().to_string(),
        }
    }

    /// `None` when `exp` is outside the representable range.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_creation() {
        let claims = Claims::new("alice", 3600, "test");

        assert_eq!(claims.username, "alice");
        assert_eq!(claims.iss, "test");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_expires_at_matches_exp() {
        let claims = Claims::new("alice", -10, "test");
        let expires_at = claims.expires_at().expect("exp is in range");

        assert_eq!(expires_at.timestamp(), claims.exp);
        assert!(expires_at < Utc::now());
    }

    #[test]
    fn test_claims_are_unique() {
        let a = Claims::new("alice", 3600, "test");
        let b = Claims::new("alice", 3600, "test");
        assert_ne!(a.jti, b.jti);
    }
}
