/// Federated identity verification
///
/// An `IdentityValidator` checks an identity token issued by an external
/// provider and returns the verified subject and email. The Google
/// implementation asks Google's tokeninfo endpoint.

use async_trait::async_trait;
use serde::Deserialize;

const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// Claims an identity provider vouched for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub subject: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityValidationError {
    #[error("identity provider rejected the token: {0}")]
    Rejected(String),
    #[error("token audience {found:?} does not match {expected:?}")]
    AudienceMismatch { expected: String, found: String },
    #[error("untrusted token issuer {0:?}")]
    UntrustedIssuer(String),
    #[error("token carries no verified email")]
    UnverifiedEmail,
    #[error("identity provider unreachable: {0}")]
    Transport(String),
}

#[async_trait]
pub trait IdentityValidator: Send + Sync {
    async fn validate(
        &self,
        id_token: &str,
        audience: &str,
    ) -> Result<VerifiedIdentity, IdentityValidationError>;
}

/// Subset of the tokeninfo response we rely on.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleTokenInfo {
    pub aud: String,
    pub iss: String,
    pub sub: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub email_verified: String,
}

impl GoogleTokenInfo {
    /// Checks audience, issuer and email of a decoded tokeninfo response.
    pub fn verify(self, audience: &str) -> Result<VerifiedIdentity, IdentityValidationError> {
        if self.aud != audience {
            return Err(IdentityValidationError::AudienceMismatch {
                expected: audience.to_string(),
                found: self.aud,
            });
        }

        if !GOOGLE_ISSUERS.contains(&self.iss.as_str()) {
            return Err(IdentityValidationError::UntrustedIssuer(self.iss));
        }

        if self.email.is_empty() || self.email_verified != "true" {
            return Err(IdentityValidationError::UnverifiedEmail);
        }

        Ok(VerifiedIdentity {
            subject: self.sub,
            email: self.email,
        })
    }
}

#[derive(Clone)]
pub struct GoogleIdTokenValidator {
    http_client: reqwest::Client,
    tokeninfo_url: String,
}

impl GoogleIdTokenValidator {
    pub fn new(tokeninfo_url: String, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            tokeninfo_url,
        }
    }
}

#[async_trait]
impl IdentityValidator for GoogleIdTokenValidator {
    async fn validate(
        &self,
        id_token: &str,
        audience: &str,
    ) -> Result<VerifiedIdentity, IdentityValidationError> {
        let response = self
            .http_client
            .get(&self.tokeninfo_url)
            .query(&[("id_token", id_token)])
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to reach tokeninfo endpoint: {}", e);
                IdentityValidationError::Transport(e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(IdentityValidationError::Rejected(format!(
                "tokeninfo returned {}",
                response.status()
            )));
        }

        let info: GoogleTokenInfo = response
            .json()
            .await
            .map_err(|e| IdentityValidationError::Rejected(format!("malformed tokeninfo: {}", e)))?;

        info.verify(audience)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_info() -> GoogleTokenInfo {
        GoogleTokenInfo {
            aud: "client-id.apps.googleusercontent.com".to_string(),
            iss: "https://accounts.google.com".to_string(),
            sub: "110169484474386276334".to_string(),
            email: "alice@example.com".to_string(),
            email_verified: "true".to_string(),
        }
    }

    #[test]
    fn test_verify_accepts_matching_token() {
        let identity = token_info()
            .verify("client-id.apps.googleusercontent.com")
            .expect("token should verify");

        assert_eq!(identity.email, "alice@example.com");
        assert_eq!(identity.subject, "110169484474386276334");
    }

    #[test]
    fn test_verify_rejects_other_audience() {
        let result = token_info().verify("someone-else");
        assert!(matches!(
            result,
            Err(IdentityValidationError::AudienceMismatch { .. })
        ));
    }

    #[test]
    fn test_verify_rejects_foreign_issuer() {
        let mut info = token_info();
        info.iss = "https://evil.example.com".to_string();

        assert_eq!(
            info.verify("client-id.apps.googleusercontent.com"),
            Err(IdentityValidationError::UntrustedIssuer(
                "https://evil.example.com".to_string()
            ))
        );
    }

    #[test]
    fn test_verify_requires_verified_email() {
        let mut info = token_info();
        info.email_verified = "false".to_string();

        assert_eq!(
            info.verify("client-id.apps.googleusercontent.com"),
            Err(IdentityValidationError::UnverifiedEmail)
        );
    }

    #[test]
    fn test_tokeninfo_deserialization() {
        let json = r#"{
            "iss": "accounts.google.com",
            "aud": "client-id",
            "sub": "42",
            "email": "bob@example.com",
            "email_verified": "true",
            "exp": "1700000000"
        }"#;

        let info: GoogleTokenInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.verify("client-id").unwrap().email, "bob@example.com");
    }
}
