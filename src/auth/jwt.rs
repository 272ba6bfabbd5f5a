/// JWT Token Issuance and Validation
///
/// HS256 tokens signed with a fixed 32-byte key derived once from the
/// configured secret.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sha2::{Digest, Sha256};

use crate::auth::claims::Claims;
use crate::configuration::JwtSettings;
use crate::domain::TokenPair;
use crate::error::{AppError, AuthError, ConfigError};

const MIN_SECRET_LENGTH: usize = 32;

/// Symmetric signing key, validated at construction.
#[derive(Clone)]
pub struct SigningKey([u8; 32]);

impl SigningKey {
    /// Derives the key from a configured secret of at least 32 bytes.
    pub fn from_secret(secret: &str) -> Result<Self, ConfigError> {
        if secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::InvalidValue(format!(
                "jwt.secret must be at least {} bytes",
                MIN_SECRET_LENGTH
            )));
        }

        Ok(Self(Sha256::digest(secret.as_bytes()).into()))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningKey(..)")
    }
}

/// Builds and validates signed access/refresh token pairs.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    access_token_expiry: i64,
    refresh_token_expiry: i64,
}

impl TokenIssuer {
    pub fn new(config: &JwtSettings) -> Result<Self, ConfigError> {
        let key = SigningKey::from_secret(&config.secret)?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&config.issuer]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        // Expiry is exact so a purged revocation entry refers to a token
        // that no longer validates.
        validation.leeway = 0;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(key.as_bytes()),
            decoding_key: DecodingKey::from_secret(key.as_bytes()),
            validation,
            issuer: config.issuer.clone(),
            access_token_expiry: config.access_token_expiry_secs,
            refresh_token_expiry: config.refresh_token_expiry_secs,
        })
    }

    /// Expiry of a token signed with this key, whether or not it has passed.
    ///
    /// `None` for anything that does not verify, so unparsable strings never
    /// get an expiry.
    pub fn expiry_of(&self, token: &str) -> Option<DateTime<Utc>> {
        let mut validation = self.validation.clone();
        validation.validate_exp = false;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .ok()?
            .claims
            .expires_at()
    }

    pub fn issue_token_pair(&self, username: &str) -> Result<TokenPair, AppError> {
        let access_token = self.sign(&Claims::new(username, self.access_token_expiry, &self.issuer))?;
        let refresh_token =
            self.sign(&Claims::new(username, self.refresh_token_expiry, &self.issuer))?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    fn sign(&self, claims: &Claims) -> Result<String, AppError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token signing failed: {}", e)))
    }

    /// Checks signature, issuer and expiry. Every failure is `InvalidToken`.
    pub fn parse(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "JWT validation failed");
                AuthError::InvalidToken
            })
    }
}
