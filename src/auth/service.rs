/// Authentication service
///
/// Orchestrates login, registration, logout, token verification and
/// federated sign-in over the user store, the revocation ledger, the password
/// hasher and the token issuer.

use std::sync::Arc;

use crate::auth::federated::IdentityValidator;
use crate::auth::jwt::TokenIssuer;
use crate::auth::password::{validate_password_strength, PasswordHasher};
use crate::domain::{
    Credentials, NewUser, PasswordHash, Registration, RevocationLedger, TokenPair, User, UserFilter,
    UserStore,
};
use crate::error::{AppError, AuthError};

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    revoked_tokens: Arc<dyn RevocationLedger>,
    hasher: Arc<dyn PasswordHasher>,
    tokens: TokenIssuer,
    id_token_validator: Arc<dyn IdentityValidator>,
    /// Used when a federated sign-in does not name an audience.
    default_audience: String,
    /// Hash compared against when the username is unknown, so a miss costs
    /// the same bcrypt work as a wrong password.
    dummy_hash: Arc<str>,
}

const DUMMY_PASSWORD: &str = "tokenward-dummy-password";

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        revoked_tokens: Arc<dyn RevocationLedger>,
        hasher: Arc<dyn PasswordHasher>,
        tokens: TokenIssuer,
        id_token_validator: Arc<dyn IdentityValidator>,
        default_audience: String,
    ) -> Result<Self, AppError> {
        let dummy_hash = hasher.hash(DUMMY_PASSWORD)?.as_str().into();

        Ok(Self {
            users,
            revoked_tokens,
            hasher,
            tokens,
            id_token_validator,
            default_audience,
            dummy_hash,
        })
    }

    /// Returns the same `InvalidCredentials` for an unknown user and for a
    /// wrong password.
    #[tracing::instrument(name = "auth.login", skip_all, fields(username = %credentials.username))]
    pub async fn login(&self, credentials: Credentials) -> Result<TokenPair, AppError> {
        let user = match self.users.find_by_username(&credentials.username).await {
            Ok(user) => user,
            Err(e) if e.is_not_found() => {
                self.compare_password(self.dummy_hash.to_string(), credentials.password)
                    .await?;
                return Err(AuthError::InvalidCredentials.into());
            }
            Err(e) => return Err(e),
        };

        let matches = self
            .compare_password(user.password.clone(), credentials.password)
            .await?;
        if !matches {
            return Err(AuthError::InvalidCredentials.into());
        }

        let pair = self.tokens.issue_token_pair(&user.username)?;
        tracing::info!(user_id = %user.id, "User logged in");
        Ok(pair)
    }

    #[tracing::instrument(name = "auth.register", skip_all, fields(username = %registration.username))]
    pub async fn register(&self, registration: Registration) -> Result<User, AppError> {
        validate_password_strength(&registration.password)?;

        let password = self.hash_password(registration.password.clone()).await?;
        let user = self
            .users
            .create(&NewUser::from_registration(registration, password))
            .await?;

        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Revokes `token`. Revoking an already revoked token succeeds.
    #[tracing::instrument(name = "auth.logout", skip_all)]
    pub async fn logout(&self, token: &str) -> Result<(), AppError> {
        let expires_at = self.tokens.expiry_of(token);
        self.revoked_tokens.add_revoked_token(token, expires_at).await?;
        tracing::info!("Token revoked");
        Ok(())
    }

    /// Resolves a session token to its user.
    ///
    /// The ledger is consulted before the token is parsed, so a revoked
    /// string is rejected the same way whether or not it is well formed. A
    /// missing user is returned as-is rather than as `InvalidToken`.
    #[tracing::instrument(name = "auth.verify_token", skip_all)]
    pub async fn verify_token(&self, token: &str) -> Result<User, AppError> {
        if self.revoked_tokens.is_revoked(token).await? {
            tracing::debug!("Rejected revoked token");
            return Err(AuthError::InvalidToken.into());
        }

        let claims = self.tokens.parse(token)?;
        self.users.find_by_username(&claims.username).await
    }

    /// Signs in with an identity token from an external provider.
    ///
    /// A token the provider rejects is `InvalidIdToken`; a valid token for
    /// an identity with no local account is `ResourceNotFound`.
    #[tracing::instrument(name = "auth.validate_federated_token", skip_all)]
    pub async fn validate_federated_token(
        &self,
        id_token: &str,
        audience: &str,
    ) -> Result<TokenPair, AppError> {
        let audience = if audience.is_empty() {
            self.default_audience.as_str()
        } else {
            audience
        };

        let identity = self
            .id_token_validator
            .validate(id_token, audience)
            .await
            .map_err(|e| AuthError::InvalidIdToken(e.to_string()))?;

        let user = self.find_federated_user(&identity.email).await?;

        let pair = self.tokens.issue_token_pair(&user.username)?;
        tracing::info!(user_id = %user.id, subject = %identity.subject, "Federated sign-in");
        Ok(pair)
    }

    /// Federated accounts are keyed by email. An account registered under its
    /// email as username wins over one that merely carries the email.
    async fn find_federated_user(&self, email: &str) -> Result<User, AppError> {
        match self.users.find_by_username(email).await {
            Err(e) if e.is_not_found() => {}
            other => return other,
        }

        let filter = UserFilter {
            email: Some(email.to_string()),
            active: Some(true),
            deleted: Some(false),
            ..Default::default()
        };
        self.users
            .find_all(&filter)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::not_found("User", format!("email={}", email)))
    }

    /// Drops ledger entries for tokens that have expired on their own.
    ///
    /// Each entry carries its token's own `exp`, so the result does not depend
    /// on the TTLs currently configured.
    pub async fn purge_expired_revocations(&self) -> Result<u64, AppError> {
        self.revoked_tokens.purge_expired().await
    }

    async fn hash_password(&self, plaintext: String) -> Result<PasswordHash, AppError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
            .await
            .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))?
    }

    /// Any comparison failure, including a malformed stored hash, is a mismatch.
    async fn compare_password(&self, hash: String, plaintext: String) -> Result<bool, AppError> {
        let hasher = self.hasher.clone();
        let outcome = tokio::task::spawn_blocking(move || hasher.compare(&hash, &plaintext))
            .await
            .map_err(|e| AppError::Internal(format!("Password verification task failed: {}", e)))?;

        Ok(outcome.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Stored password hash could not be compared");
            false
        }))
    }
}
