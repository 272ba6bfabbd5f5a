//! In-memory doubles for the persistence and identity-provider seams, and
//! helpers that build an `AuthService` on top of them.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use tokenward::auth::{
    AuthService, BcryptHasher, IdentityValidationError, IdentityValidator, PasswordHasher,
    TokenIssuer, VerifiedIdentity,
};
use tokenward::configuration::JwtSettings;
use tokenward::domain::{
    NewUser, PasswordHash, RevocationLedger, User, UserFilter, UserPatch, UserStore,
};
use tokenward::error::{AppError, DatabaseError};

pub const TEST_SECRET: &str = "test-secret-that-is-at-least-32-bytes-long";
pub const TEST_ISSUER: &str = "tokenward-test";
pub const TEST_AUDIENCE: &str = "test-client.apps.googleusercontent.com";
pub const VALID_ID_TOKEN: &str = "valid-google-id-token";

pub fn jwt_settings() -> JwtSettings {
    JwtSettings {
        secret: TEST_SECRET.to_string(),
        issuer: TEST_ISSUER.to_string(),
        access_token_expiry_secs: 3600,
        refresh_token_expiry_secs: 86400,
    }
}

#[derive(Default)]
pub struct InMemoryUserStore {
    users: Mutex<Vec<User>>,
}

impl InMemoryUserStore {
    pub fn deactivate(&self, username: &str) {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.iter_mut().find(|u| u.username == username) {
            user.active = false;
        }
    }

    fn visible(user: &User) -> bool {
        user.active && !user.deleted
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_all(&self, filter: &UserFilter) -> Result<Vec<User>, AppError> {
        let users = self.users.lock().unwrap();
        let mut found: Vec<User> = users.iter().filter(|u| filter.matches(u)).cloned().collect();
        found.sort_by_key(|u| u.id);
        Ok(found)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<User, AppError> {
        let users = self.users.lock().unwrap();
        users
            .iter()
            .find(|u| u.id == id && Self::visible(u))
            .cloned()
            .ok_or_else(|| AppError::not_found("User", format!("id={}", id)))
    }

    async fn find_by_username(&self, username: &str) -> Result<User, AppError> {
        let users = self.users.lock().unwrap();
        users
            .iter()
            .find(|u| u.username == username && Self::visible(u))
            .cloned()
            .ok_or_else(|| AppError::not_found("User", format!("username={}", username)))
    }

    async fn create(&self, user: &NewUser) -> Result<User, AppError> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.username == user.username) {
            return Err(DatabaseError::UniqueConstraintViolation(format!(
                "username {} already exists",
                user.username
            ))
            .into());
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            username: user.username.clone(),
            email: user.email.clone(),
            password: user.password.as_str().to_string(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            picture: user.picture.clone(),
            active: true,
            deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        users.push(created.clone());
        Ok(created)
    }

    async fn update(&self, id: Uuid, patch: &UserPatch) -> Result<User, AppError> {
        let patch = patch.clone().normalized();
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| AppError::not_found("User", format!("id={}", id)))?;

        if let Some(username) = &patch.username {
            user.username = username.clone();
        }
        if let Some(email) = &patch.email {
            user.email = email.clone();
        }
        if let Some(first_name) = &patch.first_name {
            user.first_name = first_name.clone();
        }
        if let Some(last_name) = &patch.last_name {
            user.last_name = last_name.clone();
        }
        if let Some(picture) = &patch.picture {
            user.picture = picture.clone();
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), AppError> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| AppError::not_found("User", format!("id={}", id)))?;
        user.deleted = true;
        user.deleted_at = Some(Utc::now());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        self.users.lock().unwrap().retain(|u| u.id != id);
        Ok(())
    }
}

/// Ledger entries keyed by token, valued by the token's own expiry.
#[derive(Default)]
pub struct InMemoryLedger {
    entries: Mutex<HashMap<String, Option<DateTime<Utc>>>>,
}

impl InMemoryLedger {
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn expiry_of(&self, token: &str) -> Option<Option<DateTime<Utc>>> {
        self.entries.lock().unwrap().get(token).copied()
    }
}

#[async_trait]
impl RevocationLedger for InMemoryLedger {
    async fn add_revoked_token(
        &self,
        token: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        self.entries
            .lock()
            .unwrap()
            .entry(token.to_string())
            .or_insert(expires_at);
        Ok(())
    }

    async fn is_revoked(&self, token: &str) -> Result<bool, AppError> {
        Ok(self.entries.lock().unwrap().contains_key(token))
    }

    async fn purge_expired(&self) -> Result<u64, AppError> {
        let now = Utc::now();
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, expires_at| expires_at.map_or(true, |at| at >= now));
        Ok((before - entries.len()) as u64)
    }
}

/// A ledger whose backing store is down.
pub struct UnavailableLedger;

fn ledger_down() -> AppError {
    DatabaseError::ConnectionPool("revocation ledger unavailable".to_string()).into()
}

#[async_trait]
impl RevocationLedger for UnavailableLedger {
    async fn add_revoked_token(
        &self,
        _token: &str,
        _expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        Err(ledger_down())
    }

    async fn is_revoked(&self, _token: &str) -> Result<bool, AppError> {
        Err(ledger_down())
    }

    async fn purge_expired(&self) -> Result<u64, AppError> {
        Err(ledger_down())
    }
}

/// bcrypt at minimum cost, counting how often a hash is compared.
#[derive(Default)]
pub struct CountingHasher {
    pub compares: AtomicUsize,
}

impl PasswordHasher for CountingHasher {
    fn hash(&self, plaintext: &str) -> Result<PasswordHash, AppError> {
        BcryptHasher::new(4).hash(plaintext)
    }

    fn compare(&self, hash: &str, plaintext: &str) -> Result<bool, AppError> {
        self.compares.fetch_add(1, Ordering::SeqCst);
        BcryptHasher::new(4).compare(hash, plaintext)
    }
}

/// Accepts `VALID_ID_TOKEN` for `TEST_AUDIENCE` and rejects everything else.
pub struct StubIdentityValidator {
    pub email: String,
    pub seen_audiences: Mutex<Vec<String>>,
}

impl StubIdentityValidator {
    pub fn for_email(email: &str) -> Self {
        Self {
            email: email.to_string(),
            seen_audiences: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl IdentityValidator for StubIdentityValidator {
    async fn validate(
        &self,
        id_token: &str,
        audience: &str,
    ) -> Result<VerifiedIdentity, IdentityValidationError> {
        self.seen_audiences.lock().unwrap().push(audience.to_string());

        if id_token != VALID_ID_TOKEN {
            return Err(IdentityValidationError::Rejected("unknown token".to_string()));
        }
        if audience != TEST_AUDIENCE {
            return Err(IdentityValidationError::AudienceMismatch {
                expected: audience.to_string(),
                found: TEST_AUDIENCE.to_string(),
            });
        }

        Ok(VerifiedIdentity {
            subject: "google-subject-1".to_string(),
            email: self.email.clone(),
        })
    }
}

pub struct TestHarness {
    pub service: AuthService,
    pub users: Arc<InMemoryUserStore>,
    pub ledger: Arc<InMemoryLedger>,
    pub identity: Arc<StubIdentityValidator>,
    pub hasher: Arc<CountingHasher>,
}

pub fn harness() -> TestHarness {
    harness_with_federated_email("federated@example.com")
}

pub fn harness_with_federated_email(email: &str) -> TestHarness {
    let users = Arc::new(InMemoryUserStore::default());
    let ledger = Arc::new(InMemoryLedger::default());
    harness_sharing(jwt_settings(), email, users, ledger)
}

/// Builds a service over existing stores, for example to run two
/// differently configured services against one ledger.
pub fn harness_sharing(
    settings: JwtSettings,
    federated_email: &str,
    users: Arc<InMemoryUserStore>,
    ledger: Arc<InMemoryLedger>,
) -> TestHarness {
    let identity = Arc::new(StubIdentityValidator::for_email(federated_email));
    let hasher = Arc::new(CountingHasher::default());

    let service = build_service(
        settings,
        users.clone(),
        ledger.clone(),
        hasher.clone(),
        identity.clone(),
    );

    TestHarness {
        service,
        users,
        ledger,
        identity,
        hasher,
    }
}

pub fn build_service(
    settings: JwtSettings,
    users: Arc<dyn UserStore>,
    ledger: Arc<dyn RevocationLedger>,
    hasher: Arc<dyn PasswordHasher>,
    identity: Arc<dyn IdentityValidator>,
) -> AuthService {
    let tokens = TokenIssuer::new(&settings).expect("test JWT settings are valid");
    AuthService::new(users, ledger, hasher, tokens, identity, TEST_AUDIENCE.to_string())
        .expect("test auth service builds")
}
