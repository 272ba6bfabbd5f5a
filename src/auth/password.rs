/// Password Hashing and Verification
///
/// bcrypt with a configurable cost, plus strength rules applied at registration.

use crate::domain::PasswordHash;
use crate::error::{AppError, ValidationError};

pub const DEFAULT_BCRYPT_COST: u32 = 15;
pub const MIN_BCRYPT_COST: u32 = 4;
pub const MAX_BCRYPT_COST: u32 = 31;

const MIN_PASSWORD_LENGTH: usize = 8;
// bcrypt ignores everything past 72 bytes
const MAX_PASSWORD_LENGTH: usize = 72;

/// Adaptive one-way password hashing.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, plaintext: &str) -> Result<PasswordHash, AppError>;

    /// `Ok(false)` on mismatch; `Err` when `hash` is not a valid hash.
    fn compare(&self, hash: &str, plaintext: &str) -> Result<bool, AppError>;
}

#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(DEFAULT_BCRYPT_COST)
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, plaintext: &str) -> Result<PasswordHash, AppError> {
        bcrypt::hash(plaintext, self.cost)
            .map(PasswordHash::from_hashed)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    }

    fn compare(&self, hash: &str, plaintext: &str) -> Result<bool, AppError> {
        bcrypt::verify(plaintext, hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
    }
}

/// Validate password strength requirements
///
/// Requirements:
/// - 8 to 72 characters
/// - At least one digit, one lowercase and one uppercase letter
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort("password", MIN_PASSWORD_LENGTH));
    }

    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong("password", MAX_PASSWORD_LENGTH));
    }

    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_uppercase());

    if !has_digit || !has_lowercase || !has_uppercase {
        return Err(ValidationError::WeakPassword);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> BcryptHasher {
        BcryptHasher::new(4)
    }

    #[test]
    fn test_hash_password() {
        let password = "ValidPassword123";
        let hash = hasher().hash(password).expect("Failed to hash password");

        assert_ne!(password, hash.as_str());
        assert!(hash.as_str().starts_with("$2"));
    }

    #[test]
    fn test_compare_password() {
        let hash = hasher().hash("ValidPassword123").unwrap();

        assert!(hasher().compare(hash.as_str(), "ValidPassword123").unwrap());
        assert!(!hasher().compare(hash.as_str(), "WrongPassword123").unwrap());
    }

    #[test]
    fn test_compare_against_garbage_hash() {
        assert!(hasher().compare("not-a-bcrypt-hash", "ValidPassword123").is_err());
    }

    #[test]
    fn test_password_strength() {
        assert!(validate_password_strength("ValidPassword123").is_ok());
        assert_eq!(
            validate_password_strength("Short1"),
            Err(ValidationError::TooShort("password", MIN_PASSWORD_LENGTH))
        );
        assert!(validate_password_strength(&("A1".to_string() + &"a".repeat(80))).is_err());
        assert_eq!(
            validate_password_strength("NoDigitsPassword"),
            Err(ValidationError::WeakPassword)
        );
        assert_eq!(
            validate_password_strength("NOLOWERCASE1"),
            Err(ValidationError::WeakPassword)
        );
        assert_eq!(
            validate_password_strength("nouppercase1"),
            Err(ValidationError::WeakPassword)
        );
    }
}
