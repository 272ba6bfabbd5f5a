/// Authentication module
///
/// Token issuance/validation, password hashing, federated identity
/// verification and the service that ties them together.

mod claims;
mod federated;
mod jwt;
mod password;
mod service;

pub use claims::Claims;
pub use federated::{
    GoogleIdTokenValidator, GoogleTokenInfo, IdentityValidationError, IdentityValidator,
    VerifiedIdentity,
};
pub use jwt::{SigningKey, TokenIssuer};
pub use password::{
    validate_password_strength, BcryptHasher, PasswordHasher, DEFAULT_BCRYPT_COST,
    MAX_BCRYPT_COST, MIN_BCRYPT_COST,
};
pub use service::AuthService;
