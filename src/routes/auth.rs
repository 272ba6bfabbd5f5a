/// Authentication Routes
///
/// Thin HTTP layer over `AuthService`: input validation, then one service
/// call per handler.

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthService;
use crate::domain::{Credentials, Registration, User};
use crate::error::{AppError, ValidationError};
use crate::validators::{is_valid_email, is_valid_name, is_valid_username};

#[derive(Deserialize)]
pub struct LogoutRequest {
    pub token: String,
}

#[derive(Deserialize)]
pub struct GoogleSignInRequest {
    pub id_token: String,
    /// Falls back to the configured client id when absent.
    #[serde(default)]
    pub audience: String,
}

/// User information returned to clients. Never includes the password hash.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub picture: String,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            picture: user.picture,
            created_at: user.created_at,
        }
    }
}

/// POST /auth/login
///
/// # Errors
/// - 400: Empty username or password
/// - 401: Invalid credentials (unknown user and wrong password look the same)
pub async fn login(
    form: web::Json<Credentials>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let credentials = form.into_inner();
    if credentials.username.trim().is_empty() {
        return Err(ValidationError::EmptyField("username").into());
    }
    if credentials.password.is_empty() {
        return Err(ValidationError::EmptyField("password").into());
    }

    let pair = auth.login(credentials).await?;
    Ok(HttpResponse::Ok().json(pair))
}

/// POST /auth/register
///
/// # Errors
/// - 400: Invalid username, email, name fields or weak password
/// - 409: Username already taken
pub async fn register(
    form: web::Json<Registration>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let mut registration = form.into_inner();
    registration.username = is_valid_username(&registration.username)?;
    registration.email = is_valid_email(&registration.email)?;
    registration.first_name = is_valid_name("first_name", &registration.first_name)?;
    registration.last_name = is_valid_name("last_name", &registration.last_name)?;

    let user = auth.register(registration).await?;
    Ok(HttpResponse::Created().json(UserResponse::from(user)))
}

/// POST /auth/logout
///
/// Revokes the given token. Revoking the same token twice is not an error.
pub async fn logout(
    form: web::Json<LogoutRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let token = form.token.trim();
    if token.is_empty() {
        return Err(ValidationError::EmptyField("token").into());
    }

    auth.logout(token).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// POST /auth/google
///
/// # Errors
/// - 401: The provider rejected the identity token
/// - 404: The identity is valid but has no local account
pub async fn google_sign_in(
    form: web::Json<GoogleSignInRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let request = form.into_inner();
    if request.id_token.trim().is_empty() {
        return Err(ValidationError::EmptyField("id_token").into());
    }

    let pair = auth
        .validate_federated_token(request.id_token.trim(), request.audience.trim())
        .await?;
    Ok(HttpResponse::Ok().json(pair))
}

/// GET /api/me
///
/// The user is injected by `JwtMiddleware`.
pub async fn me(user: web::ReqData<User>) -> HttpResponse {
    HttpResponse::Ok().json(UserResponse::from(user.into_inner()))
}
