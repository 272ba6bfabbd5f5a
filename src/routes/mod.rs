mod auth;
mod health_check;

pub use auth::{google_sign_in, login, logout, me, register, GoogleSignInRequest, LogoutRequest, UserResponse};
pub use health_check::health_check;
