/// JWT Authentication Middleware
///
/// Resolves the session token on each request to its user through
/// `AuthService::verify_token` and injects the `User` into request extensions
/// for route handlers.
///
/// The token is looked up in this order:
/// 1. `Authorization: Bearer <token>` header
/// 2. `jwt` cookie
/// 3. `jwt` query parameter

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header,
    web, Error, HttpMessage, HttpRequest, ResponseError,
};
use futures::future::LocalBoxFuture;
use std::collections::HashMap;
use std::rc::Rc;

use crate::auth::AuthService;
use crate::error::{AppError, AuthError};

pub const TOKEN_COOKIE: &str = "jwt";
pub const TOKEN_QUERY_PARAM: &str = "jwt";

const BEARER_PREFIX: &str = "bearer ";

/// JWT middleware for protecting routes
pub struct JwtMiddleware {
    auth: AuthService,
}

impl JwtMiddleware {
    pub fn new(auth: AuthService) -> Self {
        Self { auth }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(JwtMiddlewareService {
            service: Rc::new(service),
            auth: self.auth.clone(),
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: Rc<S>,
    auth: AuthService,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let auth = self.auth.clone();

        Box::pin(async move {
            let token = match find_token(req.request()) {
                Some(token) => token,
                None => {
                    tracing::warn!(path = %req.path(), "No session token on protected route");
                    return Ok(reject(req, AuthError::MissingToken.into()));
                }
            };

            let user = match auth.verify_token(&token).await {
                Ok(user) => user,
                // A valid token whose user has since disappeared is still no session.
                Err(e) if e.is_not_found() => {
                    tracing::warn!(error = %e, "Token subject no longer exists");
                    return Ok(reject(req, AuthError::InvalidToken.into()));
                }
                Err(e) => return Ok(reject(req, e)),
            };

            tracing::debug!(user_id = %user.id, username = %user.username, "Session token verified");
            req.extensions_mut().insert(user);

            service.call(req).await.map(ServiceResponse::map_into_left_body)
        })
    }
}

/// Short-circuits the request with the error's HTTP response.
fn reject<B>(req: ServiceRequest, err: AppError) -> ServiceResponse<EitherBody<B>> {
    let response = ResponseError::error_response(&err);
    req.into_response(response).map_into_right_body()
}

/// Finds the session token on a request, if any.
pub fn find_token(req: &HttpRequest) -> Option<String> {
    from_header(req)
        .or_else(|| from_cookie(req))
        .or_else(|| from_query(req))
}

fn from_header(req: &HttpRequest) -> Option<String> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    if value.len() <= BEARER_PREFIX.len()
        || !value[..BEARER_PREFIX.len()].eq_ignore_ascii_case(BEARER_PREFIX)
    {
        return None;
    }
    non_empty(value[BEARER_PREFIX.len()..].trim())
}

fn from_cookie(req: &HttpRequest) -> Option<String> {
    let cookie = req.cookie(TOKEN_COOKIE)?;
    non_empty(cookie.value())
}

fn from_query(req: &HttpRequest) -> Option<String> {
    let query = web::Query::<HashMap<String, String>>::from_query(req.query_string()).ok()?;
    query.get(TOKEN_QUERY_PARAM).and_then(|t| non_empty(t))
}

fn non_empty(token: &str) -> Option<String> {
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
