/// Middleware module
///
/// Session-token authentication for protected routes.

mod jwt_middleware;

pub use jwt_middleware::{find_token, JwtMiddleware, TOKEN_COOKIE, TOKEN_QUERY_PARAM};
