use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::net::TcpListener;

use crate::auth::AuthService;
use crate::middleware::JwtMiddleware;
use crate::routes::{google_sign_in, health_check, login, logout, me, register};

/// Registers every route on an actix `ServiceConfig`.
///
/// Shared by the server and by in-process HTTP tests.
pub fn configure(auth: AuthService) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg: &mut web::ServiceConfig| {
        cfg.app_data(web::Data::new(auth.clone()))
            // Public routes
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/auth")
                    .route("/login", web::post().to(login))
                    .route("/register", web::post().to(register))
                    .route("/logout", web::post().to(logout))
                    .route("/google", web::post().to(google_sign_in)),
            )
            // Protected routes
            .service(
                web::scope("/api")
                    .wrap(JwtMiddleware::new(auth))
                    .route("/me", web::get().to(me)),
            );
    }
}

pub fn run(listener: TcpListener, auth: AuthService) -> Result<Server, std::io::Error> {
    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .configure(configure(auth.clone()))
    })
    .listen(listener)?
    .run();

    Ok(server)
}
