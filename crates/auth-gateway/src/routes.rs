//! Route configuration for the API

use actix_web::web;

use crate::handlers;

/// Configure all routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            // Health check endpoint (no auth required)
            .route("/health", web::get().to(handlers::health_check))
            // Wallet authentication endpoints
            .service(
                web::scope("/auth")
                    .route("/nonce", web::post().to(handlers::issue_nonce))
                    .route("/verify", web::post().to(handlers::verify_signature))
                    .route(
                        "/status/{address}",
                        web::get().to(handlers::check_authentication),
                    )
                    .route("/logout", web::post().to(handlers::logout)),
            )
            // Support-staff endpoints, deployed behind an operator boundary
            .service(web::scope("/admin").route(
                "/rate-limits/{address}/reset",
                web::post().to(handlers::reset_rate_limit),
            )),
    );
}
