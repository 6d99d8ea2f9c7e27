//! Wallet authentication gateway
//!
//! REST API server providing wallet challenge-response authentication:
//! nonce issuance, signature verification, and session management.

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use shared::{db, Config};
use tracing_actix_web::TracingLogger;

use auth_gateway::background_tasks::BackgroundTaskRunner;
use auth_gateway::middleware;
use auth_gateway::routes;
use auth_gateway::services::origin_policy::OriginPolicy;
use auth_gateway::services::signature_verifier::Eip191Verifier;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    shared::init_tracing();

    tracing::info!("Starting auth gateway...");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    // Create database connection pool
    let db_pool = db::create_pool(&config.database)
        .await
        .context("Failed to create database pool")?;

    // Run database migrations
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .context("Failed to run database migrations")?;

    // Check database health
    db::check_health(&db_pool)
        .await
        .context("Database health check failed")?;

    let origin_policy = OriginPolicy::from_config(&config.auth);
    let verifier = Eip191Verifier::new();

    // Start housekeeping sweeps
    let task_token = BackgroundTaskRunner::new(db_pool.clone(), config.auth.clone()).start();

    let server_addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Auth gateway listening on {}", server_addr);

    // Start HTTP server
    HttpServer::new(move || {
        App::new()
            // Request spans for structured logging
            .wrap(TracingLogger::default())
            // CORS wired to the origin allow-list
            .wrap(middleware::cors(origin_policy.clone()))
            // Shared application state
            .app_data(web::Data::new(db_pool.clone()))
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(origin_policy.clone()))
            .app_data(web::Data::new(verifier.clone()))
            // Configure routes
            .configure(routes::configure)
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind to {}", server_addr))?
    .run()
    .await
    .context("Server error")?;

    // Stop housekeeping on shutdown
    task_token.cancel();

    Ok(())
}
