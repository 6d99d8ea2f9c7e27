//! Health check handler

use actix_web::{web, HttpResponse, Responder};
use shared::DbPool;

/// Liveness and database connectivity probe
///
/// GET /api/v1/health
pub async fn health_check(pool: web::Data<DbPool>) -> impl Responder {
    match shared::db::check_health(&pool).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "status": "ok",
            "database": "up",
        })),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "degraded",
                "database": "down",
            }))
        }
    }
}
