//! Administrative handlers
//!
//! Support-staff escape hatches. These routes are expected to sit behind an
//! operator-only network boundary; they are never linked from client code.

use actix_web::{web, HttpResponse, Responder};
use shared::DbPool;

use crate::models::{ErrorResponse, ResetRateLimitResponse};
use crate::repositories::RateLimitRepository;
use crate::validators::WALLET_ADDRESS_REGEX;

/// Unconditionally delete all rate-limit counters for an address
///
/// POST /api/v1/admin/rate-limits/{address}/reset
pub async fn reset_rate_limit(
    pool: web::Data<DbPool>,
    path: web::Path<String>,
) -> impl Responder {
    let address = path.into_inner();
    if !WALLET_ADDRESS_REGEX.is_match(&address) {
        return HttpResponse::BadRequest().json(ErrorResponse::new(
            "validation_error",
            "Invalid wallet address",
        ));
    }

    match RateLimitRepository::reset_for_address(&pool, &address).await {
        Ok(reset_count) => {
            tracing::info!(wallet = %address, reset_count, "Rate limits reset by administrator");
            HttpResponse::Ok().json(ResetRateLimitResponse { reset_count })
        }
        Err(e) => {
            tracing::error!("Rate limit reset failed: {}", e);
            HttpResponse::InternalServerError().json(ErrorResponse::new(
                "internal_error",
                "Failed to reset rate limits",
            ))
        }
    }
}
