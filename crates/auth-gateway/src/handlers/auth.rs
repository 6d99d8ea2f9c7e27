//! Wallet authentication handlers

use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use shared::{db, Config, DbPool};
use validator::Validate;

use crate::models::{
    AuthStatusResponse, ErrorResponse, LogoutRequest, LogoutResponse, NonceRequest, NonceResponse,
    VerifyRequest, VerifyResponse,
};
use crate::repositories::{
    NewNonce, NonceRepository, RateLimitAction, RateLimitDecision, RateLimitDenyReason,
    RateLimitRepository, SessionRepository,
};
use crate::services::origin_policy::OriginPolicy;
use crate::services::signature_verifier::Eip191Verifier;
use crate::services::verification_gateway::{
    self, VerificationOutcome, VerificationRequest,
};
use crate::services::{challenge, legacy_auth};
use crate::validators::WALLET_ADDRESS_REGEX;

/// Issue a single-use challenge nonce
///
/// POST /api/v1/auth/nonce
pub async fn issue_nonce(
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    policy: web::Data<OriginPolicy>,
    http_req: HttpRequest,
    req: web::Json<NonceRequest>,
) -> impl Responder {
    if let Err(e) = req.validate() {
        return HttpResponse::BadRequest().json(ErrorResponse::new(
            "validation_error",
            format!("Validation failed: {}", e),
        ));
    }

    // The Origin request header wins over the body field when both exist
    let origin = http_req
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.origin.clone());

    if !policy.is_allowed(origin.as_deref()) {
        tracing::warn!(
            wallet = %req.wallet_address,
            origin = origin.as_deref().unwrap_or(""),
            "Nonce request from disallowed origin"
        );
        return HttpResponse::Forbidden().json(ErrorResponse::new(
            "origin_not_allowed",
            "Requests from this origin are not allowed",
        ));
    }

    let now = db::db_now();
    let auth = &config.auth;

    match RateLimitRepository::check_and_record_attempt(
        &pool,
        &req.wallet_address,
        RateLimitAction::NonceGeneration,
        now,
        auth.nonce_rate_window(),
        auth.nonce_rate_max_attempts,
    )
    .await
    {
        Ok(RateLimitDecision::Allowed) => {}
        Ok(RateLimitDecision::Denied {
            reason,
            retry_after_secs,
        }) => return rate_limited_response(reason, retry_after_secs),
        Err(e) => {
            tracing::error!("Rate limit check failed for nonce issuance: {}", e);
            return internal_error();
        }
    }

    match NonceRepository::has_pending(&pool, &req.wallet_address, req.device_id.as_deref(), now)
        .await
    {
        Ok(true) => {
            return HttpResponse::Conflict().json(ErrorResponse::new(
                "duplicate_nonce",
                "An unused challenge already exists for this wallet. Sign it or wait for it to expire.",
            ));
        }
        Ok(false) => {}
        Err(e) => {
            tracing::error!("Pending-nonce check failed: {}", e);
            return internal_error();
        }
    }

    let generated = challenge::build(&req.wallet_address, now, auth.nonce_ttl());

    if let Err(e) = NonceRepository::create(
        &pool,
        NewNonce {
            nonce_value: &generated.nonce,
            wallet_address: &req.wallet_address,
            challenge_message: &generated.message,
            device_id: req.device_id.as_deref(),
            origin: origin.as_deref(),
            issued_at: generated.issued_at,
            expires_at: generated.expires_at,
        },
    )
    .await
    {
        tracing::error!("Failed to store challenge nonce: {}", e);
        return internal_error();
    }

    tracing::debug!(wallet = %req.wallet_address, "Challenge nonce issued");

    HttpResponse::Ok().json(NonceResponse {
        challenge_message: generated.message,
        nonce: generated.nonce,
        expires_at: generated.expires_at,
    })
}

/// Verify a signed challenge and establish a session
///
/// POST /api/v1/auth/verify
pub async fn verify_signature(
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    verifier: web::Data<Eip191Verifier>,
    req: web::Json<VerifyRequest>,
) -> impl Responder {
    if let Err(e) = req.validate() {
        return HttpResponse::BadRequest().json(ErrorResponse::new(
            "validation_error",
            format!("Validation failed: {}", e),
        ));
    }

    let now = db::db_now();

    let outcome = verification_gateway::verify_and_authenticate(
        &pool,
        &config.auth,
        verifier.get_ref(),
        VerificationRequest {
            wallet_address: &req.wallet_address,
            nonce: &req.nonce,
            signature: &req.signature,
            wallet_label: req.wallet_label.as_deref(),
            platform: req.platform.as_deref(),
        },
        now,
    )
    .await;

    match outcome {
        VerificationOutcome::Success {
            session_id,
            expires_at,
        } => HttpResponse::Ok().json(VerifyResponse {
            success: true,
            verified: true,
            session_id,
            expires_at,
        }),
        VerificationOutcome::RateLimited {
            retry_after_secs,
            locked,
        } => {
            let reason = if locked {
                RateLimitDenyReason::LockedOut
            } else {
                RateLimitDenyReason::WindowExhausted
            };
            rate_limited_response(reason, retry_after_secs)
        }
        VerificationOutcome::InvalidNonce => HttpResponse::Unauthorized().json(
            ErrorResponse::new("invalid_nonce", "Nonce not recognized"),
        ),
        VerificationOutcome::NonceExpired => HttpResponse::Unauthorized().json(
            ErrorResponse::new("nonce_expired", "Challenge expired. Request a new nonce."),
        ),
        VerificationOutcome::NonceAlreadyUsed => HttpResponse::Unauthorized().json(
            ErrorResponse::new(
                "nonce_already_used",
                "Challenge already used. Request a new nonce.",
            ),
        ),
        VerificationOutcome::InvalidSignature => HttpResponse::Unauthorized().json(
            ErrorResponse::new("invalid_signature", "Invalid signature"),
        ),
        VerificationOutcome::InternalError => internal_error(),
    }
}

/// Check whether an address currently holds a valid session
///
/// GET /api/v1/auth/status/{address}
pub async fn check_authentication(
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

    let now = db::db_now();

    match SessionRepository::find_active(&pool, &address, now).await {
        Ok(Some(session)) => {
            return HttpResponse::Ok().json(AuthStatusResponse {
                authenticated: true,
                session_id: Some(session.session_id),
                wallet_label: session.wallet_label,
                expires_at: Some(session.expires_at),
                legacy: None,
            });
        }
        Ok(None) => {}
        Err(e) => {
            tracing::error!("Session lookup failed: {}", e);
            return internal_error();
        }
    }

    // Compatibility shim: pre-session verification records. Remove together
    // with services::legacy_auth once migration completes.
    match legacy_auth::check_legacy_verification(&pool, &address, now).await {
        Ok(Some(status)) => HttpResponse::Ok().json(AuthStatusResponse {
            authenticated: true,
            session_id: None,
            wallet_label: None,
            expires_at: Some(status.session_expires_at),
            legacy: Some(true),
        }),
        Ok(None) => HttpResponse::Ok().json(AuthStatusResponse::unauthenticated()),
        Err(e) => {
            tracing::error!("Legacy verification lookup failed: {}", e);
            internal_error()
        }
    }
}

/// Revoke a session
///
/// POST /api/v1/auth/logout
pub async fn logout(pool: web::Data<DbPool>, req: web::Json<LogoutRequest>) -> impl Responder {
    if let Err(e) = req.validate() {
        return HttpResponse::BadRequest().json(ErrorResponse::new(
            "validation_error",
            format!("Validation failed: {}", e),
        ));
    }

    match SessionRepository::revoke(&pool, &req.session_id, db::db_now()).await {
        Ok(revoked) => HttpResponse::Ok().json(LogoutResponse { revoked }),
        Err(e) => {
            tracing::error!("Session revocation failed: {}", e);
            internal_error()
        }
    }
}

/// Uniform 429 for window exhaustion and lockouts. Lockout messaging exposes
/// only the minutes-remaining figure.
fn rate_limited_response(reason: RateLimitDenyReason, retry_after_secs: i64) -> HttpResponse {
    let message = match reason {
        RateLimitDenyReason::LockedOut => {
            let minutes = (retry_after_secs / 60).max(1);
            format!(
                "Too many failed attempts. Try again in {} minute{}.",
                minutes,
                if minutes == 1 { "" } else { "s" }
            )
        }
        RateLimitDenyReason::WindowExhausted => {
            "Too many attempts. Please try again later.".to_string()
        }
    };

    HttpResponse::TooManyRequests().json(ErrorResponse::with_retry_after(
        "rate_limited",
        message,
        retry_after_secs,
    ))
}

fn internal_error() -> HttpResponse {
    HttpResponse::InternalServerError().json(ErrorResponse::new(
        "internal_error",
        "Failed to process request. Please try again.",
    ))
}
