//! Signature verification gateway
//!
//! Sequences a verification attempt end to end. The step order is
//! load-bearing: rate limit, locate, reject spent/expired, consume, and
//! only then the cryptographic check. A nonce is spent the moment it is
//! taken for verification; no later failure un-consumes it, so a replayed
//! or raced request can never reach the verifier twice, and an aborted
//! request costs the caller a fresh nonce rather than opening a retry
//! window.

use chrono::{DateTime, Utc};
use shared::{AuthConfig, DbPool};
use std::time::Duration as StdDuration;
use tracing::{error, info, warn};

use crate::repositories::{
    ConsumeOutcome, NewSession, NonceRecord, NonceRepository, RateLimitAction, RateLimitDecision,
    RateLimitDenyReason, RateLimitRepository, SessionRepository,
};
use crate::services::audit::{SecurityAuditService, SecurityEvent, SecurityEventCategory};
use crate::services::challenge;
use crate::services::signature_verifier::{
    call_with_timeout, SignatureVerifier, VerifierCallOutcome,
};

/// A single verification attempt
#[derive(Debug)]
pub struct VerificationRequest<'a> {
    pub wallet_address: &'a str,
    pub nonce: &'a str,
    pub signature: &'a str,
    pub wallet_label: Option<&'a str>,
    pub platform: Option<&'a str>,
}

/// Terminal state of a verification attempt
#[derive(Debug)]
pub enum VerificationOutcome {
    Success {
        session_id: String,
        expires_at: DateTime<Utc>,
    },
    RateLimited {
        retry_after_secs: i64,
        locked: bool,
    },
    InvalidNonce,
    NonceExpired,
    NonceAlreadyUsed,
    InvalidSignature,
    InternalError,
}

/// Run the verification state machine for one request
pub async fn verify_and_authenticate(
    pool: &DbPool,
    auth: &AuthConfig,
    verifier: &dyn SignatureVerifier,
    request: VerificationRequest<'_>,
    now: DateTime<Utc>,
) -> VerificationOutcome {
    // Step 1: rate limit for signature verification. A storage failure is a
    // denial (fail closed), surfaced as an internal error.
    let decision = match RateLimitRepository::check_and_record_attempt(
        pool,
        request.wallet_address,
        RateLimitAction::SignatureVerification,
        now,
        auth.verify_rate_window(),
        auth.verify_rate_max_attempts,
    )
    .await
    {
        Ok(decision) => decision,
        Err(e) => {
            error!(error = %e, "Rate limit check failed during verification");
            return VerificationOutcome::InternalError;
        }
    };

    if let RateLimitDecision::Denied {
        reason,
        retry_after_secs,
    } = decision
    {
        return VerificationOutcome::RateLimited {
            retry_after_secs,
            locked: reason == RateLimitDenyReason::LockedOut,
        };
    }

    // Step 2: locate the nonce
    let located = match NonceRepository::find_by_value(pool, request.nonce).await {
        Ok(record) => record,
        Err(e) => {
            error!(error = %e, "Nonce lookup failed");
            return VerificationOutcome::InternalError;
        }
    };

    let Some(located) = located else {
        return VerificationOutcome::InvalidNonce;
    };

    // A nonce belongs to the address it was issued for; a mismatch gets the
    // same answer as an unknown nonce and does not consume it.
    if !located
        .wallet_address
        .eq_ignore_ascii_case(request.wallet_address)
    {
        warn!(
            wallet = request.wallet_address,
            "Verification attempt against a nonce issued to another address"
        );
        return VerificationOutcome::InvalidNonce;
    }

    // Step 3: reject spent or expired nonces. Snapshot read; the conditional
    // update below remains the authority under races.
    if located.consumed_at.is_some() || located.verified.is_some() {
        audit_replay(pool, &located, located.verified == Some(true)).await;
        return VerificationOutcome::NonceAlreadyUsed;
    }
    if located.expires_at <= now {
        return VerificationOutcome::NonceExpired;
    }

    // Step 4: consume. Exactly one concurrent caller gets the record back;
    // a lost race is answered identically to a replay.
    let record = match NonceRepository::consume(pool, request.nonce, now).await {
        Ok(ConsumeOutcome::Consumed(record)) => *record,
        Ok(ConsumeOutcome::NotFound) => return VerificationOutcome::InvalidNonce,
        Ok(ConsumeOutcome::Expired) => return VerificationOutcome::NonceExpired,
        Ok(ConsumeOutcome::AlreadyConsumed {
            previously_verified,
        }) => {
            audit_replay(pool, &located, previously_verified).await;
            return VerificationOutcome::NonceAlreadyUsed;
        }
        Err(e) => {
            error!(error = %e, "Nonce consumption failed");
            return VerificationOutcome::InternalError;
        }
    };

    // Step 5: the external cryptographic check, bounded by a deadline. The
    // nonce is already durably consumed whatever happens here.
    let call = call_with_timeout(
        verifier,
        StdDuration::from_secs(auth.verifier_timeout_secs),
        request.wallet_address,
        request.nonce,
        request.signature,
        &record.challenge_message,
    )
    .await;

    match call {
        VerifierCallOutcome::Valid => grant_session(pool, auth, &request, &record, now).await,
        VerifierCallOutcome::Invalid => {
            reject_signature(pool, auth, &request, &record, now, "signature rejected").await
        }
        VerifierCallOutcome::TimedOut => {
            warn!(wallet = request.wallet_address, "Verifier call timed out");
            reject_signature(pool, auth, &request, &record, now, "verifier timeout").await
        }
        VerifierCallOutcome::Failed(reason) => {
            error!(
                wallet = request.wallet_address,
                reason = %reason,
                "Verifier capability failure"
            );
            SecurityAuditService::record(
                pool,
                SecurityEvent {
                    category: SecurityEventCategory::VerifierError,
                    wallet_address: Some(request.wallet_address),
                    nonce_value: Some(&record.nonce_value),
                    reason: Some(&reason),
                    metadata: None,
                },
            )
            .await;
            VerificationOutcome::InternalError
        }
    }
}

/// Step 6a: persist the outcome, reset the failure streak, mint a session,
/// emit the audit record.
async fn grant_session(
    pool: &DbPool,
    auth: &AuthConfig,
    request: &VerificationRequest<'_>,
    record: &NonceRecord,
    now: DateTime<Utc>,
) -> VerificationOutcome {
    // Session lifetime counts from the moment of verification, not from
    // nonce issuance.
    let expires_at = now + auth.session_ttl();

    if let Err(e) = NonceRepository::attach_outcome(
        pool,
        &record.nonce_value,
        request.signature,
        true,
        Some(expires_at),
    )
    .await
    {
        error!(error = %e, "Failed to persist verification outcome");
        return VerificationOutcome::InternalError;
    }

    // The streak reset is best-effort: the caller is authenticated either
    // way, and a later success or lockout expiry clears the counter.
    if let Err(e) = RateLimitRepository::record_success(pool, request.wallet_address).await {
        warn!(error = %e, "Failed to reset failure streak after verification");
    }

    let session_id = challenge::generate_token();
    if let Err(e) = SessionRepository::create(
        pool,
        NewSession {
            session_id: &session_id,
            wallet_address: &record.wallet_address,
            wallet_label: request.wallet_label,
            device_id: record.device_id.as_deref(),
            origin: record.origin.as_deref(),
            platform: request.platform,
            created_at: now,
            expires_at,
        },
    )
    .await
    {
        error!(error = %e, "Failed to create session");
        return VerificationOutcome::InternalError;
    }

    SecurityAuditService::record(
        pool,
        SecurityEvent {
            category: SecurityEventCategory::VerificationSucceeded,
            wallet_address: Some(&record.wallet_address),
            nonce_value: Some(&record.nonce_value),
            reason: None,
            metadata: Some(serde_json::json!({ "session_expires_at": expires_at })),
        },
    )
    .await;

    info!(
        wallet = %record.wallet_address,
        "Wallet signature verified, session created"
    );

    VerificationOutcome::Success {
        session_id,
        expires_at,
    }
}

/// Step 6b: persist the rejection, count the failure (possibly arming a
/// lockout), emit the audit record. The caller learns only that the
/// signature was invalid.
async fn reject_signature(
    pool: &DbPool,
    auth: &AuthConfig,
    request: &VerificationRequest<'_>,
    record: &NonceRecord,
    now: DateTime<Utc>,
    reason: &str,
) -> VerificationOutcome {
    if let Err(e) =
        NonceRepository::attach_outcome(pool, &record.nonce_value, request.signature, false, None)
            .await
    {
        error!(error = %e, "Failed to persist verification outcome");
        return VerificationOutcome::InternalError;
    }

    match RateLimitRepository::record_failure(
        pool,
        request.wallet_address,
        now,
        auth.lockout_threshold,
        auth.lockout_duration(),
    )
    .await
    {
        Ok(failure) => {
            if failure.consecutive_failures == auth.lockout_threshold {
                SecurityAuditService::record(
                    pool,
                    SecurityEvent {
                        category: SecurityEventCategory::LockoutTriggered,
                        wallet_address: Some(request.wallet_address),
                        nonce_value: Some(&record.nonce_value),
                        reason: None,
                        metadata: Some(serde_json::json!({
                            "locked_until": failure.locked_until
                        })),
                    },
                )
                .await;
            }
        }
        Err(e) => {
            // The rejection stands regardless; the uncounted failure only
            // delays a lockout.
            error!(error = %e, "Failed to record verification failure");
        }
    }

    SecurityAuditService::record(
        pool,
        SecurityEvent {
            category: SecurityEventCategory::VerificationFailed,
            wallet_address: Some(request.wallet_address),
            nonce_value: Some(&record.nonce_value),
            reason: Some(reason),
            metadata: None,
        },
    )
    .await;

    warn!(wallet = request.wallet_address, "Signature verification failed");

    VerificationOutcome::InvalidSignature
}

/// Log a consumption attempt on an already-spent nonce. Distinct categories
/// separate a replay of a merely consumed nonce from re-submission of one
/// that already passed verification.
async fn audit_replay(pool: &DbPool, record: &NonceRecord, previously_verified: bool) {
    let category = if previously_verified {
        SecurityEventCategory::ReverificationAttempt
    } else {
        SecurityEventCategory::ReplayAttempt
    };

    warn!(
        wallet = %record.wallet_address,
        category = category.as_str(),
        "Consumption attempt on an already-used nonce"
    );

    SecurityAuditService::record(
        pool,
        SecurityEvent {
            category,
            wallet_address: Some(&record.wallet_address),
            nonce_value: Some(&record.nonce_value),
            reason: None,
            metadata: None,
        },
    )
    .await;
}
