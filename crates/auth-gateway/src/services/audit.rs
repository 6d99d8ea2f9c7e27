//! Security audit sink
//!
//! Records structured security events (replay attempts, lockouts,
//! verification outcomes) for later analysis. Strictly fire-and-forget: a
//! failed insert is logged and swallowed, never allowed to block or fail
//! the auth flow that emitted it.

use shared::DbPool;
use uuid::Uuid;

/// Event categories for the security audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityEventCategory {
    /// A consumption attempt on an already-consumed nonce
    ReplayAttempt,
    /// A consumption attempt on a nonce that previously passed verification
    ReverificationAttempt,
    VerificationSucceeded,
    VerificationFailed,
    LockoutTriggered,
    VerifierError,
}

impl SecurityEventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventCategory::ReplayAttempt => "replay_attempt",
            SecurityEventCategory::ReverificationAttempt => "reverification_attempt",
            SecurityEventCategory::VerificationSucceeded => "verification_succeeded",
            SecurityEventCategory::VerificationFailed => "verification_failed",
            SecurityEventCategory::LockoutTriggered => "lockout_triggered",
            SecurityEventCategory::VerifierError => "verifier_error",
        }
    }
}

/// A single security event
pub struct SecurityEvent<'a> {
    pub category: SecurityEventCategory,
    pub wallet_address: Option<&'a str>,
    pub nonce_value: Option<&'a str>,
    pub reason: Option<&'a str>,
    pub metadata: Option<serde_json::Value>,
}

pub struct SecurityAuditService;

impl SecurityAuditService {
    /// Record an event, swallowing storage failures
    pub async fn record(pool: &DbPool, event: SecurityEvent<'_>) {
        let result = sqlx::query(
            r#"
            INSERT INTO security_audit_log (id, category, wallet_address, nonce_value, reason, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event.category.as_str())
        .bind(event.wallet_address)
        .bind(event.nonce_value)
        .bind(event.reason)
        .bind(event.metadata.unwrap_or_else(|| serde_json::json!({})))
        .execute(pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(
                category = event.category.as_str(),
                error = %e,
                "Failed to record security audit event"
            );
        }
    }
}
