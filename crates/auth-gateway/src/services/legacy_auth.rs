//! Legacy verified-signature fallback
//!
//! Before the session model existed, a successful verification was recorded
//! directly on the nonce row (`verified = TRUE` plus a session expiry). This
//! module answers authentication checks from those records when no session
//! row exists, flagged `legacy` so callers can migrate the wallet to a real
//! session on its next login.
//!
//! Deliberately isolated from the primary session path: once every active
//! legacy record has expired or been migrated, delete this module and its
//! single call site.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use shared::DbPool;
use sqlx::FromRow;

/// Authentication state reconstructed from a legacy record
#[derive(Debug, Clone, FromRow)]
pub struct LegacyAuthStatus {
    pub wallet_address: String,
    pub session_expires_at: DateTime<Utc>,
}

/// Look for a still-valid legacy verification for this address
pub async fn check_legacy_verification(
    pool: &DbPool,
    wallet_address: &str,
    now: DateTime<Utc>,
) -> Result<Option<LegacyAuthStatus>> {
    let record = sqlx::query_as::<_, LegacyAuthStatus>(
        r#"
        SELECT wallet_address, session_expires_at
        FROM wallet_nonces
        WHERE wallet_address = $1
          AND verified = TRUE
          AND session_expires_at > $2
        ORDER BY session_expires_at DESC
        LIMIT 1
        "#,
    )
    .bind(wallet_address)
    .bind(now)
    .fetch_optional(pool)
    .await
    .context("Failed to check legacy verification records")?;

    Ok(record)
}
