//! Session repository
//!
//! Sessions are append-only: minted by a successful verification, ended by
//! explicit revocation or expiry. Multiple live sessions per address are
//! allowed; authentication checks take the most recently created one.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use shared::DbPool;
use sqlx::FromRow;

/// Session record from database
#[derive(Debug, Clone, FromRow)]
pub struct SessionRecord {
    pub session_id: String,
    pub wallet_address: String,
    pub wallet_label: Option<String>,
    pub device_id: Option<String>,
    pub origin: Option<String>,
    pub platform: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

/// Parameters for minting a session
pub struct NewSession<'a> {
    pub session_id: &'a str,
    pub wallet_address: &'a str,
    pub wallet_label: Option<&'a str>,
    pub device_id: Option<&'a str>,
    pub origin: Option<&'a str>,
    pub platform: Option<&'a str>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub struct SessionRepository;

impl SessionRepository {
    /// Create a new session row
    pub async fn create(pool: &DbPool, session: NewSession<'_>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO wallet_sessions
                (session_id, wallet_address, wallet_label, device_id, origin,
                 platform, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(session.session_id)
        .bind(session.wallet_address)
        .bind(session.wallet_label)
        .bind(session.device_id)
        .bind(session.origin)
        .bind(session.platform)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(pool)
        .await
        .context("Failed to create session")?;

        Ok(())
    }

    /// Most recent non-revoked, unexpired session for an address
    pub async fn find_active(
        pool: &DbPool,
        wallet_address: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>> {
        let record = sqlx::query_as::<_, SessionRecord>(
            r#"
            SELECT session_id, wallet_address, wallet_label, device_id, origin,
                   platform, created_at, expires_at, revoked_at
            FROM wallet_sessions
            WHERE wallet_address = $1
              AND revoked_at IS NULL
              AND expires_at > $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(wallet_address)
        .bind(now)
        .fetch_optional(pool)
        .await
        .context("Failed to find active session")?;

        Ok(record)
    }

    /// Revoke a session by id; returns false if it was already revoked or
    /// never existed
    pub async fn revoke(pool: &DbPool, session_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE wallet_sessions
            SET revoked_at = $2
            WHERE session_id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(session_id)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to revoke session")?;

        Ok(result.rows_affected() > 0)
    }
}
