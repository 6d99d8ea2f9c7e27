//! Nonce repository: challenge lifecycle from issuance to retention sweep
//!
//! Consumption is the one operation with a hard atomicity requirement: the
//! `consumed_at` transition is a conditional update, never a read-then-write,
//! so exactly one of any number of racing callers observes success.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use shared::DbPool;
use sqlx::FromRow;

/// Challenge nonce record from database
#[derive(Debug, Clone, FromRow)]
pub struct NonceRecord {
    pub nonce_value: String,
    pub wallet_address: String,
    pub challenge_message: String,
    pub device_id: Option<String>,
    pub origin: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub signature: Option<String>,
    /// Legacy verification flag; any non-null value means the nonce was
    /// already processed under either the old or the new consumption model
    pub verified: Option<bool>,
    pub session_expires_at: Option<DateTime<Utc>>,
}

/// Outcome of a consumption attempt
#[derive(Debug, Clone)]
pub enum ConsumeOutcome {
    /// This caller won the conditional update
    Consumed(Box<NonceRecord>),
    NotFound,
    Expired,
    /// Replay, double-submission, or a lost consumption race.
    /// `previously_verified` marks the distinct anomaly of re-submitting a
    /// nonce that already passed verification.
    AlreadyConsumed { previously_verified: bool },
}

const SELECT_COLUMNS: &str = "nonce_value, wallet_address, challenge_message, device_id, origin, \
     issued_at, expires_at, consumed_at, signature, verified, session_expires_at";

/// Parameters for storing a freshly issued nonce
pub struct NewNonce<'a> {
    pub nonce_value: &'a str,
    pub wallet_address: &'a str,
    pub challenge_message: &'a str,
    pub device_id: Option<&'a str>,
    pub origin: Option<&'a str>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub struct NonceRepository;

impl NonceRepository {
    /// Store a freshly issued challenge nonce
    pub async fn create(pool: &DbPool, nonce: NewNonce<'_>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO wallet_nonces
                (nonce_value, wallet_address, challenge_message, device_id, origin, issued_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(nonce.nonce_value)
        .bind(nonce.wallet_address)
        .bind(nonce.challenge_message)
        .bind(nonce.device_id)
        .bind(nonce.origin)
        .bind(nonce.issued_at)
        .bind(nonce.expires_at)
        .execute(pool)
        .await
        .context("Failed to store nonce")?;

        Ok(())
    }

    /// Check whether an unconsumed, unexpired nonce already exists for this
    /// (address, device) pair
    pub async fn has_pending(
        pool: &DbPool,
        wallet_address: &str,
        device_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM wallet_nonces
                WHERE wallet_address = $1
                  AND device_id IS NOT DISTINCT FROM $2
                  AND consumed_at IS NULL
                  AND verified IS NULL
                  AND expires_at > $3
            )
            "#,
        )
        .bind(wallet_address)
        .bind(device_id)
        .bind(now)
        .fetch_one(pool)
        .await
        .context("Failed to check for pending nonce")?;

        Ok(exists)
    }

    /// Find a nonce by value
    pub async fn find_by_value(pool: &DbPool, nonce_value: &str) -> Result<Option<NonceRecord>> {
        let record = sqlx::query_as::<_, NonceRecord>(&format!(
            "SELECT {SELECT_COLUMNS} FROM wallet_nonces WHERE nonce_value = $1"
        ))
        .bind(nonce_value)
        .fetch_optional(pool)
        .await
        .context("Failed to find nonce")?;

        Ok(record)
    }

    /// Atomically mark a nonce as consumed
    ///
    /// The guard condition makes this a compare-and-set: the update succeeds
    /// only while `consumed_at` is null, the legacy flag is unset, and the
    /// nonce is unexpired. When the update matches no row, a follow-up read
    /// classifies the rejection.
    pub async fn consume(
        pool: &DbPool,
        nonce_value: &str,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome> {
        let consumed = sqlx::query_as::<_, NonceRecord>(&format!(
            r#"
            UPDATE wallet_nonces
            SET consumed_at = $2
            WHERE nonce_value = $1
              AND consumed_at IS NULL
              AND verified IS NULL
              AND expires_at > $2
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(nonce_value)
        .bind(now)
        .fetch_optional(pool)
        .await
        .context("Failed to consume nonce")?;

        if let Some(record) = consumed {
            return Ok(ConsumeOutcome::Consumed(Box::new(record)));
        }

        let record = Self::find_by_value(pool, nonce_value).await?;
        Ok(classify_failed_consume(record.as_ref(), now))
    }

    /// Record the final signature and verification outcome on a consumed
    /// nonce, together with the session expiry granted on success.
    ///
    /// Single statement: either all three fields land or none do.
    pub async fn attach_outcome(
        pool: &DbPool,
        nonce_value: &str,
        signature: &str,
        verified: bool,
        session_expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE wallet_nonces
            SET signature = $2, verified = $3, session_expires_at = $4
            WHERE nonce_value = $1
            "#,
        )
        .bind(nonce_value)
        .bind(signature)
        .bind(verified)
        .bind(session_expires_at)
        .execute(pool)
        .await
        .context("Failed to attach verification outcome")?;

        Ok(())
    }

    /// Delete nonces that no longer serve the protocol or the audit trail:
    /// expired without ever being processed, consumed past the retention
    /// window, or legacy-verified with a session expiry past the cutoff.
    ///
    /// Verified rows are exempt from the plain-expiry clause so the legacy
    /// authentication fallback keeps working while the session a nonce
    /// produced is still alive.
    pub async fn sweep_expired(
        pool: &DbPool,
        now: DateTime<Utc>,
        retention_cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM wallet_nonces
            WHERE (expires_at < $1 AND consumed_at IS NULL AND verified IS DISTINCT FROM TRUE)
               OR (consumed_at IS NOT NULL AND consumed_at < $2)
               OR (verified IS NOT NULL AND session_expires_at IS NOT NULL AND session_expires_at < $2)
            "#,
        )
        .bind(now)
        .bind(retention_cutoff)
        .execute(pool)
        .await
        .context("Failed to sweep expired nonces")?;

        Ok(result.rows_affected())
    }
}

/// Classify why the conditional consumption update matched no row.
///
/// AlreadyConsumed wins over Expired so replays of stale nonces still
/// surface as anomalies rather than routine expiry rejections.
pub fn classify_failed_consume(record: Option<&NonceRecord>, now: DateTime<Utc>) -> ConsumeOutcome {
    match record {
        None => ConsumeOutcome::NotFound,
        Some(r) if r.consumed_at.is_some() || r.verified.is_some() => {
            ConsumeOutcome::AlreadyConsumed {
                previously_verified: r.verified == Some(true),
            }
        }
        Some(r) if r.expires_at <= now => ConsumeOutcome::Expired,
        // The row looked consumable on the follow-up read, so the guard was
        // beaten between our two statements; treat like any lost race.
        Some(_) => ConsumeOutcome::AlreadyConsumed {
            previously_verified: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(expires_in: Duration) -> NonceRecord {
        let now = Utc::now();
        NonceRecord {
            nonce_value: "a".repeat(64),
            wallet_address: "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb4".to_string(),
            challenge_message: "Sign in".to_string(),
            device_id: None,
            origin: None,
            issued_at: now,
            expires_at: now + expires_in,
            consumed_at: None,
            signature: None,
            verified: None,
            session_expires_at: None,
        }
    }

    #[test]
    fn test_classify_missing_record() {
        let outcome = classify_failed_consume(None, Utc::now());
        assert!(matches!(outcome, ConsumeOutcome::NotFound));
    }

    #[test]
    fn test_classify_consumed_record() {
        let mut r = record(Duration::hours(1));
        r.consumed_at = Some(Utc::now());
        let outcome = classify_failed_consume(Some(&r), Utc::now());
        assert!(matches!(
            outcome,
            ConsumeOutcome::AlreadyConsumed {
                previously_verified: false
            }
        ));
    }

    #[test]
    fn test_classify_previously_verified_record() {
        let mut r = record(Duration::hours(1));
        r.consumed_at = Some(Utc::now());
        r.verified = Some(true);
        let outcome = classify_failed_consume(Some(&r), Utc::now());
        assert!(matches!(
            outcome,
            ConsumeOutcome::AlreadyConsumed {
                previously_verified: true
            }
        ));
    }

    #[test]
    fn test_classify_legacy_flag_counts_as_consumed() {
        // Old consumption model set `verified` without `consumed_at`
        let mut r = record(Duration::hours(1));
        r.verified = Some(false);
        let outcome = classify_failed_consume(Some(&r), Utc::now());
        assert!(matches!(outcome, ConsumeOutcome::AlreadyConsumed { .. }));
    }

    #[test]
    fn test_classify_expired_record() {
        let r = record(Duration::hours(-1));
        let outcome = classify_failed_consume(Some(&r), Utc::now());
        assert!(matches!(outcome, ConsumeOutcome::Expired));
    }

    #[test]
    fn test_classify_consumed_wins_over_expired() {
        let mut r = record(Duration::hours(-1));
        r.consumed_at = Some(Utc::now() - Duration::hours(2));
        let outcome = classify_failed_consume(Some(&r), Utc::now());
        assert!(matches!(outcome, ConsumeOutcome::AlreadyConsumed { .. }));
    }

    #[test]
    fn test_classify_lost_race_treated_as_consumed() {
        let r = record(Duration::hours(1));
        let outcome = classify_failed_consume(Some(&r), Utc::now());
        assert!(matches!(
            outcome,
            ConsumeOutcome::AlreadyConsumed {
                previously_verified: false
            }
        ));
    }
}
