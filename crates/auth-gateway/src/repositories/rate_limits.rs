//! Rate limit repository: per-(address, action) counters with lockouts
//!
//! Every mutation is a single upsert whose CASE arms encode the whole
//! window/lockout policy, so concurrent requests from the same address never
//! interleave a read with a write. The Allowed/Denied decision is derived
//! from the returned row by a pure function: an attempt was counted exactly
//! when the statement stamped `last_attempt_at` with the caller's timestamp.
//!
//! Counters are a frequency governor, not the hard security boundary (that
//! is nonce consumption); a one-off over- or under-count between concurrent
//! allowed attempts is tolerated. Storage failures propagate as errors and
//! callers treat them as denials, never as silent approval.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use shared::DbPool;
use sqlx::FromRow;

/// Rate-limited action kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitAction {
    NonceGeneration,
    SignatureVerification,
}

impl RateLimitAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitAction::NonceGeneration => "nonce_generation",
            RateLimitAction::SignatureVerification => "signature_verification",
        }
    }
}

/// Rate limit counter record from database
#[derive(Debug, Clone, FromRow)]
pub struct RateLimitRecord {
    pub wallet_address: String,
    pub action_kind: String,
    pub attempt_count: i32,
    pub window_start: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
    pub consecutive_failures: i32,
    pub locked_until: Option<DateTime<Utc>>,
}

/// Why an attempt was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDenyReason {
    /// The attempt ceiling for the current window is exhausted
    WindowExhausted,
    /// A consecutive-failure lockout is active
    LockedOut,
}

/// Decision for a single attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Denied {
        reason: RateLimitDenyReason,
        /// Seconds until the caller may retry. Lockout durations are rounded
        /// up to whole minutes; that figure is all the caller ever learns.
        retry_after_secs: i64,
    },
}

/// Result of recording a verification failure
#[derive(Debug, Clone, FromRow)]
pub struct FailureRecord {
    pub consecutive_failures: i32,
    pub locked_until: Option<DateTime<Utc>>,
}

pub struct RateLimitRepository;

impl RateLimitRepository {
    /// Count one attempt against the (address, action) counter and decide
    /// whether it is allowed.
    ///
    /// The upsert leaves the row untouched while a lockout is active or the
    /// ceiling is reached, resets the window on the first attempt after it
    /// lapses, and lazily clears an expired lockout together with the
    /// failure streak.
    pub async fn check_and_record_attempt(
        pool: &DbPool,
        wallet_address: &str,
        action: RateLimitAction,
        now: DateTime<Utc>,
        window: Duration,
        max_attempts: i32,
    ) -> Result<RateLimitDecision> {
        let window_cutoff = now - window;

        let record = sqlx::query_as::<_, RateLimitRecord>(
            r#"
            INSERT INTO auth_rate_limits
                (wallet_address, action_kind, attempt_count, window_start,
                 last_attempt_at, consecutive_failures, locked_until)
            VALUES ($1, $2, 1, $3, $3, 0, NULL)
            ON CONFLICT (wallet_address, action_kind) DO UPDATE SET
                attempt_count = CASE
                    WHEN auth_rate_limits.locked_until > $3
                        THEN auth_rate_limits.attempt_count
                    WHEN auth_rate_limits.window_start < $4 THEN 1
                    WHEN auth_rate_limits.attempt_count < $5
                        THEN auth_rate_limits.attempt_count + 1
                    ELSE auth_rate_limits.attempt_count
                END,
                window_start = CASE
                    WHEN auth_rate_limits.locked_until > $3
                        THEN auth_rate_limits.window_start
                    WHEN auth_rate_limits.window_start < $4 THEN $3
                    ELSE auth_rate_limits.window_start
                END,
                last_attempt_at = CASE
                    WHEN auth_rate_limits.locked_until > $3
                        THEN auth_rate_limits.last_attempt_at
                    WHEN auth_rate_limits.window_start < $4 THEN $3
                    WHEN auth_rate_limits.attempt_count < $5 THEN $3
                    ELSE auth_rate_limits.last_attempt_at
                END,
                consecutive_failures = CASE
                    WHEN auth_rate_limits.locked_until <= $3 THEN 0
                    ELSE auth_rate_limits.consecutive_failures
                END,
                locked_until = CASE
                    WHEN auth_rate_limits.locked_until <= $3 THEN NULL
                    ELSE auth_rate_limits.locked_until
                END
            RETURNING wallet_address, action_kind, attempt_count, window_start,
                      last_attempt_at, consecutive_failures, locked_until
            "#,
        )
        .bind(wallet_address)
        .bind(action.as_str())
        .bind(now)
        .bind(window_cutoff)
        .bind(max_attempts)
        .fetch_one(pool)
        .await
        .context("Failed to record rate limit attempt")?;

        Ok(decide(&record, now, window))
    }

    /// Record a signature verification failure; arms the lockout when the
    /// streak reaches the threshold.
    pub async fn record_failure(
        pool: &DbPool,
        wallet_address: &str,
        now: DateTime<Utc>,
        threshold: i32,
        lockout: Duration,
    ) -> Result<FailureRecord> {
        let locked_until = now + lockout;

        let record = sqlx::query_as::<_, FailureRecord>(
            r#"
            INSERT INTO auth_rate_limits
                (wallet_address, action_kind, attempt_count, window_start,
                 last_attempt_at, consecutive_failures, locked_until)
            VALUES ($1, 'signature_verification', 0, $2, $2, 1,
                    CASE WHEN 1 >= $3 THEN $4 ELSE NULL END)
            ON CONFLICT (wallet_address, action_kind) DO UPDATE SET
                consecutive_failures = auth_rate_limits.consecutive_failures + 1,
                locked_until = CASE
                    WHEN auth_rate_limits.consecutive_failures + 1 >= $3 THEN $4
                    ELSE auth_rate_limits.locked_until
                END
            RETURNING consecutive_failures, locked_until
            "#,
        )
        .bind(wallet_address)
        .bind(now)
        .bind(threshold)
        .bind(locked_until)
        .fetch_one(pool)
        .await
        .context("Failed to record verification failure")?;

        Ok(record)
    }

    /// Reset the failure streak and clear any lockout after a successful
    /// verification
    pub async fn record_success(pool: &DbPool, wallet_address: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE auth_rate_limits
            SET consecutive_failures = 0, locked_until = NULL
            WHERE wallet_address = $1 AND action_kind = 'signature_verification'
            "#,
        )
        .bind(wallet_address)
        .execute(pool)
        .await
        .context("Failed to reset verification failures")?;

        Ok(())
    }

    /// Delete all counters for an address (support escape hatch)
    pub async fn reset_for_address(pool: &DbPool, wallet_address: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM auth_rate_limits WHERE wallet_address = $1")
            .bind(wallet_address)
            .execute(pool)
            .await
            .context("Failed to reset rate limits")?;

        Ok(result.rows_affected())
    }

    /// Clear lockouts that have lapsed (maintenance task)
    pub async fn clear_expired_lockouts(pool: &DbPool, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE auth_rate_limits
            SET locked_until = NULL, consecutive_failures = 0
            WHERE locked_until IS NOT NULL AND locked_until < $1
            "#,
        )
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to clear expired lockouts")?;

        Ok(result.rows_affected())
    }
}

/// Derive the decision from the post-upsert row.
///
/// The statement stamps `last_attempt_at = now` exactly when the attempt was
/// counted, so equality with the caller's timestamp is the Allowed signal.
pub fn decide(record: &RateLimitRecord, now: DateTime<Utc>, window: Duration) -> RateLimitDecision {
    if let Some(locked_until) = record.locked_until {
        if locked_until > now {
            return RateLimitDecision::Denied {
                reason: RateLimitDenyReason::LockedOut,
                retry_after_secs: ceil_to_minutes_secs(locked_until - now),
            };
        }
    }

    if record.last_attempt_at == now {
        return RateLimitDecision::Allowed;
    }

    let elapsed = now - record.window_start;
    let retry_after = (window - elapsed).num_seconds().max(1);
    RateLimitDecision::Denied {
        reason: RateLimitDenyReason::WindowExhausted,
        retry_after_secs: retry_after,
    }
}

/// Round a remaining duration up to whole minutes, expressed in seconds
fn ceil_to_minutes_secs(remaining: Duration) -> i64 {
    let secs = remaining.num_seconds().max(0);
    (secs as u64).div_ceil(60) as i64 * 60
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS: &str = "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb4";

    fn record(
        attempt_count: i32,
        window_age: Duration,
        counted_now: bool,
        now: DateTime<Utc>,
    ) -> RateLimitRecord {
        RateLimitRecord {
            wallet_address: ADDRESS.to_string(),
            action_kind: "signature_verification".to_string(),
            attempt_count,
            window_start: now - window_age,
            last_attempt_at: if counted_now { now } else { now - Duration::seconds(30) },
            consecutive_failures: 0,
            locked_until: None,
        }
    }

    // ========================================================================
    // decide() tests
    // ========================================================================

    #[test]
    fn test_first_attempt_allowed() {
        let now = Utc::now();
        let r = record(1, Duration::zero(), true, now);
        assert_eq!(decide(&r, now, Duration::hours(1)), RateLimitDecision::Allowed);
    }

    #[test]
    fn test_attempt_under_ceiling_allowed() {
        let now = Utc::now();
        let r = record(49, Duration::minutes(30), true, now);
        assert_eq!(decide(&r, now, Duration::hours(1)), RateLimitDecision::Allowed);
    }

    #[test]
    fn test_attempt_at_ceiling_denied_with_window_remainder() {
        let now = Utc::now();
        // Counter stayed at 50, last_attempt_at untouched: not counted
        let r = record(50, Duration::minutes(40), false, now);
        match decide(&r, now, Duration::hours(1)) {
            RateLimitDecision::Denied {
                reason,
                retry_after_secs,
            } => {
                assert_eq!(reason, RateLimitDenyReason::WindowExhausted);
                assert_eq!(retry_after_secs, 20 * 60);
            }
            other => panic!("expected denial, got {:?}", other),
        }
    }

    #[test]
    fn test_window_rollover_allows_and_resets() {
        let now = Utc::now();
        // After rollover the statement resets the row to count=1, fresh window
        let r = record(1, Duration::zero(), true, now);
        assert_eq!(decide(&r, now, Duration::hours(1)), RateLimitDecision::Allowed);
    }

    #[test]
    fn test_active_lockout_denied_rounded_up_to_minutes() {
        let now = Utc::now();
        let mut r = record(1, Duration::minutes(5), false, now);
        r.locked_until = Some(now + Duration::seconds(61));
        match decide(&r, now, Duration::hours(1)) {
            RateLimitDecision::Denied {
                reason,
                retry_after_secs,
            } => {
                assert_eq!(reason, RateLimitDenyReason::LockedOut);
                assert_eq!(retry_after_secs, 120);
            }
            other => panic!("expected lockout denial, got {:?}", other),
        }
    }

    #[test]
    fn test_lockout_takes_precedence_over_counted_attempt() {
        let now = Utc::now();
        // Even if the row claims the attempt was counted, an active lockout
        // wins
        let mut r = record(1, Duration::zero(), true, now);
        r.locked_until = Some(now + Duration::minutes(10));
        assert!(matches!(
            decide(&r, now, Duration::hours(1)),
            RateLimitDecision::Denied {
                reason: RateLimitDenyReason::LockedOut,
                ..
            }
        ));
    }

    #[test]
    fn test_expired_lockout_does_not_deny() {
        let now = Utc::now();
        let mut r = record(2, Duration::minutes(5), true, now);
        // Lazily-cleared lockouts come back as NULL, but guard the boundary
        r.locked_until = Some(now - Duration::seconds(1));
        assert_eq!(decide(&r, now, Duration::hours(1)), RateLimitDecision::Allowed);
    }

    #[test]
    fn test_denied_retry_after_is_positive() {
        let now = Utc::now();
        // Window nearly over: remainder clamps to at least one second
        let r = record(50, Duration::seconds(3599), false, now);
        match decide(&r, now, Duration::hours(1)) {
            RateLimitDecision::Denied {
                retry_after_secs, ..
            } => assert!(retry_after_secs >= 1),
            other => panic!("expected denial, got {:?}", other),
        }
    }

    // ========================================================================
    // ceil_to_minutes_secs tests
    // ========================================================================

    #[test]
    fn test_ceil_exact_minute_unchanged() {
        assert_eq!(ceil_to_minutes_secs(Duration::minutes(3)), 180);
    }

    #[test]
    fn test_ceil_partial_minute_rounds_up() {
        assert_eq!(ceil_to_minutes_secs(Duration::seconds(1)), 60);
        assert_eq!(ceil_to_minutes_secs(Duration::seconds(59)), 60);
        assert_eq!(ceil_to_minutes_secs(Duration::seconds(3601)), 3660);
    }

    #[test]
    fn test_ceil_negative_clamps_to_zero() {
        assert_eq!(ceil_to_minutes_secs(Duration::seconds(-5)), 0);
    }

    #[test]
    fn test_action_kind_strings() {
        assert_eq!(RateLimitAction::NonceGeneration.as_str(), "nonce_generation");
        assert_eq!(
            RateLimitAction::SignatureVerification.as_str(),
            "signature_verification"
        );
    }
}
