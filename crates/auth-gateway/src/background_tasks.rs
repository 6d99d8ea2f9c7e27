//! Background housekeeping tasks
//!
//! Periodic sweeps that keep the auth tables tidy:
//!
//! - **Nonce sweep**: removes expired challenges and consumed ones past the
//!   audit retention window
//! - **Lockout sweep**: clears lapsed lockouts and their failure streaks
//!
//! Both jobs are idempotent and independent of the request-serving path;
//! they may run concurrently with it. The serving path also clears lapsed
//! lockouts lazily, so the sweep is a floor on staleness, not a correctness
//! requirement.
//!
//! # Configuration
//!
//! - `NONCE_SWEEP_INTERVAL_SECS`: interval between nonce sweeps (default 3600)
//! - `LOCKOUT_SWEEP_INTERVAL_SECS`: interval between lockout sweeps (default 300)

use shared::{db, AuthConfig, DbPool};
use std::env;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::repositories::{NonceRepository, RateLimitRepository};

/// Default interval for the nonce sweep (1 hour)
const DEFAULT_NONCE_SWEEP_INTERVAL_SECS: u64 = 3600;

/// Default interval for the lockout sweep (5 minutes)
const DEFAULT_LOCKOUT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Minimum interval for either sweep
const MIN_SWEEP_INTERVAL_SECS: u64 = 60;

/// Background task configuration
#[derive(Debug, Clone)]
pub struct BackgroundTaskConfig {
    /// Interval between nonce sweeps
    pub nonce_sweep_interval: Duration,
    /// Interval between lockout sweeps
    pub lockout_sweep_interval: Duration,
}

impl Default for BackgroundTaskConfig {
    fn default() -> Self {
        let nonce_secs = env::var("NONCE_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_NONCE_SWEEP_INTERVAL_SECS)
            .max(MIN_SWEEP_INTERVAL_SECS);

        let lockout_secs = env::var("LOCKOUT_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_LOCKOUT_SWEEP_INTERVAL_SECS)
            .max(MIN_SWEEP_INTERVAL_SECS);

        Self {
            nonce_sweep_interval: Duration::from_secs(nonce_secs),
            lockout_sweep_interval: Duration::from_secs(lockout_secs),
        }
    }
}

/// Background task runner
pub struct BackgroundTaskRunner {
    pool: DbPool,
    auth: AuthConfig,
    config: BackgroundTaskConfig,
}

impl BackgroundTaskRunner {
    /// Create a new background task runner
    pub fn new(pool: DbPool, auth: AuthConfig) -> Self {
        Self::with_config(pool, auth, BackgroundTaskConfig::default())
    }

    /// Create a new background task runner with custom configuration
    pub fn with_config(pool: DbPool, auth: AuthConfig, config: BackgroundTaskConfig) -> Self {
        Self { pool, auth, config }
    }

    /// Start all background tasks
    ///
    /// Returns a cancellation token that stops every task when cancelled.
    pub fn start(self) -> CancellationToken {
        let cancel_token = CancellationToken::new();

        let nonce_token = cancel_token.clone();
        let nonce_pool = self.pool.clone();
        let nonce_auth = self.auth.clone();
        let nonce_interval = self.config.nonce_sweep_interval;

        tokio::spawn(async move {
            run_nonce_sweep(nonce_pool, nonce_auth, nonce_interval, nonce_token).await;
        });

        let lockout_token = cancel_token.clone();
        let lockout_pool = self.pool.clone();
        let lockout_interval = self.config.lockout_sweep_interval;

        tokio::spawn(async move {
            run_lockout_sweep(lockout_pool, lockout_interval, lockout_token).await;
        });

        info!(
            nonce_sweep_interval_secs = self.config.nonce_sweep_interval.as_secs(),
            lockout_sweep_interval_secs = self.config.lockout_sweep_interval.as_secs(),
            "Background tasks started"
        );

        cancel_token
    }
}

/// Run the nonce sweep loop
async fn run_nonce_sweep(
    pool: DbPool,
    auth: AuthConfig,
    sweep_interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut interval = interval(sweep_interval);

    // Skip the first tick (which fires immediately)
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("Nonce sweep task stopping due to shutdown");
                break;
            }
            _ = interval.tick() => {
                sweep_expired_nonces(&pool, &auth).await;
            }
        }
    }
}

/// Perform one nonce sweep
async fn sweep_expired_nonces(pool: &DbPool, auth: &AuthConfig) {
    debug!("Starting nonce sweep");

    let now = db::db_now();
    let retention_cutoff = now - auth.nonce_retention();

    match NonceRepository::sweep_expired(pool, now, retention_cutoff).await {
        Ok(count) => {
            if count > 0 {
                info!(deleted_count = count, "Swept expired nonces");
            } else {
                debug!("No expired nonces to sweep");
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to sweep expired nonces");
        }
    }
}

/// Run the lockout sweep loop
async fn run_lockout_sweep(
    pool: DbPool,
    sweep_interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut interval = interval(sweep_interval);

    // Skip the first tick (which fires immediately)
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("Lockout sweep task stopping due to shutdown");
                break;
            }
            _ = interval.tick() => {
                sweep_expired_lockouts(&pool).await;
            }
        }
    }
}

/// Perform one lockout sweep
async fn sweep_expired_lockouts(pool: &DbPool) {
    debug!("Starting lockout sweep");

    match RateLimitRepository::clear_expired_lockouts(pool, db::db_now()).await {
        Ok(count) => {
            if count > 0 {
                info!(cleared_count = count, "Cleared expired lockouts");
            } else {
                debug!("No expired lockouts to clear");
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to clear expired lockouts");
        }
    }
}
