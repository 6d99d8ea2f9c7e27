//! Wallet authentication DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validators::WALLET_ADDRESS_REGEX;

/// Custom validator for wallet addresses
fn validate_wallet_address(address: &str) -> Result<(), validator::ValidationError> {
    if WALLET_ADDRESS_REGEX.is_match(address) {
        Ok(())
    } else {
        Err(validator::ValidationError::new("invalid_wallet_address"))
    }
}

// ============================================================================
// Nonce issuance DTOs
// ============================================================================

/// Request a single-use challenge nonce for signature authentication
#[derive(Debug, Deserialize, Validate)]
pub struct NonceRequest {
    /// Wallet address (0x + 40 hex chars)
    #[validate(length(equal = 42), custom(function = "validate_wallet_address"))]
    pub wallet_address: String,

    /// Display label for the wallet (e.g. "MetaMask")
    pub wallet_label: Option<String>,

    /// Optional device correlation tag
    pub device_id: Option<String>,

    /// Client origin; the Origin request header takes precedence when present
    pub origin: Option<String>,
}

/// Response containing the challenge to sign
#[derive(Debug, Serialize)]
pub struct NonceResponse {
    /// The exact message to sign with the wallet
    pub challenge_message: String,
    /// Unique single-use nonce
    pub nonce: String,
    /// Challenge expiration time
    pub expires_at: DateTime<Utc>,
}

// ============================================================================
// Verification DTOs
// ============================================================================

/// Submit a signed challenge for verification
#[derive(Debug, Deserialize, Validate)]
pub struct VerifyRequest {
    /// Wallet address claiming the nonce
    #[validate(length(equal = 42), custom(function = "validate_wallet_address"))]
    pub wallet_address: String,

    /// Nonce from the challenge response
    #[validate(length(min = 1))]
    pub nonce: String,

    /// EIP-191 signature (0x + 130 hex chars)
    #[validate(length(equal = 132))]
    pub signature: String,

    /// Display label stored on the minted session
    pub wallet_label: Option<String>,

    /// Platform tag stored on the minted session (e.g. "web", "desktop")
    pub platform: Option<String>,
}

/// Response after a successful verification
#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub verified: bool,
    /// Opaque session identifier
    pub session_id: String,
    /// Session expiration time
    pub expires_at: DateTime<Utc>,
}

// ============================================================================
// Session status DTOs
// ============================================================================

/// Response for an authentication status check
#[derive(Debug, Serialize)]
pub struct AuthStatusResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Set when the answer came from the pre-session legacy records
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legacy: Option<bool>,
}

impl AuthStatusResponse {
    pub fn unauthenticated() -> Self {
        Self {
            authenticated: false,
            session_id: None,
            wallet_label: None,
            expires_at: None,
            legacy: None,
        }
    }
}

/// Request to revoke a session
#[derive(Debug, Deserialize, Validate)]
pub struct LogoutRequest {
    #[validate(length(min = 1))]
    pub session_id: String,
}

/// Response after a logout attempt
#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub revoked: bool,
}

// ============================================================================
// Admin DTOs
// ============================================================================

/// Response after an administrative rate-limit reset
#[derive(Debug, Serialize)]
pub struct ResetRateLimitResponse {
    /// Number of counter rows deleted
    pub reset_count: u64,
}
