//! Challenge and token generation
//!
//! Nonces and session identifiers are 32 bytes from the OS CSPRNG,
//! hex-encoded. The challenge message embeds the nonce and the issuance
//! timestamp verbatim and is persisted as issued: the signature is over this
//! exact text, so it must be reproducible byte-for-byte at verification
//! time.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rand::RngCore;

/// Token length in bytes (256 bits of entropy)
const TOKEN_LENGTH: usize = 32;

/// A freshly generated challenge, ready to persist and hand to the client
#[derive(Debug, Clone)]
pub struct Challenge {
    /// Unique nonce (hex-encoded)
    pub nonce: String,
    /// The exact message the wallet is asked to sign
    pub message: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Generate an unguessable token for nonces and session ids
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Build a challenge for a wallet address
pub fn build(wallet_address: &str, now: DateTime<Utc>, ttl: Duration) -> Challenge {
    let nonce = generate_token();
    let message = render_message(wallet_address, &nonce, now);

    Challenge {
        nonce,
        message,
        issued_at: now,
        expires_at: now + ttl,
    }
}

/// Render the human-readable challenge message
fn render_message(wallet_address: &str, nonce: &str, issued_at: DateTime<Utc>) -> String {
    format!(
        "Sign this message to authenticate with your wallet\n\nWallet: {}\nNonce: {}\nIssued: {}",
        wallet_address,
        nonce,
        issued_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS: &str = "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb4";

    #[test]
    fn test_token_is_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_tokens_are_unique() {
        assert_ne!(generate_token(), generate_token());
    }

    #[test]
    fn test_challenge_message_embeds_address_and_nonce() {
        let challenge = build(ADDRESS, Utc::now(), Duration::hours(24));
        assert!(challenge.message.contains(ADDRESS));
        assert!(challenge.message.contains(&challenge.nonce));
    }

    #[test]
    fn test_challenge_message_embeds_issuance_timestamp() {
        let now = Utc::now();
        let challenge = build(ADDRESS, now, Duration::hours(24));
        assert!(challenge
            .message
            .contains(&now.to_rfc3339_opts(SecondsFormat::Secs, true)));
    }

    #[test]
    fn test_challenge_expiry_is_issuance_plus_ttl() {
        let now = Utc::now();
        let challenge = build(ADDRESS, now, Duration::hours(24));
        assert_eq!(challenge.issued_at, now);
        assert_eq!(challenge.expires_at, now + Duration::hours(24));
    }

    #[test]
    fn test_message_is_deterministic_given_inputs() {
        // The stored message must be reproducible from its parts
        let now = Utc::now();
        let a = render_message(ADDRESS, "deadbeef", now);
        let b = render_message(ADDRESS, "deadbeef", now);
        assert_eq!(a, b);
    }
}
