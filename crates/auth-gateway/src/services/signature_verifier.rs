//! Signature verification seam
//!
//! The auth core treats cryptographic verification as an opaque capability
//! behind the `SignatureVerifier` trait: given the claimed address, the
//! nonce, the signature and the exact challenge message, answer valid or
//! invalid. `Eip191Verifier` is the production implementation (personal_sign
//! recovery); tests substitute a mock.
//!
//! `call_with_timeout` is the only place the gateway touches the verifier:
//! it bounds the call and flattens the result into an outcome the state
//! machine can branch on without ever propagating a panic or hang.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use alloy::primitives::{keccak256, PrimitiveSignature, B256, U256};
use alloy::signers::k256::ecdsa::VerifyingKey;

/// Errors surfaced by a verification capability itself (not by a bad
/// signature — those are an `Ok(false)` answer)
#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("Verifier unavailable: {0}")]
    Unavailable(String),
}

/// Opaque cryptographic verification capability
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    /// Check that `signature` over `message` was produced by `address`.
    ///
    /// Malformed signatures are an invalid-signature answer, not an error;
    /// `Err` is reserved for the capability itself failing.
    async fn verify(
        &self,
        address: &str,
        nonce: &str,
        signature: &str,
        message: &str,
    ) -> Result<bool, VerifierError>;
}

/// Flattened result of a bounded verifier call
#[derive(Debug)]
pub enum VerifierCallOutcome {
    Valid,
    Invalid,
    /// The call exceeded its deadline; treated like a rejection downstream
    TimedOut,
    /// The capability itself failed
    Failed(String),
}

/// Invoke the verifier with a deadline, converting every failure mode into
/// a typed outcome
pub async fn call_with_timeout(
    verifier: &dyn SignatureVerifier,
    timeout: Duration,
    address: &str,
    nonce: &str,
    signature: &str,
    message: &str,
) -> VerifierCallOutcome {
    match tokio::time::timeout(timeout, verifier.verify(address, nonce, signature, message)).await {
        Ok(Ok(true)) => VerifierCallOutcome::Valid,
        Ok(Ok(false)) => VerifierCallOutcome::Invalid,
        Ok(Err(e)) => VerifierCallOutcome::Failed(e.to_string()),
        Err(_) => VerifierCallOutcome::TimedOut,
    }
}

/// EIP-191 personal_sign verifier
///
/// Recovers the signing key from the 65-byte signature over the prefixed
/// message hash and compares the derived address with the claimed one
/// (case-insensitive). Also requires the signed message to actually contain
/// the nonce, so a signature over unrelated text cannot satisfy a
/// challenge.
#[derive(Debug, Clone, Default)]
pub struct Eip191Verifier;

impl Eip191Verifier {
    pub fn new() -> Self {
        Self
    }

    fn recover_address(&self, message: &str, signature: &str) -> Option<String> {
        let sig_hex = signature.strip_prefix("0x").unwrap_or(signature);
        let sig_bytes = hex::decode(sig_hex).ok()?;
        if sig_bytes.len() != 65 {
            return None;
        }

        let r = B256::from_slice(&sig_bytes[0..32]);
        let s = B256::from_slice(&sig_bytes[32..64]);
        let v = sig_bytes[64];

        // Accept both legacy (27/28) and raw (0/1) recovery ids
        let v_normalized = if v >= 27 { v - 27 } else { v };
        if v_normalized > 1 {
            return None;
        }

        let signature = PrimitiveSignature::new(
            U256::from_be_slice(r.as_slice()),
            U256::from_be_slice(s.as_slice()),
            v_normalized != 0,
        );

        let prehash = eip191_hash(message);
        let recovered = signature.recover_from_prehash(&prehash).ok()?;
        Some(pubkey_to_address(&recovered))
    }
}

#[async_trait]
impl SignatureVerifier for Eip191Verifier {
    async fn verify(
        &self,
        address: &str,
        nonce: &str,
        signature: &str,
        message: &str,
    ) -> Result<bool, VerifierError> {
        if !message.contains(nonce) {
            return Ok(false);
        }

        match self.recover_address(message, signature) {
            Some(recovered) => Ok(recovered.eq_ignore_ascii_case(address)),
            None => Ok(false),
        }
    }
}

/// EIP-191 prefixed message hash:
/// keccak256("\x19Ethereum Signed Message:\n" + len + message)
fn eip191_hash(message: &str) -> B256 {
    let prefixed = format!("\x19Ethereum Signed Message:\n{}{}", message.len(), message);
    keccak256(prefixed.as_bytes())
}

/// Derive an address from an uncompressed public key: last 20 bytes of
/// keccak256 over the 64-byte key body
fn pubkey_to_address(pubkey: &VerifyingKey) -> String {
    let encoded = pubkey.to_encoded_point(false);
    let hash = keccak256(&encoded.as_bytes()[1..]);
    format!("0x{}", hex::encode(&hash[12..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS: &str = "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb4";

    fn message_with(nonce: &str) -> String {
        format!("Sign this message\n\nNonce: {}", nonce)
    }

    // ========================================================================
    // Eip191Verifier input handling
    // ========================================================================

    #[actix_rt::test]
    async fn test_verify_rejects_non_hex_signature() {
        let verifier = Eip191Verifier::new();
        let result = verifier
            .verify(ADDRESS, "abc", "not-hex", &message_with("abc"))
            .await;
        assert!(matches!(result, Ok(false)));
    }

    #[actix_rt::test]
    async fn test_verify_rejects_wrong_length_signature() {
        let verifier = Eip191Verifier::new();
        let result = verifier
            .verify(ADDRESS, "abc", "0x1234", &message_with("abc"))
            .await;
        assert!(matches!(result, Ok(false)));
    }

    #[actix_rt::test]
    async fn test_verify_rejects_invalid_recovery_id() {
        let verifier = Eip191Verifier::new();
        // 65 bytes but v = 9 is not a valid recovery id
        let sig = format!("0x{}{:02x}", "ab".repeat(64), 9);
        let result = verifier
            .verify(ADDRESS, "abc", &sig, &message_with("abc"))
            .await;
        assert!(matches!(result, Ok(false)));
    }

    #[actix_rt::test]
    async fn test_verify_rejects_message_missing_nonce() {
        let verifier = Eip191Verifier::new();
        let sig = format!("0x{}{:02x}", "ab".repeat(64), 27);
        let result = verifier
            .verify(ADDRESS, "expected-nonce", &sig, "some other text")
            .await;
        assert!(matches!(result, Ok(false)));
    }

    #[test]
    fn test_eip191_hash_deterministic() {
        assert_eq!(eip191_hash("test message"), eip191_hash("test message"));
    }

    #[test]
    fn test_eip191_hash_different_messages() {
        assert_ne!(eip191_hash("message 1"), eip191_hash("message 2"));
    }

    // ========================================================================
    // call_with_timeout
    // ========================================================================

    #[actix_rt::test]
    async fn test_call_with_timeout_valid() {
        let mut mock = MockSignatureVerifier::new();
        mock.expect_verify().returning(|_, _, _, _| Ok(true));

        let outcome = call_with_timeout(
            &mock,
            Duration::from_secs(1),
            ADDRESS,
            "nonce",
            "sig",
            "message",
        )
        .await;
        assert!(matches!(outcome, VerifierCallOutcome::Valid));
    }

    #[actix_rt::test]
    async fn test_call_with_timeout_invalid() {
        let mut mock = MockSignatureVerifier::new();
        mock.expect_verify().returning(|_, _, _, _| Ok(false));

        let outcome = call_with_timeout(
            &mock,
            Duration::from_secs(1),
            ADDRESS,
            "nonce",
            "sig",
            "message",
        )
        .await;
        assert!(matches!(outcome, VerifierCallOutcome::Invalid));
    }

    #[actix_rt::test]
    async fn test_call_with_timeout_capability_failure() {
        let mut mock = MockSignatureVerifier::new();
        mock.expect_verify()
            .returning(|_, _, _, _| Err(VerifierError::Unavailable("rpc down".to_string())));

        let outcome = call_with_timeout(
            &mock,
            Duration::from_secs(1),
            ADDRESS,
            "nonce",
            "sig",
            "message",
        )
        .await;
        match outcome {
            VerifierCallOutcome::Failed(reason) => assert!(reason.contains("rpc down")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[actix_rt::test]
    async fn test_call_with_timeout_deadline_exceeded() {
        struct SlowVerifier;

        #[async_trait]
        impl SignatureVerifier for SlowVerifier {
            async fn verify(
                &self,
                _address: &str,
                _nonce: &str,
                _signature: &str,
                _message: &str,
            ) -> Result<bool, VerifierError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(true)
            }
        }

        let outcome = call_with_timeout(
            &SlowVerifier,
            Duration::from_millis(20),
            ADDRESS,
            "nonce",
            "sig",
            "message",
        )
        .await;
        assert!(matches!(outcome, VerifierCallOutcome::TimedOut));
    }
}
