//! Data access layer

pub mod nonces;
pub mod rate_limits;
pub mod sessions;

pub use nonces::{ConsumeOutcome, NewNonce, NonceRecord, NonceRepository};
pub use rate_limits::{
    RateLimitAction, RateLimitDecision, RateLimitDenyReason, RateLimitRecord, RateLimitRepository,
};
pub use sessions::{NewSession, SessionRecord, SessionRepository};
