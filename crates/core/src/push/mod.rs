//! Signed push notifications.
//!
//! The sender signs a compact JWS over the SHA-256 of each POST body using
//! the process key from [`crate::keys`]; receivers check it with
//! [`NotificationVerifier`] and the key set served at `/.well-known/jwks.json`.

pub mod sender;
pub mod token;
pub mod verifier;

pub use sender::{DeliveryError, DeliveryOutcome, NotificationSender, VALIDATION_TOKEN_PARAM};
pub use token::{NotificationClaims, TokenError, body_digest};
pub use verifier::{DEFAULT_MAX_AGE_SECS, MAX_CLOCK_SKEW_SECS, NotificationVerifier, VerifyError};
