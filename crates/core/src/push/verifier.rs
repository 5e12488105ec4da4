use chrono::Utc;
use thiserror::Error;

use super::token::{self, NotificationClaims, TokenError};
use crate::keys::KeySetDocument;

/// Tokens older than this are refused.
pub const DEFAULT_MAX_AGE_SECS: i64 = 300;
/// Clock skew tolerated for tokens issued slightly in the future.
pub const MAX_CLOCK_SKEW_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum VerifyError {
  #[error("token is malformed: {0}")]
  Malformed(String),
  #[error("no key `{0}` in key set")]
  UnknownKey(String),
  #[error("unsupported algorithm `{0}`")]
  UnsupportedAlgorithm(String),
  #[error("signature does not verify")]
  BadSignature,
  #[error("token expired ({age_secs}s old)")]
  Expired { age_secs: i64 },
  #[error("token issued {ahead_secs}s in the future")]
  NotYetValid { ahead_secs: i64 },
  #[error("request body does not match the signed digest")]
  DigestMismatch,
  #[error("fetching key set failed: {0}")]
  Fetch(String),
}

impl From<TokenError> for VerifyError {
  fn from(e: TokenError) -> Self {
    match e {
      TokenError::UnsupportedAlgorithm(alg) => VerifyError::UnsupportedAlgorithm(alg),
      TokenError::BadSignature => VerifyError::BadSignature,
      other => VerifyError::Malformed(other.to_string()),
    }
  }
}

/// Receiver side of push notifications: checks the bearer token of an
/// incoming webhook against a published key set.
#[derive(Debug, Clone)]
pub struct NotificationVerifier {
  key_set: KeySetDocument,
  max_age_secs: i64,
}

impl NotificationVerifier {
  pub fn from_key_set(key_set: KeySetDocument) -> Self {
    Self {
      key_set,
      max_age_secs: DEFAULT_MAX_AGE_SECS,
    }
  }

  pub fn with_max_age(mut self, secs: i64) -> Self {
    self.max_age_secs = secs;
    self
  }

  /// Download the key set from `jwks_url`.
  pub async fn fetch(client: &reqwest::Client, jwks_url: &str) -> Result<Self, VerifyError> {
    let resp = client
      .get(jwks_url)
      .send()
      .await
      .and_then(|r| r.error_for_status())
      .map_err(|e| VerifyError::Fetch(e.to_string()))?;
    let key_set: KeySetDocument = resp.json().await.map_err(|e| VerifyError::Fetch(e.to_string()))?;
    Ok(Self::from_key_set(key_set))
  }

  pub fn key_set(&self) -> &KeySetDocument {
    &self.key_set
  }

  /// Verify an `Authorization` header value (or a bare token) against `body`.
  pub fn verify(&self, authorization: &str, body: &[u8]) -> Result<NotificationClaims, VerifyError> {
    self.verify_at(authorization, body, Utc::now().timestamp())
  }

  pub fn verify_at(
    &self,
    authorization: &str,
    body: &[u8],
    now: i64,
  ) -> Result<NotificationClaims, VerifyError> {
    let raw = authorization
      .strip_prefix("Bearer ")
      .unwrap_or(authorization)
      .trim();
    let decoded = token::decode(raw)?;
    let jwk = self
      .key_set
      .find(&decoded.header.kid)
      .ok_or_else(|| VerifyError::UnknownKey(decoded.header.kid.clone()))?;
    let public_key = jwk
      .ed25519_public_key()
      .ok_or_else(|| VerifyError::UnsupportedAlgorithm(format!("{}/{}", jwk.kty, jwk.crv)))?;
    let claims = decoded.verify(&public_key)?;

    let age_secs = now - claims.iat;
    if -age_secs > MAX_CLOCK_SKEW_SECS {
      return Err(VerifyError::NotYetValid { ahead_secs: -age_secs });
    }
    if age_secs > self.max_age_secs {
      return Err(VerifyError::Expired { age_secs });
    }
    if claims.request_body_sha256 != token::body_digest(body) {
      return Err(VerifyError::DigestMismatch);
    }
    Ok(claims)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::keys::KeyManager;

  fn setup() -> (KeyManager, NotificationVerifier) {
    let keys = KeyManager::new();
    keys.generate_keys().unwrap();
    let verifier = NotificationVerifier::from_key_set(keys.public_key_set().unwrap());
    (keys, verifier)
  }

  #[test]
  fn accepts_untampered_body() {
    let (keys, verifier) = setup();
    let body = br#"{"id":"t1","status":{"state":"completed"}}"#;
    let (_, tok) = token::sign_token(&keys, body).unwrap();
    let claims = verifier.verify(&format!("Bearer {tok}"), body).unwrap();
    assert_eq!(claims.request_body_sha256, token::body_digest(body));
  }

  #[test]
  fn one_byte_tamper_is_rejected() {
    let (keys, verifier) = setup();
    let body = br#"{"id":"t1"}"#.to_vec();
    let (_, tok) = token::sign_token(&keys, &body).unwrap();
    for i in 0..body.len() {
      let mut tampered = body.clone();
      tampered[i] ^= 0x01;
      let err = verifier.verify(&tok, &tampered).unwrap_err();
      assert!(matches!(err, VerifyError::DigestMismatch), "byte {i}: {err:?}");
    }
  }

  #[test]
  fn unknown_kid_is_rejected() {
    let (_, verifier) = setup();
    let (other, _) = setup();
    let (kid, tok) = token::sign_token(&other, b"{}").unwrap();
    match verifier.verify(&tok, b"{}").unwrap_err() {
      VerifyError::UnknownKey(k) => assert_eq!(k, kid.as_str()),
      e => panic!("unexpected error: {e:?}"),
    }
  }

  #[test]
  fn stale_token_is_rejected() {
    let (keys, verifier) = setup();
    let (_, tok) = token::sign_token_at(&keys, b"{}", 1_000).unwrap();
    let err = verifier.verify_at(&tok, b"{}", 1_000 + 301).unwrap_err();
    assert!(matches!(err, VerifyError::Expired { age_secs: 301 }));
    assert!(verifier.verify_at(&tok, b"{}", 1_000 + 300).is_ok());
  }

  #[test]
  fn future_dated_token_is_rejected() {
    let (keys, verifier) = setup();
    let (_, tok) = token::sign_token_at(&keys, b"{}", 10_000_000).unwrap();
    let err = verifier.verify_at(&tok, b"{}", 1_000).unwrap_err();
    assert!(matches!(err, VerifyError::NotYetValid { ahead_secs: 9_999_000 }), "{err:?}");

    // small skew is tolerated
    let (_, tok) = token::sign_token_at(&keys, b"{}", 1_060).unwrap();
    assert!(verifier.verify_at(&tok, b"{}", 1_000).is_ok());
    let (_, tok) = token::sign_token_at(&keys, b"{}", 1_061).unwrap();
    assert!(matches!(
      verifier.verify_at(&tok, b"{}", 1_000),
      Err(VerifyError::NotYetValid { ahead_secs: 61 })
    ));
  }

  #[test]
  fn custom_max_age_applies() {
    let (keys, verifier) = setup();
    let verifier = verifier.with_max_age(10);
    let (_, tok) = token::sign_token_at(&keys, b"{}", 50).unwrap();
    assert!(matches!(
      verifier.verify_at(&tok, b"{}", 61),
      Err(VerifyError::Expired { .. })
    ));
  }

  #[test]
  fn garbage_header_is_malformed() {
    let (_, verifier) = setup();
    assert!(matches!(
      verifier.verify("Bearer nope", b"{}"),
      Err(VerifyError::Malformed(_))
    ));
  }
}
