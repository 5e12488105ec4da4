//! Compact JWS tokens binding a request body digest to the signing key.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::keys::{ALGORITHM, KeyError, KeyId, KeyManager};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHeader {
  pub alg: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub typ: Option<String>,
  pub kid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationClaims {
  /// Issued-at, seconds since the unix epoch.
  pub iat: i64,
  /// Lowercase hex SHA-256 of the exact request body.
  pub request_body_sha256: String,
}

#[derive(Debug, Error)]
pub enum TokenError {
  #[error(transparent)]
  Keys(#[from] KeyError),
  #[error("token is malformed: {0}")]
  Malformed(&'static str),
  #[error("json: {0}")]
  Json(#[from] serde_json::Error),
  #[error("unsupported algorithm `{0}`")]
  UnsupportedAlgorithm(String),
  #[error("signature does not verify")]
  BadSignature,
}

/// Lowercase hex SHA-256 of `body`.
pub fn body_digest(body: &[u8]) -> String {
  hex::encode(Sha256::digest(body))
}

/// Sign a token over `body` with the active key, issued now.
pub fn sign_token(keys: &KeyManager, body: &[u8]) -> Result<(KeyId, String), TokenError> {
  sign_token_at(keys, body, Utc::now().timestamp())
}

pub(crate) fn sign_token_at(
  keys: &KeyManager,
  body: &[u8],
  iat: i64,
) -> Result<(KeyId, String), TokenError> {
  let kid = keys.key_id()?;
  let header = TokenHeader {
    alg: ALGORITHM.to_string(),
    typ: Some("JWT".to_string()),
    kid: kid.as_str().to_string(),
  };
  let claims = NotificationClaims {
    iat,
    request_body_sha256: body_digest(body),
  };
  let signing_input = format!(
    "{}.{}",
    URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
    URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?)
  );
  let (signed_kid, signature) = keys.sign(signing_input.as_bytes())?;
  debug_assert_eq!(signed_kid, kid);
  let token = format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature.to_bytes()));
  Ok((signed_kid, token))
}

/// A token split into its parts, signature not yet checked.
#[derive(Debug, Clone)]
pub struct UnverifiedToken<'a> {
  pub header: TokenHeader,
  signing_input: &'a str,
  signature: Vec<u8>,
  claims_segment: &'a str,
}

/// Split and decode a compact token without checking the signature.
pub fn decode(token: &str) -> Result<UnverifiedToken<'_>, TokenError> {
  let (signing_input, signature_segment) = token
    .rsplit_once('.')
    .ok_or(TokenError::Malformed("expected three segments"))?;
  let (header_segment, claims_segment) = signing_input
    .split_once('.')
    .ok_or(TokenError::Malformed("expected three segments"))?;
  if claims_segment.contains('.') {
    return Err(TokenError::Malformed("expected three segments"));
  }
  let header_bytes = URL_SAFE_NO_PAD
    .decode(header_segment)
    .map_err(|_| TokenError::Malformed("header is not base64url"))?;
  let header: TokenHeader = serde_json::from_slice(&header_bytes)?;
  let signature = URL_SAFE_NO_PAD
    .decode(signature_segment)
    .map_err(|_| TokenError::Malformed("signature is not base64url"))?;
  Ok(UnverifiedToken {
    header,
    signing_input,
    signature,
    claims_segment,
  })
}

impl UnverifiedToken<'_> {
  /// Check the signature against `public_key` and return the claims.
  pub fn verify(&self, public_key: &[u8; 32]) -> Result<NotificationClaims, TokenError> {
    if self.header.alg != ALGORITHM {
      return Err(TokenError::UnsupportedAlgorithm(self.header.alg.clone()));
    }
    let key = VerifyingKey::from_bytes(public_key).map_err(|_| TokenError::BadSignature)?;
    let signature =
      Signature::from_slice(&self.signature).map_err(|_| TokenError::Malformed("bad signature length"))?;
    key
      .verify(self.signing_input.as_bytes(), &signature)
      .map_err(|_| TokenError::BadSignature)?;
    let claims_bytes = URL_SAFE_NO_PAD
      .decode(self.claims_segment)
      .map_err(|_| TokenError::Malformed("claims are not base64url"))?;
    Ok(serde_json::from_slice(&claims_bytes)?)
  }
}
