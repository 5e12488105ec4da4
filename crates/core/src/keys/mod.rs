//! Process-wide signing keypair and its published key set.
//!
//! The private half never leaves this module: callers get the key id, the
//! JWKS document, and crate-internal signing.

mod jwk;

use std::fmt;
use std::sync::OnceLock;

use ed25519_dalek::{Signature, Signer, SigningKey};
use thiserror::Error;
use tracing::info;

pub use jwk::{ALGORITHM, CURVE, Jwk, KEY_TYPE, KeySetDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KeyError {
  #[error("signing keys have not been generated")]
  NotInitialized,
  #[error("signing keys were already generated for this process")]
  AlreadyGenerated,
}

/// Stable identifier of the active key, embedded as `kid` in every token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyId(String);

impl KeyId {
  fn random() -> Self {
    Self(uuid::Uuid::new_v4().simple().to_string())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for KeyId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

struct SigningKeyPair {
  key_id: KeyId,
  signing_key: SigningKey,
}

/// Holds the single keypair of the process. Generation happens once; after
/// that every read is lock-free.
#[derive(Default)]
pub struct KeyManager {
  pair: OnceLock<SigningKeyPair>,
}

impl fmt::Debug for KeyManager {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("KeyManager")
      .field("key_id", &self.pair.get().map(|p| p.key_id.as_str()))
      .finish_non_exhaustive()
  }
}

impl KeyManager {
  pub fn new() -> Self {
    Self::default()
  }

  /// Generate the keypair. Calling this twice is a programming error and
  /// returns `AlreadyGenerated` without touching the existing key.
  pub fn generate_keys(&self) -> Result<KeyId, KeyError> {
    let mut generated = false;
    let pair = self.pair.get_or_init(|| {
      generated = true;
      let mut csprng = rand::thread_rng();
      SigningKeyPair {
        key_id: KeyId::random(),
        signing_key: SigningKey::generate(&mut csprng),
      }
    });
    if !generated {
      return Err(KeyError::AlreadyGenerated);
    }
    info!(event = "signing_keys_generated", kid = %pair.key_id, alg = ALGORITHM, "signing keypair generated");
    Ok(pair.key_id.clone())
  }

  pub fn key_id(&self) -> Result<KeyId, KeyError> {
    Ok(self.pair()?.key_id.clone())
  }

  /// Public half of the active key as a JWKS document.
  pub fn public_key_set(&self) -> Result<KeySetDocument, KeyError> {
    let pair = self.pair()?;
    let public = pair.signing_key.verifying_key().to_bytes();
    Ok(KeySetDocument {
      keys: vec![Jwk::ed25519(pair.key_id.as_str(), &public)],
    })
  }

  pub(crate) fn sign(&self, message: &[u8]) -> Result<(KeyId, Signature), KeyError> {
    let pair = self.pair()?;
    Ok((pair.key_id.clone(), pair.signing_key.sign(message)))
  }

  fn pair(&self) -> Result<&SigningKeyPair, KeyError> {
    self.pair.get().ok_or(KeyError::NotInitialized)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use ed25519_dalek::{Verifier, VerifyingKey};

  #[test]
  fn key_set_before_generation_fails() {
    let keys = KeyManager::new();
    assert_eq!(keys.public_key_set().unwrap_err(), KeyError::NotInitialized);
    assert_eq!(keys.key_id().unwrap_err(), KeyError::NotInitialized);
    assert!(keys.sign(b"x").is_err());
  }

  #[test]
  fn second_generation_is_rejected_and_keeps_key() {
    let keys = KeyManager::new();
    let kid = keys.generate_keys().unwrap();
    let before = keys.public_key_set().unwrap();
    assert_eq!(keys.generate_keys().unwrap_err(), KeyError::AlreadyGenerated);
    assert_eq!(keys.key_id().unwrap(), kid);
    assert_eq!(keys.public_key_set().unwrap(), before);
  }

  #[test]
  fn key_set_reads_are_byte_identical() {
    let keys = KeyManager::new();
    keys.generate_keys().unwrap();
    let a = serde_json::to_vec(&keys.public_key_set().unwrap()).unwrap();
    let b = serde_json::to_vec(&keys.public_key_set().unwrap()).unwrap();
    assert_eq!(a, b);
  }

  #[test]
  fn key_set_shape_matches_jwks() {
    let keys = KeyManager::new();
    let kid = keys.generate_keys().unwrap();
    let v = serde_json::to_value(keys.public_key_set().unwrap()).unwrap();
    let entry = &v["keys"][0];
    assert_eq!(v["keys"].as_array().unwrap().len(), 1);
    assert_eq!(entry["kty"], "OKP");
    assert_eq!(entry["crv"], "Ed25519");
    assert_eq!(entry["alg"], "EdDSA");
    assert_eq!(entry["use"], "sig");
    assert_eq!(entry["kid"], kid.as_str());
    // 32 bytes -> 43 base64url chars without padding
    assert_eq!(entry["x"].as_str().unwrap().len(), 43);
    assert!(entry.get("d").is_none(), "private material must not be published");
  }

  #[test]
  fn signature_verifies_with_published_key() {
    let keys = KeyManager::new();
    keys.generate_keys().unwrap();
    let (kid, sig) = keys.sign(b"payload").unwrap();
    let doc = keys.public_key_set().unwrap();
    let jwk = doc.find(kid.as_str()).expect("kid published");
    let vk = VerifyingKey::from_bytes(&jwk.ed25519_public_key().unwrap()).unwrap();
    assert!(vk.verify(b"payload", &sig).is_ok());
    assert!(vk.verify(b"payloaD", &sig).is_err());
  }

  #[test]
  fn debug_output_hides_private_material() {
    let keys = KeyManager::new();
    let kid = keys.generate_keys().unwrap();
    let dbg = format!("{keys:?}");
    assert!(dbg.contains(kid.as_str()));
    assert!(!dbg.contains("signing_key"));
  }

  #[test]
  fn separate_managers_have_distinct_keys() {
    let a = KeyManager::new();
    let b = KeyManager::new();
    assert_ne!(a.generate_keys().unwrap(), b.generate_keys().unwrap());
  }
}
