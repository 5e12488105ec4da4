use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

/// JOSE algorithm name for Ed25519 signatures.
pub const ALGORITHM: &str = "EdDSA";
/// JWK key type for Edwards-curve keys.
pub const KEY_TYPE: &str = "OKP";
/// JWK curve name.
pub const CURVE: &str = "Ed25519";

/// A single public key entry (RFC 7517 / RFC 8037).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
  pub kty: String,
  pub crv: String,
  /// Base64url (no padding) encoded public key.
  pub x: String,
  pub kid: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub alg: Option<String>,
  #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
  pub key_use: Option<String>,
}

impl Jwk {
  pub(crate) fn ed25519(kid: &str, public_key: &[u8; 32]) -> Self {
    Self {
      kty: KEY_TYPE.to_string(),
      crv: CURVE.to_string(),
      x: URL_SAFE_NO_PAD.encode(public_key),
      kid: kid.to_string(),
      alg: Some(ALGORITHM.to_string()),
      key_use: Some("sig".to_string()),
    }
  }

  /// Decode `x` back into raw public key bytes. None when the entry is not an
  /// Ed25519 key or the encoding is off.
  pub fn ed25519_public_key(&self) -> Option<[u8; 32]> {
    if self.kty != KEY_TYPE || self.crv != CURVE {
      return None;
    }
    let bytes = URL_SAFE_NO_PAD.decode(&self.x).ok()?;
    bytes.try_into().ok()
  }
}

/// The document served at `/.well-known/jwks.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct KeySetDocument {
  pub keys: Vec<Jwk>,
}

impl KeySetDocument {
  pub fn find(&self, kid: &str) -> Option<&Jwk> {
    self.keys.iter().find(|k| k.kid == kid)
  }
}
