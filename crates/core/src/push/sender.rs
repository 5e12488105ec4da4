use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use super::token;
use crate::keys::{KeyId, KeyManager};

/// Query parameter carrying the ownership challenge for callback URLs.
pub const VALIDATION_TOKEN_PARAM: &str = "validationToken";

/// Result of one accepted delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
  pub status: u16,
  pub key_id: KeyId,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
  /// Transport failure, timeout, or an unusable URL. The caller may retry.
  #[error("notification target unreachable: {0}")]
  Unreachable(String),
  #[error("notification rejected with status {0}")]
  Rejected(u16),
  #[error("signing keys unavailable")]
  SigningUnavailable,
  #[error("payload encoding failed: {0}")]
  Payload(#[from] serde_json::Error),
}

/// Signs and posts push notifications. One attempt per call, no retries;
/// safe to share across tasks.
///
/// Callers that await deliveries one after another get attempts in call
/// order. Nothing orders or de-duplicates them at the receiver.
#[derive(Debug, Clone)]
pub struct NotificationSender {
  keys: Arc<KeyManager>,
  client: reqwest::Client,
}

impl NotificationSender {
  /// Build a sender whose HTTP calls give up after `timeout`.
  pub fn new(keys: Arc<KeyManager>, timeout: Duration) -> reqwest::Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .connect_timeout(timeout)
      .user_agent(concat!("beacon/", env!("CARGO_PKG_VERSION")))
      .build()?;
    Ok(Self { keys, client })
  }

  /// Sign `payload` and POST it to `target_url` with an `Authorization: Bearer` token.
  pub async fn deliver(&self, target_url: &str, payload: Bytes) -> Result<DeliveryOutcome, DeliveryError> {
    let (key_id, bearer) = token::sign_token(&self.keys, &payload).map_err(|error| {
      warn!(event = "push_sign_failed", url = %target_url, error = %error, "cannot sign notification");
      DeliveryError::SigningUnavailable
    })?;
    let url = Url::parse(target_url)
      .map_err(|e| DeliveryError::Unreachable(format!("invalid url `{target_url}`: {e}")))?;

    debug!(event = "push_deliver_attempt", url = %url, kid = %key_id, bytes = payload.len());
    let response = self
      .client
      .post(url)
      .header(AUTHORIZATION, format!("Bearer {bearer}"))
      .header(CONTENT_TYPE, "application/json")
      .body(payload)
      .send()
      .await;

    match response {
      Ok(resp) if resp.status().is_success() => {
        let status = resp.status().as_u16();
        info!(event = "push_delivered", url = %target_url, status, kid = %key_id, "notification delivered");
        Ok(DeliveryOutcome { status, key_id })
      }
      Ok(resp) => {
        let status = resp.status().as_u16();
        warn!(event = "push_rejected", url = %target_url, status, "notification rejected");
        Err(DeliveryError::Rejected(status))
      }
      Err(error) => {
        warn!(event = "push_unreachable", url = %target_url, error = %error, "notification target unreachable");
        Err(DeliveryError::Unreachable(error.to_string()))
      }
    }
  }

  /// Serialize `value` as JSON and deliver it.
  pub async fn deliver_json<T: Serialize + ?Sized>(
    &self,
    target_url: &str,
    value: &T,
  ) -> Result<DeliveryOutcome, DeliveryError> {
    let payload = serde_json::to_vec(value)?;
    self.deliver(target_url, Bytes::from(payload)).await
  }

  /// Check that the subscriber owns `url`: a GET with a random
  /// `validationToken` query parameter must be answered 2xx with the token
  /// echoed back as the body.
  pub async fn verify_url(&self, url: &str) -> bool {
    let challenge = uuid::Uuid::new_v4().to_string();
    let Ok(mut target) = Url::parse(url) else {
      warn!(event = "push_url_invalid", url = %url, "callback url does not parse");
      return false;
    };
    target
      .query_pairs_mut()
      .append_pair(VALIDATION_TOKEN_PARAM, &challenge);

    let verified = match self.client.get(target).send().await {
      Ok(resp) if resp.status().is_success() => match resp.text().await {
        Ok(body) => body.trim() == challenge,
        Err(_) => false,
      },
      Ok(_) => false,
      Err(error) => {
        debug!(event = "push_url_unreachable", url = %url, error = %error);
        false
      }
    };
    info!(event = "push_url_verified", url = %url, verified, "callback url checked");
    verified
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sender(keys: KeyManager) -> NotificationSender {
    NotificationSender::new(Arc::new(keys), Duration::from_secs(2)).unwrap()
  }

  #[tokio::test]
  async fn missing_keys_report_signing_unavailable() {
    let err = sender(KeyManager::new())
      .deliver("http://127.0.0.1:9/hook", Bytes::from_static(b"{}"))
      .await
      .unwrap_err();
    assert!(matches!(err, DeliveryError::SigningUnavailable), "got {err:?}");
  }

  #[tokio::test]
  async fn unparsable_url_is_unreachable() {
    let keys = KeyManager::new();
    keys.generate_keys().unwrap();
    let err = sender(keys)
      .deliver("not a url", Bytes::from_static(b"{}"))
      .await
      .unwrap_err();
    assert!(matches!(err, DeliveryError::Unreachable(_)), "got {err:?}");
  }

  #[tokio::test]
  async fn verify_url_rejects_garbage() {
    let keys = KeyManager::new();
    keys.generate_keys().unwrap();
    assert!(!sender(keys).verify_url("::nope").await);
  }
}
