use std::sync::Arc;
use std::time::Duration;

use beacon_core::agent::EchoAgent;
use beacon_core::config;
use beacon_core::keys::KeyManager;
use beacon_core::push::{DeliveryError, NotificationSender, NotificationVerifier, VerifyError, token};
use beacon_core::rpc::codes;
use beacon_core::startup::{Startup, StartupOptions};
use serde_json::{Value, json};
use test_support::{HttpRpcClient, WebhookCapture, poll_until};

const PUSH_ENABLED: &str = r#"
[agent_card]
name = "W"
version = "1.0"

[agent_card.capabilities]
pushNotifications = true

[[agent_card.skills]]
id = "lookup"
name = "Lookup"
"#;

const STREAMING_PUSH: &str = r#"
[agent_card]
name = "W"
version = "1.0"

[agent_card.capabilities]
streaming = true
pushNotifications = true

[[agent_card.skills]]
id = "lookup"
name = "Lookup"
"#;

fn sender() -> (Arc<KeyManager>, NotificationSender) {
  let keys = Arc::new(KeyManager::new());
  keys.generate_keys().unwrap();
  let sender = NotificationSender::new(keys.clone(), Duration::from_secs(2)).unwrap();
  (keys, sender)
}

#[tokio::test(flavor = "multi_thread")]
async fn task_updates_reach_webhook_signed_with_published_key() {
  let hook = WebhookCapture::start().await;
  let options = StartupOptions::new(
    config::from_toml_str(PUSH_ENABLED).unwrap(),
    Some("127.0.0.1".into()),
    Some(0),
  );
  let prepared = Startup::new(options, Arc::new(EchoAgent))
    .prepare_with(|name| Some(format!("test-{name}")))
    .unwrap();
  let handle = prepared.bind().await.unwrap();
  let client = HttpRpcClient::new(handle.local_addr());

  let sent = client
    .call::<Value>(
      "tasks/send",
      json!({
        "id": "p-1",
        "message": { "role": "user", "parts": [{ "type": "text", "text": "wind?" }] },
        "pushNotification": { "url": hook.url() }
      }),
    )
    .await;
  assert!(sent.error.is_none(), "{:?}", sent.error);

  // ownership challenge came first
  let requests = hook.requests();
  let first = &requests[0];
  assert_eq!(first.method, hyper::Method::GET);
  assert!(first.query.as_deref().unwrap_or("").starts_with("validationToken="));

  let delivered = poll_until(Duration::from_secs(5), Duration::from_millis(20), || async {
    !hook.posts().is_empty()
  })
  .await;
  assert!(delivered, "no notification arrived");

  let post = hook.posts().remove(0);
  let authorization = post.authorization.clone().expect("bearer token");
  let payload: Value = serde_json::from_slice(&post.body).unwrap();
  assert_eq!(payload["id"], "p-1");
  assert_eq!(payload["status"]["state"], "completed");

  let verifier = NotificationVerifier::fetch(&reqwest::Client::new(), &client.url("/.well-known/jwks.json"))
    .await
    .unwrap();
  let claims = verifier.verify(&authorization, &post.body).unwrap();
  assert_eq!(claims.request_body_sha256, beacon_core::push::body_digest(&post.body));

  let bearer = authorization.strip_prefix("Bearer ").unwrap();
  let header = token::decode(bearer).unwrap().header;
  assert_eq!(header.alg, "EdDSA");
  assert_eq!(verifier.key_set().keys[0].kid, header.kid);

  let mut tampered = post.body.to_vec();
  tampered[0] ^= 0x01;
  assert!(matches!(
    verifier.verify(&authorization, &tampered),
    Err(VerifyError::DigestMismatch)
  ));

  let config = client
    .call::<Value>("tasks/pushNotification/get", json!({ "id": "p-1" }))
    .await;
  assert_eq!(config.result.unwrap()["pushNotificationConfig"]["url"], hook.url());

  handle.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn streamed_task_updates_arrive_in_order() {
  let hook = WebhookCapture::start().await;
  let options = StartupOptions::new(
    config::from_toml_str(STREAMING_PUSH).unwrap(),
    Some("127.0.0.1".into()),
    Some(0),
  );
  let handle = Startup::new(options, Arc::new(EchoAgent))
    .prepare_with(|name| Some(format!("test-{name}")))
    .unwrap()
    .bind()
    .await
    .unwrap();
  let client = HttpRpcClient::new(handle.local_addr());

  let mut stream = client
    .subscribe(
      "tasks/sendSubscribe",
      json!({
        "id": "p-3",
        "message": { "role": "user", "parts": [{ "type": "text", "text": "fog?" }] },
        "pushNotification": { "url": hook.url() }
      }),
    )
    .await;
  while stream.next_data_within(Duration::from_secs(5)).await.is_some() {}

  let delivered = poll_until(Duration::from_secs(5), Duration::from_millis(20), || async {
    hook.posts().len() >= 2
  })
  .await;
  assert!(delivered, "got {} notifications", hook.posts().len());

  let states: Vec<String> = hook
    .posts()
    .iter()
    .map(|post| {
      let payload: Value = serde_json::from_slice(&post.body).unwrap();
      payload["status"]["state"].as_str().unwrap().to_string()
    })
    .collect();
  assert_eq!(states, vec!["working", "completed"]);

  handle.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn unverifiable_callback_is_refused() {
  let options = StartupOptions::new(
    config::from_toml_str(PUSH_ENABLED).unwrap(),
    Some("127.0.0.1".into()),
    Some(0),
  );
  let handle = Startup::new(options, Arc::new(EchoAgent))
    .prepare_with(|name| Some(format!("test-{name}")))
    .unwrap()
    .bind()
    .await
    .unwrap();
  let client = HttpRpcClient::new(handle.local_addr());

  client
    .call::<Value>(
      "tasks/send",
      json!({ "id": "p-2", "message": { "role": "user", "parts": [{ "type": "text", "text": "" }] } }),
    )
    .await;
  let refused = client
    .call::<Value>(
      "tasks/pushNotification/set",
      json!({ "id": "p-2", "pushNotificationConfig": { "url": "http://127.0.0.1:1/hook" } }),
    )
    .await;
  assert_eq!(refused.error.unwrap().code, codes::INVALID_PARAMS);

  handle.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn direct_delivery_is_verifiable() {
  let hook = WebhookCapture::start().await;
  let (keys, sender) = sender();

  let outcome = sender
    .deliver_json(&hook.url(), &json!({ "event": "status", "state": "working" }))
    .await
    .unwrap();
  assert_eq!(outcome.status, 200);
  assert_eq!(outcome.key_id, keys.key_id().unwrap());

  let post = hook.posts().remove(0);
  let verifier = NotificationVerifier::from_key_set(keys.public_key_set().unwrap());
  verifier
    .verify(post.authorization.as_deref().unwrap(), &post.body)
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn unresolvable_target_is_unreachable() {
  let (_, sender) = sender();
  let err = sender
    .deliver_json("https://example.invalid/hook", &json!({}))
    .await
    .unwrap_err();
  assert!(matches!(err, DeliveryError::Unreachable(_)), "got {err:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn non_success_status_is_rejected() {
  let hook = WebhookCapture::start().await;
  hook.respond_with(500);
  let (_, sender) = sender();
  let err = sender.deliver_json(&hook.url(), &json!({})).await.unwrap_err();
  assert!(matches!(err, DeliveryError::Rejected(500)), "got {err:?}");
  assert_eq!(hook.posts().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn verify_url_needs_echoed_token() {
  let hook = WebhookCapture::start().await;
  let (_, sender) = sender();
  assert!(sender.verify_url(&hook.url()).await);
  assert!(!sender.verify_url("http://127.0.0.1:1/hook").await);
}
