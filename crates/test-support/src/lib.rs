use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioIo};
use parking_lot::Mutex;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Poll a condition repeatedly until it returns true or times out.
/// Returns true if condition met, false on timeout.
pub async fn poll_until<F, Fut>(timeout: Duration, interval: Duration, mut check: F) -> bool
where
  F: FnMut() -> Fut,
  Fut: std::future::Future<Output = bool>,
{
  use tokio::time::{Instant, sleep};
  let start = Instant::now();
  loop {
    if check().await {
      return true;
    }
    if start.elapsed() >= timeout {
      return false;
    }
    sleep(interval).await;
  }
}

/// Minimal JSON-RPC 2.0 response wrapper for tests.
#[derive(Debug, serde::Deserialize)]
pub struct RpcError {
  pub code: i32,
  pub message: String,
  pub data: Option<serde_json::Value>,
}

#[derive(Debug, serde::Deserialize)]
pub struct RpcResp<T> {
  pub jsonrpc: String,
  pub id: serde_json::Value,
  pub result: Option<T>,
  pub error: Option<RpcError>,
}

/// Raw HTTP answer: status, content type, and body bytes.
#[derive(Debug)]
pub struct HttpReply {
  pub status: StatusCode,
  pub content_type: Option<String>,
  pub allow: Option<String>,
  pub body: Bytes,
}

impl HttpReply {
  pub fn json<T: serde::de::DeserializeOwned>(&self) -> T {
    serde_json::from_slice(&self.body).expect("valid json")
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }

  /// Payloads of the `data:` lines of a server-sent event body.
  pub fn sse_data(&self) -> Vec<serde_json::Value> {
    self
      .text()
      .split("\n\n")
      .filter_map(|frame| frame.strip_prefix("data: "))
      .map(|data| serde_json::from_str(data).expect("valid sse json"))
      .collect()
  }
}

/// A tiny TCP HTTP/JSON-RPC client used by tests.
pub struct HttpRpcClient {
  base: String,
  client: Client<HttpConnector, Full<Bytes>>,
}

impl HttpRpcClient {
  pub fn new(addr: SocketAddr) -> Self {
    Self {
      base: format!("http://{addr}"),
      client: Client::builder(TokioExecutor::new()).build_http(),
    }
  }

  pub fn url(&self, path: &str) -> String {
    format!("{}{}", self.base, path)
  }

  pub async fn send(&self, method: Method, path: &str, body: Option<Vec<u8>>) -> HttpReply {
    let mut builder = Request::builder().method(method).uri(self.url(path));
    if body.is_some() {
      builder = builder.header(hyper::header::CONTENT_TYPE, "application/json");
    }
    let req = builder
      .body(Full::new(Bytes::from(body.unwrap_or_default())))
      .unwrap();
    let resp = self.client.request(req).await.expect("request ok");
    let status = resp.status();
    let header = |name: hyper::header::HeaderName| {
      resp
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
    };
    let content_type = header(hyper::header::CONTENT_TYPE);
    let allow = header(hyper::header::ALLOW);
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    HttpReply {
      status,
      content_type,
      allow,
      body,
    }
  }

  pub async fn get(&self, path: &str) -> HttpReply {
    self.send(Method::GET, path, None).await
  }

  /// POST raw bytes to the RPC endpoint.
  pub async fn post_raw(&self, body: &[u8]) -> HttpReply {
    self.send(Method::POST, "/", Some(body.to_vec())).await
  }

  pub async fn call_raw(&self, method: &str, params: serde_json::Value) -> HttpReply {
    let req_body = serde_json::json!({
      "jsonrpc": "2.0",
      "id": 1,
      "method": method,
      "params": params
    });
    self.post_raw(&serde_json::to_vec(&req_body).unwrap()).await
  }

  /// Start a streaming call and return as soon as the response head arrives.
  pub async fn subscribe(&self, method: &str, params: serde_json::Value) -> SseStream {
    let req_body = serde_json::json!({
      "jsonrpc": "2.0",
      "id": 1,
      "method": method,
      "params": params
    });
    let req = Request::builder()
      .method(Method::POST)
      .uri(self.url("/"))
      .header(hyper::header::CONTENT_TYPE, "application/json")
      .body(Full::new(Bytes::from(serde_json::to_vec(&req_body).unwrap())))
      .unwrap();
    let resp = self.client.request(req).await.expect("request ok");
    SseStream {
      status: resp.status(),
      content_type: resp
        .headers()
        .get(hyper::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string),
      body: resp.into_body(),
      pending: String::new(),
    }
  }

  pub async fn call<T: serde::de::DeserializeOwned>(&self, method: &str, params: serde_json::Value) -> RpcResp<T> {
    let reply = self.call_raw(method, params).await;
    assert!(reply.status.is_success(), "status {}", reply.status);
    reply.json()
  }
}

/// Server-sent events read off a response body one frame at a time.
pub struct SseStream {
  pub status: StatusCode,
  pub content_type: Option<String>,
  body: Incoming,
  pending: String,
}

impl SseStream {
  /// Next `data:` payload, or `None` once the body ends.
  pub async fn next_data(&mut self) -> Option<serde_json::Value> {
    loop {
      if let Some(end) = self.pending.find("\n\n") {
        let event: String = self.pending.drain(..end + 2).collect();
        if let Some(data) = event.trim_end().strip_prefix("data: ") {
          return Some(serde_json::from_str(data).expect("valid sse json"));
        }
        continue;
      }
      let frame = self.body.frame().await?.expect("body frame");
      if let Ok(data) = frame.into_data() {
        self.pending.push_str(&String::from_utf8_lossy(&data));
      }
    }
  }

  /// Like [`next_data`](Self::next_data) but gives up after `timeout`.
  pub async fn next_data_within(&mut self, timeout: Duration) -> Option<serde_json::Value> {
    tokio::time::timeout(timeout, self.next_data()).await.ok().flatten()
  }
}

/// One request seen by a [`WebhookCapture`].
#[derive(Debug, Clone)]
pub struct CapturedRequest {
  pub method: Method,
  pub path: String,
  pub query: Option<String>,
  pub authorization: Option<String>,
  pub body: Bytes,
}

/// Local webhook receiver. Records every request, echoes `validationToken`
/// challenges, and answers POSTs with a configurable status.
pub struct WebhookCapture {
  addr: SocketAddr,
  requests: Arc<Mutex<Vec<CapturedRequest>>>,
  status: Arc<AtomicU16>,
  task: JoinHandle<()>,
}

impl WebhookCapture {
  pub async fn start() -> Self {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind webhook");
    let addr = listener.local_addr().expect("webhook addr");
    let requests = Arc::new(Mutex::new(Vec::new()));
    let status = Arc::new(AtomicU16::new(200));

    let task = {
      let requests = requests.clone();
      let status = status.clone();
      tokio::spawn(async move {
        loop {
          let Ok((stream, _)) = listener.accept().await else {
            break;
          };
          let requests = requests.clone();
          let status = status.clone();
          tokio::spawn(async move {
            let svc = service_fn(move |req| record(req, requests.clone(), status.clone()));
            let _ = http1::Builder::new()
              .serve_connection(TokioIo::new(stream), svc)
              .await;
          });
        }
      })
    };

    Self {
      addr,
      requests,
      status,
      task,
    }
  }

  /// Answer subsequent POSTs with `status`.
  pub fn respond_with(&self, status: u16) {
    self.status.store(status, Ordering::SeqCst);
  }

  pub fn url(&self) -> String {
    format!("http://{}/hook", self.addr)
  }

  pub fn requests(&self) -> Vec<CapturedRequest> {
    self.requests.lock().clone()
  }

  /// Recorded notification deliveries, in arrival order.
  pub fn posts(&self) -> Vec<CapturedRequest> {
    self
      .requests()
      .into_iter()
      .filter(|r| r.method == Method::POST)
      .collect()
  }
}

impl Drop for WebhookCapture {
  fn drop(&mut self) {
    self.task.abort();
  }
}

async fn record(
  req: Request<Incoming>,
  requests: Arc<Mutex<Vec<CapturedRequest>>>,
  status: Arc<AtomicU16>,
) -> Result<Response<Full<Bytes>>, Infallible> {
  let method = req.method().clone();
  let path = req.uri().path().to_string();
  let query = req.uri().query().map(str::to_string);
  let authorization = req
    .headers()
    .get(hyper::header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .map(str::to_string);
  let body = req
    .into_body()
    .collect()
    .await
    .map(|c| c.to_bytes())
    .unwrap_or_default();
  requests.lock().push(CapturedRequest {
    method: method.clone(),
    path,
    query: query.clone(),
    authorization,
    body,
  });

  let challenge = query.as_deref().and_then(|q| {
    q.split('&')
      .find_map(|pair| pair.strip_prefix("validationToken="))
      .map(str::to_string)
  });
  let resp = match (method, challenge) {
    (Method::GET, Some(token)) => Response::new(Full::new(Bytes::from(token))),
    _ => {
      let mut resp = Response::new(Full::new(Bytes::new()));
      *resp.status_mut() = StatusCode::from_u16(status.load(Ordering::SeqCst)).unwrap_or(StatusCode::OK);
      resp
    }
  };
  Ok(resp)
}
