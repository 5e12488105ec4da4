use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, Limited, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::header::{ALLOW, CACHE_CONTROL, CONTENT_TYPE, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use jsonrpsee::server::RpcModule;
use serde::Serialize;
use serde_json::{Value, json};
use tokio_stream::StreamExt as _;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, warn};

use crate::card::{AGENT_CARD_PATH, AgentCard};
use crate::dispatcher::TaskManager;
use crate::keys::KeyManager;
use crate::rpc::{ResponseFrame, TaskSendParams, codes, methods};

/// Path of the public key set.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";
/// Path accepting JSON-RPC task calls.
pub const RPC_PATH: &str = "/";

const MAX_BODY_BYTES: usize = 1024 * 1024;

pub(crate) type Body = BoxBody<Bytes, Infallible>;

fn full(bytes: impl Into<Bytes>) -> Body {
  Full::new(bytes.into()).boxed()
}

/// Everything the front door serves, assembled once before binding.
pub struct Routes {
  card: Arc<AgentCard>,
  keys: Arc<KeyManager>,
  tasks: TaskManager,
  rpc: RpcModule<TaskManager>,
}

impl Routes {
  pub fn mount(card: Arc<AgentCard>, keys: Arc<KeyManager>, tasks: TaskManager) -> Self {
    let mut rpc = RpcModule::new(tasks.clone());
    super::api::register(&mut rpc);
    Self {
      card,
      keys,
      tasks,
      rpc,
    }
  }

  pub fn card(&self) -> &AgentCard {
    &self.card
  }

  pub fn keys(&self) -> &Arc<KeyManager> {
    &self.keys
  }

  /// Registered JSON-RPC method names plus the streaming one.
  pub fn method_names(&self) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = self.rpc.method_names().collect();
    names.push(methods::SEND_SUBSCRIBE);
    names.sort_unstable();
    names
  }
}

pub(crate) async fn handle(
  routes: Arc<Routes>,
  req: Request<Incoming>,
) -> Result<Response<Body>, Infallible> {
  let method = req.method().clone();
  let path = req.uri().path().to_string();
  debug!(event = "http_request", method = %method, path = %path);

  let resp = match (&method, path.as_str()) {
    (&Method::GET, AGENT_CARD_PATH) => json_response(StatusCode::OK, routes.card()),
    (&Method::GET, JWKS_PATH) => match routes.keys.public_key_set() {
      Ok(doc) => json_response(StatusCode::OK, &doc),
      Err(e) => {
        error!(event = "jwks_unavailable", error = %e, "key set requested before keys exist");
        json_response(StatusCode::SERVICE_UNAVAILABLE, &json!({ "error": e.to_string() }))
      }
    },
    (&Method::POST, RPC_PATH) => rpc(&routes, req).await,
    (_, AGENT_CARD_PATH | JWKS_PATH) => method_not_allowed("GET"),
    (_, RPC_PATH) => method_not_allowed("POST"),
    _ => json_response(StatusCode::NOT_FOUND, &json!({ "error": "not found" })),
  };
  Ok(resp)
}

async fn rpc(routes: &Routes, req: Request<Incoming>) -> Response<Body> {
  let body = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
    Ok(collected) => collected.to_bytes(),
    Err(e) => {
      warn!(event = "rpc_body_rejected", error = %e, "request body unreadable or too large");
      return json_response(
        StatusCode::PAYLOAD_TOO_LARGE,
        &ResponseFrame::<()>::failure(Value::Null, codes::INVALID_REQUEST, "request body too large"),
      );
    }
  };

  let Ok(request) = serde_json::from_slice::<Value>(&body) else {
    return rpc_failure(Value::Null, codes::PARSE_ERROR, "Parse error");
  };
  let id = request.get("id").cloned().unwrap_or(Value::Null);
  let Some(method) = request.get("method").and_then(Value::as_str) else {
    return rpc_failure(id, codes::INVALID_REQUEST, "Invalid request");
  };
  if request.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
    return rpc_failure(id, codes::INVALID_REQUEST, "Invalid request");
  }

  if method == methods::SEND_SUBSCRIBE {
    return send_subscribe(routes, id, request.get("params").cloned()).await;
  }

  let Ok(text) = std::str::from_utf8(&body) else {
    return rpc_failure(id, codes::PARSE_ERROR, "Parse error");
  };
  match routes.rpc.raw_json_request(text, 1).await {
    Ok((response, _stream)) => {
      let mut resp = Response::new(full(response.to_string()));
      resp
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
      resp
    }
    Err(e) => {
      debug!(event = "rpc_parse_failed", error = %e);
      rpc_failure(id, codes::INVALID_REQUEST, "Invalid request")
    }
  }
}

/// Run the task and answer with one SSE frame per event, written as the
/// events are produced.
async fn send_subscribe(routes: &Routes, id: Value, params: Option<Value>) -> Response<Body> {
  if !routes.card.capabilities.streaming {
    return rpc_failure(id, codes::UNSUPPORTED_OPERATION, "This operation is not supported");
  }
  let params: TaskSendParams = match params.map(serde_json::from_value) {
    Some(Ok(p)) => p,
    Some(Err(e)) => return rpc_failure(id, codes::INVALID_PARAMS, format!("Invalid params: {e}")),
    None => return rpc_failure(id, codes::INVALID_PARAMS, "Invalid params: missing"),
  };

  let events = match routes.tasks.send_task_subscribe(params).await {
    Ok(events) => events,
    Err(e) => return rpc_failure(id, e.code(), e.to_string()),
  };

  let frames = ReceiverStream::new(events).filter_map(move |update| {
    match serde_json::to_string(&ResponseFrame::success(id.clone(), update)) {
      Ok(frame) => Some(Ok::<_, Infallible>(Frame::data(Bytes::from(format!("data: {frame}\n\n"))))),
      Err(e) => {
        error!(event = "sse_encode_failed", error = %e);
        None
      }
    }
  });

  let mut resp = Response::new(BodyExt::boxed(StreamBody::new(frames)));
  let headers = resp.headers_mut();
  headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
  headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
  resp
}

fn rpc_failure(id: Value, code: i32, message: impl Into<String>) -> Response<Body> {
  json_response(StatusCode::OK, &ResponseFrame::<()>::failure(id, code, message))
}

fn method_not_allowed(allow: &'static str) -> Response<Body> {
  let mut resp = json_response(
    StatusCode::METHOD_NOT_ALLOWED,
    &json!({ "error": "method not allowed" }),
  );
  resp
    .headers_mut()
    .insert(ALLOW, HeaderValue::from_static(allow));
  resp
}

fn json_response<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Response<Body> {
  let (status, body) = match serde_json::to_vec(value) {
    Ok(body) => (status, body),
    Err(e) => {
      error!(event = "json_encode_failed", error = %e);
      (StatusCode::INTERNAL_SERVER_ERROR, b"{\"error\":\"internal error\"}".to_vec())
    }
  };
  let mut resp = Response::new(full(body));
  *resp.status_mut() = status;
  resp
    .headers_mut()
    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
  resp
}
