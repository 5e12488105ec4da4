//! JSON-RPC method names, error codes, and parameter DTOs of the task API.

use serde::{Deserialize, Serialize};

use crate::domain::task::{Message, PushNotificationConfig};

pub mod methods {
  pub const SEND: &str = "tasks/send";
  pub const SEND_SUBSCRIBE: &str = "tasks/sendSubscribe";
  pub const GET: &str = "tasks/get";
  pub const CANCEL: &str = "tasks/cancel";
  pub const SET_PUSH_NOTIFICATION: &str = "tasks/pushNotification/set";
  pub const GET_PUSH_NOTIFICATION: &str = "tasks/pushNotification/get";
}

pub mod codes {
  pub const PARSE_ERROR: i32 = -32700;
  pub const INVALID_REQUEST: i32 = -32600;
  pub const METHOD_NOT_FOUND: i32 = -32601;
  pub const INVALID_PARAMS: i32 = -32602;
  pub const INTERNAL_ERROR: i32 = -32603;
  pub const TASK_NOT_FOUND: i32 = -32001;
  pub const TASK_NOT_CANCELABLE: i32 = -32002;
  pub const PUSH_NOTIFICATION_NOT_SUPPORTED: i32 = -32003;
  pub const UNSUPPORTED_OPERATION: i32 = -32004;
  pub const CONTENT_TYPE_NOT_SUPPORTED: i32 = -32005;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskSendParams {
  pub id: String,
  #[serde(default)]
  pub session_id: Option<String>,
  pub message: Message,
  #[serde(default)]
  pub accepted_output_modes: Option<Vec<String>>,
  #[serde(default)]
  pub push_notification: Option<PushNotificationConfig>,
  #[serde(default)]
  pub history_length: Option<usize>,
  #[serde(default)]
  pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskQueryParams {
  pub id: String,
  #[serde(default)]
  pub history_length: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskIdParams {
  pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskPushNotificationConfig {
  pub id: String,
  pub push_notification_config: PushNotificationConfig,
}

/// A JSON-RPC 2.0 response frame, used for streamed results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseFrame<T> {
  pub jsonrpc: String,
  pub id: serde_json::Value,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub result: Option<T>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<ErrorFrame>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorFrame {
  pub code: i32,
  pub message: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub data: Option<serde_json::Value>,
}

impl<T> ResponseFrame<T> {
  pub fn success(id: serde_json::Value, result: T) -> Self {
    Self {
      jsonrpc: "2.0".to_string(),
      id,
      result: Some(result),
      error: None,
    }
  }

  pub fn failure(id: serde_json::Value, code: i32, message: impl Into<String>) -> Self {
    Self {
      jsonrpc: "2.0".to_string(),
      id,
      result: None,
      error: Some(ErrorFrame {
        code,
        message: message.into(),
        data: None,
      }),
    }
  }
}
