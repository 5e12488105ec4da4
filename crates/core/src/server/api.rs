use std::sync::Arc;

use jsonrpsee::core::RpcResult;
use jsonrpsee::server::RpcModule;
use jsonrpsee::types::{ErrorObjectOwned, Params};
use tracing::debug;

use crate::dispatcher::{DispatchError, TaskManager};
use crate::rpc::{TaskIdParams, TaskPushNotificationConfig, TaskQueryParams, TaskSendParams, methods};

pub(crate) fn rpc_error(e: DispatchError) -> ErrorObjectOwned {
  ErrorObjectOwned::owned(e.code(), e.to_string(), None::<()>)
}

/// Register the task lifecycle APIs. `tasks/sendSubscribe` is answered by the
/// router directly because its response is an event stream.
pub fn register(module: &mut RpcModule<TaskManager>) {
  // ---- tasks/send ----
  module
    .register_async_method(methods::SEND, |params, ctx, _ext| send(params, ctx))
    .expect("register tasks/send");

  // ---- tasks/get ----
  module
    .register_method(
      methods::GET,
      |params, ctx: &TaskManager, _ext| -> RpcResult<serde_json::Value> {
        let p: TaskQueryParams = params.parse()?;
        debug!(event = "task_get", task_id = %p.id);
        let task = ctx.get_task(&p).map_err(rpc_error)?;
        Ok(serde_json::json!(task))
      },
    )
    .expect("register tasks/get");

  // ---- tasks/cancel ----
  module
    .register_method(
      methods::CANCEL,
      |params, ctx: &TaskManager, _ext| -> RpcResult<serde_json::Value> {
        let p: TaskIdParams = params.parse()?;
        let task = ctx.cancel_task(&p.id).map_err(rpc_error)?;
        Ok(serde_json::json!(task))
      },
    )
    .expect("register tasks/cancel");

  // ---- tasks/pushNotification/set ----
  module
    .register_async_method(methods::SET_PUSH_NOTIFICATION, |params, ctx, _ext| {
      set_push_notification(params, ctx)
    })
    .expect("register tasks/pushNotification/set");

  // ---- tasks/pushNotification/get ----
  module
    .register_method(
      methods::GET_PUSH_NOTIFICATION,
      |params, ctx: &TaskManager, _ext| -> RpcResult<serde_json::Value> {
        let p: TaskIdParams = params.parse()?;
        let config = ctx.get_push_notification(&p.id).map_err(rpc_error)?;
        Ok(serde_json::json!(config))
      },
    )
    .expect("register tasks/pushNotification/get");
}

async fn send(params: Params<'static>, ctx: Arc<TaskManager>) -> RpcResult<serde_json::Value> {
  let p: TaskSendParams = params.parse()?;
  let task = ctx.send_task(p).await.map_err(rpc_error)?;
  Ok(serde_json::json!(task))
}

async fn set_push_notification(
  params: Params<'static>,
  ctx: Arc<TaskManager>,
) -> RpcResult<serde_json::Value> {
  let p: TaskPushNotificationConfig = params.parse()?;
  let config = ctx.set_push_notification(p).await.map_err(rpc_error)?;
  Ok(serde_json::json!(config))
}
