//! In-memory task dispatcher: runs the agent for incoming tasks and pushes
//! signed notifications to subscribers after every state change.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::agent::{Agent, AgentReply};
use crate::domain::task::{
  Artifact, Message, Part, PushNotificationConfig, Task, TaskArtifactUpdateEvent, TaskError,
  TaskEvent, TaskState,
};
use crate::push::NotificationSender;
use crate::rpc::{TaskPushNotificationConfig, TaskQueryParams, TaskSendParams, codes};

#[derive(Debug, Error)]
pub enum DispatchError {
  #[error("task `{0}` not found")]
  TaskNotFound(String),
  #[error("task `{0}` cannot be canceled")]
  TaskNotCancelable(String),
  #[error("push notifications are not supported")]
  PushNotSupported,
  #[error("push notification url is invalid: {0}")]
  InvalidPushUrl(String),
  #[error("incompatible content types")]
  IncompatibleContentTypes,
  #[error(transparent)]
  Task(#[from] TaskError),
}

impl DispatchError {
  /// JSON-RPC error code for this failure.
  pub fn code(&self) -> i32 {
    match self {
      DispatchError::TaskNotFound(_) => codes::TASK_NOT_FOUND,
      DispatchError::TaskNotCancelable(_) => codes::TASK_NOT_CANCELABLE,
      DispatchError::PushNotSupported => codes::PUSH_NOTIFICATION_NOT_SUPPORTED,
      DispatchError::InvalidPushUrl(_) => codes::INVALID_PARAMS,
      DispatchError::IncompatibleContentTypes => codes::CONTENT_TYPE_NOT_SUPPORTED,
      DispatchError::Task(_) => codes::INVALID_REQUEST,
    }
  }
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Capacity of the per-subscription event and agent update channels.
const STREAM_BUFFER: usize = 16;

struct TaskEntry {
  task: Task,
  push: Option<PushNotificationConfig>,
  /// Feeds the job delivering this task's notifications, one at a time.
  outbox: Option<mpsc::UnboundedSender<Delivery>>,
}

struct Delivery {
  url: String,
  task: Task,
}

struct Inner {
  agent: Arc<dyn Agent>,
  sender: NotificationSender,
  push_enabled: bool,
  tasks: Mutex<HashMap<String, TaskEntry>>,
}

/// Cheap to clone; all clones share one task table.
#[derive(Clone)]
pub struct TaskManager {
  inner: Arc<Inner>,
}

impl TaskManager {
  pub fn new(agent: Arc<dyn Agent>, sender: NotificationSender, push_enabled: bool) -> Self {
    Self {
      inner: Arc::new(Inner {
        agent,
        sender,
        push_enabled,
        tasks: Mutex::new(HashMap::new()),
      }),
    }
  }

  /// Run the agent to completion for one message and return the resulting task.
  pub async fn send_task(&self, params: TaskSendParams) -> DispatchResult<Task> {
    let history_length = params.history_length;
    let task = self.accept(params).await?;
    let session = task.session_id.clone().unwrap_or_default();
    let query = last_user_text(&task);

    let reply = self.inner.agent.invoke(&query, &session);
    let updated = self.apply_reply(&task.id, reply)?;
    self.notify(&updated);
    Ok(updated.with_history_limit(history_length))
  }

  /// Like [`send_task`](Self::send_task) but yields events while the agent
  /// works. The receiver closes after the last event. Subscribers get one
  /// notification per status change, as it happens.
  pub async fn send_task_subscribe(&self, params: TaskSendParams) -> DispatchResult<mpsc::Receiver<TaskEvent>> {
    let task = self.accept(params).await?;
    let session = task.session_id.clone().unwrap_or_default();
    let query = last_user_text(&task);

    let (events, events_rx) = mpsc::channel(STREAM_BUFFER);
    let (updates, mut updates_rx) = mpsc::channel(STREAM_BUFFER);
    let agent = self.inner.agent.clone();
    tokio::task::spawn_blocking(move || agent.stream(&query, &session, &updates));

    let manager = self.clone();
    tokio::spawn(async move {
      // a gone client does not stop the task; sends below may fail
      let _ = events.send(task.status_event()).await;
      while let Some(reply) = updates_rx.recv().await {
        let produced_artifact = reply.is_task_complete;
        let updated = match manager.apply_reply(&task.id, reply) {
          Ok(updated) => updated,
          Err(error) => {
            warn!(event = "agent_update_rejected", task_id = %task.id, error = %error, "agent update not applied");
            break;
          }
        };
        manager.notify(&updated);
        if produced_artifact && let Some(artifact) = updated.artifacts.last() {
          let artifact = TaskEvent::Artifact(TaskArtifactUpdateEvent {
            id: updated.id.clone(),
            artifact: artifact.clone(),
          });
          let _ = events.send(artifact).await;
        }
        let _ = events.send(updated.status_event()).await;
      }
    });
    Ok(events_rx)
  }

  pub fn get_task(&self, params: &TaskQueryParams) -> DispatchResult<Task> {
    let tasks = self.inner.tasks.lock();
    let entry = tasks
      .get(&params.id)
      .ok_or_else(|| DispatchError::TaskNotFound(params.id.clone()))?;
    Ok(entry.task.with_history_limit(params.history_length))
  }

  pub fn cancel_task(&self, id: &str) -> DispatchResult<Task> {
    let task = {
      let mut tasks = self.inner.tasks.lock();
      let entry = tasks
        .get_mut(id)
        .ok_or_else(|| DispatchError::TaskNotFound(id.to_string()))?;
      if entry.task.status.state.is_final() {
        return Err(DispatchError::TaskNotCancelable(id.to_string()));
      }
      entry.task.transition_to(TaskState::Canceled, None)?;
      entry.task.clone()
    };
    info!(event = "task_canceled", task_id = %id, "task canceled");
    self.notify(&task);
    Ok(task.with_history_limit(None))
  }

  /// Register a callback for an existing task after checking URL ownership.
  pub async fn set_push_notification(
    &self,
    params: TaskPushNotificationConfig,
  ) -> DispatchResult<TaskPushNotificationConfig> {
    if !self.inner.push_enabled {
      return Err(DispatchError::PushNotSupported);
    }
    if !self.inner.tasks.lock().contains_key(&params.id) {
      return Err(DispatchError::TaskNotFound(params.id));
    }
    let url = &params.push_notification_config.url;
    if !self.inner.sender.verify_url(url).await {
      return Err(DispatchError::InvalidPushUrl(url.clone()));
    }
    let mut tasks = self.inner.tasks.lock();
    let entry = tasks
      .get_mut(&params.id)
      .ok_or_else(|| DispatchError::TaskNotFound(params.id.clone()))?;
    entry.push = Some(params.push_notification_config.clone());
    info!(event = "push_notification_set", task_id = %params.id, url = %url, "push notification registered");
    Ok(params)
  }

  pub fn get_push_notification(&self, id: &str) -> DispatchResult<TaskPushNotificationConfig> {
    let tasks = self.inner.tasks.lock();
    let entry = tasks
      .get(id)
      .ok_or_else(|| DispatchError::TaskNotFound(id.to_string()))?;
    let config = entry
      .push
      .clone()
      .ok_or_else(|| DispatchError::TaskNotFound(id.to_string()))?;
    Ok(TaskPushNotificationConfig {
      id: id.to_string(),
      push_notification_config: config,
    })
  }

  /// Validate the request, verify its callback, and upsert the task in `working`.
  async fn accept(&self, params: TaskSendParams) -> DispatchResult<Task> {
    if let Some(modes) = &params.accepted_output_modes {
      let supported = self.inner.agent.supported_content_types();
      if !modes.iter().any(|m| supported.contains(&m.as_str())) {
        return Err(DispatchError::IncompatibleContentTypes);
      }
    }
    if let Some(push) = &params.push_notification {
      if !self.inner.push_enabled {
        return Err(DispatchError::PushNotSupported);
      }
      if !self.inner.sender.verify_url(&push.url).await {
        return Err(DispatchError::InvalidPushUrl(push.url.clone()));
      }
    }

    let TaskSendParams {
      id,
      session_id,
      message,
      push_notification,
      ..
    } = params;

    let mut tasks = self.inner.tasks.lock();
    let entry = match tasks.entry(id.clone()) {
      Entry::Occupied(occupied) => {
        let entry = occupied.into_mut();
        entry.task.transition_to(TaskState::Working, None)?;
        entry.task.history.push(message);
        entry
      }
      Entry::Vacant(vacant) => {
        let session = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        let mut task = Task::new(id, Some(session), message);
        task.transition_to(TaskState::Working, None)?;
        vacant.insert(TaskEntry {
          task,
          push: None,
          outbox: None,
        })
      }
    };
    if push_notification.is_some() {
      entry.push = push_notification;
    }
    info!(event = "task_accepted", task_id = %entry.task.id, "task accepted");
    Ok(entry.task.clone())
  }

  fn apply_reply(&self, id: &str, reply: AgentReply) -> DispatchResult<Task> {
    let mut tasks = self.inner.tasks.lock();
    let entry = tasks
      .get_mut(id)
      .ok_or_else(|| DispatchError::TaskNotFound(id.to_string()))?;
    let task = &mut entry.task;
    if reply.is_task_complete {
      let index = task.artifacts.len() as u32;
      task.artifacts.push(Artifact {
        name: None,
        parts: vec![Part::text(reply.content)],
        index,
      });
      task.transition_to(TaskState::Completed, None)?;
    } else if reply.require_user_input {
      task.transition_to(TaskState::InputRequired, Some(Message::agent_text(reply.content)))?;
    } else {
      task.transition_to(TaskState::Working, Some(Message::agent_text(reply.content)))?;
    }
    info!(event = "task_updated", task_id = %id, state = ?task.status.state, "task state changed");
    Ok(task.clone())
  }

  /// Queue `task` for delivery to its callback, if it has one. Deliveries
  /// for one task are attempted in the order they were queued.
  fn notify(&self, task: &Task) {
    let mut tasks = self.inner.tasks.lock();
    let Some(entry) = tasks.get_mut(&task.id) else {
      return;
    };
    let Some(push) = &entry.push else {
      return;
    };
    let delivery = Delivery {
      url: push.url.clone(),
      task: task.with_history_limit(None),
    };
    let outbox = entry
      .outbox
      .get_or_insert_with(|| spawn_courier(self.inner.sender.clone()));
    if outbox.send(delivery).is_err() {
      warn!(event = "push_notification_dropped", task_id = %task.id, "notification queue closed");
    }
  }
}

/// Start the job that delivers one task's notifications sequentially.
fn spawn_courier(sender: NotificationSender) -> mpsc::UnboundedSender<Delivery> {
  let (outbox, mut queue) = mpsc::unbounded_channel::<Delivery>();
  tokio::spawn(async move {
    while let Some(Delivery { url, task }) = queue.recv().await {
      if let Err(error) = sender.deliver_json(&url, &task).await {
        warn!(event = "push_notification_failed", task_id = %task.id, url = %url, error = %error, "push notification not delivered");
      }
    }
  });
  outbox
}

fn last_user_text(task: &Task) -> String {
  task
    .history
    .iter()
    .rev()
    .find(|m| m.role == crate::domain::task::Role::User)
    .map(Message::text)
    .unwrap_or_default()
}
