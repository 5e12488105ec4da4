use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
  Submitted,
  Working,
  InputRequired,
  Completed,
  Canceled,
  Failed,
  Unknown,
}

impl TaskState {
  /// Terminal states accept no further transitions.
  pub fn is_final(self) -> bool {
    matches!(self, TaskState::Completed | TaskState::Canceled | TaskState::Failed)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  User,
  Agent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Part {
  Text { text: String },
  Data { data: serde_json::Value },
}

impl Part {
  pub fn text(text: impl Into<String>) -> Self {
    Part::Text { text: text.into() }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
  pub role: Role,
  pub parts: Vec<Part>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub metadata: Option<serde_json::Value>,
}

impl Message {
  pub fn agent_text(text: impl Into<String>) -> Self {
    Self {
      role: Role::Agent,
      parts: vec![Part::text(text)],
      metadata: None,
    }
  }

  /// Concatenated text parts, newline separated.
  pub fn text(&self) -> String {
    self
      .parts
      .iter()
      .filter_map(|p| match p {
        Part::Text { text } => Some(text.as_str()),
        Part::Data { .. } => None,
      })
      .collect::<Vec<_>>()
      .join("\n")
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
  pub state: TaskState,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message: Option<Message>,
  pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  pub parts: Vec<Part>,
  #[serde(default)]
  pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationInfo {
  pub schemes: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub credentials: Option<String>,
}

/// Callback registration attached to a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushNotificationConfig {
  pub url: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub token: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub authentication: Option<AuthenticationInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
  pub id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub session_id: Option<String>,
  pub status: TaskStatus,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub artifacts: Vec<Artifact>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub history: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusUpdateEvent {
  pub id: String,
  pub status: TaskStatus,
  #[serde(rename = "final")]
  pub is_final: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskArtifactUpdateEvent {
  pub id: String,
  pub artifact: Artifact,
}

/// One item of a streamed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskEvent {
  Status(TaskStatusUpdateEvent),
  Artifact(TaskArtifactUpdateEvent),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
  #[error("invalid transition: {from:?} -> {to:?}")]
  InvalidTransition { from: TaskState, to: TaskState },
}

impl Task {
  /// New task in `submitted` with the first user message as history.
  pub fn new(id: String, session_id: Option<String>, message: Message) -> Self {
    Self {
      id,
      session_id,
      status: TaskStatus {
        state: TaskState::Submitted,
        message: None,
        timestamp: Utc::now(),
      },
      artifacts: Vec::new(),
      history: vec![message],
    }
  }

  pub fn can_transition(from: TaskState, to: TaskState) -> bool {
    use TaskState::*;
    matches!(
      (from, to),
      (Submitted, Working)
        | (Submitted, Canceled)
        | (Submitted, Failed)
        | (Working, Working)
        | (Working, InputRequired)
        | (Working, Completed)
        | (Working, Failed)
        | (Working, Canceled)
        | (InputRequired, Working)
        | (InputRequired, Canceled)
    )
  }

  /// Move to `state`, recording the agent message (if any) in history.
  pub fn transition_to(&mut self, state: TaskState, message: Option<Message>) -> Result<(), TaskError> {
    let from = self.status.state;
    if !Self::can_transition(from, state) {
      return Err(TaskError::InvalidTransition { from, to: state });
    }
    if let Some(m) = &message {
      self.history.push(m.clone());
    }
    self.status = TaskStatus {
      state,
      message,
      timestamp: Utc::now(),
    };
    Ok(())
  }

  /// Copy of the task with history trimmed to the last `limit` messages.
  /// `None` keeps nothing, matching a request without `historyLength`.
  pub fn with_history_limit(&self, limit: Option<usize>) -> Task {
    let mut task = self.clone();
    let keep = limit.unwrap_or(0).min(task.history.len());
    let drop = task.history.len() - keep;
    task.history.drain(..drop);
    task
  }

  pub fn status_event(&self) -> TaskEvent {
    TaskEvent::Status(TaskStatusUpdateEvent {
      id: self.id.clone(),
      status: self.status.clone(),
      is_final: self.status.state.is_final() || self.status.state == TaskState::InputRequired,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn user(text: &str) -> Message {
    Message {
      role: Role::User,
      parts: vec![Part::text(text)],
      metadata: None,
    }
  }

  #[test]
  fn allowed_transitions() {
    use TaskState::*;
    assert!(Task::can_transition(Submitted, Working));
    assert!(Task::can_transition(Working, Completed));
    assert!(Task::can_transition(InputRequired, Working));
    assert!(!Task::can_transition(Completed, Working));
    assert!(!Task::can_transition(Submitted, Completed));
    assert!(!Task::can_transition(Canceled, Working));
  }

  #[test]
  fn transition_records_agent_message() {
    let mut t = Task::new("t1".into(), None, user("hi"));
    t.transition_to(TaskState::Working, None).unwrap();
    t.transition_to(TaskState::Completed, Some(Message::agent_text("done")))
      .unwrap();
    assert_eq!(t.status.state, TaskState::Completed);
    assert_eq!(t.history.len(), 2);
    assert_eq!(t.history[1].text(), "done");
    let err = t.transition_to(TaskState::Working, None).unwrap_err();
    assert_eq!(
      err,
      TaskError::InvalidTransition {
        from: TaskState::Completed,
        to: TaskState::Working
      }
    );
  }

  #[test]
  fn history_limit_keeps_tail() {
    let mut t = Task::new("t1".into(), None, user("a"));
    t.transition_to(TaskState::Working, Some(Message::agent_text("b")))
      .unwrap();
    t.transition_to(TaskState::Completed, Some(Message::agent_text("c")))
      .unwrap();
    assert!(t.with_history_limit(None).history.is_empty());
    let last = t.with_history_limit(Some(1));
    assert_eq!(last.history.len(), 1);
    assert_eq!(last.history[0].text(), "c");
    assert_eq!(t.with_history_limit(Some(10)).history.len(), 3);
  }

  #[test]
  fn serializes_a2a_shape() {
    let mut t = Task::new("t1".into(), Some("s1".into()), user("hi"));
    t.transition_to(TaskState::Working, None).unwrap();
    t.transition_to(TaskState::InputRequired, Some(Message::agent_text("which city?")))
      .unwrap();
    let v = serde_json::to_value(&t).unwrap();
    assert_eq!(v["id"], "t1");
    assert_eq!(v["sessionId"], "s1");
    assert_eq!(v["status"]["state"], "input-required");
    assert_eq!(v["status"]["message"]["role"], "agent");
    assert_eq!(v["status"]["message"]["parts"][0]["type"], "text");
    assert!(v.get("artifacts").is_none());
  }

  #[test]
  fn status_event_is_final_for_terminal_and_input_required() {
    let mut t = Task::new("t1".into(), None, user("hi"));
    t.transition_to(TaskState::Working, None).unwrap();
    let TaskEvent::Status(ev) = t.status_event() else {
      panic!("expected status event")
    };
    assert!(!ev.is_final);
    t.transition_to(TaskState::InputRequired, None).unwrap();
    let TaskEvent::Status(ev) = t.status_event() else {
      panic!("expected status event")
    };
    assert!(ev.is_final);
    let v = serde_json::to_value(&ev).unwrap();
    assert_eq!(v["final"], true);
  }
}
