//! Seam between the task dispatcher and whatever produces answers.
//!
//! The reasoning agent itself lives outside this crate. [`EchoAgent`] is the
//! built-in stand-in used by the binary and the tests.

use tokio::sync::mpsc;

/// Content types understood by the built-in agent.
pub const SUPPORTED_CONTENT_TYPES: [&str; 2] = ["text", "text/plain"];

/// One answer from the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReply {
  pub is_task_complete: bool,
  pub require_user_input: bool,
  pub content: String,
}

impl AgentReply {
  pub fn complete(content: impl Into<String>) -> Self {
    Self {
      is_task_complete: true,
      require_user_input: false,
      content: content.into(),
    }
  }

  pub fn needs_input(content: impl Into<String>) -> Self {
    Self {
      is_task_complete: false,
      require_user_input: true,
      content: content.into(),
    }
  }

  pub fn progress(content: impl Into<String>) -> Self {
    Self {
      is_task_complete: false,
      require_user_input: false,
      content: content.into(),
    }
  }
}

pub trait Agent: Send + Sync {
  fn supported_content_types(&self) -> &[&'static str] {
    &SUPPORTED_CONTENT_TYPES
  }

  /// Answer `query` in one step.
  fn invoke(&self, query: &str, session_id: &str) -> AgentReply;

  /// Answer `query` as a sequence of updates pushed to `updates` as they are
  /// produced; the last one is final. Runs on a blocking thread.
  fn stream(&self, query: &str, session_id: &str, updates: &mpsc::Sender<AgentReply>) {
    let _ = updates.blocking_send(self.invoke(query, session_id));
  }
}

/// Repeats the query back. Asks for input when the query is blank.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoAgent;

impl Agent for EchoAgent {
  fn invoke(&self, query: &str, _session_id: &str) -> AgentReply {
    let query = query.trim();
    if query.is_empty() {
      return AgentReply::needs_input("What would you like to know?");
    }
    AgentReply::complete(format!("You asked: {query}"))
  }

  fn stream(&self, query: &str, session_id: &str, updates: &mpsc::Sender<AgentReply>) {
    let last = self.invoke(query, session_id);
    if !last.require_user_input {
      let progress = AgentReply::progress("Processing the request...");
      if updates.blocking_send(progress).is_err() {
        return;
      }
    }
    let _ = updates.blocking_send(last);
  }
}
