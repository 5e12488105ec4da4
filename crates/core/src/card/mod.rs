//! Capability registry: turns the `[agent_card]` config table into the
//! discovery document served at `/.well-known/agent.json`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{AgentCardConfig, CapabilitiesConfig, SkillConfig};

/// Path of the discovery document.
pub const AGENT_CARD_PATH: &str = "/.well-known/agent.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapabilities {
  pub streaming: bool,
  pub push_notifications: bool,
  pub state_transition_history: bool,
}

impl From<CapabilitiesConfig> for AgentCapabilities {
  fn from(c: CapabilitiesConfig) -> Self {
    Self {
      streaming: c.streaming,
      push_notifications: c.push_notifications,
      state_transition_history: c.state_transition_history,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSkill {
  pub id: String,
  pub name: String,
  pub description: String,
  pub tags: Vec<String>,
  pub examples: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub input_modes: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output_modes: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
  pub name: String,
  pub description: String,
  pub url: String,
  pub version: String,
  pub default_input_modes: Vec<String>,
  pub default_output_modes: Vec<String>,
  pub capabilities: AgentCapabilities,
  pub skills: Vec<AgentSkill>,
}

/// Input of [`build`]: the config table plus what only startup knows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityConfig {
  pub card: AgentCardConfig,
  /// Endpoint URL, derived from the host and port the server binds.
  pub url: String,
  /// Content types the agent accepts and produces.
  pub content_types: Vec<String>,
}

impl CapabilityConfig {
  pub fn new(card: AgentCardConfig, host: &str, port: u16, content_types: &[&str]) -> Self {
    Self {
      card,
      url: endpoint_url(host, port),
      content_types: content_types.iter().map(|s| s.to_string()).collect(),
    }
  }
}

/// `http://{host}:{port}/`
pub fn endpoint_url(host: &str, port: u16) -> String {
  format!("http://{host}:{port}/")
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigValidationError {
  #[error("agent_card.{0} is required")]
  MissingField(&'static str),
  #[error("agent_card.skills[{index}].{field} is required")]
  MissingSkillField { index: usize, field: &'static str },
  #[error("agent_card.skills[{index}] repeats skill id `{id}`")]
  DuplicateSkillId { index: usize, id: String },
  #[error("agent_card.skills[{index}] repeats tag `{tag}`")]
  DuplicateTag { index: usize, tag: String },
}

/// Build the agent card. Pure; skills keep their configured order.
pub fn build(config: CapabilityConfig) -> Result<AgentCard, ConfigValidationError> {
  let CapabilityConfig {
    card,
    url,
    content_types,
  } = config;

  let name = required(card.name, "name")?;
  let version = required(card.version, "version")?;

  let mut seen = HashSet::new();
  let mut skills = Vec::with_capacity(card.skills.len());
  for (index, skill) in card.skills.into_iter().enumerate() {
    let skill = build_skill(index, skill)?;
    if !seen.insert(skill.id.clone()) {
      return Err(ConfigValidationError::DuplicateSkillId { index, id: skill.id });
    }
    skills.push(skill);
  }

  Ok(AgentCard {
    name,
    description: card.description,
    url,
    version,
    default_input_modes: content_types.clone(),
    default_output_modes: content_types,
    capabilities: card.capabilities.into(),
    skills,
  })
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ConfigValidationError> {
  match value {
    Some(v) if !v.trim().is_empty() => Ok(v),
    _ => Err(ConfigValidationError::MissingField(field)),
  }
}

fn build_skill(index: usize, skill: SkillConfig) -> Result<AgentSkill, ConfigValidationError> {
  let missing = |field| ConfigValidationError::MissingSkillField { index, field };
  let id = skill
    .id
    .filter(|s| !s.trim().is_empty())
    .ok_or_else(|| missing("id"))?;
  let name = skill
    .name
    .filter(|s| !s.trim().is_empty())
    .ok_or_else(|| missing("name"))?;

  let mut tags = HashSet::new();
  for tag in &skill.tags {
    if !tags.insert(tag.as_str()) {
      return Err(ConfigValidationError::DuplicateTag {
        index,
        tag: tag.clone(),
      });
    }
  }

  Ok(AgentSkill {
    id,
    name,
    description: skill.description,
    tags: skill.tags,
    examples: skill.examples,
    input_modes: skill.input_modes,
    output_modes: skill.output_modes,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use proptest::prelude::*;

  fn skill(id: &str) -> SkillConfig {
    SkillConfig {
      id: Some(id.to_string()),
      name: Some(id.to_uppercase()),
      ..Default::default()
    }
  }

  fn card(skills: Vec<SkillConfig>) -> AgentCardConfig {
    AgentCardConfig {
      name: Some("W".into()),
      description: String::new(),
      version: Some("1.0".into()),
      capabilities: CapabilitiesConfig {
        streaming: true,
        push_notifications: true,
        state_transition_history: false,
      },
      skills,
    }
  }

  fn build_card(c: AgentCardConfig) -> Result<AgentCard, ConfigValidationError> {
    build(CapabilityConfig::new(c, "localhost", 10000, &["text", "text/plain"]))
  }

  #[test]
  fn minimal_card_serializes_discovery_shape() {
    let mut lookup = skill("lookup");
    lookup.name = Some("Lookup".into());
    lookup.tags = vec!["search".into()];
    lookup.examples = vec!["find X".into()];
    let built = build_card(card(vec![lookup])).unwrap();
    let v = serde_json::to_value(&built).unwrap();
    assert_eq!(v["name"], "W");
    assert_eq!(v["version"], "1.0");
    assert_eq!(v["url"], "http://localhost:10000/");
    assert_eq!(v["defaultInputModes"], serde_json::json!(["text", "text/plain"]));
    assert_eq!(v["defaultOutputModes"], serde_json::json!(["text", "text/plain"]));
    assert_eq!(v["capabilities"]["streaming"], true);
    assert_eq!(v["capabilities"]["pushNotifications"], true);
    assert_eq!(v["skills"].as_array().unwrap().len(), 1);
    assert_eq!(v["skills"][0]["id"], "lookup");
    assert_eq!(v["skills"][0]["tags"], serde_json::json!(["search"]));
    assert_eq!(v["skills"][0]["examples"], serde_json::json!(["find X"]));
    assert!(v["skills"][0].get("inputModes").is_none());
  }

  #[test]
  fn missing_name_is_rejected() {
    let mut c = card(vec![]);
    c.name = None;
    assert_eq!(build_card(c).unwrap_err(), ConfigValidationError::MissingField("name"));
  }

  #[test]
  fn blank_version_is_rejected() {
    let mut c = card(vec![]);
    c.version = Some("  ".into());
    assert_eq!(build_card(c).unwrap_err(), ConfigValidationError::MissingField("version"));
  }

  #[test]
  fn skill_without_id_is_rejected() {
    let mut broken = skill("x");
    broken.id = None;
    let err = build_card(card(vec![skill("a"), broken])).unwrap_err();
    assert_eq!(
      err,
      ConfigValidationError::MissingSkillField { index: 1, field: "id" }
    );
    assert_eq!(err.to_string(), "agent_card.skills[1].id is required");
  }

  #[test]
  fn skill_without_name_is_rejected() {
    let mut broken = skill("x");
    broken.name = Some(String::new());
    let err = build_card(card(vec![broken])).unwrap_err();
    assert_eq!(
      err,
      ConfigValidationError::MissingSkillField { index: 0, field: "name" }
    );
  }

  #[test]
  fn duplicate_skill_ids_are_rejected() {
    let err = build_card(card(vec![skill("a"), skill("b"), skill("a")])).unwrap_err();
    assert_eq!(
      err,
      ConfigValidationError::DuplicateSkillId { index: 2, id: "a".into() }
    );
  }

  #[test]
  fn duplicate_tags_are_rejected() {
    let mut s = skill("a");
    s.tags = vec!["x".into(), "y".into(), "x".into()];
    assert!(matches!(
      build_card(card(vec![s])),
      Err(ConfigValidationError::DuplicateTag { index: 0, .. })
    ));
  }

  #[test]
  fn empty_skill_list_is_valid() {
    assert!(build_card(card(vec![])).unwrap().skills.is_empty());
  }

  proptest! {
    #[test]
    fn skill_order_follows_config(ids in proptest::collection::hash_set("[a-z]{1,8}", 0..16)) {
      let ids: Vec<String> = ids.into_iter().collect();
      let built = build_card(card(ids.iter().map(|id| skill(id)).collect())).unwrap();
      let got: Vec<String> = built.skills.into_iter().map(|s| s.id).collect();
      prop_assert_eq!(got, ids);
    }
  }
}
