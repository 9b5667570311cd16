//! Capability routing: picks the voice agent that conducts an interview for a
//! given module and topic.
//!
//! The table is loaded once at startup from a JSON file:
//!
//! ```json
//! {
//!   "default_agent": "general-assessor",
//!   "modules": {
//!     "forklift-101": {
//!       "default": "warehouse-assessor",
//!       "topics": { "Load Handling": "load-specialist" }
//!     }
//!   }
//! }
//! ```
//!
//! Resolution order: module + topic, then module default, then the universal default.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const BUILTIN_DEFAULT_AGENT: &str = "general-assessor";

#[derive(Debug, Clone, Default, Deserialize)]
struct ModuleAgents {
    #[serde(default)]
    default: Option<String>,
    #[serde(default)]
    topics: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RegistryFile {
    default_agent: String,
    #[serde(default)]
    modules: HashMap<String, ModuleAgents>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AgentResolution {
    pub agent_id: String,
    /// True when no topic-specific entry matched.
    pub fallback: bool,
}

#[derive(Debug, Clone)]
pub struct AgentRegistry {
    default_agent: String,
    // module id -> agents, topic keys normalized
    modules: HashMap<String, ModuleAgents>,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self {
            default_agent: BUILTIN_DEFAULT_AGENT.to_string(),
            modules: HashMap::new(),
        }
    }
}

impl AgentRegistry {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read agent registry {}", path.display()))?;
        let registry = Self::from_json(&raw)
            .with_context(|| format!("Invalid agent registry {}", path.display()))?;
        info!(
            "Loaded agent registry from {} ({} modules)",
            path.display(),
            registry.modules.len()
        );
        Ok(registry)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: RegistryFile = serde_json::from_str(raw)?;
        if file.default_agent.trim().is_empty() {
            bail!("default_agent cannot be empty");
        }

        let modules = file
            .modules
            .into_iter()
            .map(|(module_id, agents)| {
                let topics = agents
                    .topics
                    .into_iter()
                    .map(|(topic, agent)| (normalize(&topic), agent))
                    .collect();
                (
                    module_id,
                    ModuleAgents {
                        default: agents.default,
                        topics,
                    },
                )
            })
            .collect();

        Ok(Self {
            default_agent: file.default_agent,
            modules,
        })
    }

    pub fn resolve(&self, module_id: &str, topic: Option<&str>) -> AgentResolution {
        let Some(module) = self.modules.get(module_id) else {
            debug!("No agents configured for module {module_id}; using default");
            return self.universal();
        };

        if let Some(agent) = topic.and_then(|t| module.topics.get(&normalize(t))) {
            return AgentResolution {
                agent_id: agent.clone(),
                fallback: false,
            };
        }

        match &module.default {
            Some(agent) => AgentResolution {
                agent_id: agent.clone(),
                fallback: true,
            },
            None => self.universal(),
        }
    }

    fn universal(&self) -> AgentResolution {
        AgentResolution {
            agent_id: self.default_agent.clone(),
            fallback: true,
        }
    }
}

fn normalize(topic: &str) -> String {
    topic
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
