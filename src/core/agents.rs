//! Voice agent directory.
//!
//! Agents are loaded from configuration. Each call is matched to at most one
//! agent whose prompt, voice, language and tools become the call's persona:
//!
//! 1. the agent named when the outbound call was placed
//! 2. the agent owning the dialed number (inbound) or caller ID (outbound)
//! 3. otherwise the default persona, with no owner to bill

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::realtime::{GrokVoice, Persona, ToolDefinition};
use crate::core::telephony::{CallDirection, CallMetadata};

/// A configured voice agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: String,
    /// Wallet owner billed for the agent's calls
    #[serde(default)]
    pub user_id: Option<String>,
    /// E.164 number routed to this agent
    #[serde(default)]
    pub phone_number: Option<String>,
    pub system_prompt: String,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
}

/// Agent selected for a call.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAgent {
    pub agent_id: Option<String>,
    pub user_id: Option<String>,
    pub persona: Persona,
}

#[derive(Debug)]
pub struct AgentDirectory {
    agents: Vec<AgentProfile>,
    default_persona: Persona,
    outbound: DashMap<String, String>,
}

fn same_number(a: &str, b: &str) -> bool {
    let digits = |s: &str| s.chars().filter(|c| !c.is_whitespace() && *c != '-').collect::<String>();
    digits(a) == digits(b)
}

impl AgentDirectory {
    pub fn new(agents: Vec<AgentProfile>, default_persona: Persona) -> Self {
        Self {
            agents,
            default_persona,
            outbound: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn get(&self, agent_id: &str) -> Option<&AgentProfile> {
        self.agents.iter().find(|a| a.id == agent_id)
    }

    pub fn default_persona(&self) -> &Persona {
        &self.default_persona
    }

    /// Remember which agent an originated call belongs to.
    pub fn remember_outbound(&self, call_sid: &str, agent_id: &str) {
        self.outbound
            .insert(call_sid.to_string(), agent_id.to_string());
    }

    /// Forget a remembered outbound agent without resolving it.
    pub fn forget(&self, call_sid: &str) {
        self.outbound.remove(call_sid);
    }

    fn by_number(&self, number: &str) -> Option<&AgentProfile> {
        self.agents.iter().find(|a| {
            a.phone_number
                .as_deref()
                .is_some_and(|n| same_number(n, number))
        })
    }

    /// Pick the agent for a call. Consumes any remembered outbound agent.
    pub fn resolve(&self, metadata: &CallMetadata) -> ResolvedAgent {
        let remembered = self
            .outbound
            .remove(&metadata.call_sid)
            .and_then(|(_, agent_id)| self.get(&agent_id));

        let agent = remembered.or_else(|| match metadata.direction {
            CallDirection::Inbound => self.by_number(&metadata.to),
            CallDirection::Outbound => self.by_number(&metadata.from),
        });

        match agent {
            Some(agent) => {
                debug!(call_sid = %metadata.call_sid, agent_id = %agent.id, "Resolved agent");
                ResolvedAgent {
                    agent_id: Some(agent.id.clone()),
                    user_id: agent.user_id.clone(),
                    persona: self.persona_for(agent),
                }
            }
            None => {
                debug!(call_sid = %metadata.call_sid, "No agent matched, using default persona");
                ResolvedAgent {
                    agent_id: None,
                    user_id: None,
                    persona: self.default_persona.clone(),
                }
            }
        }
    }

    fn persona_for(&self, agent: &AgentProfile) -> Persona {
        let voice = agent
            .voice
            .as_deref()
            .map(GrokVoice::from_str_or_default)
            .unwrap_or_default();

        Persona {
            instructions: agent.system_prompt.clone(),
            voice: voice.as_str().to_string(),
            language: agent
                .language
                .clone()
                .or_else(|| self.default_persona.language.clone()),
            tools: agent.tools.clone(),
            turn_detection: self.default_persona.turn_detection.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::telephony::CallStatus;

    fn agent(id: &str, number: Option<&str>) -> AgentProfile {
        AgentProfile {
            id: id.to_string(),
            user_id: Some(format!("owner-of-{id}")),
            phone_number: number.map(str::to_string),
            system_prompt: format!("You are {id}."),
            voice: Some("eve".to_string()),
            language: Some("Spanish".to_string()),
            tools: Vec::new(),
        }
    }

    fn metadata(call_sid: &str, from: &str, to: &str, direction: CallDirection) -> CallMetadata {
        CallMetadata {
            call_sid: call_sid.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            direction,
            status: CallStatus::InProgress,
        }
    }

    fn directory() -> AgentDirectory {
        AgentDirectory::new(
            vec![
                agent("support", Some("+1 555 765 4321")),
                agent("sales", Some("+15550001111")),
            ],
            Persona::default(),
        )
    }

    #[test]
    fn test_inbound_matches_dialed_number() {
        let resolved = directory().resolve(&metadata(
            "CA123",
            "+15551234567",
            "+15557654321",
            CallDirection::Inbound,
        ));

        assert_eq!(resolved.agent_id.as_deref(), Some("support"));
        assert_eq!(resolved.user_id.as_deref(), Some("owner-of-support"));
        assert_eq!(resolved.persona.voice, "Eve");
        assert_eq!(resolved.persona.instructions, "You are support.");
        assert!(resolved.persona.full_instructions().ends_with("Always speak in Spanish."));
    }

    #[test]
    fn test_remembered_outbound_agent_wins_once() {
        let directory = directory();
        directory.remember_outbound("CA9", "sales");

        let call = metadata("CA9", "+15557654321", "+15559999999", CallDirection::Outbound);
        assert_eq!(directory.resolve(&call).agent_id.as_deref(), Some("sales"));
        // caller ID now decides
        assert_eq!(directory.resolve(&call).agent_id.as_deref(), Some("support"));
    }

    #[test]
    fn test_unmatched_call_uses_default_persona() {
        let resolved = directory().resolve(&metadata(
            "CA1",
            "+15551234567",
            "+15550000000",
            CallDirection::Inbound,
        ));

        assert!(resolved.agent_id.is_none());
        assert!(resolved.user_id.is_none());
        assert_eq!(resolved.persona, Persona::default());
    }

    #[test]
    fn test_unknown_voice_falls_back_to_default() {
        let mut profile = agent("x", Some("+15550002222"));
        profile.voice = Some("nova".to_string());
        let directory = AgentDirectory::new(vec![profile], Persona::default());

        let resolved = directory.resolve(&metadata(
            "CA1",
            "+15551234567",
            "+15550002222",
            CallDirection::Inbound,
        ));
        assert_eq!(resolved.persona.voice, "Ara");
    }

    #[test]
    fn test_profile_deserializes_with_defaults() {
        let profile: AgentProfile =
            serde_json::from_str(r#"{"id":"a1","system_prompt":"Be brief."}"#).unwrap();
        assert!(profile.user_id.is_none());
        assert!(profile.voice.is_none());
        assert!(profile.tools.is_empty());
    }
}
