//! Owner and agent entities

use crate::{AgentId, OwnerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A human or organization that owns agents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Owner {
    pub id: OwnerId,
    /// Opaque bearer credential; immutable post-issue, rotation swaps it atomically
    pub api_key: String,
    pub name: String,
    pub contact: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle status of an agent
///
/// Transitions move away from `Active` except via explicit operator reset;
/// `Terminated` and `Killed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Paused,
    Suspended,
    Frozen,
    Terminated,
    Killed,
}

impl AgentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated | Self::Killed)
    }

    /// Whether the agent may originate spends
    pub fn can_transact(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// A governed autonomous agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub owner_id: OwnerId,
    /// Agent-scoped bearer credential
    pub api_key: String,
    pub name: String,
    pub status: AgentStatus,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(owner_id: OwnerId, name: impl Into<String>, api_key: String) -> Self {
        Self {
            id: AgentId::new(),
            owner_id,
            api_key,
            name: name.into(),
            status: AgentStatus::Active,
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_gates() {
        assert!(AgentStatus::Active.can_transact());
        assert!(!AgentStatus::Frozen.can_transact());
        assert!(AgentStatus::Killed.is_terminal());
        assert!(!AgentStatus::Paused.is_terminal());
    }
}
