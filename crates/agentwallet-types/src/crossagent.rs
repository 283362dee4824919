//! Cross-agent payment policies and transactions

use crate::{AgentId, CrossTransactionId, GroupId, Money, OwnerId, PolicyId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which counterparties a cross-agent policy covers
///
/// Resolution picks the most specific match: exact agent, then group,
/// then wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum PolicyTarget {
    Agent { agent_id: AgentId },
    Group { group_id: GroupId },
    Any,
}

impl PolicyTarget {
    /// Lower is more specific
    pub fn specificity(&self) -> u8 {
        match self {
            Self::Agent { .. } => 0,
            Self::Group { .. } => 1,
            Self::Any => 2,
        }
    }
}

/// How an authorized transfer settles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementMode {
    Immediate,
    Batched,
    Escrow,
}

/// Monetary and payment-type limits on a policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossAgentLimits {
    pub max_per_transaction: Money,
    pub max_daily_to_target: Money,
    pub max_daily_all_agents: Money,
    pub allowed_payment_types: Vec<String>,
    /// Above this, an otherwise-passing transfer is escalated to a human
    pub require_human_approval_above: Option<Money>,
}

/// A policy governing payments from one agent to others
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossAgentPolicy {
    pub id: PolicyId,
    pub owner_id: OwnerId,
    pub source_agent_id: AgentId,
    pub target: PolicyTarget,
    pub limits: CrossAgentLimits,
    pub require_mutual_policy: bool,
    pub settlement_mode: SettlementMode,
    /// In [0, 1]; 0 disables the trust check
    pub min_counterparty_trust_score: Decimal,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// How an authorization was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationMethod {
    Auto,
    Escalated,
    HumanApproved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Pending,
    Settled,
    Failed,
}

/// A persisted agent-to-agent payment attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossAgentTransaction {
    pub id: CrossTransactionId,
    pub source_agent_id: AgentId,
    pub target_agent_id: AgentId,
    pub amount: Money,
    pub payment_type: String,
    pub authorized: bool,
    pub authorization_method: AuthorizationMethod,
    pub settlement_status: SettlementStatus,
    /// Held pending explicit owner approval when set and not authorized
    pub requires_human: bool,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A named set of agents used as a policy target anchor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentGroup {
    pub id: GroupId,
    pub owner_id: OwnerId,
    pub name: String,
    pub agent_ids: Vec<AgentId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specificity_ordering() {
        let exact = PolicyTarget::Agent {
            agent_id: AgentId::new(),
        };
        let group = PolicyTarget::Group {
            group_id: GroupId::new(),
        };
        assert!(exact.specificity() < group.specificity());
        assert!(group.specificity() < PolicyTarget::Any.specificity());
    }
}
