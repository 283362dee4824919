//! Agent lineage and spawn policies
//!
//! Lineage is a tree rooted at an original agent. Spawning only ever adds a
//! leaf under an existing node, so acyclicity holds by construction; the
//! governor enforces the companion invariant that a child has no prior
//! lineage row.

use crate::{AgentId, Money, SpawnEventId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Status mirrored from the agent into its lineage node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineageStatus {
    Active,
    Frozen,
    Terminated,
}

/// Constraints a parent imposes on spawning
///
/// Child policies are always monotonically tighter: ratios scale the
/// parent's effective limits down, never up, and overrides can only reduce
/// further.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnPolicy {
    /// Scales the parent's daily spend limit when deriving the child's
    pub max_spend_ratio: Decimal,
    /// Scales the parent's per-transaction limit when deriving the child's
    pub max_transaction_ratio: Decimal,
    pub max_spawn_depth: u32,
    pub max_children: u32,
    pub children_can_spawn: bool,
    /// None means no vendor restriction is inherited
    pub allowed_vendors: Option<Vec<String>>,
    /// Ceiling on any daily limit this agent (or its children) may carry;
    /// set on spawned agents so grandchildren inherit from the effective
    /// value, not just wallet rules
    pub daily_limit_cap: Option<Money>,
    /// Ceiling on any per-transaction limit, same mechanism
    pub per_transaction_limit_cap: Option<Money>,
}

impl Default for SpawnPolicy {
    fn default() -> Self {
        Self {
            max_spend_ratio: dec!(1.0),
            max_transaction_ratio: dec!(1.0),
            max_spawn_depth: 3,
            max_children: 10,
            children_can_spawn: true,
            allowed_vendors: None,
            daily_limit_cap: None,
            per_transaction_limit_cap: None,
        }
    }
}

impl SpawnPolicy {
    /// The policy a freshly spawned child carries forward
    pub fn restricted_for_child(&self) -> Self {
        Self {
            max_spawn_depth: self.max_spawn_depth.saturating_sub(1),
            ..self.clone()
        }
    }
}

/// Overrides supplied at spawn time; they can only tighten
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpawnOverrides {
    pub daily_limit: Option<Money>,
    pub per_transaction_limit: Option<Money>,
    pub allowed_vendors: Option<Vec<String>>,
}

/// The effective limits a child was created with
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InheritedPolicy {
    pub daily_limit: Option<Money>,
    pub per_transaction_limit: Option<Money>,
    pub allowed_vendors: Option<Vec<String>>,
}

/// A node in the lineage tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLineage {
    pub agent_id: AgentId,
    /// None only for a root
    pub parent_id: Option<AgentId>,
    /// Invariant under further spawns
    pub root_id: AgentId,
    /// depth(child) = depth(parent) + 1
    pub depth: u32,
    pub children_ids: Vec<AgentId>,
    pub status: LineageStatus,
    pub spawn_policy: SpawnPolicy,
    pub created_at: DateTime<Utc>,
}

impl AgentLineage {
    /// A root node for an agent that has never been spawned from
    pub fn root(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            parent_id: None,
            root_id: agent_id,
            depth: 0,
            children_ids: Vec::new(),
            status: LineageStatus::Active,
            spawn_policy: SpawnPolicy::default(),
            created_at: Utc::now(),
        }
    }
}

/// Append-only record of an authorized spawn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnEvent {
    pub id: SpawnEventId,
    pub parent_id: AgentId,
    pub child_id: AgentId,
    pub depth: u32,
    pub inherited_policy: InheritedPolicy,
    pub authorized: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = SpawnPolicy::default();
        assert_eq!(policy.max_spawn_depth, 3);
        assert_eq!(policy.max_children, 10);
        assert!(policy.children_can_spawn);
    }

    #[test]
    fn test_child_policy_decrements_depth() {
        let policy = SpawnPolicy::default();
        let child = policy.restricted_for_child();
        assert_eq!(child.max_spawn_depth, 2);

        let exhausted = SpawnPolicy {
            max_spawn_depth: 0,
            ..SpawnPolicy::default()
        };
        assert_eq!(exhausted.restricted_for_child().max_spawn_depth, 0);
    }

    #[test]
    fn test_root_invariants() {
        let id = AgentId::new();
        let lineage = AgentLineage::root(id);
        assert_eq!(lineage.root_id, id);
        assert_eq!(lineage.depth, 0);
        assert!(lineage.parent_id.is_none());
    }
}
