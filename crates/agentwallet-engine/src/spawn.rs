//! Spawn governor
//!
//! Admits child-agent creation and derives the child's policy as a strict
//! tightening of the parent's: ratios scale limits down, overrides can only
//! reduce further, vendor allowlists intersect, and the spawn depth budget
//! decrements. The derived ceilings ride along on the child's lineage so a
//! grandchild inherits from the effective value even when no wallet rule
//! exists yet.

use agentwallet_store::Store;
use agentwallet_types::{
    actions, AgentId, AgentLineage, AgentStatus, AuditDecision, AuditDraft, InheritedPolicy,
    LineageStatus, Money, Result, RuleKind, SpawnEvent, SpawnEventId, SpawnOverrides, SpawnPolicy,
    WalletError,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct SpawnGovernor {
    store: Arc<dyn Store>,
}

impl SpawnGovernor {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Admit a spawn request and record the lineage
    pub async fn spawn(
        &self,
        parent_id: AgentId,
        child_id: AgentId,
        overrides: SpawnOverrides,
    ) -> Result<SpawnEvent> {
        let parent_agent =
            self.store
                .agent(parent_id)
                .await?
                .ok_or(WalletError::AgentNotFound {
                    agent_id: parent_id.to_string(),
                })?;
        if parent_agent.status != AgentStatus::Active {
            return Err(WalletError::PolicyBlock {
                reason: format!("parent agent is {:?}, not active", parent_agent.status),
            });
        }

        let mut parent = match self.store.lineage(parent_id).await? {
            Some(lineage) => lineage,
            None => {
                let root = AgentLineage::root(parent_id);
                self.store.upsert_lineage(&root).await?;
                root
            }
        };
        let policy = parent.spawn_policy.clone();

        if parent.depth >= policy.max_spawn_depth {
            return Err(WalletError::PolicyBlock {
                reason: format!(
                    "spawn depth {} has reached the maximum {}",
                    parent.depth, policy.max_spawn_depth
                ),
            });
        }
        if parent.children_ids.len() as u32 >= policy.max_children {
            return Err(WalletError::PolicyBlock {
                reason: format!("parent already has {} children", parent.children_ids.len()),
            });
        }
        if parent.depth > 0 && !policy.children_can_spawn {
            return Err(WalletError::PolicyBlock {
                reason: "spawned agents of this lineage may not spawn".to_string(),
            });
        }
        if self.store.lineage(child_id).await?.is_some() {
            return Err(WalletError::LineageExists {
                agent_id: child_id.to_string(),
            });
        }

        let inherited = self.derive_policy(&parent, &policy, &overrides).await?;

        let mut child_policy = policy.restricted_for_child();
        child_policy.allowed_vendors = inherited.allowed_vendors.clone();
        child_policy.daily_limit_cap = inherited.daily_limit;
        child_policy.per_transaction_limit_cap = inherited.per_transaction_limit;

        let child = AgentLineage {
            agent_id: child_id,
            parent_id: Some(parent_id),
            root_id: parent.root_id,
            depth: parent.depth + 1,
            children_ids: Vec::new(),
            status: LineageStatus::Active,
            spawn_policy: child_policy,
            created_at: Utc::now(),
        };
        parent.children_ids.push(child_id);

        let event = SpawnEvent {
            id: SpawnEventId::new(),
            parent_id,
            child_id,
            depth: child.depth,
            inherited_policy: inherited,
            authorized: true,
            created_at: Utc::now(),
        };
        self.store.record_spawn(&child, &parent, &event).await?;

        info!(parent = %parent_id, child = %child_id, depth = child.depth, "agent spawned");
        self.store
            .append_audit(AuditDraft::new(
                Some(parent_id),
                actions::AGENT_SPAWNED,
                "agent",
                child_id.to_string(),
                AuditDecision::Allowed,
                json!({
                    "depth": child.depth,
                    "inherited_policy": event.inherited_policy,
                }),
            ))
            .await?;
        Ok(event)
    }

    /// Scale the parent's effective limits by the policy ratios, then clamp
    /// with overrides; overrides can never loosen.
    async fn derive_policy(
        &self,
        parent: &AgentLineage,
        policy: &SpawnPolicy,
        overrides: &SpawnOverrides,
    ) -> Result<InheritedPolicy> {
        let rules = self.store.rules_for_agent(parent.agent_id).await?;

        let rule_daily = rules
            .iter()
            .filter(|r| r.active)
            .filter_map(|r| match &r.kind {
                RuleKind::DailyLimit { limit } => Some(*limit),
                _ => None,
            })
            .min();
        let rule_per_tx = rules
            .iter()
            .filter(|r| r.active)
            .filter_map(|r| match &r.kind {
                RuleKind::PerTransactionLimit { limit } => Some(*limit),
                _ => None,
            })
            .min();

        let parent_daily = tighter(rule_daily, policy.daily_limit_cap);
        let parent_per_tx = tighter(rule_per_tx, policy.per_transaction_limit_cap);

        let scaled_daily = parent_daily
            .map(|limit| limit.scaled(policy.max_spend_ratio))
            .transpose()?;
        let scaled_per_tx = parent_per_tx
            .map(|limit| limit.scaled(policy.max_transaction_ratio))
            .transpose()?;

        Ok(InheritedPolicy {
            daily_limit: tighter(scaled_daily, overrides.daily_limit),
            per_transaction_limit: tighter(scaled_per_tx, overrides.per_transaction_limit),
            allowed_vendors: intersect_vendors(
                policy.allowed_vendors.as_deref(),
                overrides.allowed_vendors.as_deref(),
            ),
        })
    }

    /// Mark a lineage subtree (and its agents) terminated
    pub async fn terminate_lineage(&self, agent: AgentId, cascade: bool) -> Result<Vec<AgentId>> {
        let mut terminated = Vec::new();
        let mut stack = vec![agent];
        while let Some(id) = stack.pop() {
            if let Some(mut lineage) = self.store.lineage(id).await? {
                if cascade {
                    stack.extend(lineage.children_ids.iter().copied());
                }
                lineage.status = LineageStatus::Terminated;
                self.store.upsert_lineage(&lineage).await?;
            }
            if let Some(existing) = self.store.agent(id).await? {
                if !existing.status.is_terminal() {
                    self.store
                        .set_agent_status(id, AgentStatus::Terminated)
                        .await?;
                }
            }
            self.store
                .append_audit(AuditDraft::new(
                    Some(id),
                    actions::AGENT_TERMINATED,
                    "agent",
                    id.to_string(),
                    AuditDecision::System,
                    json!({ "cascade": cascade }),
                ))
                .await?;
            terminated.push(id);
        }
        Ok(terminated)
    }
}

/// The tighter of two optional limits
fn tighter(a: Option<Money>, b: Option<Money>) -> Option<Money> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

/// Intersection of vendor allowlists; None means unrestricted
fn intersect_vendors(a: Option<&[String]>, b: Option<&[String]>) -> Option<Vec<String>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.iter().filter(|v| b.contains(v)).cloned().collect()),
        (Some(a), None) => Some(a.to_vec()),
        (None, Some(b)) => Some(b.to_vec()),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentwallet_store::MemStore;
    use agentwallet_types::{Agent, OwnerId, SpendRule, Wallet};
    use rust_decimal_macros::dec;

    struct Fixture {
        store: Arc<MemStore>,
        governor: SpawnGovernor,
        parent: Agent,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemStore::new());
        let parent = Agent::new(OwnerId::new(), "parent", "pk".to_string());
        store.create_agent(&parent).await.unwrap();
        Fixture {
            store: store.clone(),
            governor: SpawnGovernor::new(store),
            parent,
        }
    }

    async fn new_agent(store: &MemStore, owner: OwnerId, name: &str) -> Agent {
        let agent = Agent::new(owner, name, format!("{name}-key"));
        store.create_agent(&agent).await.unwrap();
        agent
    }

    #[tokio::test]
    async fn test_spawn_monotonicity_with_override() {
        let f = fixture().await;
        let wallet = Wallet::new(f.parent.id, "USD");
        f.store.create_wallet(&wallet).await.unwrap();
        let rule = SpendRule::new(
            wallet.id,
            RuleKind::DailyLimit {
                limit: Money::from_major(1000),
            },
            0,
        )
        .unwrap();
        f.store.create_rule(&rule).await.unwrap();

        let mut lineage = AgentLineage::root(f.parent.id);
        lineage.spawn_policy.max_spend_ratio = dec!(0.5);
        f.store.upsert_lineage(&lineage).await.unwrap();

        let child = new_agent(&f.store, f.parent.owner_id, "child").await;
        let event = f
            .governor
            .spawn(
                f.parent.id,
                child.id,
                SpawnOverrides {
                    daily_limit: Some(Money::from_major(800)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // min(800, 1000 * 0.5) = 500
        assert_eq!(event.inherited_policy.daily_limit, Some(Money::from_major(500)));

        // Grandchild with no overrides inherits at most 500
        let grandchild = new_agent(&f.store, f.parent.owner_id, "grandchild").await;
        let event = f
            .governor
            .spawn(child.id, grandchild.id, SpawnOverrides::default())
            .await
            .unwrap();
        assert!(event.inherited_policy.daily_limit.unwrap() <= Money::from_major(500));
    }

    #[tokio::test]
    async fn test_override_cannot_loosen() {
        let f = fixture().await;
        let wallet = Wallet::new(f.parent.id, "USD");
        f.store.create_wallet(&wallet).await.unwrap();
        let rule = SpendRule::new(
            wallet.id,
            RuleKind::DailyLimit {
                limit: Money::from_major(100),
            },
            0,
        )
        .unwrap();
        f.store.create_rule(&rule).await.unwrap();

        let child = new_agent(&f.store, f.parent.owner_id, "child").await;
        let event = f
            .governor
            .spawn(
                f.parent.id,
                child.id,
                SpawnOverrides {
                    daily_limit: Some(Money::from_major(5000)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(event.inherited_policy.daily_limit, Some(Money::from_major(100)));
    }

    #[tokio::test]
    async fn test_duplicate_spawn_rejected() {
        let f = fixture().await;
        let child = new_agent(&f.store, f.parent.owner_id, "child").await;

        f.governor
            .spawn(f.parent.id, child.id, SpawnOverrides::default())
            .await
            .unwrap();
        let second = f
            .governor
            .spawn(f.parent.id, child.id, SpawnOverrides::default())
            .await;
        assert!(matches!(second, Err(WalletError::LineageExists { .. })));

        // Parent lineage unchanged by the rejected attempt
        let parent = f.store.lineage(f.parent.id).await.unwrap().unwrap();
        assert_eq!(parent.children_ids.len(), 1);
    }

    #[tokio::test]
    async fn test_depth_and_children_caps() {
        let f = fixture().await;
        let mut lineage = AgentLineage::root(f.parent.id);
        lineage.spawn_policy.max_children = 1;
        f.store.upsert_lineage(&lineage).await.unwrap();

        let first = new_agent(&f.store, f.parent.owner_id, "first").await;
        f.governor
            .spawn(f.parent.id, first.id, SpawnOverrides::default())
            .await
            .unwrap();

        let second = new_agent(&f.store, f.parent.owner_id, "second").await;
        let result = f
            .governor
            .spawn(f.parent.id, second.id, SpawnOverrides::default())
            .await;
        assert!(matches!(result, Err(WalletError::PolicyBlock { .. })));
    }

    #[tokio::test]
    async fn test_spawn_depth_budget_decrements() {
        let f = fixture().await;
        let mut lineage = AgentLineage::root(f.parent.id);
        lineage.spawn_policy.max_spawn_depth = 1;
        f.store.upsert_lineage(&lineage).await.unwrap();

        let child = new_agent(&f.store, f.parent.owner_id, "child").await;
        f.governor
            .spawn(f.parent.id, child.id, SpawnOverrides::default())
            .await
            .unwrap();

        // Child sits at depth 1 with an exhausted budget
        let grandchild = new_agent(&f.store, f.parent.owner_id, "gc").await;
        let result = f
            .governor
            .spawn(child.id, grandchild.id, SpawnOverrides::default())
            .await;
        assert!(matches!(result, Err(WalletError::PolicyBlock { .. })));
    }

    #[tokio::test]
    async fn test_vendor_allowlists_intersect() {
        let f = fixture().await;
        let mut lineage = AgentLineage::root(f.parent.id);
        lineage.spawn_policy.allowed_vendors =
            Some(vec!["alpha".to_string(), "beta".to_string()]);
        f.store.upsert_lineage(&lineage).await.unwrap();

        let child = new_agent(&f.store, f.parent.owner_id, "child").await;
        let event = f
            .governor
            .spawn(
                f.parent.id,
                child.id,
                SpawnOverrides {
                    allowed_vendors: Some(vec!["beta".to_string(), "gamma".to_string()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(
            event.inherited_policy.allowed_vendors,
            Some(vec!["beta".to_string()])
        );
    }

    #[tokio::test]
    async fn test_terminate_lineage_dfs() {
        let f = fixture().await;
        let child = new_agent(&f.store, f.parent.owner_id, "child").await;
        let grandchild = new_agent(&f.store, f.parent.owner_id, "gc").await;
        f.governor
            .spawn(f.parent.id, child.id, SpawnOverrides::default())
            .await
            .unwrap();
        f.governor
            .spawn(child.id, grandchild.id, SpawnOverrides::default())
            .await
            .unwrap();

        let terminated = f.governor.terminate_lineage(f.parent.id, true).await.unwrap();
        assert_eq!(terminated.len(), 3);
        for id in [f.parent.id, child.id, grandchild.id] {
            assert_eq!(
                f.store.agent(id).await.unwrap().unwrap().status,
                AgentStatus::Terminated
            );
            assert_eq!(
                f.store.lineage(id).await.unwrap().unwrap().status,
                LineageStatus::Terminated
            );
        }
    }
}
