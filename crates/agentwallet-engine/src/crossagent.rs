//! Cross-agent governor
//!
//! Resolves the most specific enabled policy between a source and target
//! agent (exact match, then group, then wildcard) and applies the policy's
//! checks. Transfers above the human-approval threshold are escalated and
//! held; transfers with no policy at all are held for a human as well.

use agentwallet_store::Store;
use agentwallet_types::{
    actions, AgentId, AuditDecision, AuditDraft, AuthorizationMethod, CrossAgentPolicy,
    CrossAgentTransaction, CrossTransactionId, Money, PolicyTarget, Result, SettlementMode,
    SettlementStatus, WalletError,
};
use chrono::{Duration, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::notify::{notify_best_effort, Notification, Notifier};

#[derive(Clone)]
pub struct CrossAgentGovernor {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
}

impl CrossAgentGovernor {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Authorize (or hold, or reject) a source→target payment
    pub async fn authorize(
        &self,
        source: AgentId,
        target: AgentId,
        amount: Money,
        payment_type: &str,
    ) -> Result<CrossAgentTransaction> {
        if !amount.is_positive() {
            return Err(WalletError::invalid_input("amount", "must be > 0"));
        }

        let Some(policy) = self.resolve_policy(source, target).await? else {
            let tx = self
                .persist(
                    source,
                    target,
                    amount,
                    payment_type,
                    false,
                    AuthorizationMethod::Escalated,
                    SettlementStatus::Pending,
                    true,
                    Some("no policy configured; human approval required".to_string()),
                )
                .await?;
            self.audit(&tx, actions::CROSS_ESCALATED, AuditDecision::Escalated)
                .await?;
            notify_best_effort(
                &self.notifier,
                Notification::new(
                    Some(source),
                    "crossagent.no_policy",
                    format!("transfer of {amount} to {target} held for approval"),
                ),
            )
            .await;
            return Ok(tx);
        };

        // Mutual-policy requirement resolves the reverse direction
        if policy.require_mutual_policy
            && self.resolve_policy(target, source).await?.is_none()
        {
            let tx = self
                .persist(
                    source,
                    target,
                    amount,
                    payment_type,
                    false,
                    AuthorizationMethod::Auto,
                    SettlementStatus::Failed,
                    false,
                    Some("target has no reciprocal policy for source".to_string()),
                )
                .await?;
            self.audit(&tx, actions::CROSS_REJECTED, AuditDecision::Blocked)
                .await?;
            return Ok(tx);
        }

        if let Some(reason) = self.failed_check(&policy, source, target, amount, payment_type).await? {
            let tx = self
                .persist(
                    source,
                    target,
                    amount,
                    payment_type,
                    false,
                    AuthorizationMethod::Auto,
                    SettlementStatus::Failed,
                    false,
                    Some(reason),
                )
                .await?;
            self.audit(&tx, actions::CROSS_REJECTED, AuditDecision::Blocked)
                .await?;
            return Ok(tx);
        }

        // All checks passed; escalate above the human-approval bar
        if let Some(bar) = policy.limits.require_human_approval_above {
            if amount > bar {
                let tx = self
                    .persist(
                        source,
                        target,
                        amount,
                        payment_type,
                        false,
                        AuthorizationMethod::Escalated,
                        SettlementStatus::Pending,
                        true,
                        Some(format!("amount {amount} above approval bar {bar}")),
                    )
                    .await?;
                self.audit(&tx, actions::CROSS_ESCALATED, AuditDecision::Escalated)
                    .await?;
                notify_best_effort(
                    &self.notifier,
                    Notification::new(
                        Some(source),
                        "crossagent.escalated",
                        format!("transfer of {amount} to {target} awaits approval"),
                    ),
                )
                .await;
                return Ok(tx);
            }
        }

        let settlement = match policy.settlement_mode {
            SettlementMode::Immediate => SettlementStatus::Settled,
            SettlementMode::Batched | SettlementMode::Escrow => SettlementStatus::Pending,
        };
        let tx = self
            .persist(
                source,
                target,
                amount,
                payment_type,
                true,
                AuthorizationMethod::Auto,
                settlement,
                false,
                None,
            )
            .await?;
        info!(source = %source, target = %target, amount = %amount, "cross-agent transfer authorized");
        self.audit(&tx, actions::CROSS_AUTHORIZED, AuditDecision::Allowed)
            .await?;
        Ok(tx)
    }

    /// Pick the most specific enabled policy for (source, target)
    pub async fn resolve_policy(
        &self,
        source: AgentId,
        target: AgentId,
    ) -> Result<Option<CrossAgentPolicy>> {
        let policies: Vec<CrossAgentPolicy> = self
            .store
            .policies_for_source(source)
            .await?
            .into_iter()
            .filter(|p| p.enabled)
            .collect();

        let mut best: Option<CrossAgentPolicy> = None;
        for policy in policies {
            let matches = match &policy.target {
                PolicyTarget::Agent { agent_id } => *agent_id == target,
                PolicyTarget::Group { group_id } => self
                    .store
                    .group(*group_id)
                    .await?
                    .map(|g| g.agent_ids.contains(&target))
                    .unwrap_or(false),
                PolicyTarget::Any => true,
            };
            if !matches {
                continue;
            }
            let better = best
                .as_ref()
                .map(|b| policy.target.specificity() < b.target.specificity())
                .unwrap_or(true);
            if better {
                best = Some(policy);
            }
        }
        Ok(best)
    }

    /// Returns the first failed check's reason, None when all pass
    async fn failed_check(
        &self,
        policy: &CrossAgentPolicy,
        source: AgentId,
        target: AgentId,
        amount: Money,
        payment_type: &str,
    ) -> Result<Option<String>> {
        let limits = &policy.limits;

        if !limits.allowed_payment_types.is_empty()
            && !limits
                .allowed_payment_types
                .iter()
                .any(|t| t == payment_type)
        {
            return Ok(Some(format!("payment type '{payment_type}' not allowed")));
        }

        if amount > limits.max_per_transaction {
            return Ok(Some(format!(
                "amount {amount} exceeds per-transaction limit {}",
                limits.max_per_transaction
            )));
        }

        let day_ago = Utc::now() - Duration::hours(24);
        let to_target = self
            .store
            .cross_authorized_to_target_since(source, target, day_ago)
            .await?
            .checked_add(amount)?;
        if to_target > limits.max_daily_to_target {
            return Ok(Some(format!(
                "daily total {to_target} to target exceeds limit {}",
                limits.max_daily_to_target
            )));
        }

        let all_agents = self
            .store
            .cross_authorized_total_since(source, day_ago)
            .await?
            .checked_add(amount)?;
        if all_agents > limits.max_daily_all_agents {
            return Ok(Some(format!(
                "daily total {all_agents} across agents exceeds limit {}",
                limits.max_daily_all_agents
            )));
        }

        if policy.min_counterparty_trust_score > Decimal::ZERO {
            let (settled, total) = self.store.cross_counterparty_stats(target).await?;
            // No history: nothing to distrust yet
            if total > 0 {
                let score = Decimal::from_u64(settled).unwrap_or_default()
                    / Decimal::from_u64(total).unwrap_or(Decimal::ONE);
                if score < policy.min_counterparty_trust_score {
                    return Ok(Some(format!(
                        "counterparty trust score {score:.2} below minimum {}",
                        policy.min_counterparty_trust_score
                    )));
                }
            }
        }

        Ok(None)
    }

    /// Operator approval of an escalated transfer
    pub async fn approve(&self, id: CrossTransactionId) -> Result<CrossAgentTransaction> {
        let mut tx = self
            .store
            .cross_transaction(id)
            .await?
            .ok_or(WalletError::CrossTransactionNotFound {
                transaction_id: id.to_string(),
            })?;
        if tx.authorized || !tx.requires_human {
            return Err(WalletError::state_conflict(
                "cross_transaction",
                "transfer is not awaiting human approval",
            ));
        }

        tx.authorized = true;
        tx.authorization_method = AuthorizationMethod::HumanApproved;
        tx.settlement_status = match self
            .resolve_policy(tx.source_agent_id, tx.target_agent_id)
            .await?
            .map(|p| p.settlement_mode)
        {
            Some(SettlementMode::Immediate) => SettlementStatus::Settled,
            _ => SettlementStatus::Pending,
        };
        self.store.update_cross_transaction(&tx).await?;
        self.audit(&tx, actions::CROSS_APPROVED, AuditDecision::Allowed)
            .await?;
        Ok(tx)
    }

    /// Operator rejection of an escalated transfer
    pub async fn reject(
        &self,
        id: CrossTransactionId,
        reason: &str,
    ) -> Result<CrossAgentTransaction> {
        let mut tx = self
            .store
            .cross_transaction(id)
            .await?
            .ok_or(WalletError::CrossTransactionNotFound {
                transaction_id: id.to_string(),
            })?;
        if tx.authorized || !tx.requires_human {
            return Err(WalletError::state_conflict(
                "cross_transaction",
                "transfer is not awaiting human approval",
            ));
        }

        tx.requires_human = false;
        tx.settlement_status = SettlementStatus::Failed;
        tx.reason = Some(reason.to_string());
        self.store.update_cross_transaction(&tx).await?;
        self.audit(&tx, actions::CROSS_REJECTED, AuditDecision::Blocked)
            .await?;
        Ok(tx)
    }

    #[allow(clippy::too_many_arguments)]
    async fn persist(
        &self,
        source: AgentId,
        target: AgentId,
        amount: Money,
        payment_type: &str,
        authorized: bool,
        method: AuthorizationMethod,
        settlement: SettlementStatus,
        requires_human: bool,
        reason: Option<String>,
    ) -> Result<CrossAgentTransaction> {
        let tx = CrossAgentTransaction {
            id: CrossTransactionId::new(),
            source_agent_id: source,
            target_agent_id: target,
            amount,
            payment_type: payment_type.to_string(),
            authorized,
            authorization_method: method,
            settlement_status: settlement,
            requires_human,
            reason,
            created_at: Utc::now(),
        };
        self.store.insert_cross_transaction(&tx).await?;
        Ok(tx)
    }

    async fn audit(
        &self,
        tx: &CrossAgentTransaction,
        action: &str,
        decision: AuditDecision,
    ) -> Result<()> {
        self.store
            .append_audit(AuditDraft::new(
                Some(tx.source_agent_id),
                action,
                "cross_transaction",
                tx.id.to_string(),
                decision,
                json!({
                    "target": tx.target_agent_id.to_string(),
                    "amount": tx.amount,
                    "payment_type": tx.payment_type,
                    "reason": tx.reason,
                }),
            ))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::TracingNotifier;
    use agentwallet_store::MemStore;
    use agentwallet_types::{AgentGroup, CrossAgentLimits, GroupId, OwnerId, PolicyId};
    use rust_decimal_macros::dec;

    fn limits() -> CrossAgentLimits {
        CrossAgentLimits {
            max_per_transaction: Money::from_major(100),
            max_daily_to_target: Money::from_major(300),
            max_daily_all_agents: Money::from_major(1000),
            allowed_payment_types: vec!["service".to_string()],
            require_human_approval_above: None,
        }
    }

    fn policy(source: AgentId, target: PolicyTarget) -> CrossAgentPolicy {
        CrossAgentPolicy {
            id: PolicyId::new(),
            owner_id: OwnerId::new(),
            source_agent_id: source,
            target,
            limits: limits(),
            require_mutual_policy: false,
            settlement_mode: SettlementMode::Immediate,
            min_counterparty_trust_score: Decimal::ZERO,
            enabled: true,
            created_at: Utc::now(),
        }
    }

    fn governor(store: Arc<MemStore>) -> CrossAgentGovernor {
        CrossAgentGovernor::new(store, Arc::new(TracingNotifier))
    }

    #[tokio::test]
    async fn test_no_policy_requires_human() {
        let store = Arc::new(MemStore::new());
        let gov = governor(store.clone());

        let tx = gov
            .authorize(AgentId::new(), AgentId::new(), Money::from_major(10), "service")
            .await
            .unwrap();
        assert!(!tx.authorized);
        assert!(tx.requires_human);
        assert_eq!(tx.authorization_method, AuthorizationMethod::Escalated);
    }

    #[tokio::test]
    async fn test_exact_beats_group_beats_wildcard() {
        let store = Arc::new(MemStore::new());
        let gov = governor(store.clone());
        let source = AgentId::new();
        let target = AgentId::new();

        let group = AgentGroup {
            id: GroupId::new(),
            owner_id: OwnerId::new(),
            name: "peers".to_string(),
            agent_ids: vec![target],
        };
        store.create_group(&group).await.unwrap();

        let wildcard = policy(source, PolicyTarget::Any);
        let grouped = policy(source, PolicyTarget::Group { group_id: group.id });
        let mut exact = policy(source, PolicyTarget::Agent { agent_id: target });
        exact.limits.max_per_transaction = Money::from_major(7);
        store.create_policy(&wildcard).await.unwrap();
        store.create_policy(&grouped).await.unwrap();
        store.create_policy(&exact).await.unwrap();

        let resolved = gov.resolve_policy(source, target).await.unwrap().unwrap();
        assert_eq!(resolved.id, exact.id);

        // The exact policy's tighter limit applies
        let tx = gov
            .authorize(source, target, Money::from_major(8), "service")
            .await
            .unwrap();
        assert!(!tx.authorized);
    }

    #[tokio::test]
    async fn test_mutual_policy_requirement() {
        let store = Arc::new(MemStore::new());
        let gov = governor(store.clone());
        let source = AgentId::new();
        let target = AgentId::new();

        let mut forward = policy(source, PolicyTarget::Agent { agent_id: target });
        forward.require_mutual_policy = true;
        store.create_policy(&forward).await.unwrap();

        let tx = gov
            .authorize(source, target, Money::from_major(10), "service")
            .await
            .unwrap();
        assert!(!tx.authorized);
        assert_eq!(tx.settlement_status, SettlementStatus::Failed);

        // Add the reverse policy and retry
        let reverse = policy(target, PolicyTarget::Agent { agent_id: source });
        store.create_policy(&reverse).await.unwrap();
        let tx = gov
            .authorize(source, target, Money::from_major(10), "service")
            .await
            .unwrap();
        assert!(tx.authorized);
    }

    #[tokio::test]
    async fn test_daily_caps() {
        let store = Arc::new(MemStore::new());
        let gov = governor(store.clone());
        let source = AgentId::new();
        let target = AgentId::new();
        store
            .create_policy(&policy(source, PolicyTarget::Agent { agent_id: target }))
            .await
            .unwrap();

        // Three authorized transfers of 100 hit the 300 daily-to-target cap
        for _ in 0..3 {
            let tx = gov
                .authorize(source, target, Money::from_major(100), "service")
                .await
                .unwrap();
            assert!(tx.authorized);
        }
        let tx = gov
            .authorize(source, target, Money::from_major(50), "service")
            .await
            .unwrap();
        assert!(!tx.authorized);
        assert!(tx.reason.unwrap().contains("daily total"));
    }

    #[tokio::test]
    async fn test_escalation_and_approval() {
        let store = Arc::new(MemStore::new());
        let gov = governor(store.clone());
        let source = AgentId::new();
        let target = AgentId::new();

        let mut p = policy(source, PolicyTarget::Agent { agent_id: target });
        p.limits.require_human_approval_above = Some(Money::from_major(50));
        store.create_policy(&p).await.unwrap();

        let tx = gov
            .authorize(source, target, Money::from_major(75), "service")
            .await
            .unwrap();
        assert!(!tx.authorized);
        assert!(tx.requires_human);

        let approved = gov.approve(tx.id).await.unwrap();
        assert!(approved.authorized);
        assert_eq!(
            approved.authorization_method,
            AuthorizationMethod::HumanApproved
        );
        assert_eq!(approved.settlement_status, SettlementStatus::Settled);

        // Second approval is a state conflict
        assert!(matches!(
            gov.approve(tx.id).await,
            Err(WalletError::StateConflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_trust_score_gate() {
        let store = Arc::new(MemStore::new());
        let gov = governor(store.clone());
        let source = AgentId::new();
        let target = AgentId::new();

        let mut p = policy(source, PolicyTarget::Agent { agent_id: target });
        p.min_counterparty_trust_score = dec!(0.9);
        store.create_policy(&p).await.unwrap();

        // Seed history: 1 settled of 2 => score 0.5 < 0.9
        for settled in [true, false] {
            let tx = CrossAgentTransaction {
                id: CrossTransactionId::new(),
                source_agent_id: AgentId::new(),
                target_agent_id: target,
                amount: Money::from_major(10),
                payment_type: "service".to_string(),
                authorized: true,
                authorization_method: AuthorizationMethod::Auto,
                settlement_status: if settled {
                    SettlementStatus::Settled
                } else {
                    SettlementStatus::Pending
                },
                requires_human: false,
                reason: None,
                created_at: Utc::now(),
            };
            store.insert_cross_transaction(&tx).await.unwrap();
        }

        let tx = gov
            .authorize(source, target, Money::from_major(10), "service")
            .await
            .unwrap();
        assert!(!tx.authorized);
        assert!(tx.reason.unwrap().contains("trust score"));
    }
}
