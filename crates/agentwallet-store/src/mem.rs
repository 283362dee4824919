//! In-memory store backend
//!
//! A single-lock map store. Composite writes hold the lock for their whole
//! unit of work, which gives the same atomicity the Postgres backend gets
//! from transactions. Used by the test suites and the playground server
//! mode; state does not survive a restart.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use agentwallet_types::{
    Agent, AgentGroup, AgentId, AgentLineage, AgentStatus, AuditDraft, AuditEntry,
    CrossAgentPolicy, CrossAgentTransaction, CrossTransactionId, DeadManConfig, DeadManEvent,
    GroupId, KillSwitch, KillSwitchId, Money, Owner, OwnerId, PolicyId, Result, RuleId, SpawnEvent,
    SpendRule, Transaction, TransactionId, TransactionStatus, Wallet, WalletError, WalletId,
    WalletStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::Store;

#[derive(Default)]
struct Inner {
    owners: HashMap<OwnerId, Owner>,
    agents: HashMap<AgentId, Agent>,
    wallets: HashMap<WalletId, Wallet>,
    transactions: HashMap<TransactionId, Transaction>,
    tx_order: Vec<TransactionId>,
    rules: HashMap<RuleId, SpendRule>,
    switches: HashMap<KillSwitchId, KillSwitch>,
    lineages: HashMap<AgentId, AgentLineage>,
    spawn_events: Vec<SpawnEvent>,
    policies: HashMap<PolicyId, CrossAgentPolicy>,
    groups: HashMap<GroupId, AgentGroup>,
    cross_txs: HashMap<CrossTransactionId, CrossAgentTransaction>,
    cross_order: Vec<CrossTransactionId>,
    deadman_configs: HashMap<AgentId, DeadManConfig>,
    deadman_events: Vec<DeadManEvent>,
    audit: Vec<AuditEntry>,
}

impl Inner {
    fn wallet_mut(&mut self, id: WalletId) -> Result<&mut Wallet> {
        self.wallets
            .get_mut(&id)
            .ok_or(WalletError::WalletNotFound {
                wallet_id: id.to_string(),
            })
    }

    fn upsert_tx(&mut self, tx: &Transaction) {
        if !self.transactions.contains_key(&tx.id) {
            self.tx_order.push(tx.id);
        }
        self.transactions.insert(tx.id, tx.clone());
    }

    fn seal_audit(&mut self, draft: AuditDraft) -> AuditEntry {
        let head = self
            .audit
            .last()
            .map(|e| e.hash.clone())
            .unwrap_or_default();
        let entry = AuditEntry::seal(draft, head);
        self.audit.push(entry.clone());
        entry
    }

    fn completed_for_wallet(&self, wallet: WalletId) -> Vec<&Transaction> {
        self.tx_order
            .iter()
            .filter_map(|id| self.transactions.get(id))
            .filter(|t| t.wallet_id == wallet && t.status == TransactionStatus::Completed)
            .collect()
    }
}

/// Map-backed [`Store`]
#[derive(Clone, Default)]
pub struct MemStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemStore {
    // ------------------------------------------------------------------ owners

    async fn create_owner(&self, owner: &Owner) -> Result<()> {
        self.inner.write().owners.insert(owner.id, owner.clone());
        Ok(())
    }

    async fn owner(&self, id: OwnerId) -> Result<Option<Owner>> {
        Ok(self.inner.read().owners.get(&id).cloned())
    }

    async fn owner_by_api_key(&self, api_key: &str) -> Result<Option<Owner>> {
        Ok(self
            .inner
            .read()
            .owners
            .values()
            .find(|o| o.api_key == api_key)
            .cloned())
    }

    async fn rotate_owner_key(&self, id: OwnerId, api_key: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let owner = inner.owners.get_mut(&id).ok_or(WalletError::OwnerNotFound {
            owner_id: id.to_string(),
        })?;
        owner.api_key = api_key.to_string();
        Ok(())
    }

    // ------------------------------------------------------------------ agents

    async fn create_agent(&self, agent: &Agent) -> Result<()> {
        self.inner.write().agents.insert(agent.id, agent.clone());
        Ok(())
    }

    async fn agent(&self, id: AgentId) -> Result<Option<Agent>> {
        Ok(self.inner.read().agents.get(&id).cloned())
    }

    async fn agent_by_api_key(&self, api_key: &str) -> Result<Option<Agent>> {
        Ok(self
            .inner
            .read()
            .agents
            .values()
            .find(|a| a.api_key == api_key)
            .cloned())
    }

    async fn agents_for_owner(&self, owner: OwnerId) -> Result<Vec<Agent>> {
        Ok(self
            .inner
            .read()
            .agents
            .values()
            .filter(|a| a.owner_id == owner)
            .cloned()
            .collect())
    }

    async fn set_agent_status(&self, id: AgentId, status: AgentStatus) -> Result<()> {
        let mut inner = self.inner.write();
        let agent = inner.agents.get_mut(&id).ok_or(WalletError::AgentNotFound {
            agent_id: id.to_string(),
        })?;
        agent.status = status;
        Ok(())
    }

    // ----------------------------------------------------------------- wallets

    async fn create_wallet(&self, wallet: &Wallet) -> Result<()> {
        self.inner.write().wallets.insert(wallet.id, wallet.clone());
        Ok(())
    }

    async fn wallet(&self, id: WalletId) -> Result<Option<Wallet>> {
        Ok(self.inner.read().wallets.get(&id).cloned())
    }

    async fn wallets_for_agent(&self, agent: AgentId) -> Result<Vec<Wallet>> {
        Ok(self
            .inner
            .read()
            .wallets
            .values()
            .filter(|w| w.agent_id == agent)
            .cloned()
            .collect())
    }

    async fn set_wallet_status(&self, id: WalletId, status: WalletStatus) -> Result<()> {
        let mut inner = self.inner.write();
        inner.wallet_mut(id)?.status = status;
        Ok(())
    }

    // ------------------------------------------------------------ transactions

    async fn insert_transaction(&self, tx: &Transaction) -> Result<()> {
        self.inner.write().upsert_tx(tx);
        Ok(())
    }

    async fn update_transaction(&self, tx: &Transaction) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.transactions.contains_key(&tx.id) {
            return Err(WalletError::TransactionNotFound {
                transaction_id: tx.id.to_string(),
            });
        }
        inner.transactions.insert(tx.id, tx.clone());
        Ok(())
    }

    async fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        Ok(self.inner.read().transactions.get(&id).cloned())
    }

    async fn transactions_for_wallet(
        &self,
        wallet: WalletId,
        limit: i64,
    ) -> Result<Vec<Transaction>> {
        let inner = self.inner.read();
        Ok(inner
            .tx_order
            .iter()
            .rev()
            .filter_map(|id| inner.transactions.get(id))
            .filter(|t| t.wallet_id == wallet)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn awaiting_approval_for_owner(&self, owner: OwnerId) -> Result<Vec<Transaction>> {
        let inner = self.inner.read();
        Ok(inner
            .tx_order
            .iter()
            .filter_map(|id| inner.transactions.get(id))
            .filter(|t| t.status == TransactionStatus::AwaitingApproval)
            .filter(|t| {
                inner
                    .wallets
                    .get(&t.wallet_id)
                    .and_then(|w| inner.agents.get(&w.agent_id))
                    .map(|a| a.owner_id == owner)
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn debit_and_complete(&self, tx: &Transaction) -> Result<Wallet> {
        if tx.status != TransactionStatus::Completed || tx.completed_at.is_none() {
            return Err(WalletError::state_conflict(
                "transaction",
                "debit_and_complete requires a completed transaction",
            ));
        }
        let mut inner = self.inner.write();
        let wallet = inner.wallet_mut(tx.wallet_id)?;
        if !wallet.status.can_debit() {
            return Err(WalletError::state_conflict(
                "wallet",
                format!("wallet is {:?}, not active", wallet.status),
            ));
        }
        if wallet.balance < tx.amount {
            return Err(WalletError::InsufficientFunds {
                wallet_id: wallet.id.to_string(),
                requested: tx.amount.to_string(),
                available: wallet.balance.to_string(),
            });
        }
        wallet.balance = wallet.balance.checked_sub(tx.amount)?;
        let updated = wallet.clone();
        inner.upsert_tx(tx);
        Ok(updated)
    }

    async fn credit_and_complete(&self, tx: &Transaction) -> Result<Wallet> {
        let mut inner = self.inner.write();
        let wallet = inner.wallet_mut(tx.wallet_id)?;
        wallet.balance = wallet.balance.checked_add(tx.amount)?;
        let updated = wallet.clone();
        inner.upsert_tx(tx);
        Ok(updated)
    }

    // -------------------------------------------------------------- aggregates

    async fn spend_since(&self, wallet: WalletId, since: DateTime<Utc>) -> Result<Money> {
        let inner = self.inner.read();
        let mut total = Money::zero();
        for tx in inner.completed_for_wallet(wallet) {
            if !tx.is_deposit() && tx.created_at >= since {
                total = total.checked_add(tx.amount)?;
            }
        }
        Ok(total)
    }

    async fn completed_since(
        &self,
        wallet: WalletId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        let inner = self.inner.read();
        let mut txs: Vec<Transaction> = inner
            .completed_for_wallet(wallet)
            .into_iter()
            .filter(|t| t.created_at >= since)
            .cloned()
            .collect();
        txs.sort_by_key(|t| t.created_at);
        Ok(txs)
    }

    async fn recent_completed(&self, wallet: WalletId, limit: i64) -> Result<Vec<Transaction>> {
        let inner = self.inner.read();
        let mut txs: Vec<Transaction> = inner
            .completed_for_wallet(wallet)
            .into_iter()
            .cloned()
            .collect();
        txs.sort_by_key(|t| std::cmp::Reverse(t.created_at));
        txs.truncate(limit.max(0) as usize);
        Ok(txs)
    }

    async fn recent_vendors(&self, agent: AgentId, since: DateTime<Utc>) -> Result<Vec<String>> {
        let inner = self.inner.read();
        let wallet_ids: HashSet<WalletId> = inner
            .wallets
            .values()
            .filter(|w| w.agent_id == agent)
            .map(|w| w.id)
            .collect();
        let mut vendors: HashSet<String> = HashSet::new();
        for tx in inner.transactions.values() {
            if tx.status == TransactionStatus::Completed
                && tx.created_at >= since
                && wallet_ids.contains(&tx.wallet_id)
            {
                if let Some(vendor) = &tx.recipient_id {
                    vendors.insert(vendor.clone());
                }
            }
        }
        Ok(vendors.into_iter().collect())
    }

    // ------------------------------------------------------------------- rules

    async fn create_rule(&self, rule: &SpendRule) -> Result<()> {
        self.inner.write().rules.insert(rule.id, rule.clone());
        Ok(())
    }

    async fn rule(&self, id: RuleId) -> Result<Option<SpendRule>> {
        Ok(self.inner.read().rules.get(&id).cloned())
    }

    async fn update_rule(&self, rule: &SpendRule) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.rules.contains_key(&rule.id) {
            return Err(WalletError::RuleNotFound {
                rule_id: rule.id.to_string(),
            });
        }
        inner.rules.insert(rule.id, rule.clone());
        Ok(())
    }

    async fn delete_rule(&self, id: RuleId) -> Result<()> {
        self.inner.write().rules.remove(&id);
        Ok(())
    }

    async fn rules_for_wallet(&self, wallet: WalletId) -> Result<Vec<SpendRule>> {
        Ok(self
            .inner
            .read()
            .rules
            .values()
            .filter(|r| r.wallet_id == wallet)
            .cloned()
            .collect())
    }

    async fn rules_for_agent(&self, agent: AgentId) -> Result<Vec<SpendRule>> {
        let inner = self.inner.read();
        let wallet_ids: HashSet<WalletId> = inner
            .wallets
            .values()
            .filter(|w| w.agent_id == agent)
            .map(|w| w.id)
            .collect();
        Ok(inner
            .rules
            .values()
            .filter(|r| wallet_ids.contains(&r.wallet_id))
            .cloned()
            .collect())
    }

    // ----------------------------------------------------------- kill switches

    async fn create_kill_switch(&self, switch: &KillSwitch) -> Result<()> {
        self.inner.write().switches.insert(switch.id, switch.clone());
        Ok(())
    }

    async fn kill_switch(&self, id: KillSwitchId) -> Result<Option<KillSwitch>> {
        Ok(self.inner.read().switches.get(&id).cloned())
    }

    async fn update_kill_switch(&self, switch: &KillSwitch) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.switches.contains_key(&switch.id) {
            return Err(WalletError::KillSwitchNotFound {
                switch_id: switch.id.to_string(),
            });
        }
        inner.switches.insert(switch.id, switch.clone());
        Ok(())
    }

    async fn delete_kill_switch(&self, id: KillSwitchId) -> Result<()> {
        self.inner.write().switches.remove(&id);
        Ok(())
    }

    async fn kill_switches_for_wallet(&self, wallet: WalletId) -> Result<Vec<KillSwitch>> {
        Ok(self
            .inner
            .read()
            .switches
            .values()
            .filter(|s| s.wallet_id == wallet)
            .cloned()
            .collect())
    }

    async fn latch_kill_switch(
        &self,
        switch: &KillSwitch,
        blocked_tx: Option<&Transaction>,
        audit: AuditDraft,
    ) -> Result<AuditEntry> {
        let mut inner = self.inner.write();
        if !inner.switches.contains_key(&switch.id) {
            return Err(WalletError::KillSwitchNotFound {
                switch_id: switch.id.to_string(),
            });
        }
        inner.wallet_mut(switch.wallet_id)?.status = WalletStatus::KillSwitched;
        inner.switches.insert(switch.id, switch.clone());
        if let Some(tx) = blocked_tx {
            inner.upsert_tx(tx);
        }
        Ok(inner.seal_audit(audit))
    }

    // ----------------------------------------------------------------- lineage

    async fn lineage(&self, agent: AgentId) -> Result<Option<AgentLineage>> {
        Ok(self.inner.read().lineages.get(&agent).cloned())
    }

    async fn upsert_lineage(&self, lineage: &AgentLineage) -> Result<()> {
        self.inner
            .write()
            .lineages
            .insert(lineage.agent_id, lineage.clone());
        Ok(())
    }

    async fn record_spawn(
        &self,
        child: &AgentLineage,
        parent: &AgentLineage,
        event: &SpawnEvent,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.lineages.contains_key(&child.agent_id) {
            return Err(WalletError::LineageExists {
                agent_id: child.agent_id.to_string(),
            });
        }
        inner.lineages.insert(child.agent_id, child.clone());
        inner.lineages.insert(parent.agent_id, parent.clone());
        inner.spawn_events.push(event.clone());
        Ok(())
    }

    async fn spawn_events_for_parent(&self, parent: AgentId) -> Result<Vec<SpawnEvent>> {
        Ok(self
            .inner
            .read()
            .spawn_events
            .iter()
            .filter(|e| e.parent_id == parent)
            .cloned()
            .collect())
    }

    // ------------------------------------------------------------- cross-agent

    async fn create_policy(&self, policy: &CrossAgentPolicy) -> Result<()> {
        self.inner.write().policies.insert(policy.id, policy.clone());
        Ok(())
    }

    async fn policy(&self, id: PolicyId) -> Result<Option<CrossAgentPolicy>> {
        Ok(self.inner.read().policies.get(&id).cloned())
    }

    async fn update_policy(&self, policy: &CrossAgentPolicy) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.policies.contains_key(&policy.id) {
            return Err(WalletError::PolicyNotFound {
                policy_id: policy.id.to_string(),
            });
        }
        inner.policies.insert(policy.id, policy.clone());
        Ok(())
    }

    async fn delete_policy(&self, id: PolicyId) -> Result<()> {
        self.inner.write().policies.remove(&id);
        Ok(())
    }

    async fn policies_for_source(&self, source: AgentId) -> Result<Vec<CrossAgentPolicy>> {
        Ok(self
            .inner
            .read()
            .policies
            .values()
            .filter(|p| p.source_agent_id == source)
            .cloned()
            .collect())
    }

    async fn create_group(&self, group: &AgentGroup) -> Result<()> {
        self.inner.write().groups.insert(group.id, group.clone());
        Ok(())
    }

    async fn group(&self, id: GroupId) -> Result<Option<AgentGroup>> {
        Ok(self.inner.read().groups.get(&id).cloned())
    }

    async fn groups_for_owner(&self, owner: OwnerId) -> Result<Vec<AgentGroup>> {
        Ok(self
            .inner
            .read()
            .groups
            .values()
            .filter(|g| g.owner_id == owner)
            .cloned()
            .collect())
    }

    async fn insert_cross_transaction(&self, tx: &CrossAgentTransaction) -> Result<()> {
        let mut inner = self.inner.write();
        inner.cross_order.push(tx.id);
        inner.cross_txs.insert(tx.id, tx.clone());
        Ok(())
    }

    async fn update_cross_transaction(&self, tx: &CrossAgentTransaction) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.cross_txs.contains_key(&tx.id) {
            return Err(WalletError::CrossTransactionNotFound {
                transaction_id: tx.id.to_string(),
            });
        }
        inner.cross_txs.insert(tx.id, tx.clone());
        Ok(())
    }

    async fn cross_transaction(
        &self,
        id: CrossTransactionId,
    ) -> Result<Option<CrossAgentTransaction>> {
        Ok(self.inner.read().cross_txs.get(&id).cloned())
    }

    async fn cross_authorized_to_target_since(
        &self,
        source: AgentId,
        target: AgentId,
        since: DateTime<Utc>,
    ) -> Result<Money> {
        let inner = self.inner.read();
        let mut total = Money::zero();
        for tx in inner.cross_txs.values() {
            if tx.authorized
                && tx.source_agent_id == source
                && tx.target_agent_id == target
                && tx.created_at >= since
            {
                total = total.checked_add(tx.amount)?;
            }
        }
        Ok(total)
    }

    async fn cross_authorized_total_since(
        &self,
        source: AgentId,
        since: DateTime<Utc>,
    ) -> Result<Money> {
        let inner = self.inner.read();
        let mut total = Money::zero();
        for tx in inner.cross_txs.values() {
            if tx.authorized && tx.source_agent_id == source && tx.created_at >= since {
                total = total.checked_add(tx.amount)?;
            }
        }
        Ok(total)
    }

    async fn cross_counterparty_stats(&self, target: AgentId) -> Result<(u64, u64)> {
        use agentwallet_types::SettlementStatus;
        let inner = self.inner.read();
        let mut settled = 0;
        let mut total = 0;
        for tx in inner.cross_txs.values() {
            if tx.target_agent_id == target {
                total += 1;
                if tx.settlement_status == SettlementStatus::Settled {
                    settled += 1;
                }
            }
        }
        Ok((settled, total))
    }

    // ---------------------------------------------------------------- dead-man

    async fn upsert_deadman_config(&self, config: &DeadManConfig) -> Result<()> {
        self.inner
            .write()
            .deadman_configs
            .insert(config.agent_id, config.clone());
        Ok(())
    }

    async fn deadman_config(&self, agent: AgentId) -> Result<Option<DeadManConfig>> {
        Ok(self.inner.read().deadman_configs.get(&agent).cloned())
    }

    async fn deadman_configs(&self) -> Result<Vec<DeadManConfig>> {
        Ok(self.inner.read().deadman_configs.values().cloned().collect())
    }

    async fn append_deadman_event(&self, event: &DeadManEvent) -> Result<()> {
        self.inner.write().deadman_events.push(event.clone());
        Ok(())
    }

    async fn deadman_events_for_agent(
        &self,
        agent: AgentId,
        limit: i64,
    ) -> Result<Vec<DeadManEvent>> {
        Ok(self
            .inner
            .read()
            .deadman_events
            .iter()
            .rev()
            .filter(|e| e.agent_id == agent)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    // ------------------------------------------------------------------- audit

    async fn append_audit(&self, draft: AuditDraft) -> Result<AuditEntry> {
        Ok(self.inner.write().seal_audit(draft))
    }

    async fn audit_entries(
        &self,
        agent: Option<AgentId>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditEntry>> {
        Ok(self
            .inner
            .read()
            .audit
            .iter()
            .rev()
            .filter(|e| agent.map(|a| e.agent_id == Some(a)).unwrap_or(true))
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn audit_for_resource(&self, resource_id: &str) -> Result<Vec<AuditEntry>> {
        Ok(self
            .inner
            .read()
            .audit
            .iter()
            .filter(|e| e.resource_id == resource_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentwallet_types::{verify_chain, AuditDecision, TransactionCandidate};
    use serde_json::json;

    async fn seeded_wallet(store: &MemStore, balance: Money) -> Wallet {
        let agent = Agent::new(OwnerId::new(), "test-agent", "key".to_string());
        let mut wallet = Wallet::new(agent.id, "USD");
        wallet.balance = balance;
        store.create_agent(&agent).await.unwrap();
        store.create_wallet(&wallet).await.unwrap();
        wallet
    }

    #[tokio::test]
    async fn test_debit_and_complete_atomicity() {
        let store = MemStore::new();
        let wallet = seeded_wallet(&store, Money::from_major(100)).await;

        let mut tx = Transaction::from_candidate(
            wallet.id,
            &TransactionCandidate::new(Money::from_major(40)),
        );
        tx.status = TransactionStatus::Completed;
        tx.completed_at = Some(Utc::now());

        let updated = store.debit_and_complete(&tx).await.unwrap();
        assert_eq!(updated.balance, Money::from_major(60));
        assert!(store.transaction(tx.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_debit_insufficient_leaves_no_row() {
        let store = MemStore::new();
        let wallet = seeded_wallet(&store, Money::from_major(10)).await;

        let mut tx = Transaction::from_candidate(
            wallet.id,
            &TransactionCandidate::new(Money::from_major(40)),
        );
        tx.status = TransactionStatus::Completed;
        tx.completed_at = Some(Utc::now());

        let result = store.debit_and_complete(&tx).await;
        assert!(matches!(
            result,
            Err(WalletError::InsufficientFunds { .. })
        ));
        assert!(store.transaction(tx.id).await.unwrap().is_none());
        assert_eq!(
            store.wallet(wallet.id).await.unwrap().unwrap().balance,
            Money::from_major(10)
        );
    }

    #[tokio::test]
    async fn test_spend_since_excludes_deposits() {
        let store = MemStore::new();
        let wallet = seeded_wallet(&store, Money::from_major(1000)).await;
        let since = Utc::now() - chrono::Duration::hours(1);

        let mut spend = Transaction::from_candidate(
            wallet.id,
            &TransactionCandidate::new(Money::from_major(50)).with_category("api"),
        );
        spend.status = TransactionStatus::Completed;
        spend.completed_at = Some(Utc::now());
        store.insert_transaction(&spend).await.unwrap();

        let mut deposit = Transaction::from_candidate(
            wallet.id,
            &TransactionCandidate::new(Money::from_major(500)).with_category("deposit"),
        );
        deposit.status = TransactionStatus::Completed;
        deposit.completed_at = Some(Utc::now());
        store.insert_transaction(&deposit).await.unwrap();

        assert_eq!(
            store.spend_since(wallet.id, since).await.unwrap(),
            Money::from_major(50)
        );
    }

    #[tokio::test]
    async fn test_audit_chain_is_sealed_in_order() {
        let store = MemStore::new();
        for i in 0..3 {
            store
                .append_audit(AuditDraft::new(
                    None,
                    "transaction.submitted",
                    "transaction",
                    format!("tx_{i}"),
                    AuditDecision::Allowed,
                    json!({}),
                ))
                .await
                .unwrap();
        }
        let mut entries = store.audit_entries(None, 10, 0).await.unwrap();
        entries.reverse();
        assert!(verify_chain(&entries));
    }
}
