//! The `Store` trait

use agentwallet_types::{
    Agent, AgentGroup, AgentId, AgentLineage, AgentStatus, AuditDraft, AuditEntry,
    CrossAgentPolicy, CrossAgentTransaction, CrossTransactionId, DeadManConfig, DeadManEvent,
    GroupId, KillSwitch, KillSwitchId, Money, Owner, OwnerId, PolicyId, Result, RuleId, SpawnEvent,
    SpendRule, Transaction, TransactionId, Wallet, WalletId, WalletStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Typed persistence gateway
///
/// Visibility contract: a `Completed` transaction committed through this
/// trait is visible to every subsequent read on the same wallet
/// (read-your-writes within a wallet).
#[async_trait]
pub trait Store: Send + Sync {
    // ========================================================================
    // Owners
    // ========================================================================

    async fn create_owner(&self, owner: &Owner) -> Result<()>;
    async fn owner(&self, id: OwnerId) -> Result<Option<Owner>>;
    async fn owner_by_api_key(&self, api_key: &str) -> Result<Option<Owner>>;
    /// Replaces the key atomically; the old key stops resolving at commit
    async fn rotate_owner_key(&self, id: OwnerId, api_key: &str) -> Result<()>;

    // ========================================================================
    // Agents
    // ========================================================================

    async fn create_agent(&self, agent: &Agent) -> Result<()>;
    async fn agent(&self, id: AgentId) -> Result<Option<Agent>>;
    async fn agent_by_api_key(&self, api_key: &str) -> Result<Option<Agent>>;
    async fn agents_for_owner(&self, owner: OwnerId) -> Result<Vec<Agent>>;
    async fn set_agent_status(&self, id: AgentId, status: AgentStatus) -> Result<()>;

    // ========================================================================
    // Wallets
    // ========================================================================

    async fn create_wallet(&self, wallet: &Wallet) -> Result<()>;
    async fn wallet(&self, id: WalletId) -> Result<Option<Wallet>>;
    async fn wallets_for_agent(&self, agent: AgentId) -> Result<Vec<Wallet>>;
    async fn set_wallet_status(&self, id: WalletId, status: WalletStatus) -> Result<()>;

    // ========================================================================
    // Transactions
    // ========================================================================

    async fn insert_transaction(&self, tx: &Transaction) -> Result<()>;
    async fn update_transaction(&self, tx: &Transaction) -> Result<()>;
    async fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>>;
    /// Newest first
    async fn transactions_for_wallet(&self, wallet: WalletId, limit: i64)
        -> Result<Vec<Transaction>>;
    async fn awaiting_approval_for_owner(&self, owner: OwnerId) -> Result<Vec<Transaction>>;

    /// Atomic debit + completion. The transaction must carry status
    /// `Completed` and a `completed_at`; the row is inserted or updated in
    /// the same unit of work as the balance decrement. Fails without any
    /// write when the wallet is missing, not active, or short of funds.
    async fn debit_and_complete(&self, tx: &Transaction) -> Result<Wallet>;

    /// Atomic credit + completed deposit row
    async fn credit_and_complete(&self, tx: &Transaction) -> Result<Wallet>;

    // ========================================================================
    // Spend aggregates
    // ========================================================================

    /// Sum of Completed, non-deposit amounts with created_at >= since
    async fn spend_since(&self, wallet: WalletId, since: DateTime<Utc>) -> Result<Money>;
    /// Completed transactions (deposits included), ascending created_at
    async fn completed_since(
        &self,
        wallet: WalletId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Transaction>>;
    /// Completed transactions, newest first
    async fn recent_completed(&self, wallet: WalletId, limit: i64) -> Result<Vec<Transaction>>;
    /// Distinct recipient ids across the agent's wallets since the cutoff
    async fn recent_vendors(&self, agent: AgentId, since: DateTime<Utc>) -> Result<Vec<String>>;

    // ========================================================================
    // Spend rules
    // ========================================================================

    async fn create_rule(&self, rule: &SpendRule) -> Result<()>;
    async fn rule(&self, id: RuleId) -> Result<Option<SpendRule>>;
    async fn update_rule(&self, rule: &SpendRule) -> Result<()>;
    async fn delete_rule(&self, id: RuleId) -> Result<()>;
    async fn rules_for_wallet(&self, wallet: WalletId) -> Result<Vec<SpendRule>>;
    async fn rules_for_agent(&self, agent: AgentId) -> Result<Vec<SpendRule>>;

    // ========================================================================
    // Kill switches
    // ========================================================================

    async fn create_kill_switch(&self, switch: &KillSwitch) -> Result<()>;
    async fn kill_switch(&self, id: KillSwitchId) -> Result<Option<KillSwitch>>;
    async fn update_kill_switch(&self, switch: &KillSwitch) -> Result<()>;
    async fn delete_kill_switch(&self, id: KillSwitchId) -> Result<()>;
    async fn kill_switches_for_wallet(&self, wallet: WalletId) -> Result<Vec<KillSwitch>>;

    /// Atomic latch: persists the triggered switch, flips the wallet to
    /// `KillSwitched`, records the blocked transaction when present, and
    /// appends the audit entry — all in one unit of work.
    async fn latch_kill_switch(
        &self,
        switch: &KillSwitch,
        blocked_tx: Option<&Transaction>,
        audit: AuditDraft,
    ) -> Result<AuditEntry>;

    // ========================================================================
    // Lineage
    // ========================================================================

    async fn lineage(&self, agent: AgentId) -> Result<Option<AgentLineage>>;
    async fn upsert_lineage(&self, lineage: &AgentLineage) -> Result<()>;
    /// Atomic spawn: child lineage insert + parent children update + event append
    async fn record_spawn(
        &self,
        child: &AgentLineage,
        parent: &AgentLineage,
        event: &SpawnEvent,
    ) -> Result<()>;
    async fn spawn_events_for_parent(&self, parent: AgentId) -> Result<Vec<SpawnEvent>>;

    // ========================================================================
    // Cross-agent
    // ========================================================================

    async fn create_policy(&self, policy: &CrossAgentPolicy) -> Result<()>;
    async fn policy(&self, id: PolicyId) -> Result<Option<CrossAgentPolicy>>;
    async fn update_policy(&self, policy: &CrossAgentPolicy) -> Result<()>;
    async fn delete_policy(&self, id: PolicyId) -> Result<()>;
    async fn policies_for_source(&self, source: AgentId) -> Result<Vec<CrossAgentPolicy>>;

    async fn create_group(&self, group: &AgentGroup) -> Result<()>;
    async fn group(&self, id: GroupId) -> Result<Option<AgentGroup>>;
    async fn groups_for_owner(&self, owner: OwnerId) -> Result<Vec<AgentGroup>>;

    async fn insert_cross_transaction(&self, tx: &CrossAgentTransaction) -> Result<()>;
    async fn update_cross_transaction(&self, tx: &CrossAgentTransaction) -> Result<()>;
    async fn cross_transaction(
        &self,
        id: CrossTransactionId,
    ) -> Result<Option<CrossAgentTransaction>>;
    /// Sum of authorized source→target amounts since the cutoff
    async fn cross_authorized_to_target_since(
        &self,
        source: AgentId,
        target: AgentId,
        since: DateTime<Utc>,
    ) -> Result<Money>;
    /// Sum of authorized source→anyone amounts since the cutoff
    async fn cross_authorized_total_since(
        &self,
        source: AgentId,
        since: DateTime<Utc>,
    ) -> Result<Money>;
    /// (settled, total) counts of cross-agent transactions received by `target`
    async fn cross_counterparty_stats(&self, target: AgentId) -> Result<(u64, u64)>;

    // ========================================================================
    // Dead-man switch
    // ========================================================================

    async fn upsert_deadman_config(&self, config: &DeadManConfig) -> Result<()>;
    async fn deadman_config(&self, agent: AgentId) -> Result<Option<DeadManConfig>>;
    async fn deadman_configs(&self) -> Result<Vec<DeadManConfig>>;
    async fn append_deadman_event(&self, event: &DeadManEvent) -> Result<()>;
    async fn deadman_events_for_agent(
        &self,
        agent: AgentId,
        limit: i64,
    ) -> Result<Vec<DeadManEvent>>;

    // ========================================================================
    // Audit
    // ========================================================================

    /// Seal the draft against the current chain head and append it
    async fn append_audit(&self, draft: AuditDraft) -> Result<AuditEntry>;
    /// Newest first; `agent` filters when set
    async fn audit_entries(
        &self,
        agent: Option<AgentId>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditEntry>>;
    async fn audit_for_resource(&self, resource_id: &str) -> Result<Vec<AuditEntry>>;
}
