//! Request and response DTOs

use agentwallet_types::{
    Agent, AgentId, AgentLineage, AuditEntry, CrossAgentLimits, CrossAgentTransaction,
    KillSwitch, KillSwitchKind, Money, PolicyTarget, RecipientType, RuleKind, SettlementMode,
    SpawnOverrides, SpendRule, Transaction, TransactionStatus, Wallet,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================================================
// Agents
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateAgentRequest {
    pub name: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Returned once at creation; the api_key is not retrievable afterwards
#[derive(Debug, Serialize)]
pub struct CreatedAgentResponse {
    pub id: AgentId,
    pub name: String,
    pub status: String,
    pub api_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct AgentResponse {
    pub id: AgentId,
    pub name: String,
    pub status: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<Agent> for AgentResponse {
    fn from(agent: Agent) -> Self {
        Self {
            id: agent.id,
            name: agent.name,
            status: format!("{:?}", agent.status).to_lowercase(),
            metadata: agent.metadata,
            created_at: agent.created_at,
        }
    }
}

// ============================================================================
// Wallets
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateWalletRequest {
    /// Agent the wallet belongs to; defaults to the calling agent
    pub agent_id: Option<AgentId>,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub id: String,
    pub agent_id: AgentId,
    pub balance: Money,
    pub currency: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<Wallet> for WalletResponse {
    fn from(wallet: Wallet) -> Self {
        Self {
            id: wallet.id.to_string(),
            agent_id: wallet.agent_id,
            balance: wallet.balance,
            currency: wallet.currency,
            status: format!("{:?}", wallet.status).to_lowercase(),
            created_at: wallet.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub amount: Decimal,
    pub description: Option<String>,
}

// ============================================================================
// Rules
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    #[serde(flatten)]
    pub kind: RuleKind,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRuleRequest {
    #[serde(flatten)]
    pub kind: Option<RuleKind>,
    pub priority: Option<i32>,
    pub active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct RuleResponse {
    pub id: String,
    pub wallet_id: String,
    #[serde(flatten)]
    pub kind: RuleKind,
    pub active: bool,
    pub priority: i32,
    pub throttled: bool,
}

impl From<SpendRule> for RuleResponse {
    fn from(rule: SpendRule) -> Self {
        Self {
            id: rule.id.to_string(),
            wallet_id: rule.wallet_id.to_string(),
            kind: rule.kind,
            active: rule.active,
            priority: rule.priority,
            throttled: rule.throttled,
        }
    }
}

// ============================================================================
// Transactions
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SubmitTransactionRequest {
    pub amount: Decimal,
    pub category: Option<String>,
    pub recipient_id: Option<String>,
    #[serde(default = "default_recipient_type")]
    pub recipient_type: RecipientType,
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

fn default_recipient_type() -> RecipientType {
    RecipientType::External
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub id: String,
    pub wallet_id: String,
    pub amount: Money,
    pub category: Option<String>,
    pub recipient_id: Option<String>,
    pub status: TransactionStatus,
    pub rule_check_results: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Transaction> for TransactionResponse {
    fn from(tx: Transaction) -> Self {
        Self {
            id: tx.id.to_string(),
            wallet_id: tx.wallet_id.to_string(),
            amount: tx.amount,
            category: tx.category,
            recipient_id: tx.recipient_id,
            status: tx.status,
            rule_check_results: tx.rule_check_results,
            created_at: tx.created_at,
            completed_at: tx.completed_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub operator: String,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub operator: String,
    pub reason: String,
}

// ============================================================================
// Kill switches
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateKillSwitchRequest {
    #[serde(flatten)]
    pub kind: KillSwitchKind,
    #[serde(default = "default_window_hours")]
    pub window_hours: u32,
}

fn default_window_hours() -> u32 {
    24
}

#[derive(Debug, Serialize)]
pub struct KillSwitchResponse {
    pub id: String,
    pub wallet_id: String,
    #[serde(flatten)]
    pub kind: KillSwitchKind,
    pub window_hours: u32,
    pub active: bool,
    pub triggered: bool,
    pub triggered_at: Option<DateTime<Utc>>,
    pub current_value: Option<Decimal>,
}

impl From<KillSwitch> for KillSwitchResponse {
    fn from(switch: KillSwitch) -> Self {
        Self {
            id: switch.id.to_string(),
            wallet_id: switch.wallet_id.to_string(),
            kind: switch.kind,
            window_hours: switch.window_hours,
            active: switch.active,
            triggered: switch.triggered,
            triggered_at: switch.triggered_at,
            current_value: switch.current_value,
        }
    }
}

// ============================================================================
// Dead-man switch
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterDeadManRequest {
    pub heartbeat_interval_seconds: Option<u64>,
    pub missed_heartbeat_threshold: Option<u32>,
    pub anomaly_window_minutes: Option<u32>,
    pub anomaly_spend_multiplier: Option<f64>,
    pub anomaly_tx_count_multiplier: Option<f64>,
    pub max_tx_per_minute: Option<u32>,
    pub max_unique_vendors_per_hour: Option<u32>,
    pub on_anomaly: Option<agentwallet_types::DeadManAction>,
    pub on_missed_heartbeat: Option<agentwallet_types::DeadManAction>,
    pub on_manual_trigger: Option<agentwallet_types::DeadManAction>,
    pub cascade_to_children: Option<bool>,
    pub recovery_requires_human: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ManualTriggerRequest {
    #[serde(default = "default_trigger_reason")]
    pub reason: String,
}

fn default_trigger_reason() -> String {
    "manual trigger".to_string()
}

// ============================================================================
// Lineage
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SpawnRequest {
    pub child_agent_id: AgentId,
    #[serde(default)]
    pub overrides: SpawnOverrides,
}

#[derive(Debug, Serialize)]
pub struct LineageResponse {
    pub agent_id: AgentId,
    pub parent_id: Option<AgentId>,
    pub root_id: AgentId,
    pub depth: u32,
    pub children_ids: Vec<AgentId>,
    pub status: String,
    pub spawn_policy: serde_json::Value,
}

impl From<AgentLineage> for LineageResponse {
    fn from(lineage: AgentLineage) -> Self {
        Self {
            agent_id: lineage.agent_id,
            parent_id: lineage.parent_id,
            root_id: lineage.root_id,
            depth: lineage.depth,
            children_ids: lineage.children_ids,
            status: format!("{:?}", lineage.status).to_lowercase(),
            spawn_policy: serde_json::to_value(&lineage.spawn_policy)
                .unwrap_or(serde_json::Value::Null),
        }
    }
}

// ============================================================================
// Cross-agent
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreatePolicyRequest {
    pub source_agent_id: AgentId,
    #[serde(flatten)]
    pub target: PolicyTarget,
    pub limits: CrossAgentLimits,
    #[serde(default)]
    pub require_mutual_policy: bool,
    pub settlement_mode: SettlementMode,
    #[serde(default)]
    pub min_counterparty_trust_score: Decimal,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeRequest {
    pub source_agent_id: AgentId,
    pub target_agent_id: AgentId,
    pub amount: Decimal,
    pub payment_type: String,
}

#[derive(Debug, Serialize)]
pub struct CrossTransactionResponse {
    pub id: String,
    pub source_agent_id: AgentId,
    pub target_agent_id: AgentId,
    pub amount: Money,
    pub payment_type: String,
    pub authorized: bool,
    pub authorization_method: String,
    pub settlement_status: String,
    pub requires_human: bool,
    pub reason: Option<String>,
}

impl From<CrossAgentTransaction> for CrossTransactionResponse {
    fn from(tx: CrossAgentTransaction) -> Self {
        Self {
            id: tx.id.to_string(),
            source_agent_id: tx.source_agent_id,
            target_agent_id: tx.target_agent_id,
            amount: tx.amount,
            payment_type: tx.payment_type,
            authorized: tx.authorized,
            authorization_method: format!("{:?}", tx.authorization_method).to_lowercase(),
            settlement_status: format!("{:?}", tx.settlement_status).to_lowercase(),
            requires_human: tx.requires_human,
            reason: tx.reason,
        }
    }
}

// ============================================================================
// Audit
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub agent_id: Option<AgentId>,
    #[serde(default = "default_audit_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_audit_limit() -> i64 {
    100
}

#[derive(Debug, Serialize)]
pub struct AuditEntryResponse {
    pub id: String,
    pub agent_id: Option<AgentId>,
    pub action: String,
    pub resource: String,
    pub resource_id: String,
    pub decision: String,
    pub reasoning: serde_json::Value,
    pub hash: String,
    pub timestamp: DateTime<Utc>,
}

impl From<AuditEntry> for AuditEntryResponse {
    fn from(entry: AuditEntry) -> Self {
        Self {
            id: entry.id.to_string(),
            agent_id: entry.agent_id,
            action: entry.action,
            resource: entry.resource,
            resource_id: entry.resource_id,
            decision: format!("{:?}", entry.decision).to_lowercase(),
            reasoning: entry.reasoning,
            hash: entry.hash,
            timestamp: entry.timestamp,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuditSummaryResponse {
    pub total: usize,
    pub allowed: usize,
    pub blocked: usize,
    pub escalated: usize,
    pub system: usize,
}
