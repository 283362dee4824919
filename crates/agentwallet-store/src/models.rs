//! Row models for the Postgres backend
//!
//! One `Db*` struct per table, mapped with `FromRow`, plus lossless
//! conversions to and from the domain types. Status enums are stored as
//! their snake_case serde names; structured params (rule kinds, spawn
//! policies, policy targets) are JSONB.

use agentwallet_types::{
    Agent, AgentGroup, AgentId, AgentLineage, AgentStatus, AuditDecision, AuditEntry,
    AuditEntryId, AuthorizationMethod, CrossAgentLimits, CrossAgentPolicy, CrossAgentTransaction,
    CrossTransactionId, DeadManAction, DeadManConfig, DeadManEvent, DeadManEventId, DeadManTrigger,
    GroupId, InheritedPolicy, KillSwitch, KillSwitchId, KillSwitchKind, LineageStatus, Money,
    Owner, OwnerId, PolicyId, PolicyTarget, RecipientType, Result, RuleId, RuleKind,
    SettlementMode, SettlementStatus, SpawnEvent, SpawnEventId, SpawnPolicy, SpendRule,
    Transaction, TransactionId, TransactionStatus, Wallet, WalletError, WalletId, WalletStatus,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Serialize a unit enum to its serde string name
pub(crate) fn enum_to_str<T: Serialize>(value: &T) -> Result<String> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(s) => Ok(s),
        other => Err(WalletError::Serialization {
            message: format!("expected string-encoded enum, got {other}"),
        }),
    }
}

/// Parse a unit enum from its serde string name
pub(crate) fn enum_from_str<T: DeserializeOwned>(s: &str) -> Result<T> {
    Ok(serde_json::from_value(serde_json::Value::String(
        s.to_string(),
    ))?)
}

fn money(value: Decimal) -> Result<Money> {
    Money::new(value)
}

// ============================================================================
// Owner / Agent
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct DbOwner {
    pub id: Uuid,
    pub api_key: String,
    pub name: String,
    pub contact: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbOwner> for Owner {
    type Error = WalletError;

    fn try_from(row: DbOwner) -> Result<Self> {
        Ok(Owner {
            id: OwnerId::from_uuid(row.id),
            api_key: row.api_key,
            name: row.name,
            contact: row.contact,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbAgent {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub api_key: String,
    pub name: String,
    pub status: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbAgent> for Agent {
    type Error = WalletError;

    fn try_from(row: DbAgent) -> Result<Self> {
        Ok(Agent {
            id: AgentId::from_uuid(row.id),
            owner_id: OwnerId::from_uuid(row.owner_id),
            api_key: row.api_key,
            name: row.name,
            status: enum_from_str::<AgentStatus>(&row.status)?,
            metadata: row.metadata,
            created_at: row.created_at,
        })
    }
}

// ============================================================================
// Wallet / Transaction
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct DbWallet {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub balance: Decimal,
    pub currency: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbWallet> for Wallet {
    type Error = WalletError;

    fn try_from(row: DbWallet) -> Result<Self> {
        Ok(Wallet {
            id: WalletId::from_uuid(row.id),
            agent_id: AgentId::from_uuid(row.agent_id),
            balance: money(row.balance)?,
            currency: row.currency,
            status: enum_from_str::<WalletStatus>(&row.status)?,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbTransaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub amount: Decimal,
    pub recipient_id: Option<String>,
    pub recipient_type: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub status: String,
    pub rule_check_results: serde_json::Value,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbTransaction> for Transaction {
    type Error = WalletError;

    fn try_from(row: DbTransaction) -> Result<Self> {
        Ok(Transaction {
            id: TransactionId::from_uuid(row.id),
            wallet_id: WalletId::from_uuid(row.wallet_id),
            amount: money(row.amount)?,
            recipient_id: row.recipient_id,
            recipient_type: enum_from_str::<RecipientType>(&row.recipient_type)?,
            category: row.category,
            description: row.description,
            status: enum_from_str::<TransactionStatus>(&row.status)?,
            rule_check_results: row.rule_check_results,
            metadata: row.metadata,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

// ============================================================================
// Rules / Kill switches
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct DbSpendRule {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub kind: serde_json::Value,
    pub active: bool,
    pub priority: i32,
    pub throttled: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbSpendRule> for SpendRule {
    type Error = WalletError;

    fn try_from(row: DbSpendRule) -> Result<Self> {
        Ok(SpendRule {
            id: RuleId::from_uuid(row.id),
            wallet_id: WalletId::from_uuid(row.wallet_id),
            kind: serde_json::from_value::<RuleKind>(row.kind)?,
            active: row.active,
            priority: row.priority,
            throttled: row.throttled,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbKillSwitch {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub kind: serde_json::Value,
    pub window_hours: i32,
    pub active: bool,
    pub triggered: bool,
    pub triggered_at: Option<DateTime<Utc>>,
    pub reset_at: Option<DateTime<Utc>>,
    pub current_value: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbKillSwitch> for KillSwitch {
    type Error = WalletError;

    fn try_from(row: DbKillSwitch) -> Result<Self> {
        Ok(KillSwitch {
            id: KillSwitchId::from_uuid(row.id),
            wallet_id: WalletId::from_uuid(row.wallet_id),
            kind: serde_json::from_value::<KillSwitchKind>(row.kind)?,
            window_hours: row.window_hours.max(0) as u32,
            active: row.active,
            triggered: row.triggered,
            triggered_at: row.triggered_at,
            reset_at: row.reset_at,
            current_value: row.current_value,
            created_at: row.created_at,
        })
    }
}

// ============================================================================
// Lineage
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct DbLineage {
    pub agent_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub root_id: Uuid,
    pub depth: i32,
    pub children_ids: Vec<Uuid>,
    pub status: String,
    pub spawn_policy: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbLineage> for AgentLineage {
    type Error = WalletError;

    fn try_from(row: DbLineage) -> Result<Self> {
        Ok(AgentLineage {
            agent_id: AgentId::from_uuid(row.agent_id),
            parent_id: row.parent_id.map(AgentId::from_uuid),
            root_id: AgentId::from_uuid(row.root_id),
            depth: row.depth.max(0) as u32,
            children_ids: row.children_ids.into_iter().map(AgentId::from_uuid).collect(),
            status: enum_from_str::<LineageStatus>(&row.status)?,
            spawn_policy: serde_json::from_value::<SpawnPolicy>(row.spawn_policy)?,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbSpawnEvent {
    pub id: Uuid,
    pub parent_id: Uuid,
    pub child_id: Uuid,
    pub depth: i32,
    pub inherited_policy: serde_json::Value,
    pub authorized: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbSpawnEvent> for SpawnEvent {
    type Error = WalletError;

    fn try_from(row: DbSpawnEvent) -> Result<Self> {
        Ok(SpawnEvent {
            id: SpawnEventId::from_uuid(row.id),
            parent_id: AgentId::from_uuid(row.parent_id),
            child_id: AgentId::from_uuid(row.child_id),
            depth: row.depth.max(0) as u32,
            inherited_policy: serde_json::from_value::<InheritedPolicy>(row.inherited_policy)?,
            authorized: row.authorized,
            created_at: row.created_at,
        })
    }
}

// ============================================================================
// Cross-agent
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct DbCrossPolicy {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub source_agent_id: Uuid,
    pub target: serde_json::Value,
    pub limits: serde_json::Value,
    pub require_mutual_policy: bool,
    pub settlement_mode: String,
    pub min_counterparty_trust_score: Decimal,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbCrossPolicy> for CrossAgentPolicy {
    type Error = WalletError;

    fn try_from(row: DbCrossPolicy) -> Result<Self> {
        Ok(CrossAgentPolicy {
            id: PolicyId::from_uuid(row.id),
            owner_id: OwnerId::from_uuid(row.owner_id),
            source_agent_id: AgentId::from_uuid(row.source_agent_id),
            target: serde_json::from_value::<PolicyTarget>(row.target)?,
            limits: serde_json::from_value::<CrossAgentLimits>(row.limits)?,
            require_mutual_policy: row.require_mutual_policy,
            settlement_mode: enum_from_str::<SettlementMode>(&row.settlement_mode)?,
            min_counterparty_trust_score: row.min_counterparty_trust_score,
            enabled: row.enabled,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbCrossTransaction {
    pub id: Uuid,
    pub source_agent_id: Uuid,
    pub target_agent_id: Uuid,
    pub amount: Decimal,
    pub payment_type: String,
    pub authorized: bool,
    pub authorization_method: String,
    pub settlement_status: String,
    pub requires_human: bool,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbCrossTransaction> for CrossAgentTransaction {
    type Error = WalletError;

    fn try_from(row: DbCrossTransaction) -> Result<Self> {
        Ok(CrossAgentTransaction {
            id: CrossTransactionId::from_uuid(row.id),
            source_agent_id: AgentId::from_uuid(row.source_agent_id),
            target_agent_id: AgentId::from_uuid(row.target_agent_id),
            amount: money(row.amount)?,
            payment_type: row.payment_type,
            authorized: row.authorized,
            authorization_method: enum_from_str::<AuthorizationMethod>(&row.authorization_method)?,
            settlement_status: enum_from_str::<SettlementStatus>(&row.settlement_status)?,
            requires_human: row.requires_human,
            reason: row.reason,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbAgentGroup {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub agent_ids: Vec<Uuid>,
}

impl TryFrom<DbAgentGroup> for AgentGroup {
    type Error = WalletError;

    fn try_from(row: DbAgentGroup) -> Result<Self> {
        Ok(AgentGroup {
            id: GroupId::from_uuid(row.id),
            owner_id: OwnerId::from_uuid(row.owner_id),
            name: row.name,
            agent_ids: row.agent_ids.into_iter().map(AgentId::from_uuid).collect(),
        })
    }
}

// ============================================================================
// Dead-man switch
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct DbDeadManConfig {
    pub agent_id: Uuid,
    pub heartbeat_interval_seconds: i64,
    pub missed_heartbeat_threshold: i32,
    pub anomaly_window_minutes: i32,
    pub anomaly_spend_multiplier: f64,
    pub anomaly_tx_count_multiplier: f64,
    pub max_tx_per_minute: i32,
    pub max_unique_vendors_per_hour: i32,
    pub on_anomaly: String,
    pub on_missed_heartbeat: String,
    pub on_manual_trigger: String,
    pub cascade_to_children: bool,
    pub recovery_requires_human: bool,
}

impl TryFrom<DbDeadManConfig> for DeadManConfig {
    type Error = WalletError;

    fn try_from(row: DbDeadManConfig) -> Result<Self> {
        Ok(DeadManConfig {
            agent_id: AgentId::from_uuid(row.agent_id),
            heartbeat_interval_seconds: row.heartbeat_interval_seconds.max(0) as u64,
            missed_heartbeat_threshold: row.missed_heartbeat_threshold.max(0) as u32,
            anomaly_window_minutes: row.anomaly_window_minutes.max(0) as u32,
            anomaly_spend_multiplier: row.anomaly_spend_multiplier,
            anomaly_tx_count_multiplier: row.anomaly_tx_count_multiplier,
            max_tx_per_minute: row.max_tx_per_minute.max(0) as u32,
            max_unique_vendors_per_hour: row.max_unique_vendors_per_hour.max(0) as u32,
            on_anomaly: enum_from_str::<DeadManAction>(&row.on_anomaly)?,
            on_missed_heartbeat: enum_from_str::<DeadManAction>(&row.on_missed_heartbeat)?,
            on_manual_trigger: enum_from_str::<DeadManAction>(&row.on_manual_trigger)?,
            cascade_to_children: row.cascade_to_children,
            recovery_requires_human: row.recovery_requires_human,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbDeadManEvent {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub trigger_type: String,
    pub action_taken: String,
    pub details: String,
    pub cascaded_to: Vec<Uuid>,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbDeadManEvent> for DeadManEvent {
    type Error = WalletError;

    fn try_from(row: DbDeadManEvent) -> Result<Self> {
        Ok(DeadManEvent {
            id: DeadManEventId::from_uuid(row.id),
            agent_id: AgentId::from_uuid(row.agent_id),
            trigger: enum_from_str::<DeadManTrigger>(&row.trigger_type)?,
            action_taken: enum_from_str::<DeadManAction>(&row.action_taken)?,
            details: row.details,
            cascaded_to: row.cascaded_to.into_iter().map(AgentId::from_uuid).collect(),
            resolved: row.resolved,
            created_at: row.created_at,
        })
    }
}

// ============================================================================
// Audit
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct DbAuditEntry {
    pub id: Uuid,
    pub agent_id: Option<Uuid>,
    pub action: String,
    pub resource: String,
    pub resource_id: String,
    pub decision: String,
    pub reasoning: serde_json::Value,
    pub previous_hash: String,
    pub hash: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbAuditEntry> for AuditEntry {
    type Error = WalletError;

    fn try_from(row: DbAuditEntry) -> Result<Self> {
        Ok(AuditEntry {
            id: AuditEntryId::from_uuid(row.id),
            agent_id: row.agent_id.map(AgentId::from_uuid),
            action: row.action,
            resource: row.resource,
            resource_id: row.resource_id,
            decision: enum_from_str::<AuditDecision>(&row.decision)?,
            reasoning: row.reasoning,
            previous_hash: row.previous_hash,
            hash: row.hash,
            timestamp: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_string_round_trip() {
        let s = enum_to_str(&TransactionStatus::AwaitingApproval).unwrap();
        assert_eq!(s, "awaiting_approval");
        let back: TransactionStatus = enum_from_str(&s).unwrap();
        assert_eq!(back, TransactionStatus::AwaitingApproval);
    }

    #[test]
    fn test_unknown_enum_value_fails() {
        let result: Result<WalletStatus> = enum_from_str("vaporized");
        assert!(result.is_err());
    }
}
