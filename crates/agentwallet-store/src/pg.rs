//! PostgreSQL store backend
//!
//! Runtime-bound SQLx queries against the relational layout implied by the
//! data model: `owners`, `agents`, `wallets`, `transactions`, `spend_rules`,
//! `kill_switches`, `agent_lineages`, `spawn_events`, `cross_agent_policies`,
//! `cross_agent_transactions`, `agent_groups`, `deadman_configs`,
//! `deadman_events` and `audit_log` (with a `seq` bigserial ordering the
//! hash chain). Schema management lives outside this crate.
//!
//! Composite writes run inside explicit transactions with `FOR UPDATE` row
//! locks, so a concurrent admission on the same wallet serializes at the
//! database even if the caller's in-process lock is bypassed.

use agentwallet_types::{
    Agent, AgentGroup, AgentId, AgentLineage, AgentStatus, AuditDraft, AuditEntry,
    CrossAgentPolicy, CrossAgentTransaction, CrossTransactionId, DeadManConfig, DeadManEvent,
    GroupId, KillSwitch, KillSwitchId, Money, Owner, OwnerId, PolicyId, Result, RuleId, SpawnEvent,
    SpendRule, Transaction, TransactionId, TransactionStatus, Wallet, WalletError, WalletId,
    WalletStatus, DEPOSIT_CATEGORY,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::models::*;
use crate::{Store, StoreConfig};

/// SQLx-backed [`Store`]
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

fn db(err: sqlx::Error) -> WalletError {
    WalletError::Store {
        message: err.to_string(),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|d| d.is_unique_violation())
        .unwrap_or(false)
}

impl PgStore {
    /// Connect a pool using the given settings
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        info!("Connecting to PostgreSQL: {}", config.postgres_url_masked());
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.postgres_url)
            .await
            .map_err(db)?;
        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert a transaction row inside an open database transaction
    async fn upsert_tx_row(executor: &mut sqlx::PgConnection, tx: &Transaction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions
                (id, wallet_id, amount, recipient_id, recipient_type, category, description,
                 status, rule_check_results, metadata, created_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                rule_check_results = EXCLUDED.rule_check_results,
                metadata = EXCLUDED.metadata,
                completed_at = EXCLUDED.completed_at
            "#,
        )
        .bind(tx.id.as_uuid())
        .bind(tx.wallet_id.as_uuid())
        .bind(tx.amount.as_decimal())
        .bind(&tx.recipient_id)
        .bind(enum_to_str(&tx.recipient_type)?)
        .bind(&tx.category)
        .bind(&tx.description)
        .bind(enum_to_str(&tx.status)?)
        .bind(&tx.rule_check_results)
        .bind(&tx.metadata)
        .bind(tx.created_at)
        .bind(tx.completed_at)
        .execute(executor)
        .await
        .map_err(db)?;
        Ok(())
    }

    /// Seal and insert an audit entry inside an open database transaction,
    /// locking the chain head so concurrent appends cannot fork it
    async fn append_audit_in_tx(
        conn: &mut sqlx::PgConnection,
        draft: AuditDraft,
    ) -> Result<AuditEntry> {
        let head: Option<String> = sqlx::query_scalar(
            "SELECT hash FROM audit_log ORDER BY seq DESC LIMIT 1 FOR UPDATE",
        )
        .fetch_optional(&mut *conn)
        .await
        .map_err(db)?;

        let entry = AuditEntry::seal(draft, head.unwrap_or_default());
        sqlx::query(
            r#"
            INSERT INTO audit_log
                (id, agent_id, action, resource, resource_id, decision, reasoning,
                 previous_hash, hash, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.agent_id.map(|a| a.as_uuid()))
        .bind(&entry.action)
        .bind(&entry.resource)
        .bind(&entry.resource_id)
        .bind(enum_to_str(&entry.decision)?)
        .bind(&entry.reasoning)
        .bind(&entry.previous_hash)
        .bind(&entry.hash)
        .bind(entry.timestamp)
        .execute(conn)
        .await
        .map_err(db)?;
        Ok(entry)
    }
}

#[async_trait]
impl Store for PgStore {
    // ------------------------------------------------------------------ owners

    async fn create_owner(&self, owner: &Owner) -> Result<()> {
        sqlx::query(
            "INSERT INTO owners (id, api_key, name, contact, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(owner.id.as_uuid())
        .bind(&owner.api_key)
        .bind(&owner.name)
        .bind(&owner.contact)
        .bind(owner.created_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn owner(&self, id: OwnerId) -> Result<Option<Owner>> {
        sqlx::query_as::<_, DbOwner>(
            "SELECT id, api_key, name, contact, created_at FROM owners WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?
        .map(Owner::try_from)
        .transpose()
    }

    async fn owner_by_api_key(&self, api_key: &str) -> Result<Option<Owner>> {
        sqlx::query_as::<_, DbOwner>(
            "SELECT id, api_key, name, contact, created_at FROM owners WHERE api_key = $1",
        )
        .bind(api_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?
        .map(Owner::try_from)
        .transpose()
    }

    async fn rotate_owner_key(&self, id: OwnerId, api_key: &str) -> Result<()> {
        let result = sqlx::query("UPDATE owners SET api_key = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(api_key)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        if result.rows_affected() == 0 {
            return Err(WalletError::OwnerNotFound {
                owner_id: id.to_string(),
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------ agents

    async fn create_agent(&self, agent: &Agent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO agents (id, owner_id, api_key, name, status, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(agent.id.as_uuid())
        .bind(agent.owner_id.as_uuid())
        .bind(&agent.api_key)
        .bind(&agent.name)
        .bind(enum_to_str(&agent.status)?)
        .bind(&agent.metadata)
        .bind(agent.created_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn agent(&self, id: AgentId) -> Result<Option<Agent>> {
        sqlx::query_as::<_, DbAgent>(
            "SELECT id, owner_id, api_key, name, status, metadata, created_at FROM agents WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?
        .map(Agent::try_from)
        .transpose()
    }

    async fn agent_by_api_key(&self, api_key: &str) -> Result<Option<Agent>> {
        sqlx::query_as::<_, DbAgent>(
            "SELECT id, owner_id, api_key, name, status, metadata, created_at FROM agents WHERE api_key = $1",
        )
        .bind(api_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?
        .map(Agent::try_from)
        .transpose()
    }

    async fn agents_for_owner(&self, owner: OwnerId) -> Result<Vec<Agent>> {
        sqlx::query_as::<_, DbAgent>(
            "SELECT id, owner_id, api_key, name, status, metadata, created_at FROM agents WHERE owner_id = $1",
        )
        .bind(owner.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db)?
        .into_iter()
        .map(Agent::try_from)
        .collect()
    }

    async fn set_agent_status(&self, id: AgentId, status: AgentStatus) -> Result<()> {
        let result = sqlx::query("UPDATE agents SET status = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(enum_to_str(&status)?)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        if result.rows_affected() == 0 {
            return Err(WalletError::AgentNotFound {
                agent_id: id.to_string(),
            });
        }
        Ok(())
    }

    // ----------------------------------------------------------------- wallets

    async fn create_wallet(&self, wallet: &Wallet) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO wallets (id, agent_id, balance, currency, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(wallet.id.as_uuid())
        .bind(wallet.agent_id.as_uuid())
        .bind(wallet.balance.as_decimal())
        .bind(&wallet.currency)
        .bind(enum_to_str(&wallet.status)?)
        .bind(wallet.created_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn wallet(&self, id: WalletId) -> Result<Option<Wallet>> {
        sqlx::query_as::<_, DbWallet>(
            "SELECT id, agent_id, balance, currency, status, created_at FROM wallets WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?
        .map(Wallet::try_from)
        .transpose()
    }

    async fn wallets_for_agent(&self, agent: AgentId) -> Result<Vec<Wallet>> {
        sqlx::query_as::<_, DbWallet>(
            "SELECT id, agent_id, balance, currency, status, created_at FROM wallets WHERE agent_id = $1",
        )
        .bind(agent.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db)?
        .into_iter()
        .map(Wallet::try_from)
        .collect()
    }

    async fn set_wallet_status(&self, id: WalletId, status: WalletStatus) -> Result<()> {
        let result = sqlx::query("UPDATE wallets SET status = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(enum_to_str(&status)?)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        if result.rows_affected() == 0 {
            return Err(WalletError::WalletNotFound {
                wallet_id: id.to_string(),
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------ transactions

    async fn insert_transaction(&self, tx: &Transaction) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(db)?;
        Self::upsert_tx_row(&mut *conn, tx).await
    }

    async fn update_transaction(&self, tx: &Transaction) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = $2, rule_check_results = $3, metadata = $4, completed_at = $5
            WHERE id = $1
            "#,
        )
        .bind(tx.id.as_uuid())
        .bind(enum_to_str(&tx.status)?)
        .bind(&tx.rule_check_results)
        .bind(&tx.metadata)
        .bind(tx.completed_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        if result.rows_affected() == 0 {
            return Err(WalletError::TransactionNotFound {
                transaction_id: tx.id.to_string(),
            });
        }
        Ok(())
    }

    async fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        sqlx::query_as::<_, DbTransaction>(
            r#"
            SELECT id, wallet_id, amount, recipient_id, recipient_type, category, description,
                   status, rule_check_results, metadata, created_at, completed_at
            FROM transactions WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?
        .map(Transaction::try_from)
        .transpose()
    }

    async fn transactions_for_wallet(
        &self,
        wallet: WalletId,
        limit: i64,
    ) -> Result<Vec<Transaction>> {
        sqlx::query_as::<_, DbTransaction>(
            r#"
            SELECT id, wallet_id, amount, recipient_id, recipient_type, category, description,
                   status, rule_check_results, metadata, created_at, completed_at
            FROM transactions
            WHERE wallet_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(wallet.as_uuid())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?
        .into_iter()
        .map(Transaction::try_from)
        .collect()
    }

    async fn awaiting_approval_for_owner(&self, owner: OwnerId) -> Result<Vec<Transaction>> {
        sqlx::query_as::<_, DbTransaction>(
            r#"
            SELECT t.id, t.wallet_id, t.amount, t.recipient_id, t.recipient_type, t.category,
                   t.description, t.status, t.rule_check_results, t.metadata, t.created_at,
                   t.completed_at
            FROM transactions t
            JOIN wallets w ON w.id = t.wallet_id
            JOIN agents a ON a.id = w.agent_id
            WHERE a.owner_id = $1 AND t.status = 'awaiting_approval'
            ORDER BY t.created_at ASC
            "#,
        )
        .bind(owner.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db)?
        .into_iter()
        .map(Transaction::try_from)
        .collect()
    }

    async fn debit_and_complete(&self, tx: &Transaction) -> Result<Wallet> {
        if tx.status != TransactionStatus::Completed || tx.completed_at.is_none() {
            return Err(WalletError::state_conflict(
                "transaction",
                "debit_and_complete requires a completed transaction",
            ));
        }

        let mut dbtx = self.pool.begin().await.map_err(db)?;

        let wallet: DbWallet = sqlx::query_as::<_, DbWallet>(
            "SELECT id, agent_id, balance, currency, status, created_at FROM wallets WHERE id = $1 FOR UPDATE",
        )
        .bind(tx.wallet_id.as_uuid())
        .fetch_optional(&mut *dbtx)
        .await
        .map_err(db)?
        .ok_or_else(|| WalletError::WalletNotFound {
            wallet_id: tx.wallet_id.to_string(),
        })?;

        if wallet.status != "active" {
            return Err(WalletError::state_conflict(
                "wallet",
                format!("wallet is {}, not active", wallet.status),
            ));
        }
        if wallet.balance < tx.amount.as_decimal() {
            return Err(WalletError::InsufficientFunds {
                wallet_id: tx.wallet_id.to_string(),
                requested: tx.amount.to_string(),
                available: wallet.balance.to_string(),
            });
        }

        let updated: DbWallet = sqlx::query_as::<_, DbWallet>(
            r#"
            UPDATE wallets SET balance = balance - $2
            WHERE id = $1
            RETURNING id, agent_id, balance, currency, status, created_at
            "#,
        )
        .bind(tx.wallet_id.as_uuid())
        .bind(tx.amount.as_decimal())
        .fetch_one(&mut *dbtx)
        .await
        .map_err(db)?;

        Self::upsert_tx_row(&mut *dbtx, tx).await?;
        dbtx.commit().await.map_err(db)?;

        Wallet::try_from(updated)
    }

    async fn credit_and_complete(&self, tx: &Transaction) -> Result<Wallet> {
        let mut dbtx = self.pool.begin().await.map_err(db)?;

        let updated: Option<DbWallet> = sqlx::query_as::<_, DbWallet>(
            r#"
            UPDATE wallets SET balance = balance + $2
            WHERE id = $1
            RETURNING id, agent_id, balance, currency, status, created_at
            "#,
        )
        .bind(tx.wallet_id.as_uuid())
        .bind(tx.amount.as_decimal())
        .fetch_optional(&mut *dbtx)
        .await
        .map_err(db)?;

        let updated = updated.ok_or_else(|| WalletError::WalletNotFound {
            wallet_id: tx.wallet_id.to_string(),
        })?;

        Self::upsert_tx_row(&mut *dbtx, tx).await?;
        dbtx.commit().await.map_err(db)?;

        Wallet::try_from(updated)
    }

    // -------------------------------------------------------------- aggregates

    async fn spend_since(&self, wallet: WalletId, since: DateTime<Utc>) -> Result<Money> {
        let total: Decimal = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount), 0)
            FROM transactions
            WHERE wallet_id = $1
              AND status = 'completed'
              AND (category IS NULL OR category <> $3)
              AND created_at >= $2
            "#,
        )
        .bind(wallet.as_uuid())
        .bind(since)
        .bind(DEPOSIT_CATEGORY)
        .fetch_one(&self.pool)
        .await
        .map_err(db)?;
        Money::new(total)
    }

    async fn completed_since(
        &self,
        wallet: WalletId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        sqlx::query_as::<_, DbTransaction>(
            r#"
            SELECT id, wallet_id, amount, recipient_id, recipient_type, category, description,
                   status, rule_check_results, metadata, created_at, completed_at
            FROM transactions
            WHERE wallet_id = $1 AND status = 'completed' AND created_at >= $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(wallet.as_uuid())
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?
        .into_iter()
        .map(Transaction::try_from)
        .collect()
    }

    async fn recent_completed(&self, wallet: WalletId, limit: i64) -> Result<Vec<Transaction>> {
        sqlx::query_as::<_, DbTransaction>(
            r#"
            SELECT id, wallet_id, amount, recipient_id, recipient_type, category, description,
                   status, rule_check_results, metadata, created_at, completed_at
            FROM transactions
            WHERE wallet_id = $1 AND status = 'completed'
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(wallet.as_uuid())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?
        .into_iter()
        .map(Transaction::try_from)
        .collect()
    }

    async fn recent_vendors(&self, agent: AgentId, since: DateTime<Utc>) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT t.recipient_id
            FROM transactions t
            JOIN wallets w ON w.id = t.wallet_id
            WHERE w.agent_id = $1
              AND t.status = 'completed'
              AND t.created_at >= $2
              AND t.recipient_id IS NOT NULL
            "#,
        )
        .bind(agent.as_uuid())
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(db)
    }

    // ------------------------------------------------------------------- rules

    async fn create_rule(&self, rule: &SpendRule) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO spend_rules (id, wallet_id, kind, active, priority, throttled, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(rule.id.as_uuid())
        .bind(rule.wallet_id.as_uuid())
        .bind(serde_json::to_value(&rule.kind)?)
        .bind(rule.active)
        .bind(rule.priority)
        .bind(rule.throttled)
        .bind(rule.created_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn rule(&self, id: RuleId) -> Result<Option<SpendRule>> {
        sqlx::query_as::<_, DbSpendRule>(
            "SELECT id, wallet_id, kind, active, priority, throttled, created_at FROM spend_rules WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?
        .map(SpendRule::try_from)
        .transpose()
    }

    async fn update_rule(&self, rule: &SpendRule) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE spend_rules
            SET kind = $2, active = $3, priority = $4, throttled = $5
            WHERE id = $1
            "#,
        )
        .bind(rule.id.as_uuid())
        .bind(serde_json::to_value(&rule.kind)?)
        .bind(rule.active)
        .bind(rule.priority)
        .bind(rule.throttled)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        if result.rows_affected() == 0 {
            return Err(WalletError::RuleNotFound {
                rule_id: rule.id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_rule(&self, id: RuleId) -> Result<()> {
        sqlx::query("DELETE FROM spend_rules WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn rules_for_wallet(&self, wallet: WalletId) -> Result<Vec<SpendRule>> {
        sqlx::query_as::<_, DbSpendRule>(
            "SELECT id, wallet_id, kind, active, priority, throttled, created_at FROM spend_rules WHERE wallet_id = $1",
        )
        .bind(wallet.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db)?
        .into_iter()
        .map(SpendRule::try_from)
        .collect()
    }

    async fn rules_for_agent(&self, agent: AgentId) -> Result<Vec<SpendRule>> {
        sqlx::query_as::<_, DbSpendRule>(
            r#"
            SELECT r.id, r.wallet_id, r.kind, r.active, r.priority, r.throttled, r.created_at
            FROM spend_rules r
            JOIN wallets w ON w.id = r.wallet_id
            WHERE w.agent_id = $1
            "#,
        )
        .bind(agent.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db)?
        .into_iter()
        .map(SpendRule::try_from)
        .collect()
    }

    // ----------------------------------------------------------- kill switches

    async fn create_kill_switch(&self, switch: &KillSwitch) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kill_switches
                (id, wallet_id, kind, window_hours, active, triggered, triggered_at,
                 reset_at, current_value, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(switch.id.as_uuid())
        .bind(switch.wallet_id.as_uuid())
        .bind(serde_json::to_value(&switch.kind)?)
        .bind(switch.window_hours as i32)
        .bind(switch.active)
        .bind(switch.triggered)
        .bind(switch.triggered_at)
        .bind(switch.reset_at)
        .bind(switch.current_value)
        .bind(switch.created_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn kill_switch(&self, id: KillSwitchId) -> Result<Option<KillSwitch>> {
        sqlx::query_as::<_, DbKillSwitch>(
            r#"
            SELECT id, wallet_id, kind, window_hours, active, triggered, triggered_at,
                   reset_at, current_value, created_at
            FROM kill_switches WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?
        .map(KillSwitch::try_from)
        .transpose()
    }

    async fn update_kill_switch(&self, switch: &KillSwitch) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE kill_switches
            SET kind = $2, window_hours = $3, active = $4, triggered = $5,
                triggered_at = $6, reset_at = $7, current_value = $8
            WHERE id = $1
            "#,
        )
        .bind(switch.id.as_uuid())
        .bind(serde_json::to_value(&switch.kind)?)
        .bind(switch.window_hours as i32)
        .bind(switch.active)
        .bind(switch.triggered)
        .bind(switch.triggered_at)
        .bind(switch.reset_at)
        .bind(switch.current_value)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        if result.rows_affected() == 0 {
            return Err(WalletError::KillSwitchNotFound {
                switch_id: switch.id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_kill_switch(&self, id: KillSwitchId) -> Result<()> {
        sqlx::query("DELETE FROM kill_switches WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn kill_switches_for_wallet(&self, wallet: WalletId) -> Result<Vec<KillSwitch>> {
        sqlx::query_as::<_, DbKillSwitch>(
            r#"
            SELECT id, wallet_id, kind, window_hours, active, triggered, triggered_at,
                   reset_at, current_value, created_at
            FROM kill_switches WHERE wallet_id = $1
            "#,
        )
        .bind(wallet.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db)?
        .into_iter()
        .map(KillSwitch::try_from)
        .collect()
    }

    async fn latch_kill_switch(
        &self,
        switch: &KillSwitch,
        blocked_tx: Option<&Transaction>,
        audit: AuditDraft,
    ) -> Result<AuditEntry> {
        let mut dbtx = self.pool.begin().await.map_err(db)?;

        sqlx::query("UPDATE wallets SET status = 'kill_switched' WHERE id = $1")
            .bind(switch.wallet_id.as_uuid())
            .execute(&mut *dbtx)
            .await
            .map_err(db)?;

        sqlx::query(
            r#"
            UPDATE kill_switches
            SET triggered = $2, triggered_at = $3, reset_at = $4, current_value = $5
            WHERE id = $1
            "#,
        )
        .bind(switch.id.as_uuid())
        .bind(switch.triggered)
        .bind(switch.triggered_at)
        .bind(switch.reset_at)
        .bind(switch.current_value)
        .execute(&mut *dbtx)
        .await
        .map_err(db)?;

        if let Some(tx) = blocked_tx {
            Self::upsert_tx_row(&mut *dbtx, tx).await?;
        }

        let entry = Self::append_audit_in_tx(&mut *dbtx, audit).await?;
        dbtx.commit().await.map_err(db)?;
        Ok(entry)
    }

    // ----------------------------------------------------------------- lineage

    async fn lineage(&self, agent: AgentId) -> Result<Option<AgentLineage>> {
        sqlx::query_as::<_, DbLineage>(
            r#"
            SELECT agent_id, parent_id, root_id, depth, children_ids, status, spawn_policy, created_at
            FROM agent_lineages WHERE agent_id = $1
            "#,
        )
        .bind(agent.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?
        .map(AgentLineage::try_from)
        .transpose()
    }

    async fn upsert_lineage(&self, lineage: &AgentLineage) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO agent_lineages
                (agent_id, parent_id, root_id, depth, children_ids, status, spawn_policy, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (agent_id) DO UPDATE SET
                children_ids = EXCLUDED.children_ids,
                status = EXCLUDED.status,
                spawn_policy = EXCLUDED.spawn_policy
            "#,
        )
        .bind(lineage.agent_id.as_uuid())
        .bind(lineage.parent_id.map(|p| p.as_uuid()))
        .bind(lineage.root_id.as_uuid())
        .bind(lineage.depth as i32)
        .bind(
            lineage
                .children_ids
                .iter()
                .map(|c| c.as_uuid())
                .collect::<Vec<_>>(),
        )
        .bind(enum_to_str(&lineage.status)?)
        .bind(serde_json::to_value(&lineage.spawn_policy)?)
        .bind(lineage.created_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn record_spawn(
        &self,
        child: &AgentLineage,
        parent: &AgentLineage,
        event: &SpawnEvent,
    ) -> Result<()> {
        let mut dbtx = self.pool.begin().await.map_err(db)?;

        let insert = sqlx::query(
            r#"
            INSERT INTO agent_lineages
                (agent_id, parent_id, root_id, depth, children_ids, status, spawn_policy, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(child.agent_id.as_uuid())
        .bind(child.parent_id.map(|p| p.as_uuid()))
        .bind(child.root_id.as_uuid())
        .bind(child.depth as i32)
        .bind(
            child
                .children_ids
                .iter()
                .map(|c| c.as_uuid())
                .collect::<Vec<_>>(),
        )
        .bind(enum_to_str(&child.status)?)
        .bind(serde_json::to_value(&child.spawn_policy)?)
        .bind(child.created_at)
        .execute(&mut *dbtx)
        .await;

        if let Err(err) = insert {
            if is_unique_violation(&err) {
                return Err(WalletError::LineageExists {
                    agent_id: child.agent_id.to_string(),
                });
            }
            return Err(db(err));
        }

        sqlx::query(
            "UPDATE agent_lineages SET children_ids = $2, spawn_policy = $3 WHERE agent_id = $1",
        )
        .bind(parent.agent_id.as_uuid())
        .bind(
            parent
                .children_ids
                .iter()
                .map(|c| c.as_uuid())
                .collect::<Vec<_>>(),
        )
        .bind(serde_json::to_value(&parent.spawn_policy)?)
        .execute(&mut *dbtx)
        .await
        .map_err(db)?;

        sqlx::query(
            r#"
            INSERT INTO spawn_events
                (id, parent_id, child_id, depth, inherited_policy, authorized, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.id.as_uuid())
        .bind(event.parent_id.as_uuid())
        .bind(event.child_id.as_uuid())
        .bind(event.depth as i32)
        .bind(serde_json::to_value(&event.inherited_policy)?)
        .bind(event.authorized)
        .bind(event.created_at)
        .execute(&mut *dbtx)
        .await
        .map_err(db)?;

        dbtx.commit().await.map_err(db)?;
        Ok(())
    }

    async fn spawn_events_for_parent(&self, parent: AgentId) -> Result<Vec<SpawnEvent>> {
        sqlx::query_as::<_, DbSpawnEvent>(
            r#"
            SELECT id, parent_id, child_id, depth, inherited_policy, authorized, created_at
            FROM spawn_events WHERE parent_id = $1 ORDER BY created_at ASC
            "#,
        )
        .bind(parent.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db)?
        .into_iter()
        .map(SpawnEvent::try_from)
        .collect()
    }

    // ------------------------------------------------------------- cross-agent

    async fn create_policy(&self, policy: &CrossAgentPolicy) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cross_agent_policies
                (id, owner_id, source_agent_id, target, limits, require_mutual_policy,
                 settlement_mode, min_counterparty_trust_score, enabled, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(policy.id.as_uuid())
        .bind(policy.owner_id.as_uuid())
        .bind(policy.source_agent_id.as_uuid())
        .bind(serde_json::to_value(&policy.target)?)
        .bind(serde_json::to_value(&policy.limits)?)
        .bind(policy.require_mutual_policy)
        .bind(enum_to_str(&policy.settlement_mode)?)
        .bind(policy.min_counterparty_trust_score)
        .bind(policy.enabled)
        .bind(policy.created_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn policy(&self, id: PolicyId) -> Result<Option<CrossAgentPolicy>> {
        sqlx::query_as::<_, DbCrossPolicy>(
            r#"
            SELECT id, owner_id, source_agent_id, target, limits, require_mutual_policy,
                   settlement_mode, min_counterparty_trust_score, enabled, created_at
            FROM cross_agent_policies WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?
        .map(CrossAgentPolicy::try_from)
        .transpose()
    }

    async fn update_policy(&self, policy: &CrossAgentPolicy) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE cross_agent_policies
            SET target = $2, limits = $3, require_mutual_policy = $4, settlement_mode = $5,
                min_counterparty_trust_score = $6, enabled = $7
            WHERE id = $1
            "#,
        )
        .bind(policy.id.as_uuid())
        .bind(serde_json::to_value(&policy.target)?)
        .bind(serde_json::to_value(&policy.limits)?)
        .bind(policy.require_mutual_policy)
        .bind(enum_to_str(&policy.settlement_mode)?)
        .bind(policy.min_counterparty_trust_score)
        .bind(policy.enabled)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        if result.rows_affected() == 0 {
            return Err(WalletError::PolicyNotFound {
                policy_id: policy.id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_policy(&self, id: PolicyId) -> Result<()> {
        sqlx::query("DELETE FROM cross_agent_policies WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn policies_for_source(&self, source: AgentId) -> Result<Vec<CrossAgentPolicy>> {
        sqlx::query_as::<_, DbCrossPolicy>(
            r#"
            SELECT id, owner_id, source_agent_id, target, limits, require_mutual_policy,
                   settlement_mode, min_counterparty_trust_score, enabled, created_at
            FROM cross_agent_policies WHERE source_agent_id = $1
            "#,
        )
        .bind(source.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db)?
        .into_iter()
        .map(CrossAgentPolicy::try_from)
        .collect()
    }

    async fn create_group(&self, group: &AgentGroup) -> Result<()> {
        sqlx::query(
            "INSERT INTO agent_groups (id, owner_id, name, agent_ids) VALUES ($1, $2, $3, $4)",
        )
        .bind(group.id.as_uuid())
        .bind(group.owner_id.as_uuid())
        .bind(&group.name)
        .bind(
            group
                .agent_ids
                .iter()
                .map(|a| a.as_uuid())
                .collect::<Vec<_>>(),
        )
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn group(&self, id: GroupId) -> Result<Option<AgentGroup>> {
        sqlx::query_as::<_, DbAgentGroup>(
            "SELECT id, owner_id, name, agent_ids FROM agent_groups WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?
        .map(AgentGroup::try_from)
        .transpose()
    }

    async fn groups_for_owner(&self, owner: OwnerId) -> Result<Vec<AgentGroup>> {
        sqlx::query_as::<_, DbAgentGroup>(
            "SELECT id, owner_id, name, agent_ids FROM agent_groups WHERE owner_id = $1",
        )
        .bind(owner.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db)?
        .into_iter()
        .map(AgentGroup::try_from)
        .collect()
    }

    async fn insert_cross_transaction(&self, tx: &CrossAgentTransaction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cross_agent_transactions
                (id, source_agent_id, target_agent_id, amount, payment_type, authorized,
                 authorization_method, settlement_status, requires_human, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(tx.id.as_uuid())
        .bind(tx.source_agent_id.as_uuid())
        .bind(tx.target_agent_id.as_uuid())
        .bind(tx.amount.as_decimal())
        .bind(&tx.payment_type)
        .bind(tx.authorized)
        .bind(enum_to_str(&tx.authorization_method)?)
        .bind(enum_to_str(&tx.settlement_status)?)
        .bind(tx.requires_human)
        .bind(&tx.reason)
        .bind(tx.created_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn update_cross_transaction(&self, tx: &CrossAgentTransaction) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE cross_agent_transactions
            SET authorized = $2, authorization_method = $3, settlement_status = $4,
                requires_human = $5, reason = $6
            WHERE id = $1
            "#,
        )
        .bind(tx.id.as_uuid())
        .bind(tx.authorized)
        .bind(enum_to_str(&tx.authorization_method)?)
        .bind(enum_to_str(&tx.settlement_status)?)
        .bind(tx.requires_human)
        .bind(&tx.reason)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        if result.rows_affected() == 0 {
            return Err(WalletError::CrossTransactionNotFound {
                transaction_id: tx.id.to_string(),
            });
        }
        Ok(())
    }

    async fn cross_transaction(
        &self,
        id: CrossTransactionId,
    ) -> Result<Option<CrossAgentTransaction>> {
        sqlx::query_as::<_, DbCrossTransaction>(
            r#"
            SELECT id, source_agent_id, target_agent_id, amount, payment_type, authorized,
                   authorization_method, settlement_status, requires_human, reason, created_at
            FROM cross_agent_transactions WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?
        .map(CrossAgentTransaction::try_from)
        .transpose()
    }

    async fn cross_authorized_to_target_since(
        &self,
        source: AgentId,
        target: AgentId,
        since: DateTime<Utc>,
    ) -> Result<Money> {
        let total: Decimal = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount), 0)
            FROM cross_agent_transactions
            WHERE source_agent_id = $1 AND target_agent_id = $2
              AND authorized = TRUE AND created_at >= $3
            "#,
        )
        .bind(source.as_uuid())
        .bind(target.as_uuid())
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(db)?;
        Money::new(total)
    }

    async fn cross_authorized_total_since(
        &self,
        source: AgentId,
        since: DateTime<Utc>,
    ) -> Result<Money> {
        let total: Decimal = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount), 0)
            FROM cross_agent_transactions
            WHERE source_agent_id = $1 AND authorized = TRUE AND created_at >= $2
            "#,
        )
        .bind(source.as_uuid())
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(db)?;
        Money::new(total)
    }

    async fn cross_counterparty_stats(&self, target: AgentId) -> Result<(u64, u64)> {
        let (settled, total): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FILTER (WHERE settlement_status = 'settled'), COUNT(*)
            FROM cross_agent_transactions
            WHERE target_agent_id = $1
            "#,
        )
        .bind(target.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(db)?;
        Ok((settled.max(0) as u64, total.max(0) as u64))
    }

    // ---------------------------------------------------------------- dead-man

    async fn upsert_deadman_config(&self, config: &DeadManConfig) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO deadman_configs
                (agent_id, heartbeat_interval_seconds, missed_heartbeat_threshold,
                 anomaly_window_minutes, anomaly_spend_multiplier, anomaly_tx_count_multiplier,
                 max_tx_per_minute, max_unique_vendors_per_hour, on_anomaly,
                 on_missed_heartbeat, on_manual_trigger, cascade_to_children,
                 recovery_requires_human)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (agent_id) DO UPDATE SET
                heartbeat_interval_seconds = EXCLUDED.heartbeat_interval_seconds,
                missed_heartbeat_threshold = EXCLUDED.missed_heartbeat_threshold,
                anomaly_window_minutes = EXCLUDED.anomaly_window_minutes,
                anomaly_spend_multiplier = EXCLUDED.anomaly_spend_multiplier,
                anomaly_tx_count_multiplier = EXCLUDED.anomaly_tx_count_multiplier,
                max_tx_per_minute = EXCLUDED.max_tx_per_minute,
                max_unique_vendors_per_hour = EXCLUDED.max_unique_vendors_per_hour,
                on_anomaly = EXCLUDED.on_anomaly,
                on_missed_heartbeat = EXCLUDED.on_missed_heartbeat,
                on_manual_trigger = EXCLUDED.on_manual_trigger,
                cascade_to_children = EXCLUDED.cascade_to_children,
                recovery_requires_human = EXCLUDED.recovery_requires_human
            "#,
        )
        .bind(config.agent_id.as_uuid())
        .bind(config.heartbeat_interval_seconds as i64)
        .bind(config.missed_heartbeat_threshold as i32)
        .bind(config.anomaly_window_minutes as i32)
        .bind(config.anomaly_spend_multiplier)
        .bind(config.anomaly_tx_count_multiplier)
        .bind(config.max_tx_per_minute as i32)
        .bind(config.max_unique_vendors_per_hour as i32)
        .bind(enum_to_str(&config.on_anomaly)?)
        .bind(enum_to_str(&config.on_missed_heartbeat)?)
        .bind(enum_to_str(&config.on_manual_trigger)?)
        .bind(config.cascade_to_children)
        .bind(config.recovery_requires_human)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn deadman_config(&self, agent: AgentId) -> Result<Option<DeadManConfig>> {
        sqlx::query_as::<_, DbDeadManConfig>(
            r#"
            SELECT agent_id, heartbeat_interval_seconds, missed_heartbeat_threshold,
                   anomaly_window_minutes, anomaly_spend_multiplier, anomaly_tx_count_multiplier,
                   max_tx_per_minute, max_unique_vendors_per_hour, on_anomaly,
                   on_missed_heartbeat, on_manual_trigger, cascade_to_children,
                   recovery_requires_human
            FROM deadman_configs WHERE agent_id = $1
            "#,
        )
        .bind(agent.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?
        .map(DeadManConfig::try_from)
        .transpose()
    }

    async fn deadman_configs(&self) -> Result<Vec<DeadManConfig>> {
        sqlx::query_as::<_, DbDeadManConfig>(
            r#"
            SELECT agent_id, heartbeat_interval_seconds, missed_heartbeat_threshold,
                   anomaly_window_minutes, anomaly_spend_multiplier, anomaly_tx_count_multiplier,
                   max_tx_per_minute, max_unique_vendors_per_hour, on_anomaly,
                   on_missed_heartbeat, on_manual_trigger, cascade_to_children,
                   recovery_requires_human
            FROM deadman_configs
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db)?
        .into_iter()
        .map(DeadManConfig::try_from)
        .collect()
    }

    async fn append_deadman_event(&self, event: &DeadManEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO deadman_events
                (id, agent_id, trigger_type, action_taken, details, cascaded_to, resolved, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(event.id.as_uuid())
        .bind(event.agent_id.as_uuid())
        .bind(enum_to_str(&event.trigger)?)
        .bind(enum_to_str(&event.action_taken)?)
        .bind(&event.details)
        .bind(
            event
                .cascaded_to
                .iter()
                .map(|a| a.as_uuid())
                .collect::<Vec<_>>(),
        )
        .bind(event.resolved)
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn deadman_events_for_agent(
        &self,
        agent: AgentId,
        limit: i64,
    ) -> Result<Vec<DeadManEvent>> {
        sqlx::query_as::<_, DbDeadManEvent>(
            r#"
            SELECT id, agent_id, trigger_type, action_taken, details, cascaded_to, resolved, created_at
            FROM deadman_events
            WHERE agent_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(agent.as_uuid())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?
        .into_iter()
        .map(DeadManEvent::try_from)
        .collect()
    }

    // ------------------------------------------------------------------- audit

    async fn append_audit(&self, draft: AuditDraft) -> Result<AuditEntry> {
        let mut dbtx = self.pool.begin().await.map_err(db)?;
        let entry = Self::append_audit_in_tx(&mut *dbtx, draft).await?;
        dbtx.commit().await.map_err(db)?;
        Ok(entry)
    }

    async fn audit_entries(
        &self,
        agent: Option<AgentId>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditEntry>> {
        let rows = if let Some(agent) = agent {
            sqlx::query_as::<_, DbAuditEntry>(
                r#"
                SELECT id, agent_id, action, resource, resource_id, decision, reasoning,
                       previous_hash, hash, created_at
                FROM audit_log
                WHERE agent_id = $1
                ORDER BY seq DESC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(agent.as_uuid())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(db)?
        } else {
            sqlx::query_as::<_, DbAuditEntry>(
                r#"
                SELECT id, agent_id, action, resource, resource_id, decision, reasoning,
                       previous_hash, hash, created_at
                FROM audit_log
                ORDER BY seq DESC
                LIMIT $1 OFFSET $2
                "#,
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(db)?
        };
        rows.into_iter().map(AuditEntry::try_from).collect()
    }

    async fn audit_for_resource(&self, resource_id: &str) -> Result<Vec<AuditEntry>> {
        sqlx::query_as::<_, DbAuditEntry>(
            r#"
            SELECT id, agent_id, action, resource, resource_id, decision, reasoning,
                   previous_hash, hash, created_at
            FROM audit_log
            WHERE resource_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(resource_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?
        .into_iter()
        .map(AuditEntry::try_from)
        .collect()
    }
}
