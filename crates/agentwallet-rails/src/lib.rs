//! AgentWallet Rails - External payment rail adapters
//!
//! The capability contract every rail adapter (card processor, on-chain
//! wallet, HTTP 402 proxy) must satisfy, plus the gateway that forces every
//! outbound `send` through the full admission path before any rail is
//! touched. A mock rail backs tests and the playground.

use std::collections::HashMap;
use std::sync::Arc;

use agentwallet_engine::AdmissionController;
use agentwallet_store::Store;
use agentwallet_types::{
    AgentId, Money, RecipientType, Result, TransactionCandidate, TransactionStatus, WalletError,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Outcome of a rail send
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RailReceipt {
    pub success: bool,
    /// Which gate blocked the send, when unsuccessful
    pub blocked_by: Option<String>,
    pub reason: Option<String>,
    /// Rail-side reference for a successful send
    pub reference: Option<String>,
}

impl RailReceipt {
    pub fn ok(reference: impl Into<String>) -> Self {
        Self {
            success: true,
            blocked_by: None,
            reason: None,
            reference: Some(reference.into()),
        }
    }

    pub fn blocked(gate: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            success: false,
            blocked_by: Some(gate.into()),
            reason: Some(reason.into()),
            reference: None,
        }
    }
}

/// Capability contract for an external payment rail
#[async_trait]
pub trait PaymentRail: Send + Sync {
    /// Provision rail-side custody for an agent
    async fn create_wallet(&self, agent: AgentId) -> Result<String>;

    /// Move funds on the rail. The gateway has already admitted the spend;
    /// implementations only talk to the rail.
    async fn send(
        &self,
        agent: AgentId,
        to_address: &str,
        amount: Money,
        currency: &str,
        purpose: &str,
        metadata: serde_json::Value,
    ) -> Result<RailReceipt>;

    /// Rail-side balance for an agent
    async fn get_balance(&self, agent: AgentId) -> Result<Money>;
}

/// Gates every rail send through admission before delegating
pub struct RailGateway {
    store: Arc<dyn Store>,
    admission: Arc<AdmissionController>,
    rail: Arc<dyn PaymentRail>,
}

impl RailGateway {
    pub fn new(
        store: Arc<dyn Store>,
        admission: Arc<AdmissionController>,
        rail: Arc<dyn PaymentRail>,
    ) -> Self {
        Self {
            store,
            admission,
            rail,
        }
    }

    /// Admit, then delegate to the rail. A blocked admission never reaches
    /// the rail.
    pub async fn send(
        &self,
        agent: AgentId,
        to_address: &str,
        amount: Money,
        currency: &str,
        purpose: &str,
        metadata: serde_json::Value,
    ) -> Result<RailReceipt> {
        let wallet = self
            .store
            .wallets_for_agent(agent)
            .await?
            .into_iter()
            .find(|w| w.currency == currency)
            .ok_or(WalletError::WalletNotFound {
                wallet_id: format!("{agent}/{currency}"),
            })?;

        let mut candidate = TransactionCandidate::new(amount)
            .with_category(purpose)
            .with_recipient(to_address)
            .with_metadata(metadata.clone());
        candidate.recipient_type = RecipientType::External;

        let outcome = self.admission.submit(wallet.id, candidate).await?;
        match outcome.status() {
            TransactionStatus::Completed => {
                info!(agent = %agent, to = to_address, amount = %amount, "rail send admitted");
                self.rail
                    .send(agent, to_address, amount, currency, purpose, metadata)
                    .await
            }
            TransactionStatus::AwaitingApproval => Ok(RailReceipt::blocked(
                "approval_threshold",
                format!(
                    "held for approval as transaction {}",
                    outcome.transaction.id
                ),
            )),
            TransactionStatus::KillSwitched => Ok(RailReceipt::blocked(
                "kill_switch",
                format!("wallet latched; transaction {}", outcome.transaction.id),
            )),
            _ => {
                let reason = outcome
                    .evaluation
                    .map(|e| e.failure_reasons().join("; "))
                    .filter(|r| !r.is_empty())
                    .or_else(|| {
                        outcome
                            .transaction
                            .metadata
                            .get("rejection_reason")
                            .and_then(|v| v.as_str())
                            .map(String::from)
                    })
                    .unwrap_or_else(|| "rejected".to_string());
                Ok(RailReceipt::blocked("rules", reason))
            }
        }
    }
}

/// In-memory rail for tests and the playground
#[derive(Default)]
pub struct MockRail {
    balances: RwLock<HashMap<AgentId, Money>>,
    sends: RwLock<Vec<(AgentId, String, Money)>>,
}

impl MockRail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fund(&self, agent: AgentId, amount: Money) {
        self.balances.write().insert(agent, amount);
    }

    pub fn sends(&self) -> Vec<(AgentId, String, Money)> {
        self.sends.read().clone()
    }
}

#[async_trait]
impl PaymentRail for MockRail {
    async fn create_wallet(&self, agent: AgentId) -> Result<String> {
        self.balances.write().entry(agent).or_insert(Money::zero());
        Ok(format!("mock:{agent}"))
    }

    async fn send(
        &self,
        agent: AgentId,
        to_address: &str,
        amount: Money,
        _currency: &str,
        _purpose: &str,
        _metadata: serde_json::Value,
    ) -> Result<RailReceipt> {
        let mut balances = self.balances.write();
        let balance = balances.entry(agent).or_insert(Money::zero());
        *balance = balance.checked_sub(amount).unwrap_or(Money::zero());
        drop(balances);
        self.sends
            .write()
            .push((agent, to_address.to_string(), amount));
        Ok(RailReceipt::ok(format!("mock-tx-{}", uuid::Uuid::new_v4())))
    }

    async fn get_balance(&self, agent: AgentId) -> Result<Money> {
        Ok(self
            .balances
            .read()
            .get(&agent)
            .copied()
            .unwrap_or(Money::zero()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentwallet_engine::{Engine, TracingNotifier};
    use agentwallet_store::MemStore;
    use agentwallet_types::{Agent, OwnerId, RuleKind, SpendRule, Wallet};

    async fn gateway(balance: u64, rules: Vec<RuleKind>) -> (RailGateway, Arc<MockRail>, AgentId) {
        let store = Arc::new(MemStore::new());
        let agent = Agent::new(OwnerId::new(), "rail-test", "key".to_string());
        let mut wallet = Wallet::new(agent.id, "USD");
        wallet.balance = Money::from_major(balance);
        store.create_agent(&agent).await.unwrap();
        store.create_wallet(&wallet).await.unwrap();
        for kind in rules {
            let rule = SpendRule::new(wallet.id, kind, 0).unwrap();
            store.create_rule(&rule).await.unwrap();
        }

        let engine = Engine::new(store.clone(), Arc::new(TracingNotifier));
        let rail = Arc::new(MockRail::new());
        rail.fund(agent.id, Money::from_major(balance));
        (
            RailGateway::new(store, engine.admission, rail.clone()),
            rail,
            agent.id,
        )
    }

    #[tokio::test]
    async fn test_admitted_send_reaches_rail() {
        let (gateway, rail, agent) = gateway(100, vec![]).await;
        let receipt = gateway
            .send(
                agent,
                "acct-42",
                Money::from_major(30),
                "USD",
                "api",
                serde_json::json!({}),
            )
            .await
            .unwrap();
        assert!(receipt.success);
        assert_eq!(rail.sends().len(), 1);
    }

    #[tokio::test]
    async fn test_blocked_send_never_reaches_rail() {
        let (gateway, rail, agent) = gateway(
            100,
            vec![RuleKind::PerTransactionLimit {
                limit: Money::from_major(10),
            }],
        )
        .await;
        let receipt = gateway
            .send(
                agent,
                "acct-42",
                Money::from_major(30),
                "USD",
                "api",
                serde_json::json!({}),
            )
            .await
            .unwrap();
        assert!(!receipt.success);
        assert_eq!(receipt.blocked_by.as_deref(), Some("rules"));
        assert!(rail.sends().is_empty());
    }
}
