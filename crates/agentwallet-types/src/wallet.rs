//! Wallet entity

use crate::{AgentId, Money, WalletId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletStatus {
    Active,
    Frozen,
    Closed,
    KillSwitched,
}

impl WalletStatus {
    /// Only an active wallet may be debited
    pub fn can_debit(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// A balance-bearing ledger entry owned by exactly one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub agent_id: AgentId,
    /// Invariant: never negative after any completed debit
    pub balance: Money,
    pub currency: String,
    pub status: WalletStatus,
    pub created_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(agent_id: AgentId, currency: impl Into<String>) -> Self {
        Self {
            id: WalletId::new(),
            agent_id,
            balance: Money::zero(),
            currency: currency.into(),
            status: WalletStatus::Active,
            created_at: Utc::now(),
        }
    }
}
