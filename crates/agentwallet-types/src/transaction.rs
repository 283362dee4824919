//! Transaction entity and candidate

use crate::{Money, TransactionId, WalletId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Category used for balance top-ups; excluded from spend aggregation
pub const DEPOSIT_CATEGORY: &str = "deposit";

/// Who is on the receiving end of a spend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientType {
    External,
    AgentWallet,
    Escrow,
}

/// Status of a transaction in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Approved,
    AwaitingApproval,
    Rejected,
    Completed,
    Failed,
    Cancelled,
    KillSwitched,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Rejected | Self::Failed | Self::Cancelled | Self::KillSwitched
        )
    }
}

/// A spend attempt as submitted, before admission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionCandidate {
    pub amount: Money,
    pub category: Option<String>,
    pub recipient_id: Option<String>,
    pub recipient_type: RecipientType,
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl TransactionCandidate {
    pub fn new(amount: Money) -> Self {
        Self {
            amount,
            category: None,
            recipient_id: None,
            recipient_type: RecipientType::External,
            description: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient_id = Some(recipient.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A persisted transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub wallet_id: WalletId,
    pub amount: Money,
    pub recipient_id: Option<String>,
    pub recipient_type: RecipientType,
    pub category: Option<String>,
    pub description: Option<String>,
    pub status: TransactionStatus,
    /// Full rule evaluation, serialized for the audit trail
    pub rule_check_results: serde_json::Value,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    /// Set iff status is Completed
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn from_candidate(wallet_id: WalletId, candidate: &TransactionCandidate) -> Self {
        Self {
            id: TransactionId::new(),
            wallet_id,
            amount: candidate.amount,
            recipient_id: candidate.recipient_id.clone(),
            recipient_type: candidate.recipient_type,
            category: candidate.category.clone(),
            description: candidate.description.clone(),
            status: TransactionStatus::Pending,
            rule_check_results: serde_json::Value::Null,
            metadata: candidate.metadata.clone(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_deposit(&self) -> bool {
        self.category.as_deref() == Some(DEPOSIT_CATEGORY)
    }

    /// Profit-and-loss attached by trading callers, if any
    ///
    /// Accepts both JSON numbers and decimal strings.
    pub fn pnl(&self) -> Option<Decimal> {
        match self.metadata.get("pnl")? {
            serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
            serde_json::Value::String(s) => Decimal::from_str(s).ok(),
            _ => None,
        }
    }

    /// Signal strength attached by signal-driven callers, if any
    pub fn signal_strength(&self) -> Option<&str> {
        self.metadata.get("signalStrength")?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_pnl_extraction() {
        let mut tx = Transaction::from_candidate(
            WalletId::new(),
            &TransactionCandidate::new(Money::from_major(10)),
        );
        assert_eq!(tx.pnl(), None);

        tx.metadata = json!({ "pnl": -12.5 });
        assert_eq!(tx.pnl(), Some(dec!(-12.5)));

        tx.metadata = json!({ "pnl": "3.25" });
        assert_eq!(tx.pnl(), Some(dec!(3.25)));
    }

    #[test]
    fn test_deposit_detection() {
        let candidate = TransactionCandidate::new(Money::from_major(5)).with_category("deposit");
        let tx = Transaction::from_candidate(WalletId::new(), &candidate);
        assert!(tx.is_deposit());
    }
}
