//! Error taxonomy
//!
//! One error enum shared across the workspace. Policy rejections inside the
//! admission path are *not* errors: they come back as persisted transactions
//! with a terminal status. Errors are reserved for the cases where nothing
//! was (or should have been) persisted, plus store/adapter failures.

use thiserror::Error;

/// Result type used throughout AgentWallet
pub type Result<T> = std::result::Result<T, WalletError>;

#[derive(Debug, Clone, Error)]
pub enum WalletError {
    // ========================================================================
    // Validation
    // ========================================================================

    /// Malformed or out-of-range input
    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    /// Rule params failed the per-kind schema check
    #[error("Invalid rule params for {kind}: {reason}")]
    InvalidRuleParams { kind: String, reason: String },

    /// Negative value where money is required
    #[error("Amount must be non-negative, got {value}")]
    NegativeAmount { value: String },

    /// Arithmetic overflow on a monetary value
    #[error("Amount overflow during arithmetic operation")]
    AmountOverflow,

    /// Subtraction would take a balance below zero
    #[error("Amount underflow during arithmetic operation")]
    AmountUnderflow,

    // ========================================================================
    // Access
    // ========================================================================

    /// Authenticated principal lacks the required scope
    #[error("Access denied: {reason}")]
    AccessDenied { reason: String },

    // ========================================================================
    // Not found
    // ========================================================================

    #[error("Owner {owner_id} not found")]
    OwnerNotFound { owner_id: String },

    #[error("Agent {agent_id} not found")]
    AgentNotFound { agent_id: String },

    #[error("Wallet {wallet_id} not found")]
    WalletNotFound { wallet_id: String },

    #[error("Transaction {transaction_id} not found")]
    TransactionNotFound { transaction_id: String },

    #[error("Spend rule {rule_id} not found")]
    RuleNotFound { rule_id: String },

    #[error("Kill switch {switch_id} not found")]
    KillSwitchNotFound { switch_id: String },

    #[error("Cross-agent policy {policy_id} not found")]
    PolicyNotFound { policy_id: String },

    #[error("Cross-agent transaction {transaction_id} not found")]
    CrossTransactionNotFound { transaction_id: String },

    #[error("Lineage for agent {agent_id} not found")]
    LineageNotFound { agent_id: String },

    #[error("Agent group {group_id} not found")]
    GroupNotFound { group_id: String },

    // ========================================================================
    // State conflicts
    // ========================================================================

    /// Operation illegal for the entity's current state
    #[error("State conflict on {resource}: {reason}")]
    StateConflict { resource: String, reason: String },

    /// A lineage row already exists for the would-be child
    #[error("Agent {agent_id} already has a lineage entry")]
    LineageExists { agent_id: String },

    // ========================================================================
    // Policy & funds
    // ========================================================================

    /// A governance check refused the request outside the admission path
    #[error("Blocked by policy: {reason}")]
    PolicyBlock { reason: String },

    #[error("Insufficient funds in wallet {wallet_id}: requested {requested}, available {available}")]
    InsufficientFunds {
        wallet_id: String,
        requested: String,
        available: String,
    },

    /// Wallet is latched by a kill switch, or the agent is halted
    #[error("Circuit latched for {resource}: {reason}")]
    CircuitLatched { resource: String, reason: String },

    // ========================================================================
    // Internal
    // ========================================================================

    /// Store surfaced an unexpected failure
    #[error("Store error: {message}")]
    Store { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl WalletError {
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn state_conflict(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StateConflict {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    pub fn access_denied(reason: impl Into<String>) -> Self {
        Self::AccessDenied {
            reason: reason.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::InvalidRuleParams { .. } => "INVALID_RULE_PARAMS",
            Self::NegativeAmount { .. } => "NEGATIVE_AMOUNT",
            Self::AmountOverflow => "AMOUNT_OVERFLOW",
            Self::AmountUnderflow => "AMOUNT_UNDERFLOW",
            Self::AccessDenied { .. } => "ACCESS_DENIED",
            Self::OwnerNotFound { .. } => "OWNER_NOT_FOUND",
            Self::AgentNotFound { .. } => "AGENT_NOT_FOUND",
            Self::WalletNotFound { .. } => "WALLET_NOT_FOUND",
            Self::TransactionNotFound { .. } => "TRANSACTION_NOT_FOUND",
            Self::RuleNotFound { .. } => "RULE_NOT_FOUND",
            Self::KillSwitchNotFound { .. } => "KILL_SWITCH_NOT_FOUND",
            Self::PolicyNotFound { .. } => "POLICY_NOT_FOUND",
            Self::CrossTransactionNotFound { .. } => "CROSS_TRANSACTION_NOT_FOUND",
            Self::LineageNotFound { .. } => "LINEAGE_NOT_FOUND",
            Self::GroupNotFound { .. } => "GROUP_NOT_FOUND",
            Self::StateConflict { .. } => "STATE_CONFLICT",
            Self::LineageExists { .. } => "LINEAGE_EXISTS",
            Self::PolicyBlock { .. } => "POLICY_BLOCK",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::CircuitLatched { .. } => "CIRCUIT_LATCHED",
            Self::Store { .. } => "STORE_ERROR",
            Self::Serialization { .. } => "SERIALIZATION_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Whether callers may retry without changing the request
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Store { .. } | Self::Internal { .. })
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = WalletError::InsufficientFunds {
            wallet_id: "w".to_string(),
            requested: "100.00".to_string(),
            available: "50.00".to_string(),
        };
        assert_eq!(err.error_code(), "INSUFFICIENT_FUNDS");
        assert!(!err.is_retriable());
        assert!(WalletError::store("down").is_retriable());
    }
}
