//! Spend rules
//!
//! Rule kinds are a closed, tagged set. Each variant carries its own params
//! and is validated at creation; evaluation lives in the engine.

use crate::{Money, Result, RuleId, WalletError, WalletId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The closed set of rule kinds with their fixed param schemas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleKind {
    PerTransactionLimit { limit: Money },
    DailyLimit { limit: Money },
    WeeklyLimit { limit: Money },
    MonthlyLimit { limit: Money },
    CategoryWhitelist { categories: Vec<String> },
    CategoryBlacklist { categories: Vec<String> },
    RecipientWhitelist { recipients: Vec<String> },
    RecipientBlacklist { recipients: Vec<String> },
    /// Half-open UTC hour window [start_hour, end_hour); may wrap midnight
    TimeWindow { start_hour: u8, end_hour: u8 },
    /// Always passes; flags the transaction for approval above the threshold
    ApprovalThreshold { threshold: Money },
    SignalFilter { allowed_signals: Vec<String> },
}

impl RuleKind {
    /// Stable name, used in audit reasoning and API payloads
    pub fn name(&self) -> &'static str {
        match self {
            Self::PerTransactionLimit { .. } => "per_transaction_limit",
            Self::DailyLimit { .. } => "daily_limit",
            Self::WeeklyLimit { .. } => "weekly_limit",
            Self::MonthlyLimit { .. } => "monthly_limit",
            Self::CategoryWhitelist { .. } => "category_whitelist",
            Self::CategoryBlacklist { .. } => "category_blacklist",
            Self::RecipientWhitelist { .. } => "recipient_whitelist",
            Self::RecipientBlacklist { .. } => "recipient_blacklist",
            Self::TimeWindow { .. } => "time_window",
            Self::ApprovalThreshold { .. } => "approval_threshold",
            Self::SignalFilter { .. } => "signal_filter",
        }
    }

    /// Enforce the per-kind param schema
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::PerTransactionLimit { limit }
            | Self::DailyLimit { limit }
            | Self::WeeklyLimit { limit }
            | Self::MonthlyLimit { limit } => {
                if !limit.is_positive() {
                    return Err(WalletError::InvalidRuleParams {
                        kind: self.name().to_string(),
                        reason: "limit must be > 0".to_string(),
                    });
                }
            }
            Self::ApprovalThreshold { threshold } => {
                if !threshold.is_positive() {
                    return Err(WalletError::InvalidRuleParams {
                        kind: self.name().to_string(),
                        reason: "threshold must be > 0".to_string(),
                    });
                }
            }
            Self::CategoryWhitelist { categories } | Self::CategoryBlacklist { categories } => {
                if categories.is_empty() {
                    return Err(WalletError::InvalidRuleParams {
                        kind: self.name().to_string(),
                        reason: "categories must be non-empty".to_string(),
                    });
                }
            }
            Self::RecipientWhitelist { recipients } | Self::RecipientBlacklist { recipients } => {
                if recipients.is_empty() {
                    return Err(WalletError::InvalidRuleParams {
                        kind: self.name().to_string(),
                        reason: "recipients must be non-empty".to_string(),
                    });
                }
            }
            Self::TimeWindow {
                start_hour,
                end_hour,
            } => {
                if *start_hour > 23 || *end_hour > 23 {
                    return Err(WalletError::InvalidRuleParams {
                        kind: self.name().to_string(),
                        reason: "hours must be in 0..=23".to_string(),
                    });
                }
            }
            Self::SignalFilter { allowed_signals } => {
                if allowed_signals.is_empty() {
                    return Err(WalletError::InvalidRuleParams {
                        kind: self.name().to_string(),
                        reason: "allowed_signals must be non-empty".to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// A rule attached to a wallet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendRule {
    pub id: RuleId,
    pub wallet_id: WalletId,
    pub kind: RuleKind,
    pub active: bool,
    /// Higher priority evaluates first
    pub priority: i32,
    /// Set when the dead-man switch throttles a limit rule
    pub throttled: bool,
    pub created_at: DateTime<Utc>,
}

impl SpendRule {
    pub fn new(wallet_id: WalletId, kind: RuleKind, priority: i32) -> Result<Self> {
        kind.validate()?;
        Ok(Self {
            id: RuleId::new(),
            wallet_id,
            kind,
            active: true,
            priority,
            throttled: false,
            created_at: Utc::now(),
        })
    }
}

/// Outcome of evaluating one rule against one candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleCheck {
    pub rule_id: RuleId,
    pub kind: String,
    pub passed: bool,
    pub reason: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

/// Structured verdict from the rules engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleEvaluation {
    /// All blocking rules passed
    pub approved: bool,
    /// Any approval-threshold rule raised its flag
    pub requires_approval: bool,
    pub results: Vec<RuleCheck>,
    pub evaluated_at: DateTime<Utc>,
}

impl RuleEvaluation {
    /// Verdict with no rules configured: approved, no approval needed
    pub fn empty() -> Self {
        Self {
            approved: true,
            requires_approval: false,
            results: Vec::new(),
            evaluated_at: Utc::now(),
        }
    }

    /// Reasons of every failed rule, for audit and API payloads
    pub fn failure_reasons(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| !r.passed)
            .map(|r| r.reason.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_validation() {
        let kind = RuleKind::DailyLimit {
            limit: Money::zero(),
        };
        assert!(matches!(
            kind.validate(),
            Err(WalletError::InvalidRuleParams { .. })
        ));
        assert!(RuleKind::DailyLimit {
            limit: Money::from_major(100)
        }
        .validate()
        .is_ok());
    }

    #[test]
    fn test_hour_validation() {
        let kind = RuleKind::TimeWindow {
            start_hour: 9,
            end_hour: 24,
        };
        assert!(kind.validate().is_err());
        assert!(RuleKind::TimeWindow {
            start_hour: 22,
            end_hour: 4
        }
        .validate()
        .is_ok());
    }

    #[test]
    fn test_empty_list_validation() {
        let kind = RuleKind::CategoryWhitelist { categories: vec![] };
        assert!(kind.validate().is_err());
    }

    #[test]
    fn test_rule_creation_validates() {
        let result = SpendRule::new(
            WalletId::new(),
            RuleKind::SignalFilter {
                allowed_signals: vec![],
            },
            0,
        );
        assert!(result.is_err());
    }
}
