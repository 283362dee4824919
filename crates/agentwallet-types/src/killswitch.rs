//! Kill switch entity
//!
//! A per-wallet latching circuit breaker. Trigger evaluation lives in the
//! engine; this module is the persisted shape and the latch/reset state
//! machine it must respect.

use crate::{KillSwitchId, Money, WalletId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trigger condition kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KillSwitchKind {
    /// (peak - current) / peak >= threshold, peak reconstructed from
    /// completed transactions in the window
    DrawdownPercent { threshold: Decimal },
    /// Sum of realized losses in the window >= threshold
    LossAmount { threshold: Money },
    /// Trailing streak of losing trading transactions >= threshold
    ConsecutiveLosses { threshold: u32 },
    /// Sum of realized losses since start of day >= threshold
    DailyLossLimit { threshold: Money },
}

impl KillSwitchKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::DrawdownPercent { .. } => "drawdown_percent",
            Self::LossAmount { .. } => "loss_amount",
            Self::ConsecutiveLosses { .. } => "consecutive_losses",
            Self::DailyLossLimit { .. } => "daily_loss_limit",
        }
    }
}

/// A circuit breaker attached to a wallet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillSwitch {
    pub id: KillSwitchId,
    pub wallet_id: WalletId,
    pub kind: KillSwitchKind,
    /// Lookback window for history-based triggers; ignored by DailyLossLimit
    pub window_hours: u32,
    pub active: bool,
    pub triggered: bool,
    pub triggered_at: Option<DateTime<Utc>>,
    /// Set by the operator on reset; a triggered switch with no reset keeps blocking
    pub reset_at: Option<DateTime<Utc>>,
    /// Observed value at trigger time (drawdown ratio, loss sum, streak length)
    pub current_value: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl KillSwitch {
    pub fn new(wallet_id: WalletId, kind: KillSwitchKind, window_hours: u32) -> Self {
        Self {
            id: KillSwitchId::new(),
            wallet_id,
            kind,
            window_hours,
            active: true,
            triggered: false,
            triggered_at: None,
            reset_at: None,
            current_value: None,
            created_at: Utc::now(),
        }
    }

    /// A latched switch blocks all new transactions until reset
    pub fn is_latched(&self) -> bool {
        self.triggered && self.reset_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_latch_state() {
        let mut switch = KillSwitch::new(
            WalletId::new(),
            KillSwitchKind::DrawdownPercent {
                threshold: dec!(0.2),
            },
            24,
        );
        assert!(!switch.is_latched());

        switch.triggered = true;
        switch.triggered_at = Some(Utc::now());
        assert!(switch.is_latched());

        switch.reset_at = Some(Utc::now());
        assert!(!switch.is_latched());
    }
}
