//! Kill switch engine
//!
//! Pre-checks latched state, evaluates trigger conditions against ledger
//! history, and latches on firing. Latching is atomic with the wallet
//! status change and the audit entry (one store unit of work). A latched
//! switch keeps blocking until an operator resets it.

use agentwallet_store::Store;
use agentwallet_types::{
    actions, AgentStatus, AuditDecision, AuditDraft, KillSwitch, KillSwitchId, KillSwitchKind,
    Result, Transaction, Wallet, WalletError, WalletId, WalletStatus,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use crate::windows::start_of_day;

/// How far back the trailing-streak scan looks
const STREAK_SCAN_LIMIT: i64 = 500;

#[derive(Clone)]
pub struct KillSwitchEngine {
    store: Arc<dyn Store>,
}

impl KillSwitchEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Any switch already latched on this wallet
    pub async fn latched(&self, wallet: WalletId) -> Result<Option<KillSwitch>> {
        Ok(self
            .store
            .kill_switches_for_wallet(wallet)
            .await?
            .into_iter()
            .find(|s| s.is_latched()))
    }

    /// Evaluate every active, untriggered switch; latch and return the first
    /// that fires. `blocked_tx` is persisted in the same unit of work.
    pub async fn check_and_latch(
        &self,
        wallet: &Wallet,
        blocked_tx: Option<&Transaction>,
        at: DateTime<Utc>,
    ) -> Result<Option<KillSwitch>> {
        let switches = self.store.kill_switches_for_wallet(wallet.id).await?;
        for switch in switches {
            if !switch.active || switch.is_latched() {
                continue;
            }
            if let Some(observed) = self.observe(&switch, wallet, at).await? {
                let mut latched = switch.clone();
                latched.triggered = true;
                latched.triggered_at = Some(at);
                latched.reset_at = None;
                latched.current_value = Some(observed);

                warn!(
                    wallet = %wallet.id,
                    switch = %latched.id,
                    kind = latched.kind.name(),
                    observed = %observed,
                    "kill switch fired, latching wallet"
                );

                let draft = AuditDraft::new(
                    Some(wallet.agent_id),
                    actions::KILLSWITCH_TRIGGERED,
                    "kill_switch",
                    latched.id.to_string(),
                    AuditDecision::Blocked,
                    json!({
                        "kind": latched.kind.name(),
                        "observed": observed,
                        "wallet_id": wallet.id.to_string(),
                        "blocked_transaction": blocked_tx.map(|t| t.id.to_string()),
                    }),
                );
                self.store
                    .latch_kill_switch(&latched, blocked_tx, draft)
                    .await?;
                return Ok(Some(latched));
            }
        }
        Ok(None)
    }

    /// Evaluate one switch. Returns the observed value when the trigger
    /// condition holds, None otherwise.
    ///
    /// A reset re-arms the switch: history up to `reset_at` is treated as
    /// acknowledged and excluded, otherwise the condition that latched the
    /// switch would re-fire on the very next admission.
    async fn observe(
        &self,
        switch: &KillSwitch,
        wallet: &Wallet,
        at: DateTime<Utc>,
    ) -> Result<Option<Decimal>> {
        let rearm = |since: DateTime<Utc>| match switch.reset_at {
            Some(reset_at) if reset_at > since => reset_at,
            _ => since,
        };
        match &switch.kind {
            KillSwitchKind::DrawdownPercent { threshold } => {
                let since = rearm(at - Duration::hours(i64::from(switch.window_hours)));
                let history = self.store.completed_since(wallet.id, since).await?;

                // Replay backwards from the current balance to reconstruct
                // the balance before each transaction; peak is the maximum
                // of all reconstructed points.
                let current = wallet.balance.as_decimal();
                let mut running = current;
                let mut peak = current;
                for tx in history.iter().rev() {
                    if tx.is_deposit() {
                        running -= tx.amount.as_decimal();
                    } else {
                        running += tx.amount.as_decimal();
                    }
                    if running > peak {
                        peak = running;
                    }
                }

                if peak <= Decimal::ZERO {
                    return Ok(None);
                }
                let drawdown = (peak - current) / peak;
                Ok((drawdown >= *threshold).then_some(drawdown))
            }
            KillSwitchKind::LossAmount { threshold } => {
                let since = rearm(at - Duration::hours(i64::from(switch.window_hours)));
                let losses = self.realized_losses(wallet.id, since).await?;
                Ok((losses >= threshold.as_decimal()).then_some(losses))
            }
            KillSwitchKind::DailyLossLimit { threshold } => {
                let losses = self
                    .realized_losses(wallet.id, rearm(start_of_day(at)))
                    .await?;
                Ok((losses >= threshold.as_decimal()).then_some(losses))
            }
            KillSwitchKind::ConsecutiveLosses { threshold } => {
                let recent = self
                    .store
                    .recent_completed(wallet.id, STREAK_SCAN_LIMIT)
                    .await?;
                let mut streak = 0u32;
                for tx in recent
                    .iter()
                    .filter(|t| t.category.as_deref() == Some("trading"))
                    .filter(|t| switch.reset_at.map(|r| t.created_at > r).unwrap_or(true))
                {
                    match tx.pnl() {
                        Some(pnl) if pnl < Decimal::ZERO => streak += 1,
                        _ => break,
                    }
                }
                Ok((streak >= *threshold)
                    .then(|| Decimal::from_u32(streak).unwrap_or_default()))
            }
        }
    }

    /// Sum of max(0, -pnl) over completed transactions since the cutoff
    async fn realized_losses(&self, wallet: WalletId, since: DateTime<Utc>) -> Result<Decimal> {
        let history = self.store.completed_since(wallet, since).await?;
        Ok(history
            .iter()
            .filter_map(|t| t.pnl())
            .filter(|pnl| *pnl < Decimal::ZERO)
            .map(|pnl| -pnl)
            .sum())
    }

    /// Operator reset: clear the latch and restore the wallet to Active
    pub async fn reset(&self, switch_id: KillSwitchId, at: DateTime<Utc>) -> Result<KillSwitch> {
        let mut switch =
            self.store
                .kill_switch(switch_id)
                .await?
                .ok_or(WalletError::KillSwitchNotFound {
                    switch_id: switch_id.to_string(),
                })?;
        if !switch.triggered {
            return Err(WalletError::state_conflict(
                "kill_switch",
                "switch is not triggered",
            ));
        }

        switch.triggered = false;
        switch.triggered_at = None;
        switch.current_value = None;
        switch.reset_at = Some(at);
        self.store.update_kill_switch(&switch).await?;
        self.store
            .set_wallet_status(switch.wallet_id, WalletStatus::Active)
            .await?;

        let wallet = self.store.wallet(switch.wallet_id).await?;
        self.store
            .append_audit(AuditDraft::new(
                wallet.map(|w| w.agent_id),
                actions::KILLSWITCH_RESET,
                "kill_switch",
                switch.id.to_string(),
                AuditDecision::System,
                json!({ "wallet_id": switch.wallet_id.to_string() }),
            ))
            .await?;
        Ok(switch)
    }

    /// Owner-forced stop: wallet to KillSwitched, agent to Killed, no
    /// trigger evaluation
    pub async fn emergency_stop(&self, wallet: WalletId) -> Result<()> {
        let wallet = self
            .store
            .wallet(wallet)
            .await?
            .ok_or_else(|| WalletError::WalletNotFound {
                wallet_id: wallet.to_string(),
            })?;
        self.store
            .set_wallet_status(wallet.id, WalletStatus::KillSwitched)
            .await?;
        self.store
            .set_agent_status(wallet.agent_id, AgentStatus::Killed)
            .await?;
        self.store
            .append_audit(AuditDraft::new(
                Some(wallet.agent_id),
                actions::EMERGENCY_STOP,
                "wallet",
                wallet.id.to_string(),
                AuditDecision::System,
                json!({ "agent_id": wallet.agent_id.to_string() }),
            ))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentwallet_store::MemStore;
    use agentwallet_types::{Agent, Money, OwnerId, TransactionCandidate, TransactionStatus};
    use rust_decimal_macros::dec;

    async fn setup(balance: u64) -> (Arc<MemStore>, KillSwitchEngine, Wallet) {
        let store = Arc::new(MemStore::new());
        let agent = Agent::new(OwnerId::new(), "ks-test", "key".to_string());
        let mut wallet = Wallet::new(agent.id, "USD");
        wallet.balance = Money::from_major(balance);
        store.create_agent(&agent).await.unwrap();
        store.create_wallet(&wallet).await.unwrap();
        (store.clone(), KillSwitchEngine::new(store), wallet)
    }

    async fn completed_tx(
        store: &MemStore,
        wallet: WalletId,
        amount: Money,
        category: &str,
        metadata: serde_json::Value,
    ) {
        let mut tx = Transaction::from_candidate(
            wallet,
            &TransactionCandidate::new(amount)
                .with_category(category)
                .with_metadata(metadata),
        );
        tx.status = TransactionStatus::Completed;
        tx.completed_at = Some(Utc::now());
        store.insert_transaction(&tx).await.unwrap();
    }

    #[tokio::test]
    async fn test_drawdown_reconstructs_peak() {
        let (store, engine, wallet) = setup(1000).await;
        // One completed spend of 500 in the window: peak = 1500,
        // drawdown = 500/1500 = 0.333
        completed_tx(&store, wallet.id, Money::from_major(500), "trading", json!({})).await;

        let switch = KillSwitch::new(
            wallet.id,
            KillSwitchKind::DrawdownPercent {
                threshold: dec!(0.20),
            },
            24,
        );
        store.create_kill_switch(&switch).await.unwrap();

        let latched = engine
            .check_and_latch(&wallet, None, Utc::now())
            .await
            .unwrap();
        let latched = latched.expect("drawdown should fire");
        assert!(latched.triggered);
        assert!(latched.current_value.unwrap() > dec!(0.33));

        let stored = store.wallet(wallet.id).await.unwrap().unwrap();
        assert_eq!(stored.status, WalletStatus::KillSwitched);
    }

    #[tokio::test]
    async fn test_drawdown_below_threshold_does_not_fire() {
        let (store, engine, wallet) = setup(1000).await;
        completed_tx(&store, wallet.id, Money::from_major(100), "trading", json!({})).await;

        let switch = KillSwitch::new(
            wallet.id,
            KillSwitchKind::DrawdownPercent {
                threshold: dec!(0.20),
            },
            24,
        );
        store.create_kill_switch(&switch).await.unwrap();

        // drawdown = 100/1100 ≈ 0.09
        assert!(engine
            .check_and_latch(&wallet, None, Utc::now())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_consecutive_losses_trailing_streak() {
        let (store, engine, wallet) = setup(1000).await;
        // win, then three losses: trailing streak is 3
        completed_tx(&store, wallet.id, Money::from_major(10), "trading", json!({"pnl": 5})).await;
        for _ in 0..3 {
            completed_tx(&store, wallet.id, Money::from_major(10), "trading", json!({"pnl": -2}))
                .await;
        }

        let switch = KillSwitch::new(
            wallet.id,
            KillSwitchKind::ConsecutiveLosses { threshold: 3 },
            24,
        );
        store.create_kill_switch(&switch).await.unwrap();

        let latched = engine
            .check_and_latch(&wallet, None, Utc::now())
            .await
            .unwrap();
        assert!(latched.is_some());
    }

    #[tokio::test]
    async fn test_loss_amount_sums_negative_pnl() {
        let (store, engine, wallet) = setup(1000).await;
        completed_tx(&store, wallet.id, Money::from_major(10), "trading", json!({"pnl": -30.5}))
            .await;
        completed_tx(&store, wallet.id, Money::from_major(10), "trading", json!({"pnl": 10}))
            .await;
        completed_tx(&store, wallet.id, Money::from_major(10), "trading", json!({"pnl": -20}))
            .await;

        let switch = KillSwitch::new(
            wallet.id,
            KillSwitchKind::LossAmount {
                threshold: Money::from_major(50),
            },
            24,
        );
        store.create_kill_switch(&switch).await.unwrap();

        let latched = engine
            .check_and_latch(&wallet, None, Utc::now())
            .await
            .unwrap();
        let latched = latched.expect("losses of 50.5 cross the 50 threshold");
        assert_eq!(latched.current_value.unwrap(), dec!(50.5));
    }

    #[tokio::test]
    async fn test_reset_restores_wallet() {
        let (store, engine, wallet) = setup(1000).await;
        completed_tx(&store, wallet.id, Money::from_major(500), "trading", json!({})).await;

        let switch = KillSwitch::new(
            wallet.id,
            KillSwitchKind::DrawdownPercent {
                threshold: dec!(0.20),
            },
            24,
        );
        store.create_kill_switch(&switch).await.unwrap();
        let latched = engine
            .check_and_latch(&wallet, None, Utc::now())
            .await
            .unwrap()
            .unwrap();

        let reset = engine.reset(latched.id, Utc::now()).await.unwrap();
        assert!(!reset.triggered);
        assert!(reset.reset_at.is_some());
        assert_eq!(
            store.wallet(wallet.id).await.unwrap().unwrap().status,
            WalletStatus::Active
        );

        // Pre-reset history is acknowledged; the switch does not re-fire
        assert!(engine
            .check_and_latch(&wallet, None, Utc::now())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_emergency_stop() {
        let (store, engine, wallet) = setup(100).await;
        engine.emergency_stop(wallet.id).await.unwrap();

        assert_eq!(
            store.wallet(wallet.id).await.unwrap().unwrap().status,
            WalletStatus::KillSwitched
        );
        let agent = store.agent(wallet.agent_id).await.unwrap().unwrap();
        assert_eq!(agent.status, AgentStatus::Killed);
    }
}
