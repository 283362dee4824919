//! Dead-man switch
//!
//! Per-agent liveness, velocity and spend-anomaly monitor. The synchronous
//! gate runs inside every admission; the background sweep catches missed
//! heartbeats. In-process state (frozen set, heartbeat map, per-agent
//! timestamp/vendor windows) sits behind one lock and is rebuilt from
//! traffic after a restart — the event log remains the source of truth, and
//! the gap until maps repopulate is an accepted degradation window.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use agentwallet_store::Store;
use agentwallet_types::{
    actions, AgentId, AgentStatus, AuditDecision, AuditDraft, DeadManAction, DeadManConfig,
    DeadManEvent, DeadManEventId, DeadManTrigger, LineageStatus, Money, Result, RuleKind,
    WalletError,
};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, warn};

use crate::notify::{notify_best_effort, Notification, Notifier};

/// In-process window retention
const WINDOW_RETENTION: Duration = Duration::hours(1);
/// Background sweep period
pub const SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(10);
/// Throttle factor applied to daily limits
const THROTTLE_FACTOR: &str = "0.1";

/// Gate verdict for one candidate transaction
#[derive(Debug, Clone)]
pub enum DeadManVerdict {
    Allowed,
    Blocked {
        trigger: DeadManTrigger,
        action: DeadManAction,
        reason: String,
    },
}

impl DeadManVerdict {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }
}

/// Response to a heartbeat call
#[derive(Debug, Clone, serde::Serialize)]
pub struct HeartbeatResponse {
    /// When set, the agent must cease all transactions
    pub cease: bool,
    pub next_deadline: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct AgentWindow {
    timestamps: VecDeque<DateTime<Utc>>,
    vendors: VecDeque<(DateTime<Utc>, String)>,
}

impl AgentWindow {
    fn prune(&mut self, at: DateTime<Utc>) {
        let cutoff = at - WINDOW_RETENTION;
        while self.timestamps.front().is_some_and(|t| *t < cutoff) {
            self.timestamps.pop_front();
        }
        while self.vendors.front().is_some_and(|(t, _)| *t < cutoff) {
            self.vendors.pop_front();
        }
    }
}

#[derive(Default)]
struct State {
    frozen: HashSet<AgentId>,
    heartbeats: HashMap<AgentId, DateTime<Utc>>,
    windows: HashMap<AgentId, AgentWindow>,
}

pub struct DeadManSwitch {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    state: RwLock<State>,
}

impl DeadManSwitch {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            notifier,
            state: RwLock::new(State::default()),
        }
    }

    /// Register (or reconfigure) monitoring for an agent
    pub async fn register(&self, config: DeadManConfig) -> Result<()> {
        self.store.upsert_deadman_config(&config).await?;
        self.state
            .write()
            .heartbeats
            .insert(config.agent_id, Utc::now());
        info!(agent = %config.agent_id, "dead-man switch registered");
        Ok(())
    }

    pub fn is_frozen(&self, agent: AgentId) -> bool {
        self.state.read().frozen.contains(&agent)
    }

    /// Agent liveness ping
    pub async fn heartbeat(&self, agent: AgentId, at: DateTime<Utc>) -> Result<HeartbeatResponse> {
        let config =
            self.store
                .deadman_config(agent)
                .await?
                .ok_or_else(|| WalletError::state_conflict(
                    "deadman",
                    format!("agent {agent} is not registered"),
                ))?;

        let mut state = self.state.write();
        if state.frozen.contains(&agent) {
            return Ok(HeartbeatResponse {
                cease: true,
                next_deadline: None,
            });
        }
        state.heartbeats.insert(agent, at);
        Ok(HeartbeatResponse {
            cease: false,
            next_deadline: Some(at + Duration::seconds(config.heartbeat_interval_seconds as i64)),
        })
    }

    /// Synchronous pre-transaction gate
    pub async fn evaluate(
        &self,
        agent: AgentId,
        amount: Money,
        vendor: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<DeadManVerdict> {
        let Some(config) = self.store.deadman_config(agent).await? else {
            return Ok(DeadManVerdict::Allowed);
        };

        // 1. Frozen agents are blocked outright
        if self.is_frozen(agent) {
            return Ok(DeadManVerdict::Blocked {
                trigger: DeadManTrigger::Manual,
                action: DeadManAction::Freeze,
                reason: "agent is frozen".to_string(),
            });
        }

        // 2. Velocity: transactions in the last 60 seconds
        let (recent_count, window_vendors) = {
            let mut state = self.state.write();
            let window = state.windows.entry(agent).or_default();
            window.prune(at);
            let minute_ago = at - Duration::seconds(60);
            let count = window
                .timestamps
                .iter()
                .filter(|t| **t >= minute_ago)
                .count() as u32;
            let vendors: HashSet<String> =
                window.vendors.iter().map(|(_, v)| v.clone()).collect();
            (count, vendors)
        };

        if recent_count >= config.max_tx_per_minute {
            let reason = format!(
                "{recent_count} transactions in the last minute (cap {})",
                config.max_tx_per_minute
            );
            self.trigger(
                &config,
                DeadManTrigger::Velocity,
                config.on_anomaly,
                &reason,
                at,
            )
            .await?;
            return Ok(DeadManVerdict::Blocked {
                trigger: DeadManTrigger::Velocity,
                action: config.on_anomaly,
                reason,
            });
        }

        // 3. Vendor diversity: unique vendors in the last hour, in-process
        //    window joined with store history
        if let Some(vendor) = vendor {
            let mut unique: HashSet<String> = self
                .store
                .recent_vendors(agent, at - WINDOW_RETENTION)
                .await?
                .into_iter()
                .collect();
            unique.extend(window_vendors);
            unique.insert(vendor.to_string());

            if unique.len() as u32 > config.max_unique_vendors_per_hour {
                let reason = format!(
                    "{} unique vendors in the last hour (cap {})",
                    unique.len(),
                    config.max_unique_vendors_per_hour
                );
                self.trigger(
                    &config,
                    DeadManTrigger::VendorDiversity,
                    config.on_anomaly,
                    &reason,
                    at,
                )
                .await?;
                return Ok(DeadManVerdict::Blocked {
                    trigger: DeadManTrigger::VendorDiversity,
                    action: config.on_anomaly,
                    reason,
                });
            }
        }

        // 4. Spend anomaly against the rolling baseline
        if let Some(reason) = self.spend_anomaly(&config, agent, amount, at).await? {
            self.trigger(
                &config,
                DeadManTrigger::SpendAnomaly,
                config.on_anomaly,
                &reason,
                at,
            )
            .await?;
            if config.on_anomaly.blocks() {
                return Ok(DeadManVerdict::Blocked {
                    trigger: DeadManTrigger::SpendAnomaly,
                    action: config.on_anomaly,
                    reason,
                });
            }
        }

        // 5. Record and allow
        let mut state = self.state.write();
        let window = state.windows.entry(agent).or_default();
        window.timestamps.push_back(at);
        if let Some(vendor) = vendor {
            window.vendors.push_back((at, vendor.to_string()));
        }
        Ok(DeadManVerdict::Allowed)
    }

    /// Current-window spend and transaction count versus the means of up to
    /// 7 preceding non-empty equal-width windows
    async fn spend_anomaly(
        &self,
        config: &DeadManConfig,
        agent: AgentId,
        amount: Money,
        at: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let width = Duration::minutes(i64::from(config.anomaly_window_minutes));
        if width.is_zero() {
            return Ok(None);
        }

        let (window_spend, window_count) = self.agent_window_stats(agent, at - width, at).await?;
        let current_spend = window_spend
            .checked_add(amount.as_decimal())
            .unwrap_or(Decimal::MAX);
        let current_count = window_count + 1;

        let mut spend_baselines = Vec::new();
        let mut count_baselines = Vec::new();
        for i in 1..=7 {
            let to = at - width * i;
            let from = to - width;
            let (spent, count) = self.agent_window_stats(agent, from, to).await?;
            if spent > Decimal::ZERO {
                spend_baselines.push(spent);
            }
            if count > 0 {
                count_baselines.push(count);
            }
        }

        if !spend_baselines.is_empty() {
            let baseline: Decimal =
                spend_baselines.iter().sum::<Decimal>() / Decimal::from(spend_baselines.len());
            let multiplier =
                Decimal::from_f64(config.anomaly_spend_multiplier).unwrap_or(Decimal::MAX);
            if baseline > Decimal::ZERO && current_spend > baseline * multiplier {
                return Ok(Some(format!(
                    "window spend {current_spend:.2} exceeds {}x baseline {baseline:.2}",
                    config.anomaly_spend_multiplier
                )));
            }
        }

        if !count_baselines.is_empty() {
            let baseline =
                count_baselines.iter().sum::<u64>() as f64 / count_baselines.len() as f64;
            if baseline > 0.0 && current_count as f64 > baseline * config.anomaly_tx_count_multiplier
            {
                return Ok(Some(format!(
                    "window count {current_count} exceeds {}x baseline {baseline:.1}",
                    config.anomaly_tx_count_multiplier
                )));
            }
        }

        Ok(None)
    }

    /// (spend, count) of completed non-deposit transactions across the
    /// agent's wallets in [from, to)
    async fn agent_window_stats(
        &self,
        agent: AgentId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<(Decimal, u64)> {
        let mut total = Decimal::ZERO;
        let mut count = 0u64;
        for wallet in self.store.wallets_for_agent(agent).await? {
            for tx in self.store.completed_since(wallet.id, from).await? {
                if tx.created_at < to && !tx.is_deposit() {
                    total += tx.amount.as_decimal();
                    count += 1;
                }
            }
        }
        Ok((total, count))
    }

    /// Apply the action ladder and record the event
    async fn trigger(
        &self,
        config: &DeadManConfig,
        trigger: DeadManTrigger,
        action: DeadManAction,
        details: &str,
        at: DateTime<Utc>,
    ) -> Result<DeadManEvent> {
        let agent = config.agent_id;
        warn!(agent = %agent, ?trigger, ?action, "dead-man switch triggered: {details}");

        let cascaded = match action {
            DeadManAction::Alert => Vec::new(),
            DeadManAction::Throttle => {
                self.throttle_daily_limits(agent).await?;
                Vec::new()
            }
            DeadManAction::Freeze => {
                self.freeze_tree(agent, config.cascade_to_children, false)
                    .await?
            }
            DeadManAction::Terminate => {
                self.freeze_tree(agent, config.cascade_to_children, true)
                    .await?
            }
        };

        let event = DeadManEvent {
            id: DeadManEventId::new(),
            agent_id: agent,
            trigger,
            action_taken: action,
            details: details.to_string(),
            cascaded_to: cascaded.clone(),
            resolved: false,
            created_at: at,
        };
        self.store.append_deadman_event(&event).await?;
        self.store
            .append_audit(AuditDraft::new(
                Some(agent),
                actions::DEADMAN_TRIGGERED,
                "agent",
                agent.to_string(),
                AuditDecision::Blocked,
                json!({
                    "trigger": trigger,
                    "action": action,
                    "details": details,
                    "cascaded_to": cascaded.iter().map(|a| a.to_string()).collect::<Vec<_>>(),
                }),
            ))
            .await?;

        notify_best_effort(
            &self.notifier,
            Notification::new(Some(agent), "deadman.triggered", details.to_string()),
        )
        .await;
        Ok(event)
    }

    /// Multiply every active daily limit on the agent's wallets by the
    /// throttle factor and mark the rules throttled
    async fn throttle_daily_limits(&self, agent: AgentId) -> Result<()> {
        let factor: Decimal = THROTTLE_FACTOR.parse().expect("static factor parses");
        for mut rule in self.store.rules_for_agent(agent).await? {
            if !rule.active || rule.throttled {
                continue;
            }
            if let RuleKind::DailyLimit { limit } = &rule.kind {
                let reduced = limit.scaled(factor)?;
                rule.kind = RuleKind::DailyLimit { limit: reduced };
                rule.throttled = true;
                self.store.update_rule(&rule).await?;
            }
        }
        Ok(())
    }

    /// Freeze (or terminate) an agent and, when cascading, every descendant
    /// in its lineage. Returns the descendants acted on.
    async fn freeze_tree(
        &self,
        agent: AgentId,
        cascade: bool,
        terminate: bool,
    ) -> Result<Vec<AgentId>> {
        let mut targets = vec![agent];
        if cascade {
            targets.extend(self.descendants(agent).await?);
        }

        for target in &targets {
            self.apply_halt(*target, terminate).await?;
        }
        self.state.write().frozen.extend(targets.iter().copied());

        Ok(targets.into_iter().filter(|t| *t != agent).collect())
    }

    async fn apply_halt(&self, agent: AgentId, terminate: bool) -> Result<()> {
        if let Some(existing) = self.store.agent(agent).await? {
            if existing.status.is_terminal() {
                return Ok(());
            }
            let status = if terminate {
                AgentStatus::Terminated
            } else {
                AgentStatus::Frozen
            };
            self.store.set_agent_status(agent, status).await?;
        }
        if terminate {
            if let Some(mut lineage) = self.store.lineage(agent).await? {
                lineage.status = LineageStatus::Terminated;
                self.store.upsert_lineage(&lineage).await?;
            }
        }
        Ok(())
    }

    async fn descendants(&self, agent: AgentId) -> Result<Vec<AgentId>> {
        let mut out = Vec::new();
        let mut stack = vec![agent];
        while let Some(id) = stack.pop() {
            if let Some(lineage) = self.store.lineage(id).await? {
                for child in lineage.children_ids {
                    out.push(child);
                    stack.push(child);
                }
            }
        }
        Ok(out)
    }

    /// Owner-forced freeze, independent of the configured manual action
    pub async fn force_freeze(&self, agent: AgentId, reason: &str) -> Result<DeadManEvent> {
        let config = self
            .store
            .deadman_config(agent)
            .await?
            .unwrap_or_else(|| DeadManConfig::new(agent));
        self.trigger(
            &config,
            DeadManTrigger::Manual,
            DeadManAction::Freeze,
            reason,
            Utc::now(),
        )
        .await
    }

    /// Owner-forced terminate; irreversible
    pub async fn force_terminate(&self, agent: AgentId, reason: &str) -> Result<DeadManEvent> {
        let config = self
            .store
            .deadman_config(agent)
            .await?
            .unwrap_or_else(|| DeadManConfig::new(agent));
        self.trigger(
            &config,
            DeadManTrigger::Manual,
            DeadManAction::Terminate,
            reason,
            Utc::now(),
        )
        .await
    }

    /// Owner-invoked trigger with the configured manual action
    pub async fn manual_trigger(&self, agent: AgentId, reason: &str) -> Result<DeadManEvent> {
        let config =
            self.store
                .deadman_config(agent)
                .await?
                .ok_or_else(|| WalletError::state_conflict(
                    "deadman",
                    format!("agent {agent} is not registered"),
                ))?;
        self.trigger(
            &config,
            DeadManTrigger::Manual,
            config.on_manual_trigger,
            reason,
            Utc::now(),
        )
        .await
    }

    /// Operator recovery; terminated agents are never recoverable
    pub async fn unfreeze(&self, agent: AgentId) -> Result<()> {
        if let Some(existing) = self.store.agent(agent).await? {
            if existing.status.is_terminal() {
                return Err(WalletError::state_conflict(
                    "agent",
                    "terminated agents cannot be recovered",
                ));
            }
            self.store
                .set_agent_status(agent, AgentStatus::Active)
                .await?;
        }
        self.state.write().frozen.remove(&agent);

        let event = DeadManEvent {
            id: DeadManEventId::new(),
            agent_id: agent,
            trigger: DeadManTrigger::Manual,
            action_taken: DeadManAction::Alert,
            details: "operator recovery".to_string(),
            cascaded_to: Vec::new(),
            resolved: true,
            created_at: Utc::now(),
        };
        self.store.append_deadman_event(&event).await?;
        self.store
            .append_audit(AuditDraft::new(
                Some(agent),
                actions::DEADMAN_RESOLVED,
                "agent",
                agent.to_string(),
                AuditDecision::System,
                json!({}),
            ))
            .await?;
        Ok(())
    }

    /// One pass over all monitored agents. Snapshots state first; no lock is
    /// held across store I/O.
    pub async fn sweep(&self, at: DateTime<Utc>) -> Result<()> {
        let configs = self.store.deadman_configs().await?;

        let (frozen, heartbeats) = {
            let state = self.state.read();
            (state.frozen.clone(), state.heartbeats.clone())
        };

        for config in configs {
            let agent = config.agent_id;
            if frozen.contains(&agent) {
                continue;
            }
            match heartbeats.get(&agent) {
                None => {
                    // First sighting since restart; start the clock now
                    self.state.write().heartbeats.insert(agent, at);
                }
                Some(last) => {
                    let deadline = config.heartbeat_deadline_seconds() as i64;
                    let silent = (at - *last).num_seconds();
                    if silent > deadline {
                        let reason = format!(
                            "no heartbeat for {silent}s (deadline {deadline}s)"
                        );
                        self.trigger(
                            &config,
                            DeadManTrigger::MissedHeartbeat,
                            config.on_missed_heartbeat,
                            &reason,
                            at,
                        )
                        .await?;
                        // Restart the clock so non-freezing actions do not
                        // re-fire every sweep
                        self.state.write().heartbeats.insert(agent, at);
                    }
                }
            }
        }
        Ok(())
    }

    /// Background sweep loop; exits when the shutdown signal flips
    pub async fn run_sweeper(
        self: Arc<Self>,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep(Utc::now()).await {
                        warn!("dead-man sweep failed: {err}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("dead-man sweeper shutting down");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::TracingNotifier;
    use agentwallet_store::MemStore;
    use agentwallet_types::{
        Agent, AgentLineage, Owner, OwnerId, SpendRule, Transaction, TransactionCandidate,
        TransactionStatus, Wallet,
    };

    struct Fixture {
        store: Arc<MemStore>,
        switch: Arc<DeadManSwitch>,
        agent: Agent,
        wallet: Wallet,
    }

    async fn fixture(config: impl FnOnce(&mut DeadManConfig)) -> Fixture {
        let store = Arc::new(MemStore::new());
        let owner = Owner {
            id: OwnerId::new(),
            api_key: "owner-key".to_string(),
            name: "owner".to_string(),
            contact: None,
            created_at: Utc::now(),
        };
        let agent = Agent::new(owner.id, "dm-test", "agent-key".to_string());
        let mut wallet = Wallet::new(agent.id, "USD");
        wallet.balance = Money::from_major(1000);
        store.create_owner(&owner).await.unwrap();
        store.create_agent(&agent).await.unwrap();
        store.create_wallet(&wallet).await.unwrap();

        let switch = Arc::new(DeadManSwitch::new(store.clone(), Arc::new(TracingNotifier)));
        let mut cfg = DeadManConfig::new(agent.id);
        config(&mut cfg);
        switch.register(cfg).await.unwrap();

        Fixture {
            store,
            switch,
            agent,
            wallet,
        }
    }

    #[tokio::test]
    async fn test_velocity_blocks_at_cap() {
        let f = fixture(|c| {
            c.max_tx_per_minute = 3;
            c.on_anomaly = DeadManAction::Freeze;
        })
        .await;
        let at = Utc::now();

        for i in 0..3 {
            let verdict = f
                .switch
                .evaluate(f.agent.id, Money::from_major(1), None, at + Duration::seconds(i))
                .await
                .unwrap();
            assert!(!verdict.is_blocked(), "admission {i} should pass");
        }

        let verdict = f
            .switch
            .evaluate(f.agent.id, Money::from_major(1), None, at + Duration::seconds(3))
            .await
            .unwrap();
        assert!(verdict.is_blocked());
        assert!(f.switch.is_frozen(f.agent.id));
        let agent = f.store.agent(f.agent.id).await.unwrap().unwrap();
        assert_eq!(agent.status, AgentStatus::Frozen);
    }

    #[tokio::test]
    async fn test_vendor_diversity_joins_store_history() {
        let f = fixture(|c| {
            c.max_unique_vendors_per_hour = 2;
            c.max_tx_per_minute = 100;
            c.on_anomaly = DeadManAction::Freeze;
        })
        .await;

        for vendor in ["a", "b"] {
            let mut tx = Transaction::from_candidate(
                f.wallet.id,
                &TransactionCandidate::new(Money::from_major(1)).with_recipient(vendor),
            );
            tx.status = TransactionStatus::Completed;
            tx.completed_at = Some(Utc::now());
            f.store.insert_transaction(&tx).await.unwrap();
        }

        // A third distinct vendor crosses the cap of 2
        let verdict = f
            .switch
            .evaluate(f.agent.id, Money::from_major(1), Some("c"), Utc::now())
            .await
            .unwrap();
        assert!(verdict.is_blocked());
    }

    #[tokio::test]
    async fn test_spend_anomaly_alert_does_not_block() {
        let f = fixture(|c| {
            c.anomaly_window_minutes = 10;
            c.anomaly_spend_multiplier = 2.0;
            c.on_anomaly = DeadManAction::Alert;
            c.max_tx_per_minute = 100;
        })
        .await;
        let at = Utc::now();

        // A prior window with modest spend establishes the baseline
        let mut old = Transaction::from_candidate(
            f.wallet.id,
            &TransactionCandidate::new(Money::from_major(10)).with_category("api"),
        );
        old.status = TransactionStatus::Completed;
        old.created_at = at - Duration::minutes(15);
        old.completed_at = Some(old.created_at);
        f.store.insert_transaction(&old).await.unwrap();

        // Current candidate far above 2x baseline, but action is alert-only
        let verdict = f
            .switch
            .evaluate(f.agent.id, Money::from_major(500), None, at)
            .await
            .unwrap();
        assert!(!verdict.is_blocked());
        let events = f
            .store
            .deadman_events_for_agent(f.agent.id, 10)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action_taken, DeadManAction::Alert);
    }

    #[tokio::test]
    async fn test_throttle_reduces_daily_limits() {
        let f = fixture(|c| {
            c.anomaly_window_minutes = 10;
            c.anomaly_spend_multiplier = 2.0;
            c.on_anomaly = DeadManAction::Throttle;
            c.max_tx_per_minute = 100;
        })
        .await;
        let rule = SpendRule::new(
            f.wallet.id,
            RuleKind::DailyLimit {
                limit: Money::from_major(1000),
            },
            0,
        )
        .unwrap();
        f.store.create_rule(&rule).await.unwrap();

        let at = Utc::now();
        let mut old = Transaction::from_candidate(
            f.wallet.id,
            &TransactionCandidate::new(Money::from_major(10)).with_category("api"),
        );
        old.status = TransactionStatus::Completed;
        old.created_at = at - Duration::minutes(15);
        old.completed_at = Some(old.created_at);
        f.store.insert_transaction(&old).await.unwrap();

        f.switch
            .evaluate(f.agent.id, Money::from_major(500), None, at)
            .await
            .unwrap();

        let throttled = f.store.rule(rule.id).await.unwrap().unwrap();
        assert!(throttled.throttled);
        match throttled.kind {
            RuleKind::DailyLimit { limit } => assert_eq!(limit, Money::from_major(100)),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missed_heartbeat_boundary() {
        let f = fixture(|c| {
            c.heartbeat_interval_seconds = 10;
            c.missed_heartbeat_threshold = 3;
            c.on_missed_heartbeat = DeadManAction::Freeze;
        })
        .await;
        let registered_at = Utc::now();
        f.switch.heartbeat(f.agent.id, registered_at).await.unwrap();

        // Exactly at the 30s deadline: no trigger
        f.switch
            .sweep(registered_at + Duration::seconds(30))
            .await
            .unwrap();
        assert!(!f.switch.is_frozen(f.agent.id));

        // Strictly beyond: trigger
        f.switch
            .sweep(registered_at + Duration::seconds(31))
            .await
            .unwrap();
        assert!(f.switch.is_frozen(f.agent.id));
    }

    #[tokio::test]
    async fn test_freeze_cascades_to_descendants() {
        let f = fixture(|c| {
            c.cascade_to_children = true;
            c.on_manual_trigger = DeadManAction::Freeze;
        })
        .await;

        let child = Agent::new(f.agent.owner_id, "child", "child-key".to_string());
        let grandchild = Agent::new(f.agent.owner_id, "grandchild", "gc-key".to_string());
        f.store.create_agent(&child).await.unwrap();
        f.store.create_agent(&grandchild).await.unwrap();

        let mut root = AgentLineage::root(f.agent.id);
        root.children_ids.push(child.id);
        f.store.upsert_lineage(&root).await.unwrap();
        let mut child_lineage = AgentLineage::root(child.id);
        child_lineage.parent_id = Some(f.agent.id);
        child_lineage.root_id = f.agent.id;
        child_lineage.depth = 1;
        child_lineage.children_ids.push(grandchild.id);
        f.store.upsert_lineage(&child_lineage).await.unwrap();
        let mut gc_lineage = AgentLineage::root(grandchild.id);
        gc_lineage.parent_id = Some(child.id);
        gc_lineage.root_id = f.agent.id;
        gc_lineage.depth = 2;
        f.store.upsert_lineage(&gc_lineage).await.unwrap();

        let event = f.switch.manual_trigger(f.agent.id, "operator stop").await.unwrap();
        assert_eq!(event.cascaded_to.len(), 2);
        assert!(f.switch.is_frozen(child.id));
        assert!(f.switch.is_frozen(grandchild.id));
        assert_eq!(
            f.store.agent(grandchild.id).await.unwrap().unwrap().status,
            AgentStatus::Frozen
        );
    }

    #[tokio::test]
    async fn test_unfreeze_restores_agent() {
        let f = fixture(|c| {
            c.on_manual_trigger = DeadManAction::Freeze;
        })
        .await;
        f.switch.manual_trigger(f.agent.id, "stop").await.unwrap();
        assert!(f.switch.is_frozen(f.agent.id));

        f.switch.unfreeze(f.agent.id).await.unwrap();
        assert!(!f.switch.is_frozen(f.agent.id));
        assert_eq!(
            f.store.agent(f.agent.id).await.unwrap().unwrap().status,
            AgentStatus::Active
        );
    }

    #[tokio::test]
    async fn test_terminate_is_final() {
        let f = fixture(|c| {
            c.on_manual_trigger = DeadManAction::Terminate;
        })
        .await;
        f.switch.manual_trigger(f.agent.id, "kill").await.unwrap();
        assert_eq!(
            f.store.agent(f.agent.id).await.unwrap().unwrap().status,
            AgentStatus::Terminated
        );

        let result = f.switch.unfreeze(f.agent.id).await;
        assert!(matches!(result, Err(WalletError::StateConflict { .. })));
    }

    #[tokio::test]
    async fn test_heartbeat_directs_frozen_agent_to_cease() {
        let f = fixture(|c| {
            c.on_manual_trigger = DeadManAction::Freeze;
        })
        .await;
        f.switch.manual_trigger(f.agent.id, "stop").await.unwrap();

        let response = f.switch.heartbeat(f.agent.id, Utc::now()).await.unwrap();
        assert!(response.cease);
        assert!(response.next_deadline.is_none());
    }
}
